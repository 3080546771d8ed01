//! Decision table: state key -> action key -> value estimate

use indexmap::IndexMap;

use quarry_rl_core::{ActionKey, StateKey};

/// Action values recorded for one state, in first-seen order
pub type ActionValues = IndexMap<ActionKey, f64>;

/// Q-value lookup structure.
///
/// A state is present only once one of its actions has been written.
/// Absent entries read as 0. Both levels keep insertion order, which the
/// agent relies on for tie-breaking and persistence relies on for a stable
/// layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionTable {
    entries: IndexMap<StateKey, ActionValues>,
}

impl DecisionTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `(state, action)`, 0 when unseen
    #[must_use]
    pub fn get(&self, state: &StateKey, action: &ActionKey) -> f64 {
        self.entries
            .get(state)
            .and_then(|row| row.get(action))
            .copied()
            .unwrap_or(0.0)
    }

    /// Recorded action values for a state
    #[must_use]
    pub fn row(&self, state: &StateKey) -> Option<&ActionValues> {
        self.entries.get(state)
    }

    /// Write a value, creating the state row if needed
    pub fn set(&mut self, state: &StateKey, action: &ActionKey, value: f64) {
        match self.entries.get_mut(state) {
            Some(row) => {
                row.insert(action.clone(), value);
            }
            None => {
                let mut row = ActionValues::new();
                row.insert(action.clone(), value);
                self.entries.insert(state.clone(), row);
            }
        }
    }

    /// Highest recorded value for a state, 0 when the state is unseen
    #[must_use]
    pub fn max_value(&self, state: &StateKey) -> f64 {
        self.entries
            .get(state)
            .and_then(|row| row.values().copied().reduce(f64::max))
            .unwrap_or(0.0)
    }

    /// Whether any action has been recorded for `state`
    #[must_use]
    pub fn contains_state(&self, state: &StateKey) -> bool {
        self.entries.contains_key(state)
    }

    /// Number of states
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of `(state, action)` values
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate states and their action values in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &ActionValues)> {
        self.entries.iter()
    }
}

impl FromIterator<(StateKey, Vec<(ActionKey, f64)>)> for DecisionTable {
    fn from_iter<I: IntoIterator<Item = (StateKey, Vec<(ActionKey, f64)>)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (state, actions) in iter {
            for (action, value) in actions {
                table.set(&state, &action, value);
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StateKey {
        StateKey::from(s)
    }

    fn act(a: &str) -> ActionKey {
        ActionKey::from(a)
    }

    #[test]
    fn test_unseen_reads_zero() {
        let table = DecisionTable::new();
        assert!((table.get(&key("s"), &act("a"))).abs() < f64::EPSILON);
        assert!((table.max_value(&key("s"))).abs() < f64::EPSILON);
        assert!(!table.contains_state(&key("s")));
    }

    #[test]
    fn test_max_value_may_be_negative() {
        let mut table = DecisionTable::new();
        table.set(&key("s"), &act("a"), -2.0);
        table.set(&key("s"), &act("b"), -1.0);
        assert!((table.max_value(&key("s")) + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut table = DecisionTable::new();
        table.set(&key("s2"), &act("b"), 1.0);
        table.set(&key("s1"), &act("a"), 2.0);
        table.set(&key("s2"), &act("a"), 3.0);
        table.set(&key("s2"), &act("b"), 4.0);

        let states: Vec<_> = table.iter().map(|(s, _)| s.as_str().to_string()).collect();
        assert_eq!(states, vec!["s2", "s1"]);

        let actions: Vec<_> = table
            .row(&key("s2"))
            .unwrap()
            .iter()
            .map(|(a, v)| (a.as_str().to_string(), *v))
            .collect();
        assert_eq!(actions, vec![("b".to_string(), 4.0), ("a".to_string(), 3.0)]);
        assert_eq!(table.value_count(), 3);
    }
}
