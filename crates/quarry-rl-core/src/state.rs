//! Environment state payloads and state keys

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::DomainKind;

/// Block coordinates in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// East-west axis
    pub x: i32,
    /// Vertical axis
    pub y: i32,
    /// North-south axis
    pub z: i32,
}

impl Position {
    /// Create a new position
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position
    #[must_use]
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Manhattan distance to another position
    #[must_use]
    pub fn manhattan(&self, other: &Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y) + self.z.abs_diff(other.z)
    }

    /// One block step from `self` towards `target`, moving along the
    /// dominant axis first
    #[must_use]
    pub fn step_towards(&self, target: &Position) -> Position {
        let dx = target.x - self.x;
        let dy = target.y - self.y;
        let dz = target.z - self.z;
        let mut next = *self;
        if dx.abs() >= dy.abs() && dx.abs() >= dz.abs() && dx != 0 {
            next.x += dx.signum();
        } else if dz.abs() >= dy.abs() && dz != 0 {
            next.z += dz.signum();
        } else if dy != 0 {
            next.y += dy.signum();
        }
        next
    }

    /// Dominant axis direction from `self` to `target`: one of `+x`, `-x`,
    /// `+y`, `-y`, `+z`, `-z`, or `here` when they coincide
    #[must_use]
    pub fn direction_to(&self, target: &Position) -> &'static str {
        let step = self.step_towards(target);
        match (step.x - self.x, step.y - self.y, step.z - self.z) {
            (1, _, _) => "+x",
            (-1, _, _) => "-x",
            (_, _, 1) => "+z",
            (_, _, -1) => "-z",
            (_, 1, _) => "+y",
            (_, -1, _) => "-y",
            _ => "here",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// Deterministic string encoding of an [`EnvironmentState`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    /// Create a key from a raw string
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StateKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the miner sees around it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningState {
    /// Current position
    pub position: Position,
    /// Block type being collected
    pub target_block: String,
    /// Known target blocks in range
    pub nearby_targets: Vec<Position>,
    /// Occupied inventory slots
    pub inventory_used: u32,
    /// Total inventory slots
    pub inventory_capacity: u32,
    /// Remaining tool durability in `[0, 1]`
    pub tool_durability: f64,
    /// Biome name reported by the state provider
    pub biome: String,
    /// Target blocks collected so far
    pub collected: u32,
}

impl MiningState {
    /// Nearest known target block
    #[must_use]
    pub fn nearest_target(&self) -> Option<Position> {
        self.nearby_targets.iter().copied().min_by(|a, b| {
            self.position
                .distance(a)
                .partial_cmp(&self.position.distance(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Whether every inventory slot is taken
    #[must_use]
    pub fn inventory_full(&self) -> bool {
        self.inventory_used >= self.inventory_capacity
    }
}

/// Crop field around the farmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmingState {
    /// Current position
    pub position: Position,
    /// Crop being maintained
    pub crop: String,
    /// Fully grown crops ready for harvest
    pub mature_crops: Vec<Position>,
    /// Tilled farmland without a crop
    pub empty_farmland: Vec<Position>,
    /// Seeds in inventory
    pub seeds: u32,
    /// Occupied inventory slots
    pub inventory_used: u32,
    /// Total inventory slots
    pub inventory_capacity: u32,
    /// Crops harvested so far
    pub harvested: u32,
}

/// A placed circuit component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitComponent {
    /// Where it sits
    pub position: Position,
    /// What it is
    pub kind: crate::ComponentKind,
    /// Whether it currently carries signal
    pub powered: bool,
}

/// Redstone circuit under construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitState {
    /// Current position
    pub position: Position,
    /// Components placed so far
    pub components: Vec<CircuitComponent>,
    /// Signal strength measured at the output, 0..=15
    pub output_signal: u8,
    /// Signal strength the circuit should deliver
    pub target_signal: u8,
    /// Components still in inventory
    pub components_available: u32,
}

impl CircuitState {
    /// Number of components currently powered
    #[must_use]
    pub fn powered_count(&self) -> usize {
        self.components.iter().filter(|c| c.powered).count()
    }
}

/// Walking towards a destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    /// Current position
    pub position: Position,
    /// Where the walk should end
    pub destination: Position,
    /// Whether the next block towards the destination is obstructed
    pub obstacle_ahead: bool,
    /// Whether the agent is standing in water
    pub in_water: bool,
    /// Moves made so far
    pub steps_taken: u32,
}

impl NavigationState {
    /// Remaining straight-line distance
    #[must_use]
    pub fn remaining(&self) -> f64 {
        self.position.distance(&self.destination)
    }
}

/// Everything a decision depends on, one record shape per domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum EnvironmentState {
    /// Resource extraction
    Mining(MiningState),
    /// Area maintenance
    Farming(FarmingState),
    /// Circuit optimization
    Circuit(CircuitState),
    /// Movement
    Navigation(NavigationState),
}

impl EnvironmentState {
    /// The domain this state belongs to
    #[must_use]
    pub fn kind(&self) -> DomainKind {
        match self {
            Self::Mining(_) => DomainKind::Mining,
            Self::Farming(_) => DomainKind::Farming,
            Self::Circuit(_) => DomainKind::Redstone,
            Self::Navigation(_) => DomainKind::Navigation,
        }
    }

    /// Last known location of the agent
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::Mining(s) => s.position,
            Self::Farming(s) => s.position,
            Self::Circuit(s) => s.position,
            Self::Navigation(s) => s.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_towards_moves_one_block() {
        let from = Position::new(0, 64, 0);
        let to = Position::new(3, 64, -1);
        let next = from.step_towards(&to);
        assert_eq!(next, Position::new(1, 64, 0));
        assert_eq!(to.step_towards(&to), to);
        assert_eq!(from.direction_to(&to), "+x");
        assert_eq!(from.direction_to(&Position::new(0, 60, 0)), "-y");
        assert_eq!(to.direction_to(&to), "here");
    }

    #[test]
    fn test_state_kind_and_position() {
        let state = EnvironmentState::Navigation(NavigationState {
            position: Position::new(1, 2, 3),
            destination: Position::new(10, 2, 3),
            obstacle_ahead: false,
            in_water: false,
            steps_taken: 0,
        });
        assert_eq!(state.kind(), DomainKind::Navigation);
        assert_eq!(state.position(), Position::new(1, 2, 3));
    }

    #[test]
    fn test_state_serializes_tagged() {
        let state = EnvironmentState::Circuit(CircuitState {
            position: Position::default(),
            components: Vec::new(),
            output_signal: 0,
            target_signal: 15,
            components_available: 4,
        });
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["domain"], "circuit");
    }
}
