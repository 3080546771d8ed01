//! Shared state discretization and relative action keys

use std::cmp::Ordering;

use quarry_rl_core::{Action, ActionKey, Position};

/// Default interaction reach in blocks
pub const DEFAULT_REACH: f64 = 4.5;

/// Closest of `candidates` to `from`; earlier entries win ties
pub(crate) fn nearest(from: &Position, candidates: &[Position]) -> Option<Position> {
    candidates.iter().copied().min_by(|a, b| {
        from.distance(a)
            .partial_cmp(&from.distance(b))
            .unwrap_or(Ordering::Equal)
    })
}

/// Coarse distance class: `none`, `reach`, `near` or `far`
pub(crate) fn distance_bucket(distance: Option<f64>, reach: f64) -> &'static str {
    match distance {
        None => "none",
        Some(d) if d <= reach => "reach",
        Some(d) if d <= reach * 3.0 => "near",
        Some(_) => "far",
    }
}

/// Occupancy in quarters, 0 (empty) to 4 (full)
pub(crate) fn fill_quarter(used: u32, capacity: u32) -> u32 {
    if capacity == 0 {
        return 4;
    }
    (used.min(capacity) * 4) / capacity
}

/// Small counts collapse to `0`, `1`, `few` (2..=4) or `many`
pub(crate) fn count_bucket(count: usize) -> &'static str {
    match count {
        0 => "0",
        1 => "1",
        2..=4 => "few",
        _ => "many",
    }
}

/// Reward for emptying the inventory: worth it only when nearly full
pub(crate) fn deposit_reward(used: u32, capacity: u32) -> f64 {
    match fill_quarter(used, capacity) {
        0 => -1.0,
        3 | 4 => 2.0,
        _ => -0.25,
    }
}

/// Relative key for a move: dominant direction plus `^`/`v` when the
/// move also climbs or descends
pub(crate) fn move_key(from: &Position, to: &Position) -> String {
    let dir = from.direction_to(to);
    let climb = match to.y.cmp(&from.y) {
        Ordering::Greater if dir != "+y" => "^",
        Ordering::Less if dir != "-y" => "v",
        _ => "",
    };
    format!("{dir}{climb}")
}

/// Key for `action` taken at `from`, independent of absolute coordinates
pub(crate) fn action_key(from: &Position, action: &Action) -> ActionKey {
    let key = match action {
        Action::MoveTo { position } => format!("move:{}", move_key(from, position)),
        Action::MineBlock { .. } => "mine".to_string(),
        Action::Harvest { .. } => "harvest".to_string(),
        Action::Plant { .. } => "plant".to_string(),
        Action::PlaceComponent { kind, .. } => format!("place:{}", kind.as_str()),
        Action::ToggleComponent { .. } => "toggle".to_string(),
        Action::DepositItems => "deposit".to_string(),
        Action::Wait => "wait".to_string(),
    };
    ActionKey::new(key)
}
