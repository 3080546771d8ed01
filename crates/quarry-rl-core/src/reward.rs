//! Reward signals

use serde::{Deserialize, Serialize};

/// Scalar reward computed by a domain plug-in for one transition.
///
/// The agent never clamps rewards; a domain that wants bounded rewards
/// calls [`Reward::clamped`] itself.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Reward(pub f64);

impl Reward {
    /// Create a new reward
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// Get the reward value
    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Restrict the reward to `[min, max]`
    #[must_use]
    pub fn clamped(self, min: f64, max: f64) -> Self {
        Self(self.0.clamp(min, max))
    }
}

impl From<f64> for Reward {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<Reward> for f64 {
    fn from(reward: Reward) -> Self {
        reward.0
    }
}

impl std::ops::AddAssign for Reward {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}
