//! Actions the agent can apply to the world, and their keys

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Position;

/// Redstone component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Signal wire
    Dust,
    /// Signal source
    Torch,
    /// Signal amplifier with delay
    Repeater,
    /// Signal comparator
    Comparator,
    /// Manual switch
    Lever,
}

impl ComponentKind {
    /// Stable lowercase name used in keys and logs
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dust => "dust",
            Self::Torch => "torch",
            Self::Repeater => "repeater",
            Self::Comparator => "comparator",
            Self::Lever => "lever",
        }
    }
}

/// A tagged description of an effect to apply to the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Dig the block at a position
    MineBlock {
        /// Block to dig
        position: Position,
    },
    /// Walk to a position
    MoveTo {
        /// Destination
        position: Position,
    },
    /// Harvest a grown crop
    Harvest {
        /// Crop location
        position: Position,
    },
    /// Plant a seed on farmland
    Plant {
        /// Farmland location
        position: Position,
        /// Crop to plant
        crop: String,
    },
    /// Place a circuit component
    PlaceComponent {
        /// Where to place it
        position: Position,
        /// What to place
        kind: ComponentKind,
    },
    /// Flip a placed component's state
    ToggleComponent {
        /// Component location
        position: Position,
    },
    /// Empty the inventory into a nearby container
    DepositItems,
    /// Do nothing for a tick
    Wait,
}

impl Action {
    /// Short tag naming the variant
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MineBlock { .. } => "mine_block",
            Self::MoveTo { .. } => "move_to",
            Self::Harvest { .. } => "harvest",
            Self::Plant { .. } => "plant",
            Self::PlaceComponent { .. } => "place_component",
            Self::ToggleComponent { .. } => "toggle_component",
            Self::DepositItems => "deposit_items",
            Self::Wait => "wait",
        }
    }

    /// Target position, if the action has one
    #[must_use]
    pub fn target(&self) -> Option<Position> {
        match self {
            Self::MineBlock { position }
            | Self::MoveTo { position }
            | Self::Harvest { position }
            | Self::Plant { position, .. }
            | Self::PlaceComponent { position, .. }
            | Self::ToggleComponent { position } => Some(*position),
            Self::DepositItems | Self::Wait => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(pos) => write!(f, "{}@{}", self.name(), pos),
            None => f.write_str(self.name()),
        }
    }
}

/// Deterministic string encoding of an [`Action`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKey(String);

impl ActionKey {
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

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ActionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
