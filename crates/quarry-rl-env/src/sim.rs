//! Simulated block world
//!
//! A small in-process world implementing [`Actuator`] and [`StateProvider`]
//! for every domain. Used by tests, demos and `quarryctl run`. It can inject
//! transient actuator failures, either a fixed number up front or at a
//! random rate, and can add latency to every action.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use quarry_rl_core::state::CircuitComponent;
use quarry_rl_core::{
    Action, ActionOutcome, Actuator, CircuitState, ComponentKind, EngineError, EnvironmentState,
    FarmingState, MiningState, NavigationState, Position, StateProvider,
};

use crate::features::DEFAULT_REACH;

const INVENTORY_SLOTS: u32 = 36;
const SCAN_RADIUS: f64 = 16.0;
const TOOL_WEAR: f64 = 0.01;
const GROW_TICKS: u32 = 5;

/// World features the agent cannot observe directly
#[derive(Debug)]
enum Terrain {
    Mining { ores: Vec<Position> },
    Farming { growing: Vec<(Position, u32)> },
    Circuit,
    Navigation {
        obstacles: HashSet<Position>,
        water: HashSet<Position>,
    },
}

#[derive(Debug)]
struct World {
    state: EnvironmentState,
    terrain: Terrain,
    rng: StdRng,
    failure_rate: f64,
    forced_failures: u32,
    applied: u64,
}

type StepResult = std::result::Result<(), String>;

impl World {
    fn step(&mut self, action: &Action) -> StepResult {
        let result = match (&mut self.state, &mut self.terrain) {
            (EnvironmentState::Mining(s), Terrain::Mining { ores }) => mine(s, ores, action),
            (EnvironmentState::Farming(s), Terrain::Farming { growing }) => {
                let result = farm(s, growing, action);
                grow(s, growing);
                result
            }
            (EnvironmentState::Circuit(s), Terrain::Circuit) => wire(s, action),
            (EnvironmentState::Navigation(s), Terrain::Navigation { obstacles, .. }) => {
                walk(s, obstacles, action)
            }
            _ => Err("world is inconsistent".to_string()),
        };
        self.refresh();
        result
    }

    /// Recompute the observable fields derived from hidden terrain
    fn refresh(&mut self) {
        match (&mut self.state, &self.terrain) {
            (EnvironmentState::Mining(s), Terrain::Mining { ores }) => {
                s.nearby_targets = ores
                    .iter()
                    .copied()
                    .filter(|o| s.position.distance(o) <= SCAN_RADIUS)
                    .collect();
            }
            (EnvironmentState::Circuit(s), Terrain::Circuit) => propagate(s),
            (EnvironmentState::Navigation(s), Terrain::Navigation { obstacles, water }) => {
                s.obstacle_ahead = s.position != s.destination
                    && obstacles.contains(&s.position.step_towards(&s.destination));
                s.in_water = water.contains(&s.position);
            }
            _ => {}
        }
    }
}

fn in_reach(from: &Position, to: &Position) -> StepResult {
    if from.distance(to) > DEFAULT_REACH {
        return Err(format!("{to} is out of reach"));
    }
    Ok(())
}

fn mine(s: &mut MiningState, ores: &mut Vec<Position>, action: &Action) -> StepResult {
    match action {
        Action::MineBlock { position } => {
            in_reach(&s.position, position)?;
            if !ores.contains(position) {
                return Err(format!("no {} at {position}", s.target_block));
            }
            if s.inventory_full() {
                return Err("inventory full".into());
            }
            if s.tool_durability <= 0.0 {
                return Err("tool broken".into());
            }
            ores.retain(|o| o != position);
            s.collected += 1;
            s.inventory_used += 1;
            s.tool_durability = (s.tool_durability - TOOL_WEAR).max(0.0);
        }
        Action::MoveTo { position } => s.position = *position,
        Action::DepositItems => {
            if s.inventory_used == 0 {
                return Err("nothing to deposit".into());
            }
            s.inventory_used = 0;
        }
        Action::Wait => {}
        other => return Err(format!("{} is not a mining action", other.name())),
    }
    Ok(())
}

fn farm(s: &mut FarmingState, growing: &mut Vec<(Position, u32)>, action: &Action) -> StepResult {
    match action {
        Action::Harvest { position } => {
            in_reach(&s.position, position)?;
            let Some(idx) = s.mature_crops.iter().position(|p| p == position) else {
                return Err(format!("no grown {} at {position}", s.crop));
            };
            if s.inventory_used >= s.inventory_capacity {
                return Err("inventory full".into());
            }
            s.mature_crops.remove(idx);
            s.empty_farmland.push(*position);
            s.harvested += 1;
            s.inventory_used += 1;
            s.seeds += 1;
        }
        Action::Plant { position, .. } => {
            in_reach(&s.position, position)?;
            if s.seeds == 0 {
                return Err("no seeds".into());
            }
            let Some(idx) = s.empty_farmland.iter().position(|p| p == position) else {
                return Err(format!("no empty farmland at {position}"));
            };
            s.empty_farmland.remove(idx);
            s.seeds -= 1;
            growing.push((*position, GROW_TICKS));
        }
        Action::MoveTo { position } => s.position = *position,
        Action::DepositItems => {
            if s.inventory_used == 0 {
                return Err("nothing to deposit".into());
            }
            s.inventory_used = 0;
        }
        Action::Wait => {}
        other => return Err(format!("{} is not a farming action", other.name())),
    }
    Ok(())
}

fn grow(s: &mut FarmingState, growing: &mut Vec<(Position, u32)>) {
    for (_, ticks) in growing.iter_mut() {
        *ticks = ticks.saturating_sub(1);
    }
    let (ripe, still): (Vec<_>, Vec<_>) = growing.drain(..).partition(|(_, t)| *t == 0);
    *growing = still;
    s.mature_crops.extend(ripe.into_iter().map(|(p, _)| p));
}

fn wire(s: &mut CircuitState, action: &Action) -> StepResult {
    match action {
        Action::PlaceComponent { position, kind } => {
            if s.components_available == 0 {
                return Err("no components left".into());
            }
            if s.components.iter().any(|c| c.position == *position) {
                return Err(format!("{position} is occupied"));
            }
            s.components.push(CircuitComponent {
                position: *position,
                kind: *kind,
                powered: false,
            });
            s.components_available -= 1;
        }
        Action::ToggleComponent { position } => {
            let Some(lever) = s
                .components
                .iter_mut()
                .find(|c| c.position == *position && c.kind == ComponentKind::Lever)
            else {
                return Err(format!("no lever at {position}"));
            };
            lever.powered = !lever.powered;
        }
        Action::Wait => {}
        other => return Err(format!("{} is not a circuit action", other.name())),
    }
    Ok(())
}

/// Push signal along the chain in placement order. Levers keep their
/// switch state in `powered`.
fn propagate(s: &mut CircuitState) {
    let mut signal: u8 = 0;
    for component in &mut s.components {
        signal = match component.kind {
            ComponentKind::Torch => 15,
            ComponentKind::Lever => {
                if component.powered {
                    15
                } else {
                    0
                }
            }
            ComponentKind::Dust => signal.saturating_sub(1),
            ComponentKind::Repeater => {
                if signal > 0 {
                    15
                } else {
                    0
                }
            }
            ComponentKind::Comparator => signal,
        };
        if component.kind != ComponentKind::Lever {
            component.powered = signal > 0;
        }
    }
    s.output_signal = signal;
}

fn walk(s: &mut NavigationState, obstacles: &HashSet<Position>, action: &Action) -> StepResult {
    match action {
        Action::MoveTo { position } => {
            if s.position.manhattan(position) > 2 {
                return Err(format!("{position} is more than one move away"));
            }
            if obstacles.contains(position) {
                return Err(format!("path blocked at {position}"));
            }
            s.position = *position;
            s.steps_taken += 1;
        }
        Action::Wait => {}
        other => return Err(format!("{} is not a movement action", other.name())),
    }
    Ok(())
}

/// In-process world for every task domain
#[derive(Debug)]
pub struct SimulatedWorld {
    inner: Mutex<World>,
    latency: Duration,
}

impl SimulatedWorld {
    fn from_state(state: EnvironmentState, terrain: Terrain) -> Self {
        let mut world = World {
            state,
            terrain,
            rng: StdRng::seed_from_u64(0),
            failure_rate: 0.0,
            forced_failures: 0,
            applied: 0,
        };
        world.refresh();
        Self {
            inner: Mutex::new(world),
            latency: Duration::ZERO,
        }
    }

    /// Mining world with ores at the given positions
    pub fn mining(origin: Position, target_block: &str, ores: Vec<Position>) -> Self {
        let state = EnvironmentState::Mining(MiningState {
            position: origin,
            target_block: target_block.to_string(),
            nearby_targets: Vec::new(),
            inventory_used: 0,
            inventory_capacity: INVENTORY_SLOTS,
            tool_durability: 1.0,
            biome: "plains".to_string(),
            collected: 0,
        });
        Self::from_state(state, Terrain::Mining { ores })
    }

    /// Mining world with `count` ores scattered within `radius` blocks of
    /// `origin` on the same level
    pub fn mining_field(
        origin: Position,
        target_block: &str,
        count: usize,
        radius: i32,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ores = Vec::with_capacity(count);
        let radius = radius.max(1);
        let mut attempts = 0;
        while ores.len() < count && attempts < count * 50 {
            attempts += 1;
            let ore = Position::new(
                origin.x + rng.gen_range(-radius..=radius),
                origin.y,
                origin.z + rng.gen_range(-radius..=radius),
            );
            if ore != origin && !ores.contains(&ore) {
                ores.push(ore);
            }
        }
        Self::mining(origin, target_block, ores).with_seed(seed)
    }

    /// Farm with grown crops, empty farmland and seeds in inventory
    pub fn farming(
        origin: Position,
        crop: &str,
        mature: Vec<Position>,
        empty: Vec<Position>,
        seeds: u32,
    ) -> Self {
        let state = EnvironmentState::Farming(FarmingState {
            position: origin,
            crop: crop.to_string(),
            mature_crops: mature,
            empty_farmland: empty,
            seeds,
            inventory_used: 0,
            inventory_capacity: INVENTORY_SLOTS,
            harvested: 0,
        });
        Self::from_state(state, Terrain::Farming { growing: Vec::new() })
    }

    /// Empty circuit site
    pub fn redstone(origin: Position, target_signal: u8, components_available: u32) -> Self {
        let state = EnvironmentState::Circuit(CircuitState {
            position: origin,
            components: Vec::new(),
            output_signal: 0,
            target_signal: target_signal.min(15),
            components_available,
        });
        Self::from_state(state, Terrain::Circuit)
    }

    /// Open terrain with obstacles between `origin` and `destination`
    pub fn navigation(origin: Position, destination: Position, obstacles: Vec<Position>) -> Self {
        let state = EnvironmentState::Navigation(NavigationState {
            position: origin,
            destination,
            obstacle_ahead: false,
            in_water: false,
            steps_taken: 0,
        });
        Self::from_state(
            state,
            Terrain::Navigation {
                obstacles: obstacles.into_iter().collect(),
                water: HashSet::new(),
            },
        )
    }

    /// Mark water blocks (navigation worlds only)
    #[must_use]
    pub fn with_water(mut self, blocks: Vec<Position>) -> Self {
        let world = self.inner.get_mut();
        if let Terrain::Navigation { water, .. } = &mut world.terrain {
            water.extend(blocks);
        }
        world.refresh();
        self
    }

    /// Seed the failure-injection random source
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.inner.get_mut().rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Fail each action with probability `rate`
    #[must_use]
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.inner.get_mut().failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fail the next `count` actions
    #[must_use]
    pub fn fail_next(mut self, count: u32) -> Self {
        self.inner.get_mut().forced_failures = count;
        self
    }

    /// Delay every action by `latency`
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Actions received so far, failed ones included
    pub async fn actions_applied(&self) -> u64 {
        self.inner.lock().await.applied
    }

    /// Current world state
    pub async fn state(&self) -> EnvironmentState {
        self.inner.lock().await.state.clone()
    }
}

#[async_trait]
impl Actuator for SimulatedWorld {
    async fn apply(&self, action: &Action) -> quarry_rl_core::Result<ActionOutcome> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut world = self.inner.lock().await;
        world.applied += 1;

        if world.forced_failures > 0 {
            world.forced_failures -= 1;
            return Err(EngineError::actuator("simulated connection reset"));
        }
        if world.failure_rate > 0.0 {
            let roll: f64 = world.rng.gen();
            if roll < world.failure_rate {
                return Err(EngineError::actuator("simulated server lag"));
            }
        }

        match world.step(action) {
            Ok(()) => {
                trace!(%action, "Action applied");
                Ok(ActionOutcome::succeeded(world.state.clone()))
            }
            Err(reason) => {
                debug!(%action, %reason, "Action refused");
                Ok(ActionOutcome::refused(world.state.clone(), reason))
            }
        }
    }
}

#[async_trait]
impl StateProvider for SimulatedWorld {
    async fn current_state(&self) -> quarry_rl_core::Result<EnvironmentState> {
        Ok(self.inner.lock().await.state.clone())
    }
}
