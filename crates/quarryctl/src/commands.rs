// Command implementations for quarryctl

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use quarry_rl_core::{BlobStore, DomainKind, FsBlobStore, Position};
use quarry_rl_env::{DomainRegistry, SimulatedWorld};
use quarry_task::{EngineConfig, ProgressSnapshot, TaskParams, TaskRunner};

use crate::RunTask;

const ORIGIN: Position = Position { x: 0, y: 64, z: 0 };

fn open_store(config: &EngineConfig) -> Arc<dyn BlobStore> {
    Arc::new(FsBlobStore::new(config.storage.root.clone()))
}

fn open_runner(config: EngineConfig) -> TaskRunner {
    let store = open_store(&config);
    TaskRunner::new(config, DomainRegistry::with_defaults(), store)
}

/// Build the task parameters and a matching world
fn stage(task: RunTask, seed: u64) -> (TaskParams, SimulatedWorld) {
    match task {
        RunTask::Mining {
            block,
            quantity,
            radius,
            ores,
        } => {
            let world = SimulatedWorld::mining_field(
                ORIGIN,
                &block,
                ores,
                i32::try_from(radius).unwrap_or(i32::MAX),
                seed,
            );
            let params = TaskParams::Mining {
                target_block: block,
                quantity,
                radius,
            };
            (params, world)
        }
        RunTask::Farming {
            crop,
            quantity,
            radius,
        } => {
            let r = i32::try_from(radius).unwrap_or(i32::MAX);
            let mature = (1..=r).map(|x| Position::new(x, ORIGIN.y, 1)).collect();
            let empty = (1..=r).map(|x| Position::new(x, ORIGIN.y, -1)).collect();
            let world = SimulatedWorld::farming(ORIGIN, &crop, mature, empty, 4).with_seed(seed);
            let params = TaskParams::Farming {
                crop,
                quantity,
                radius,
            };
            (params, world)
        }
        RunTask::Redstone { signal, components } => {
            let world = SimulatedWorld::redstone(ORIGIN, signal, components).with_seed(seed);
            let params = TaskParams::Redstone {
                target_signal: signal,
                max_components: components,
            };
            (params, world)
        }
        RunTask::Navigation {
            x,
            y,
            z,
            max_distance,
        } => {
            let destination = Position::new(x, y, z);
            let world = SimulatedWorld::navigation(ORIGIN, destination, Vec::new()).with_seed(seed);
            let params = TaskParams::Navigation {
                destination,
                max_distance,
            };
            (params, world)
        }
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    let eta = snapshot
        .eta_secs
        .map_or_else(|| "-".to_string(), |s| format!("{s:.1}s"));
    let location = snapshot
        .location
        .map_or_else(|| "-".to_string(), |p| p.to_string());
    println!(
        "[{:<11}] {:>6.1}/{:<6.1} ({:>5.1}%)  eta {eta}  at {location}  errors {}  retries {}",
        snapshot.status,
        snapshot.current,
        snapshot.total,
        snapshot.fraction() * 100.0,
        snapshot.error_count,
        snapshot.retry_count,
    );
}

pub async fn run(
    mut config: EngineConfig,
    task: RunTask,
    seed: u64,
    failure_rate: f64,
    watch_ms: u64,
) -> Result<()> {
    config.agent.seed.get_or_insert(seed);
    let runner = open_runner(config);
    let (params, world) = stage(task, seed);
    params.validate().context("Invalid task parameters")?;
    let world = Arc::new(world.with_failure_rate(failure_rate));

    println!("Running {} task", params.kind());
    let id = runner
        .submit(params, world.clone(), world)
        .await
        .context("Failed to submit task")?;
    println!("   Task ID: {id}");

    let interval = Duration::from_millis(watch_ms.max(50));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping task...");
                runner.stop(id);
                break;
            }
            () = tokio::time::sleep(interval) => {}
        }
        if let Some(snapshot) = runner.progress(id).await? {
            print_snapshot(&snapshot);
            if snapshot.status.is_terminal() {
                break;
            }
        }
    }

    let result = runner.join(id).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!(
            "task {} ended {}: {}",
            result.task_id,
            result.status,
            result.error.unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn versions(config: &EngineConfig, domain: DomainKind) -> Result<()> {
    let runner = open_runner(config.clone());
    let versions = runner
        .model_versions(domain)
        .list_versions()
        .await
        .with_context(|| format!("Failed to read {domain} model versions"))?;

    if versions.is_empty() {
        println!("No saved versions for {domain}");
        return Ok(());
    }
    println!("{:<8} {:<20} {:>8} {:>8}  label", "version", "created", "updates", "states");
    for v in versions {
        println!(
            "{:<8} {:<20} {:>8} {:>8}  {}",
            v.version,
            v.created_at.format("%Y-%m-%d %H:%M:%S"),
            v.updates,
            v.states,
            v.label.unwrap_or_default()
        );
    }
    Ok(())
}

/// Restore `version` and save it again as the newest version, so the next
/// run starts from it
pub async fn rollback(config: EngineConfig, domain: DomainKind, version: u32) -> Result<()> {
    let runner = open_runner(config);
    let agent = runner.agent(domain).await?;
    let store = runner.model_versions(domain);

    store
        .rollback(&agent, version)
        .await
        .with_context(|| format!("Failed to roll back {domain} to version {version}"))?;
    let saved = store
        .checkpoint(&agent, Some(&format!("rollback to v{version}")))
        .await
        .context("Failed to save rolled back model")?;

    println!("Rolled back {domain} to version {version} (saved as version {})", saved.version);
    Ok(())
}

pub async fn progress(config: &EngineConfig, task_id: Uuid) -> Result<()> {
    let store = open_store(config);
    match ProgressSnapshot::load(store.as_ref(), task_id).await? {
        Some(snapshot) => {
            print_snapshot(&snapshot);
            Ok(())
        }
        None => bail!("no progress recorded for task {task_id}"),
    }
}
