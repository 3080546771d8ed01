//! Mine a few blocks in a simulated world while watching progress

use std::sync::Arc;
use std::time::Duration;

use quarry_rl_core::{MemoryBlobStore, Position};
use quarry_rl_env::{DomainRegistry, SimulatedWorld};
use quarry_task::telemetry::init_logging;
use quarry_task::{EngineConfig, TaskParams, TaskRunner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info");

    let mut config = EngineConfig::default();
    config.agent.seed = Some(42);
    config.controller.retry_delay_ms = 200;

    let runner = TaskRunner::new(
        config,
        DomainRegistry::with_defaults(),
        Arc::new(MemoryBlobStore::new()),
    );
    let world = Arc::new(
        SimulatedWorld::mining_field(Position::new(0, 64, 0), "iron_ore", 12, 8, 7)
            .with_failure_rate(0.05)
            .with_latency(Duration::from_millis(20)),
    );

    let id = runner
        .submit(
            TaskParams::Mining {
                target_block: "iron_ore".into(),
                quantity: 6,
                radius: 8,
            },
            world.clone(),
            world,
        )
        .await?;

    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let Some(snapshot) = runner.progress(id).await? else {
            continue;
        };
        println!(
            "{:>5.1}% status={} retries={} eta={:?}",
            snapshot.fraction() * 100.0,
            snapshot.status,
            snapshot.retry_count,
            snapshot.eta_secs
        );
        if snapshot.status.is_terminal() {
            break;
        }
    }

    let result = runner.join(id).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
