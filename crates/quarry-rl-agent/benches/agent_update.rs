use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use quarry_rl_agent::QLearningAgent;
use quarry_rl_core::{ActionKey, AgentConfig, Experience, StateKey};

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("agent_update");
    for batch_size in [1usize, 32, 128] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                let mut agent = QLearningAgent::new(AgentConfig {
                    batch_size,
                    ..AgentConfig::default().with_seed(1)
                })
                .unwrap();
                let mut step = 0u32;
                b.iter(|| {
                    step = step.wrapping_add(1);
                    let exp = Experience::new(
                        format!("s{}", step % 64),
                        format!("a{}", step % 6),
                        f64::from(step % 5),
                        format!("s{}", (step + 1) % 64),
                        step % 50 == 0,
                    );
                    black_box(agent.update(exp));
                });
            },
        );
    }
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut agent = QLearningAgent::new(AgentConfig::default().with_seed(2)).unwrap();
    for i in 0..500u32 {
        agent.update(Experience::new(
            format!("s{}", i % 50),
            format!("a{}", i % 8),
            f64::from(i % 3),
            format!("s{}", (i + 1) % 50),
            false,
        ));
    }
    let candidates: Vec<ActionKey> = (0..8).map(|i| ActionKey::new(format!("a{i}"))).collect();
    let state = StateKey::from("s7");

    c.bench_function("select_action", |b| {
        b.iter(|| black_box(agent.select_index(&state, &candidates)));
    });
}

criterion_group!(benches, bench_update, bench_select);
criterion_main!(benches);
