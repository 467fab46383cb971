use criterion::black_box;
use criterion::{criterion_group, criterion_main, Criterion};
use sirfit::prelude::*;

fn infected_dataset() -> Dataset {
    let trajectory = simulate_sir(
        &SirParams::default(),
        DEFAULT_X0,
        &time_points(DEFAULT_TIME_POINTS),
    )
    .unwrap();
    Dataset::from_trajectory(&trajectory, Compartment::I).unwrap()
}

fn demo_network() -> Network {
    Network::builder(2, vec![Basis::arithmetic(); 3])
        .loss(CrossEntropyLoss::new(5.0, 1).unwrap())
        .build()
        .unwrap()
}

fn options(multiprocessing: bool) -> TrainOptions {
    TrainOptions {
        multiprocessing,
        num_processes: 4,
        progress: false,
        seed: Some(1),
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("simulate_sir", |b| {
        b.iter(|| {
            black_box(
                simulate_sir(
                    &SirParams::default(),
                    DEFAULT_X0,
                    &time_points(DEFAULT_TIME_POINTS),
                )
                .unwrap(),
            )
        })
    });

    let dataset = infected_dataset();
    let network = demo_network();
    let probs = network.probabilities(10.0);

    c.bench_function("sample_and_trace", |b| {
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(7);
        b.iter(|| {
            let path = network.sample(&probs, &mut rng);
            black_box(network.trace(path))
        })
    });

    for (name, multiprocessing) in [("train_sequential", false), ("train_parallel", true)] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut network = demo_network();
                black_box(
                    network
                        .train_function(10, 1, 100, 1.0, &dataset, &options(multiprocessing))
                        .unwrap(),
                )
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
