use criterion::{Criterion, black_box, criterion_group, criterion_main};
use t38star_sim::{FaxSimulator, SimConfig};

fn benchmark_clean_session(c: &mut Criterion) {
    c.bench_function("clean_session_100_units", |b| {
        b.iter(|| {
            let config = SimConfig {
                seed: black_box(42),
                num_units: 100,
                ..Default::default()
            };
            let mut simulator = FaxSimulator::new(config);
            black_box(simulator.run().expect("Clean simulation should succeed"));
        });
    });
}

fn benchmark_lossy_session(c: &mut Criterion) {
    c.bench_function("lossy_session_100_units", |b| {
        b.iter(|| {
            let config = SimConfig {
                seed: black_box(999),
                num_units: 100,
                t4_page_probability: 0.25,
                redundancy: 2,
                channel_packet_loss_probability: 0.1,
                ..Default::default()
            };
            let mut simulator = FaxSimulator::new(config);
            black_box(simulator.run().expect("Lossy simulation should succeed"));
        });
    });
}

criterion_group!(benches, benchmark_clean_session, benchmark_lossy_session);
criterion_main!(benches);
