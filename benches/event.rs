use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sipm_sim::{Sensor, SensorConfig};

fn make_config() -> SensorConfig {
    let mut config = SensorConfig::default();
    config.set_property("Size", 3.0).unwrap();
    config.set_property("Pitch", 50.0).unwrap();
    config.set_property("SignalLength", 500.0).unwrap();
    config.set_property("Dcr", 500e3).unwrap();
    config.set_property("Xt", 0.05).unwrap();
    config.set_property("Ap", 0.03).unwrap();
    config
}

fn make_photons(count: usize) -> Vec<f64> {
    (0..count).map(|i| 20.0 + (i as f64 * 0.37) % 200.0).collect()
}

fn bench_run_event(c: &mut Criterion) {
    let photons_10 = make_photons(10);
    let photons_1k = make_photons(1_000);
    let photons_10k = make_photons(10_000);

    let mut group = c.benchmark_group("run_event");
    let mut sensor = Sensor::with_seed(make_config(), 42).unwrap();

    group.bench_function("10_photons", |b| {
        b.iter(|| {
            sensor.reset_state();
            sensor.add_photons(black_box(&photons_10));
            sensor.run_event().unwrap();
            black_box(sensor.signal().len())
        })
    });
    group.bench_function("1k_photons", |b| {
        b.iter(|| {
            sensor.reset_state();
            sensor.add_photons(black_box(&photons_1k));
            sensor.run_event().unwrap();
            black_box(sensor.signal().len())
        })
    });
    group.bench_function("10k_photons_dense_render", |b| {
        b.iter(|| {
            sensor.reset_state();
            sensor.add_photons(black_box(&photons_10k));
            sensor.run_event().unwrap();
            black_box(sensor.signal().len())
        })
    });
    group.finish();
}

fn bench_long_window(c: &mut Criterion) {
    let mut config = make_config();
    config.set_property("SignalLength", 10_000.0).unwrap();
    let mut sensor = Sensor::with_seed(config, 42).unwrap();
    let photons = make_photons(100);

    c.bench_function("run_event_10us_window", |b| {
        b.iter(|| {
            sensor.reset_state();
            sensor.add_photons(black_box(&photons));
            sensor.run_event().unwrap();
            black_box(sensor.signal().len())
        })
    });
}

criterion_group!(benches, bench_run_event, bench_long_window);
criterion_main!(benches);
