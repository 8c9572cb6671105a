//! Criterion benchmarks for the spinal control network.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use spinalnet::config::{BodyDescription, SpinalConfig};
use spinalnet::controller::ControlNetwork;
use spinalnet::params::ParamSet;

/// `groups` bilateral muscle groups with one muscle each, all roles enabled.
fn make_network(groups: usize) -> ControlNetwork {
    let names: Vec<String> = (0..groups).map(|i| format!("m{i}")).collect();
    let delays: serde_json::Map<String, serde_json::Value> =
        names.iter().map(|n| (n.clone(), json!(0.02))).collect();
    let templates: Vec<serde_json::Value> = names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let antagonist = &names[(i + 1) % groups];
            json!({ "name": n, "muscles": n, "antagonists": antagonist, "related": antagonist, "cl_antagonists": n })
        })
        .collect();

    let cfg: SpinalConfig = serde_json::from_value(json!({
        "activation": "relu",
        "neural_delays": delays,
        "MuscleGroup": templates,
        "LD": { "delay": 0.03 },
        "params": {
            "MN_bias": "0.05~0.01", "L_MN_weight": "1~0.1",
            "IA_bias": "0~0.1", "L_IA_weight": "1~0.1", "IA_IA_weight": "-0.5~0.1", "IA_MN_weight": "-0.5~0.1",
            "IB_bias": "0~0.1", "F_IB_weight": "1~0.1", "IB_MN_weight": "0.5~0.1",
            "IB_IB_ant_weight": "-0.2~0.1", "IB_IB_rel_weight": "0.2~0.1", "IB_IB_com_weight": "0.1~0.1",
            "LD_IB_weight": "0.3~0.1", "IB_IA_weight": "0.1~0.1",
            "RC_bias": "0~0.1", "RC_MN_weight": "-0.3~0.1", "MN_RC_weight": "0.5~0.1", "RC_IA_weight": "-0.2~0.1",
        },
    }))
    .expect("bench config");

    let muscles = names
        .iter()
        .flat_map(|n| [format!("{n}_r"), format!("{n}_l")])
        .collect();
    let body = BodyDescription {
        muscles,
        legs: vec!["leg_r".into(), "leg_l".into()],
        bodies: vec![],
        dof_count: 9,
    };
    ControlNetwork::build(&cfg, &mut ParamSet::new(), &body).expect("bench network")
}

/// Benchmark one control step (sense + tick) with increasing topology size.
fn bench_tick_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_size");

    for groups in [4usize, 16, 64] {
        let net = make_network(groups);
        group.throughput(Throughput::Elements(net.network().link_count() as u64));

        group.bench_with_input(BenchmarkId::new("tick", groups), &groups, |b, _| {
            let mut net = net.clone();
            let dt = 0.005;
            let mut k = 0u64;
            b.iter(|| {
                let t = k as f64 * dt;
                net.sense(t, |s| (s.id as f64 * 0.01 + t).sin());
                black_box(net.tick(t));
                k += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark topology construction.
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for groups in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("build", groups), &groups, |b, &groups| {
            b.iter(|| black_box(make_network(groups).network().neuron_count()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tick_sizes, bench_build);
criterion_main!(benches);
