//! Benchmarks for per-tick blend-tree evaluation
//!
//! Run with: cargo bench -p blendtree-core

use blendtree_core::{
    data::ClipData,
    engine::Engine,
    inputs::{Inputs, LayerCommand},
    node::{LeafCfg, MixerCfg},
    Config, LayerBinding,
};
use blendtree_test_fixtures as fixtures;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const DT: f32 = 1.0 / 60.0;

/// One locomotion layer per count: walk/run mixer with idle to fade into.
fn build_engine(layers: usize) -> (Engine, Vec<LayerCommand>) {
    let mut engine = Engine::new(Config::default());
    let load = |engine: &mut Engine, name: &str| {
        let data: ClipData = fixtures::clips::load(name).expect("clip fixture");
        engine.load_clip(data).expect("valid clip")
    };
    let walk = load(&mut engine, "walk");
    let run = load(&mut engine, "run");
    let idle = load(&mut engine, "idle");
    let targets = fixtures::rigs::targets("biped").expect("rig fixture");

    let mut fades = Vec::with_capacity(layers);
    for i in 0..layers {
        let layer = engine.create_layer(&format!("layer{i}"), LayerBinding::from_targets(&targets));
        engine.declare_weight(layer, "walk", 0.6).expect("layer exists");
        engine.declare_weight(layer, "run", 0.4).expect("layer exists");
        let w = engine.add_leaf(layer, LeafCfg::looping("walk", walk)).expect("walk leaf");
        let r = engine.add_leaf(layer, LeafCfg::looping("run", run)).expect("run leaf");
        let idle_leaf = engine.add_leaf(layer, LeafCfg::looping("idle", idle)).expect("idle leaf");
        let gait = engine
            .add_mixer(
                layer,
                MixerCfg {
                    name: "gait".into(),
                    children: vec![w, r],
                    weights: vec!["walk".into(), "run".into()],
                    match_speeds: true,
                },
            )
            .expect("gait mixer");
        engine.play(layer, gait).expect("play gait");
        fades.push(LayerCommand::CrossFade {
            layer,
            node: idle_leaf,
            duration: 10.0,
        });
    }
    (engine, fades)
}

fn bench_blend_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("blend_tick");

    for layers in [1usize, 8, 64] {
        group.throughput(Throughput::Elements(layers as u64));

        group.bench_with_input(BenchmarkId::new("mixer", layers), &layers, |b, &layers| {
            let (mut engine, _) = build_engine(layers);
            b.iter(|| black_box(engine.update(DT, Inputs::default()).changes.len()));
        });

        group.bench_with_input(BenchmarkId::new("cross_fading_mixer", layers), &layers, |b, &layers| {
            let (mut engine, fades) = build_engine(layers);
            engine.update(
                DT,
                Inputs {
                    layer_cmds: fades,
                    ..Inputs::default()
                },
            );
            b.iter(|| black_box(engine.update(DT, Inputs::default()).changes.len()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_blend_tick);
criterion_main!(benches);
