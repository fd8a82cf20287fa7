use approx::assert_abs_diff_eq;
use blendtree_core::{
    data::{ChannelKind, ClipData},
    engine::Engine,
    ids::{name_hash, LayerId, OutputSlot},
    inputs::{Inputs, LayerCommand, WeightUpdate},
    node::{LeafCfg, MixerCfg, NextState},
    outputs::{CoreEvent, Outputs},
    BlendError, Config, LayerBinding,
};
use blendtree_test_fixtures as fixtures;

const DT: f32 = 1.0 / 30.0;

fn biped_binding() -> LayerBinding {
    LayerBinding::from_targets(fixtures::rigs::targets("biped").expect("biped rig fixture"))
}

fn load(engine: &mut Engine, name: &str) -> blendtree_core::ClipId {
    let data: ClipData = fixtures::clips::load(name).expect("clip fixture");
    engine.load_clip(data).expect("fixture clip is valid")
}

fn fired(outputs: &Outputs) -> Vec<String> {
    outputs
        .events
        .iter()
        .filter_map(|e| match e {
            CoreEvent::EventFired { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn rotation_of(outputs: &Outputs, target: &str) -> Option<Vec<f32>> {
    outputs
        .changes
        .iter()
        .find(|c| c.target_hash == name_hash(target) && c.kind == ChannelKind::Rotation)
        .map(|c| c.values.clone())
}

#[test]
fn every_fixture_clip_loads() {
    let mut engine = Engine::new(Config::default());
    for key in fixtures::clips::keys() {
        let json = fixtures::clips::json(&key).unwrap();
        engine.load_clip_json(&json).unwrap();
    }
    assert_eq!(engine.clips().len(), 4);
    let walk = engine.clips().find("walk").unwrap();
    assert_eq!(engine.clip(walk).unwrap().frame_count(), 4);
    assert!(engine.clip(walk).unwrap().root_motion().is_some());
}

#[test]
fn malformed_json_is_a_config_error() {
    let mut engine = Engine::new(Config::default());
    let err = engine.load_clip_json("{\"name\": \"broken\"}").unwrap_err();
    assert!(matches!(err, BlendError::InvalidJson(_)));
    assert_eq!(err.category(), "config");
}

#[test]
fn walk_layer_writes_bound_pose_and_root_motion() {
    let mut engine = Engine::new(Config::default());
    let walk = load(&mut engine, "walk");
    let layer = engine.create_layer("locomotion", biped_binding());
    let leaf = engine.add_leaf(layer, LeafCfg::looping("walk", walk)).unwrap();
    engine.play(layer, leaf).unwrap();

    let out = engine.update(DT, Inputs::default());
    assert_eq!(fired(out), vec!["footstep_left"]);
    // Hips drives root motion and is not part of the pose.
    assert!(out.changes.iter().all(|c| c.target_hash != name_hash("Hips")));
    assert_eq!(out.changes.len(), 3);
    for change in &out.changes {
        assert_eq!(change.layer, layer);
        assert_eq!(change.values.len(), change.kind.required_count());
        if change.kind == ChannelKind::Rotation {
            let len = change.values.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert_abs_diff_eq!(len, 1.0, epsilon = 1e-5);
        }
    }
    let spine = out
        .changes
        .iter()
        .find(|c| c.target_hash == name_hash("Spine"))
        .unwrap();
    assert_eq!(spine.slot, OutputSlot(1));

    let delta = out.root_motion_for(layer).unwrap();
    assert_abs_diff_eq!(delta[0], 0.25, epsilon = 1e-4);

    let mut travelled = delta[0];
    for _ in 0..11 {
        travelled += engine.update(DT, Inputs::default()).root_motion_for(layer).unwrap()[0];
    }
    // Three laps at one metre per lap.
    assert_abs_diff_eq!(travelled, 3.0, epsilon = 1e-3);
}

#[test]
fn mirrored_walk_swaps_sides_and_heads_the_other_way() {
    let mut engine = Engine::new(Config::default());
    let walk = load(&mut engine, "walk");
    let mirrored = engine.load_mirrored_clip(walk, "walk_mirrored").unwrap();

    let base = engine.create_layer("base", biped_binding());
    let flip = engine.create_layer("flip", biped_binding());
    let a = engine.add_leaf(base, LeafCfg::looping("walk", walk)).unwrap();
    let b = engine.add_leaf(flip, LeafCfg::looping("walk_mirrored", mirrored)).unwrap();
    engine.play(base, a).unwrap();
    engine.play(flip, b).unwrap();

    let out = engine.update(DT, Inputs::default());
    let base_changes: Vec<_> = out.changes.iter().filter(|c| c.layer == base).cloned().collect();
    let flip_changes: Vec<_> = out.changes.iter().filter(|c| c.layer == flip).cloned().collect();
    let left = base_changes
        .iter()
        .find(|c| c.target_hash == name_hash("LeftUpperLeg"))
        .unwrap();
    let right = flip_changes
        .iter()
        .find(|c| c.target_hash == name_hash("RightUpperLeg"))
        .unwrap();
    // Rotation about X survives mirroring (only Y and Z flip).
    for (l, r) in left.values.iter().zip(&right.values) {
        assert_abs_diff_eq!(*l, *r, epsilon = 1e-6);
    }

    let forward = out.root_motion_for(base).unwrap();
    let backward = out.root_motion_for(flip).unwrap();
    assert_abs_diff_eq!(forward[0], -backward[0], epsilon = 1e-6);
    assert!(backward[0] < 0.0);
}

#[test]
fn blended_locomotion_cross_fades_to_idle() {
    let mut engine = Engine::new(Config::default());
    let walk = load(&mut engine, "walk");
    let run = load(&mut engine, "run");
    let idle = load(&mut engine, "idle");
    let layer = engine.create_layer("locomotion", biped_binding());
    engine.declare_weight(layer, "walk", 1.0).unwrap();
    engine.declare_weight(layer, "run", 0.0).unwrap();
    let w = engine.add_leaf(layer, LeafCfg::looping("walk", walk)).unwrap();
    let r = engine.add_leaf(layer, LeafCfg::looping("run", run)).unwrap();
    let i = engine.add_leaf(layer, LeafCfg::looping("idle", idle)).unwrap();
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
        .unwrap();
    engine.play(layer, gait).unwrap();

    let out = engine.update(
        DT,
        Inputs {
            weight_updates: vec![WeightUpdate {
                layer,
                name: "run".into(),
                value: 1.0,
            }],
            ..Inputs::default()
        },
    );
    assert!(out.events.iter().all(|e| !matches!(e, CoreEvent::Diagnostic { .. })));
    let spine = rotation_of(out, "Spine").unwrap();
    let len = spine.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert_abs_diff_eq!(len, 1.0, epsilon = 1e-5);

    let out = engine.update(
        DT,
        Inputs {
            layer_cmds: vec![LayerCommand::CrossFade {
                layer,
                node: i,
                duration: 0.1,
            }],
            ..Inputs::default()
        },
    );
    assert!(!out.events.iter().any(|e| matches!(e, CoreEvent::TransitionCompleted { .. })));

    let mut completed = false;
    for _ in 0..5 {
        let out = engine.update(DT, Inputs::default());
        completed |= out
            .events
            .iter()
            .any(|e| matches!(e, CoreEvent::TransitionCompleted { node, .. } if *node == i));
    }
    assert!(completed);
    assert_eq!(engine.layer(layer).unwrap().root(), Some(i));

    // Idle has no root motion and only animates Spine and Smile.
    let out = engine.update(DT, Inputs::default());
    assert_eq!(out.root_motion_for(layer), Some([0.0; 3]));
    assert_eq!(out.changes.len(), 2);
    assert_eq!(rotation_of(out, "Spine"), Some(vec![0.0, 0.0, 0.0, 1.0]));
}

#[test]
fn wave_auto_advances_back_to_idle() {
    let mut engine = Engine::new(Config::default());
    let idle = load(&mut engine, "idle");
    let wave = load(&mut engine, "wave");
    let layer = engine.create_layer("upper", biped_binding());
    let i = engine.add_leaf(layer, LeafCfg::looping("idle", idle)).unwrap();
    let w = engine.add_leaf(layer, LeafCfg::once("wave", wave)).unwrap();
    engine.set_next_state(layer, w, NextState::Advance(i)).unwrap();
    engine.play(layer, w).unwrap();

    let mut peaks = 0;
    let mut advanced = None;
    for _ in 0..20 {
        let out = engine.update(0.1, Inputs::default());
        peaks += fired(out).iter().filter(|n| *n == "wave_peak").count();
        for e in &out.events {
            if let CoreEvent::AutoAdvanced { from, to, .. } = e {
                advanced = Some((*from, *to));
            }
        }
    }
    assert_eq!(peaks, 1);
    assert_eq!(advanced, Some((w, i)));
    assert_eq!(engine.layer(layer).unwrap().root(), Some(i));
}

#[test]
fn failed_commands_surface_as_error_events() {
    let mut engine = Engine::new(Config::default());
    let idle = load(&mut engine, "idle");
    let layer = engine.create_layer("face", biped_binding());
    let i = engine.add_leaf(layer, LeafCfg::looping("idle", idle)).unwrap();

    let out = engine.update(
        DT,
        Inputs {
            layer_cmds: vec![
                LayerCommand::Play {
                    layer: LayerId(99),
                    node: i,
                },
                LayerCommand::Play { layer, node: i },
                LayerCommand::SetSpeed { layer, speed: 0.5 },
            ],
            weight_updates: vec![WeightUpdate {
                layer,
                name: "missing".into(),
                value: 1.0,
            }],
        },
    );
    let errors = out
        .events
        .iter()
        .filter(|e| matches!(e, CoreEvent::Error { .. }))
        .count();
    assert_eq!(errors, 2);
    // The valid commands still applied.
    assert_eq!(out.changes.len(), 2);
    assert_eq!(engine.layer(layer).unwrap().context().speed(), 0.5);
}
