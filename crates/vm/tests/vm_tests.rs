//! Integration tests for the Patchlang VM.
//!
//! Scripts are compiled from memory and run in a world with a
//! [`RecordingStage`], so every `log` line and presentation verb can be
//! checked. Organized by concern:
//! - Expressions and control flow
//! - Scoping and functions
//! - Messaging, traps and the respond pass
//! - The scene tree
//! - Limits and the stage boundary

use patchlang_common::{EntityId, Opcode, Value};
use patchlang_compiler::MemorySource;
use patchlang_vm::{ErrorClass, Operand, PlayheadState, RecordingStage, RuntimeConfig, World};
use proptest::prelude::*;

// ---- Test helpers ----

fn config() -> RuntimeConfig {
    RuntimeConfig {
        seed: Some(7),
        ..RuntimeConfig::default()
    }
}

fn world_with(scripts: &[(&str, &str)], config: RuntimeConfig) -> World<RecordingStage> {
    let source = scripts
        .iter()
        .fold(MemorySource::new(), |source, (name, text)| source.with(name, text));
    World::with_stage(source, config, RecordingStage::new())
}

/// Spawn `main` as the root and run it for `frames` frames.
fn run_scripts(scripts: &[(&str, &str)], frames: u64) -> World<RecordingStage> {
    let mut world = world_with(scripts, config());
    world.spawn_root("main").unwrap();
    world.run(frames).unwrap();
    world
}

fn run_main(text: &str, frames: u64) -> World<RecordingStage> {
    run_scripts(&[("main", text)], frames)
}

fn lines(world: &World<RecordingStage>) -> Vec<String> {
    world.stage().lines().into_iter().map(str::to_string).collect()
}

fn labels(world: &World<RecordingStage>) -> Vec<&str> {
    world.errors().iter().map(|report| report.label.as_str()).collect()
}

// ---- Expressions and control flow ----

#[test]
fn arithmetic_follows_precedence() {
    let world = run_main(
        "start\nlog (2 + 3 * 4)\nlog (-5 + 3) (3 - (-5))\nlog (2 ^ 3 ^ 2)\nend",
        1,
    );
    assert_eq!(lines(&world), vec!["14", "-2 8", "512"]);
}

#[test]
fn unary_minus_applies_to_variables() {
    let world = run_main("start\nsetvar x 4\nlog (-x * 2)\nend", 1);
    assert_eq!(lines(&world), vec!["-8"]);
}

#[test]
fn while_loop_counts() {
    let world = run_main(
        "start\nsetvar i 0\nsetvar total 0\nwhile (i < 5)\nset i ++\nset total += i\nendwhile\nlog total\nend",
        1,
    );
    assert_eq!(lines(&world), vec!["15"]);
}

#[test]
fn repeat_runs_body_n_times() {
    let world = run_main("start\nsetvar n 1\nrepeat 4\nset n *= 2\nendrepeat\nlog n\nend", 1);
    assert_eq!(lines(&world), vec!["16"]);
}

#[test]
fn loop_with_wait_exits_after_frames() {
    let mut world = world_with(
        &[(
            "main",
            "start\nsetvar n 0\nloop\nset n ++\nwait 1\njump done if n 3 >=\nendloop\nlabel done\nlog n\nend",
        )],
        config(),
    );
    let root = world.spawn_root("main").unwrap();

    world.run(3).unwrap();
    assert!(lines(&world).is_empty());
    world.run(1).unwrap();
    assert_eq!(lines(&world), vec!["3"]);
    assert!(world.entity(root).unwrap().scripts().is_empty());
}

#[test]
fn wait_spans_whole_frames() {
    let mut world = world_with(&[("main", "start\nlog a\nwait 2\nlog b\nend")], config());
    world.spawn_root("main").unwrap();
    world.tick().unwrap();
    world.tick().unwrap();
    assert_eq!(lines(&world), vec!["a"]);
    world.tick().unwrap();
    assert_eq!(lines(&world), vec!["a", "b"]);
}

#[test]
fn fork_starts_a_playhead_in_the_same_frame() {
    let world = run_main("start\nfork side\nlog main\nend\nlabel side\nlog side\nend", 1);
    assert_eq!(lines(&world), vec!["main", "side"]);
}

#[test]
fn stopscripts_halts_other_playheads() {
    let world = run_main("start\nstopscripts\nend\nstart\nwait 1\nlog late\nend", 3);
    assert!(lines(&world).is_empty());
}

#[test]
fn stopall_finishes_the_world() {
    let mut world = world_with(&[("main", "start\nstopall\nlog never\nend")], config());
    world.spawn_root("main").unwrap();
    assert_eq!(world.run(10), Ok(1));
    assert!(world.is_finished());
    assert!(lines(&world).is_empty());
}

#[test]
fn included_code_runs_at_its_rebased_addresses() {
    let world = run_scripts(
        &[
            ("helper", "setvar k 0\nrepeat 3\nset k ++\nendrepeat\nlog k"),
            ("main", "start\nlog 1\ninclude helper\nlog 2\nend"),
        ],
        1,
    );
    assert_eq!(lines(&world), vec!["1", "3", "2"]);
}

#[test]
fn included_repeat_inside_repeat_keeps_both_counts() {
    let world = run_scripts(
        &[
            ("lib", "repeat 3\nwait 0\nendrepeat"),
            ("main", "start\nrepeat 2\nlog tick\ninclude lib\nendrepeat\nlog done\nend"),
        ],
        20,
    );
    assert_eq!(lines(&world), vec!["tick", "tick", "done"]);
}

// ---- Scoping and functions ----

#[test]
fn locals_shadow_attributes() {
    let world = run_main(
        "start\nsetattribute hp 10\nsetvar hp 1\nlog hp\ngetattribute _self hp a\nlog a\nend",
        1,
    );
    assert_eq!(lines(&world), vec!["1", "10"]);
}

#[test]
fn set_writes_through_to_attributes_and_globals() {
    let mut world = world_with(
        &[("main", "start\nsetattribute score 0\nset score 5\nset _sfx_vol 40\nset fresh 1\nend")],
        config(),
    );
    let root = world.spawn_root("main").unwrap();
    world.tick().unwrap();

    assert_eq!(world.attribute(root, "score"), Some(&Value::Integer(5)));
    assert_eq!(world.global("_sfx_vol"), Some(&Value::Integer(40)));
    assert_eq!(world.attribute(root, "fresh"), None);
}

#[test]
fn recursive_function_sums() {
    let world = run_main(
        "def sum n\nif n <= 0\nreturn 0\nendif\nsum n=(n - 1)\nreturn (n + _return)\nstart\nsum n=3\nlog _return\nend",
        1,
    );
    assert_eq!(lines(&world), vec!["6"]);
    assert!(world.errors().is_empty());
}

#[test]
fn calls_keep_the_callers_temporaries() {
    let world = run_main(
        "def f\nsetvar q (2 + 3)\nreturn 7\nstart\nsetvar a 10\nlog (a + 1) {f}\nend",
        1,
    );
    assert_eq!(lines(&world), vec!["11 7"]);
    assert!(world.errors().is_empty());
}

#[test]
fn parameter_defaults_and_missing_arguments() {
    let world = run_main(
        "def area w h=2\nreturn (w * h)\nstart\narea w=5\nlog _return\narea\nlog _return\nend",
        1,
    );
    assert_eq!(lines(&world), vec!["10", "0"]);
}

#[test]
fn call_depth_is_limited() {
    let mut world = world_with(
        &[(
            "main",
            "def sum n\nif n <= 0\nreturn 0\nendif\nsum n=(n - 1)\nreturn (n + _return)\nstart\nsum n=3\nlog _return\nend",
        )],
        RuntimeConfig {
            max_call_depth: 2,
            ..config()
        },
    );
    world.spawn_root("main").unwrap();
    world.tick().unwrap();
    assert_eq!(labels(&world), vec!["call_depth_exceeded"]);
    assert!(lines(&world).is_empty());
}

// ---- Messaging and traps ----

#[test]
fn broadcast_is_handled_next_frame() {
    let mut world = world_with(
        &[
            ("echo", "receive \"ping\"\nlog child\nend"),
            (
                "main",
                "start\ninstance echo _self\nbroadcast \"PING\" 7\nend\nreceive \"ping\"\nlog _message_data\nend",
            ),
        ],
        config(),
    );
    world.spawn_root("main").unwrap();

    world.tick().unwrap();
    assert!(lines(&world).is_empty());
    world.tick().unwrap();
    assert_eq!(lines(&world), vec!["7", "child"]);
}

#[test]
fn unicast_reaches_only_its_target() {
    let world = run_scripts(
        &[
            ("echo", "receive \"hi\"\nlog got\nend"),
            (
                "main",
                "start\ninstance echo _self a\ninstance echo _self b\nunicast b \"hi\"\nend",
            ),
        ],
        2,
    );
    assert_eq!(lines(&world), vec!["got"]);
    assert_eq!(world.stage().printed[0].0, EntityId(2));
}

#[test]
fn host_broadcast_reaches_scripts() {
    let mut world = world_with(&[("main", "receive \"go\"\nlog _message_data\nend")], config());
    world.spawn_root("main").unwrap();
    world.broadcast("go", Value::from("now"));
    world.tick().unwrap();
    world.tick().unwrap();
    assert_eq!(lines(&world), vec!["now"]);
}

#[test]
fn trap_receives_the_error_label() {
    let mut world = world_with(
        &[("main", "start\nsetvar x (1 / 0)\nlog unreachable\nend\ntrap\nlog _error_type\nend")],
        config(),
    );
    let root = world.spawn_root("main").unwrap();
    world.tick().unwrap();

    assert_eq!(lines(&world), vec!["division_by_zero"]);
    let report = &world.errors()[0];
    assert_eq!(report.class, ErrorClass::Runtime);
    assert_eq!(report.entity, Some(root));
    assert_eq!(report.code, "eval _t0_ 1 0 /");
    assert!(world.entity(root).is_ok());
}

#[test]
fn errors_inside_a_trap_are_not_trapped_again() {
    let world = run_main("start\nlog (1 / 0)\nend\ntrap\nlog (nope + 1)\nend", 2);
    assert_eq!(labels(&world), vec!["division_by_zero", "undefined_variable"]);
}

#[test]
fn hidden_errors_are_still_recorded() {
    let world = run_main("start\nsetattribute _hide_errors 1\nlog (q + 1)\nend", 1);
    assert_eq!(labels(&world), vec!["undefined_variable"]);
}

// ---- Scene tree ----

#[test]
fn instance_supplies_attributes() {
    let world = run_scripts(
        &[
            ("leaf", "start\nwait 1\nend"),
            ("main", "start\ninstance leaf _self c hp=5 _x=3\nend"),
        ],
        1,
    );
    let child = world.preorder()[1];
    assert_eq!(world.attribute(child, "hp"), Some(&Value::Integer(5)));
    assert_eq!(world.attribute(child, "_x"), Some(&Value::Integer(3)));
    assert_eq!(world.attribute(child, "_ignore_pause"), Some(&Value::Integer(0)));
    assert_eq!(world.entity(child).unwrap().parent, world.root());
}

#[test]
fn delete_removes_the_subtree() {
    let mut world = world_with(
        &[
            ("leaf", "start\nwait 5\nend"),
            (
                "main",
                "start\ninstance leaf _self a\ninstance leaf a\nwait 1\ndelete a\nend",
            ),
        ],
        config(),
    );
    world.spawn_root("main").unwrap();
    world.tick().unwrap();
    assert_eq!(world.entity_count(), 3);
    world.tick().unwrap();
    assert_eq!(world.entity_count(), 1);
    assert!(world.errors().is_empty());
}

#[test]
fn self_delete_stops_every_playhead() {
    let world = run_scripts(
        &[
            ("leaf", "start\ndelete\nlog after\nend\nstart\nlog other\nend"),
            ("main", "start\ninstance leaf _self\nend"),
        ],
        2,
    );
    assert!(lines(&world).is_empty());
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn root_cannot_be_deleted_or_adopted() {
    let world = run_main("start\ndelete\nend\nstart\nadopt _self\nend", 1);
    assert_eq!(labels(&world), vec!["invalid_delete", "invalid_adoption"]);
    assert!(world.root().is_some());
}

#[test]
fn adopt_moves_a_grandchild() {
    let world = run_scripts(
        &[
            ("leaf", "start\nwait 1\nend"),
            ("main", "start\ninstance leaf _self a\ninstance leaf a g\nadopt g\nend"),
        ],
        1,
    );
    let root = world.root().unwrap();
    let children = world.entity(root).unwrap().children.clone();
    assert_eq!(children.len(), 2);
    let a = children[0];
    assert!(world.entity(a).unwrap().children.is_empty());
    assert_eq!(world.entity(children[1]).unwrap().parent, Some(root));
}

#[test]
fn changelayer_reorders_children() {
    let world = run_scripts(
        &[
            ("leaf", "start\nwait 1\nend"),
            (
                "main",
                "start\ninstance leaf _self x\ninstance leaf _self y\ninstance leaf _self z\nchangelayer x front\nend",
            ),
        ],
        1,
    );
    let root = world.root().unwrap();
    let order: Vec<u64> = world
        .entity(root)
        .unwrap()
        .children
        .iter()
        .map(|id| id.0)
        .collect();
    assert_eq!(order, vec![2, 3, 1]);
}

#[test]
fn changelayer_wraps_huge_shifts() {
    let world = run_scripts(
        &[
            ("leaf", "start\nwait 1\nend"),
            (
                "main",
                "start\ninstance leaf _self a\ninstance leaf _self b\nchangelayer b 9223372036854775807\nlog moved\nchangelayer a (0 - 9223372036854775806)\nlog again\nend",
            ),
        ],
        1,
    );
    assert_eq!(lines(&world), vec!["moved", "again"]);
    assert!(world.errors().is_empty());
    let root = world.root().unwrap();
    let order: Vec<u64> = world
        .entity(root)
        .unwrap()
        .children
        .iter()
        .map(|id| id.0)
        .collect();
    assert_eq!(order, vec![2, 1]);
}

#[test]
fn paused_entities_do_not_tick() {
    let mut world = world_with(
        &[
            ("main", "start\nend"),
            ("counter", "start\nsetattribute ticks 0\nloop\nset ticks ++\nwait 1\nendloop"),
        ],
        config(),
    );
    let root = world.spawn_root("main").unwrap();
    let counter = world.instance("counter", root, vec![]).unwrap();

    world.set_global("_paused", Value::Integer(1));
    world.run(3).unwrap();
    assert_eq!(world.attribute(counter, "ticks"), None);

    world.set_global("_paused", Value::Integer(0));
    world.run(2).unwrap();
    assert_eq!(world.attribute(counter, "ticks"), Some(&Value::Integer(2)));
}

#[test]
fn missing_instance_script_is_fatal() {
    let mut world = world_with(&[("main", "start\ninstance ghost _self\nend")], config());
    world.spawn_root("main").unwrap();
    let err = world.tick().unwrap_err();
    assert_eq!(err.label(), "missing_script");
    assert!(world.is_finished());
    assert_eq!(world.errors()[0].class, ErrorClass::Load);
}

// ---- Limits and the stage ----

#[test]
fn runaway_playhead_hits_step_budget() {
    let mut world = world_with(
        &[("main", "start\nlabel top\njump top\n")],
        RuntimeConfig {
            max_steps_per_tick: 1_000,
            ..config()
        },
    );
    let root = world.spawn_root("main").unwrap();
    world.tick().unwrap();
    assert_eq!(labels(&world), vec!["step_budget_exceeded"]);
    assert!(world.entity(root).unwrap().scripts().is_empty());
}

#[test]
fn seeded_random_is_reproducible() {
    let script = "start\nrandom 1 100 a\nrandom 100 1 b\nlog a b\nend";
    let first = run_main(script, 1);
    let second = run_main(script, 1);
    assert_eq!(lines(&first), lines(&second));
    for word in lines(&first)[0].split(' ') {
        let n: i64 = word.parse().unwrap();
        assert!((1..=100).contains(&n));
    }
}

#[test]
fn presentation_verbs_reach_the_stage() {
    let source = MemorySource::new().with(
        "main",
        "start\ndraw rect 1 2 3 4\ncollide hit wall\nlog _return\nend",
    );
    let stage = RecordingStage::new().respond_with(Opcode::Collide, Value::Integer(1));
    let mut world = World::with_stage(source, config(), stage);
    let root = world.spawn_root("main").unwrap();
    world.tick().unwrap();

    let draws: Vec<_> = world.stage().calls_of(Opcode::Draw).collect();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].entity, root);
    assert_eq!(draws[0].operands[0], Operand::Word("rect".into()));
    assert_eq!(draws[0].operands[1], Operand::Value(Value::Integer(1)));
    assert_eq!(lines(&world), vec!["1"]);
}

#[test]
fn stage_failures_are_runtime_errors() {
    let source = MemorySource::new().with("main", "start\nsound boom\nlog after\nend");
    let stage = RecordingStage::new().fail_with(Opcode::Sound, "no audio device");
    let mut world = World::with_stage(source, config(), stage);
    world.spawn_root("main").unwrap();
    world.tick().unwrap();

    assert_eq!(labels(&world), vec!["stage_error"]);
    assert!(world.errors()[0].info.contains("no audio device"));
    assert!(lines(&world).is_empty());
}

#[test]
fn movement_updates_local_and_global_position() {
    let world = run_main("start\nsetposition 10 4\ntranslate 2 -1\nend", 1);
    let root = world.root().unwrap();
    assert_eq!(world.attribute(root, "_x"), Some(&Value::Integer(12)));
    assert_eq!(world.attribute(root, "_y"), Some(&Value::Integer(3)));
    assert_eq!(world.attribute(root, "_global_x"), Some(&Value::Integer(12)));
}

#[test]
fn finished_playheads_are_dropped() {
    let world = run_main("start\nend\nstart\nwait 3\nend", 1);
    let root = world.root().unwrap();
    let scripts = world.entity(root).unwrap().scripts();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts.playheads()[0].state(), PlayheadState::Running);
}

// ---- Properties ----

proptest! {
    /// Exactly one arm of an if/elif/else chain runs.
    #[test]
    fn exactly_one_branch_runs(x in -50i64..50) {
        let script = format!(
            "start\nsetvar x {x}\nif x < 0\nlog 1\nelif x == 0\nlog 2\nelse\nlog 3\nendif\nend"
        );
        let world = run_main(&script, 1);
        let expected = if x < 0 { "1" } else if x == 0 { "2" } else { "3" };
        prop_assert_eq!(lines(&world), vec![expected.to_string()]);
    }

    /// A list literal logs as its items joined by spaces and reports its length.
    #[test]
    fn array_literals_round_trip(items in prop::collection::vec(0i64..1000, 1..6)) {
        let literal = items.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        let script = format!("start\nsetvar xs [{literal}]\nlog xs\nlog (len xs)\nend");
        let world = run_main(&script, 1);
        let joined = items.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        prop_assert_eq!(lines(&world), vec![joined, items.len().to_string()]);
    }

    /// `repeat n` runs its body exactly n times for non-negative n.
    #[test]
    fn repeat_count_is_exact(n in 0i64..20) {
        let script = format!("start\nsetvar c 0\nrepeat {n}\nset c ++\nendrepeat\nlog c\nend");
        let world = run_main(&script, 1);
        prop_assert_eq!(lines(&world), vec![n.to_string()]);
    }
}
