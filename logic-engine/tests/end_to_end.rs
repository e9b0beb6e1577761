//! End-to-end scenarios exercising a complete `Engine<R>` against a tiny mock
//! scripting runtime and a `RefCell`-backed mock host node, in place of a real
//! sandboxed runtime and a real scene graph.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;

use approx::assert_relative_eq;

use logic_core::algebra::UnitQuaternion;
use logic_engine::{
    CreateConfig, Engine, EngineError, HostAppearanceHandle, HostBindingError, HostNodeHandle, OptionValue,
    PropertyType, PropertyValue, RotationMode, ScriptEnvironment, ScriptValue, ScriptingRuntime, TypeSchema,
    VersionTag,
};
use logic_script::{CompileError, CompiledChunk, InterfaceSchema, ScriptRuntimeError};

/// A compiled script chunk, tagged by which of the handful of behaviors in
/// [`MockRuntime::run_entry`] it implements.
#[derive(Debug, Clone)]
struct MockChunk {
    kind: String,
}

impl CompiledChunk for MockChunk {}

/// The sandbox the mock runtime hands a script: a flat `IN`/`OUT` table keyed by
/// leaf path. `write_input`/`read_output` are the only `ScriptEnvironment` methods
/// the engine itself calls; `run_entry` below reads `inputs`/writes `outputs`
/// directly since it owns the concrete type.
#[derive(Debug, Default)]
struct MockEnv {
    inputs: BTreeMap<Vec<String>, ScriptValue>,
    outputs: BTreeMap<Vec<String>, ScriptValue>,
}

impl ScriptEnvironment for MockEnv {
    fn write_input(&mut self, path: &[String], value: ScriptValue) {
        self.inputs.insert(path.to_vec(), value);
    }

    fn read_output(&self, path: &[String]) -> Option<ScriptValue> {
        self.outputs.get(path).cloned()
    }
}

fn read_bool(env: &MockEnv, path: &[&str]) -> bool {
    match env.inputs.get(&path.iter().map(|s| s.to_string()).collect::<Vec<_>>()) {
        Some(ScriptValue::Bool(v)) => *v,
        _ => false,
    }
}

fn read_string(env: &MockEnv, path: &[&str]) -> String {
    match env.inputs.get(&path.iter().map(|s| s.to_string()).collect::<Vec<_>>()) {
        Some(ScriptValue::String(v)) => v.clone(),
        _ => String::new(),
    }
}

/// A handful of fixed script "kinds", recognized by source text, standing in for a
/// real compiler: string concatenation, boolean passthrough, and the dirty-chain
/// trigger node used by the scheduling scenario.
struct MockRuntime;

impl ScriptingRuntime for MockRuntime {
    type Chunk = MockChunk;
    type Env = MockEnv;

    fn compile(&mut self, source: &str, _config: &CreateConfig) -> Result<MockChunk, CompileError> {
        match source {
            "concat" | "bool_passthrough" | "chain_trigger" => Ok(MockChunk { kind: source.to_string() }),
            other => Err(CompileError {
                message: format!("unknown script kind '{other}'"),
            }),
        }
    }

    fn new_environment(&mut self, _config: &CreateConfig) -> MockEnv {
        MockEnv::default()
    }

    fn run_interface(&mut self, chunk: &MockChunk, _env: &mut MockEnv) -> Result<InterfaceSchema, ScriptRuntimeError> {
        Ok(match chunk.kind.as_str() {
            "concat" => InterfaceSchema {
                inputs: TypeSchema::strukt(
                    "IN",
                    vec![
                        TypeSchema::leaf("s1", PropertyType::String),
                        TypeSchema::leaf("s2", PropertyType::String),
                    ],
                ),
                outputs: TypeSchema::strukt("OUT", vec![TypeSchema::leaf("out", PropertyType::String)]),
            },
            "bool_passthrough" => InterfaceSchema {
                inputs: TypeSchema::strukt("IN", vec![TypeSchema::leaf("in", PropertyType::Bool)]),
                outputs: TypeSchema::strukt("OUT", vec![TypeSchema::leaf("out", PropertyType::Bool)]),
            },
            "chain_trigger" => InterfaceSchema {
                inputs: TypeSchema::strukt(
                    "IN",
                    vec![
                        TypeSchema::leaf("trigger", PropertyType::Bool),
                        TypeSchema::leaf("upstream", PropertyType::Bool),
                    ],
                ),
                outputs: TypeSchema::strukt("OUT", vec![TypeSchema::leaf("out", PropertyType::Bool)]),
            },
            other => {
                return Err(ScriptRuntimeError {
                    message: format!("no interface for '{other}'"),
                })
            }
        })
    }

    fn run_entry(&mut self, chunk: &MockChunk, env: &mut MockEnv) -> Result<(), ScriptRuntimeError> {
        match chunk.kind.as_str() {
            "concat" => {
                let s1 = read_string(env, &["s1"]);
                let s2 = read_string(env, &["s2"]);
                env.outputs.insert(vec!["out".to_string()], ScriptValue::String(format!("{s1}{s2}")));
            }
            "bool_passthrough" => {
                let v = read_bool(env, &["in"]);
                env.outputs.insert(vec!["out".to_string()], ScriptValue::Bool(v));
            }
            "chain_trigger" => {
                let trigger = read_bool(env, &["trigger"]);
                let upstream = read_bool(env, &["upstream"]);
                env.outputs.insert(vec!["out".to_string()], ScriptValue::Bool(trigger ^ upstream));
            }
            other => {
                return Err(ScriptRuntimeError {
                    message: format!("no run entry for '{other}'"),
                })
            }
        }
        Ok(())
    }
}

fn named_script(engine: &mut Engine<MockRuntime>, source: &str, name: &str) -> logic_engine::NodeId {
    let mut options = BTreeMap::new();
    options.insert("name".to_string(), OptionValue::Name(name.to_string()));
    engine.create_script(source, &options).expect("script compiles")
}

/// Shared mutable state behind a [`HostNodeHandle`], so a test can observe what the
/// engine wrote after the `Box<dyn HostNodeHandle>` itself has been moved in.
#[derive(Debug, Clone)]
struct NodeState {
    visibility: bool,
    translation: (f32, f32, f32),
    scaling: (f32, f32, f32),
    rotation_quat: UnitQuaternion<f32>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            visibility: true,
            translation: (0.0, 0.0, 0.0),
            scaling: (1.0, 1.0, 1.0),
            rotation_quat: UnitQuaternion::identity(),
        }
    }
}

#[derive(Debug)]
struct MockHostNode(Rc<RefCell<NodeState>>);

impl HostNodeHandle for MockHostNode {
    fn visibility(&self) -> bool {
        self.0.borrow().visibility
    }

    fn set_visibility(&mut self, value: bool) {
        self.0.borrow_mut().visibility = value;
    }

    fn euler_rotation_if(&self, _order: RotationMode) -> Option<(f32, f32, f32)> {
        None
    }

    fn translation(&self) -> (f32, f32, f32) {
        self.0.borrow().translation
    }

    fn scaling(&self) -> (f32, f32, f32) {
        self.0.borrow().scaling
    }

    fn set_visibility_translation_scaling(&mut self, translation: (f32, f32, f32), scaling: (f32, f32, f32)) {
        let mut state = self.0.borrow_mut();
        state.translation = translation;
        state.scaling = scaling;
    }

    fn set_rotation_quaternion(&mut self, quat: UnitQuaternion<f32>) {
        self.0.borrow_mut().rotation_quat = quat;
    }
}

/// Shared mutable state behind a [`HostAppearanceHandle`], mirroring two uniforms of
/// a fictional shader material.
#[derive(Debug, Default, Clone)]
struct AppearanceState {
    color: (f32, f32, f32, f32),
    roughness: f32,
}

#[derive(Debug)]
struct MockHostAppearance(Rc<RefCell<AppearanceState>>);

impl HostAppearanceHandle for MockHostAppearance {
    fn uniform_schema(&self) -> TypeSchema {
        TypeSchema::strukt(
            "IN",
            vec![
                TypeSchema::leaf("color", PropertyType::Vec4F),
                TypeSchema::leaf("roughness", PropertyType::Float),
            ],
        )
    }

    fn set_uniform(&mut self, name: &str, value: &PropertyValue) -> Result<(), HostBindingError> {
        let mut state = self.0.borrow_mut();
        match (name, value) {
            ("color", PropertyValue::Vec4F(r, g, b, a)) => state.color = (*r, *g, *b, *a),
            ("roughness", PropertyValue::Float(v)) => state.roughness = *v,
            (other, _) => {
                return Err(HostBindingError::InvariantViolated(format!("unknown uniform '{other}'")))
            }
        }
        Ok(())
    }
}

#[test]
fn linear_chain_concatenates_in_topological_order() {
    let mut engine = Engine::new(MockRuntime);
    let s1 = named_script(&mut engine, "concat", "S1");
    let s2 = named_script(&mut engine, "concat", "S2");
    let s3 = named_script(&mut engine, "concat", "S3");

    let s1_out = engine.child(engine.output_root(s1).unwrap(), "out").unwrap();
    let s2_in_s1 = engine.child(engine.input_root(s2).unwrap(), "s1").unwrap();
    let s2_out = engine.child(engine.output_root(s2).unwrap(), "out").unwrap();
    let s3_in_s1 = engine.child(engine.input_root(s3).unwrap(), "s1").unwrap();

    engine.link(s1_out, s2_in_s1).unwrap();
    engine.link(s2_out, s3_in_s1).unwrap();

    engine
        .set(engine.child(engine.input_root(s1).unwrap(), "s2").unwrap(), "Script1".to_string())
        .unwrap();
    engine
        .set(engine.child(engine.input_root(s2).unwrap(), "s2").unwrap(), "Script2".to_string())
        .unwrap();
    engine
        .set(engine.child(engine.input_root(s3).unwrap(), "s2").unwrap(), "Script3".to_string())
        .unwrap();

    engine.update().unwrap();

    let s3_out = engine.child(engine.output_root(s3).unwrap(), "out").unwrap();
    assert_eq!(engine.get::<String>(s3_out), Some("Script1Script2Script3".to_string()));
}

#[test]
fn cycle_is_refused_and_save_is_refused_too() {
    let mut engine = Engine::new(MockRuntime);
    let a = named_script(&mut engine, "bool_passthrough", "A");
    let b = named_script(&mut engine, "bool_passthrough", "B");
    let c = named_script(&mut engine, "bool_passthrough", "C");

    let a_out = engine.child(engine.output_root(a).unwrap(), "out").unwrap();
    let b_in = engine.child(engine.input_root(b).unwrap(), "in").unwrap();
    let b_out = engine.child(engine.output_root(b).unwrap(), "out").unwrap();
    let c_in = engine.child(engine.input_root(c).unwrap(), "in").unwrap();
    let c_out = engine.child(engine.output_root(c).unwrap(), "out").unwrap();
    let a_in = engine.child(engine.input_root(a).unwrap(), "in").unwrap();

    engine.link(a_out, b_in).unwrap();
    engine.link(b_out, c_in).unwrap();
    engine.link(c_out, a_in).unwrap();

    let err = engine.update().unwrap_err();
    assert!(matches!(err, EngineError::Cycle(_)));

    let err = engine
        .save_to_buffer(VersionTag::default(), VersionTag::default())
        .unwrap_err();
    assert!(matches!(err, EngineError::Serialization(_)));
}

#[test]
fn binding_write_back_is_gated_on_explicit_change() {
    let mut engine = Engine::new(MockRuntime);
    let state = Rc::new(RefCell::new(NodeState {
        translation: (1.0, 2.0, 3.0),
        ..NodeState::default()
    }));
    let host = MockHostNode(state.clone());
    let node = engine.create_node_binding(Box::new(host), "Cube", 1, RotationMode::EulerXYZ, "CubeBinding");

    engine.update().unwrap();
    engine.update().unwrap();
    assert_eq!(state.borrow().translation, (1.0, 2.0, 3.0));

    let translation_prop = engine.child(engine.input_root(node).unwrap(), "translation").unwrap();
    engine.set(translation_prop, (4.0_f32, 5.0_f32, 6.0_f32)).unwrap();
    engine.update().unwrap();
    assert_eq!(state.borrow().translation, (4.0, 5.0, 6.0));
}

#[test]
fn appearance_binding_write_back_is_gated_on_explicit_change() {
    let mut engine = Engine::new(MockRuntime);
    let state = Rc::new(RefCell::new(AppearanceState::default()));
    let host = MockHostAppearance(state.clone());
    let node = engine.create_appearance_binding(Box::new(host), "Material", 1, "MaterialBinding");

    // No property was ever set, so nothing should reach the host yet.
    engine.update().unwrap();
    engine.update().unwrap();
    assert_eq!(state.borrow().roughness, 0.0);
    assert_eq!(state.borrow().color, (0.0, 0.0, 0.0, 0.0));

    let roughness_prop = engine.child(engine.input_root(node).unwrap(), "roughness").unwrap();
    engine.set(roughness_prop, 0.25_f32).unwrap();
    engine.update().unwrap();
    assert_eq!(state.borrow().roughness, 0.25);

    // Re-running `update()` without changing the value again must not call
    // `set_uniform` a second time; flip the host's own copy to detect a stray write.
    state.borrow_mut().roughness = 999.0;
    engine.update().unwrap();
    assert_eq!(state.borrow().roughness, 999.0);

    let color_prop = engine.child(engine.input_root(node).unwrap(), "color").unwrap();
    engine.set(color_prop, (1.0_f32, 0.5_f32, 0.25_f32, 1.0_f32)).unwrap();
    engine.update().unwrap();
    assert_eq!(state.borrow().color, (1.0, 0.5, 0.25, 1.0));
}

#[test]
fn dirty_scheduling_only_runs_the_affected_suffix_or_the_whole_chain() {
    const CHAIN_LEN: usize = 100;
    let mut engine = Engine::new(MockRuntime);

    let nodes: Vec<_> = (0..CHAIN_LEN)
        .map(|i| named_script(&mut engine, "chain_trigger", &format!("Chain{i}")))
        .collect();

    for pair in nodes.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        let prev_out = engine.child(engine.output_root(prev).unwrap(), "out").unwrap();
        let next_upstream = engine.child(engine.input_root(next).unwrap(), "upstream").unwrap();
        engine.link(prev_out, next_upstream).unwrap();
    }

    engine.update().unwrap();

    // Flip only the last node's trigger: nothing downstream of it exists, so only
    // that one node should execute.
    engine.enable_update_report(true);
    let last_trigger = engine.child(engine.input_root(*nodes.last().unwrap()).unwrap(), "trigger").unwrap();
    engine.set(last_trigger, true).unwrap();
    engine.update().unwrap();
    let report = engine.last_update_report().unwrap();
    assert_eq!(report.executions.len(), 1);
    assert_eq!(report.executions[0].0, *nodes.last().unwrap());

    // Flip the first node's trigger: the change must cascade through every link in
    // a single `update()` call, so all 100 nodes execute, in chain order.
    let first_trigger = engine.child(engine.input_root(nodes[0]).unwrap(), "trigger").unwrap();
    engine.set(first_trigger, true).unwrap();
    engine.update().unwrap();
    let report = engine.last_update_report().unwrap();
    assert_eq!(report.executions.len(), CHAIN_LEN);
    let executed: Vec<_> = report.executions.iter().map(|(id, _)| *id).collect();
    assert_eq!(executed, nodes);
}

#[test]
fn timer_enforces_monotonicity() {
    let mut engine = Engine::new(MockRuntime);
    let timer = engine.create_timer("Timer");

    let ticker_in = engine.child(engine.input_root(timer).unwrap(), "tickerUs").unwrap();
    let delta_out = engine.child(engine.output_root(timer).unwrap(), "timeDelta").unwrap();
    let ticker_out = engine.child(engine.output_root(timer).unwrap(), "tickerUs").unwrap();

    engine.set(ticker_in, 1_000_000_i64).unwrap();
    engine.update().unwrap();
    assert_eq!(engine.get::<f32>(delta_out), Some(0.0));
    assert_eq!(engine.get::<i64>(ticker_out), Some(1_000_000));

    engine.set(ticker_in, 1_500_000_i64).unwrap();
    engine.update().unwrap();
    assert_relative_eq!(engine.get::<f32>(delta_out).unwrap(), 0.5);
    assert_eq!(engine.get::<i64>(ticker_out), Some(1_500_000));

    engine.set(ticker_in, 1_499_999_i64).unwrap();
    let err = engine.update().unwrap_err();
    assert!(matches!(err, EngineError::UpdateInput(_)));
}

#[test]
fn quaternion_rotation_converts_to_host_axis_convention() {
    let mut engine = Engine::new(MockRuntime);
    let state = Rc::new(RefCell::new(NodeState::default()));
    let host = MockHostNode(state.clone());
    let node = engine.create_node_binding(Box::new(host), "Cube", 1, RotationMode::Quaternion, "QuatBinding");

    let rotation_prop = engine.child(engine.input_root(node).unwrap(), "rotation").unwrap();
    // 90 degrees about Z: (x, y, z, w) = (0, 0, sin(45deg), cos(45deg)).
    engine
        .set(rotation_prop, (0.0_f32, 0.0_f32, 0.7071068_f32, 0.7071068_f32))
        .unwrap();
    engine.update().unwrap();

    let (roll, pitch, yaw) = state.borrow().rotation_quat.euler_angles();
    assert_relative_eq!(roll, 0.0, epsilon = 1e-6);
    assert_relative_eq!(pitch, 0.0, epsilon = 1e-6);
    assert_relative_eq!(yaw, FRAC_PI_2, epsilon = 1e-6);
}
