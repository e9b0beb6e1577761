//! The engine: the aggregate that owns every node, the property arena, the link
//! registry and dependency graph, and drives `update()` (spec §4.7).
//!
//! Per the arena-and-handle redesign, nodes themselves are not stored in a `Pool`:
//! [`logic_graph::NodeId`] is already a per-engine monotonic counter, so a plain
//! `FxHashMap<NodeId, NodeRecord>` plus one side table per kind is simpler than
//! threading an extra handle-to-id lookup through a pool. [`PropertyRef`] is the one
//! place a raw arena handle is not enough on its own: it tags a [`PropertyHandle`]
//! with the engine instance that minted it, so a caller accidentally mixing handles
//! from two engines gets `LookupError::ForeignEngine` instead of silent corruption.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use fxhash::FxHashMap;

use logic_core::log::Log;
use logic_core::Handle;
use logic_graph::{DependencyGraph, DirtySet, LinkRegistry, NodeId};
use logic_script::{CreateConfig, ModuleId, PropertyType, ScriptingRuntime, TypeSchema};

use crate::binding::{
    camera_binding_schema, node_binding_schema, should_write_back, AppearanceBindingData,
    CameraBindingData, CameraFrustum, HostAppearanceHandle, HostCameraHandle, HostNodeHandle,
    HostObjectHandle, HostObjectKind, HostSceneResolver, NodeBindingData,
};
use crate::error::{
    CompilationError, DeserializationError, EngineError, HostBindingError, LookupError,
    SerializationError, ValidationError,
};
use crate::format::{
    self, property_to_dto, AnimationChannelDto, AnimationObjectDto, ApiObjectsDto,
    AppearanceBindingObjectDto, CameraBindingObjectDto, DataArrayObjectDto, LinkDto,
    LinkEndpointDto, ModuleObjectDto, NodeBindingObjectDto, PropertyDto, PropertyPath,
    SavedEngineState, ScriptObjectDto, TimerObjectDto, VersionTag,
};
use crate::node::{NodeKind, NodeRecord};
use crate::property::{PropertyHandle, PropertyScalar, PropertyStore, PropertyValue, Semantics};
use crate::rotation::{quat_from_components, RotationMode};
use crate::script_node::{
    parse_create_options, validate_module_dependencies, OptionValue, ScriptNodeData,
};
use crate::special_nodes::{
    interpolate_channel, validate_channel_arity, AnimationChannel, AnimationNodeData,
    DataArrayData, TimerNodeData,
};

/// A property identity scoped to the engine that minted it. Plain [`PropertyHandle`]s
/// carry no notion of which [`Engine`] created them, so every public operation that
/// takes one checks `engine_id` first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PropertyRef {
    engine_id: u64,
    handle: PropertyHandle,
}

/// `(index, generation)` of a [`PropertyHandle`], used as the key type for
/// [`LinkRegistry`] since `Handle<T>` itself has no `Ord` impl.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct PropertyKey(u32, u32);

impl PropertyKey {
    fn of(handle: PropertyHandle) -> Self {
        PropertyKey(handle.index(), handle.generation())
    }

    fn to_handle(self) -> PropertyHandle {
        Handle::new(self.0, self.1)
    }
}

/// One compiled, named module object, reusable by any number of scripts as a
/// dependency (spec §4.4).
struct ModuleRecord<R: ScriptingRuntime> {
    name: String,
    source: String,
    chunk: R::Chunk,
}

/// Per-tick timing breakdown, populated only while [`Engine::enable_update_report`] is on.
#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub executions: Vec<(NodeId, Duration)>,
}

/// Recursively collects every primitive leaf under `root`, paired with its path
/// relative to `root`'s own children (i.e. not including `root`'s own name). This is
/// both the script `IN`/`OUT` sync path and the binding write-back iteration order.
fn collect_leaves(
    store: &PropertyStore,
    node: PropertyHandle,
    prefix: &mut Vec<String>,
    out: &mut Vec<(PropertyHandle, Vec<String>)>,
) {
    let count = store.child_count(node);
    if count == 0 {
        if store.get_value(node).is_some() {
            out.push((node, prefix.clone()));
        }
        return;
    }
    for i in 0..count {
        let child = store.child_at(node, i).unwrap();
        prefix.push(store.name(child).to_string());
        collect_leaves(store, child, prefix, out);
        prefix.pop();
    }
}

fn leaves_under(store: &PropertyStore, root: PropertyHandle) -> Vec<(PropertyHandle, Vec<String>)> {
    let mut out = Vec::new();
    collect_leaves(store, root, &mut Vec::new(), &mut out);
    out
}

/// Walks a property's parent chain to build its root-relative path, root name first
/// (e.g. `["IN", "s1"]`). Used when writing a link endpoint to the binary format.
fn property_path(store: &PropertyStore, handle: PropertyHandle) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = handle;
    loop {
        segments.push(store.name(current).to_string());
        match store.parent(current) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    segments.reverse();
    segments
}

/// The inverse of [`property_path`]: descends from `root` through `rest`, a path with
/// the root's own name segment already stripped off.
fn resolve_path(store: &PropertyStore, root: PropertyHandle, rest: &[String]) -> Option<PropertyHandle> {
    let mut current = root;
    for segment in rest {
        current = store.child_by_name(current, segment)?;
    }
    Some(current)
}

fn rotation_components(value: &PropertyValue) -> Vec<f32> {
    match value {
        PropertyValue::Vec3F(x, y, z) => vec![*x, *y, *z],
        PropertyValue::Vec4F(x, y, z, w) => vec![*x, *y, *z, *w],
        _ => vec![0.0, 0.0, 0.0],
    }
}

fn as_vec3(value: &PropertyValue) -> (f32, f32, f32) {
    match value {
        PropertyValue::Vec3F(x, y, z) => (*x, *y, *z),
        _ => (0.0, 0.0, 0.0),
    }
}

fn as_i32(value: &PropertyValue) -> i32 {
    match value {
        PropertyValue::Int32(v) => *v,
        _ => 0,
    }
}

fn as_f32(value: &PropertyValue) -> f32 {
    match value {
        PropertyValue::Float(v) => *v,
        _ => 0.0,
    }
}

/// The engine: owns every node, the property arena, and drives update/link/save/load
/// (spec §4.7). Generic over the embedded scripting runtime so the engine itself never
/// depends on any one scripting language.
pub struct Engine<R: ScriptingRuntime> {
    engine_id: u64,
    runtime: R,
    properties: PropertyStore,
    node_records: FxHashMap<NodeId, NodeRecord>,
    scripts: FxHashMap<NodeId, ScriptNodeData<R::Chunk, R::Env>>,
    node_bindings: FxHashMap<NodeId, NodeBindingData>,
    appearance_bindings: FxHashMap<NodeId, AppearanceBindingData>,
    camera_bindings: FxHashMap<NodeId, CameraBindingData>,
    data_arrays: FxHashMap<NodeId, DataArrayData>,
    animations: FxHashMap<NodeId, AnimationNodeData>,
    timers: FxHashMap<NodeId, TimerNodeData>,
    modules: FxHashMap<ModuleId, ModuleRecord<R>>,
    graph: DependencyGraph,
    link_registry: LinkRegistry<PropertyKey>,
    dirty: DirtySet,
    dirty_tracking_enabled: bool,
    errors: Vec<EngineError>,
    report_enabled: bool,
    last_report: Option<UpdateReport>,
    next_node_id: u64,
    next_module_id: u64,
    next_creation_id: u64,
    start_instant: Instant,
}

impl<R: ScriptingRuntime> Engine<R> {
    pub fn new(runtime: R) -> Self {
        static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);
        let engine_id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        Log::info(format!("engine {engine_id} created"));
        Self {
            engine_id,
            runtime,
            properties: PropertyStore::new(),
            node_records: FxHashMap::default(),
            scripts: FxHashMap::default(),
            node_bindings: FxHashMap::default(),
            appearance_bindings: FxHashMap::default(),
            camera_bindings: FxHashMap::default(),
            data_arrays: FxHashMap::default(),
            animations: FxHashMap::default(),
            timers: FxHashMap::default(),
            modules: FxHashMap::default(),
            graph: DependencyGraph::new(),
            link_registry: LinkRegistry::new(),
            dirty: DirtySet::new(),
            dirty_tracking_enabled: true,
            errors: Vec::new(),
            report_enabled: false,
            last_report: None,
            next_node_id: 1,
            next_module_id: 1,
            next_creation_id: 1,
            start_instant: Instant::now(),
        }
    }

    // -- error accumulation ------------------------------------------------------

    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    pub fn take_errors(&mut self) -> Vec<EngineError> {
        std::mem::take(&mut self.errors)
    }

    fn fail(&mut self, e: impl Into<EngineError>) -> EngineError {
        let e = e.into();
        self.errors.push(e.clone());
        e
    }

    fn alloc_node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn next_creation_id(&mut self) -> u64 {
        let id = self.next_creation_id;
        self.next_creation_id += 1;
        id
    }

    fn wrap(&self, handle: PropertyHandle) -> PropertyRef {
        PropertyRef {
            engine_id: self.engine_id,
            handle,
        }
    }

    fn insert_node(
        &mut self,
        id: NodeId,
        name: String,
        kind: NodeKind,
        in_root: Option<PropertyHandle>,
        out_root: Option<PropertyHandle>,
    ) {
        let creation_id = self.next_creation_id();
        let record = NodeRecord {
            name,
            id,
            kind,
            in_root,
            out_root,
            creation_id,
        };
        if kind.is_schedulable() {
            self.graph.add_node(id, record.order_key());
        }
        self.node_records.insert(id, record);
    }

    fn mark_dirty(&mut self, id: NodeId) {
        self.dirty.mark(id);
    }

    // -- property navigation ------------------------------------------------------

    pub fn input_root(&self, node: NodeId) -> Option<PropertyRef> {
        self.node_records.get(&node)?.in_root.map(|h| self.wrap(h))
    }

    pub fn output_root(&self, node: NodeId) -> Option<PropertyRef> {
        self.node_records.get(&node)?.out_root.map(|h| self.wrap(h))
    }

    pub fn child(&self, prop: PropertyRef, name: &str) -> Option<PropertyRef> {
        if prop.engine_id != self.engine_id {
            return None;
        }
        self.properties.child_by_name(prop.handle, name).map(|h| self.wrap(h))
    }

    pub fn child_at(&self, prop: PropertyRef, index: usize) -> Option<PropertyRef> {
        if prop.engine_id != self.engine_id {
            return None;
        }
        self.properties.child_at(prop.handle, index).map(|h| self.wrap(h))
    }

    pub fn child_count(&self, prop: PropertyRef) -> usize {
        if prop.engine_id != self.engine_id {
            return 0;
        }
        self.properties.child_count(prop.handle)
    }

    pub fn property_type(&self, prop: PropertyRef) -> Option<PropertyType> {
        if prop.engine_id != self.engine_id {
            return None;
        }
        Some(self.properties.ty(prop.handle).clone())
    }

    pub fn property_name(&self, prop: PropertyRef) -> Option<&str> {
        if prop.engine_id != self.engine_id {
            return None;
        }
        Some(self.properties.name(prop.handle))
    }

    pub fn get<T: PropertyScalar>(&self, prop: PropertyRef) -> Option<T> {
        if prop.engine_id != self.engine_id {
            return None;
        }
        self.properties.get(prop.handle)
    }

    pub fn set<T: PropertyScalar>(&mut self, prop: PropertyRef, value: T) -> Result<(), EngineError> {
        self.errors.clear();
        if prop.engine_id != self.engine_id {
            return Err(self.fail(LookupError::ForeignEngine));
        }
        if !self.properties.is_valid(prop.handle) {
            return Err(self.fail(LookupError::UnknownProperty));
        }
        let is_linked = self.link_registry.has_incoming(PropertyKey::of(prop.handle));
        self.properties
            .set(prop.handle, value, is_linked)
            .map_err(|e| self.fail(e))?;
        let owner = self.properties.owner(prop.handle);
        self.mark_dirty(owner);
        Ok(())
    }

    pub fn is_property_linked(&self, prop: PropertyRef) -> bool {
        prop.engine_id == self.engine_id && self.link_registry.has_incoming(PropertyKey::of(prop.handle))
    }

    pub fn is_node_linked(&self, node: NodeId) -> bool {
        let Some(record) = self.node_records.get(&node) else {
            return false;
        };
        for root in [record.in_root, record.out_root].into_iter().flatten() {
            for (handle, _) in leaves_under(&self.properties, root) {
                if self.link_registry.touches(PropertyKey::of(handle)) {
                    return true;
                }
            }
        }
        false
    }

    // -- linking -------------------------------------------------------------------

    pub fn link(&mut self, src: PropertyRef, dst: PropertyRef) -> Result<(), EngineError> {
        self.errors.clear();
        if src.engine_id != self.engine_id || dst.engine_id != self.engine_id {
            return Err(self.fail(ValidationError::DifferentEngines));
        }
        if !self.properties.is_valid(src.handle) || !self.properties.is_valid(dst.handle) {
            return Err(self.fail(LookupError::UnknownProperty));
        }

        let src_owner = self.properties.owner(src.handle);
        let dst_owner = self.properties.owner(dst.handle);
        if src_owner == dst_owner {
            return Err(self.fail(ValidationError::SameNode));
        }
        let src_is_output = matches!(self.properties.semantics(src.handle), Semantics::ScriptOutput);
        let dst_is_output = matches!(self.properties.semantics(dst.handle), Semantics::ScriptOutput);
        // Same-category pairs (input->input, output->output) get their own error kind;
        // a reversed pair (input src, output dst) still blames whichever side caused it.
        if src_is_output == dst_is_output {
            return Err(self.fail(ValidationError::WrongDirection));
        }
        if !src_is_output {
            return Err(self.fail(ValidationError::NotAnOutput));
        }
        if dst_is_output {
            return Err(self.fail(ValidationError::NotAnInput));
        }
        if self.properties.get_value(src.handle).is_none() || self.properties.get_value(dst.handle).is_none() {
            return Err(self.fail(ValidationError::ContainerNotAllowed));
        }
        if self.properties.ty(src.handle) != self.properties.ty(dst.handle) {
            return Err(self.fail(ValidationError::TypeMismatch {
                expected: format!("{:?}", self.properties.ty(dst.handle)),
                found: format!("{:?}", self.properties.ty(src.handle)),
            }));
        }

        let src_key = PropertyKey::of(src.handle);
        let dst_key = PropertyKey::of(dst.handle);
        if self.link_registry.link(src_key, dst_key).is_err() {
            return Err(self.fail(ValidationError::AlreadyLinked));
        }

        self.properties.mark_linked(dst.handle);
        self.graph.add_edge(src_owner, dst_owner);
        self.mark_dirty(src_owner);
        self.mark_dirty(dst_owner);
        Ok(())
    }

    pub fn unlink(&mut self, src: PropertyRef, dst: PropertyRef) -> Result<(), EngineError> {
        self.errors.clear();
        if src.engine_id != self.engine_id || dst.engine_id != self.engine_id {
            return Err(self.fail(ValidationError::DifferentEngines));
        }
        let src_key = PropertyKey::of(src.handle);
        let dst_key = PropertyKey::of(dst.handle);
        if self.link_registry.unlink(src_key, dst_key).is_err() {
            return Err(self.fail(ValidationError::NotCurrentlyLinked));
        }
        let src_owner = self.properties.owner(src.handle);
        let dst_owner = self.properties.owner(dst.handle);
        self.graph.remove_edge(src_owner, dst_owner);
        self.mark_dirty(src_owner);
        self.mark_dirty(dst_owner);
        // Per the fixed open-question answer, unlink alone never clears write_back_flag.
        Ok(())
    }

    fn propagate_output(&mut self, src_handle: PropertyHandle, changed: bool) {
        let key = PropertyKey::of(src_handle);
        let Some(value) = self.properties.get_value(src_handle).cloned() else {
            return;
        };
        let targets: Vec<PropertyKey> = self.link_registry.outgoing_of(key).collect();
        for target_key in targets {
            let target_handle = target_key.to_handle();
            self.properties.set_value_unchecked(target_handle, value.clone());
            if changed {
                let owner = self.properties.owner(target_handle);
                self.mark_dirty(owner);
            }
        }
    }

    // -- module / script creation ---------------------------------------------------

    pub fn create_module(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<ModuleId, EngineError> {
        self.errors.clear();
        let source = source.into();
        let config = CreateConfig::default();
        let chunk = self.runtime.compile(&source, &config).map_err(|e| {
            Log::err(format!("module compilation rejected: {}", e.message));
            self.fail(CompilationError::Rejected(e.message))
        })?;
        let id = ModuleId(self.next_module_id);
        self.next_module_id += 1;
        self.modules.insert(
            id,
            ModuleRecord {
                name: name.into(),
                source,
                chunk,
            },
        );
        Ok(id)
    }

    pub fn create_script(
        &mut self,
        source: impl Into<String>,
        options: &BTreeMap<String, OptionValue>,
    ) -> Result<NodeId, EngineError> {
        self.errors.clear();
        let source = source.into();
        let config = parse_create_options(options).map_err(|e| self.fail(e))?;
        validate_module_dependencies(&source, &config).map_err(|e| self.fail(e))?;
        let chunk = self.runtime.compile(&source, &config).map_err(|e| {
            Log::err(format!("script compilation rejected: {}", e.message));
            self.fail(CompilationError::Rejected(e.message))
        })?;
        let mut env = self.runtime.new_environment(&config);
        let schema = self
            .runtime
            .run_interface(&chunk, &mut env)
            .map_err(|e| self.fail(CompilationError::Rejected(e.message)))?;

        let id = self.alloc_node_id();
        let in_root = self.properties.build_from_schema(id, Semantics::ScriptInput, None, &schema.inputs);
        let out_root = self.properties.build_from_schema(id, Semantics::ScriptOutput, None, &schema.outputs);
        let name = config.name.clone().unwrap_or_else(|| format!("Script{}", id.raw()));
        let dependencies = config.dependencies.clone();
        self.insert_node(id, name, NodeKind::Script, Some(in_root), Some(out_root));
        self.scripts.insert(
            id,
            ScriptNodeData {
                source,
                chunk,
                env,
                dependencies,
            },
        );
        self.mark_dirty(id);
        Ok(id)
    }

    // -- binding creation ------------------------------------------------------------

    pub fn create_node_binding(
        &mut self,
        host: Box<dyn HostNodeHandle>,
        host_name: impl Into<String>,
        host_id: u64,
        rotation_mode: RotationMode,
        name: impl Into<String>,
    ) -> NodeId {
        let host_name = host_name.into();
        let id = self.alloc_node_id();
        let schema = node_binding_schema(rotation_mode);
        let in_root = self.properties.build_from_schema(id, Semantics::BindingInput, None, &schema);

        let visibility_h = self.properties.child_by_name(in_root, "visibility").unwrap();
        let rotation_h = self.properties.child_by_name(in_root, "rotation").unwrap();
        let translation_h = self.properties.child_by_name(in_root, "translation").unwrap();
        let scaling_h = self.properties.child_by_name(in_root, "scaling").unwrap();

        self.properties
            .set_value_unchecked(visibility_h, PropertyValue::Bool(host.visibility()));
        let (tx, ty, tz) = host.translation();
        self.properties
            .set_value_unchecked(translation_h, PropertyValue::Vec3F(tx, ty, tz));
        let (sx, sy, sz) = host.scaling();
        self.properties
            .set_value_unchecked(scaling_h, PropertyValue::Vec3F(sx, sy, sz));

        if rotation_mode == RotationMode::Quaternion {
            self.properties
                .set_value_unchecked(rotation_h, PropertyValue::Vec4F(0.0, 0.0, 0.0, 1.0));
        } else {
            match host.euler_rotation_if(rotation_mode) {
                Some((x, y, z)) => {
                    self.properties.set_value_unchecked(rotation_h, PropertyValue::Vec3F(x, y, z));
                }
                None => {
                    self.properties
                        .set_value_unchecked(rotation_h, PropertyValue::Vec3F(0.0, 0.0, 0.0));
                    Log::warn(format!(
                        "node binding '{host_name}': host rotation is not expressed as {rotation_mode:?}; seeding zero rotation"
                    ));
                }
            }
        }

        self.insert_node(id, name.into(), NodeKind::NodeBinding, Some(in_root), None);
        self.node_bindings.insert(
            id,
            NodeBindingData {
                host,
                host_name,
                host_id,
                rotation_mode,
            },
        );
        self.mark_dirty(id);
        id
    }

    pub fn create_appearance_binding(
        &mut self,
        host: Box<dyn HostAppearanceHandle>,
        host_name: impl Into<String>,
        host_id: u64,
        name: impl Into<String>,
    ) -> NodeId {
        let id = self.alloc_node_id();
        let schema = host.uniform_schema();
        let in_root = self.properties.build_from_schema(id, Semantics::BindingInput, None, &schema);
        self.insert_node(id, name.into(), NodeKind::AppearanceBinding, Some(in_root), None);
        self.appearance_bindings.insert(
            id,
            AppearanceBindingData {
                host,
                host_name: host_name.into(),
                host_id,
            },
        );
        self.mark_dirty(id);
        id
    }

    pub fn create_camera_binding(
        &mut self,
        host: Box<dyn HostCameraHandle>,
        host_name: impl Into<String>,
        host_id: u64,
        name: impl Into<String>,
    ) -> NodeId {
        let id = self.alloc_node_id();
        let is_orthographic = host.is_orthographic();
        let schema = camera_binding_schema(is_orthographic);
        let in_root = self.properties.build_from_schema(id, Semantics::BindingInput, None, &schema);
        self.insert_node(id, name.into(), NodeKind::CameraBinding, Some(in_root), None);
        self.camera_bindings.insert(
            id,
            CameraBindingData {
                host,
                host_name: host_name.into(),
                host_id,
                is_orthographic,
            },
        );
        self.mark_dirty(id);
        id
    }

    // -- special node creation --------------------------------------------------------

    pub fn create_data_array(
        &mut self,
        element_type: PropertyType,
        values: Vec<PropertyValue>,
        name: impl Into<String>,
    ) -> Result<NodeId, EngineError> {
        self.errors.clear();
        let data = DataArrayData::new(element_type, values).map_err(|e| self.fail(e))?;
        let id = self.alloc_node_id();
        self.insert_node(id, name.into(), NodeKind::DataArray, None, None);
        self.data_arrays.insert(id, data);
        Ok(id)
    }

    fn validate_animation_channels(&self, channels: &[AnimationChannel]) -> Result<(), EngineError> {
        for channel in channels {
            let timestamps = self
                .data_arrays
                .get(&channel.timestamps)
                .ok_or(EngineError::Lookup(LookupError::UnknownNode))?;
            if timestamps.element_type != PropertyType::Float {
                return Err(EngineError::Validation(ValidationError::TypeMismatch {
                    expected: "float".to_string(),
                    found: format!("{:?}", timestamps.element_type),
                }));
            }
            let keyframes = self
                .data_arrays
                .get(&channel.keyframes)
                .ok_or(EngineError::Lookup(LookupError::UnknownNode))?;
            let tin = channel.tangents_in.and_then(|id| self.data_arrays.get(&id)).map(|d| d.len());
            let tout = channel.tangents_out.and_then(|id| self.data_arrays.get(&id)).map(|d| d.len());
            validate_channel_arity(channel, timestamps.len(), keyframes.len(), tin, tout)
                .map_err(EngineError::Validation)?;
        }
        Ok(())
    }

    pub fn create_animation_node(
        &mut self,
        channels: Vec<AnimationChannel>,
        name: impl Into<String>,
    ) -> Result<NodeId, EngineError> {
        self.errors.clear();
        if let Err(e) = self.validate_animation_channels(&channels) {
            self.errors.push(e.clone());
            return Err(e);
        }

        let id = self.alloc_node_id();
        let in_schema = TypeSchema::strukt("IN", vec![TypeSchema::leaf("progress", PropertyType::Float)]);
        let in_root = self.properties.build_from_schema(id, Semantics::ScriptInput, None, &in_schema);
        let out_children: Vec<TypeSchema> = channels
            .iter()
            .map(|c| TypeSchema::leaf(c.name.clone(), self.data_arrays[&c.keyframes].element_type.clone()))
            .collect();
        let out_schema = TypeSchema::strukt("OUT", out_children);
        let out_root = self.properties.build_from_schema(id, Semantics::ScriptOutput, None, &out_schema);

        self.insert_node(id, name.into(), NodeKind::AnimationNode, Some(in_root), Some(out_root));
        self.animations.insert(id, AnimationNodeData { channels });
        self.mark_dirty(id);
        Ok(id)
    }

    pub fn create_timer(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.alloc_node_id();
        let in_schema = TypeSchema::strukt("IN", vec![TypeSchema::leaf("tickerUs", PropertyType::Int64)]);
        let in_root = self.properties.build_from_schema(id, Semantics::ScriptInput, None, &in_schema);
        let out_schema = TypeSchema::strukt(
            "OUT",
            vec![
                TypeSchema::leaf("timeDelta", PropertyType::Float),
                TypeSchema::leaf("tickerUs", PropertyType::Int64),
            ],
        );
        let out_root = self.properties.build_from_schema(id, Semantics::ScriptOutput, None, &out_schema);
        self.insert_node(id, name.into(), NodeKind::TimerNode, Some(in_root), Some(out_root));
        self.timers.insert(id, TimerNodeData::new());
        self.mark_dirty(id);
        id
    }

    // -- destruction -------------------------------------------------------------------

    pub fn destroy(&mut self, id: NodeId) -> Result<(), EngineError> {
        self.errors.clear();
        let Some(record) = self.node_records.remove(&id) else {
            return Err(self.fail(LookupError::UnknownNode));
        };
        for root in [record.in_root, record.out_root].into_iter().flatten() {
            for (handle, _) in leaves_under(&self.properties, root) {
                self.link_registry.remove_all_touching(PropertyKey::of(handle));
            }
            self.properties.destroy_tree(root);
        }
        self.graph.remove_node(id);
        self.dirty.forget(id);
        self.scripts.remove(&id);
        self.node_bindings.remove(&id);
        self.appearance_bindings.remove(&id);
        self.camera_bindings.remove(&id);
        self.data_arrays.remove(&id);
        self.animations.remove(&id);
        self.timers.remove(&id);
        Ok(())
    }

    // -- lookup --------------------------------------------------------------------------

    pub fn find_by_name(&self, kind: NodeKind, name: &str) -> Option<NodeId> {
        self.node_records
            .values()
            .find(|r| r.kind == kind && r.name == name)
            .map(|r| r.id)
    }

    pub fn find_by_id(&self, id: NodeId) -> Option<NodeId> {
        self.node_records.contains_key(&id).then_some(id)
    }

    // -- update ----------------------------------------------------------------------------

    pub fn enable_update_report(&mut self, enabled: bool) {
        self.report_enabled = enabled;
        if !enabled {
            self.last_report = None;
        }
    }

    pub fn last_update_report(&self) -> Option<&UpdateReport> {
        self.last_report.as_ref()
    }

    pub fn set_dirty_tracking_enabled(&mut self, enabled: bool) {
        self.dirty_tracking_enabled = enabled;
    }

    fn execute_node(&mut self, id: NodeId) -> Result<(), EngineError> {
        let kind = self.node_records[&id].kind;
        match kind {
            NodeKind::Script => self.run_script(id).map_err(EngineError::from),
            NodeKind::NodeBinding => self.run_node_binding(id).map_err(EngineError::from),
            NodeKind::AppearanceBinding => self.run_appearance_binding(id).map_err(EngineError::from),
            NodeKind::CameraBinding => self.run_camera_binding(id).map_err(EngineError::from),
            NodeKind::AnimationNode => self.run_animation_node(id),
            NodeKind::TimerNode => self.run_timer(id).map_err(EngineError::from),
            NodeKind::DataArray => Ok(()),
        }
    }

    pub fn update(&mut self) -> Result<(), EngineError> {
        self.errors.clear();
        let order: Vec<NodeId> = match self.graph.topological_order() {
            Ok(o) => o.to_vec(),
            Err(_) => return Err(self.fail(crate::error::CycleDetected)),
        };
        let mut report = self.report_enabled.then(UpdateReport::default);

        // Dirtiness is checked per node as we walk the cached order, not snapshotted
        // up front: a node's execution can mark a later node in this same `order`
        // dirty via `propagate_output`, and that cascade must still run within this
        // tick (spec §4.3 - dirty propagation, not just next-tick pickup).
        for node_id in order {
            if self.dirty_tracking_enabled && !self.dirty.is_dirty(node_id) {
                continue;
            }
            let start = Instant::now();
            let result = self.execute_node(node_id);
            if let Some(r) = report.as_mut() {
                r.executions.push((node_id, start.elapsed()));
            }
            match result {
                Ok(()) => self.dirty.clear(node_id),
                Err(e) => {
                    let node_name = self
                        .node_records
                        .get(&node_id)
                        .map(|r| r.name.as_str())
                        .unwrap_or("<unknown>");
                    Log::err(format!(
                        "update aborted: node '{node_name}' ({}) failed: {e}",
                        node_id.raw()
                    ));
                    let reported = self.fail(e);
                    if let Some(r) = report {
                        self.last_report = Some(r);
                    }
                    return Err(reported);
                }
            }
        }

        if let Some(r) = report {
            self.last_report = Some(r);
        }
        Ok(())
    }

    fn run_script(&mut self, id: NodeId) -> Result<(), crate::error::RuntimeError> {
        let record = &self.node_records[&id];
        let in_root = record.in_root.unwrap();
        let out_root = record.out_root.unwrap();
        let in_leaves = leaves_under(&self.properties, in_root);
        let out_leaves = leaves_under(&self.properties, out_root);

        let data = self.scripts.get_mut(&id).unwrap();
        for (handle, path) in &in_leaves {
            if let Some(value) = self.properties.get_value(*handle).cloned() {
                data.env.write_input(path, value.into());
            }
        }

        self.runtime
            .run_entry(&data.chunk, &mut data.env)
            .map_err(|e| crate::error::RuntimeError { node: id, message: e.message })?;

        let data = self.scripts.get(&id).unwrap();
        let mut updates = Vec::new();
        for (handle, path) in &out_leaves {
            if let Some(script_value) = data.env.read_output(path) {
                updates.push((*handle, PropertyValue::from(script_value)));
            }
        }
        for (handle, new_value) in updates {
            let old = self.properties.get_value(handle).cloned();
            let changed = old.as_ref() != Some(&new_value);
            self.properties.set_value_unchecked(handle, new_value);
            self.propagate_output(handle, changed);
        }
        Ok(())
    }

    fn run_node_binding(&mut self, id: NodeId) -> Result<(), HostBindingError> {
        let record = &self.node_records[&id];
        let in_root = record.in_root.unwrap();
        let visibility_h = self.properties.child_by_name(in_root, "visibility").unwrap();
        let rotation_h = self.properties.child_by_name(in_root, "rotation").unwrap();
        let translation_h = self.properties.child_by_name(in_root, "translation").unwrap();
        let scaling_h = self.properties.child_by_name(in_root, "scaling").unwrap();

        let rotation_mode = self.node_bindings[&id].rotation_mode;

        let visibility_val = self.properties.get_value(visibility_h).cloned().unwrap();
        let translation_val = self.properties.get_value(translation_h).cloned().unwrap();
        let scaling_val = self.properties.get_value(scaling_h).cloned().unwrap();
        let rotation_val = self.properties.get_value(rotation_h).cloned().unwrap();

        let visibility_changed = should_write_back(
            self.properties.write_back_flag(visibility_h),
            &visibility_val,
            self.properties.last_written_to_host(visibility_h),
        );
        let transform_changed = should_write_back(
            self.properties.write_back_flag(translation_h),
            &translation_val,
            self.properties.last_written_to_host(translation_h),
        ) || should_write_back(
            self.properties.write_back_flag(scaling_h),
            &scaling_val,
            self.properties.last_written_to_host(scaling_h),
        );
        let rotation_changed = should_write_back(
            self.properties.write_back_flag(rotation_h),
            &rotation_val,
            self.properties.last_written_to_host(rotation_h),
        );

        let binding = self.node_bindings.get_mut(&id).unwrap();

        if visibility_changed {
            if let PropertyValue::Bool(v) = visibility_val {
                binding.host.set_visibility(v);
            }
            self.properties.record_written_to_host(visibility_h, visibility_val.clone());
        }
        if transform_changed {
            binding
                .host
                .set_visibility_translation_scaling(as_vec3(&translation_val), as_vec3(&scaling_val));
            self.properties.record_written_to_host(translation_h, translation_val.clone());
            self.properties.record_written_to_host(scaling_h, scaling_val.clone());
        }
        if rotation_changed {
            let components = rotation_components(&rotation_val);
            let quat = quat_from_components(&components, rotation_mode);
            binding.host.set_rotation_quaternion(quat);
            self.properties.record_written_to_host(rotation_h, rotation_val.clone());
        }
        Ok(())
    }

    fn run_appearance_binding(&mut self, id: NodeId) -> Result<(), HostBindingError> {
        let record = &self.node_records[&id];
        let in_root = record.in_root.unwrap();
        let leaves = leaves_under(&self.properties, in_root);

        for (handle, path) in leaves {
            let value = self.properties.get_value(handle).cloned().unwrap();
            let changed = should_write_back(
                self.properties.write_back_flag(handle),
                &value,
                self.properties.last_written_to_host(handle),
            );
            if changed {
                let uniform_name = path.last().cloned().unwrap_or_default();
                let binding = self.appearance_bindings.get_mut(&id).unwrap();
                binding.host.set_uniform(&uniform_name, &value)?;
                self.properties.record_written_to_host(handle, value);
            }
        }
        Ok(())
    }

    fn run_camera_binding(&mut self, id: NodeId) -> Result<(), HostBindingError> {
        let record = &self.node_records[&id];
        let in_root = record.in_root.unwrap();
        let viewport_root = self.properties.child_by_name(in_root, "viewport").unwrap();
        let frustum_root = self.properties.child_by_name(in_root, "frustum").unwrap();

        let viewport_leaves = leaves_under(&self.properties, viewport_root);
        let viewport_changed = viewport_leaves.iter().any(|(h, _)| {
            let value = self.properties.get_value(*h).cloned().unwrap();
            should_write_back(self.properties.write_back_flag(*h), &value, self.properties.last_written_to_host(*h))
        });
        if viewport_changed {
            let ox = as_i32(self.properties.get_value(self.properties.child_by_name(viewport_root, "offsetX").unwrap()).unwrap());
            let oy = as_i32(self.properties.get_value(self.properties.child_by_name(viewport_root, "offsetY").unwrap()).unwrap());
            let w = as_i32(self.properties.get_value(self.properties.child_by_name(viewport_root, "width").unwrap()).unwrap());
            let h = as_i32(self.properties.get_value(self.properties.child_by_name(viewport_root, "height").unwrap()).unwrap());
            let binding = self.camera_bindings.get_mut(&id).unwrap();
            binding.host.set_viewport(ox, oy, w, h);
            for (handle, _) in &viewport_leaves {
                let value = self.properties.get_value(*handle).cloned().unwrap();
                self.properties.record_written_to_host(*handle, value);
            }
        }

        let frustum_leaves = leaves_under(&self.properties, frustum_root);
        let frustum_changed = frustum_leaves.iter().any(|(h, _)| {
            let value = self.properties.get_value(*h).cloned().unwrap();
            should_write_back(self.properties.write_back_flag(*h), &value, self.properties.last_written_to_host(*h))
        });
        if frustum_changed {
            let is_orthographic = self.camera_bindings[&id].is_orthographic;
            let get_f = |name: &str| -> f32 {
                as_f32(
                    self.properties
                        .get_value(self.properties.child_by_name(frustum_root, name).unwrap())
                        .unwrap(),
                )
            };
            let frustum = if is_orthographic {
                CameraFrustum::Orthographic {
                    near_plane: get_f("nearPlane"),
                    far_plane: get_f("farPlane"),
                    left_plane: get_f("leftPlane"),
                    right_plane: get_f("rightPlane"),
                    bottom_plane: get_f("bottomPlane"),
                    top_plane: get_f("topPlane"),
                }
            } else {
                CameraFrustum::Perspective {
                    near_plane: get_f("nearPlane"),
                    far_plane: get_f("farPlane"),
                    field_of_view: get_f("fieldOfView"),
                    aspect_ratio: get_f("aspectRatio"),
                }
            };
            let binding = self.camera_bindings.get_mut(&id).unwrap();
            binding.host.set_frustum(frustum);
            for (handle, _) in &frustum_leaves {
                let value = self.properties.get_value(*handle).cloned().unwrap();
                self.properties.record_written_to_host(*handle, value);
            }
        }
        Ok(())
    }

    fn run_animation_node(&mut self, id: NodeId) -> Result<(), EngineError> {
        let record = &self.node_records[&id];
        let in_root = record.in_root.unwrap();
        let out_root = record.out_root.unwrap();
        let progress_h = self.properties.child_by_name(in_root, "progress").unwrap();
        let progress = as_f32(self.properties.get_value(progress_h).unwrap());

        let channels = self.animations[&id].channels.clone();
        for channel in &channels {
            let timestamps_f: Vec<f32> = self.data_arrays[&channel.timestamps]
                .values
                .iter()
                .map(as_f32)
                .collect();
            let keyframes = self.data_arrays[&channel.keyframes].values.clone();
            let tangents_in = channel.tangents_in.map(|i| self.data_arrays[&i].values.clone());
            let tangents_out = channel.tangents_out.map(|i| self.data_arrays[&i].values.clone());

            let value = interpolate_channel(
                progress,
                &timestamps_f,
                &keyframes,
                channel.interpolation,
                tangents_in.as_deref(),
                tangents_out.as_deref(),
            )
            .map_err(EngineError::Validation)?;

            let out_h = self.properties.child_by_name(out_root, &channel.name).unwrap();
            let old = self.properties.get_value(out_h).cloned();
            let changed = old.as_ref() != Some(&value);
            self.properties.set_value_unchecked(out_h, value);
            self.propagate_output(out_h, changed);
        }
        Ok(())
    }

    fn run_timer(&mut self, id: NodeId) -> Result<(), crate::error::UpdateInputError> {
        let record = &self.node_records[&id];
        let in_root = record.in_root.unwrap();
        let out_root = record.out_root.unwrap();
        let ticker_in_h = self.properties.child_by_name(in_root, "tickerUs").unwrap();
        let delta_h = self.properties.child_by_name(out_root, "timeDelta").unwrap();
        let ticker_out_h = self.properties.child_by_name(out_root, "tickerUs").unwrap();

        let raw_ticker: i64 = self.properties.get(ticker_in_h).unwrap_or(0);
        let effective_ticker = if raw_ticker == 0 {
            self.start_instant.elapsed().as_micros() as i64
        } else {
            raw_ticker
        };

        let timer = self.timers.get_mut(&id).unwrap();
        let (delta, ticker_us) = timer.tick(effective_ticker)?;

        let old_delta = self.properties.get_value(delta_h).cloned();
        let old_ticker = self.properties.get_value(ticker_out_h).cloned();
        let new_delta = PropertyValue::Float(delta);
        let new_ticker = PropertyValue::Int64(ticker_us);
        self.properties.set_value_unchecked(delta_h, new_delta.clone());
        self.properties.set_value_unchecked(ticker_out_h, new_ticker.clone());
        self.propagate_output(delta_h, old_delta.as_ref() != Some(&new_delta));
        self.propagate_output(ticker_out_h, old_ticker.as_ref() != Some(&new_ticker));
        Ok(())
    }

    // -- serialization ---------------------------------------------------------------------

    fn build_api_objects(&self) -> ApiObjectsDto {
        let mut objects = ApiObjectsDto::default();

        let mut modules: Vec<(&ModuleId, &ModuleRecord<R>)> = self.modules.iter().collect();
        modules.sort_by_key(|(id, _)| id.0);
        for (id, m) in modules {
            objects.modules.push(ModuleObjectDto {
                id: id.0,
                name: m.name.clone(),
                source: m.source.clone(),
            });
        }

        let mut records: Vec<&NodeRecord> = self.node_records.values().collect();
        records.sort_by_key(|r| r.creation_id);

        for record in records {
            match record.kind {
                NodeKind::Script => {
                    let data = &self.scripts[&record.id];
                    let deps: Vec<(&String, &ModuleId)> = data.dependencies.iter().collect();
                    objects.scripts.push(ScriptObjectDto {
                        id: record.id.raw(),
                        name: record.name.clone(),
                        source: data.source.clone(),
                        dependency_aliases: deps.iter().map(|(a, _)| (*a).clone()).collect(),
                        dependency_module_ids: deps.iter().map(|(_, m)| m.0).collect(),
                        inputs: property_to_dto(&self.properties, record.in_root.unwrap()),
                        outputs: property_to_dto(&self.properties, record.out_root.unwrap()),
                    });
                }
                NodeKind::NodeBinding => {
                    let data = &self.node_bindings[&record.id];
                    objects.node_bindings.push(NodeBindingObjectDto {
                        id: record.id.raw(),
                        name: record.name.clone(),
                        host_name: data.host_name.clone(),
                        host_id: data.host_id,
                        rotation_mode: data.rotation_mode,
                        inputs: property_to_dto(&self.properties, record.in_root.unwrap()),
                    });
                }
                NodeKind::AppearanceBinding => {
                    let data = &self.appearance_bindings[&record.id];
                    objects.appearance_bindings.push(AppearanceBindingObjectDto {
                        id: record.id.raw(),
                        name: record.name.clone(),
                        host_name: data.host_name.clone(),
                        host_id: data.host_id,
                        inputs: property_to_dto(&self.properties, record.in_root.unwrap()),
                    });
                }
                NodeKind::CameraBinding => {
                    let data = &self.camera_bindings[&record.id];
                    objects.camera_bindings.push(CameraBindingObjectDto {
                        id: record.id.raw(),
                        name: record.name.clone(),
                        host_name: data.host_name.clone(),
                        host_id: data.host_id,
                        is_orthographic: data.is_orthographic,
                        inputs: property_to_dto(&self.properties, record.in_root.unwrap()),
                    });
                }
                NodeKind::DataArray => {
                    let data = &self.data_arrays[&record.id];
                    objects.data_arrays.push(DataArrayObjectDto {
                        id: record.id.raw(),
                        name: record.name.clone(),
                        element_type: data.element_type.clone(),
                        values: data.values.clone(),
                    });
                }
                NodeKind::AnimationNode => {
                    let data = &self.animations[&record.id];
                    let channels = data
                        .channels
                        .iter()
                        .map(|c| AnimationChannelDto {
                            name: c.name.clone(),
                            timestamps_node_id: c.timestamps.raw(),
                            keyframes_node_id: c.keyframes.raw(),
                            interpolation: c.interpolation,
                            tangents_in_node_id: c.tangents_in.map(|n| n.raw()),
                            tangents_out_node_id: c.tangents_out.map(|n| n.raw()),
                        })
                        .collect();
                    objects.animations.push(AnimationObjectDto {
                        id: record.id.raw(),
                        name: record.name.clone(),
                        channels,
                        inputs: property_to_dto(&self.properties, record.in_root.unwrap()),
                        outputs: property_to_dto(&self.properties, record.out_root.unwrap()),
                    });
                }
                NodeKind::TimerNode => {
                    let data = &self.timers[&record.id];
                    objects.timers.push(TimerObjectDto {
                        id: record.id.raw(),
                        name: record.name.clone(),
                        last_ticker_us: data.last_ticker_us(),
                        inputs: property_to_dto(&self.properties, record.in_root.unwrap()),
                        outputs: property_to_dto(&self.properties, record.out_root.unwrap()),
                    });
                }
            }
        }

        for (src_key, dst_key) in self.link_registry.iter() {
            let src_handle = src_key.to_handle();
            let dst_handle = dst_key.to_handle();
            objects.links.push(LinkDto {
                source: LinkEndpointDto {
                    node_id: self.properties.owner(src_handle).raw(),
                    path: PropertyPath(property_path(&self.properties, src_handle)),
                },
                target: LinkEndpointDto {
                    node_id: self.properties.owner(dst_handle).raw(),
                    path: PropertyPath(property_path(&self.properties, dst_handle)),
                },
            });
        }

        objects
    }

    pub fn save_to_buffer(&mut self, tool_version: VersionTag, host_scene_version: VersionTag) -> Result<Vec<u8>, EngineError> {
        self.errors.clear();
        if self.graph.topological_order().is_err() {
            return Err(self.fail(SerializationError::CyclePresent));
        }
        let objects = self.build_api_objects();
        let mut state = SavedEngineState {
            tool_version,
            host_scene_version,
            objects,
        };
        format::save_to_buffer(&mut state).map_err(|e| self.fail(SerializationError::Io(e.to_string())))
    }

    pub fn save_to_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
        tool_version: VersionTag,
        host_scene_version: VersionTag,
    ) -> Result<(), EngineError> {
        let bytes = self.save_to_buffer(tool_version, host_scene_version)?;
        std::fs::write(path, bytes).map_err(|e| self.fail(SerializationError::Io(e.to_string())))?;
        Ok(())
    }

    fn reset(&mut self) {
        self.properties = PropertyStore::new();
        self.node_records.clear();
        self.scripts.clear();
        self.node_bindings.clear();
        self.appearance_bindings.clear();
        self.camera_bindings.clear();
        self.data_arrays.clear();
        self.animations.clear();
        self.timers.clear();
        self.modules.clear();
        self.graph = DependencyGraph::new();
        self.link_registry = LinkRegistry::new();
        self.dirty = DirtySet::new();
        self.next_node_id = 1;
        self.next_module_id = 1;
        self.next_creation_id = 1;
    }

    fn root_for_path(&self, node: NodeId, path: &PropertyPath) -> Result<PropertyHandle, EngineError> {
        let record = self
            .node_records
            .get(&node)
            .ok_or(EngineError::Lookup(LookupError::UnknownNode))?;
        let first = path.0.first().map(String::as_str).unwrap_or("");
        let root = match first {
            "IN" => record.in_root,
            "OUT" => record.out_root,
            _ => None,
        };
        root.ok_or_else(|| {
            EngineError::Deserialization(DeserializationError::DanglingLinkProperty {
                node: node.raw(),
                path: path.0.join("."),
            })
        })
    }

    /// Replaces this engine's entire state with the contents of a saved buffer.
    /// `resolver` is required if the saved state contains any bindings; its absence
    /// with a non-empty binding list is reported as [`DeserializationError::MissingResolver`].
    pub fn load_from_buffer(
        &mut self,
        bytes: &[u8],
        mut resolver: Option<&mut dyn HostSceneResolver>,
    ) -> Result<VersionTag, EngineError> {
        self.errors.clear();
        let state = format::load_from_buffer(bytes).map_err(|e| self.fail(e))?;
        self.reset();

        let mut module_id_map: FxHashMap<u64, ModuleId> = FxHashMap::default();
        for m in &state.objects.modules {
            let config = CreateConfig::default();
            let chunk = self
                .runtime
                .compile(&m.source, &config)
                .map_err(|e| self.fail(CompilationError::Rejected(e.message)))?;
            let id = ModuleId(self.next_module_id);
            self.next_module_id += 1;
            self.modules.insert(
                id,
                ModuleRecord {
                    name: m.name.clone(),
                    source: m.source.clone(),
                    chunk,
                },
            );
            module_id_map.insert(m.id, id);
        }

        let mut node_id_map: FxHashMap<u64, NodeId> = FxHashMap::default();

        for s in &state.objects.scripts {
            let mut dependencies = BTreeMap::new();
            for (alias, saved_mod_id) in s.dependency_aliases.iter().zip(&s.dependency_module_ids) {
                let mapped = module_id_map
                    .get(saved_mod_id)
                    .copied()
                    .ok_or_else(|| self.fail(DeserializationError::RequiredFieldAbsent("module".to_string())))?;
                dependencies.insert(alias.clone(), mapped);
            }
            let config = CreateConfig {
                standard_modules: Default::default(),
                dependencies: dependencies.clone(),
                name: Some(s.name.clone()),
            };
            let chunk = self
                .runtime
                .compile(&s.source, &config)
                .map_err(|e| self.fail(CompilationError::Rejected(e.message)))?;
            let env = self.runtime.new_environment(&config);
            let id = self.alloc_node_id();
            let in_root = format::dto_to_property(&mut self.properties, id, None, &s.inputs);
            let out_root = format::dto_to_property(&mut self.properties, id, None, &s.outputs);
            self.insert_node(id, s.name.clone(), NodeKind::Script, Some(in_root), Some(out_root));
            self.scripts.insert(
                id,
                ScriptNodeData {
                    source: s.source.clone(),
                    chunk,
                    env,
                    dependencies,
                },
            );
            node_id_map.insert(s.id, id);
        }

        for b in &state.objects.node_bindings {
            let resolver = resolver
                .as_deref_mut()
                .ok_or_else(|| self.fail(DeserializationError::MissingResolver))?;
            let handle = resolver
                .find_host_object(HostObjectKind::Node, &b.host_name, b.host_id)
                .ok_or_else(|| DeserializationError::HostObjectNotFound {
                    kind: "Node".to_string(),
                    name: b.host_name.clone(),
                    id: b.host_id,
                })
                .map_err(|e| self.fail(e))?;
            let HostObjectHandle::Node(host) = handle else {
                return Err(self.fail(DeserializationError::HostObjectKindMismatch {
                    expected: "Node".to_string(),
                    found: "other".to_string(),
                }));
            };
            let id = self.alloc_node_id();
            let in_root = format::dto_to_property(&mut self.properties, id, None, &b.inputs);
            self.insert_node(id, b.name.clone(), NodeKind::NodeBinding, Some(in_root), None);
            self.node_bindings.insert(
                id,
                NodeBindingData {
                    host,
                    host_name: b.host_name.clone(),
                    host_id: b.host_id,
                    rotation_mode: b.rotation_mode,
                },
            );
            node_id_map.insert(b.id, id);
        }

        for a in &state.objects.appearance_bindings {
            let resolver = resolver
                .as_deref_mut()
                .ok_or_else(|| self.fail(DeserializationError::MissingResolver))?;
            let handle = resolver
                .find_host_object(HostObjectKind::Appearance, &a.host_name, a.host_id)
                .ok_or_else(|| DeserializationError::HostObjectNotFound {
                    kind: "Appearance".to_string(),
                    name: a.host_name.clone(),
                    id: a.host_id,
                })
                .map_err(|e| self.fail(e))?;
            let HostObjectHandle::Appearance(host) = handle else {
                return Err(self.fail(DeserializationError::HostObjectKindMismatch {
                    expected: "Appearance".to_string(),
                    found: "other".to_string(),
                }));
            };
            let id = self.alloc_node_id();
            let in_root = format::dto_to_property(&mut self.properties, id, None, &a.inputs);
            self.insert_node(id, a.name.clone(), NodeKind::AppearanceBinding, Some(in_root), None);
            self.appearance_bindings.insert(
                id,
                AppearanceBindingData {
                    host,
                    host_name: a.host_name.clone(),
                    host_id: a.host_id,
                },
            );
            node_id_map.insert(a.id, id);
        }

        for c in &state.objects.camera_bindings {
            let resolver = resolver
                .as_deref_mut()
                .ok_or_else(|| self.fail(DeserializationError::MissingResolver))?;
            let handle = resolver
                .find_host_object(HostObjectKind::Camera, &c.host_name, c.host_id)
                .ok_or_else(|| DeserializationError::HostObjectNotFound {
                    kind: "Camera".to_string(),
                    name: c.host_name.clone(),
                    id: c.host_id,
                })
                .map_err(|e| self.fail(e))?;
            let HostObjectHandle::Camera(host) = handle else {
                return Err(self.fail(DeserializationError::HostObjectKindMismatch {
                    expected: "Camera".to_string(),
                    found: "other".to_string(),
                }));
            };
            let id = self.alloc_node_id();
            let in_root = format::dto_to_property(&mut self.properties, id, None, &c.inputs);
            self.insert_node(id, c.name.clone(), NodeKind::CameraBinding, Some(in_root), None);
            self.camera_bindings.insert(
                id,
                CameraBindingData {
                    host,
                    host_name: c.host_name.clone(),
                    host_id: c.host_id,
                    is_orthographic: c.is_orthographic,
                },
            );
            node_id_map.insert(c.id, id);
        }

        for d in &state.objects.data_arrays {
            let id = self.alloc_node_id();
            self.insert_node(id, d.name.clone(), NodeKind::DataArray, None, None);
            let data = DataArrayData::new(d.element_type.clone(), d.values.clone()).map_err(|e| self.fail(e))?;
            self.data_arrays.insert(id, data);
            node_id_map.insert(d.id, id);
        }

        for a in &state.objects.animations {
            let mut channels = Vec::with_capacity(a.channels.len());
            for c in &a.channels {
                let timestamps = *node_id_map
                    .get(&c.timestamps_node_id)
                    .ok_or_else(|| self.fail(DeserializationError::RequiredFieldAbsent("timestamps".to_string())))?;
                let keyframes = *node_id_map
                    .get(&c.keyframes_node_id)
                    .ok_or_else(|| self.fail(DeserializationError::RequiredFieldAbsent("keyframes".to_string())))?;
                channels.push(AnimationChannel {
                    name: c.name.clone(),
                    timestamps,
                    keyframes,
                    interpolation: c.interpolation,
                    tangents_in: c.tangents_in_node_id.and_then(|n| node_id_map.get(&n).copied()),
                    tangents_out: c.tangents_out_node_id.and_then(|n| node_id_map.get(&n).copied()),
                });
            }
            let id = self.alloc_node_id();
            let in_root = format::dto_to_property(&mut self.properties, id, None, &a.inputs);
            let out_root = format::dto_to_property(&mut self.properties, id, None, &a.outputs);
            self.insert_node(id, a.name.clone(), NodeKind::AnimationNode, Some(in_root), Some(out_root));
            self.animations.insert(id, AnimationNodeData { channels });
            node_id_map.insert(a.id, id);
        }

        for t in &state.objects.timers {
            let id = self.alloc_node_id();
            let in_root = format::dto_to_property(&mut self.properties, id, None, &t.inputs);
            let out_root = format::dto_to_property(&mut self.properties, id, None, &t.outputs);
            self.insert_node(id, t.name.clone(), NodeKind::TimerNode, Some(in_root), Some(out_root));
            self.timers.insert(id, TimerNodeData::with_last_ticker_us(t.last_ticker_us));
            node_id_map.insert(t.id, id);
        }

        for link in &state.objects.links {
            let src_node = *node_id_map.get(&link.source.node_id).ok_or_else(|| {
                self.fail(DeserializationError::DanglingLinkProperty {
                    node: link.source.node_id,
                    path: link.source.path.0.join("."),
                })
            })?;
            let dst_node = *node_id_map.get(&link.target.node_id).ok_or_else(|| {
                self.fail(DeserializationError::DanglingLinkProperty {
                    node: link.target.node_id,
                    path: link.target.path.0.join("."),
                })
            })?;
            let src_root = self.root_for_path(src_node, &link.source.path)?;
            let dst_root = self.root_for_path(dst_node, &link.target.path)?;
            let src_handle = resolve_path(&self.properties, src_root, &link.source.path.0[1..]).ok_or_else(|| {
                EngineError::Deserialization(DeserializationError::DanglingLinkProperty {
                    node: link.source.node_id,
                    path: link.source.path.0.join("."),
                })
            });
            let src_handle = src_handle.map_err(|e| self.fail(e))?;
            let dst_handle = resolve_path(&self.properties, dst_root, &link.target.path.0[1..]).ok_or_else(|| {
                EngineError::Deserialization(DeserializationError::DanglingLinkProperty {
                    node: link.target.node_id,
                    path: link.target.path.0.join("."),
                })
            });
            let dst_handle = dst_handle.map_err(|e| self.fail(e))?;

            let src_key = PropertyKey::of(src_handle);
            let dst_key = PropertyKey::of(dst_handle);
            let _ = self.link_registry.link(src_key, dst_key);
            self.properties.mark_linked(dst_handle);
            self.graph.add_edge(src_node, dst_node);
            if let Some(value) = self.properties.get_value(src_handle).cloned() {
                self.properties.set_value_unchecked(dst_handle, value);
            }
        }

        self.errors.clear();
        Ok(state.tool_version)
    }

    pub fn load_from_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
        resolver: Option<&mut dyn HostSceneResolver>,
    ) -> Result<VersionTag, EngineError> {
        let bytes =
            std::fs::read(path).map_err(|e| self.fail(DeserializationError::InvariantViolated(e.to_string())))?;
        self.load_from_buffer(&bytes, resolver)
    }
}

/// Extracts the module aliases a script source declares via `modules(...)`, standalone
/// from any engine instance (used by tooling that wants to pre-validate a source
/// before calling [`Engine::create_script`]).
pub fn extract_script_dependencies(source: &str) -> Result<BTreeSet<String>, CompilationError> {
    logic_script::extract_declared_module_aliases(source).map_err(CompilationError::ModuleDeclaration)
}
