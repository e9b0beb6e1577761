//! The persistent binary file format (spec §6): a length-prefixed table of every
//! node kind plus the link list, built on top of [`logic_core::visitor::Visitor`].
//!
//! This module only knows how to turn an [`Engine`](crate::engine::Engine)'s state
//! into plain serializable DTOs and back - the DTOs carry everything needed to
//! reconstruct the property trees and node metadata, but resolving a binding's host
//! object (which needs a [`crate::binding::HostSceneResolver`]) and remapping saved
//! node ids to fresh engine ids is `engine.rs`'s job, since only it has both the live
//! arenas and the resolver.

use logic_core::visitor::{Visit, VisitResult, Visitor};
use logic_core_derive::Visit as VisitDerive;
use logic_script::PropertyType;

use crate::error::DeserializationError;
use crate::property::{PropertyHandle, PropertyStore, PropertyValue, Semantics};
use crate::rotation::RotationMode;
use crate::special_nodes::Interpolation;

/// Bumped whenever this module's on-disk shape changes in a way that breaks
/// compatibility with previously saved files.
pub const CURRENT_FILE_FORMAT_VERSION: u32 = 1;

/// A `{major, minor, patch, stringTag, fileFormatVersion}` header, used both for the
/// tool's own version and for the host-scene version it was saved against.
#[derive(Debug, Clone, Default, VisitDerive)]
pub struct VersionTag {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub string_tag: String,
    pub file_format_version: u32,
}

/// One property subtree, flattened for serialization: type, semantics and value
/// travel with the node itself rather than being derived from a schema, so a saved
/// file remains loadable even if the script that originally declared the schema is
/// no longer available.
#[derive(Debug, Clone, Default, VisitDerive)]
pub struct PropertyDto {
    pub name: String,
    pub ty: PropertyType,
    pub semantics: Semantics,
    pub value: Option<PropertyValue>,
    pub children: Vec<PropertyDto>,
}

/// Flattens a live property subtree into its serializable form.
pub fn property_to_dto(store: &PropertyStore, handle: PropertyHandle) -> PropertyDto {
    PropertyDto {
        name: store.name(handle).to_string(),
        ty: store.ty(handle).clone(),
        semantics: store.semantics(handle),
        value: store.get_value(handle).cloned(),
        children: (0..store.child_count(handle))
            .map(|i| property_to_dto(store, store.child_at(handle, i).unwrap()))
            .collect(),
    }
}

/// Rebuilds a property subtree from its serialized form, owned by `owner`.
pub fn dto_to_property(
    store: &mut PropertyStore,
    owner: logic_graph::NodeId,
    parent: Option<PropertyHandle>,
    dto: &PropertyDto,
) -> PropertyHandle {
    let handle = store.insert_record(crate::property::PropertyRecord {
        name: dto.name.clone(),
        ty: dto.ty.clone(),
        semantics: dto.semantics,
        owner,
        parent,
        value: dto.value.clone(),
        children: Vec::new(),
        write_back_flag: false,
        last_written_to_host: None,
    });
    let children: Vec<PropertyHandle> = dto
        .children
        .iter()
        .map(|child| dto_to_property(store, owner, Some(handle), child))
        .collect();
    // `insert_record` above returned a fresh handle with no children yet; fill them in now
    // that the child handles exist (children must be created after their parent to borrow
    // `owner`/`parent` correctly, but the parent record needs to be live first).
    store.set_children(handle, children);
    handle
}

/// A link endpoint, identified the way the binary format requires: by node id plus
/// the dotted path from that node's `IN`/`OUT` root down to the specific property.
#[derive(Debug, Clone, Default, PartialEq, Eq, VisitDerive)]
pub struct PropertyPath(pub Vec<String>);

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct LinkEndpointDto {
    pub node_id: u64,
    pub path: PropertyPath,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct LinkDto {
    pub source: LinkEndpointDto,
    pub target: LinkEndpointDto,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct ModuleObjectDto {
    pub id: u64,
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct ScriptObjectDto {
    pub id: u64,
    pub name: String,
    pub source: String,
    /// Parallel arrays: `dependency_aliases[i]` is bound to the module whose id is
    /// `dependency_module_ids[i]`.
    pub dependency_aliases: Vec<String>,
    pub dependency_module_ids: Vec<u64>,
    pub inputs: PropertyDto,
    pub outputs: PropertyDto,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct NodeBindingObjectDto {
    pub id: u64,
    pub name: String,
    pub host_name: String,
    pub host_id: u64,
    pub rotation_mode: RotationMode,
    pub inputs: PropertyDto,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct AppearanceBindingObjectDto {
    pub id: u64,
    pub name: String,
    pub host_name: String,
    pub host_id: u64,
    pub inputs: PropertyDto,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct CameraBindingObjectDto {
    pub id: u64,
    pub name: String,
    pub host_name: String,
    pub host_id: u64,
    pub is_orthographic: bool,
    pub inputs: PropertyDto,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct DataArrayObjectDto {
    pub id: u64,
    pub name: String,
    pub element_type: PropertyType,
    pub values: Vec<PropertyValue>,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct AnimationChannelDto {
    pub name: String,
    pub timestamps_node_id: u64,
    pub keyframes_node_id: u64,
    pub interpolation: Interpolation,
    pub tangents_in_node_id: Option<u64>,
    pub tangents_out_node_id: Option<u64>,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct AnimationObjectDto {
    pub id: u64,
    pub name: String,
    pub channels: Vec<AnimationChannelDto>,
    pub inputs: PropertyDto,
    pub outputs: PropertyDto,
}

#[derive(Debug, Clone, Default, VisitDerive)]
pub struct TimerObjectDto {
    pub id: u64,
    pub name: String,
    pub last_ticker_us: Option<i64>,
    pub inputs: PropertyDto,
    pub outputs: PropertyDto,
}

/// The `ApiObjects` table: one ordered list per node kind plus the link list, in the
/// order named by spec §6.
#[derive(Debug, Clone, Default, VisitDerive)]
pub struct ApiObjectsDto {
    pub modules: Vec<ModuleObjectDto>,
    pub scripts: Vec<ScriptObjectDto>,
    pub node_bindings: Vec<NodeBindingObjectDto>,
    pub appearance_bindings: Vec<AppearanceBindingObjectDto>,
    pub camera_bindings: Vec<CameraBindingObjectDto>,
    pub data_arrays: Vec<DataArrayObjectDto>,
    pub animations: Vec<AnimationObjectDto>,
    pub timers: Vec<TimerObjectDto>,
    pub links: Vec<LinkDto>,
}

/// The whole saved engine state.
#[derive(Debug, Clone, Default, VisitDerive)]
pub struct SavedEngineState {
    pub tool_version: VersionTag,
    pub host_scene_version: VersionTag,
    pub objects: ApiObjectsDto,
}

/// Encodes `state` to a byte buffer. Does not itself check for link cycles; the
/// caller (`Engine::save_to_buffer`) refuses to call this while one is present.
pub fn save_to_buffer(state: &mut SavedEngineState) -> Result<Vec<u8>, logic_core::visitor::VisitError> {
    Visitor::save_binary(state)
}

/// Decodes a byte buffer and checks the one thing this module alone can verify: the
/// file format version. Resolver-dependent checks (host object lookup, dangling link
/// properties) are the caller's responsibility once it has walked the returned state.
pub fn load_from_buffer(bytes: &[u8]) -> Result<SavedEngineState, DeserializationError> {
    let mut state = SavedEngineState::default();
    Visitor::load_binary(bytes, &mut state)?;
    if state.tool_version.file_format_version != CURRENT_FILE_FORMAT_VERSION {
        return Err(DeserializationError::UnsupportedFileFormatVersion {
            found: state.tool_version.file_format_version,
            supported: CURRENT_FILE_FORMAT_VERSION,
        });
    }
    Ok(state)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::property::PropertyRecord;
    use logic_graph::NodeId;

    fn sample_state() -> SavedEngineState {
        let mut state = SavedEngineState::default();
        state.tool_version = VersionTag {
            major: 1,
            minor: 0,
            patch: 0,
            string_tag: "test".to_string(),
            file_format_version: CURRENT_FILE_FORMAT_VERSION,
        };
        state.host_scene_version = state.tool_version.clone();
        state.objects.scripts.push(ScriptObjectDto {
            id: 1,
            name: "S1".to_string(),
            source: "return {}".to_string(),
            dependency_aliases: vec![],
            dependency_module_ids: vec![],
            inputs: PropertyDto {
                name: "IN".to_string(),
                ty: PropertyType::Struct,
                semantics: Semantics::ScriptInput,
                value: None,
                children: vec![PropertyDto {
                    name: "s1".to_string(),
                    ty: PropertyType::String,
                    semantics: Semantics::ScriptInput,
                    value: Some(PropertyValue::String("hi".to_string())),
                    children: vec![],
                }],
            },
            outputs: PropertyDto::default(),
        });
        state.objects.links.push(LinkDto {
            source: LinkEndpointDto {
                node_id: 1,
                path: PropertyPath(vec!["OUT".to_string(), "out".to_string()]),
            },
            target: LinkEndpointDto {
                node_id: 2,
                path: PropertyPath(vec!["IN".to_string(), "s1".to_string()]),
            },
        });
        state
    }

    #[test]
    fn round_trips_through_buffer() {
        let mut state = sample_state();
        let bytes = save_to_buffer(&mut state).unwrap();
        let restored = load_from_buffer(&bytes).unwrap();
        assert_eq!(restored.objects.scripts.len(), 1);
        assert_eq!(restored.objects.scripts[0].name, "S1");
        assert_eq!(
            restored.objects.scripts[0].inputs.children[0].value,
            Some(PropertyValue::String("hi".to_string()))
        );
        assert_eq!(restored.objects.links.len(), 1);
        assert_eq!(restored.objects.links[0].target.node_id, 2);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut state = sample_state();
        state.tool_version.file_format_version = CURRENT_FILE_FORMAT_VERSION + 1;
        let bytes = save_to_buffer(&mut state).unwrap();
        let err = load_from_buffer(&bytes).unwrap_err();
        assert!(matches!(
            err,
            DeserializationError::UnsupportedFileFormatVersion { .. }
        ));
    }

    #[test]
    fn property_tree_round_trips_through_store() {
        let mut store = PropertyStore::new();
        let owner = NodeId::new(1);
        let root = store.insert_record(PropertyRecord {
            name: "IN".to_string(),
            ty: PropertyType::Struct,
            semantics: Semantics::ScriptInput,
            owner,
            parent: None,
            value: None,
            children: Vec::new(),
            write_back_flag: false,
            last_written_to_host: None,
        });
        let child = store.insert_record(PropertyRecord {
            name: "x".to_string(),
            ty: PropertyType::Int32,
            semantics: Semantics::ScriptInput,
            owner,
            parent: Some(root),
            value: Some(PropertyValue::Int32(7)),
            children: Vec::new(),
            write_back_flag: false,
            last_written_to_host: None,
        });
        store.set_children(root, vec![child]);

        let dto = property_to_dto(&store, root);
        let mut restored_store = PropertyStore::new();
        let restored = dto_to_property(&mut restored_store, owner, None, &dto);
        assert_eq!(restored_store.child_count(restored), 1);
        let restored_child = restored_store.child_at(restored, 0).unwrap();
        assert_eq!(
            restored_store.get::<i32>(restored_child),
            Some(7)
        );
    }
}
