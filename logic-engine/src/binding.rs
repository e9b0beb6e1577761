//! Binding nodes: Node/Appearance/Camera, and the host-scene collaborator contract
//! they write back through (spec §4.5, §6's host-object resolver).
//!
//! Per the "deep inheritance" redesign note, there is no binding base class: each
//! variant is its own data struct, and the only thing they share is being driven by
//! the same write-back rule (see [`should_write_back`]).

use std::fmt;

use logic_script::{PropertyType, TypeSchema};

use crate::error::HostBindingError;
use crate::property::PropertyValue;
use crate::rotation::RotationMode;

/// Which kind of host scene object a binding mirrors. Carried alongside `name`/`id`
/// in the binary format so `load` can ask the resolver for exactly the right thing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HostObjectKind {
    Node,
    Appearance,
    Camera,
}

impl HostObjectKind {
    pub fn name(self) -> &'static str {
        match self {
            HostObjectKind::Node => "Node",
            HostObjectKind::Appearance => "Appearance",
            HostObjectKind::Camera => "Camera",
        }
    }
}

/// A host 3D scene node: the thing a Node Binding mirrors. Out of scope to implement
/// (the host scene API belongs to the caller); the engine only ever calls these.
pub trait HostNodeHandle: fmt::Debug {
    fn visibility(&self) -> bool;
    fn set_visibility(&mut self, value: bool);
    /// `Some(euler_radians)` if the host's current rotation is already expressed as
    /// Euler angles in exactly `order`; used only to seed a newly created binding's
    /// initial input values.
    fn euler_rotation_if(&self, order: RotationMode) -> Option<(f32, f32, f32)>;
    fn translation(&self) -> (f32, f32, f32);
    fn scaling(&self) -> (f32, f32, f32);
    fn set_visibility_translation_scaling(
        &mut self,
        translation: (f32, f32, f32),
        scaling: (f32, f32, f32),
    );
    /// Sets rotation from a quaternion already converted to the host's own axis
    /// convention; the conversion itself happens in the binding's update routine.
    fn set_rotation_quaternion(&mut self, quat: logic_core::algebra::UnitQuaternion<f32>);
}

/// A host shader material: the thing an Appearance Binding mirrors.
pub trait HostAppearanceHandle: fmt::Debug {
    /// The fixed schema of this material's uniforms, queried once at binding
    /// creation time and frozen as the binding's `IN` schema.
    fn uniform_schema(&self) -> TypeSchema;
    fn set_uniform(&mut self, name: &str, value: &PropertyValue) -> Result<(), HostBindingError>;
}

/// A host camera: the thing a Camera Binding mirrors.
pub trait HostCameraHandle: fmt::Debug {
    fn is_orthographic(&self) -> bool;
    fn set_viewport(&mut self, offset_x: i32, offset_y: i32, width: i32, height: i32);
    fn set_frustum(&mut self, frustum: CameraFrustum);
}

/// The nested `frustum` binding input, matching §4.5's perspective/orthographic split.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum CameraFrustum {
    Perspective {
        near_plane: f32,
        far_plane: f32,
        field_of_view: f32,
        aspect_ratio: f32,
    },
    Orthographic {
        near_plane: f32,
        far_plane: f32,
        left_plane: f32,
        right_plane: f32,
        bottom_plane: f32,
        top_plane: f32,
    },
}

/// A live handle to whichever kind of host object a binding was created against.
pub enum HostObjectHandle {
    Node(Box<dyn HostNodeHandle>),
    Appearance(Box<dyn HostAppearanceHandle>),
    Camera(Box<dyn HostCameraHandle>),
}

impl fmt::Debug for HostObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostObjectHandle::Node(h) => write!(f, "HostObjectHandle::Node({h:?})"),
            HostObjectHandle::Appearance(h) => write!(f, "HostObjectHandle::Appearance({h:?})"),
            HostObjectHandle::Camera(h) => write!(f, "HostObjectHandle::Camera({h:?})"),
        }
    }
}

/// Resolves a `(kind, name, id)` triple to a live host object, used only while
/// loading a saved engine state (spec §6).
pub trait HostSceneResolver {
    fn find_host_object(&mut self, kind: HostObjectKind, name: &str, id: u64) -> Option<HostObjectHandle>;
}

/// Per-node state for a Node Binding.
#[derive(Debug)]
pub struct NodeBindingData {
    pub host: Box<dyn HostNodeHandle>,
    pub host_name: String,
    pub host_id: u64,
    pub rotation_mode: RotationMode,
}

/// Per-node state for an Appearance Binding.
#[derive(Debug)]
pub struct AppearanceBindingData {
    pub host: Box<dyn HostAppearanceHandle>,
    pub host_name: String,
    pub host_id: u64,
}

/// Per-node state for a Camera Binding.
#[derive(Debug)]
pub struct CameraBindingData {
    pub host: Box<dyn HostCameraHandle>,
    pub host_name: String,
    pub host_id: u64,
    pub is_orthographic: bool,
}

/// Builds the fixed `IN` schema for a Node Binding. `rotation` is `vec4f` only in
/// [`RotationMode::Quaternion`], `vec3f` otherwise.
pub fn node_binding_schema(rotation_mode: RotationMode) -> TypeSchema {
    let rotation_ty = if rotation_mode == RotationMode::Quaternion {
        PropertyType::Vec4F
    } else {
        PropertyType::Vec3F
    };
    TypeSchema::strukt(
        "IN",
        vec![
            TypeSchema::leaf("visibility", PropertyType::Bool),
            TypeSchema::leaf("rotation", rotation_ty),
            TypeSchema::leaf("translation", PropertyType::Vec3F),
            TypeSchema::leaf("scaling", PropertyType::Vec3F),
        ],
    )
}

/// Builds the fixed `IN` schema for a Camera Binding; the `frustum` shape depends on
/// whether the host camera is orthographic or perspective.
pub fn camera_binding_schema(is_orthographic: bool) -> TypeSchema {
    let frustum = if is_orthographic {
        TypeSchema::strukt(
            "frustum",
            vec![
                TypeSchema::leaf("nearPlane", PropertyType::Float),
                TypeSchema::leaf("farPlane", PropertyType::Float),
                TypeSchema::leaf("leftPlane", PropertyType::Float),
                TypeSchema::leaf("rightPlane", PropertyType::Float),
                TypeSchema::leaf("bottomPlane", PropertyType::Float),
                TypeSchema::leaf("topPlane", PropertyType::Float),
            ],
        )
    } else {
        TypeSchema::strukt(
            "frustum",
            vec![
                TypeSchema::leaf("nearPlane", PropertyType::Float),
                TypeSchema::leaf("farPlane", PropertyType::Float),
                TypeSchema::leaf("fieldOfView", PropertyType::Float),
                TypeSchema::leaf("aspectRatio", PropertyType::Float),
            ],
        )
    };
    let viewport = TypeSchema::strukt(
        "viewport",
        vec![
            TypeSchema::leaf("offsetX", PropertyType::Int32),
            TypeSchema::leaf("offsetY", PropertyType::Int32),
            TypeSchema::leaf("width", PropertyType::Int32),
            TypeSchema::leaf("height", PropertyType::Int32),
        ],
    );
    TypeSchema::strukt("IN", vec![viewport, frustum])
}

/// The write-back rule from spec §4.5: write only if the flag is set (the value was
/// ever explicitly set or linked) AND the current value differs from the last value
/// actually pushed to the host.
pub fn should_write_back(write_back_flag: bool, current: &PropertyValue, last_written: Option<&PropertyValue>) -> bool {
    write_back_flag && last_written != Some(current)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn node_binding_rotation_type_follows_mode() {
        let euler = node_binding_schema(RotationMode::EulerXYZ);
        assert_eq!(euler.child("rotation").unwrap().ty, PropertyType::Vec3F);

        let quat = node_binding_schema(RotationMode::Quaternion);
        assert_eq!(quat.child("rotation").unwrap().ty, PropertyType::Vec4F);
    }

    #[test]
    fn camera_schema_frustum_shape_follows_projection() {
        let persp = camera_binding_schema(false);
        let frustum = persp.child("frustum").unwrap();
        assert!(frustum.child("fieldOfView").is_some());
        assert!(frustum.child("leftPlane").is_none());

        let ortho = camera_binding_schema(true);
        let frustum = ortho.child("frustum").unwrap();
        assert!(frustum.child("leftPlane").is_some());
        assert!(frustum.child("fieldOfView").is_none());
    }

    #[test]
    fn write_back_requires_flag_and_change() {
        let a = PropertyValue::Int32(1);
        let b = PropertyValue::Int32(2);
        assert!(!should_write_back(false, &a, None));
        assert!(should_write_back(true, &a, None));
        assert!(!should_write_back(true, &a, Some(&a)));
        assert!(should_write_back(true, &b, Some(&a)));
    }
}
