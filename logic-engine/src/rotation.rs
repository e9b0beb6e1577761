//! Rotation representation for Node/Camera bindings (spec §4.6).
//!
//! A binding's rotation input is either one of the six fixed Euler orders (each axis
//! applied as an intrinsic rotation, composed in the order named) or a raw quaternion.
//! Either way the value that actually reaches the host object is a single
//! [`nalgebra::UnitQuaternion`]; the Euler orders only change how the three input
//! floats are turned into one.

use logic_core::algebra::{UnitQuaternion, Vector3};
use logic_core_derive::Visit;

/// How a binding's three (or four) rotation input floats are interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Visit)]
pub enum RotationMode {
    EulerXYZ,
    EulerXZY,
    EulerYZX,
    EulerYXZ,
    EulerZXY,
    EulerZYX,
    Quaternion,
}

impl Default for RotationMode {
    fn default() -> Self {
        RotationMode::EulerXYZ
    }
}

impl RotationMode {
    /// Number of input floats this mode consumes (3 for Euler, 4 for quaternion).
    pub fn arity(self) -> usize {
        match self {
            RotationMode::Quaternion => 4,
            _ => 3,
        }
    }
}

/// Composes three intrinsic axis rotations (in radians) in the order named by `mode`.
/// Panics if `mode` is [`RotationMode::Quaternion`]; callers must route quaternion
/// input through [`UnitQuaternion::from_quaternion`] directly instead.
pub fn quat_from_euler(euler_radians: Vector3<f32>, mode: RotationMode) -> UnitQuaternion<f32> {
    let qx = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), euler_radians.x);
    let qy = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), euler_radians.y);
    let qz = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), euler_radians.z);
    match mode {
        RotationMode::EulerXYZ => qz * qy * qx,
        RotationMode::EulerXZY => qy * qz * qx,
        RotationMode::EulerYZX => qx * qz * qy,
        RotationMode::EulerYXZ => qz * qx * qy,
        RotationMode::EulerZXY => qy * qx * qz,
        RotationMode::EulerZYX => qx * qy * qz,
        RotationMode::Quaternion => {
            panic!("quat_from_euler called with RotationMode::Quaternion")
        }
    }
}

/// Builds the host-facing quaternion from a binding's raw rotation input floats,
/// dispatching on `mode` rather than assuming Euler.
pub fn quat_from_components(components: &[f32], mode: RotationMode) -> UnitQuaternion<f32> {
    assert_eq!(components.len(), mode.arity());
    match mode {
        RotationMode::Quaternion => {
            let raw = logic_core::algebra::Quaternion::new(
                components[3],
                components[0],
                components[1],
                components[2],
            );
            UnitQuaternion::from_quaternion(raw)
        }
        _ => quat_from_euler(
            Vector3::new(components[0], components[1], components[2]),
            mode,
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn euler_xyz_matches_nalgebra_reference() {
        let euler = Vector3::new(0.3f32, -0.2, 0.6);
        let got = quat_from_euler(euler, RotationMode::EulerXYZ);
        let expected = UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z);
        assert_relative_eq!(got.coords, expected.coords, epsilon = 1.0e-5);
    }

    #[test]
    fn quaternion_mode_passes_through_normalized() {
        let raw = [0.0, 0.0, 0.0, 1.0];
        let got = quat_from_components(&raw, RotationMode::Quaternion);
        assert_relative_eq!(got.coords.w, 1.0, epsilon = 1.0e-6);
    }

    #[test]
    fn arity_matches_mode() {
        assert_eq!(RotationMode::EulerXYZ.arity(), 3);
        assert_eq!(RotationMode::Quaternion.arity(), 4);
    }
}
