//! DataArray, AnimationNode, TimerNode (spec §4.6) - "special nodes" sharing the
//! ordinary link/update contract but each with a fixed, creation-time-only schema.

use logic_core_derive::Visit;
use logic_graph::NodeId;
use logic_script::PropertyType;

use crate::error::{UpdateInputError, ValidationError};
use crate::property::PropertyValue;

#[inline]
fn lerpf(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Cubic Hermite spline evaluation, tangents scaled by key-value span as in a
/// standard curve-key interpolator: https://en.wikipedia.org/wiki/Cubic_Hermite_spline
#[inline]
fn cubicf(p0: f32, p1: f32, t: f32, m0: f32, m1: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    let scale = (p1 - p0).abs();

    (2.0 * t3 - 3.0 * t2 + 1.0) * p0
        + (t3 - 2.0 * t2 + t) * m0 * scale
        + (-2.0 * t3 + 3.0 * t2) * p1
        + (t3 - t2) * m1 * scale
}

/// Per-node state for a DataArray: an immutable, fixed-length, homogeneously-typed
/// vector of values. Cannot be linked and has no `IN`/`OUT` trees; it exists purely to
/// be referenced by an [`AnimationChannel`].
#[derive(Debug, Clone)]
pub struct DataArrayData {
    pub element_type: PropertyType,
    pub values: Vec<PropertyValue>,
}

impl DataArrayData {
    pub fn new(element_type: PropertyType, values: Vec<PropertyValue>) -> Result<Self, ValidationError> {
        if values.is_empty() {
            return Err(ValidationError::EmptyDataArray);
        }
        for v in &values {
            if v.ty() != element_type {
                return Err(ValidationError::TypeMismatch {
                    expected: format!("{element_type:?}"),
                    found: format!("{:?}", v.ty()),
                });
            }
        }
        Ok(Self {
            element_type,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// How a channel's value is computed between keyframes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Visit)]
pub enum Interpolation {
    Step,
    Linear,
    Cubic,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Step
    }
}

/// One output of an [`AnimationNodeData`]: a named, independently interpolated track.
#[derive(Debug, Clone)]
pub struct AnimationChannel {
    pub name: String,
    /// Must reference a `DataArray` node with `element_type == Float`.
    pub timestamps: NodeId,
    /// Must reference a `DataArray` node of the same length as `timestamps`.
    pub keyframes: NodeId,
    pub interpolation: Interpolation,
    /// Required, and must match `keyframes`' length, when `interpolation == Cubic`.
    pub tangents_in: Option<NodeId>,
    pub tangents_out: Option<NodeId>,
}

/// Per-node state for an AnimationNode.
#[derive(Debug, Clone)]
pub struct AnimationNodeData {
    pub channels: Vec<AnimationChannel>,
}

/// Validates a channel's tangent arity against its keyframes, per spec §4.6: "Cubic
/// channels require both tangent arrays of equal length to keyframes."
pub fn validate_channel_arity(
    channel: &AnimationChannel,
    timestamps_len: usize,
    keyframes_len: usize,
    tangents_in_len: Option<usize>,
    tangents_out_len: Option<usize>,
) -> Result<(), ValidationError> {
    if timestamps_len != keyframes_len {
        return Err(ValidationError::WrongArity {
            expected: timestamps_len,
            found: keyframes_len,
        });
    }
    if channel.interpolation == Interpolation::Cubic {
        let (Some(tin), Some(tout)) = (tangents_in_len, tangents_out_len) else {
            return Err(ValidationError::WrongArity {
                expected: keyframes_len,
                found: 0,
            });
        };
        if tin != keyframes_len || tout != keyframes_len {
            return Err(ValidationError::WrongArity {
                expected: keyframes_len,
                found: tin.min(tout),
            });
        }
    }
    Ok(())
}

fn numeric_components(value: &PropertyValue) -> Option<Vec<f32>> {
    Some(match value {
        PropertyValue::Int32(v) => vec![*v as f32],
        PropertyValue::Int64(v) => vec![*v as f32],
        PropertyValue::Float(v) => vec![*v],
        PropertyValue::Vec2F(x, y) => vec![*x, *y],
        PropertyValue::Vec3F(x, y, z) => vec![*x, *y, *z],
        PropertyValue::Vec4F(x, y, z, w) => vec![*x, *y, *z, *w],
        PropertyValue::Vec2I(x, y) => vec![*x as f32, *y as f32],
        PropertyValue::Vec3I(x, y, z) => vec![*x as f32, *y as f32, *z as f32],
        PropertyValue::Vec4I(x, y, z, w) => vec![*x as f32, *y as f32, *z as f32, *w as f32],
        PropertyValue::Bool(_) | PropertyValue::String(_) => return None,
    })
}

fn reconstruct(ty: &PropertyType, c: &[f32]) -> PropertyValue {
    match ty {
        PropertyType::Int32 => PropertyValue::Int32(c[0].round() as i32),
        PropertyType::Int64 => PropertyValue::Int64(c[0].round() as i64),
        PropertyType::Float => PropertyValue::Float(c[0]),
        PropertyType::Vec2F => PropertyValue::Vec2F(c[0], c[1]),
        PropertyType::Vec3F => PropertyValue::Vec3F(c[0], c[1], c[2]),
        PropertyType::Vec4F => PropertyValue::Vec4F(c[0], c[1], c[2], c[3]),
        PropertyType::Vec2I => PropertyValue::Vec2I(c[0].round() as i32, c[1].round() as i32),
        PropertyType::Vec3I => PropertyValue::Vec3I(
            c[0].round() as i32,
            c[1].round() as i32,
            c[2].round() as i32,
        ),
        PropertyType::Vec4I => PropertyValue::Vec4I(
            c[0].round() as i32,
            c[1].round() as i32,
            c[2].round() as i32,
            c[3].round() as i32,
        ),
        PropertyType::Bool | PropertyType::String | PropertyType::Struct | PropertyType::Array { .. } => {
            unreachable!("non-numeric type reached channel reconstruction")
        }
    }
}

/// Evaluates one channel at `progress`, given its already-resolved timestamp/keyframe
/// (and, for `Cubic`, tangent) values. `timestamps` must be sorted ascending.
pub fn interpolate_channel(
    progress: f32,
    timestamps: &[f32],
    keyframes: &[PropertyValue],
    interpolation: Interpolation,
    tangents_in: Option<&[PropertyValue]>,
    tangents_out: Option<&[PropertyValue]>,
) -> Result<PropertyValue, ValidationError> {
    debug_assert_eq!(timestamps.len(), keyframes.len());
    let ty = keyframes[0].ty();

    if progress <= timestamps[0] {
        return Ok(keyframes[0].clone());
    }
    if progress >= *timestamps.last().unwrap() {
        return Ok(keyframes.last().unwrap().clone());
    }

    let right = timestamps.partition_point(|&t| t <= progress).max(1);
    let left = right - 1;
    let span = timestamps[right] - timestamps[left];
    let t = if span > 0.0 {
        (progress - timestamps[left]) / span
    } else {
        0.0
    };

    match interpolation {
        Interpolation::Step => Ok(keyframes[left].clone()),
        Interpolation::Linear => {
            let a = numeric_components(&keyframes[left]).ok_or_else(|| ValidationError::TypeMismatch {
                expected: "numeric".to_string(),
                found: format!("{ty:?}"),
            })?;
            let b = numeric_components(&keyframes[right]).unwrap();
            let out: Vec<f32> = a.iter().zip(&b).map(|(&p0, &p1)| lerpf(p0, p1, t)).collect();
            Ok(reconstruct(&ty, &out))
        }
        Interpolation::Cubic => {
            let a = numeric_components(&keyframes[left]).ok_or_else(|| ValidationError::TypeMismatch {
                expected: "numeric".to_string(),
                found: format!("{ty:?}"),
            })?;
            let b = numeric_components(&keyframes[right]).unwrap();
            let tin = tangents_in.and_then(|t| numeric_components(&t[left])).unwrap_or_else(|| vec![0.0; a.len()]);
            let tout = tangents_out.and_then(|t| numeric_components(&t[right])).unwrap_or_else(|| vec![0.0; a.len()]);
            let out: Vec<f32> = (0..a.len())
                .map(|i| cubicf(a[i], b[i], t, tin[i], tout[i]))
                .collect();
            Ok(reconstruct(&ty, &out))
        }
    }
}

/// Per-node state for a TimerNode.
#[derive(Debug, Clone, Default)]
pub struct TimerNodeData {
    last_ticker_us: Option<i64>,
}

impl TimerNodeData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs a timer with a prior ticker value, for loading a saved state
    /// where the next tick must still honor monotonicity against it.
    pub fn with_last_ticker_us(last_ticker_us: Option<i64>) -> Self {
        Self { last_ticker_us }
    }

    pub fn last_ticker_us(&self) -> Option<i64> {
        self.last_ticker_us
    }

    /// Advances the timer. `external_ticker_us` is the input property's current
    /// value; `0` means "engine supplies wall-clock microseconds", in which case the
    /// caller passes the value read from its own monotonic clock. Returns
    /// `(timeDelta, ticker_us)`.
    pub fn tick(&mut self, effective_ticker_us: i64) -> Result<(f32, i64), UpdateInputError> {
        if effective_ticker_us < 0 {
            return Err(UpdateInputError {
                message: format!("ticker_us must be non-negative, got {effective_ticker_us}"),
            });
        }
        let delta = match self.last_ticker_us {
            None => 0.0,
            Some(last) => {
                if effective_ticker_us < last {
                    return Err(UpdateInputError {
                        message: format!(
                            "ticker_us must be monotonically non-decreasing: previous={last}, new={effective_ticker_us}"
                        ),
                    });
                }
                (effective_ticker_us - last) as f32 / 1_000_000.0
            }
        };
        self.last_ticker_us = Some(effective_ticker_us);
        Ok((delta, effective_ticker_us))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_data_array_is_rejected() {
        assert_eq!(
            DataArrayData::new(PropertyType::Float, vec![]).unwrap_err(),
            ValidationError::EmptyDataArray
        );
    }

    #[test]
    fn data_array_element_type_mismatch_is_rejected() {
        let err = DataArrayData::new(PropertyType::Float, vec![PropertyValue::Int32(1)]).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn linear_interpolation_halfway() {
        let timestamps = [0.0, 1.0];
        let keyframes = [PropertyValue::Float(0.0), PropertyValue::Float(10.0)];
        let out = interpolate_channel(0.5, &timestamps, &keyframes, Interpolation::Linear, None, None).unwrap();
        assert_eq!(out, PropertyValue::Float(5.0));
    }

    #[test]
    fn step_interpolation_holds_left_value() {
        let timestamps = [0.0, 1.0, 2.0];
        let keyframes = [
            PropertyValue::Float(1.0),
            PropertyValue::Float(2.0),
            PropertyValue::Float(3.0),
        ];
        let out = interpolate_channel(1.5, &timestamps, &keyframes, Interpolation::Step, None, None).unwrap();
        assert_eq!(out, PropertyValue::Float(2.0));
    }

    #[test]
    fn progress_before_first_key_clamps() {
        let timestamps = [1.0, 2.0];
        let keyframes = [PropertyValue::Float(1.0), PropertyValue::Float(2.0)];
        let out = interpolate_channel(0.0, &timestamps, &keyframes, Interpolation::Linear, None, None).unwrap();
        assert_eq!(out, PropertyValue::Float(1.0));
    }

    #[test]
    fn cubic_channel_without_tangents_is_rejected() {
        let channel = AnimationChannel {
            name: "c".to_string(),
            timestamps: NodeId::new(1),
            keyframes: NodeId::new(2),
            interpolation: Interpolation::Cubic,
            tangents_in: None,
            tangents_out: None,
        };
        assert!(validate_channel_arity(&channel, 3, 3, None, None).is_err());
    }

    #[test]
    fn timer_first_tick_has_zero_delta() {
        let mut timer = TimerNodeData::new();
        let (delta, ticker) = timer.tick(1_000_000).unwrap();
        assert_eq!(delta, 0.0);
        assert_eq!(ticker, 1_000_000);
    }

    #[test]
    fn timer_reports_delta_in_seconds() {
        let mut timer = TimerNodeData::new();
        timer.tick(1_000_000).unwrap();
        let (delta, ticker) = timer.tick(1_500_000).unwrap();
        assert_eq!(delta, 0.5);
        assert_eq!(ticker, 1_500_000);
    }

    #[test]
    fn timer_rejects_non_monotonic_ticker() {
        let mut timer = TimerNodeData::new();
        timer.tick(1_500_000).unwrap();
        assert!(timer.tick(1_499_999).is_err());
    }

    #[test]
    fn timer_rejects_negative_ticker() {
        let mut timer = TimerNodeData::new();
        assert!(timer.tick(-1).is_err());
    }
}
