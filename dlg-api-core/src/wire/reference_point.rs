//! The `ReferencePoint` stage (spec.md §4.2): one request per window,
//! producing each window's 3D ray-origin point.

use serde_json::{json, Value};

use crate::accumulator::{AccumulatorDelta, AccumulatorMap};
use crate::error::GatewayApiError;
use crate::geometry::{Point3, RoomPolygon, WindowGeometry};
use crate::wire::{check_status_error, required_field};

#[derive(Clone, Debug)]
pub struct ReferencePointRequest {
    pub window_name: String,
    pub room_polygon: RoomPolygon,
    pub window: WindowGeometry,
}

impl ReferencePointRequest {
    /// One request per window (spec.md §4.2), skipping windows the client
    /// already gave a midpoint for via `accumulator.reference_point`.
    pub fn parse(accumulator: &AccumulatorMap) -> Vec<Self> {
        let room_polygon = accumulator.room_polygon.clone().unwrap_or(RoomPolygon(vec![]));
        accumulator
            .windows
            .iter()
            .filter(|(name, _)| !accumulator.reference_point.contains_key(*name))
            .map(|(name, window)| Self {
                window_name: name.clone(),
                room_polygon: room_polygon.clone(),
                window: window.clone(),
            })
            .collect()
    }

    pub fn to_wire(&self) -> Value {
        json!({
            "room_polygon": self.room_polygon.0,
            "windows": {
                &self.window_name: {
                    "x1": self.window.x1, "y1": self.window.y1, "z1": self.window.z1,
                    "x2": self.window.x2, "y2": self.window.y2, "z2": self.window.z2,
                    "window_frame_ratio": self.window.window_frame_ratio,
                }
            },
        })
    }
}

/// `{status, reference_point: {window_name: {x,y,z}}}` -> merged into
/// `accumulator.reference_point`.
pub fn parse_response(json: &Value) -> Result<AccumulatorDelta, GatewayApiError> {
    check_status_error("obstruction", json)?;
    let map = required_field("obstruction", json, "reference_point")?
        .as_object()
        .ok_or_else(|| {
            GatewayApiError::internal("reference_point response field is not an object")
        })?;
    let mut delta = AccumulatorDelta::default();
    for (name, value) in map {
        let point = Point3 {
            x: value.get("x").and_then(Value::as_f64).ok_or_else(|| {
                GatewayApiError::internal(format!("reference_point[{name}].x missing"))
            })?,
            y: value.get("y").and_then(Value::as_f64).ok_or_else(|| {
                GatewayApiError::internal(format!("reference_point[{name}].y missing"))
            })?,
            z: value.get("z").and_then(Value::as_f64).ok_or_else(|| {
                GatewayApiError::internal(format!("reference_point[{name}].z missing"))
            })?,
        };
        delta.reference_point.insert(name.clone(), point);
    }
    Ok(delta)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_response_map() {
        let json = serde_json::json!({
            "status": "success",
            "reference_point": { "w1": { "x": 1.0, "y": 2.0, "z": 3.0 } }
        });
        let delta = parse_response(&json).unwrap();
        assert_eq!(
            delta.reference_point.get("w1"),
            Some(&Point3 { x: 1.0, y: 2.0, z: 3.0 })
        );
    }
}
