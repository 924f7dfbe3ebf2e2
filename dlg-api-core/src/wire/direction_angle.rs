//! The `DirectionAngle` stage (spec.md §4.2): one request per window,
//! producing each window's outward-normal heading.

use serde_json::{json, Value};

use crate::accumulator::{AccumulatorDelta, AccumulatorMap};
use crate::error::GatewayApiError;
use crate::geometry::RoomPolygon;
use crate::wire::{check_status_error, required_field};

#[derive(Clone, Debug)]
pub struct DirectionAngleRequest {
    pub window_name: String,
    pub room_polygon: RoomPolygon,
    pub window: crate::geometry::WindowGeometry,
}

impl DirectionAngleRequest {
    /// Fans out one request per window (spec.md §4.2: "`DirectionAngle.Parse`
    /// ... iterate `accumulator.windows` and emit one request per entry
    /// preserving the window name"). Windows that already carry a client-
    /// supplied `direction_angle` are skipped.
    pub fn parse(accumulator: &AccumulatorMap) -> Vec<Self> {
        let room_polygon = accumulator.room_polygon.clone().unwrap_or(RoomPolygon(vec![]));
        accumulator
            .windows
            .iter()
            .filter(|(name, _)| !accumulator.direction_angle.contains_key(*name))
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
            "windows": { &self.window_name: window_to_wire(&self.window) },
        })
    }
}

fn window_to_wire(window: &crate::geometry::WindowGeometry) -> Value {
    json!({
        "x1": window.x1, "y1": window.y1, "z1": window.z1,
        "x2": window.x2, "y2": window.y2, "z2": window.z2,
        "window_frame_ratio": window.window_frame_ratio,
    })
}

/// `{status, direction_angle: {window_name: radians}}` -> merged into
/// `accumulator.direction_angle` (spec.md §4.2).
pub fn parse_response(json: &Value) -> Result<AccumulatorDelta, GatewayApiError> {
    check_status_error("obstruction", json)?;
    let map = required_field("obstruction", json, "direction_angle")?
        .as_object()
        .ok_or_else(|| {
            GatewayApiError::internal("direction_angle response field is not an object")
        })?;
    let mut delta = AccumulatorDelta::default();
    for (name, value) in map {
        let angle = value.as_f64().ok_or_else(|| {
            GatewayApiError::internal(format!(
                "direction_angle[{name}] is not a number"
            ))
        })?;
        delta.direction_angle.insert(name.clone(), angle);
    }
    Ok(delta)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn skips_windows_with_known_angle() {
        let mut acc = AccumulatorMap::new(
            None,
            BTreeMap::from([(
                "w1".to_owned(),
                crate::geometry::WindowGeometry {
                    x1: 0.0, y1: 0.0, z1: 0.0, x2: 1.0, y2: 1.0, z2: 1.0,
                    window_frame_ratio: 0.8,
                    direction_angle: None, horizon: None, zenith: None,
                },
            )]),
            None, None, None, None,
        );
        assert_eq!(DirectionAngleRequest::parse(&acc).len(), 1);
        acc.direction_angle.insert("w1".to_owned(), 1.0);
        assert_eq!(DirectionAngleRequest::parse(&acc).len(), 0);
    }

    #[test]
    fn parses_response_map() {
        let json = serde_json::json!({
            "status": "success",
            "direction_angle": { "w1": 1.5708 }
        });
        let delta = parse_response(&json).unwrap();
        assert_eq!(delta.direction_angle.get("w1"), Some(&1.5708));
    }
}
