//! The `Obstruction` stage (spec.md §4.2): one request per window (or one
//! singleton request for the direct `/obstruction`, `/horizon`, `/zenith`
//! endpoints), ray-casting against the mesh to produce 64-sample
//! horizon/zenith obstruction-angle arrays.

use serde_json::{json, Value};

use crate::accumulator::{AccumulatorDelta, AccumulatorMap};
use crate::error::GatewayApiError;
use crate::geometry::{Mesh, Point3};
use crate::wire::{check_status_error, parse_angle_array, required_field};

#[derive(Clone, Debug)]
pub struct ObstructionRequest {
    pub window_name: String,
    pub point: Point3,
    pub direction_angle: f64,
    pub mesh: Mesh,
}

impl ObstructionRequest {
    /// Iterates `accumulator.reference_point`, pulling `direction_angle[name]`
    /// and the shared `mesh` (spec.md §4.2: "`Obstruction.Parse` iterates
    /// `accumulator.reference_point`... pulling `direction_angle[name]`...
    /// and the shared `mesh`"). Windows that already have 64-element
    /// horizon+zenith arrays are skipped (client-supplied obstruction skip,
    /// spec.md §4.3).
    pub fn parse(accumulator: &AccumulatorMap) -> Vec<Self> {
        let mesh = accumulator.mesh.clone().unwrap_or(Mesh(vec![]));
        accumulator
            .reference_point
            .iter()
            .filter(|(name, _)| !accumulator.obstruction_already_resolved(name))
            .filter_map(|(name, point)| {
                let direction_angle = *accumulator.direction_angle.get(name)?;
                Some(Self {
                    window_name: name.clone(),
                    point: *point,
                    direction_angle,
                    mesh: mesh.clone(),
                })
            })
            .collect()
    }

    pub fn to_wire(&self) -> Value {
        json!({
            "x": self.point.x,
            "y": self.point.y,
            "z": self.point.z,
            "direction_angle": self.direction_angle,
            "mesh": self.mesh.0,
        })
    }
}

/// `{status, data: {results: [{horizon: {obstruction_angle_degrees}, zenith:
/// {obstruction_angle_degrees}}, ...]}}` (64 entries) -> `{horizon: [64
/// floats], zenith: [64 floats]}` keyed by this request's window name
/// (spec.md §4.2).
pub fn parse_response(
    window_name: &str,
    json: &Value,
) -> Result<AccumulatorDelta, GatewayApiError> {
    check_status_error("obstruction", json)?;
    let results = required_field("obstruction", json, "data")
        .and_then(|data| required_field("obstruction", data, "results"))?
        .as_array()
        .ok_or_else(|| GatewayApiError::internal("obstruction data.results is not an array"))?;

    let mut horizon = Vec::with_capacity(results.len());
    let mut zenith = Vec::with_capacity(results.len());
    for entry in results {
        horizon.push(required_field("obstruction", entry, "horizon").and_then(|h| {
            required_field("obstruction", h, "obstruction_angle_degrees")
        })?);
        zenith.push(required_field("obstruction", entry, "zenith").and_then(|z| {
            required_field("obstruction", z, "obstruction_angle_degrees")
        })?);
    }
    let horizon = parse_angle_array("obstruction", &Value::Array(horizon.into_iter().cloned().collect()))?;
    let zenith = parse_angle_array("obstruction", &Value::Array(zenith.into_iter().cloned().collect()))?;

    let mut delta = AccumulatorDelta::default();
    delta.horizon.insert(window_name.to_owned(), horizon);
    delta.zenith.insert(window_name.to_owned(), zenith);
    Ok(delta)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_response() -> Value {
        let results: Vec<Value> = (0..64)
            .map(|i| {
                json!({
                    "horizon": { "obstruction_angle_degrees": i as f64 },
                    "zenith": { "obstruction_angle_degrees": (i as f64) * 2.0 },
                })
            })
            .collect();
        json!({ "status": "success", "data": { "results": results } })
    }

    #[test]
    fn parses_64_entry_arrays() {
        let delta = parse_response("w1", &sample_response()).unwrap();
        assert_eq!(delta.horizon.get("w1").unwrap().len(), 64);
        assert_eq!(delta.zenith.get("w1").unwrap()[1], 2.0);
    }

    #[test]
    fn rejects_wrong_length() {
        let mut response = sample_response();
        response["data"]["results"].as_array_mut().unwrap().pop();
        assert!(parse_response("w1", &response).is_err());
    }
}
