//! The `Merge` stage (spec.md §4.2): a single request aggregating every
//! window's geometry and simulation result into one merged daylight-factor
//! matrix and mask.

use serde_json::{json, Value};

use crate::accumulator::{AccumulatorDelta, AccumulatorMap, MaskField};
use crate::error::GatewayApiError;
use crate::geometry::RoomPolygon;
use crate::wire::check_status_error;

#[derive(Clone, Debug)]
pub struct MergeRequest {
    pub room_polygon: RoomPolygon,
    pub windows: Vec<(String, Value)>,
    pub simulations: Vec<(String, Value)>,
}

impl MergeRequest {
    /// Always a single request - the Merge stage aggregates across windows
    /// rather than fanning out over them (spec.md §4.2's request table:
    /// "Merge | single request (aggregates all windows)").
    pub fn parse(accumulator: &AccumulatorMap) -> Vec<Self> {
        let room_polygon = accumulator.room_polygon.clone().unwrap_or(RoomPolygon(vec![]));
        let windows = accumulator
            .window_names()
            .into_iter()
            .filter_map(|name| {
                let window = accumulator.full_window(&name)?;
                Some((
                    name.clone(),
                    json!({
                        "x1": window.x1, "y1": window.y1, "z1": window.z1,
                        "x2": window.x2, "y2": window.y2, "z2": window.z2,
                        "window_frame_ratio": window.window_frame_ratio,
                        "direction_angle": window.direction_angle,
                    }),
                ))
            })
            .collect();
        let per_window_mask = accumulator.mask.per_window();
        let simulations = accumulator
            .simulations
            .iter()
            .map(|(name, df_values)| {
                let mask = per_window_mask.and_then(|m| m.get(name));
                (name.clone(), json!({ "df_values": df_values, "mask": mask }))
            })
            .collect();
        vec![Self { room_polygon, windows, simulations }]
    }

    pub fn to_wire(&self) -> Value {
        json!({
            "room_polygon": self.room_polygon.0,
            "windows": self.windows.iter().cloned().collect::<serde_json::Map<_, _>>(),
            "simulations": self.simulations.iter().cloned().collect::<serde_json::Map<_, _>>(),
        })
    }
}

/// `{status, result: 2D float array, mask: 2D binary array}` -> replaces
/// `accumulator.mask` wholesale with the room-level array (spec.md §4.2).
pub fn parse_response(json: &Value) -> Result<AccumulatorDelta, GatewayApiError> {
    check_status_error("merger", json)?;
    let result = json
        .get("result")
        .ok_or_else(|| GatewayApiError::internal("merger response missing `result`"))?;
    let mask = json
        .get("mask")
        .ok_or_else(|| GatewayApiError::internal("merger response missing `mask`"))?;

    let mut delta = AccumulatorDelta::default();
    delta.result = Some(parse_matrix_f64(result)?);
    delta.mask = Some(MaskField::Room(parse_matrix_u8(mask)?));
    Ok(delta)
}

fn parse_matrix_f64(value: &Value) -> Result<Vec<Vec<f64>>, GatewayApiError> {
    value
        .as_array()
        .ok_or_else(|| GatewayApiError::internal("expected a 2D array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| GatewayApiError::internal("expected a 2D array row"))?
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| GatewayApiError::internal("not a number")))
                .collect()
        })
        .collect()
}

fn parse_matrix_u8(value: &Value) -> Result<Vec<Vec<u8>>, GatewayApiError> {
    value
        .as_array()
        .ok_or_else(|| GatewayApiError::internal("expected a 2D array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| GatewayApiError::internal("expected a 2D array row"))?
                .iter()
                .map(|v| {
                    v.as_u64()
                        .map(|n| n as u8)
                        .ok_or_else(|| GatewayApiError::internal("not an integer"))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_result_and_replaces_mask() {
        let json = serde_json::json!({
            "status": "success",
            "result": [[0.1, 0.2]],
            "mask": [[1, 0]],
        });
        let delta = parse_response(&json).unwrap();
        assert_eq!(delta.result.unwrap(), vec![vec![0.1, 0.2]]);
        match delta.mask.unwrap() {
            MaskField::Room(m) => assert_eq!(m, vec![vec![1, 0]]),
            MaskField::PerWindow(_) => panic!("expected room-level mask"),
        }
    }
}
