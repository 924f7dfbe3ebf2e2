//! The `Model` stage (spec.md §4.2): one multipart request per window
//! (consuming the Encoder stage's PNG bytes), producing a daylight-factor
//! matrix per window.
//!
//! Per SPEC_FULL.md §9 Open Question 3, `accumulator.image` is a single
//! scalar field even during multi-window fan-out; every window's Model
//! request in a multi-window run is built from whatever PNG bytes the
//! Encode stage's fan-out last wrote. This mirrors a documented limitation
//! of the system being modeled, not a bug introduced here.

use serde_json::Value;

use crate::accumulator::{AccumulatorDelta, AccumulatorMap, MaskField};
use crate::error::GatewayApiError;
use crate::wire::check_status_error;

#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub window_name: String,
    pub encoded_png: bytes::Bytes,
}

impl ModelRequest {
    pub fn parse(accumulator: &AccumulatorMap) -> Vec<Self> {
        let Some(encoded_png) = accumulator.image.clone() else {
            return vec![];
        };
        accumulator
            .window_names()
            .into_iter()
            .map(|window_name| Self {
                window_name,
                encoded_png: encoded_png.clone(),
            })
            .collect()
    }
}

/// `{status, simulation: 2D float array, shape?: [h, w], mask?: array|base64}`
/// -> `accumulator.simulations[window_name] = df_values`; a model-supplied
/// mask overwrites the encoder-derived one for this window (spec.md §4.2).
pub fn parse_response(
    window_name: &str,
    json: &Value,
) -> Result<AccumulatorDelta, GatewayApiError> {
    check_status_error("model", json)?;
    let simulation = json
        .get("simulation")
        .ok_or_else(|| GatewayApiError::internal("model response missing `simulation`"))?;
    let matrix = parse_matrix_f64(simulation)?;

    let mut delta = AccumulatorDelta::default();
    delta.simulation = Some((window_name.to_owned(), matrix));

    if let Some(mask) = json.get("mask") {
        let mask_matrix = parse_mask(mask)?;
        let mut map = std::collections::BTreeMap::new();
        map.insert(window_name.to_owned(), mask_matrix);
        delta.mask = Some(MaskField::PerWindow(map));
    }
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
                .map(|v| {
                    v.as_f64()
                        .ok_or_else(|| GatewayApiError::internal("matrix entry is not a number"))
                })
                .collect()
        })
        .collect()
}

fn parse_mask(value: &Value) -> Result<Vec<Vec<u8>>, GatewayApiError> {
    if let Some(base64_str) = value.as_str() {
        let bytes = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            base64_str,
        )
        .map_err(|e| GatewayApiError::internal(format!("invalid base64 mask: {e}")))?;
        return Ok(vec![bytes]);
    }
    value
        .as_array()
        .ok_or_else(|| GatewayApiError::internal("mask is neither base64 nor a 2D array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| GatewayApiError::internal("expected a 2D mask row"))?
                .iter()
                .map(|v| {
                    v.as_u64()
                        .map(|n| n as u8)
                        .ok_or_else(|| GatewayApiError::internal("mask entry is not an integer"))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simulation_and_overwrites_mask() {
        let json = serde_json::json!({
            "status": "success",
            "simulation": [[1.0, 2.0], [3.0, 4.0]],
            "mask": [[1, 0], [0, 1]],
        });
        let delta = parse_response("w1", &json).unwrap();
        assert_eq!(delta.simulation.unwrap().1, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        match delta.mask.unwrap() {
            MaskField::PerWindow(map) => assert_eq!(map.get("w1"), Some(&vec![vec![1, 0], vec![0, 1]])),
            MaskField::Room(_) => panic!("expected per-window mask"),
        }
    }
}
