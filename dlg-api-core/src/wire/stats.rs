//! The `Stats` stage (spec.md §4.2): a single request carrying a daylight
//! factor matrix and mask, producing pass-through scalar metrics.

use serde_json::Value;

use crate::accumulator::{AccumulatorDelta, AccumulatorMap};
use crate::error::GatewayApiError;
use crate::geometry::Matrix;
use crate::wire::check_status_error;

#[derive(Clone, Debug)]
pub struct StatsRequest {
    pub df_values: Matrix<f64>,
    pub mask: Matrix<u8>,
}

impl StatsRequest {
    /// Always a single request (spec.md §4.2: "Stats | single request").
    /// The `/stats` endpoint's validator seeds `accumulator.result` and a
    /// room-level `accumulator.mask` directly from the request body, since
    /// `/stats` has no prior pipeline stage.
    pub fn parse(accumulator: &AccumulatorMap) -> Vec<Self> {
        let Some(df_values) = accumulator.result.clone() else {
            return vec![];
        };
        let Some(mask) = accumulator.mask.room().cloned() else {
            return vec![];
        };
        vec![Self { df_values, mask }]
    }

    pub fn to_wire(&self) -> Value {
        serde_json::json!({ "df_values": self.df_values, "mask": self.mask })
    }
}

/// Pass-through map of scalar metrics (spec.md §4.2, §6: `{status, min, max,
/// mean, median, valid_area}`).
pub fn parse_response(json: &Value) -> Result<AccumulatorDelta, GatewayApiError> {
    check_status_error("stats", json)?;
    let mut delta = AccumulatorDelta::default();
    let object = json.as_object().ok_or_else(|| {
        GatewayApiError::internal("stats response is not a JSON object")
    })?;
    for (key, value) in object {
        if key != "status" {
            delta.stats.insert(key.clone(), value.clone());
        }
    }
    Ok(delta)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stats_response_passes_through_scalars() {
        let json = serde_json::json!({
            "status": "success",
            "min": 0.1, "max": 0.9, "mean": 0.5, "median": 0.45, "valid_area": 120.0,
        });
        let delta = parse_response(&json).unwrap();
        assert_eq!(delta.stats.len(), 5);
        assert_eq!(delta.stats.get("mean").unwrap().as_f64(), Some(0.5));
    }
}
