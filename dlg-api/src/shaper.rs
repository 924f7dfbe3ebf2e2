//! The Response Shaper (spec.md §4.5): formats the final accumulator into
//! the endpoint-specific response body, detecting binary vs JSON.

use axum::response::{IntoResponse, Response};
use axum::Json;
use dlg_api_core::accumulator::{AccumulatorMap, SuccessEnvelope};
use dlg_api_core::endpoints::Endpoint;
use dlg_api_core::error::GatewayApiError;
use dlg_api_core::npz;
use http::header::CONTENT_TYPE;
use serde_json::{json, Value};

/// Shapes the final accumulator into an HTTP response for `endpoint`.
///
/// Binary endpoints (`/encode`, `/encode_raw`) return `accumulator.image`
/// directly, content-typed by its leading magic bytes (spec.md §4.5); every
/// other endpoint returns a `{status: "success", ...}` JSON envelope built
/// from the endpoint-specific keys in spec.md §6.
pub fn shape_response(
    endpoint: Endpoint,
    accumulator: &AccumulatorMap,
) -> Result<Response, GatewayApiError> {
    if endpoint.is_binary_response() {
        let bytes = accumulator
            .image
            .clone()
            .ok_or_else(|| GatewayApiError::internal("encoder produced no image"))?;
        let content_type = if bytes.starts_with(npz::NPZ_MAGIC) {
            "application/octet-stream"
        } else {
            "image/png"
        };
        return Ok(([(CONTENT_TYPE, content_type)], bytes).into_response());
    }

    let body = endpoint_body(endpoint, accumulator)?;
    Ok(Json(SuccessEnvelope::new(body)).into_response())
}

fn endpoint_body(endpoint: Endpoint, accumulator: &AccumulatorMap) -> Result<Value, GatewayApiError> {
    match endpoint {
        Endpoint::CalculateDirection => Ok(json!({ "direction_angle": accumulator.direction_angle })),
        Endpoint::GetReferencePoint => Ok(json!({ "reference_point": accumulator.reference_point })),
        // Singleton obstruction queries key their result under the internal
        // `_singleton` window name; unwrap it into the bare `horizon`/
        // `zenith` 64-float arrays the external response carries (see
        // DESIGN.md's resolution of this endpoint's ambiguous response
        // shape in spec.md §6).
        Endpoint::Obstruction => {
            let horizon = singleton_angle_array(accumulator, "horizon", &accumulator.horizon)?;
            let zenith = singleton_angle_array(accumulator, "zenith", &accumulator.zenith)?;
            Ok(json!({ "horizon": horizon, "zenith": zenith }))
        }
        Endpoint::Horizon => {
            let horizon = singleton_angle_array(accumulator, "horizon", &accumulator.horizon)?;
            Ok(json!({ "horizon": horizon }))
        }
        Endpoint::Zenith => {
            let zenith = singleton_angle_array(accumulator, "zenith", &accumulator.zenith)?;
            Ok(json!({ "zenith": zenith }))
        }
        Endpoint::ObstructionAll | Endpoint::ObstructionParallel => {
            Ok(json!({ "horizon": accumulator.horizon, "zenith": accumulator.zenith }))
        }
        Endpoint::Simulate => {
            let result = accumulator
                .result
                .clone()
                .ok_or_else(|| GatewayApiError::internal("pipeline produced no merged result"))?;
            let mask = accumulator
                .mask
                .room()
                .cloned()
                .ok_or_else(|| GatewayApiError::internal("pipeline produced no merged mask"))?;
            Ok(json!({ "result": result, "mask": mask }))
        }
        Endpoint::Merge => {
            let result = accumulator
                .result
                .clone()
                .ok_or_else(|| GatewayApiError::internal("merger produced no result"))?;
            let mask = accumulator
                .mask
                .room()
                .cloned()
                .ok_or_else(|| GatewayApiError::internal("merger produced no mask"))?;
            Ok(json!({ "result": result, "mask": mask }))
        }
        Endpoint::Stats => Ok(Value::Object(
            accumulator
                .stats
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )),
        Endpoint::Encode | Endpoint::EncodeRaw => {
            unreachable!("binary endpoints are handled by shape_response before this match")
        }
    }
}

fn singleton_angle_array(
    accumulator: &AccumulatorMap,
    field: &str,
    map: &std::collections::BTreeMap<String, [f64; 64]>,
) -> Result<[f64; 64], GatewayApiError> {
    let _ = accumulator;
    map.get(dlg_api_core::wire::SINGLETON_WINDOW).copied().ok_or_else(|| {
        GatewayApiError::internal(format!("pipeline produced no {field} for this query"))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use dlg_api_core::wire::SINGLETON_WINDOW;
    use std::collections::BTreeMap;

    #[test]
    fn simulate_requires_result_and_mask() {
        let accumulator = AccumulatorMap::default();
        let error = shape_response(Endpoint::Simulate, &accumulator).unwrap_err();
        assert!(matches!(
            error.kind,
            dlg_api_core::error::GatewayErrorKind::Internal
        ));
    }

    #[test]
    fn obstruction_unwraps_singleton_window() {
        let mut accumulator = AccumulatorMap::default();
        accumulator.horizon.insert(SINGLETON_WINDOW.to_owned(), [1.0; 64]);
        accumulator.zenith.insert(SINGLETON_WINDOW.to_owned(), [2.0; 64]);
        let body = endpoint_body(Endpoint::Obstruction, &accumulator).unwrap();
        assert_eq!(body["horizon"].as_array().unwrap().len(), 64);
    }

    #[test]
    fn encode_is_handled_as_binary_before_body_construction() {
        let mut accumulator = AccumulatorMap::default();
        accumulator.image = Some(bytes::Bytes::from_static(npz::PNG_MAGIC));
        let response = shape_response(Endpoint::Encode, &accumulator).unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[test]
    fn calculate_direction_body_passes_through_map() {
        let mut accumulator = AccumulatorMap::default();
        accumulator.direction_angle = BTreeMap::from([("w1".to_owned(), 1.5708)]);
        let body = endpoint_body(Endpoint::CalculateDirection, &accumulator).unwrap();
        assert_eq!(body["direction_angle"]["w1"], 1.5708);
    }
}
