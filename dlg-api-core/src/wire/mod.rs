//! Wire contracts (spec.md §4.2): one request/response pair per pipeline
//! [`crate::endpoints::Stage`]. Request types share `parse(accumulator) ->
//! Vec<Self>` (the fan-out hook) and `to_wire() -> serde_json::Value`.
//! Response parsers share `parse_response(bytes) -> AccumulatorDelta`.

pub mod direction_angle;
pub mod encode;
pub mod merge;
pub mod model;
pub mod obstruction;
pub mod reference_point;
pub mod stats;

use serde_json::Value;

use crate::error::{GatewayApiError, GatewayErrorKind};

/// The window-name key used for singleton (non-fanned-out) requests, e.g.
/// `/obstruction`'s direct `x,y,z,direction_angle` body. Internal only -
/// never serialized to the client.
pub const SINGLETON_WINDOW: &str = "_singleton";

/// Checks the `{status: "error", error: ...}` envelope shared by every
/// downstream JSON response (spec.md §4.2: "JSON with status/error").
pub fn check_status_error(
    service: &str,
    json: &Value,
) -> Result<(), GatewayApiError> {
    if json.get("status").and_then(Value::as_str) == Some("error") {
        let msg = json
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("downstream reported an error")
            .to_owned();
        return Err(GatewayApiError::new(
            GatewayErrorKind::Response {
                service: service.to_owned(),
                status: 200,
                body: msg,
            },
            format!("{service} returned a status=error envelope"),
        ));
    }
    Ok(())
}

pub fn required_field<'a>(
    service: &str,
    json: &'a Value,
    field: &str,
) -> Result<&'a Value, GatewayApiError> {
    json.get(field).ok_or_else(|| {
        GatewayApiError::internal(format!(
            "{service} response missing expected field `{field}`"
        ))
    })
}

pub fn required_f64(
    service: &str,
    json: &Value,
    field: &str,
) -> Result<f64, GatewayApiError> {
    required_field(service, json, field)?
        .as_f64()
        .ok_or_else(|| {
            GatewayApiError::internal(format!(
                "{service} response field `{field}` is not a number"
            ))
        })
}

/// Parses a JSON array of exactly 64 floats (spec.md §3's horizon/zenith
/// invariant).
pub fn parse_angle_array(
    service: &str,
    value: &Value,
) -> Result<[f64; 64], GatewayApiError> {
    let values: Vec<f64> = value
        .as_array()
        .ok_or_else(|| {
            GatewayApiError::internal(format!(
                "{service} angle array is not a JSON array"
            ))
        })?
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                GatewayApiError::internal(format!(
                    "{service} angle array contains a non-numeric entry"
                ))
            })
        })
        .collect::<Result<_, _>>()?;
    dlg_std::fixed_array::try_into_angle_array(values).map_err(|len| {
        GatewayApiError::internal(format!(
            "{service} angle array has {len} entries, expected 64"
        ))
    })
}
