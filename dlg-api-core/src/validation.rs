//! Request validation and initial-accumulator construction (spec.md §4.4;
//! SPEC_FULL.md §4.4's field-path error-message supplement).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::accumulator::{AccumulatorMap, MaskField};
use crate::endpoints::Endpoint;
use crate::error::GatewayApiError;
use crate::geometry::{Mesh, Point3, RoomPolygon, WindowGeometry};
use crate::wire::SINGLETON_WINDOW;

fn field_error(path: impl std::fmt::Display) -> GatewayApiError {
    GatewayApiError::validation(path)
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a serde_json::Map<String, Value>, GatewayApiError> {
    value.as_object().ok_or_else(|| field_error(path))
}

fn required<'a>(
    object: &'a serde_json::Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<&'a Value, GatewayApiError> {
    object.get(key).ok_or_else(|| field_error(path))
}

fn required_f64(
    object: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<f64, GatewayApiError> {
    required(object, key, path)?
        .as_f64()
        .ok_or_else(|| field_error(path))
}

fn optional_f64(object: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    object.get(key).and_then(Value::as_f64)
}

fn parse_angle_array_field(
    object: &serde_json::Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<[f64; 64]>, GatewayApiError> {
    let Some(value) = object.get(key) else { return Ok(None) };
    let values: Vec<f64> = value
        .as_array()
        .ok_or_else(|| field_error(path))?
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| field_error(path)))
        .collect::<Result<_, _>>()?;
    dlg_std::fixed_array::try_into_angle_array(values)
        .map(Some)
        .map_err(|_| field_error(path))
}

pub fn parse_room_polygon(value: &Value, path: &str) -> Result<RoomPolygon, GatewayApiError> {
    let points: Vec<[f64; 2]> = value
        .as_array()
        .ok_or_else(|| field_error(path))?
        .iter()
        .map(|p| {
            let pair = p.as_array().ok_or_else(|| field_error(path))?;
            let x = pair.first().and_then(Value::as_f64).ok_or_else(|| field_error(path))?;
            let y = pair.get(1).and_then(Value::as_f64).ok_or_else(|| field_error(path))?;
            Ok([x, y])
        })
        .collect::<Result<_, _>>()?;
    let polygon = RoomPolygon(points);
    if !polygon.is_valid() {
        return Err(field_error(path));
    }
    Ok(polygon)
}

pub fn parse_mesh(value: &Value, path: &str) -> Result<Mesh, GatewayApiError> {
    let points: Vec<[f64; 3]> = value
        .as_array()
        .ok_or_else(|| field_error(path))?
        .iter()
        .map(|p| {
            let triple = p.as_array().ok_or_else(|| field_error(path))?;
            let x = triple.first().and_then(Value::as_f64).ok_or_else(|| field_error(path))?;
            let y = triple.get(1).and_then(Value::as_f64).ok_or_else(|| field_error(path))?;
            let z = triple.get(2).and_then(Value::as_f64).ok_or_else(|| field_error(path))?;
            Ok([x, y, z])
        })
        .collect::<Result<_, _>>()?;
    let mesh = Mesh(points);
    if !mesh.is_valid() {
        return Err(field_error(path));
    }
    Ok(mesh)
}

fn parse_window(value: &Value, path: &str) -> Result<WindowGeometry, GatewayApiError> {
    let object = object(value, path)?;
    Ok(WindowGeometry {
        x1: required_f64(object, "x1", &format!("{path}.x1"))?,
        y1: required_f64(object, "y1", &format!("{path}.y1"))?,
        z1: required_f64(object, "z1", &format!("{path}.z1"))?,
        x2: required_f64(object, "x2", &format!("{path}.x2"))?,
        y2: required_f64(object, "y2", &format!("{path}.y2"))?,
        z2: required_f64(object, "z2", &format!("{path}.z2"))?,
        window_frame_ratio: required_f64(
            object,
            "window_frame_ratio",
            &format!("{path}.window_frame_ratio"),
        )?,
        direction_angle: optional_f64(object, "direction_angle"),
        horizon: parse_angle_array_field(object, "horizon", &format!("{path}.horizon"))?,
        zenith: parse_angle_array_field(object, "zenith", &format!("{path}.zenith"))?,
    })
}

pub fn parse_windows(
    value: &Value,
    path: &str,
) -> Result<BTreeMap<String, WindowGeometry>, GatewayApiError> {
    let object = object(value, path)?;
    if object.is_empty() {
        return Err(field_error(path));
    }
    object
        .iter()
        .map(|(name, window)| {
            Ok((name.clone(), parse_window(window, &format!("{path}.{name}"))?))
        })
        .collect()
}

fn parse_parameters(
    value: &Value,
    path: &str,
) -> Result<
    (
        RoomPolygon,
        BTreeMap<String, WindowGeometry>,
        Option<f64>,
        Option<f64>,
    ),
    GatewayApiError,
> {
    let object = object(value, path)?;
    let room_polygon = parse_room_polygon(
        required(object, "room_polygon", &format!("{path}.room_polygon"))?,
        &format!("{path}.room_polygon"),
    )?;
    let windows = parse_windows(
        required(object, "windows", &format!("{path}.windows"))?,
        &format!("{path}.windows"),
    )?;
    let height_roof_over_floor = optional_f64(object, "height_roof_over_floor");
    let floor_height_above_terrain = optional_f64(object, "floor_height_above_terrain");
    Ok((room_polygon, windows, height_roof_over_floor, floor_height_above_terrain))
}

fn parse_matrix_f64(value: &Value, path: &str) -> Result<Vec<Vec<f64>>, GatewayApiError> {
    value
        .as_array()
        .ok_or_else(|| field_error(path))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| field_error(path))?
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| field_error(path)))
                .collect()
        })
        .collect()
}

fn parse_matrix_u8(value: &Value, path: &str) -> Result<Vec<Vec<u8>>, GatewayApiError> {
    value
        .as_array()
        .ok_or_else(|| field_error(path))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| field_error(path))?
                .iter()
                .map(|v| v.as_u64().map(|n| n as u8).ok_or_else(|| field_error(path)))
                .collect()
        })
        .collect()
}

/// Validates the inbound body against `endpoint`'s required-field table
/// (spec.md §4.4, a closed per-endpoint mapping) and builds the pipeline's
/// initial [`AccumulatorMap`].
pub fn validate_and_build(
    endpoint: Endpoint,
    body: &Value,
) -> Result<AccumulatorMap, GatewayApiError> {
    let root = object(body, "$")?;
    match endpoint {
        Endpoint::CalculateDirection | Endpoint::GetReferencePoint => {
            let room_polygon = parse_room_polygon(
                required(root, "room_polygon", "room_polygon")?,
                "room_polygon",
            )?;
            let windows = parse_windows(required(root, "windows", "windows")?, "windows")?;
            Ok(AccumulatorMap::new(Some(room_polygon), windows, None, None, None, None))
        }
        Endpoint::Obstruction | Endpoint::Horizon | Endpoint::Zenith => {
            let x = required_f64(root, "x", "x")?;
            let y = required_f64(root, "y", "y")?;
            let z = required_f64(root, "z", "z")?;
            let direction_angle = required_f64(root, "direction_angle", "direction_angle")?;
            let mesh = parse_mesh(required(root, "mesh", "mesh")?, "mesh")?;
            let mut accumulator = AccumulatorMap::new(None, BTreeMap::new(), None, None, Some(mesh), None);
            accumulator
                .reference_point
                .insert(SINGLETON_WINDOW.to_owned(), Point3 { x, y, z });
            accumulator.direction_angle.insert(SINGLETON_WINDOW.to_owned(), direction_angle);
            Ok(accumulator)
        }
        Endpoint::ObstructionAll | Endpoint::ObstructionParallel => {
            let room_polygon = parse_room_polygon(
                required(root, "room_polygon", "room_polygon")?,
                "room_polygon",
            )?;
            let windows = parse_windows(required(root, "windows", "windows")?, "windows")?;
            let mesh = parse_mesh(required(root, "mesh", "mesh")?, "mesh")?;
            Ok(AccumulatorMap::new(Some(room_polygon), windows, None, None, Some(mesh), None))
        }
        Endpoint::Encode => {
            let model_type = required(root, "model_type", "model_type")?
                .as_str()
                .ok_or_else(|| field_error("model_type"))?
                .to_owned();
            let mesh = parse_mesh(required(root, "mesh", "mesh")?, "mesh")?;
            let (room_polygon, windows, roof, floor) =
                parse_parameters(required(root, "parameters", "parameters")?, "parameters")?;
            Ok(AccumulatorMap::new(
                Some(room_polygon), windows, roof, floor, Some(mesh), Some(model_type),
            ))
        }
        Endpoint::EncodeRaw => {
            let model_type = required(root, "model_type", "model_type")?
                .as_str()
                .ok_or_else(|| field_error("model_type"))?
                .to_owned();
            let (room_polygon, windows, roof, floor) =
                parse_parameters(required(root, "parameters", "parameters")?, "parameters")?;
            for (name, window) in &windows {
                if window.horizon.is_none() || window.zenith.is_none() {
                    return Err(field_error(format!("parameters.windows.{name}.horizon")));
                }
            }
            Ok(AccumulatorMap::new(Some(room_polygon), windows, roof, floor, None, Some(model_type)))
        }
        Endpoint::Simulate => {
            let model_type = required(root, "model_type", "model_type")?
                .as_str()
                .ok_or_else(|| field_error("model_type"))?
                .to_owned();
            let mesh = parse_mesh(required(root, "mesh", "mesh")?, "mesh")?;
            let (room_polygon, windows, roof, floor) =
                parse_parameters(required(root, "parameters", "parameters")?, "parameters")?;
            Ok(AccumulatorMap::new(Some(room_polygon), windows, roof, floor, Some(mesh), Some(model_type)))
        }
        Endpoint::Merge => {
            let room_polygon = parse_room_polygon(
                required(root, "room_polygon", "room_polygon")?,
                "room_polygon",
            )?;
            let windows = parse_windows(required(root, "windows", "windows")?, "windows")?;
            let simulation = object(
                required(root, "simulation", "simulation")?,
                "simulation",
            )?;
            let mut accumulator =
                AccumulatorMap::new(Some(room_polygon), windows, None, None, None, None);
            let mut mask_map = BTreeMap::new();
            for (name, entry) in simulation {
                let entry_object = object(entry, &format!("simulation.{name}"))?;
                let df_values = parse_matrix_f64(
                    required(entry_object, "df_values", &format!("simulation.{name}.df_values"))?,
                    &format!("simulation.{name}.df_values"),
                )?;
                accumulator.simulations.insert(name.clone(), df_values);
                if let Some(mask) = entry_object.get("mask") {
                    mask_map.insert(
                        name.clone(),
                        parse_matrix_u8(mask, &format!("simulation.{name}.mask"))?,
                    );
                }
            }
            accumulator.mask = MaskField::PerWindow(mask_map);
            Ok(accumulator)
        }
        Endpoint::Stats => {
            let df_values =
                parse_matrix_f64(required(root, "df_values", "df_values")?, "df_values")?;
            let mask = parse_matrix_u8(required(root, "mask", "mask")?, "mask")?;
            let mut accumulator = AccumulatorMap::default();
            accumulator.result = Some(df_values);
            accumulator.mask = MaskField::Room(mask);
            Ok(accumulator)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn calculate_direction_requires_windows() {
        let body = json!({ "room_polygon": [[0.0,0.0],[1.0,0.0],[1.0,1.0]], "windows": {} });
        assert!(validate_and_build(Endpoint::CalculateDirection, &body).is_err());
    }

    #[test]
    fn calculate_direction_valid_body() {
        let body = json!({
            "room_polygon": [[0,0],[0,7],[-3,7],[-3,0]],
            "windows": { "w1": {"x1":-2,"y1":7,"z1":2.8,"x2":-0.4,"y2":7.2,"z2":5.4,"window_frame_ratio":0.8} }
        });
        let accumulator = validate_and_build(Endpoint::CalculateDirection, &body).unwrap();
        assert_eq!(accumulator.windows.len(), 1);
    }

    #[test]
    fn stats_seeds_result_and_mask() {
        let body = json!({ "df_values": [[0.1, 0.2]], "mask": [[1, 0]] });
        let accumulator = validate_and_build(Endpoint::Stats, &body).unwrap();
        assert_eq!(accumulator.result, Some(vec![vec![0.1, 0.2]]));
        assert_eq!(accumulator.mask.room(), Some(&vec![vec![1u8, 0]]));
    }

    #[test]
    fn encode_raw_requires_horizon_zenith() {
        let body = json!({
            "model_type": "m1",
            "parameters": {
                "room_polygon": [[0,0],[1,0],[1,1]],
                "windows": { "w1": {"x1":0,"y1":0,"z1":0,"x2":1,"y2":1,"z2":1,"window_frame_ratio":0.8} }
            }
        });
        assert!(validate_and_build(Endpoint::EncodeRaw, &body).is_err());
    }
}
