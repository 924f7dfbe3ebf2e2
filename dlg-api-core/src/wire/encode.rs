//! The `Encode` stage (spec.md §4.2): one request per window, producing a
//! PNG-encoded tensor image (and an optional per-window mask) from an NPZ or
//! raw-PNG binary response.

use serde_json::{json, Value};

use crate::accumulator::{AccumulatorDelta, AccumulatorMap, MaskField};
use crate::error::GatewayApiError;
use crate::geometry::{RoomPolygon, WindowGeometry};
use crate::npz;

#[derive(Clone, Debug)]
pub struct EncodeRequest {
    pub window_name: String,
    pub model_type: String,
    pub room_polygon: RoomPolygon,
    pub window: WindowGeometry,
}

impl EncodeRequest {
    /// One request per window, carrying the full geometry (corners,
    /// obstruction arrays, direction angle) derived so far (spec.md §4.2:
    /// "windows: {name: full geometry incl. obstruction arrays + direction
    /// angle}").
    pub fn parse(accumulator: &AccumulatorMap) -> Vec<Self> {
        let room_polygon = accumulator.room_polygon.clone().unwrap_or(RoomPolygon(vec![]));
        let model_type = accumulator.model_type.clone().unwrap_or_default();
        accumulator
            .window_names()
            .into_iter()
            .filter_map(|name| {
                let window = accumulator.full_window(&name)?;
                Some(Self {
                    window_name: name,
                    model_type: model_type.clone(),
                    room_polygon: room_polygon.clone(),
                    window,
                })
            })
            .collect()
    }

    pub fn to_wire(&self) -> Value {
        json!({
            "model_type": self.model_type,
            "parameters": {
                "room_polygon": self.room_polygon.0,
                "windows": { &self.window_name: window_to_wire(&self.window) },
            }
        })
    }
}

fn window_to_wire(window: &WindowGeometry) -> Value {
    json!({
        "x1": window.x1, "y1": window.y1, "z1": window.z1,
        "x2": window.x2, "y2": window.y2, "z2": window.z2,
        "window_frame_ratio": window.window_frame_ratio,
        "direction_angle": window.direction_angle,
        "horizon": window.horizon,
        "zenith": window.zenith,
    })
}

/// Dispatches on the leading magic bytes (spec.md §4.2): `PK` -> NPZ
/// archive, PNG signature -> raw passthrough, neither -> `InternalError`.
pub fn parse_binary_response(
    window_name: &str,
    all_window_names: &[String],
    bytes: &bytes::Bytes,
) -> Result<AccumulatorDelta, GatewayApiError> {
    let mut delta = AccumulatorDelta::default();
    if bytes.starts_with(npz::NPZ_MAGIC) {
        let archive = npz::decode_npz(bytes)?;
        let (image_key, _mask_key) = npz::resolve_image_mask_keys(&archive, window_name);
        if let Some(image_key) = image_key {
            let array = archive
                .members
                .iter()
                .find(|(name, _)| name == &image_key)
                .map(|(_, array)| array.clone())
                .expect("resolve_image_mask_keys only returns keys present in the archive");
            delta.image = Some(npz::image_array_to_png(array)?);
        }
        let mask_deltas = npz::extract_mask_deltas(&archive, all_window_names);
        if !mask_deltas.is_empty() {
            delta.mask = Some(MaskField::PerWindow(mask_deltas.into_iter().collect()));
        }
        Ok(delta)
    } else if bytes.starts_with(npz::PNG_MAGIC) {
        delta.image = Some(bytes.clone());
        Ok(delta)
    } else {
        Err(GatewayApiError::internal(
            "encoder response is neither an NPZ archive nor a PNG image",
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_unrecognized_bytes() {
        let bytes = bytes::Bytes::from_static(b"not an image");
        assert!(parse_binary_response("w1", &[], &bytes).is_err());
    }

    #[test]
    fn passes_through_raw_png() {
        let mut raw = npz::PNG_MAGIC.to_vec();
        raw.extend_from_slice(b"rest-of-file");
        let bytes = bytes::Bytes::from(raw.clone());
        let delta = parse_binary_response("w1", &[], &bytes).unwrap();
        assert_eq!(delta.image.unwrap(), bytes::Bytes::from(raw));
    }
}
