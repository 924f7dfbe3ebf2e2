//! NPZ/NPY binary decoding and PNG normalization (spec.md §4.2, §6;
//! SPEC_FULL.md §4.2's key-resolution and mask-extraction supplements).
//!
//! An NPZ file is a ZIP archive (detected by the `PK` magic) of `.npy`
//! members. Each `.npy` member is the published numeric-array file format:
//! magic `\x93NUMPY`, a version byte pair, a little-endian header-length
//! prefix, an ASCII literal-dict header describing `descr`/`fortran_order`/
//! `shape`, then the raw buffer.

use std::io::{Cursor, Read};

use crate::error::GatewayApiError;

pub const NPZ_MAGIC: &[u8] = b"PK";
pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// A decoded `.npy` array: its shape and a row-major `f64` buffer (every
/// numeric dtype the encoder emits - `float32`, `float64`, `uint8` - is
/// widened to `f64` at decode time since the gateway never computes over
/// these values, only reshapes and re-encodes them).
#[derive(Clone, Debug)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl NpyArray {
    /// Reshapes a flat array of shape `[h, w]` or `[h, w, c]` into row-major
    /// `Vec<Vec<f64>>`, collapsing the channel dimension by taking the first
    /// channel (mask arrays are single-channel; multi-channel image arrays
    /// are PNG-encoded directly from the flat buffer instead, see
    /// [`to_png_bytes`]).
    pub fn into_matrix(self) -> Vec<Vec<f64>> {
        let (h, w) = match self.shape.as_slice() {
            [h, w] => (*h, *w),
            [h, w, _c] => (*h, *w),
            _ => (1, self.values.len()),
        };
        let channels = if self.shape.len() == 3 { self.shape[2] } else { 1 };
        let mut rows = Vec::with_capacity(h);
        for row in 0..h {
            let mut cols = Vec::with_capacity(w);
            for col in 0..w {
                let idx = (row * w + col) * channels;
                cols.push(self.values.get(idx).copied().unwrap_or(0.0));
            }
            rows.push(cols);
        }
        rows
    }
}

/// Decodes one `.npy` buffer. Supports `<f4`, `<f8`, `|u1` dtypes (the
/// encoder's image/mask outputs; no fortran-order or big-endian support is
/// needed since the encoder always writes little-endian C-order arrays).
pub fn decode_npy(bytes: &[u8]) -> Result<NpyArray, GatewayApiError> {
    if bytes.len() < 10 || &bytes[0..6] != NPY_MAGIC {
        return Err(GatewayApiError::internal("npy member missing magic bytes"));
    }
    let major = bytes[6];
    let header_len_bytes = if major == 1 { 2 } else { 4 };
    let header_len = if major == 1 {
        u16::from_le_bytes([bytes[8], bytes[9]]) as usize
    } else {
        u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize
    };
    let header_text_start = 8 + header_len_bytes;
    let data_start = header_text_start + header_len;
    let header = std::str::from_utf8(&bytes[header_text_start..data_start])
        .map_err(|_| GatewayApiError::internal("npy header is not valid UTF-8"))?;

    let descr = extract_dict_str(header, "descr")
        .ok_or_else(|| GatewayApiError::internal("npy header missing descr"))?;
    let shape = extract_shape(header)
        .ok_or_else(|| GatewayApiError::internal("npy header missing shape"))?;

    let raw = &bytes[data_start..];
    let values = match descr.as_str() {
        "<f4" => raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()) as f64)
            .collect(),
        "<f8" => raw
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect(),
        "|u1" => raw.iter().map(|&b| b as f64).collect(),
        other => {
            return Err(GatewayApiError::internal(format!(
                "unsupported npy dtype `{other}`"
            )))
        }
    };
    Ok(NpyArray { shape, values })
}

fn extract_dict_str(header: &str, key: &str) -> Option<String> {
    let pattern = format!("'{key}':");
    let idx = header.find(&pattern)? + pattern.len();
    let rest = header[idx..].trim_start();
    let rest = rest.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(rest[..end].to_owned())
}

fn extract_shape(header: &str) -> Option<Vec<usize>> {
    let idx = header.find("'shape':")? + "'shape':".len();
    let rest = header[idx..].trim_start();
    let rest = rest.strip_prefix('(')?;
    let end = rest.find(')')?;
    rest[..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().ok())
        .collect()
}

/// One member of a decoded NPZ archive.
pub struct NpzArchive {
    pub members: Vec<(String, NpyArray)>,
}

pub fn decode_npz(bytes: &[u8]) -> Result<NpzArchive, GatewayApiError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| GatewayApiError::internal(format!("invalid NPZ archive: {e}")))?;
    let mut members = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| GatewayApiError::internal(format!("invalid NPZ entry: {e}")))?;
        let name = entry
            .name()
            .strip_suffix(".npy")
            .unwrap_or(entry.name())
            .to_owned();
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| GatewayApiError::internal(format!("failed reading NPZ entry: {e}")))?;
        members.push((name, decode_npy(&buf)?));
    }
    Ok(NpzArchive { members })
}

/// The 3-pattern NPZ key resolution strategy (SPEC_FULL.md §4.2, grounded
/// verbatim on `npz_key_extractor.py::NPZKeyExtractor.extract_keys`).
/// Returns `(image_key, mask_key)`, either of which may be absent.
pub fn resolve_image_mask_keys(
    archive: &NpzArchive,
    window_name: &str,
) -> (Option<String>, Option<String>) {
    let qualified_image = format!("{window_name}_image");
    let qualified_mask = format!("{window_name}_mask");
    if archive.members.iter().any(|(name, _)| name == &qualified_image) {
        let mask = archive
            .members
            .iter()
            .any(|(name, _)| name == &qualified_mask)
            .then(|| qualified_mask);
        return (Some(qualified_image), mask);
    }

    if archive.members.iter().any(|(name, _)| name == "image") {
        let mask = archive
            .members
            .iter()
            .any(|(name, _)| name == "mask")
            .then(|| "mask".to_owned());
        return (Some("image".to_owned()), mask);
    }

    let first_image = archive
        .members
        .iter()
        .find(|(name, _)| name.ends_with("_image") || name == "image")
        .map(|(name, _)| name.clone());
    if let Some(image_key) = first_image {
        let mask_key = image_key
            .strip_suffix("_image")
            .map(|prefix| format!("{prefix}_mask"));
        let mask_key = mask_key.filter(|key| {
            archive.members.iter().any(|(name, _)| name == key)
        });
        return (Some(image_key), mask_key);
    }

    (None, None)
}

/// The mask-extraction pass (SPEC_FULL.md §4.2, grounded verbatim on
/// `mask_extractor.py::MaskExtractor`): every `_mask`-suffixed key is
/// considered, independent of the resolved image key. A literal `mask` key
/// broadcasts to every window name in `all_window_names`; a qualified
/// `{name}_mask` key applies only to that window.
pub fn extract_mask_deltas(
    archive: &NpzArchive,
    all_window_names: &[String],
) -> Vec<(String, Vec<Vec<u8>>)> {
    let mut deltas = Vec::new();
    for (name, array) in &archive.members {
        if name == "mask" {
            let matrix = to_u8_matrix(array.clone());
            for window_name in all_window_names {
                deltas.push((window_name.clone(), matrix.clone()));
            }
        } else if let Some(window_name) = name.strip_suffix("_mask") {
            deltas.push((window_name.to_owned(), to_u8_matrix(array.clone())));
        }
    }
    deltas
}

fn to_u8_matrix(array: NpyArray) -> Vec<Vec<u8>> {
    array
        .into_matrix()
        .into_iter()
        .map(|row| row.into_iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect())
        .collect()
}

/// Normalizes an extracted `_image` array to PNG bytes (SPEC_FULL.md §4.2):
/// if every sample is `<= 1.0`, multiply by 255 and round; otherwise treat
/// the buffer as already byte-range.
pub fn image_array_to_png(array: NpyArray) -> Result<bytes::Bytes, GatewayApiError> {
    let (height, width, channels) = match array.shape.as_slice() {
        [h, w] => (*h, *w, 1usize),
        [h, w, c] => (*h, *w, *c),
        _ => return Err(GatewayApiError::internal("image array has unsupported shape")),
    };
    let max = array.values.iter().cloned().fold(f64::MIN, f64::max);
    let scale = if max <= 1.0 { 255.0 } else { 1.0 };
    let pixels: Vec<u8> = array
        .values
        .iter()
        .map(|&v| (v * scale).round().clamp(0.0, 255.0) as u8)
        .collect();

    let mut png_bytes = Vec::new();
    {
        let mut encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        let color_type = match channels {
            1 => image::ExtendedColorType::L8,
            3 => image::ExtendedColorType::Rgb8,
            4 => image::ExtendedColorType::Rgba8,
            _ => {
                return Err(GatewayApiError::internal(format!(
                    "image array has unsupported channel count {channels}"
                )))
            }
        };
        use image::ImageEncoder;
        encoder
            .write_image(&pixels, width as u32, height as u32, color_type)
            .map_err(|e| GatewayApiError::internal(format!("PNG encode failed: {e}")))?;
    }
    Ok(bytes::Bytes::from(png_bytes))
}

#[cfg(test)]
mod test {
    use super::*;

    fn npy(shape: Vec<usize>, values: Vec<f64>) -> NpyArray {
        NpyArray { shape, values }
    }

    #[test]
    fn resolves_window_qualified_keys() {
        let archive = NpzArchive {
            members: vec![
                ("w1_image".to_owned(), npy(vec![1, 1], vec![0.0])),
                ("w1_mask".to_owned(), npy(vec![1, 1], vec![1.0])),
            ],
        };
        let (image, mask) = resolve_image_mask_keys(&archive, "w1");
        assert_eq!(image.as_deref(), Some("w1_image"));
        assert_eq!(mask.as_deref(), Some("w1_mask"));
    }

    #[test]
    fn falls_back_to_generic_keys() {
        let archive = NpzArchive {
            members: vec![
                ("image".to_owned(), npy(vec![1, 1], vec![0.0])),
                ("mask".to_owned(), npy(vec![1, 1], vec![1.0])),
            ],
        };
        let (image, mask) = resolve_image_mask_keys(&archive, "w1");
        assert_eq!(image.as_deref(), Some("image"));
        assert_eq!(mask.as_deref(), Some("mask"));
    }

    #[test]
    fn falls_back_to_first_image_suffixed_key() {
        let archive = NpzArchive {
            members: vec![("foo_image".to_owned(), npy(vec![1, 1], vec![0.0]))],
        };
        let (image, mask) = resolve_image_mask_keys(&archive, "w1");
        assert_eq!(image.as_deref(), Some("foo_image"));
        assert_eq!(mask, None);
    }

    #[test]
    fn generic_mask_broadcasts_to_every_window() {
        let archive = NpzArchive {
            members: vec![("mask".to_owned(), npy(vec![1, 1], vec![1.0]))],
        };
        let names = vec!["w1".to_owned(), "w2".to_owned()];
        let deltas = extract_mask_deltas(&archive, &names);
        assert_eq!(deltas.len(), 2);
    }

    #[test]
    fn normalization_scales_unit_range() {
        let array = npy(vec![1, 2], vec![0.0, 1.0]);
        let png = image_array_to_png(array).unwrap();
        assert_eq!(&png[0..8], PNG_MAGIC);
    }

    #[test]
    fn reshape_into_matrix_row_major() {
        let array = npy(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(array.into_matrix(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }
}
