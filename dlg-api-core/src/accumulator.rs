//! The accumulator state machine (spec.md §3, §4.3): the request-local map
//! threaded through the pipeline, and the deltas each stage's response
//! parser produces to be merged back in.
//!
//! Grounded on `result_merger.py`'s `MERGEABLE_KEYS` deep-merge-by-window-name
//! behavior (see SPEC_FULL.md §3): `direction_angle`, `reference_point`,
//! `horizon`, and `zenith` all merge this way. `mask` merges the same way
//! while the accumulator is mid-pipeline, but a Merge-stage response
//! replaces it wholesale with a single room-level array. `simulations` is
//! constructed window-by-window, never merged from an already-window-keyed
//! delta. `image` is scalar-overwrite and is stripped once a Merge stage
//! runs.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::geometry::{Matrix, Mesh, Point3, RoomPolygon, WindowGeometry};

/// The `mask` accumulator field has two distinct shapes depending on pipeline
/// stage: per-window (populated by the Encoder stage, keyed by window name)
/// or room-level (populated by the Merger stage, one array for the whole
/// invocation - see spec.md §4.2's Merger response and the NPZ mask
/// extraction's broadcast-to-every-window special case in SPEC_FULL.md §4.2).
#[derive(Clone, Debug, PartialEq)]
pub enum MaskField {
    PerWindow(BTreeMap<String, Matrix<u8>>),
    Room(Matrix<u8>),
}

impl Default for MaskField {
    fn default() -> Self {
        Self::PerWindow(BTreeMap::new())
    }
}

impl MaskField {
    /// Deep-merges `delta` into `self`. A `Room` delta always replaces
    /// whatever was there (scalar overwrite, matching the Merger stage's
    /// "replaces the per-window mask map" behavior). A `PerWindow` delta
    /// merges key-by-key; if `self` was previously `Room` (shouldn't happen
    /// in a correctly-ordered pipeline, but the merge must not panic), the
    /// incoming per-window delta simply replaces it.
    pub fn merge(&mut self, delta: MaskField) {
        match (self, delta) {
            (this @ MaskField::Room(_), delta) => *this = delta,
            (MaskField::PerWindow(existing), MaskField::PerWindow(incoming)) => {
                existing.extend(incoming);
            }
            (this, delta @ MaskField::Room(_)) => *this = delta,
        }
    }

    pub fn per_window(&self) -> Option<&BTreeMap<String, Matrix<u8>>> {
        match self {
            Self::PerWindow(m) => Some(m),
            Self::Room(_) => None,
        }
    }

    pub fn room(&self) -> Option<&Matrix<u8>> {
        match self {
            Self::Room(m) => Some(m),
            Self::PerWindow(_) => None,
        }
    }
}

/// The object threaded through the pipeline for one request invocation.
/// Owned exclusively by that invocation - never shared across requests.
#[derive(Clone, Debug, Default)]
pub struct AccumulatorMap {
    pub room_polygon: Option<RoomPolygon>,
    pub windows: BTreeMap<String, WindowGeometry>,
    pub height_roof_over_floor: Option<f64>,
    pub floor_height_above_terrain: Option<f64>,
    pub mesh: Option<Mesh>,
    pub model_type: Option<String>,

    pub direction_angle: BTreeMap<String, f64>,
    pub reference_point: BTreeMap<String, Point3>,
    pub horizon: BTreeMap<String, [f64; 64]>,
    pub zenith: BTreeMap<String, [f64; 64]>,

    pub image: Option<Bytes>,
    pub mask: MaskField,
    pub simulations: BTreeMap<String, Matrix<f64>>,
    pub result: Option<Matrix<f64>>,
    /// Pass-through scalar metrics from the Stats stage.
    pub stats: BTreeMap<String, serde_json::Value>,
}

/// A single fan-out (or singleton) stage response, translated into the units
/// the executor merges back into the parent [`AccumulatorMap`].
#[derive(Clone, Debug, Default)]
pub struct AccumulatorDelta {
    pub direction_angle: BTreeMap<String, f64>,
    pub reference_point: BTreeMap<String, Point3>,
    pub horizon: BTreeMap<String, [f64; 64]>,
    pub zenith: BTreeMap<String, [f64; 64]>,
    pub image: Option<Bytes>,
    pub mask: Option<MaskField>,
    /// `(window_name, df_values)`: constructed, not merged (spec.md §4.2's
    /// Model response parser: `accumulator.simulations[window_name] =
    /// df_values`).
    pub simulation: Option<(String, Matrix<f64>)>,
    pub result: Option<Matrix<f64>>,
    pub stats: BTreeMap<String, serde_json::Value>,
}

impl AccumulatorMap {
    /// Creates the root accumulator from the validated request body.
    pub fn new(
        room_polygon: Option<RoomPolygon>,
        windows: BTreeMap<String, WindowGeometry>,
        height_roof_over_floor: Option<f64>,
        floor_height_above_terrain: Option<f64>,
        mesh: Option<Mesh>,
        model_type: Option<String>,
    ) -> Self {
        // Seed the per-window mergeable maps from any client-supplied
        // horizon/zenith/direction_angle so that later stages can skip
        // work already done by the caller (spec.md §4.3's obstruction-skip
        // boundary behavior).
        let mut direction_angle = BTreeMap::new();
        let mut horizon = BTreeMap::new();
        let mut zenith = BTreeMap::new();
        for (name, window) in &windows {
            if let Some(angle) = window.direction_angle {
                direction_angle.insert(name.clone(), angle);
            }
            if let Some(h) = window.horizon {
                horizon.insert(name.clone(), h);
            }
            if let Some(z) = window.zenith {
                zenith.insert(name.clone(), z);
            }
        }

        Self {
            room_polygon,
            windows,
            height_roof_over_floor,
            floor_height_above_terrain,
            mesh,
            model_type,
            direction_angle,
            horizon,
            zenith,
            ..Default::default()
        }
    }

    /// Merges a stage response's delta into this accumulator. Map fields
    /// deep-merge by window name (associative and commutative, so the fan-in
    /// order doesn't matter - spec.md §4.3's ordering guarantee). Scalar and
    /// binary fields overwrite.
    pub fn merge(&mut self, delta: AccumulatorDelta) {
        self.direction_angle.extend(delta.direction_angle);
        self.reference_point.extend(delta.reference_point);
        self.horizon.extend(delta.horizon);
        self.zenith.extend(delta.zenith);

        if let Some(image) = delta.image {
            self.image = Some(image);
        }
        if let Some(mask_delta) = delta.mask {
            self.mask.merge(mask_delta);
        }
        if let Some((window_name, simulation)) = delta.simulation {
            self.simulations.insert(window_name, simulation);
        }
        if let Some(result) = delta.result {
            self.result = Some(result);
        }
        self.stats.extend(delta.stats);
    }

    /// Strips the accumulator-local `image` field. Called after a Merge
    /// stage runs (spec.md §3: "`image` is... deleted from the final merged
    /// output once a Merge stage runs").
    pub fn strip_image(&mut self) {
        self.image = None;
    }

    /// Returns the window names in a deterministic order, used for fan-out.
    pub fn window_names(&self) -> Vec<String> {
        self.windows.keys().cloned().collect()
    }

    /// Assembles the "full" window geometry for `name`: the base corners and
    /// frame ratio, plus whatever `direction_angle`/`horizon`/`zenith` the
    /// pipeline has derived so far for this window. Used by the Encode and
    /// Merge stages' request construction (spec.md §4.2's `Encode`/`Merge`
    /// wire field table).
    pub fn full_window(&self, name: &str) -> Option<WindowGeometry> {
        let base = self.windows.get(name)?;
        Some(WindowGeometry {
            direction_angle: self
                .direction_angle
                .get(name)
                .copied()
                .or(base.direction_angle),
            horizon: self.horizon.get(name).copied().or(base.horizon),
            zenith: self.zenith.get(name).copied().or(base.zenith),
            ..base.clone()
        })
    }

    /// Whether window `name` already has 64-element horizon and zenith
    /// arrays, i.e. the Obstruction stage can be skipped for it (spec.md
    /// §4.3: "the client supplies horizon and zenith arrays per-window...
    /// the Obstruction stage is skipped for those windows").
    pub fn obstruction_already_resolved(&self, name: &str) -> bool {
        self.horizon.contains_key(name) && self.zenith.contains_key(name)
    }
}

/// The `status: "success"` JSON envelope every non-binary endpoint response
/// is wrapped in (spec.md §4.5).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    pub status: &'static str,
    #[serde(flatten)]
    pub body: T,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(body: T) -> Self {
        Self {
            status: "success",
            body,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn window(frame_ratio: f64) -> WindowGeometry {
        WindowGeometry {
            x1: 0.0,
            y1: 0.0,
            z1: 0.0,
            x2: 1.0,
            y2: 1.0,
            z2: 1.0,
            window_frame_ratio: frame_ratio,
            direction_angle: None,
            horizon: None,
            zenith: None,
        }
    }

    #[test]
    fn merge_deep_merges_per_window_maps() {
        let mut acc = AccumulatorMap::new(
            None,
            BTreeMap::from([
                ("w1".to_owned(), window(0.8)),
                ("w2".to_owned(), window(0.9)),
            ]),
            None,
            None,
            None,
            None,
        );

        let mut delta1 = AccumulatorDelta::default();
        delta1.direction_angle.insert("w1".to_owned(), 1.5708);
        let mut delta2 = AccumulatorDelta::default();
        delta2.direction_angle.insert("w2".to_owned(), 0.7854);

        // Merge order-independence: apply in reverse order, same result.
        let mut acc_reordered = acc.clone();
        acc.merge(delta1.clone());
        acc.merge(delta2.clone());
        acc_reordered.merge(delta2);
        acc_reordered.merge(delta1);

        assert_eq!(acc.direction_angle, acc_reordered.direction_angle);
        assert_eq!(acc.direction_angle.len(), 2);
    }

    #[test]
    fn simulation_delta_constructs_not_merges() {
        let mut acc = AccumulatorMap::default();
        let mut delta = AccumulatorDelta::default();
        delta.simulation = Some(("w1".to_owned(), vec![vec![1.0, 2.0]]));
        acc.merge(delta);
        assert_eq!(acc.simulations.get("w1"), Some(&vec![vec![1.0, 2.0]]));
    }

    #[test]
    fn strip_image_after_merge_stage() {
        let mut acc = AccumulatorMap::default();
        acc.image = Some(Bytes::from_static(b"\x89PNG"));
        acc.strip_image();
        assert!(acc.image.is_none());
    }

    #[test]
    fn obstruction_skip_when_client_supplied() {
        let mut w = window(0.8);
        w.horizon = Some([1.0; 64]);
        w.zenith = Some([2.0; 64]);
        let acc = AccumulatorMap::new(
            None,
            BTreeMap::from([("w1".to_owned(), w)]),
            None,
            None,
            None,
            None,
        );
        assert!(acc.obstruction_already_resolved("w1"));
    }
}
