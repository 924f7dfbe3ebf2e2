//! The gateway's data model (spec.md §3): coordinates, window geometry, the
//! room polygon, and the obstruction mesh.

use serde::{Deserialize, Serialize};

/// A 3D point in meters, z is vertical.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A window: the segment between two 3D corners plus the fraction of the
/// window rectangle occupied by glazing, plus optional derived attributes
/// populated by later pipeline stages.
///
/// Invariant: once `horizon` and `zenith` are populated, each has exactly 64
/// elements (enforced at the type level via `[f64; 64]`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x1: f64,
    pub y1: f64,
    pub z1: f64,
    pub x2: f64,
    pub y2: f64,
    pub z2: f64,
    pub window_frame_ratio: f64,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub direction_angle: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub horizon: Option<[f64; 64]>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub zenith: Option<[f64; 64]>,
}

impl WindowGeometry {
    pub fn reference_point(&self) -> Point3 {
        Point3 {
            x: (self.x1 + self.x2) / 2.0,
            y: (self.y1 + self.y2) / 2.0,
            z: (self.z1 + self.z2) / 2.0,
        }
    }
}

/// An ordered sequence of 2D points forming a simple closed polygon (closure
/// implicit). Invariant: length >= 3.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomPolygon(pub Vec<[f64; 2]>);

impl RoomPolygon {
    pub fn is_valid(&self) -> bool {
        self.0.len() >= 3
    }
}

/// A flat ordered sequence of 3D points; every contiguous triple forms one
/// triangle. Invariant: length is a multiple of 3 (empty permitted).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mesh(pub Vec<[f64; 3]>);

impl Mesh {
    pub fn is_valid(&self) -> bool {
        self.0.len() % 3 == 0
    }

    pub fn triangle_count(&self) -> usize {
        self.0.len() / 3
    }
}

/// A 2D matrix, used for `df_values` (daylight factor, floats) and `mask`
/// (binary, ints) - the gateway only ever shuttles these between JSON/NPY
/// and never computes over them, so a flat `Vec<Vec<T>>` of rows is enough.
pub type Matrix<T> = Vec<Vec<T>>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn room_polygon_validity() {
        assert!(!RoomPolygon(vec![[0.0, 0.0], [1.0, 0.0]]).is_valid());
        assert!(
            RoomPolygon(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]).is_valid()
        );
    }

    #[test]
    fn mesh_validity() {
        assert!(Mesh(vec![]).is_valid());
        assert!(!Mesh(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]).is_valid());
        assert!(
            Mesh(vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
            ])
            .is_valid()
        );
    }

    #[test]
    fn window_reference_point_is_midpoint() {
        let window = WindowGeometry {
            x1: -2.0,
            y1: 7.0,
            z1: 2.8,
            x2: -0.4,
            y2: 7.2,
            z2: 5.4,
            window_frame_ratio: 0.8,
            direction_angle: None,
            horizon: None,
            zenith: None,
        };
        let p = window.reference_point();
        assert!((p.x - -1.2).abs() < 1e-9);
        assert!((p.y - 7.1).abs() < 1e-9);
        assert!((p.z - 4.1).abs() < 1e-9);
    }
}
