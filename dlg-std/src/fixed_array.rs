//! Helpers for working with the fixed-length `[f64; 64]` horizon/zenith
//! angle arrays that flow through the gateway.

/// The number of sampled directions in a horizon or zenith angle array,
/// spanning `17.5..=162.5` degrees across the half-circle centered on a
/// window's outward normal.
pub const ANGLE_SAMPLE_COUNT: usize = 64;

/// Converts a `Vec<f64>` into the fixed-size array the gateway's
/// `WindowGeometry` invariant requires, or returns the actual length found.
pub fn try_into_angle_array(values: Vec<f64>) -> Result<[f64; 64], usize> {
    let len = values.len();
    values.try_into().map_err(|_| len)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_exactly_64() {
        let values = vec![0.0; 64];
        assert!(try_into_angle_array(values).is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        let values = vec![0.0; 63];
        assert_eq!(try_into_angle_array(values), Err(63));
    }
}
