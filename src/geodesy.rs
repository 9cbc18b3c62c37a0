//! ECEF ↔ geodetic (WGS84) conversions.
//!
//! Pure deterministic math with no external state — unlike the clock
//! tracker/decoder/solver/aircraft-tracker collaborators, this is
//! implemented directly rather than modeled as a trait.

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
const WGS84_E2: f64 = 1.0 - (WGS84_B * WGS84_B) / (WGS84_A * WGS84_A);

/// Geodetic latitude/longitude (radians) and height above the ellipsoid
/// (metres) from an ECEF position (metres).
///
/// Uses Bowring's method, a closed-form iterative approximation that
/// converges to machine precision in a handful of steps for any altitude
/// an aircraft could plausibly be at.
pub fn ecef_to_llh(ecef: [f64; 3]) -> [f64; 3] {
    let [x, y, z] = ecef;
    let p = (x * x + y * y).sqrt();
    let lon = y.atan2(x);

    if p < 1e-9 {
        // On the polar axis: longitude undefined, fall back to 0.
        let lat = if z >= 0.0 {
            std::f64::consts::FRAC_PI_2
        } else {
            -std::f64::consts::FRAC_PI_2
        };
        let height = z.abs() - WGS84_B;
        return [lat, 0.0, height];
    }

    let mut lat = (z / (p * (1.0 - WGS84_E2))).atan();
    for _ in 0..5 {
        let sin_lat = lat.sin();
        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let h = p / lat.cos() - n;
        lat = (z / p * (1.0 - WGS84_E2 * n / (n + h)).recip()).atan();
    }

    let sin_lat = lat.sin();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
    let height = p / lat.cos() - n;

    [lat, lon, height]
}

/// Geodetic latitude/longitude (radians) and height (metres) to ECEF
/// (metres).
pub fn llh_to_ecef(llh: [f64; 3]) -> [f64; 3] {
    let [lat, lon, height] = llh;
    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    let x = (n + height) * cos_lat * lon.cos();
    let y = (n + height) * cos_lat * lon.sin();
    let z = (n * (1.0 - WGS84_E2) + height) * sin_lat;

    [x, y, z]
}

/// Replace the height component of an ECEF position with `new_height_m`,
/// preserving latitude/longitude. Used when overwriting a solved ECEF
/// altitude with the aircraft's tracked barometric altitude.
pub fn ecef_with_height(ecef: [f64; 3], new_height_m: f64) -> [f64; 3] {
    let [lat, lon, _] = ecef_to_llh(ecef);
    llh_to_ecef([lat, lon, new_height_m])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_lat_lon() {
        let llh = [0.715_584_99_f64, -1.309_0_f64, 10_000.0_f64];
        let ecef = llh_to_ecef(llh);
        let back = ecef_to_llh(ecef);
        assert!((back[0] - llh[0]).abs() < 1e-9);
        assert!((back[1] - llh[1]).abs() < 1e-9);
        assert!((back[2] - llh[2]).abs() < 1e-6);
    }

    #[test]
    fn round_trip_at_equator_and_prime_meridian() {
        let llh = [0.0, 0.0, 0.0];
        let ecef = llh_to_ecef(llh);
        assert!((ecef[0] - WGS84_A).abs() < 1e-6);
        let back = ecef_to_llh(ecef);
        assert!(back[0].abs() < 1e-12);
        assert!(back[1].abs() < 1e-12);
    }

    #[test]
    fn with_height_preserves_lat_lon_changes_altitude() {
        let llh = [0.5, 1.0, 5000.0];
        let ecef = llh_to_ecef(llh);
        let raised = ecef_with_height(ecef, 12_000.0);
        let raised_llh = ecef_to_llh(raised);
        assert!((raised_llh[0] - llh[0]).abs() < 1e-9);
        assert!((raised_llh[1] - llh[1]).abs() < 1e-9);
        assert!((raised_llh[2] - 12_000.0).abs() < 1e-6);
    }
}
