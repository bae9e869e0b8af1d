//! Compact Position Reporting — CPR decode for ADS-B positions.
//!
//! Two decode modes:
//! - Global: requires even+odd frame pair within 10 seconds. No reference needed.
//! - Local: single frame + reference position within ~180nm.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per hemisphere for even frames)
//! - Nb = 17 (bits per coordinate)
//! - Airborne: Dlat_even = 360 / (4 * NZ) = 6.0 degrees,
//!   Dlat_odd = 360 / (4 * NZ - 1) ≈ 6.1017 degrees
//! - Surface (TC 5-8): the same zone counts over a 90 degree base instead
//!   of 360, since a surface squitter is only ever useful within radio
//!   range of one receiver — Dlat_even = 90 / (4 * NZ) = 1.5 degrees,
//!   Dlat_odd = 90 / (4 * NZ - 1) ≈ 1.5254 degrees

/// Number of latitude zones per hemisphere.
const NZ: f64 = 15.0;

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// Maximum CPR value (2^17 = 131072).
const CPR_MAX: f64 = (1u32 << NB) as f64;

/// Maximum time between even/odd frames for global decode (seconds).
pub const MAX_PAIR_AGE: f64 = 10.0;

/// Number of longitude zones at a given latitude (NL function).
///
/// Returns the number of CPR longitude zones for the latitude.
/// Ranges from 1 near poles to 59 at equator.
pub fn nl(lat: f64) -> i32 {
    if lat.abs() >= 87.0 {
        return 1;
    }

    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = (std::f64::consts::PI / 180.0 * lat.abs()).cos().powi(2);
    let nl_val = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as i32;
    nl_val.max(1)
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Global CPR decode from an even/odd frame pair.
///
/// `surface` selects the zone size: airborne positions span the full 360°
/// globe, but surface positions (DO-260B TC 5-8) are only ever transmitted
/// within line-of-sight of the receiver, so the encoder halves the zone
/// count and the decoder must use a 90° base instead of 360° — using the
/// airborne base on a surface pair yields a span roughly 4x too wide and
/// lands far from the true position (readsb's `decodeCPRsurface`).
///
/// Returns `(latitude, longitude)` in degrees, or `None` if decode fails
/// (e.g., zone boundary crossing or pair too old).
pub fn global_decode(
    lat_even: u32,
    lon_even: u32,
    lat_odd: u32,
    lon_odd: u32,
    t_even: f64,
    t_odd: f64,
    surface: bool,
) -> Option<(f64, f64)> {
    // Check time difference
    if (t_even - t_odd).abs() > MAX_PAIR_AGE {
        return None;
    }

    let base = if surface { 90.0 } else { 360.0 };
    let dlat_even = base / (4.0 * NZ); // 6.0 airborne, 1.5 surface
    let dlat_odd = base / (4.0 * NZ - 1.0); // ~6.1017 airborne, ~1.5254 surface

    let lat_even_cpr = lat_even as f64 / CPR_MAX;
    let lon_even_cpr = lon_even as f64 / CPR_MAX;
    let lat_odd_cpr = lat_odd as f64 / CPR_MAX;
    let lon_odd_cpr = lon_odd as f64 / CPR_MAX;

    // Compute latitude zone index j
    let j = (59.0 * lat_even_cpr - 60.0 * lat_odd_cpr + 0.5).floor();

    // Compute candidate latitudes
    let mut lat_e = dlat_even * (modulo(j, 60.0) + lat_even_cpr);
    let mut lat_o = dlat_odd * (modulo(j, 59.0) + lat_odd_cpr);

    // Normalize into range. The fold point scales with `base`: airborne
    // folds anything at or past 270 (3/4 of 360) back by a full 360;
    // surface folds at 67.5 (3/4 of 90) back by a full 90. This recovers
    // the northern-hemisphere candidate; surface decode doesn't attempt
    // the southern-hemisphere/quadrant disambiguation a reference position
    // would allow (spec.md §4.E's surface CPR halves carry no such
    // reference into this function).
    if lat_e >= base * 0.75 {
        lat_e -= base;
    }
    if lat_o >= base * 0.75 {
        lat_o -= base;
    }

    // Check that both latitudes give the same NL value
    if nl(lat_e) != nl(lat_o) {
        return None; // Zone boundary crossing
    }

    let (lat, lon) = if t_even >= t_odd {
        // Use even frame
        let nl_val = nl(lat_e);
        let n_lon = nl_val.max(1);
        let dlon = base / n_lon as f64;
        let m = (lon_even_cpr * (nl_val - 1) as f64 - lon_odd_cpr * nl_val as f64 + 0.5).floor();
        let lon = dlon * (modulo(m, n_lon as f64) + lon_even_cpr);
        (lat_e, lon)
    } else {
        // Use odd frame
        let nl_val = nl(lat_o);
        let n_lon = (nl_val - 1).max(1);
        let dlon = base / n_lon as f64;
        let m = (lon_even_cpr * (nl_val - 1) as f64 - lon_odd_cpr * nl_val as f64 + 0.5).floor();
        let lon = dlon * (modulo(m, n_lon as f64) + lon_odd_cpr);
        (lat_o, lon)
    };

    // Normalize longitude to [-180, 180] (a no-op for surface, whose `lon`
    // never exceeds `base` <= 90).
    let lon = if lon >= 180.0 { lon - 360.0 } else { lon };

    Some((round6(lat), round6(lon)))
}

/// Local CPR decode using a reference position.
///
/// Valid when the aircraft is within ~180nm of the reference (~45nm for
/// `surface`, since the zone size there is a quarter as wide).
///
/// Unlike [`global_decode`], the zone index here is always chosen nearest
/// `ref_lat`/`ref_lon` regardless of zone width, so the smaller surface
/// zones (spec.md §4.E's TC 5-8 CPR halves) need no separate hemisphere or
/// quadrant disambiguation — just the 90° base in place of 360°.
pub fn local_decode(
    cpr_lat: u32,
    cpr_lon: u32,
    cpr_odd: bool,
    ref_lat: f64,
    ref_lon: f64,
    surface: bool,
) -> (f64, f64) {
    let base = if surface { 90.0 } else { 360.0 };
    let i = if cpr_odd { 1.0 } else { 0.0 };
    let dlat = base / (4.0 * NZ - i);

    let cpr_lat_norm = cpr_lat as f64 / CPR_MAX;
    let cpr_lon_norm = cpr_lon as f64 / CPR_MAX;

    // Compute latitude zone index from reference
    let j = (ref_lat / dlat).floor()
        + (modulo(ref_lat, dlat) / dlat - cpr_lat_norm + 0.5).floor();
    let lat = dlat * (j + cpr_lat_norm);

    // Compute longitude zone size at this latitude
    let nl_val = nl(lat);
    let n_lon = (nl_val - i as i32).max(1);
    let dlon = base / n_lon as f64;

    // Compute longitude zone index from reference
    let m = (ref_lon / dlon).floor()
        + (modulo(ref_lon, dlon) / dlon - cpr_lon_norm + 0.5).floor();
    let mut lon = dlon * (m + cpr_lon_norm);

    // Normalize
    let mut lat = lat;
    if lat > 90.0 {
        lat -= 360.0;
    }
    if lon >= 180.0 {
        lon -= 360.0;
    }

    (round6(lat), round6(lon))
}

/// Round to 6 decimal places (matching Python's behavior).
fn round6(val: f64) -> f64 {
    (val * 1_000_000.0).round() / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Range / speed sanity checks (spec.md §4.G steps 4(ii)/4(iii))
// ---------------------------------------------------------------------------

/// Maximum plausible ground speed implied between two fixes, airborne.
pub const MAX_SPEED_AIRBORNE_KT: f64 = 1000.0;
/// Maximum plausible ground speed implied between two fixes, on the surface.
pub const MAX_SPEED_SURFACE_KT: f64 = 100.0;

const EARTH_RADIUS_NM: f64 = 3440.065;

/// Great-circle distance between two lat/lon points, in nautical miles.
pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_NM * c
}

/// Reject positions further than `max_range_nm` from the receiver.
///
/// `max_range_nm <= 0.0` disables the check (unconfigured receiver location).
pub fn range_check(lat: f64, lon: f64, ref_lat: f64, ref_lon: f64, max_range_nm: f64) -> bool {
    if max_range_nm <= 0.0 {
        return true;
    }
    haversine_nm(lat, lon, ref_lat, ref_lon) <= max_range_nm
}

/// Reject a position implying a groundspeed beyond what's physically
/// plausible since the last accepted fix.
///
/// `dt_sec <= 0.0` (same-instant or out-of-order pair) always passes; the
/// tracker is responsible for ordering.
pub fn speed_check(
    lat: f64,
    lon: f64,
    prev_lat: f64,
    prev_lon: f64,
    dt_sec: f64,
    surface: bool,
) -> bool {
    if dt_sec <= 0.0 {
        return true;
    }
    let max_kt = if surface {
        MAX_SPEED_SURFACE_KT
    } else {
        MAX_SPEED_AIRBORNE_KT
    };
    let dist_nm = haversine_nm(lat, lon, prev_lat, prev_lon);
    let implied_kt = dist_nm / (dt_sec / 3600.0);
    implied_kt <= max_kt
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nl_equator() {
        assert_eq!(nl(0.0), 59);
    }

    #[test]
    fn test_nl_poles() {
        assert_eq!(nl(87.0), 1);
        assert_eq!(nl(-87.0), 1);
        assert_eq!(nl(90.0), 1);
    }

    #[test]
    fn test_nl_mid_latitude() {
        // ~52° N (London area) should give NL around 36
        let n = nl(52.0);
        assert!(n > 30 && n < 40, "NL at 52° should be ~36, got {n}");
    }

    #[test]
    fn test_global_decode_known_pair() {
        // Test vectors from "The 1090MHz Riddle"
        // Even frame: cpr_lat=93000, cpr_lon=51372
        // Odd frame: cpr_lat=74158, cpr_lon=50194
        // Expected: lat≈52.2572, lon≈3.9194
        let result = global_decode(93000, 51372, 74158, 50194, 1.0, 0.0, false);
        assert!(result.is_some(), "Global decode should succeed");

        let (lat, lon) = result.unwrap();
        assert!(
            (lat - 52.2572).abs() < 0.01,
            "Latitude should be ~52.2572, got {lat}"
        );
        assert!(
            (lon - 3.9194).abs() < 0.01,
            "Longitude should be ~3.9194, got {lon}"
        );
    }

    #[test]
    fn test_global_decode_pair_too_old() {
        // Pair older than 10 seconds should fail
        let result = global_decode(93000, 51372, 74158, 50194, 11.0, 0.0, false);
        assert!(result.is_none());
    }

    #[test]
    fn test_local_decode() {
        // Use decoded position as reference, decode even frame locally
        let (lat, lon) = local_decode(93000, 51372, false, 52.25, 3.92, false);
        assert!(
            (lat - 52.2572).abs() < 0.01,
            "Local lat should be ~52.2572, got {lat}"
        );
        assert!(
            (lon - 3.9194).abs() < 0.01,
            "Local lon should be ~3.9194, got {lon}"
        );
    }

    #[test]
    fn test_local_decode_odd() {
        // Local decode accuracy depends on reference proximity.
        // With ref (52.25, 3.92), odd frame should decode near the actual position.
        let (lat, lon) = local_decode(74158, 50194, true, 52.25, 3.92, false);
        assert!(
            (lat - 52.2572).abs() < 0.05,
            "Local odd lat should be ~52.2572, got {lat}"
        );
        assert!(
            (lon - 3.92).abs() < 0.05,
            "Local odd lon should be ~3.92, got {lon}"
        );
    }

    #[test]
    fn test_local_decode_surface_quarter_span_of_airborne() {
        // Same raw CPR values, decoded once as airborne and once as
        // surface, from a reference right on top of the true position:
        // the surface zone is a quarter the width, so a reference error
        // that airborne shrugs off should move the surface answer more.
        let ref_lat = 52.3;
        let ref_lon = 4.0;
        let (air_lat, air_lon) = local_decode(93000, 51372, false, ref_lat, ref_lon, false);
        let (surf_lat, surf_lon) = local_decode(93000, 51372, false, ref_lat, ref_lon, true);
        assert!(
            (air_lat - surf_lat).abs() > 0.01 || (air_lon - surf_lon).abs() > 0.01,
            "surface and airborne decode of the same raw CPR values should differ: \
             air=({air_lat},{air_lon}) surf=({surf_lat},{surf_lon})"
        );
    }

    #[test]
    fn test_global_decode_surface_equator_prime_meridian() {
        // All-zero even/odd CPR halves decode to (0, 0) at any zone size,
        // so this is a deterministic check that the 90° surface scaling
        // doesn't throw off the zone-index arithmetic (it would if `base`
        // leaked into the modulo/zone-count math inconsistently).
        let result = global_decode(0, 0, 0, 0, 1.0, 0.0, true);
        assert_eq!(result, Some((0.0, 0.0)));
    }

    #[test]
    fn test_global_decode_surface_quarter_span_of_airborne() {
        // Same raw CPR values decoded once as airborne, once as surface:
        // the surface latitude must be exactly a quarter of the airborne
        // latitude, since both use the same zone-index `j` and only the
        // base (360 vs 90) differs.
        let air = global_decode(93000, 51372, 74158, 50194, 1.0, 0.0, false).unwrap();
        let surf = global_decode(93000, 51372, 74158, 50194, 1.0, 0.0, true).unwrap();
        assert!(
            (surf.0 - air.0 / 4.0).abs() < 1e-6,
            "surface lat {} should be airborne lat {} / 4",
            surf.0,
            air.0
        );
    }

    #[test]
    fn test_modulo_positive() {
        assert!((modulo(7.0, 3.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_modulo_negative() {
        // modulo(-1, 60) should return 59
        assert!((modulo(-1.0, 60.0) - 59.0).abs() < 1e-10);
    }

    #[test]
    fn test_haversine_zero_distance() {
        assert!(haversine_nm(52.0, 4.0, 52.0, 4.0) < 1e-6);
    }

    #[test]
    fn test_range_check_within() {
        // ~1nm north of the reference
        assert!(range_check(52.0167, 4.0, 52.0, 4.0, 250.0));
    }

    #[test]
    fn test_range_check_disabled() {
        assert!(range_check(10.0, 10.0, 52.0, 4.0, 0.0));
    }

    #[test]
    fn test_range_check_too_far() {
        // Amsterdam vs roughly New York, far beyond 250 nm
        assert!(!range_check(40.7, -74.0, 52.0, 4.0, 250.0));
    }

    #[test]
    fn test_speed_check_plausible() {
        // 1nm in 10s is 360kt, under the airborne threshold
        assert!(speed_check(52.0167, 4.0, 52.0, 4.0, 10.0, false));
    }

    #[test]
    fn test_speed_check_implausible() {
        // 500nm jump in 0.1s: S4 scenario from spec.md
        assert!(!speed_check(52.0, 4.0, 52.0, 12.0, 0.1, false));
    }

    #[test]
    fn test_speed_check_surface_stricter() {
        // ~5nm in 60s = 300kt: over the 100kt surface cap, under airborne's 1000kt
        let lat2 = 52.0 + 5.0 / 60.0;
        assert!(!speed_check(lat2, 4.0, 52.0, 4.0, 60.0, true));
        assert!(speed_check(lat2, 4.0, 52.0, 4.0, 60.0, false));
    }
}
