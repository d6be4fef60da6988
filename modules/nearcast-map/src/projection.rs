//! Web Mercator projection into zoom-dependent pixel space.

use std::f64::consts::PI;

/// Latitude beyond which Web Mercator is undefined (the square-world cutoff).
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

/// The viewer's zoom level. Fractional zooms are allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomContext {
    pub zoom: f64,
}

impl ZoomContext {
    pub fn new(zoom: f64) -> Self {
        Self { zoom }
    }
}

/// A point in global pixel coordinates at some zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn distance_to(&self, other: &ScreenPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Project a lat/lng pair to global pixel coordinates.
///
/// The world is `tile_size * 2^zoom` pixels wide; (0, 0) is the north-west
/// corner. Latitudes are clamped to [`MAX_LATITUDE`].
pub fn project(lat: f64, lng: f64, zoom: f64, tile_size: f64) -> ScreenPoint {
    let scale = tile_size * 2f64.powf(zoom);
    let sin = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians().sin();

    let x = (lng + 180.0) / 360.0 * scale;
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * scale;
    ScreenPoint { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_projects_to_world_center() {
        let p = project(0.0, 0.0, 0.0, 256.0);
        assert!((p.x - 128.0).abs() < 1e-9);
        assert!((p.y - 128.0).abs() < 1e-9);
    }

    #[test]
    fn each_zoom_level_doubles_the_world() {
        let a = project(35.68, 139.76, 10.0, 256.0);
        let b = project(35.68, 139.76, 11.0, 256.0);
        assert!((b.x / a.x - 2.0).abs() < 1e-9);
        assert!((b.y / a.y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn poles_are_clamped() {
        let north = project(90.0, 0.0, 0.0, 256.0);
        assert!(north.y.is_finite());
        assert!(north.y.abs() < 1e-6, "clamped north edge should be y=0, got {}", north.y);
    }

    #[test]
    fn nearby_points_separate_as_zoom_grows() {
        // ~100m apart on the equator
        let a = (0.0, 0.0);
        let b = (0.0, 0.0009);
        let low = project(a.0, a.1, 10.0, 256.0).distance_to(&project(b.0, b.1, 10.0, 256.0));
        let high = project(a.0, a.1, 18.0, 256.0).distance_to(&project(b.0, b.1, 18.0, 256.0));
        assert!(low < 1.0, "got {low}");
        assert!(high > 150.0, "got {high}");
    }
}
