/// Coordinate spaces of the perception-action loop.
///
/// Three pixel spaces are in play on every iteration:
///   - the *perceived* frame: the screenshot as the grounding model sees it,
///     snapped to a grid of `factor` pixels (see [`smart_resize`]);
///   - normalized space: `[0, 1] × [0, 1]`, independent of any resolution;
///   - the *destination* surface: the real screen or remote display.
///
/// The parser maps model output from the perceived frame into normalized space;
/// only the compiler maps normalized points into destination pixels.
use serde::{Deserialize, Serialize};

use crate::errors::{GroundError, GroundResult};

/// How the grounding model expresses coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Absolute pixels of the grid-aligned perceived frame.
    #[default]
    ResizedPixels,
    /// Relative 0–1000 space used by older grounding models.
    Thousandths,
}

/// Bounds used to derive the perceived frame from a screenshot size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeSpec {
    pub factor: u32,
    pub min_pixels: u64,
    pub max_pixels: u64,
    pub max_aspect_ratio: f64,
}

impl Default for ResizeSpec {
    fn default() -> Self {
        Self {
            factor: 28,
            min_pixels: 100 * 28 * 28,
            max_pixels: 16384 * 28 * 28,
            max_aspect_ratio: 200.0,
        }
    }
}

impl ResizeSpec {
    pub fn with_factor(factor: u32) -> Self {
        Self {
            factor,
            ..Self::default()
        }
    }
}

/// A point in normalized `[0, 1]²` space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormPoint {
    pub x: f64,
    pub y: f64,
}

impl NormPoint {
    /// Builds a point, clamping both axes into `[0, 1]`.
    pub fn clamped(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn midpoint(a: NormPoint, b: NormPoint) -> Self {
        Self::clamped((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn round_by_factor(value: f64, factor: u32) -> u64 {
    ((value / factor as f64).round_ties_even() as u64) * factor as u64
}

fn ceil_by_factor(value: f64, factor: u32) -> u64 {
    ((value / factor as f64).ceil() as u64) * factor as u64
}

fn floor_by_factor(value: f64, factor: u32) -> u64 {
    ((value / factor as f64).floor() as u64) * factor as u64
}

/// Resize `(width, height)` so both sides are multiples of `spec.factor`,
/// keeping the aspect ratio and the total area within
/// `[spec.min_pixels, spec.max_pixels]`. Returns `(width, height)`.
pub fn smart_resize(width: u32, height: u32, spec: &ResizeSpec) -> GroundResult<(u32, u32)> {
    if width == 0 || height == 0 {
        return Err(GroundError::InvalidImage(format!(
            "degenerate image size {width}×{height}"
        )));
    }
    if spec.factor == 0 {
        return Err(GroundError::Config("resize factor must be positive".into()));
    }

    let (w, h) = (width as f64, height as f64);
    let ratio = w.max(h) / w.min(h);
    if ratio > spec.max_aspect_ratio {
        return Err(GroundError::InvalidImage(format!(
            "aspect ratio {ratio:.1} exceeds {}",
            spec.max_aspect_ratio
        )));
    }

    let factor = spec.factor as u64;
    let mut h_bar = round_by_factor(h, spec.factor).max(factor);
    let mut w_bar = round_by_factor(w, spec.factor).max(factor);

    if h_bar * w_bar > spec.max_pixels {
        let beta = ((h * w) / spec.max_pixels as f64).sqrt();
        h_bar = floor_by_factor(h / beta, spec.factor).max(factor);
        w_bar = floor_by_factor(w / beta, spec.factor).max(factor);
    } else if h_bar * w_bar < spec.min_pixels {
        let beta = (spec.min_pixels as f64 / (h * w)).sqrt();
        h_bar = ceil_by_factor(h * beta, spec.factor);
        w_bar = ceil_by_factor(w * beta, spec.factor);
    }

    Ok((w_bar as u32, h_bar as u32))
}

/// Map a point in a `resized_width × resized_height` frame into normalized space.
/// Slight overshoot beyond the frame is clamped, not rejected.
pub fn to_normalized(point: (f64, f64), resized_width: u32, resized_height: u32) -> GroundResult<NormPoint> {
    if resized_width == 0 || resized_height == 0 {
        return Err(GroundError::InvalidImage(format!(
            "cannot normalize against {resized_width}×{resized_height}"
        )));
    }
    Ok(NormPoint::clamped(
        point.0 / resized_width as f64,
        point.1 / resized_height as f64,
    ))
}

/// Map a normalized point onto a destination surface, rounding half away from zero.
pub fn to_destination_pixels(point: NormPoint, dest_width: u32, dest_height: u32) -> (i32, i32) {
    (
        scale_axis(point.x, dest_width),
        scale_axis(point.y, dest_height),
    )
}

fn scale_axis(v: f64, extent: u32) -> i32 {
    let max = extent.saturating_sub(1) as f64;
    (clamp_unit(v) * extent as f64).round().clamp(0.0, max) as i32
}

/// The frame the grounding model reasoned over for one call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerceivedFrame {
    pub width: u32,
    pub height: u32,
    pub space: CoordinateSpace,
}

impl PerceivedFrame {
    /// Derive the perceived frame for a screenshot of `width × height`.
    pub fn from_image(
        width: u32,
        height: u32,
        spec: &ResizeSpec,
        space: CoordinateSpace,
    ) -> GroundResult<Self> {
        let (width, height) = smart_resize(width, height, spec)?;
        Ok(Self { width, height, space })
    }

    /// Normalize a coordinate pair as reported by the model.
    pub fn normalize(&self, x: f64, y: f64) -> GroundResult<NormPoint> {
        match self.space {
            CoordinateSpace::ResizedPixels => to_normalized((x, y), self.width, self.height),
            CoordinateSpace::Thousandths => to_normalized((x, y), 1000, 1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_aligned_size_is_unchanged() {
        let spec = ResizeSpec::with_factor(28);
        assert_eq!(smart_resize(3360, 2100, &spec).unwrap(), (3360, 2100));
    }

    #[test]
    fn sides_snap_to_nearest_multiple() {
        let spec = ResizeSpec::with_factor(28);
        assert_eq!(smart_resize(2880, 1800, &spec).unwrap(), (2884, 1792));
    }

    #[test]
    fn oversized_images_shrink_below_max_pixels() {
        let spec = ResizeSpec::default();
        let (w, h) = smart_resize(8000, 6000, &spec).unwrap();
        assert_eq!(w % 28, 0);
        assert_eq!(h % 28, 0);
        assert!(w as u64 * h as u64 <= spec.max_pixels);
        assert!(w > h);
    }

    #[test]
    fn tiny_images_grow_above_min_pixels() {
        let spec = ResizeSpec::default();
        let (w, h) = smart_resize(100, 50, &spec).unwrap();
        assert_eq!((w % 28, h % 28), (0, 0));
        assert!(w as u64 * h as u64 >= spec.min_pixels);
    }

    #[test]
    fn degenerate_sizes_are_invalid() {
        let spec = ResizeSpec::default();
        assert!(matches!(smart_resize(0, 100, &spec), Err(GroundError::InvalidImage(_))));
        assert!(matches!(smart_resize(100_000, 10, &spec), Err(GroundError::InvalidImage(_))));
        assert!(matches!(to_normalized((1.0, 1.0), 0, 10), Err(GroundError::InvalidImage(_))));
    }

    #[test]
    fn overshoot_is_clamped() {
        let p = to_normalized((3365.0, -2.0), 3360, 2100).unwrap();
        assert_eq!(p, NormPoint { x: 1.0, y: 0.0 });
    }

    #[test]
    fn destination_rounds_half_away_from_zero() {
        let p = NormPoint { x: 0.25, y: 0.5 };
        // 0.25 * 1002 = 250.5 → 251
        assert_eq!(to_destination_pixels(p, 1002, 1050), (251, 525));
    }

    #[test]
    fn destination_round_trip_within_one_pixel() {
        for (w, h) in [(1680u32, 1050u32), (1920, 1080), (37, 91)] {
            for i in 0..=20 {
                for j in 0..=20 {
                    let p = NormPoint { x: i as f64 / 20.0, y: j as f64 / 20.0 };
                    let (px, py) = to_destination_pixels(p, w, h);
                    let back = to_normalized((px as f64, py as f64), w, h).unwrap();
                    assert!((back.x - p.x).abs() <= 1.0 / w as f64 + 1e-9, "{p:?} on {w}×{h}");
                    assert!((back.y - p.y).abs() <= 1.0 / h as f64 + 1e-9, "{p:?} on {w}×{h}");
                }
            }
        }
    }

    #[test]
    fn thousandths_space_ignores_frame_size() {
        let frame = PerceivedFrame {
            width: 2884,
            height: 1792,
            space: CoordinateSpace::Thousandths,
        };
        assert_eq!(frame.normalize(500.0, 250.0).unwrap(), NormPoint { x: 0.5, y: 0.25 });
    }
}
