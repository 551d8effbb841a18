//! Heuristic element classification of a candidate region.
//!
//! Measures a few cheap features of the region and its immediate
//! surroundings (a ring of `padding` pixels) and applies fixed rules:
//!
//! | Type     | Rule                                                        |
//! |----------|-------------------------------------------------------------|
//! | Checkbox | near-square, small, strong border                           |
//! | Input    | wide, strong border, flat interior matching the page        |
//! | Button   | interior fill clearly differs from the page                 |
//! | Text     | short line, textured, no distinct fill                      |
//! | Image    | large, near-square, heavily textured                        |
//!
//! Anything else is [`ElementType::Unknown`]. Links are not visually
//! distinguishable from text and are never produced.

use image::GrayImage;

use crate::locator::{BoundingBox, ElementType};

/// Measured properties of a region (intensities scaled to 0.0-1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionFeatures {
    /// Region width in pixels
    pub width: f32,
    /// Region height in pixels
    pub height: f32,
    /// Width divided by height
    pub aspect_ratio: f32,
    /// |edge band mean - surrounding ring mean|
    pub border_contrast: f32,
    /// |interior mean - surrounding ring mean|
    pub fill_contrast: f32,
    /// Standard deviation of the interior
    pub fill_stddev: f32,
}

/// Assigns a semantic type to a frame region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementClassifier {
    padding: u32,
}

impl Default for ElementClassifier {
    fn default() -> Self {
        Self::new(6)
    }
}

impl ElementClassifier {
    /// Create a classifier looking `padding` pixels around each region
    #[must_use]
    pub const fn new(padding: u32) -> Self {
        Self { padding }
    }

    /// Classify `bounds` (in `frame` coordinates)
    #[must_use]
    pub fn classify(&self, frame: &GrayImage, bounds: BoundingBox) -> ElementType {
        self.features(frame, bounds)
            .map_or(ElementType::Unknown, |f| Self::classify_features(&f))
    }

    /// Apply the classification rules to measured features
    #[must_use]
    pub fn classify_features(f: &RegionFeatures) -> ElementType {
        let longest = f.width.max(f.height);
        let shortest = f.width.min(f.height);

        if (0.75..=1.33).contains(&f.aspect_ratio) && longest <= 40.0 && f.border_contrast >= 0.2 {
            return ElementType::Checkbox;
        }
        if f.aspect_ratio >= 2.5 && f.border_contrast >= 0.2 && f.fill_stddev < 0.1 && f.fill_contrast < 0.15 {
            return ElementType::Input;
        }
        if f.fill_contrast >= 0.25 && (1.2..=10.0).contains(&f.aspect_ratio) {
            return ElementType::Button;
        }
        if f.height <= 24.0 && f.aspect_ratio >= 1.5 && f.fill_stddev >= 0.08 {
            return ElementType::Text;
        }
        if shortest > 32.0 && (0.5..=2.0).contains(&f.aspect_ratio) && f.fill_stddev >= 0.15 {
            return ElementType::Image;
        }
        ElementType::Unknown
    }

    /// Measure `bounds`; `None` when it lies outside the frame
    #[must_use]
    pub fn features(&self, frame: &GrayImage, bounds: BoundingBox) -> Option<RegionFeatures> {
        let inner = Rect::clip(frame, bounds.x, bounds.y, bounds.width, bounds.height)?;
        let pad = self.padding as f32;
        let outer = Rect::clip(
            frame,
            bounds.x - pad,
            bounds.y - pad,
            bounds.width + 2.0 * pad,
            bounds.height + 2.0 * pad,
        )?;
        let band = 2_u32.min(inner.width() / 4).min(inner.height() / 4).max(1);
        let interior = inner.shrink(band);

        let inner_stats = Stats::of(frame, &inner);
        let outer_stats = Stats::of(frame, &outer);
        let interior_stats = interior.map_or(inner_stats, |r| Stats::of(frame, &r));

        let ring = outer_stats.minus(&inner_stats);
        let edge = inner_stats.minus(&interior_stats);
        let page_mean = if ring.count > 0.0 { ring.mean() } else { inner_stats.mean() };
        let edge_mean = if edge.count > 0.0 { edge.mean() } else { inner_stats.mean() };

        let (width, height) = (inner.width() as f32, inner.height() as f32);
        Some(RegionFeatures {
            width,
            height,
            aspect_ratio: width / height,
            border_contrast: ((edge_mean - page_mean).abs() / 255.0) as f32,
            fill_contrast: ((interior_stats.mean() - page_mean).abs() / 255.0) as f32,
            fill_stddev: (interior_stats.stddev() / 255.0) as f32,
        })
    }
}

/// Half-open pixel rectangle
#[derive(Debug, Clone, Copy)]
struct Rect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Rect {
    fn clip(frame: &GrayImage, x: f32, y: f32, width: f32, height: f32) -> Option<Self> {
        let x0 = x.floor().max(0.0) as u32;
        let y0 = y.floor().max(0.0) as u32;
        let x1 = ((x + width).ceil().max(0.0) as u32).min(frame.width());
        let y1 = ((y + height).ceil().max(0.0) as u32).min(frame.height());
        (x1 > x0 && y1 > y0).then_some(Self { x0, y0, x1, y1 })
    }

    const fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    const fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    fn shrink(&self, by: u32) -> Option<Self> {
        (self.width() > 2 * by && self.height() > 2 * by).then(|| Self {
            x0: self.x0 + by,
            y0: self.y0 + by,
            x1: self.x1 - by,
            y1: self.y1 - by,
        })
    }
}

/// Running sums over a set of pixels
#[derive(Debug, Clone, Copy)]
struct Stats {
    count: f64,
    sum: f64,
    sum_sq: f64,
}

impl Stats {
    fn of(frame: &GrayImage, rect: &Rect) -> Self {
        let mut stats = Self {
            count: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
        };
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                let v = f64::from(frame.get_pixel(x, y).0[0]);
                stats.count += 1.0;
                stats.sum += v;
                stats.sum_sq += v * v;
            }
        }
        stats
    }

    fn minus(&self, other: &Self) -> Self {
        Self {
            count: self.count - other.count,
            sum: self.sum - other.sum,
            sum_sq: self.sum_sq - other.sum_sq,
        }
    }

    fn mean(&self) -> f64 {
        if self.count > 0.0 {
            self.sum / self.count
        } else {
            0.0
        }
    }

    fn stddev(&self) -> f64 {
        if self.count > 0.0 {
            let mean = self.mean();
            (self.sum_sq / self.count - mean * mean).max(0.0).sqrt()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Luma;

    const PAGE: u8 = 245;

    /// Light page with one widget drawn by `paint` inside `rect`
    fn page_with(rect: (u32, u32, u32, u32), paint: impl Fn(u32, u32, u32, u32) -> u8) -> GrayImage {
        let (rx, ry, rw, rh) = rect;
        GrayImage::from_fn(400, 200, |x, y| {
            if x >= rx && x < rx + rw && y >= ry && y < ry + rh {
                Luma([paint(x - rx, y - ry, rw, rh)])
            } else {
                Luma([PAGE])
            }
        })
    }

    fn bordered(lx: u32, ly: u32, w: u32, h: u32) -> u8 {
        if lx < 2 || ly < 2 || lx + 2 >= w || ly + 2 >= h {
            60
        } else {
            PAGE
        }
    }

    fn bbox(rect: (u32, u32, u32, u32)) -> BoundingBox {
        BoundingBox::new(rect.0 as f32, rect.1 as f32, rect.2 as f32, rect.3 as f32)
    }

    #[test]
    fn test_checkbox() {
        let rect = (50, 50, 16, 16);
        let frame = page_with(rect, bordered);
        assert_eq!(ElementClassifier::default().classify(&frame, bbox(rect)), ElementType::Checkbox);
    }

    #[test]
    fn test_input_field() {
        let rect = (50, 50, 200, 30);
        let frame = page_with(rect, bordered);
        assert_eq!(ElementClassifier::default().classify(&frame, bbox(rect)), ElementType::Input);
    }

    #[test]
    fn test_filled_button() {
        let rect = (50, 50, 100, 32);
        let frame = page_with(rect, |lx, ly, _, _| {
            // Dark fill with a light "label" stripe.
            if (12..20).contains(&ly) && (20..80).contains(&lx) && lx % 4 < 2 {
                230
            } else {
                40
            }
        });
        assert_eq!(ElementClassifier::default().classify(&frame, bbox(rect)), ElementType::Button);
    }

    #[test]
    fn test_text_label() {
        let rect = (50, 50, 60, 14);
        let frame = page_with(rect, |lx, ly, _, _| if lx % 5 == 0 && (3..11).contains(&ly) { 20 } else { PAGE });
        assert_eq!(ElementClassifier::default().classify(&frame, bbox(rect)), ElementType::Text);
    }

    #[test]
    fn test_blank_region_unknown() {
        let frame = GrayImage::from_pixel(200, 200, Luma([PAGE]));
        assert_eq!(
            ElementClassifier::default().classify(&frame, BoundingBox::new(20.0, 20.0, 50.0, 50.0)),
            ElementType::Unknown
        );
    }

    #[test]
    fn test_region_outside_frame_unknown() {
        let frame = GrayImage::from_pixel(50, 50, Luma([PAGE]));
        let classifier = ElementClassifier::default();
        assert!(classifier.features(&frame, BoundingBox::new(80.0, 80.0, 10.0, 10.0)).is_none());
        assert_eq!(
            classifier.classify(&frame, BoundingBox::new(80.0, 80.0, 10.0, 10.0)),
            ElementType::Unknown
        );
    }

    #[test]
    fn test_features_of_bordered_box() {
        let rect = (50, 50, 200, 30);
        let frame = page_with(rect, bordered);
        let features = ElementClassifier::default().features(&frame, bbox(rect)).unwrap();
        assert!((features.aspect_ratio - 200.0 / 30.0).abs() < 1e-4);
        assert!(features.border_contrast > 0.5);
        assert!(features.fill_contrast < 0.01);
        assert!(features.fill_stddev < 0.01);
    }
}
