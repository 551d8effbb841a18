//! Multi-scale template matching.
//!
//! Scores are zero-mean normalized cross-correlation (NCC), so uniform
//! brightness or contrast changes between the reference image and the
//! live frame do not affect the match:
//!
//! ```text
//!            Σ (f(x+i, y+j) - f̄) · (t(i, j) - t̄)
//! ncc = ─────────────────────────────────────────────
//!        sqrt(Σ (f - f̄)²) · sqrt(Σ (t - t̄)²)
//! ```
//!
//! Window sums of the frame come from integral images. Large templates are
//! searched coarse-to-fine: a full scan on a 2^k-downscaled pyramid level
//! picks a handful of candidates, which are then refined at full
//! resolution in a small neighbourhood.

use image::imageops::{self, FilterType};
use image::GrayImage;
use std::borrow::Cow;
use tracing::trace;

use crate::locator::BoundingBox;

/// Smallest template side kept on a coarse pyramid level
const MIN_COARSE_SIDE: u32 = 8;

/// Largest pyramid downscale factor
const MAX_PYRAMID_FACTOR: u32 = 8;

/// Coarse candidates may score this much below the minimum
const COARSE_SLACK: f32 = 0.25;

/// Coarse candidates refined at full resolution
const COARSE_CANDIDATES: usize = 8;

/// Templates smaller than this (per side) are not searched
const MIN_TEMPLATE_SIDE: u32 = 3;

/// Best location of a template inside a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// Matched region in frame coordinates
    pub bounds: BoundingBox,
    /// Correlation score (-1.0 to 1.0)
    pub score: f32,
    /// Template scale that produced the match
    pub scale: f32,
}

/// Finds a reference image inside a frame at one or more scales
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatcher {
    min_score: f32,
}

impl TemplateMatcher {
    /// Create a matcher accepting scores of at least `min_score`
    #[must_use]
    pub const fn new(min_score: f32) -> Self {
        Self { min_score }
    }

    /// Minimum accepted score
    #[must_use]
    pub const fn min_score(&self) -> f32 {
        self.min_score
    }

    /// Best match of `template` across `scales`, if it reaches the minimum
    /// score. Ties keep the earlier scale and the earlier scan position.
    #[must_use]
    pub fn find_template(&self, frame: &GrayImage, template: &GrayImage, scales: &[f32]) -> Option<TemplateMatch> {
        let integral = Integral::new(frame);
        let mut best: Option<TemplateMatch> = None;

        for &scale in scales {
            let scaled = scale_template(template, scale);
            let Some(found) = self.match_single(frame, &integral, &scaled, scale) else {
                continue;
            };
            trace!(scale, score = found.score, "template scale scored");
            if best.map_or(true, |b| found.score > b.score) {
                best = Some(found);
            }
        }

        best.filter(|m| m.score >= self.min_score)
    }

    fn match_single(
        &self,
        frame: &GrayImage,
        integral: &Integral,
        template: &GrayImage,
        scale: f32,
    ) -> Option<TemplateMatch> {
        let (fw, fh) = frame.dimensions();
        let (tw, th) = template.dimensions();
        if tw < MIN_TEMPLATE_SIDE || th < MIN_TEMPLATE_SIDE || tw > fw || th > fh {
            return None;
        }
        let prepared = PreparedTemplate::new(template)?;

        let factor = pyramid_factor(tw, th);
        let (score, x, y) = if factor == 1 {
            exhaustive(frame, integral, &prepared)?
        } else {
            match self.coarse_candidates(frame, template, factor) {
                Some(candidates) => refine(frame, integral, &prepared, &candidates, factor)?,
                None => exhaustive(frame, integral, &prepared)?,
            }
        };

        Some(TemplateMatch {
            bounds: BoundingBox::new(x as f32, y as f32, tw as f32, th as f32),
            score,
            scale,
        })
    }

    /// Top positions on the coarse level, or `None` if the coarse template
    /// lost all contrast
    fn coarse_candidates(&self, frame: &GrayImage, template: &GrayImage, factor: u32) -> Option<Vec<(u32, u32)>> {
        let coarse_frame = imageops::resize(
            frame,
            (frame.width() / factor).max(1),
            (frame.height() / factor).max(1),
            FilterType::Triangle,
        );
        let coarse_template = imageops::resize(
            template,
            (template.width() / factor).max(1),
            (template.height() / factor).max(1),
            FilterType::Triangle,
        );
        let prepared = PreparedTemplate::new(&coarse_template)?;
        let integral = Integral::new(&coarse_frame);

        let threshold = self.min_score - COARSE_SLACK;
        let mut scored: Vec<(f32, u32, u32)> = positions(&coarse_frame, &prepared)
            .map(|(x, y)| (ncc_at(&coarse_frame, &integral, &prepared, x, y), x, y))
            .filter(|(score, _, _)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then((a.2, a.1).cmp(&(b.2, b.1))));
        scored.truncate(COARSE_CANDIDATES);
        Some(scored.into_iter().map(|(_, x, y)| (x, y)).collect())
    }
}

fn scale_template(template: &GrayImage, scale: f32) -> Cow<'_, GrayImage> {
    if (scale - 1.0).abs() < f32::EPSILON {
        return Cow::Borrowed(template);
    }
    let width = ((template.width() as f32 * scale).round() as u32).max(1);
    let height = ((template.height() as f32 * scale).round() as u32).max(1);
    Cow::Owned(imageops::resize(template, width, height, FilterType::Triangle))
}

/// Largest power of two (up to the maximum) that keeps the template's
/// shorter side at or above the coarse minimum
fn pyramid_factor(width: u32, height: u32) -> u32 {
    let side = width.min(height);
    let mut factor = 1;
    while factor < MAX_PYRAMID_FACTOR && side / (factor * 2) >= MIN_COARSE_SIDE {
        factor *= 2;
    }
    factor
}

fn positions<'a>(frame: &GrayImage, template: &'a PreparedTemplate) -> impl Iterator<Item = (u32, u32)> + 'a {
    let max_x = frame.width() - template.width;
    let max_y = frame.height() - template.height;
    (0..=max_y).flat_map(move |y| (0..=max_x).map(move |x| (x, y)))
}

fn exhaustive(frame: &GrayImage, integral: &Integral, template: &PreparedTemplate) -> Option<(f32, u32, u32)> {
    let mut best: Option<(f32, u32, u32)> = None;
    for (x, y) in positions(frame, template) {
        let score = ncc_at(frame, integral, template, x, y);
        if best.map_or(true, |(s, _, _)| score > s) {
            best = Some((score, x, y));
        }
    }
    best
}

fn refine(
    frame: &GrayImage,
    integral: &Integral,
    template: &PreparedTemplate,
    candidates: &[(u32, u32)],
    factor: u32,
) -> Option<(f32, u32, u32)> {
    let max_x = frame.width() - template.width;
    let max_y = frame.height() - template.height;
    let mut best: Option<(f32, u32, u32)> = None;

    for &(cx, cy) in candidates {
        let (x0, y0) = ((cx * factor).saturating_sub(factor), (cy * factor).saturating_sub(factor));
        let (x1, y1) = ((cx * factor + factor).min(max_x), (cy * factor + factor).min(max_y));
        for y in y0..=y1 {
            for x in x0..=x1 {
                let score = ncc_at(frame, integral, template, x, y);
                if best.map_or(true, |(s, _, _)| score > s) {
                    best = Some((score, x, y));
                }
            }
        }
    }
    best
}

// =============================================================================
// NCC PRIMITIVES
// =============================================================================

/// Summed-area tables of pixel values and squared pixel values
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let stride = width + 1;
        let mut sum = vec![0.0; stride * (height + 1)];
        let mut sum_sq = vec![0.0; stride * (height + 1)];
        let raw = image.as_raw();

        for y in 0..height {
            let mut row = 0.0;
            let mut row_sq = 0.0;
            for x in 0..width {
                let v = f64::from(raw[y * width + x]);
                row += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row;
                sum_sq[idx] = sum_sq[idx - stride] + row_sq;
            }
        }
        Self { stride, sum, sum_sq }
    }

    /// (Σ v, Σ v²) over the window
    fn window(&self, x: u32, y: u32, width: u32, height: u32) -> (f64, f64) {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + width as usize, y0 + height as usize);
        let at = |table: &[f64], x: usize, y: usize| table[y * self.stride + x];
        let rect = |table: &[f64]| at(table, x1, y1) - at(table, x0, y1) - at(table, x1, y0) + at(table, x0, y0);
        (rect(&self.sum), rect(&self.sum_sq))
    }
}

/// Zero-mean template values and their norm
struct PreparedTemplate {
    width: u32,
    height: u32,
    zero_mean: Vec<f64>,
    norm: f64,
}

impl PreparedTemplate {
    /// `None` for a flat template, which correlates with nothing
    fn new(template: &GrayImage) -> Option<Self> {
        let raw = template.as_raw();
        let n = raw.len() as f64;
        let mean = raw.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let zero_mean: Vec<f64> = raw.iter().map(|&v| f64::from(v) - mean).collect();
        let norm = zero_mean.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm < 1e-6 {
            return None;
        }
        Some(Self {
            width: template.width(),
            height: template.height(),
            zero_mean,
            norm,
        })
    }
}

fn ncc_at(frame: &GrayImage, integral: &Integral, template: &PreparedTemplate, x: u32, y: u32) -> f32 {
    let (tw, th) = (template.width as usize, template.height as usize);
    let n = (tw * th) as f64;
    let (sum, sum_sq) = integral.window(x, y, template.width, template.height);
    let variance = sum_sq - sum * sum / n;
    if variance <= 1e-6 {
        return 0.0;
    }

    let fw = frame.width() as usize;
    let raw = frame.as_raw();
    let mut numerator = 0.0;
    for j in 0..th {
        let row = (y as usize + j) * fw + x as usize;
        let pixels = &raw[row..row + tw];
        let weights = &template.zero_mean[j * tw..(j + 1) * tw];
        numerator += pixels
            .iter()
            .zip(weights)
            .map(|(&p, &w)| f64::from(p) * w)
            .sum::<f64>();
    }

    ((numerator / (variance.sqrt() * template.norm)) as f32).clamp(-1.0, 1.0)
}
