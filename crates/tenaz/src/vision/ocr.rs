//! OCR text matching.
//!
//! Recognition itself is delegated to an injected [`TextRecognizer`]; this
//! module fuzzy-matches what it reports against a target string. Text is
//! compared case-insensitively with whitespace collapsed, using normalized
//! Levenshtein similarity.
//!
//! Recognizers often split a label into one region per word, so adjacent
//! regions on the same text line are also joined (up to the target's word
//! count) and scored as one candidate.

use std::sync::Arc;
use tracing::trace;

use crate::locator::BoundingBox;
use crate::result::TenazResult;
use crate::view::{TextRecognizer, TextRegion};
use crate::vision::preprocess::NormalizedFrame;

/// Word gaps wider than this many line heights break a span
const MAX_WORD_GAP: f32 = 1.5;

/// A text region (or joined run of regions) that matched the target
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    /// Recognized text as reported
    pub text: String,
    /// Bounds in frame coordinates
    pub bounds: BoundingBox,
    /// Normalized edit similarity to the target (0.0-1.0)
    pub similarity: f32,
    /// Recognizer confidence (0.0-1.0); the minimum over joined regions
    pub recognizer_confidence: f32,
}

impl TextMatch {
    /// Combined score: similarity weighted by recognizer confidence
    #[must_use]
    pub fn score(&self) -> f32 {
        self.similarity * self.recognizer_confidence
    }
}

/// Lowercase, trim and collapse internal whitespace
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized edit similarity of two strings after [`normalize_text`]
#[must_use]
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let (a, b) = (normalize_text(a), normalize_text(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b) as f32
}

/// Finds a target string among recognized text regions
#[derive(Clone)]
pub struct OcrTextMatcher {
    recognizer: Arc<dyn TextRecognizer>,
}

impl std::fmt::Debug for OcrTextMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrTextMatcher").finish_non_exhaustive()
    }
}

impl OcrTextMatcher {
    /// Wrap a recognizer
    #[must_use]
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Every region or same-line run whose similarity to `target` is at
    /// least `threshold`, best score first
    pub fn find_text(&self, frame: &NormalizedFrame, target: &str, threshold: f32) -> TenazResult<Vec<TextMatch>> {
        let regions = self.recognizer.recognize(&frame.gray)?;
        let words = normalize_text(target).split(' ').count().max(1);

        let mut matches: Vec<TextMatch> = candidates(regions, words)
            .into_iter()
            .filter_map(|(text, bounds, confidence)| {
                let similarity = text_similarity(&text, target);
                trace!(%text, similarity, "ocr candidate");
                (similarity >= threshold).then(|| TextMatch {
                    text,
                    bounds: frame.to_frame_coords(bounds),
                    similarity,
                    recognizer_confidence: confidence.clamp(0.0, 1.0),
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score()
                .total_cmp(&a.score())
                .then(a.bounds.y.total_cmp(&b.bounds.y))
                .then(a.bounds.x.total_cmp(&b.bounds.x))
        });
        Ok(matches)
    }
}

/// Single regions plus joined runs of up to `max_words` neighbours on one line
fn candidates(regions: Vec<TextRegion>, max_words: usize) -> Vec<(String, BoundingBox, f32)> {
    let mut out: Vec<(String, BoundingBox, f32)> = regions
        .iter()
        .map(|r| (r.text.clone(), r.bounds, r.confidence))
        .collect();
    if max_words < 2 {
        return out;
    }

    for line in group_lines(regions) {
        for start in 0..line.len() {
            let mut text = line[start].text.clone();
            let mut bounds = line[start].bounds;
            let mut confidence = line[start].confidence;
            for pair in line[start..].windows(2).take(max_words - 1) {
                let (prev, next) = (&pair[0], &pair[1]);
                let gap = next.bounds.x - (prev.bounds.x + prev.bounds.width);
                if gap > prev.bounds.height.max(next.bounds.height) * MAX_WORD_GAP {
                    break;
                }
                text.push(' ');
                text.push_str(&next.text);
                bounds = bounds.union(&next.bounds);
                confidence = confidence.min(next.confidence);
                out.push((text.clone(), bounds, confidence));
            }
        }
    }
    out
}

/// Group regions whose vertical centers are within half a line height,
/// each line ordered left to right
fn group_lines(mut regions: Vec<TextRegion>) -> Vec<Vec<TextRegion>> {
    regions.sort_by(|a, b| {
        a.bounds
            .center()
            .y
            .total_cmp(&b.bounds.center().y)
            .then(a.bounds.x.total_cmp(&b.bounds.x))
    });

    let mut lines: Vec<Vec<TextRegion>> = Vec::new();
    for region in regions {
        let cy = region.bounds.center().y;
        let line = lines.iter_mut().find(|line| {
            let anchor = &line[0].bounds;
            (anchor.center().y - cy).abs() <= anchor.height.min(region.bounds.height) / 2.0
        });
        match line {
            Some(line) => line.push(region),
            None => lines.push(vec![region]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.bounds.x.total_cmp(&b.bounds.x));
    }
    lines
}
