//! Visual resolution: find an element in a captured frame when every
//! structural locator has failed.
//!
//! ```text
//!   frame ──► ImagePreprocessor ──┬─► OcrTextMatcher   (VISUAL_DESCRIPTION)
//!                                 └─► TemplateMatcher  (VISUAL_TEMPLATE)
//!                                          │
//!                                 candidates (bounds, similarity)
//!                                          │
//!                                 ElementClassifier ──► type bonus
//!                                          │
//!                      confidence = similarity × bonus, ≥ floor
//!                                          │
//!                      best; near-ties go to the most central
//! ```
//!
//! Frame coordinates are assumed to equal view coordinates.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::VisualConfig;
use crate::locator::{BoundingBox, ElementType, LocatorSpec, Point, Strategy};
use crate::result::{TenazError, TenazResult};
use crate::view::{ReferenceImageStore, TextRecognizer};
use crate::vision::classify::ElementClassifier;
use crate::vision::ocr::OcrTextMatcher;
use crate::vision::preprocess::{ImagePreprocessor, NormalizedFrame};
use crate::vision::template::TemplateMatcher;

/// A region picked by visual resolution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualMatch {
    /// Region in frame coordinates
    pub bounds: BoundingBox,
    /// Final confidence (similarity × type bonus)
    pub confidence: f32,
    /// Raw similarity before the type bonus
    pub similarity: f32,
    /// Type assigned by the classifier
    pub element_type: ElementType,
}

/// Composes preprocessing, OCR, template matching and classification
#[derive(Clone)]
pub struct VisualResolver {
    preprocessor: ImagePreprocessor,
    ocr: Option<OcrTextMatcher>,
    templates: TemplateMatcher,
    classifier: ElementClassifier,
    images: Arc<dyn ReferenceImageStore>,
    config: VisualConfig,
}

impl std::fmt::Debug for VisualResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualResolver")
            .field("preprocessor", &self.preprocessor)
            .field("has_recognizer", &self.ocr.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VisualResolver {
    /// Create a resolver loading templates from `images`
    #[must_use]
    pub fn new(images: Arc<dyn ReferenceImageStore>, config: VisualConfig) -> Self {
        Self {
            preprocessor: ImagePreprocessor::from_config(&config),
            ocr: None,
            templates: TemplateMatcher::new(config.template_min_score),
            classifier: ElementClassifier::new(config.classify_padding),
            images,
            config,
        }
    }

    /// Enable description lookups through `recognizer`
    #[must_use]
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.ocr = Some(OcrTextMatcher::new(recognizer));
        self
    }

    /// The tunables in use
    #[must_use]
    pub const fn config(&self) -> &VisualConfig {
        &self.config
    }

    /// Resolve `spec` in `frame`. `Ok(None)` means nothing cleared the
    /// confidence floor.
    ///
    /// # Errors
    ///
    /// Returns error for structural strategies, for description lookups
    /// without a recognizer, and when the reference image or the
    /// recognizer fails.
    pub fn resolve(
        &self,
        spec: &LocatorSpec,
        frame: &DynamicImage,
        expected: Option<ElementType>,
    ) -> TenazResult<Option<VisualMatch>> {
        if (frame.width() == 0 || frame.height() == 0) && !spec.strategy().is_structural() {
            debug!(locator = %spec, width = frame.width(), height = frame.height(), "empty frame, nothing to match");
            return Ok(None);
        }
        let normalized = self.preprocessor.normalize(frame);

        let raw: Vec<(BoundingBox, f32)> = match spec.strategy() {
            Strategy::VisualDescription => {
                let ocr = self.ocr.as_ref().ok_or(TenazError::RecognizerMissing)?;
                ocr.find_text(&normalized, spec.value(), self.config.fuzzy_threshold)?
                    .into_iter()
                    .map(|m| (m.bounds, m.score()))
                    .collect()
            }
            Strategy::VisualTemplate => {
                let reference = self.images.load(spec.value())?;
                let reference = self.preprocessor.normalize_reference(&reference, normalized.scale);
                self.templates
                    .find_template(&normalized.gray, &reference, &self.config.scales)
                    .map(|m| (normalized.to_frame_coords(m.bounds), m.score))
                    .into_iter()
                    .collect()
            }
            Strategy::Css | Strategy::XPath | Strategy::Text | Strategy::Role => {
                return Err(TenazError::UnsupportedStrategy {
                    strategy: spec.strategy().to_string(),
                    resolver: "visual",
                });
            }
        };

        let candidates: Vec<VisualMatch> = raw
            .into_iter()
            .filter_map(|(bounds, similarity)| self.score(&normalized, bounds, similarity, expected))
            .collect();
        debug!(locator = %spec, candidates = candidates.len(), "visual candidates above floor");

        let center = BoundingBox::new(0.0, 0.0, frame.width() as f32, frame.height() as f32).center();
        Ok(pick(candidates, center, self.config.tie_epsilon))
    }

    fn score(
        &self,
        normalized: &NormalizedFrame,
        bounds: BoundingBox,
        similarity: f32,
        expected: Option<ElementType>,
    ) -> Option<VisualMatch> {
        let element_type = self
            .classifier
            .classify(&normalized.gray, normalized.to_normalized_coords(bounds));
        let bonus = type_bonus(expected, element_type, self.config.unknown_type_penalty)?;
        let confidence = similarity * bonus;
        (confidence >= self.config.confidence_floor).then_some(VisualMatch {
            bounds,
            confidence,
            similarity,
            element_type,
        })
    }
}

/// Multiplier for a classified type, or `None` to discard the candidate
#[must_use]
pub fn type_bonus(expected: Option<ElementType>, classified: ElementType, unknown_penalty: f32) -> Option<f32> {
    match expected {
        None => Some(1.0),
        Some(want) if want == classified => Some(1.0),
        Some(_) if classified == ElementType::Unknown => Some(unknown_penalty),
        Some(_) => None,
    }
}

/// Highest confidence wins; among candidates within `epsilon` of the best,
/// the one closest to `center` wins
fn pick(mut candidates: Vec<VisualMatch>, center: Point, epsilon: f32) -> Option<VisualMatch> {
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.bounds.y.total_cmp(&b.bounds.y))
            .then(a.bounds.x.total_cmp(&b.bounds.x))
    });
    let best = candidates.first()?.confidence;
    candidates
        .into_iter()
        .take_while(|c| best - c.confidence <= epsilon)
        .min_by(|a, b| {
            a.bounds
                .center()
                .distance_to(&center)
                .total_cmp(&b.bounds.center().distance_to(&center))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockRecognizer;
    use crate::view::{InMemoryImageStore, TextRegion};
    use image::{imageops, GrayImage, Luma};

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([245])))
    }

    fn ocr_resolver(regions: Vec<TextRegion>) -> VisualResolver {
        VisualResolver::new(Arc::new(InMemoryImageStore::new()), VisualConfig::default())
            .with_recognizer(Arc::new(MockRecognizer::new(regions)))
    }

    fn submit_at(x: f32, y: f32, confidence: f32) -> TextRegion {
        TextRegion::new("Submit", BoundingBox::new(x, y, 60.0, 20.0), confidence)
    }

    mod description_tests {
        use super::*;

        #[test]
        fn test_confidence_is_similarity_times_recognizer() {
            let found = ocr_resolver(vec![submit_at(100.0, 100.0, 0.9)])
                .resolve(&LocatorSpec::visual_description("Submit").unwrap(), &blank(400, 300), None)
                .unwrap()
                .unwrap();
            assert!((found.confidence - 0.9).abs() < 1e-6);
            assert_eq!(found.bounds, BoundingBox::new(100.0, 100.0, 60.0, 20.0));
        }

        #[test]
        fn test_below_floor_not_found() {
            let found = ocr_resolver(vec![submit_at(100.0, 100.0, 0.5)])
                .resolve(&LocatorSpec::visual_description("Submit").unwrap(), &blank(400, 300), None)
                .unwrap();
            assert!(found.is_none());
        }

        #[test]
        fn test_unknown_type_penalized() {
            let found = ocr_resolver(vec![submit_at(100.0, 100.0, 0.9)])
                .resolve(
                    &LocatorSpec::visual_description("Submit").unwrap(),
                    &blank(400, 300),
                    Some(ElementType::Button),
                )
                .unwrap()
                .unwrap();
            assert_eq!(found.element_type, ElementType::Unknown);
            assert!((found.confidence - 0.9 * 0.85).abs() < 1e-6);
        }

        #[test]
        fn test_type_mismatch_discarded() {
            // A bordered, flat, wide box classifies as an input field.
            let frame = GrayImage::from_fn(400, 300, |x, y| {
                let inside = (100..300).contains(&x) && (100..130).contains(&y);
                let edge = inside && (x < 102 || x >= 298 || y < 102 || y >= 128);
                Luma([if edge { 60 } else { 245 }])
            });
            let region = TextRegion::new("Submit", BoundingBox::new(100.0, 100.0, 200.0, 30.0), 0.95);
            let resolver = ocr_resolver(vec![region]);
            let spec = LocatorSpec::visual_description("Submit").unwrap();
            let frame = DynamicImage::ImageLuma8(frame);

            let as_input = resolver.resolve(&spec, &frame, Some(ElementType::Input)).unwrap();
            assert_eq!(as_input.unwrap().element_type, ElementType::Input);
            assert!(resolver
                .resolve(&spec, &frame, Some(ElementType::Button))
                .unwrap()
                .is_none());
        }

        #[test]
        fn test_near_tie_prefers_central_candidate() {
            let found = ocr_resolver(vec![
                submit_at(0.0, 0.0, 0.91),
                submit_at(170.0, 140.0, 0.90),
            ])
            .resolve(&LocatorSpec::visual_description("Submit").unwrap(), &blank(400, 300), None)
            .unwrap()
            .unwrap();
            assert_eq!(found.bounds.x, 170.0);
        }

        #[test]
        fn test_clear_winner_beats_central_candidate() {
            let found = ocr_resolver(vec![
                submit_at(0.0, 0.0, 0.99),
                submit_at(170.0, 140.0, 0.80),
            ])
            .resolve(&LocatorSpec::visual_description("Submit").unwrap(), &blank(400, 300), None)
            .unwrap()
            .unwrap();
            assert_eq!(found.bounds.x, 0.0);
        }

        #[test]
        fn test_empty_frame_not_found() {
            let recognizer = Arc::new(MockRecognizer::new(vec![submit_at(0.0, 0.0, 0.9)]));
            let resolver = VisualResolver::new(Arc::new(InMemoryImageStore::new()), VisualConfig::default())
                .with_recognizer(recognizer.clone());
            for (width, height) in [(0, 0), (0, 40), (40, 0)] {
                let found = resolver
                    .resolve(
                        &LocatorSpec::visual_description("Submit").unwrap(),
                        &DynamicImage::new_luma8(width, height),
                        None,
                    )
                    .unwrap();
                assert!(found.is_none());
            }
            assert_eq!(recognizer.calls(), 0);
        }

        #[test]
        fn test_missing_recognizer_is_error() {
            let resolver = VisualResolver::new(Arc::new(InMemoryImageStore::new()), VisualConfig::default());
            let err = resolver
                .resolve(&LocatorSpec::visual_description("Submit").unwrap(), &blank(10, 10), None)
                .unwrap_err();
            assert!(matches!(err, TenazError::RecognizerMissing));
        }
    }

    mod template_tests {
        use super::*;

        fn scene() -> GrayImage {
            GrayImage::from_fn(320, 200, |x, y| {
                if (96..160).contains(&x) && (64..96).contains(&y) {
                    let (lx, ly) = (x - 96, y - 64);
                    if lx < 4 || ly < 4 || lx >= 60 || ly >= 28 {
                        Luma([30])
                    } else if ((lx / 8) + (ly / 8)) % 2 == 0 {
                        Luma([200])
                    } else {
                        Luma([90])
                    }
                } else {
                    Luma([240])
                }
            })
        }

        #[test]
        fn test_template_found() {
            let store = InMemoryImageStore::new();
            let scene = scene();
            store.insert(
                "submit",
                DynamicImage::ImageLuma8(imageops::crop_imm(&scene, 96, 64, 64, 32).to_image()),
            );
            let resolver = VisualResolver::new(Arc::new(store), VisualConfig::default());
            let found = resolver
                .resolve(
                    &LocatorSpec::visual_template("submit").unwrap(),
                    &DynamicImage::ImageLuma8(scene),
                    None,
                )
                .unwrap()
                .unwrap();
            assert_eq!((found.bounds.x, found.bounds.y), (96.0, 64.0));
            assert!(found.confidence > 0.9);
        }

        #[test]
        fn test_missing_reference_is_error() {
            let resolver = VisualResolver::new(Arc::new(InMemoryImageStore::new()), VisualConfig::default());
            let err = resolver
                .resolve(&LocatorSpec::visual_template("nope").unwrap(), &blank(50, 50), None)
                .unwrap_err();
            assert!(matches!(err, TenazError::ReferenceImageMissing { .. }));
        }

        #[test]
        fn test_empty_frame_skips_template_search() {
            let store = InMemoryImageStore::new();
            store.insert("submit", blank(16, 8));
            let resolver = VisualResolver::new(Arc::new(store), VisualConfig::default());
            let found = resolver
                .resolve(
                    &LocatorSpec::visual_template("submit").unwrap(),
                    &DynamicImage::new_rgb8(0, 0),
                    None,
                )
                .unwrap();
            assert!(found.is_none());
        }

        #[test]
        fn test_structural_strategy_rejected() {
            let resolver = VisualResolver::new(Arc::new(InMemoryImageStore::new()), VisualConfig::default());
            let err = resolver
                .resolve(&LocatorSpec::css("#x").unwrap(), &blank(10, 10), None)
                .unwrap_err();
            assert!(matches!(err, TenazError::UnsupportedStrategy { .. }));
        }
    }

    #[test]
    fn test_type_bonus_table() {
        assert_eq!(type_bonus(None, ElementType::Text, 0.85), Some(1.0));
        assert_eq!(type_bonus(Some(ElementType::Button), ElementType::Button, 0.85), Some(1.0));
        assert_eq!(type_bonus(Some(ElementType::Button), ElementType::Unknown, 0.85), Some(0.85));
        assert_eq!(type_bonus(Some(ElementType::Button), ElementType::Input, 0.85), None);
    }
}
