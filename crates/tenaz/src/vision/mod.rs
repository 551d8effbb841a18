//! Visual fallback pipeline.
//!
//! Used only after every structural locator in a chain has failed, and
//! only when the request enables it. See [`VisualResolver`] for how the
//! pieces compose.

mod classify;
mod ocr;
mod preprocess;
mod resolver;
mod template;

pub use classify::{ElementClassifier, RegionFeatures};
pub use ocr::{normalize_text, text_similarity, OcrTextMatcher, TextMatch};
pub use preprocess::{ImagePreprocessor, NormalizedFrame};
pub use resolver::{type_bonus, VisualMatch, VisualResolver};
pub use template::{TemplateMatch, TemplateMatcher};
