//! Locator descriptors: single candidates and ordered fallback chains.
//!
//! # Design Philosophy
//!
//! - **Closed strategy set**: [`Strategy`] is an exhaustive enum. Every
//!   resolver matches on it, so a new strategy cannot be silently ignored.
//! - **Immutable descriptors**: a [`LocatorSpec`] cannot be changed after
//!   construction, and a [`LocatorChain`] exposes no mutation at all.
//! - **Strict primary**: the first chain entry is the primary locator;
//!   the rest are fallbacks tried strictly in order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::result::{TenazError, TenazResult};

/// A point in 2D space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f32,
    /// Y coordinate
    pub y: f32,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    #[must_use]
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

/// Bounding box of an element in view coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get the center point
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Check if a point is inside the bounding box
    #[must_use]
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }

    /// Whether the box has a positive area
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Whether this box lies entirely inside `outer`
    #[must_use]
    pub fn is_within(&self, outer: &BoundingBox) -> bool {
        self.x >= outer.x
            && self.y >= outer.y
            && self.x + self.width <= outer.x + outer.width
            && self.y + self.height <= outer.y + outer.height
    }

    /// Scale every coordinate by `factor`
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Smallest box containing both boxes
    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        Self::new(x, y, right - x, bottom - y)
    }
}

/// Semantic element type, used to narrow ambiguous matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// Clickable button
    Button,
    /// Text input field
    Input,
    /// Checkbox or radio toggle
    Checkbox,
    /// Hyperlink
    Link,
    /// Static text or label
    Text,
    /// Image or icon
    Image,
    /// Type could not be determined
    Unknown,
}

impl ElementType {
    /// Get the lower-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Input => "input",
            Self::Checkbox => "checkbox",
            Self::Link => "link",
            Self::Text => "text",
            Self::Image => "image",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a locator finds its element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// CSS selector (e.g., "button.primary")
    Css,
    /// XPath expression
    XPath,
    /// Visible text content
    Text,
    /// Accessibility role (e.g., "button", optionally with a name)
    Role,
    /// Named reference image matched against a captured frame
    VisualTemplate,
    /// Text searched for in a captured frame by OCR
    VisualDescription,
}

impl Strategy {
    /// Get the short name used in logs and reports
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::XPath => "xpath",
            Self::Text => "text",
            Self::Role => "role",
            Self::VisualTemplate => "visual_template",
            Self::VisualDescription => "visual_description",
        }
    }

    /// Whether the strategy is resolved by querying the live view
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        match self {
            Self::Css | Self::XPath | Self::Text | Self::Role => true,
            Self::VisualTemplate | Self::VisualDescription => false,
        }
    }

    /// Whether the strategy is resolved from a captured frame
    #[must_use]
    pub const fn is_visual(&self) -> bool {
        !self.is_structural()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single candidate locator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLocatorSpec")]
pub struct LocatorSpec {
    strategy: Strategy,
    value: String,
    expected_type: Option<ElementType>,
}

impl LocatorSpec {
    /// Create a locator with an explicit strategy
    ///
    /// # Errors
    ///
    /// Returns error if `value` is empty or only whitespace
    pub fn new(strategy: Strategy, value: impl Into<String>) -> TenazResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TenazError::InvalidLocator {
                strategy: strategy.to_string(),
                message: "value must not be empty".into(),
            });
        }
        Ok(Self {
            strategy,
            value,
            expected_type: None,
        })
    }

    /// Create a CSS locator
    pub fn css(selector: impl Into<String>) -> TenazResult<Self> {
        Self::new(Strategy::Css, selector)
    }

    /// Create an XPath locator
    pub fn xpath(expression: impl Into<String>) -> TenazResult<Self> {
        Self::new(Strategy::XPath, expression)
    }

    /// Create a text-content locator
    pub fn text(text: impl Into<String>) -> TenazResult<Self> {
        Self::new(Strategy::Text, text)
    }

    /// Create an accessibility-role locator
    pub fn role(role: impl Into<String>) -> TenazResult<Self> {
        Self::new(Strategy::Role, role)
    }

    /// Create a template locator naming a reference image
    pub fn visual_template(image_name: impl Into<String>) -> TenazResult<Self> {
        Self::new(Strategy::VisualTemplate, image_name)
    }

    /// Create a visual-description locator (text found by OCR)
    pub fn visual_description(text: impl Into<String>) -> TenazResult<Self> {
        Self::new(Strategy::VisualDescription, text)
    }

    /// Narrow matches to an expected element type
    #[must_use]
    pub fn with_expected_type(mut self, expected: ElementType) -> Self {
        self.expected_type = Some(expected);
        self
    }

    /// Get the strategy
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Get the locator value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the expected element type, if any
    #[must_use]
    pub const fn expected_type(&self) -> Option<ElementType> {
        self.expected_type
    }
}

/// Wire form of [`LocatorSpec`], validated through [`LocatorSpec::new`]
#[derive(Deserialize)]
struct RawLocatorSpec {
    strategy: Strategy,
    value: String,
    #[serde(default)]
    expected_type: Option<ElementType>,
}

impl TryFrom<RawLocatorSpec> for LocatorSpec {
    type Error = TenazError;

    fn try_from(raw: RawLocatorSpec) -> TenazResult<Self> {
        let spec = Self::new(raw.strategy, raw.value)?;
        Ok(match raw.expected_type {
            Some(expected) => spec.with_expected_type(expected),
            None => spec,
        })
    }
}

impl fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.strategy, self.value)?;
        if let Some(expected) = self.expected_type {
            write!(f, " [{expected}]")?;
        }
        Ok(())
    }
}

/// Ordered, non-empty list of candidate locators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LocatorSpec>", into = "Vec<LocatorSpec>")]
pub struct LocatorChain {
    locators: Vec<LocatorSpec>,
}

impl LocatorChain {
    /// Create a chain from an ordered list of candidates
    ///
    /// # Errors
    ///
    /// Returns error if `locators` is empty
    pub fn new(locators: Vec<LocatorSpec>) -> TenazResult<Self> {
        if locators.is_empty() {
            return Err(TenazError::EmptyChain);
        }
        Ok(Self { locators })
    }

    /// Create a chain holding only a primary locator
    #[must_use]
    pub fn single(primary: LocatorSpec) -> Self {
        Self {
            locators: vec![primary],
        }
    }

    /// The primary (first) locator
    #[must_use]
    pub fn primary(&self) -> &LocatorSpec {
        &self.locators[0]
    }

    /// Get the locator at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&LocatorSpec> {
        self.locators.get(index)
    }

    /// Number of locators in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.locators.len()
    }

    /// Always false; kept for API symmetry with collections
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Iterate locators in chain order
    pub fn iter(&self) -> std::slice::Iter<'_, LocatorSpec> {
        self.locators.iter()
    }

    /// Indices of the structural locators, in the order they are tried.
    ///
    /// A `preferred` index (from the best-known-locator cache) moves to the
    /// front; every other structural entry keeps its chain order.
    #[must_use]
    pub fn structural_order(&self, preferred: Option<usize>) -> Vec<usize> {
        let preferred = preferred.filter(|&i| {
            self.locators
                .get(i)
                .is_some_and(|spec| spec.strategy().is_structural())
        });
        let mut order: Vec<usize> = preferred.into_iter().collect();
        order.extend(
            self.locators
                .iter()
                .enumerate()
                .filter(|(i, spec)| spec.strategy().is_structural() && Some(*i) != preferred)
                .map(|(i, _)| i),
        );
        order
    }

    /// The locator used when the chain falls back to visual resolution.
    ///
    /// The first visual locator wins; otherwise the first text locator is
    /// reinterpreted as a visual description.
    #[must_use]
    pub fn visual_candidate(&self) -> Option<LocatorSpec> {
        if let Some(visual) = self.locators.iter().find(|l| l.strategy().is_visual()) {
            return Some(visual.clone());
        }
        self.locators
            .iter()
            .find(|l| l.strategy() == Strategy::Text)
            .map(|text| LocatorSpec {
                strategy: Strategy::VisualDescription,
                value: text.value.clone(),
                expected_type: text.expected_type,
            })
    }
}

impl TryFrom<Vec<LocatorSpec>> for LocatorChain {
    type Error = TenazError;

    fn try_from(locators: Vec<LocatorSpec>) -> TenazResult<Self> {
        Self::new(locators)
    }
}

impl From<LocatorChain> for Vec<LocatorSpec> {
    fn from(chain: LocatorChain) -> Self {
        chain.locators
    }
}

impl<'a> IntoIterator for &'a LocatorChain {
    type Item = &'a LocatorSpec;
    type IntoIter = std::slice::Iter<'a, LocatorSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.locators.iter()
    }
}

impl fmt::Display for LocatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, spec) in self.locators.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{spec}")?;
        }
        f.write_str("]")
    }
}
