//! Collaborator contracts: the live view, the action driver, the reference
//! image store and the OCR text recognizer.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │  Tenaz core (this crate)                                           │
//! │                                                                    │
//! │   StructuralResolver ──► ViewAccessor::query_all / is_attached     │
//! │   VisualResolver ──────► ViewAccessor::capture_frame               │
//! │                   ├────► ReferenceImageStore::load                 │
//! │                   └────► TextRecognizer::recognize                 │
//! │   InteractionExecutor ─► ViewAccessor::bounding_box / is_visible   │
//! │                   └────► ActionDriver::click / fill / hover        │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations (a CDP page, a WebDriver session, an accessibility
//! tree) live outside the core. [`crate::mock`] provides scripted ones.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

use crate::locator::{BoundingBox, ElementType, Strategy};
use crate::result::{TenazError, TenazResult};

/// Opaque handle to a node in the live view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Wrap a view-specific node identifier
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// What an action is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActionTarget {
    /// A live node found by a structural query
    Node(NodeHandle),
    /// A screen region found by visual matching
    Region(BoundingBox),
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::Region(b) => write!(
                f,
                "region({:.0},{:.0} {:.0}x{:.0})",
                b.x, b.y, b.width, b.height
            ),
        }
    }
}

/// Errors raised by a [`ViewAccessor`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewError {
    /// The query itself is malformed; polling again cannot help
    #[error("invalid {strategy} query: {message}")]
    InvalidQuery {
        /// Strategy name
        strategy: String,
        /// Error message
        message: String,
    },
    /// The view could not answer right now (navigation, reload, ...)
    #[error("view unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by an [`ActionDriver`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// The handle no longer refers to an attached node; nothing was performed
    #[error("stale element handle")]
    Stale,
    /// The action call failed
    #[error("action failed: {0}")]
    Failed(String),
}

/// Read-only access to the live document view.
///
/// Calls are expected to return promptly (sub-10ms); slow calls eat into
/// each locator's polling budget.
pub trait ViewAccessor: Send + Sync {
    /// All nodes matching a structural query, in document order
    fn query_all(&self, strategy: Strategy, value: &str) -> Result<Vec<NodeHandle>, ViewError>;

    /// Capture the current rendered frame
    fn capture_frame(&self) -> Result<DynamicImage, ViewError>;

    /// Whether the node is still attached to the document
    fn is_attached(&self, node: NodeHandle) -> bool;

    /// The node's bounding box, or `None` if it has no layout
    fn bounding_box(&self, node: NodeHandle) -> Option<BoundingBox>;

    /// Whether the node is rendered visibly
    fn is_visible(&self, node: NodeHandle) -> bool {
        self.bounding_box(node).is_some_and(|b| !b.is_empty())
    }

    /// Whether the node accepts input
    fn is_enabled(&self, _node: NodeHandle) -> bool {
        true
    }

    /// The node's semantic type, if the view can tell
    fn element_type(&self, _node: NodeHandle) -> Option<ElementType> {
        None
    }

    /// Current value of an input node, if the view can report it
    fn input_value(&self, _node: NodeHandle) -> Option<String> {
        None
    }

    /// Visible viewport in view coordinates
    fn viewport(&self) -> BoundingBox;
}

/// Options for click actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickOptions {
    /// Mouse button
    pub button: MouseButton,
    /// Number of clicks (2 = double click)
    pub click_count: u8,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
        }
    }
}

impl ClickOptions {
    /// Options for a double click
    #[must_use]
    pub const fn double() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 2,
        }
    }
}

/// Mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    /// Primary button
    Left,
    /// Secondary button
    Right,
    /// Wheel button
    Middle,
}

/// Kind of action, without parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Click
    Click,
    /// Replace the element's value with text
    Fill,
    /// Move the pointer over the element
    Hover,
}

impl ActionKind {
    /// Get the lower-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Fill => "fill",
            Self::Hover => "hover",
        }
    }

    /// Input actions require the element to be enabled
    #[must_use]
    pub const fn requires_enabled(&self) -> bool {
        matches!(self, Self::Click | Self::Fill)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action together with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Click with options
    Click(ClickOptions),
    /// Fill with text
    Fill {
        /// Text to enter
        text: String,
    },
    /// Hover
    Hover,
}

impl Action {
    /// A plain left click
    #[must_use]
    pub fn click() -> Self {
        Self::Click(ClickOptions::default())
    }

    /// Fill with `text`
    #[must_use]
    pub fn fill(text: impl Into<String>) -> Self {
        Self::Fill { text: text.into() }
    }

    /// The action's kind
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Click(_) => ActionKind::Click,
            Self::Fill { .. } => ActionKind::Fill,
            Self::Hover => ActionKind::Hover,
        }
    }
}

/// Performs actions against the live view.
///
/// Implementations must return [`DriverError::Stale`] when the handle is
/// no longer attached, and must not have performed anything in that case.
pub trait ActionDriver: Send + Sync {
    /// Click the target
    fn click(&self, target: &ActionTarget, options: &ClickOptions) -> Result<(), DriverError>;

    /// Replace the target's value with `text`
    fn fill(&self, target: &ActionTarget, text: &str) -> Result<(), DriverError>;

    /// Hover over the target
    fn hover(&self, target: &ActionTarget) -> Result<(), DriverError>;
}

/// Read-only supplier of reference images for template locators
pub trait ReferenceImageStore: Send + Sync {
    /// Load the reference image registered under `name`
    fn load(&self, name: &str) -> TenazResult<DynamicImage>;
}

/// In-memory reference image store
#[derive(Default)]
pub struct InMemoryImageStore {
    images: RwLock<HashMap<String, DynamicImage>>,
}

impl fmt::Debug for InMemoryImageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.images.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryImageStore")
            .field("images", &count)
            .finish()
    }
}

impl InMemoryImageStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image under `name`
    pub fn insert(&self, name: impl Into<String>, image: DynamicImage) {
        let mut images = self
            .images
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        images.insert(name.into(), image);
    }
}

impl ReferenceImageStore for InMemoryImageStore {
    fn load(&self, name: &str) -> TenazResult<DynamicImage> {
        let images = self
            .images
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        images
            .get(name)
            .cloned()
            .ok_or_else(|| TenazError::ReferenceImageMissing { name: name.into() })
    }
}

/// Reference image store backed by a directory of `<name>.png` files
#[derive(Debug, Clone)]
pub struct DirectoryImageStore {
    root: PathBuf,
}

impl DirectoryImageStore {
    /// Serve images from `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory images are loaded from
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> TenazResult<PathBuf> {
        // Names are flat identifiers, not paths.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(TenazError::ReferenceImageMissing { name: name.into() });
        }
        Ok(self.root.join(format!("{name}.png")))
    }
}

impl ReferenceImageStore for DirectoryImageStore {
    fn load(&self, name: &str) -> TenazResult<DynamicImage> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(TenazError::ReferenceImageMissing { name: name.into() });
        }
        Ok(image::open(&path)?)
    }
}

/// A text region reported by an OCR engine, in the coordinates of the
/// image that was passed to the recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    /// Recognized text
    pub text: String,
    /// Region bounds
    pub bounds: BoundingBox,
    /// Recognizer confidence (0.0-1.0)
    pub confidence: f32,
}

impl TextRegion {
    /// Create a new text region
    #[must_use]
    pub fn new(text: impl Into<String>, bounds: BoundingBox, confidence: f32) -> Self {
        Self {
            text: text.into(),
            bounds,
            confidence,
        }
    }
}

/// OCR engine that extracts text regions from a normalized grayscale frame
pub trait TextRecognizer: Send + Sync {
    /// Recognize text regions in `image`
    fn recognize(&self, image: &GrayImage) -> TenazResult<Vec<TextRegion>>;
}
