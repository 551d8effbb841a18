//! Scripted in-memory collaborators for testing.
//!
//! [`MockView`] plays back a document whose elements appear, detach and
//! move on a timeline driven by a [`Clock`]. With a
//! [`FakeClock`](crate::clock::FakeClock) the whole timeline is
//! deterministic.
//!
//! ```ignore
//! let clock = Arc::new(FakeClock::new());
//! let view = Arc::new(MockView::new(clock.clone()));
//! view.add(
//!     MockElement::new(BoundingBox::new(10.0, 10.0, 80.0, 30.0))
//!         .matching_css("#submit")
//!         .appearing_at(Duration::from_millis(1200)),
//! );
//! let driver = Arc::new(MockDriver::new(view.clone()));
//! ```

use image::{DynamicImage, GrayImage};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::Clock;
use crate::locator::{BoundingBox, ElementType, Strategy};
use crate::result::TenazResult;
use crate::view::{
    ActionDriver, ActionKind, ActionTarget, ClickOptions, DriverError, NodeHandle, TextRecognizer,
    TextRegion, ViewAccessor, ViewError,
};

// =============================================================================
// MOCK ELEMENT
// =============================================================================

/// One scripted element
#[derive(Debug, Clone)]
pub struct MockElement {
    bounds: BoundingBox,
    queries: Vec<(Strategy, String)>,
    element_type: Option<ElementType>,
    appear_at: Duration,
    detach_at: Option<Duration>,
    has_layout: bool,
    visible: bool,
    enabled: bool,
    /// Horizontal velocity in px/s, and when the motion stops
    motion: Option<(f32, Duration)>,
    value: Option<String>,
    accepts_input: bool,
}

impl MockElement {
    /// An element at `bounds`, present from time zero, matching nothing yet
    #[must_use]
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            queries: Vec::new(),
            element_type: None,
            appear_at: Duration::ZERO,
            detach_at: None,
            has_layout: true,
            visible: true,
            enabled: true,
            motion: None,
            value: None,
            accepts_input: true,
        }
    }

    /// Match a query of any strategy
    #[must_use]
    pub fn matching(mut self, strategy: Strategy, value: impl Into<String>) -> Self {
        self.queries.push((strategy, value.into()));
        self
    }

    /// Match a CSS selector
    #[must_use]
    pub fn matching_css(self, selector: &str) -> Self {
        self.matching(Strategy::Css, selector)
    }

    /// Match an XPath expression
    #[must_use]
    pub fn matching_xpath(self, expression: &str) -> Self {
        self.matching(Strategy::XPath, expression)
    }

    /// Match a text query
    #[must_use]
    pub fn matching_text(self, text: &str) -> Self {
        self.matching(Strategy::Text, text)
    }

    /// Match a role query
    #[must_use]
    pub fn matching_role(self, role: &str) -> Self {
        self.matching(Strategy::Role, role)
    }

    /// Report a semantic type
    #[must_use]
    pub const fn with_type(mut self, element_type: ElementType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    /// Attach at `at` instead of time zero
    #[must_use]
    pub const fn appearing_at(mut self, at: Duration) -> Self {
        self.appear_at = at;
        self
    }

    /// Detach at `at`
    #[must_use]
    pub const fn detaching_at(mut self, at: Duration) -> Self {
        self.detach_at = Some(at);
        self
    }

    /// Attached but never laid out
    #[must_use]
    pub const fn without_layout(mut self) -> Self {
        self.has_layout = false;
        self
    }

    /// Laid out but not rendered
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Does not accept input
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Slide right at `px_per_sec` until `until`
    #[must_use]
    pub const fn moving(mut self, px_per_sec: f32, until: Duration) -> Self {
        self.motion = Some((px_per_sec, until));
        self
    }

    /// Start with an input value
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Swallow fills without updating the value
    #[must_use]
    pub const fn ignoring_input(mut self) -> Self {
        self.accepts_input = false;
        self
    }

    fn is_present(&self, now: Duration) -> bool {
        now >= self.appear_at && self.detach_at.map_or(true, |at| now < at)
    }

    fn bounds_at(&self, now: Duration) -> BoundingBox {
        match self.motion {
            Some((velocity, until)) => {
                let moved = velocity * now.min(until).as_secs_f32();
                BoundingBox::new(self.bounds.x + moved, self.bounds.y, self.bounds.width, self.bounds.height)
            }
            None => self.bounds,
        }
    }
}

// =============================================================================
// MOCK VIEW
// =============================================================================

#[derive(Debug)]
struct ViewState {
    elements: Vec<MockElement>,
    query_counts: HashMap<(Strategy, String), u32>,
    rejected: HashSet<(Strategy, String)>,
    unavailable_until: Duration,
    frame: Option<DynamicImage>,
    frame_captures: u32,
    viewport: BoundingBox,
}

/// Scripted [`ViewAccessor`]
#[derive(Debug)]
pub struct MockView {
    clock: Arc<dyn Clock>,
    state: Mutex<ViewState>,
}

impl MockView {
    /// Empty 1280x720 view on `clock`'s timeline
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(ViewState {
                elements: Vec::new(),
                query_counts: HashMap::new(),
                rejected: HashSet::new(),
                unavailable_until: Duration::ZERO,
                frame: None,
                frame_captures: 0,
                viewport: BoundingBox::new(0.0, 0.0, 1280.0, 720.0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn with_element<T>(&self, node: NodeHandle, f: impl FnOnce(&MockElement, Duration) -> T) -> Option<T> {
        let now = self.clock.now();
        let state = self.state();
        let index = usize::try_from(node.id()).ok()?.checked_sub(1)?;
        state.elements.get(index).map(|element| f(element, now))
    }

    /// Add an element in document order
    pub fn add(&self, element: MockElement) -> NodeHandle {
        let mut state = self.state();
        state.elements.push(element);
        NodeHandle::new(state.elements.len() as u64)
    }

    /// Detach `node` now
    pub fn detach(&self, node: NodeHandle) {
        let now = self.clock.now();
        let mut state = self.state();
        if let Some(element) = usize::try_from(node.id())
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| state.elements.get_mut(index))
        {
            element.detach_at = Some(now);
        }
    }

    /// Set the frame returned by `capture_frame`
    pub fn set_frame(&self, frame: DynamicImage) {
        self.state().frame = Some(frame);
    }

    /// Set the viewport
    pub fn set_viewport(&self, viewport: BoundingBox) {
        self.state().viewport = viewport;
    }

    /// Answer every query with `Unavailable` until `until`
    pub fn unavailable_until(&self, until: Duration) {
        self.state().unavailable_until = until;
    }

    /// Make a query fail as malformed
    pub fn reject_query(&self, strategy: Strategy, value: &str) {
        self.state().rejected.insert((strategy, value.to_string()));
    }

    /// Number of times a query was issued
    #[must_use]
    pub fn query_count(&self, strategy: Strategy, value: &str) -> u32 {
        self.state()
            .query_counts
            .get(&(strategy, value.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of queries across all strategies and values
    #[must_use]
    pub fn total_queries(&self) -> u32 {
        self.state().query_counts.values().sum()
    }

    /// Number of frame captures
    #[must_use]
    pub fn frame_captures(&self) -> u32 {
        self.state().frame_captures
    }

    /// Overwrite an input value
    pub fn set_input_value(&self, node: NodeHandle, value: &str) {
        let mut state = self.state();
        if let Some(element) = usize::try_from(node.id())
            .ok()
            .and_then(|id| id.checked_sub(1))
            .and_then(|index| state.elements.get_mut(index))
        {
            if element.accepts_input {
                element.value = Some(value.to_string());
            }
        }
    }
}

impl ViewAccessor for MockView {
    fn query_all(&self, strategy: Strategy, value: &str) -> Result<Vec<NodeHandle>, ViewError> {
        let now = self.clock.now();
        let mut state = self.state();
        let key = (strategy, value.to_string());
        *state.query_counts.entry(key.clone()).or_insert(0) += 1;

        if state.rejected.contains(&key) {
            return Err(ViewError::InvalidQuery {
                strategy: strategy.to_string(),
                message: format!("cannot parse {value:?}"),
            });
        }
        if now < state.unavailable_until {
            return Err(ViewError::Unavailable("navigation in progress".into()));
        }

        Ok(state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_present(now) && e.queries.contains(&key))
            .map(|(i, _)| NodeHandle::new(i as u64 + 1))
            .collect())
    }

    fn capture_frame(&self) -> Result<DynamicImage, ViewError> {
        let mut state = self.state();
        state.frame_captures += 1;
        state
            .frame
            .clone()
            .ok_or_else(|| ViewError::Unavailable("no frame scripted".into()))
    }

    fn is_attached(&self, node: NodeHandle) -> bool {
        self.with_element(node, |e, now| e.is_present(now)).unwrap_or(false)
    }

    fn bounding_box(&self, node: NodeHandle) -> Option<BoundingBox> {
        self.with_element(node, |e, now| (e.is_present(now) && e.has_layout).then(|| e.bounds_at(now)))
            .flatten()
    }

    fn is_visible(&self, node: NodeHandle) -> bool {
        self.with_element(node, |e, now| {
            e.is_present(now) && e.has_layout && e.visible && !e.bounds_at(now).is_empty()
        })
        .unwrap_or(false)
    }

    fn is_enabled(&self, node: NodeHandle) -> bool {
        self.with_element(node, |e, _| e.enabled).unwrap_or(false)
    }

    fn element_type(&self, node: NodeHandle) -> Option<ElementType> {
        self.with_element(node, |e, _| e.element_type).flatten()
    }

    fn input_value(&self, node: NodeHandle) -> Option<String> {
        self.with_element(node, |e, _| e.value.clone()).flatten()
    }

    fn viewport(&self) -> BoundingBox {
        self.state().viewport
    }
}

// =============================================================================
// MOCK DRIVER
// =============================================================================

/// One action the driver performed
#[derive(Debug, Clone, PartialEq)]
pub struct DriverCall {
    /// Action kind
    pub action: ActionKind,
    /// Target
    pub target: ActionTarget,
    /// Text for fills
    pub text: Option<String>,
}

#[derive(Debug, Default)]
struct DriverState {
    calls: Vec<DriverCall>,
    stale_responses: u32,
    failure: Option<String>,
}

/// Recording [`ActionDriver`] wired to a [`MockView`]
#[derive(Debug)]
pub struct MockDriver {
    view: Arc<MockView>,
    state: Mutex<DriverState>,
}

impl MockDriver {
    /// Driver acting on `view`
    #[must_use]
    pub fn new(view: Arc<MockView>) -> Self {
        Self {
            view,
            state: Mutex::new(DriverState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Answer the next `count` actions with [`DriverError::Stale`]
    pub fn stale_next(&self, count: u32) {
        self.state().stale_responses = count;
    }

    /// Fail every action with `message`
    pub fn fail_with(&self, message: impl Into<String>) {
        self.state().failure = Some(message.into());
    }

    /// Every action issued, including failed ones
    #[must_use]
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    /// Number of actions issued
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    fn perform(&self, action: ActionKind, target: &ActionTarget, text: Option<&str>) -> Result<(), DriverError> {
        if let ActionTarget::Node(node) = target {
            if !self.view.is_attached(*node) {
                return Err(DriverError::Stale);
            }
        }
        let mut state = self.state();
        if state.stale_responses > 0 {
            state.stale_responses -= 1;
            return Err(DriverError::Stale);
        }
        state.calls.push(DriverCall {
            action,
            target: *target,
            text: text.map(str::to_string),
        });
        if let Some(message) = &state.failure {
            return Err(DriverError::Failed(message.clone()));
        }
        drop(state);

        if let (ActionTarget::Node(node), Some(text)) = (target, text) {
            self.view.set_input_value(*node, text);
        }
        Ok(())
    }
}

impl ActionDriver for MockDriver {
    fn click(&self, target: &ActionTarget, _options: &ClickOptions) -> Result<(), DriverError> {
        self.perform(ActionKind::Click, target, None)
    }

    fn fill(&self, target: &ActionTarget, text: &str) -> Result<(), DriverError> {
        self.perform(ActionKind::Fill, target, Some(text))
    }

    fn hover(&self, target: &ActionTarget) -> Result<(), DriverError> {
        self.perform(ActionKind::Hover, target, None)
    }
}

// =============================================================================
// MOCK RECOGNIZER
// =============================================================================

/// [`TextRecognizer`] returning a fixed set of regions
#[derive(Debug, Default)]
pub struct MockRecognizer {
    regions: Vec<TextRegion>,
    calls: AtomicU32,
}

impl MockRecognizer {
    /// Recognizer that always reports `regions`
    #[must_use]
    pub fn new(regions: Vec<TextRegion>) -> Self {
        Self {
            regions,
            calls: AtomicU32::new(0),
        }
    }

    /// Number of `recognize` calls
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for MockRecognizer {
    fn recognize(&self, _image: &GrayImage) -> TenazResult<Vec<TextRegion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.regions.clone())
    }
}
