//! Performing an action on a resolved element.
//!
//! Preconditions are checked immediately before acting:
//!
//! 1. still attached (otherwise [`ErrorKind::Stale`], which the
//!    orchestrator answers with one re-resolution),
//! 2. visible, and enabled for input actions,
//! 3. bounding box identical across two samples one stability interval
//!    apart, so nothing is clicked mid-animation.
//!
//! Failures of 2 and 3 are [`ErrorKind::NotInteractable`]. When every
//! check passes, exactly one driver call is issued. Fills are then
//! verified against the value the view reports.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::locator::{BoundingBox, ElementType, LocatorSpec};
use crate::result::ErrorKind;
use crate::view::{Action, ActionDriver, ActionTarget, DriverError, ViewAccessor};

/// An element located for one request.
///
/// Never reused across requests: the view may have changed since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedElement {
    /// Node handle or screen region
    pub target: ActionTarget,
    /// Bounding box at resolution time
    pub bounding_box: BoundingBox,
    /// The locator that matched
    pub matched_locator: LocatorSpec,
    /// Index of the matched locator in the chain; `None` when the visual
    /// locator was derived from a text locator
    pub chain_index: Option<usize>,
    /// 1.0 for structural matches, below 1.0 for visual ones
    pub confidence: f32,
    /// Semantic type, if known
    pub element_type: Option<ElementType>,
}

impl ResolvedElement {
    /// Whether this element came from the visual fallback
    #[must_use]
    pub const fn is_visual(&self) -> bool {
        matches!(self.target, ActionTarget::Region(_))
    }
}

/// Why an action was not (successfully) performed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ActionFailure {
    /// Failure kind
    pub kind: ErrorKind,
    /// Details
    pub message: String,
}

impl ActionFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Checks preconditions and issues exactly one driver call
#[derive(Clone)]
pub struct InteractionExecutor {
    view: Arc<dyn ViewAccessor>,
    driver: Arc<dyn ActionDriver>,
    clock: Arc<dyn Clock>,
    stability_interval: Duration,
}

impl std::fmt::Debug for InteractionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionExecutor")
            .field("stability_interval", &self.stability_interval)
            .finish_non_exhaustive()
    }
}

impl InteractionExecutor {
    /// Create an executor
    #[must_use]
    pub fn new(
        view: Arc<dyn ViewAccessor>,
        driver: Arc<dyn ActionDriver>,
        clock: Arc<dyn Clock>,
        stability_interval: Duration,
    ) -> Self {
        Self {
            view,
            driver,
            clock,
            stability_interval,
        }
    }

    /// Perform `action` on `resolved`
    ///
    /// # Errors
    ///
    /// Returns the failure kind and a message when a precondition fails,
    /// the driver raises, or a fill does not take effect.
    pub fn perform(&self, resolved: &ResolvedElement, action: &Action) -> Result<(), ActionFailure> {
        self.check_preconditions(resolved, action)?;

        debug!(target_element = %resolved.target, action = %action.kind(), "issuing action");
        let issued = match action {
            Action::Click(options) => self.driver.click(&resolved.target, options),
            Action::Fill { text } => self.driver.fill(&resolved.target, text),
            Action::Hover => self.driver.hover(&resolved.target),
        };
        match issued {
            Ok(()) => {}
            Err(DriverError::Stale) => {
                return Err(ActionFailure::new(ErrorKind::Stale, "driver reported a stale handle"));
            }
            Err(DriverError::Failed(message)) => {
                warn!(target_element = %resolved.target, %message, "driver error");
                return Err(ActionFailure::new(ErrorKind::DriverError, message));
            }
        }

        self.verify(resolved, action)
    }

    fn check_preconditions(&self, resolved: &ResolvedElement, action: &Action) -> Result<(), ActionFailure> {
        let node = match resolved.target {
            ActionTarget::Node(node) => node,
            ActionTarget::Region(region) => {
                let viewport = self.view.viewport();
                if region.is_empty() || !region.is_within(&viewport) {
                    return Err(ActionFailure::new(
                        ErrorKind::NotInteractable,
                        format!("region {} lies outside the viewport", resolved.target),
                    ));
                }
                return Ok(());
            }
        };

        if !self.view.is_attached(node) {
            return Err(ActionFailure::new(ErrorKind::Stale, format!("{node} detached before action")));
        }
        if !self.view.is_visible(node) {
            return Err(ActionFailure::new(ErrorKind::NotInteractable, format!("{node} is not visible")));
        }
        if action.kind().requires_enabled() && !self.view.is_enabled(node) {
            return Err(ActionFailure::new(ErrorKind::NotInteractable, format!("{node} is disabled")));
        }

        let first = self.view.bounding_box(node);
        self.clock.sleep(self.stability_interval);
        let second = self.view.bounding_box(node);
        if !self.view.is_attached(node) {
            return Err(ActionFailure::new(
                ErrorKind::Stale,
                format!("{node} detached during stability check"),
            ));
        }
        match (first, second) {
            (Some(a), Some(b)) if a == b => Ok(()),
            _ => Err(ActionFailure::new(
                ErrorKind::NotInteractable,
                format!("{node} bounding box is not stable"),
            )),
        }
    }

    fn verify(&self, resolved: &ResolvedElement, action: &Action) -> Result<(), ActionFailure> {
        if let (Action::Fill { text }, ActionTarget::Node(node)) = (action, resolved.target) {
            if let Some(value) = self.view.input_value(node) {
                if value != *text {
                    return Err(ActionFailure::new(
                        ErrorKind::Unverified,
                        format!("{node} holds {value:?} after fill, expected {text:?}"),
                    ));
                }
            }
        }
        Ok(())
    }
}
