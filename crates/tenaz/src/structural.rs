//! Structural resolution: CSS, XPath, text and role queries against the
//! live view.
//!
//! A query is polled until exactly one attached node with layout matches,
//! or the per-locator deadline elapses. Multiple matches are narrowed by
//! the locator's expected type; whatever ambiguity remains is reported,
//! not guessed at (unless the caller opts into
//! [`AmbiguityPolicy::FirstInDocumentOrder`]).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::clock::{CancellationToken, Clock};
use crate::locator::{BoundingBox, ElementType, LocatorSpec, Strategy};
use crate::result::{TenazError, TenazResult};
use crate::view::{NodeHandle, ViewAccessor, ViewError};
use crate::wait::{Poller, WaitOutcome, WaitStep};

/// What to do when more than one node survives narrowing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Report the locator as ambiguous
    #[default]
    Reject,
    /// Take the first node in document order
    FirstInDocumentOrder,
}

/// A node found by a structural query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructuralMatch {
    /// The matched node
    pub node: NodeHandle,
    /// Its bounding box when matched
    pub bounding_box: BoundingBox,
    /// Its semantic type, if the view reports one
    pub element_type: Option<ElementType>,
}

/// Outcome of resolving one structural locator
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralOutcome {
    /// A unique node matched
    Found {
        /// The match
        found: StructuralMatch,
        /// Number of queries issued
        polls: u32,
    },
    /// Nothing matched before the deadline
    NotFound {
        /// Why the last query did not resolve
        reason: String,
        /// Number of queries issued
        polls: u32,
    },
    /// Several nodes still matched at the deadline
    Ambiguous {
        /// How many nodes matched
        matches: usize,
        /// Number of queries issued
        polls: u32,
    },
    /// The query failed
    Error {
        /// Error message
        message: String,
        /// Number of queries issued
        polls: u32,
    },
    /// Cancelled between polls
    Cancelled {
        /// Number of queries issued
        polls: u32,
    },
}

/// Last thing seen by a pending query
#[derive(Debug, Clone, PartialEq)]
enum Observation {
    Absent,
    NoLayout,
    Ambiguous(usize),
    Unavailable(String),
}

/// Resolves structural locators by polling the view
#[derive(Clone)]
pub struct StructuralResolver {
    view: Arc<dyn ViewAccessor>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    ambiguity: AmbiguityPolicy,
}

impl std::fmt::Debug for StructuralResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuralResolver")
            .field("poll_interval", &self.poll_interval)
            .field("ambiguity", &self.ambiguity)
            .finish_non_exhaustive()
    }
}

impl StructuralResolver {
    /// Create a resolver polling `view` every `poll_interval`
    #[must_use]
    pub fn new(view: Arc<dyn ViewAccessor>, clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            view,
            clock,
            poll_interval,
            ambiguity: AmbiguityPolicy::default(),
        }
    }

    /// Set the ambiguity policy
    #[must_use]
    pub const fn with_ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity = policy;
        self
    }

    /// The poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll until `spec` resolves to a unique node or `deadline` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`TenazError::UnsupportedStrategy`] for visual strategies.
    pub fn resolve(
        &self,
        spec: &LocatorSpec,
        deadline: Duration,
        cancel: Option<&CancellationToken>,
    ) -> TenazResult<StructuralOutcome> {
        match spec.strategy() {
            Strategy::Css | Strategy::XPath | Strategy::Text | Strategy::Role => {}
            Strategy::VisualTemplate | Strategy::VisualDescription => {
                return Err(TenazError::UnsupportedStrategy {
                    strategy: spec.strategy().to_string(),
                    resolver: "structural",
                });
            }
        }

        let poller = Poller::new(self.clock.as_ref(), self.poll_interval, deadline).with_cancel(cancel);
        let outcome = poller.run(|| self.probe(spec));

        let result = match outcome {
            WaitOutcome::Done { value, polls } => match value {
                Ok(found) => StructuralOutcome::Found { found, polls },
                Err(message) => StructuralOutcome::Error { message, polls },
            },
            WaitOutcome::TimedOut { last, polls } => match last {
                Observation::Ambiguous(matches) => StructuralOutcome::Ambiguous { matches, polls },
                Observation::Absent => StructuralOutcome::NotFound {
                    reason: "no matching node".into(),
                    polls,
                },
                Observation::NoLayout => StructuralOutcome::NotFound {
                    reason: "matching node has no layout".into(),
                    polls,
                },
                Observation::Unavailable(message) => StructuralOutcome::Error { message, polls },
            },
            WaitOutcome::Cancelled { polls, .. } => StructuralOutcome::Cancelled { polls },
        };
        debug!(locator = %spec, polls = outcome_polls(&result), outcome = ?result, "structural resolution finished");
        Ok(result)
    }

    fn probe(&self, spec: &LocatorSpec) -> WaitStep<Result<StructuralMatch, String>, Observation> {
        let nodes = match self.view.query_all(spec.strategy(), spec.value()) {
            Ok(nodes) => nodes,
            Err(err @ ViewError::InvalidQuery { .. }) => return WaitStep::Done(Err(err.to_string())),
            Err(ViewError::Unavailable(message)) => {
                trace!(locator = %spec, %message, "view unavailable, polling again");
                return WaitStep::Pending(Observation::Unavailable(message));
            }
        };

        let candidates: Vec<NodeHandle> = nodes
            .into_iter()
            .filter(|&node| self.view.is_attached(node))
            .filter(|&node| match spec.expected_type() {
                Some(expected) => self.view.element_type(node) == Some(expected),
                None => true,
            })
            .collect();

        let chosen = match (candidates.as_slice(), self.ambiguity) {
            ([], _) => return WaitStep::Pending(Observation::Absent),
            ([only], _) | ([only, ..], AmbiguityPolicy::FirstInDocumentOrder) => *only,
            (many, AmbiguityPolicy::Reject) => {
                trace!(locator = %spec, matches = many.len(), "ambiguous match, polling again");
                return WaitStep::Pending(Observation::Ambiguous(many.len()));
            }
        };

        match self.view.bounding_box(chosen) {
            Some(bounding_box) => WaitStep::Done(Ok(StructuralMatch {
                node: chosen,
                bounding_box,
                element_type: self.view.element_type(chosen),
            })),
            None => WaitStep::Pending(Observation::NoLayout),
        }
    }
}

fn outcome_polls(outcome: &StructuralOutcome) -> u32 {
    match outcome {
        StructuralOutcome::Found { polls, .. }
        | StructuralOutcome::NotFound { polls, .. }
        | StructuralOutcome::Ambiguous { polls, .. }
        | StructuralOutcome::Error { polls, .. }
        | StructuralOutcome::Cancelled { polls } => *polls,
    }
}
