//! Fallback orchestration: walk a locator chain, fall back to visual
//! resolution, act, and retry whole passes with backoff.
//!
//! # Pass state machine
//!
//! ```text
//!                 ┌──────────────────────────┐
//!                 │     TRYING_CHAIN(i)      │◄─── i = 0 (or the cached index)
//!                 └────────────┬─────────────┘
//!          FOUND               │ NOT_FOUND / AMBIGUOUS / ERROR
//!     ┌────────────────────────┼──────────────────────────────┐
//!     ▼                        ▼                              ▼
//! SUCCEEDED          i+1 < len: TRYING_CHAIN(i+1)   last, visual enabled:
//!     ▲                                                 TRYING_VISUAL
//!     │ FOUND                                               │
//!     └─────────────────────────────────────────────────────┤ NOT_FOUND
//!                                                           ▼
//!                                                         FAILED
//! ```
//!
//! Chain entries are tried strictly in order with no delay between them;
//! each gets its own polling budget. Visual locators are never polled
//! structurally, and the visual path runs at most once per pass, after the
//! whole chain is exhausted.
//!
//! # Outer retry wrapper
//!
//! One pass (resolve, then act) is one outer attempt. After a retryable
//! failure the wrapper sleeps for [`RetryScheduler::next_delay`] and starts
//! a fresh pass from the top of the chain. Driver errors, unverified fills
//! and cancellation abort immediately.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::LocatorCache;
use crate::clock::{CancellationToken, Clock, SystemClock};
use crate::config::{duration_ms, EngineConfig};
use crate::executor::{InteractionExecutor, ResolvedElement};
use crate::locator::{LocatorChain, LocatorSpec};
use crate::result::{ErrorKind, TenazResult};
use crate::retry::{Backoff, RetryPolicy, RetryScheduler};
use crate::structural::{StructuralOutcome, StructuralResolver};
use crate::view::{
    Action, ActionDriver, ActionKind, ActionTarget, InMemoryImageStore, ReferenceImageStore, TextRecognizer,
    ViewAccessor,
};
use crate::vision::VisualResolver;

// =============================================================================
// REQUEST / RESULT TYPES
// =============================================================================

/// Outcome of one resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    /// The locator resolved
    Found,
    /// Nothing (or nothing unique) matched within budget
    NotFound,
    /// The query or the visual pipeline failed
    Error,
}

impl AttemptOutcome {
    /// Canonical upper-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "FOUND",
            Self::NotFound => "NOT_FOUND",
            Self::Error => "ERROR",
        }
    }
}

/// One entry of the append-only attempt log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionAttempt {
    /// Locator tried
    pub locator: LocatorSpec,
    /// What happened
    pub outcome: AttemptOutcome,
    /// Time spent on this locator
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
    /// Visual confidence, for visual attempts that produced a candidate
    pub confidence: Option<f32>,
    /// Outer attempt number (1-based)
    pub pass: u32,
    /// Position in the chain; `None` for a visual locator derived from text
    pub chain_index: Option<usize>,
    /// Why it ended the way it did
    pub note: String,
}

/// Terminal failure of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionError {
    /// Failure kind
    pub kind: ErrorKind,
    /// Details
    pub message: String,
    /// Locator involved, if any
    pub locator: Option<LocatorSpec>,
    /// Action requested, if any
    pub action: Option<ActionKind>,
    /// Time from request start to failure
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
}

/// What a request produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionResult {
    /// Request identifier
    pub request_id: Uuid,
    /// Whether the element resolved (and the action, if any, succeeded)
    pub success: bool,
    /// The element acted on
    pub resolved: Option<ResolvedElement>,
    /// Every attempt, in order
    pub attempts: Vec<ResolutionAttempt>,
    /// Outer attempts made
    pub passes: u32,
    /// Set when `success` is false
    pub error: Option<InteractionError>,
    /// Total time
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
}

impl InteractionResult {
    /// The failure kind, if the request failed
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Attempts made during outer attempt `pass`
    pub fn attempts_in_pass(&self, pass: u32) -> impl Iterator<Item = &ResolutionAttempt> {
        self.attempts.iter().filter(move |a| a.pass == pass)
    }
}

/// One caller request: what to find, what to do, and how hard to try
#[derive(Debug, Clone)]
pub struct InteractionRequest {
    /// Request identifier
    pub id: Uuid,
    /// Candidates, primary first
    pub chain: LocatorChain,
    /// Action to perform; `None` resolves only
    pub action: Option<Action>,
    /// Polling budget per structural locator
    pub timeout_per_locator: Duration,
    /// Outer retry policy
    pub retry_policy: RetryPolicy,
    /// Whether to fall back to visual resolution
    pub visual_fallback_enabled: bool,
    /// Stable key for the best-known-locator cache
    pub cache_key: Option<String>,
    /// Caller's cancellation signal
    pub cancel: Option<CancellationToken>,
}

impl InteractionRequest {
    /// A single-pass, resolve-only request with default budgets
    #[must_use]
    pub fn new(chain: LocatorChain) -> Self {
        let defaults = EngineConfig::default();
        Self {
            id: Uuid::new_v4(),
            chain,
            action: None,
            timeout_per_locator: defaults.timeout_per_locator,
            retry_policy: defaults.retry,
            visual_fallback_enabled: defaults.visual_fallback,
            cache_key: None,
            cancel: None,
        }
    }

    /// Set the action
    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Set the per-locator polling budget
    #[must_use]
    pub const fn with_timeout_per_locator(mut self, timeout: Duration) -> Self {
        self.timeout_per_locator = timeout;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Enable or disable visual fallback
    #[must_use]
    pub const fn with_visual_fallback(mut self, enabled: bool) -> Self {
        self.visual_fallback_enabled = enabled;
        self
    }

    /// Use the best-known-locator cache under `key`
    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Observe `token` between polls and attempts
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Failure of one pass
#[derive(Debug, Clone)]
struct PassFailure {
    kind: ErrorKind,
    message: String,
    locator: Option<LocatorSpec>,
}

impl PassFailure {
    fn new(kind: ErrorKind, message: impl Into<String>, locator: Option<LocatorSpec>) -> Self {
        Self {
            kind,
            message: message.into(),
            locator,
        }
    }
}

/// Pass state
#[derive(Debug)]
enum State {
    TryingChain(usize),
    TryingVisual,
    Succeeded(ResolvedElement),
    Failed(PassFailure),
}

/// Per-pass bookkeeping
struct Pass<'a> {
    request: &'a InteractionRequest,
    number: u32,
    attempts: &'a mut Vec<ResolutionAttempt>,
    visual_used: bool,
}

/// Builder for [`FallbackOrchestrator`]
pub struct OrchestratorBuilder {
    view: Arc<dyn ViewAccessor>,
    driver: Arc<dyn ActionDriver>,
    clock: Arc<dyn Clock>,
    images: Arc<dyn ReferenceImageStore>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    cache: Arc<LocatorCache>,
    config: EngineConfig,
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("clock", &self.clock)
            .field("has_recognizer", &self.recognizer.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrchestratorBuilder {
    /// Use `clock` for every wait
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Load template images from `images`
    #[must_use]
    pub fn image_store(mut self, images: Arc<dyn ReferenceImageStore>) -> Self {
        self.images = images;
        self
    }

    /// Enable description lookups through `recognizer`
    #[must_use]
    pub fn recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Share `cache` with other orchestrators
    #[must_use]
    pub fn cache(mut self, cache: Arc<LocatorCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use `config`
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the config and wire the components
    pub fn build(self) -> TenazResult<FallbackOrchestrator> {
        self.config.validate()?;
        let structural = StructuralResolver::new(self.view.clone(), self.clock.clone(), self.config.poll_interval)
            .with_ambiguity(self.config.ambiguity);
        let mut visual = VisualResolver::new(self.images, self.config.visual.clone());
        if let Some(recognizer) = self.recognizer {
            visual = visual.with_recognizer(recognizer);
        }
        let executor = InteractionExecutor::new(
            self.view.clone(),
            self.driver,
            self.clock.clone(),
            self.config.stability_interval,
        );
        Ok(FallbackOrchestrator {
            view: self.view,
            clock: self.clock,
            structural,
            visual,
            executor,
            cache: self.cache,
            config: self.config,
        })
    }
}

/// The single entry point: resolve a chain and act on the result
pub struct FallbackOrchestrator {
    view: Arc<dyn ViewAccessor>,
    clock: Arc<dyn Clock>,
    structural: StructuralResolver,
    visual: VisualResolver,
    executor: InteractionExecutor,
    cache: Arc<LocatorCache>,
    config: EngineConfig,
}

impl std::fmt::Debug for FallbackOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackOrchestrator")
            .field("structural", &self.structural)
            .field("visual", &self.visual)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FallbackOrchestrator {
    /// Start building an orchestrator over `view` and `driver`
    #[must_use]
    pub fn builder(view: Arc<dyn ViewAccessor>, driver: Arc<dyn ActionDriver>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            view,
            driver,
            clock: Arc::new(SystemClock::new()),
            images: Arc::new(InMemoryImageStore::new()),
            recognizer: None,
            cache: Arc::new(LocatorCache::new()),
            config: EngineConfig::default(),
        }
    }

    /// The configuration in use
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The best-known-locator cache
    #[must_use]
    pub fn cache(&self) -> &Arc<LocatorCache> {
        &self.cache
    }

    /// A request for `chain` with this orchestrator's configured defaults
    #[must_use]
    pub fn request(&self, chain: LocatorChain) -> InteractionRequest {
        InteractionRequest::new(chain)
            .with_timeout_per_locator(self.config.timeout_per_locator)
            .with_retry_policy(self.config.retry)
            .with_visual_fallback(self.config.visual_fallback)
    }

    /// Resolve `chain` and perform `action` on it
    ///
    /// # Errors
    ///
    /// Returns error only if `policy` is invalid; interaction failures are
    /// reported in the result.
    pub fn resolve_and_act(
        &self,
        chain: LocatorChain,
        action: Action,
        policy: RetryPolicy,
        visual_fallback_enabled: bool,
    ) -> TenazResult<InteractionResult> {
        let request = self
            .request(chain)
            .with_action(action)
            .with_retry_policy(policy)
            .with_visual_fallback(visual_fallback_enabled);
        self.execute(&request)
    }

    /// Resolve `chain` without acting, e.g. for existence checks
    ///
    /// # Errors
    ///
    /// Returns error only if `policy` is invalid.
    pub fn resolve_only(&self, chain: LocatorChain, policy: RetryPolicy) -> TenazResult<InteractionResult> {
        let request = self.request(chain).with_retry_policy(policy);
        self.execute(&request)
    }

    /// Run a request to completion
    ///
    /// # Errors
    ///
    /// Returns error only if the request's retry policy is invalid.
    pub fn execute(&self, request: &InteractionRequest) -> TenazResult<InteractionResult> {
        request.retry_policy.validate()?;
        let policy = request.retry_policy;
        let start = self.clock.now();
        let mut attempts = Vec::new();
        let mut pass_number = 1;

        info!(
            request_id = %request.id,
            chain = %request.chain,
            action = ?request.action.as_ref().map(Action::kind),
            max_attempts = policy.max_attempts,
            visual = request.visual_fallback_enabled,
            "interaction started"
        );

        let failure = loop {
            if request.is_cancelled() {
                break PassFailure::new(ErrorKind::Cancelled, "cancelled before attempt", None);
            }

            let mut pass = Pass {
                request,
                number: pass_number,
                attempts: &mut attempts,
                visual_used: false,
            };
            let failure = match self.run_pass(&mut pass) {
                Ok(resolved) => {
                    let elapsed = self.clock.now().saturating_sub(start);
                    info!(
                        request_id = %request.id,
                        locator = %resolved.matched_locator,
                        confidence = resolved.confidence,
                        passes = pass_number,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "interaction succeeded"
                    );
                    return Ok(InteractionResult {
                        request_id: request.id,
                        success: true,
                        resolved: Some(resolved),
                        attempts,
                        passes: pass_number,
                        error: None,
                        elapsed,
                    });
                }
                Err(failure) => failure,
            };

            if !failure.kind.is_retryable() || !policy.allows_retry() {
                break failure;
            }
            if pass_number >= policy.max_attempts {
                break exhausted(&failure, pass_number, "every attempt failed");
            }
            let delay = match RetryScheduler::next_delay(pass_number, &policy) {
                Backoff::Wait(delay) => delay,
                Backoff::Exhausted => break exhausted(&failure, pass_number, "retry budget spent"),
            };
            let waited = self.clock.now().saturating_sub(start);
            if waited.saturating_add(delay) > policy.max_total_wait {
                break exhausted(&failure, pass_number, "max total wait reached");
            }

            debug!(request_id = %request.id, pass = pass_number, delay_ms = delay.as_millis() as u64, kind = %failure.kind, "backing off");
            self.clock.sleep(delay);
            pass_number += 1;
        };

        let elapsed = self.clock.now().saturating_sub(start);
        warn!(
            request_id = %request.id,
            kind = %failure.kind,
            message = %failure.message,
            passes = pass_number,
            attempts = attempts.len(),
            "interaction failed"
        );
        Ok(InteractionResult {
            request_id: request.id,
            success: false,
            resolved: None,
            attempts,
            passes: pass_number,
            error: Some(InteractionError {
                kind: failure.kind,
                message: failure.message,
                locator: failure.locator,
                action: request.action.as_ref().map(Action::kind),
                elapsed,
            }),
            elapsed,
        })
    }

    /// Resolve, act, and heal one stale element
    fn run_pass(&self, pass: &mut Pass<'_>) -> Result<ResolvedElement, PassFailure> {
        let resolved = self.resolve_pass(pass)?;
        let Some(action) = pass.request.action.as_ref() else {
            return Ok(resolved);
        };

        match self.act(pass.request, &resolved, action) {
            Err(failure) if failure.kind == ErrorKind::Stale => {
                info!(request_id = %pass.request.id, locator = %resolved.matched_locator, "element went stale, re-resolving once");
                let healed = self.resolve_pass(pass)?;
                self.act(pass.request, &healed, action).map(|()| healed)
            }
            other => other.map(|()| resolved),
        }
    }

    fn act(&self, request: &InteractionRequest, resolved: &ResolvedElement, action: &Action) -> Result<(), PassFailure> {
        if request.is_cancelled() {
            return Err(PassFailure::new(
                ErrorKind::Cancelled,
                "cancelled before action",
                Some(resolved.matched_locator.clone()),
            ));
        }
        self.executor
            .perform(resolved, action)
            .map_err(|f| PassFailure::new(f.kind, f.message, Some(resolved.matched_locator.clone())))
    }

    /// Walk the state machine once
    fn resolve_pass(&self, pass: &mut Pass<'_>) -> Result<ResolvedElement, PassFailure> {
        let request = pass.request;
        let preferred = request
            .cache_key
            .as_deref()
            .and_then(|key| self.cache.preferred_index(key, &request.chain));
        let order = request.chain.structural_order(preferred);

        let mut saw_ambiguous = false;
        let mut last_locator: Option<LocatorSpec> = None;
        let no_match = |ambiguous: bool, locator: Option<LocatorSpec>| {
            if ambiguous {
                PassFailure::new(ErrorKind::Ambiguous, "a locator matched more than one element", locator)
            } else {
                PassFailure::new(ErrorKind::NotFound, "no locator resolved", locator)
            }
        };

        let mut state = if order.is_empty() {
            let why = if request.visual_fallback_enabled {
                "no structural locator in chain and visual fallback already ran this pass"
            } else {
                "no structural locator in chain and visual fallback is disabled"
            };
            let primary = Some(request.chain.primary().clone());
            Self::after_chain(pass, PassFailure::new(ErrorKind::NotFound, why, primary))
        } else {
            State::TryingChain(0)
        };

        loop {
            state = match state {
                State::TryingChain(position) => {
                    let index = order[position];
                    let Some(spec) = request.chain.get(index) else {
                        return Err(no_match(saw_ambiguous, last_locator));
                    };
                    if request.is_cancelled() {
                        return Err(PassFailure::new(ErrorKind::Cancelled, "cancelled", Some(spec.clone())));
                    }
                    last_locator = Some(spec.clone());

                    match self.try_structural(pass, index, spec) {
                        Ok(resolved) => State::Succeeded(resolved),
                        Err(StructuralMiss::Cancelled) => {
                            return Err(PassFailure::new(ErrorKind::Cancelled, "cancelled while polling", Some(spec.clone())));
                        }
                        Err(miss) => {
                            saw_ambiguous |= matches!(miss, StructuralMiss::Ambiguous);
                            if position + 1 < order.len() {
                                State::TryingChain(position + 1)
                            } else {
                                Self::after_chain(pass, no_match(saw_ambiguous, last_locator.clone()))
                            }
                        }
                    }
                }
                State::TryingVisual => match self.try_visual(pass) {
                    Ok(resolved) => State::Succeeded(resolved),
                    Err(locator) => State::Failed(no_match(saw_ambiguous, locator.or_else(|| last_locator.clone()))),
                },
                State::Succeeded(resolved) => return Ok(resolved),
                State::Failed(failure) => return Err(failure),
            };
        }
    }

    /// Next state once every structural locator failed
    fn after_chain(pass: &Pass<'_>, failure: PassFailure) -> State {
        if pass.request.visual_fallback_enabled && !pass.visual_used {
            State::TryingVisual
        } else {
            State::Failed(failure)
        }
    }

    fn try_structural(&self, pass: &mut Pass<'_>, index: usize, spec: &LocatorSpec) -> Result<ResolvedElement, StructuralMiss> {
        let started = self.clock.now();
        let outcome = self
            .structural
            .resolve(spec, pass.request.timeout_per_locator, pass.request.cancel.as_ref());
        let latency = self.clock.now().saturating_sub(started);

        let (outcome, note, result) = match outcome {
            Ok(StructuralOutcome::Found { found, polls }) => {
                if let Some(key) = pass.request.cache_key.as_deref() {
                    self.cache.record(key, &pass.request.chain, index);
                }
                let resolved = ResolvedElement {
                    target: ActionTarget::Node(found.node),
                    bounding_box: found.bounding_box,
                    matched_locator: spec.clone(),
                    chain_index: Some(index),
                    confidence: 1.0,
                    element_type: found.element_type,
                };
                (AttemptOutcome::Found, format!("matched {} after {polls} polls", found.node), Ok(resolved))
            }
            Ok(StructuralOutcome::NotFound { reason, polls }) => (
                AttemptOutcome::NotFound,
                format!("{reason} after {polls} polls"),
                Err(StructuralMiss::NotFound),
            ),
            Ok(StructuralOutcome::Ambiguous { matches, polls }) => (
                AttemptOutcome::NotFound,
                format!("ambiguous: {matches} matching elements after {polls} polls"),
                Err(StructuralMiss::Ambiguous),
            ),
            Ok(StructuralOutcome::Error { message, .. }) => {
                (AttemptOutcome::Error, message, Err(StructuralMiss::NotFound))
            }
            Ok(StructuralOutcome::Cancelled { polls }) => (
                AttemptOutcome::NotFound,
                format!("cancelled after {polls} polls"),
                Err(StructuralMiss::Cancelled),
            ),
            Err(err) => (AttemptOutcome::Error, err.to_string(), Err(StructuralMiss::NotFound)),
        };

        debug!(
            request_id = %pass.request.id,
            pass = pass.number,
            index,
            locator = %spec,
            outcome = outcome.as_str(),
            latency_ms = latency.as_millis() as u64,
            "structural attempt"
        );
        pass.attempts.push(ResolutionAttempt {
            locator: spec.clone(),
            outcome,
            latency,
            confidence: None,
            pass: pass.number,
            chain_index: Some(index),
            note,
        });
        result
    }

    /// One frame capture, one visual resolution. `Err` carries the locator
    /// that was tried, if any.
    fn try_visual(&self, pass: &mut Pass<'_>) -> Result<ResolvedElement, Option<LocatorSpec>> {
        pass.visual_used = true;
        let chain = &pass.request.chain;
        let Some(spec) = chain.visual_candidate() else {
            debug!(request_id = %pass.request.id, pass = pass.number, "no visual or text locator to fall back on");
            pass.attempts.push(ResolutionAttempt {
                locator: chain.primary().clone(),
                outcome: AttemptOutcome::NotFound,
                latency: Duration::ZERO,
                confidence: None,
                pass: pass.number,
                chain_index: None,
                note: "visual fallback skipped: no visual or text locator in chain".to_string(),
            });
            return Err(None);
        };
        let chain_index = chain.iter().position(|l| *l == spec);

        let started = self.clock.now();
        let resolved = self
            .view
            .capture_frame()
            .map_err(|e| format!("frame capture failed: {e}"))
            .and_then(|frame| {
                self.visual
                    .resolve(&spec, &frame, spec.expected_type())
                    .map_err(|e| e.to_string())
            });
        let latency = self.clock.now().saturating_sub(started);

        let (outcome, confidence, note, result) = match resolved {
            Ok(Some(found)) => (
                AttemptOutcome::Found,
                Some(found.confidence),
                format!("visual match as {} (similarity {:.2})", found.element_type, found.similarity),
                Ok(ResolvedElement {
                    target: ActionTarget::Region(found.bounds),
                    bounding_box: found.bounds,
                    matched_locator: spec.clone(),
                    chain_index,
                    confidence: found.confidence,
                    element_type: Some(found.element_type),
                }),
            ),
            Ok(None) => (
                AttemptOutcome::NotFound,
                None,
                "no visual candidate above the confidence floor".to_string(),
                Err(Some(spec.clone())),
            ),
            Err(message) => (AttemptOutcome::Error, None, message, Err(Some(spec.clone()))),
        };

        debug!(
            request_id = %pass.request.id,
            pass = pass.number,
            locator = %spec,
            outcome = outcome.as_str(),
            confidence = ?confidence,
            "visual attempt"
        );
        pass.attempts.push(ResolutionAttempt {
            locator: spec,
            outcome,
            latency,
            confidence,
            pass: pass.number,
            chain_index,
            note,
        });
        result
    }
}

/// Why a structural locator did not resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructuralMiss {
    NotFound,
    Ambiguous,
    Cancelled,
}

fn exhausted(last: &PassFailure, passes: u32, why: &str) -> PassFailure {
    PassFailure::new(
        ErrorKind::Exhausted,
        format!("{why} after {passes} attempts; last failure {}: {}", last.kind, last.message),
        last.locator.clone(),
    )
}
