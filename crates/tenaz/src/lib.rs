//! Tenaz: resilient element resolution for UI automation
//!
//! Tenaz (Spanish: "tenacious") finds an on-screen element from an ordered
//! chain of candidate locators, falls back to visual recognition when every
//! structural locator fails, and retries whole resolution passes with
//! bounded exponential backoff before performing a click, fill or hover.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     TENAZ Architecture                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   InteractionRequest                                             │
//! │          │                                                       │
//! │          ▼                                                       │
//! │   ┌──────────────────┐   retry w/ backoff   ┌────────────────┐  │
//! │   │ Fallback         │◄────────────────────►│ RetryScheduler │  │
//! │   │ Orchestrator     │                      └────────────────┘  │
//! │   └──┬──────────┬────┘                                           │
//! │      │          │ chain exhausted                                │
//! │      ▼          ▼                                                │
//! │ ┌──────────┐ ┌──────────────────────────────────────────┐       │
//! │ │Structural│ │ VisualResolver                           │       │
//! │ │Resolver  │ │  Preprocessor → OCR / Template → Classify│       │
//! │ └────┬─────┘ └──────────────────┬───────────────────────┘       │
//! │      │   ViewAccessor           │ frame                          │
//! │      └───────────┬──────────────┘                                │
//! │                  ▼                                               │
//! │        ┌───────────────────┐        ┌──────────────┐            │
//! │        │InteractionExecutor│───────►│ ActionDriver │            │
//! │        └───────────────────┘        └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tenaz::mock::{MockDriver, MockElement, MockView};
//! use tenaz::{Action, BoundingBox, FakeClock, FallbackOrchestrator, LocatorChain, LocatorSpec, RetryPolicy};
//!
//! let clock = Arc::new(FakeClock::new());
//! let view = Arc::new(MockView::new(clock.clone()));
//! view.add(MockElement::new(BoundingBox::new(10.0, 10.0, 80.0, 30.0)).matching_text("Submit"));
//! let driver = Arc::new(MockDriver::new(view.clone()));
//!
//! let orchestrator = FallbackOrchestrator::builder(view, driver.clone())
//!     .clock(clock)
//!     .build()
//!     .unwrap();
//! let chain = LocatorChain::new(vec![
//!     LocatorSpec::css("#submit-btn").unwrap(),
//!     LocatorSpec::text("Submit").unwrap(),
//! ])
//! .unwrap();
//! let request = orchestrator
//!     .request(chain)
//!     .with_action(Action::click())
//!     .with_timeout_per_locator(Duration::from_secs(2));
//!
//! let result = orchestrator.execute(&request).unwrap();
//! assert!(result.success);
//! assert_eq!(result.attempts.len(), 2);
//! assert_eq!(driver.call_count(), 1);
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Best-known-locator cache
pub mod cache;

/// Time source and cancellation
pub mod clock;

/// Engine configuration (YAML / JSON)
pub mod config;

/// Pre-action checks and action dispatch
pub mod executor;

/// Locator specifications and chains
pub mod locator;

/// Scriptable view, driver and recognizer for tests
pub mod mock;

/// Fallback state machine and outer retry wrapper
pub mod orchestrator;

/// Text and JSON reports of interaction results
pub mod report;

/// Errors and failure kinds
pub mod result;

/// Backoff policy evaluation
pub mod retry;

/// Structural locator resolution
pub mod structural;

/// Tracing subscriber setup
pub mod telemetry;

/// Abstractions over the automated UI
pub mod view;

/// Visual fallback pipeline
pub mod vision;

/// Deadline-bounded polling
pub mod wait;

pub use cache::{CacheEntry, LocatorCache};
pub use clock::{CancellationToken, Clock, FakeClock, SystemClock};
pub use config::{EngineConfig, LogConfig, VisualConfig};
pub use executor::{ActionFailure, InteractionExecutor, ResolvedElement};
pub use locator::{BoundingBox, ElementType, LocatorChain, LocatorSpec, Point, Strategy};
pub use orchestrator::{
    AttemptOutcome, FallbackOrchestrator, InteractionError, InteractionRequest, InteractionResult,
    OrchestratorBuilder, ResolutionAttempt,
};
pub use report::{render_json, render_text};
pub use result::{ErrorKind, TenazError, TenazResult};
pub use retry::{Backoff, RetryPolicy, RetryScheduler};
pub use structural::{AmbiguityPolicy, StructuralMatch, StructuralOutcome, StructuralResolver};
pub use telemetry::init_tracing;
pub use view::{
    Action, ActionDriver, ActionKind, ActionTarget, ClickOptions, DirectoryImageStore, DriverError, InMemoryImageStore,
    MouseButton, NodeHandle, ReferenceImageStore, TextRecognizer, TextRegion, ViewAccessor, ViewError,
};
pub use vision::{ElementClassifier, OcrTextMatcher, TemplateMatcher, VisualMatch, VisualResolver};
