//! End-to-end interaction scenarios against the scripted mock view.
//!
//! Run with: `cargo test --test scenarios`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, GrayImage, Luma};
use tenaz::mock::{MockDriver, MockElement, MockRecognizer, MockView};
use tenaz::{
    Action, AttemptOutcome, BoundingBox, CancellationToken, Clock, ErrorKind, FakeClock, FallbackOrchestrator,
    LocatorChain, LocatorSpec, OrchestratorBuilder, RetryPolicy, Strategy, TextRegion,
};

struct Harness {
    clock: Arc<FakeClock>,
    view: Arc<MockView>,
    driver: Arc<MockDriver>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(FakeClock::new());
        let view = Arc::new(MockView::new(clock.clone()));
        let driver = Arc::new(MockDriver::new(view.clone()));
        Self { clock, view, driver }
    }

    fn builder(&self) -> OrchestratorBuilder {
        FallbackOrchestrator::builder(self.view.clone(), self.driver.clone()).clock(self.clock.clone())
    }
}

fn submit_chain() -> LocatorChain {
    LocatorChain::new(vec![
        LocatorSpec::css("#submit").unwrap(),
        LocatorSpec::text("Submit").unwrap(),
    ])
    .unwrap()
}

fn submit_button() -> MockElement {
    MockElement::new(BoundingBox::new(540.0, 400.0, 120.0, 36.0))
}

// =============================================================================
// SCENARIO A: late primary locator
// =============================================================================

#[test]
fn scenario_a_late_primary_succeeds_without_fallback() {
    let h = Harness::new();
    h.view.add(
        submit_button()
            .matching_css("#submit")
            .matching_text("Submit")
            .appearing_at(Duration::from_millis(1200)),
    );
    let orchestrator = h.builder().build().unwrap();
    let request = orchestrator
        .request(submit_chain())
        .with_timeout_per_locator(Duration::from_secs(2));

    let result = orchestrator.execute(&request).unwrap();

    assert!(result.success);
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.resolved.unwrap().chain_index, Some(0));
    assert_eq!(result.attempts[0].latency, Duration::from_millis(1200));
    assert_eq!(h.view.query_count(Strategy::Text, "Submit"), 0);
}

// =============================================================================
// SCENARIO B: element never appears
// =============================================================================

#[test]
fn scenario_b_missing_element_fails_not_found() {
    let h = Harness::new();
    let orchestrator = h.builder().build().unwrap();
    let request = orchestrator
        .request(LocatorChain::single(LocatorSpec::css("#ghost").unwrap()))
        .with_timeout_per_locator(Duration::from_millis(500))
        .with_visual_fallback(false);

    let result = orchestrator.execute(&request).unwrap();

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::NotFound);
    assert_eq!(result.elapsed, Duration::from_millis(500));
    assert_eq!(h.view.frame_captures(), 0);
}

// =============================================================================
// SCENARIO C: backoff schedule drives real waits
// =============================================================================

#[test]
fn scenario_c_backoff_schedule_between_passes() {
    let h = Harness::new();
    let orchestrator = h.builder().build().unwrap();
    let policy = RetryPolicy::new(4)
        .with_initial_delay(Duration::from_millis(500))
        .with_multiplier(2.0)
        .with_max_delay(Duration::from_secs(4));
    let request = orchestrator
        .request(LocatorChain::single(LocatorSpec::css("#ghost").unwrap()))
        .with_timeout_per_locator(Duration::ZERO)
        .with_retry_policy(policy);

    let result = orchestrator.execute(&request).unwrap();

    // Four zero-budget passes separated by 0.5s, 1s and 2s of backoff.
    assert_eq!(result.error_kind(), Some(ErrorKind::Exhausted));
    assert_eq!(result.passes, 4);
    assert_eq!(result.attempts.len(), 4);
    assert_eq!(h.clock.total_slept(), Duration::from_millis(3500));
    assert_eq!(tenaz::RetryScheduler::schedule(&policy), vec![
        Duration::from_millis(500),
        Duration::from_secs(1),
        Duration::from_secs(2),
        Duration::from_secs(4),
    ]);
}

// =============================================================================
// SCENARIO D: visual fallback through OCR
// =============================================================================

#[test]
fn scenario_d_visual_fallback_via_ocr() {
    let h = Harness::new();
    h.view
        .set_frame(DynamicImage::ImageLuma8(GrayImage::from_pixel(1280, 720, Luma([250]))));
    let recognizer = Arc::new(MockRecognizer::new(vec![TextRegion::new(
        "Submit",
        BoundingBox::new(560.0, 410.0, 80.0, 18.0),
        0.9,
    )]));
    let orchestrator = h.builder().recognizer(recognizer.clone()).build().unwrap();
    let request = orchestrator
        .request(submit_chain())
        .with_timeout_per_locator(Duration::from_millis(300))
        .with_visual_fallback(true)
        .with_action(Action::click());

    let result = orchestrator.execute(&request).unwrap();

    assert!(result.success);
    let resolved = result.resolved.clone().unwrap();
    assert!(resolved.is_visual());
    assert_eq!(resolved.matched_locator.strategy(), Strategy::VisualDescription);
    assert!((resolved.confidence - 0.9).abs() < 1e-6);

    let visual = result.attempts.last().unwrap();
    assert_eq!(visual.outcome, AttemptOutcome::Found);
    assert!((visual.confidence.unwrap() - 0.9).abs() < 1e-6);
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(recognizer.calls(), 1);

    let calls = h.driver.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, tenaz::ActionTarget::Region(resolved.bounding_box));
}

// =============================================================================
// SELF-HEALING, DRIVER ERRORS, CANCELLATION
// =============================================================================

#[test]
fn stale_element_is_reresolved_once_within_the_pass() {
    let h = Harness::new();
    // Re-render: the first node goes away during its stability sample.
    h.view.add(
        submit_button()
            .matching_css("#submit")
            .detaching_at(Duration::from_millis(30)),
    );
    h.view.add(
        submit_button()
            .matching_css("#submit")
            .appearing_at(Duration::from_millis(60)),
    );
    let orchestrator = h.builder().build().unwrap();

    let result = orchestrator
        .resolve_and_act(submit_chain(), Action::fill("alice"), RetryPolicy::single_pass(), false)
        .unwrap();

    assert!(result.success, "{}", tenaz::render_text(&result));
    assert_eq!(result.passes, 1);
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(h.driver.call_count(), 1);
    assert_eq!(h.driver.calls()[0].text.as_deref(), Some("alice"));
}

#[test]
fn stale_heal_falls_through_to_visual_within_the_pass() {
    let h = Harness::new();
    // Detaches during the stability sample and never comes back.
    h.view.add(
        submit_button()
            .matching_css("#submit")
            .detaching_at(Duration::from_millis(30)),
    );
    h.view
        .set_frame(DynamicImage::ImageLuma8(GrayImage::from_pixel(1280, 720, Luma([250]))));
    let recognizer = Arc::new(MockRecognizer::new(vec![TextRegion::new(
        "Submit",
        BoundingBox::new(560.0, 410.0, 80.0, 18.0),
        0.9,
    )]));
    let orchestrator = h.builder().recognizer(recognizer.clone()).build().unwrap();
    let request = orchestrator
        .request(submit_chain())
        .with_timeout_per_locator(Duration::from_millis(200))
        .with_retry_policy(RetryPolicy::single_pass())
        .with_visual_fallback(true)
        .with_action(Action::click());

    let result = orchestrator.execute(&request).unwrap();

    assert!(result.success, "{}", tenaz::render_text(&result));
    assert_eq!(result.passes, 1);
    assert!(result.resolved.as_ref().unwrap().is_visual());
    let log: Vec<(Strategy, AttemptOutcome, u32)> = result
        .attempts
        .iter()
        .map(|a| (a.locator.strategy(), a.outcome, a.pass))
        .collect();
    assert_eq!(log, vec![
        (Strategy::Css, AttemptOutcome::Found, 1),
        (Strategy::Css, AttemptOutcome::NotFound, 1),
        (Strategy::Text, AttemptOutcome::NotFound, 1),
        (Strategy::VisualDescription, AttemptOutcome::Found, 1),
    ]);
    assert_eq!(recognizer.calls(), 1);
    assert_eq!(h.view.frame_captures(), 1);
    assert_eq!(h.driver.call_count(), 1);
}

#[test]
fn visual_runs_at_most_once_per_pass_across_a_heal() {
    let h = Harness::new();
    h.view
        .set_frame(DynamicImage::ImageLuma8(GrayImage::from_pixel(1280, 720, Luma([250]))));
    let recognizer = Arc::new(MockRecognizer::new(vec![TextRegion::new(
        "Submit",
        BoundingBox::new(560.0, 410.0, 80.0, 18.0),
        0.9,
    )]));
    h.driver.stale_next(1);
    let orchestrator = h.builder().recognizer(recognizer.clone()).build().unwrap();
    let request = orchestrator
        .request(submit_chain())
        .with_timeout_per_locator(Duration::from_millis(100))
        .with_retry_policy(RetryPolicy::new(2).with_initial_delay(Duration::from_millis(100)))
        .with_visual_fallback(true)
        .with_action(Action::click());

    let result = orchestrator.execute(&request).unwrap();

    // Pass 1: visual hit goes stale, the heal walks the chain but may not
    // reuse visual. Pass 2 starts fresh and succeeds visually.
    assert!(result.success, "{}", tenaz::render_text(&result));
    assert_eq!(result.passes, 2);
    for pass in 1..=2 {
        let visual = result
            .attempts_in_pass(pass)
            .filter(|a| a.locator.strategy().is_visual())
            .count();
        assert_eq!(visual, 1, "pass {pass}");
    }
    assert_eq!(result.attempts_in_pass(1).count(), 5);
    assert_eq!(result.attempts_in_pass(2).count(), 3);
    assert_eq!(recognizer.calls(), 2);
    assert_eq!(h.view.frame_captures(), 2);
    assert_eq!(h.driver.call_count(), 1);
}

#[test]
fn empty_frame_fails_cleanly() {
    let h = Harness::new();
    h.view.set_frame(DynamicImage::new_luma8(0, 0));
    let recognizer = Arc::new(MockRecognizer::new(vec![TextRegion::new(
        "Submit",
        BoundingBox::new(0.0, 0.0, 80.0, 18.0),
        0.9,
    )]));
    let orchestrator = h.builder().recognizer(recognizer.clone()).build().unwrap();
    let request = orchestrator
        .request(submit_chain())
        .with_timeout_per_locator(Duration::from_millis(100))
        .with_retry_policy(RetryPolicy::single_pass())
        .with_visual_fallback(true)
        .with_action(Action::click());

    let result = orchestrator.execute(&request).unwrap();

    assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
    assert_eq!(result.attempts.len(), 3);
    let visual = result.attempts.last().unwrap();
    assert_eq!(visual.locator.strategy(), Strategy::VisualDescription);
    assert_eq!(visual.outcome, AttemptOutcome::NotFound);
    assert_eq!(h.view.frame_captures(), 1);
    assert_eq!(recognizer.calls(), 0);
    assert_eq!(h.driver.call_count(), 0);
}

#[test]
fn driver_stale_heals_and_acts_exactly_once() {
    let h = Harness::new();
    h.view.add(submit_button().matching_css("#submit"));
    h.driver.stale_next(1);
    let orchestrator = h.builder().build().unwrap();

    let result = orchestrator
        .resolve_and_act(submit_chain(), Action::click(), RetryPolicy::new(3), false)
        .unwrap();

    assert!(result.success);
    assert_eq!(result.passes, 1);
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(h.driver.call_count(), 1);
}

#[test]
fn driver_error_is_not_retried() {
    let h = Harness::new();
    h.view.add(submit_button().matching_css("#submit"));
    h.driver.fail_with("browser disconnected");
    let orchestrator = h.builder().build().unwrap();

    let result = orchestrator
        .resolve_and_act(submit_chain(), Action::click(), RetryPolicy::new(5), true)
        .unwrap();

    assert_eq!(result.error_kind(), Some(ErrorKind::DriverError));
    assert_eq!(result.passes, 1);
    assert_eq!(h.driver.call_count(), 1);
    assert_eq!(h.clock.total_slept(), Duration::from_millis(50));
}

#[test]
fn unverified_fill_is_reported() {
    let h = Harness::new();
    h.view.add(submit_button().matching_css("#submit").with_value("").ignoring_input());
    let orchestrator = h.builder().build().unwrap();

    let result = orchestrator
        .resolve_and_act(submit_chain(), Action::fill("alice"), RetryPolicy::new(3), false)
        .unwrap();

    assert_eq!(result.error_kind(), Some(ErrorKind::Unverified));
    assert_eq!(result.passes, 1);
}

/// Fires a cancellation token once virtual time reaches `at`
#[derive(Debug)]
struct CancellingClock {
    inner: FakeClock,
    token: CancellationToken,
    at: Duration,
}

impl Clock for CancellingClock {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn sleep(&self, duration: Duration) {
        self.inner.sleep(duration);
        if self.inner.now() >= self.at {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_stops_between_polls() {
    let token = CancellationToken::new();
    let clock = Arc::new(CancellingClock {
        inner: FakeClock::new(),
        token: token.clone(),
        at: Duration::from_millis(500),
    });
    let view = Arc::new(MockView::new(clock.clone()));
    let driver = Arc::new(MockDriver::new(view.clone()));
    let orchestrator = FallbackOrchestrator::builder(view.clone(), driver)
        .clock(clock.clone())
        .build()
        .unwrap();
    let request = orchestrator
        .request(submit_chain())
        .with_timeout_per_locator(Duration::from_secs(2))
        .with_retry_policy(RetryPolicy::new(3))
        .with_cancellation(token);

    let result = orchestrator.execute(&request).unwrap();

    assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.passes, 1);
    assert_eq!(view.query_count(Strategy::Text, "Submit"), 0);
    assert!(clock.now() < Duration::from_secs(1));
}

// =============================================================================
// CACHE AND REPORTING
// =============================================================================

#[test]
fn cache_reorders_but_never_changes_the_answer() {
    let h = Harness::new();
    h.view.add(submit_button().matching_text("Submit"));
    let orchestrator = h.builder().build().unwrap();
    let uncached = orchestrator.request(submit_chain()).with_timeout_per_locator(Duration::from_millis(400));
    let cached = uncached.clone().with_cache_key("checkout.submit");

    let baseline = orchestrator.execute(&uncached).unwrap();
    orchestrator.execute(&cached).unwrap();
    let warm = orchestrator.execute(&cached).unwrap();

    assert_eq!(baseline.attempts.len(), 2);
    assert_eq!(warm.attempts.len(), 1);
    assert_eq!(
        baseline.resolved.unwrap().bounding_box,
        warm.resolved.unwrap().bounding_box
    );
}

#[test]
fn failure_report_explains_every_attempt() {
    let h = Harness::new();
    let orchestrator = h.builder().build().unwrap();
    let request = orchestrator
        .request(submit_chain())
        .with_timeout_per_locator(Duration::from_millis(200))
        .with_retry_policy(RetryPolicy::new(2).with_initial_delay(Duration::from_millis(100)));

    let result = orchestrator.execute(&request).unwrap();
    let text = tenaz::render_text(&result);

    assert!(text.contains("FAILED (EXHAUSTED)"));
    assert_eq!(text.matches("css:#submit").count(), 2);
    assert_eq!(text.matches("text:Submit").count(), 3);
    assert!(text.contains("NOT_FOUND"));

    let json: serde_json::Value = serde_json::from_str(&tenaz::render_json(&result).unwrap()).unwrap();
    assert_eq!(json["attempts"].as_array().unwrap().len(), 4);
}
