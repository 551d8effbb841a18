//! Human- and machine-readable renderings of an [`InteractionResult`].
//!
//! The text form answers "which strategies were tried, in what order, and
//! why each failed":
//!
//! ```text
//! interaction 7c0d… FAILED (NOT_FOUND) after 1 pass in 5200ms
//!   pass 1
//!     [0] css:#submit            NOT_FOUND  5000ms  timed out: absent after 51 polls
//!     [-] visual_description:Go  NOT_FOUND   200ms  no visual candidate above the confidence floor
//!   error: no locator resolved (css:#submit)
//! ```

use std::fmt::Write as _;

use crate::orchestrator::InteractionResult;
use crate::result::TenazResult;

/// Render `result` as an indented text report
#[must_use]
pub fn render_text(result: &InteractionResult) -> String {
    let mut out = String::new();
    let status = match result.error_kind() {
        None => "SUCCEEDED".to_string(),
        Some(kind) => format!("FAILED ({kind})"),
    };
    let _ = writeln!(
        out,
        "interaction {} {status} after {} pass{} in {}ms",
        result.request_id,
        result.passes,
        if result.passes == 1 { "" } else { "es" },
        result.elapsed.as_millis()
    );

    let width = result
        .attempts
        .iter()
        .map(|a| a.locator.to_string().len())
        .max()
        .unwrap_or(0);

    for pass in 1..=result.passes {
        let mut attempts = result.attempts_in_pass(pass).peekable();
        if attempts.peek().is_none() {
            continue;
        }
        let _ = writeln!(out, "  pass {pass}");
        for attempt in attempts {
            let index = attempt
                .chain_index
                .map_or_else(|| "-".to_string(), |i| i.to_string());
            let confidence = attempt
                .confidence
                .map(|c| format!(" conf={c:.2}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    [{index}] {:<width$}  {:<9}  {:>6}ms  {}{confidence}",
                attempt.locator.to_string(),
                attempt.outcome.as_str(),
                attempt.latency.as_millis(),
                attempt.note,
            );
        }
    }

    if let Some(resolved) = &result.resolved {
        let _ = writeln!(
            out,
            "  resolved: {} via {} (confidence {:.2})",
            resolved.target, resolved.matched_locator, resolved.confidence
        );
    }
    if let Some(error) = &result.error {
        let _ = write!(out, "  error: {}", error.message);
        if let Some(locator) = &error.locator {
            let _ = write!(out, " ({locator})");
        }
        if let Some(action) = error.action {
            let _ = write!(out, " during {action}");
        }
        out.push('\n');
    }
    out
}

/// Render `result` as pretty-printed JSON
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn render_json(result: &InteractionResult) -> TenazResult<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
