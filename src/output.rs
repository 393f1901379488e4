//! Rendering of outcomes and errors for the terminal.

use std::fmt::Write;

use serde_json::Value;

use crate::error::AppError;
use crate::reconcile::Outcome;
use crate::technitium::ApiCall;

fn compact(value: &Value) -> String {
    match value {
        Value::Null => "(unset)".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render_outcome(outcome: &Outcome, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(outcome).unwrap_or_else(|_| outcome.msg.clone());
    }

    let mut out = String::new();
    let status = if outcome.changed { "changed" } else { "ok" };
    let _ = writeln!(out, "{status}: {}", outcome.msg);
    for (field, change) in outcome.diff.iter() {
        let _ = writeln!(
            out,
            "  {field}: {} -> {}",
            compact(&change.current),
            compact(&change.desired)
        );
    }
    if outcome.check_mode {
        for call in &outcome.calls {
            let _ = writeln!(out, "  {}", planned_line(call));
        }
    }
    out
}

fn planned_line(call: &ApiCall) -> String {
    let params = call
        .params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("would call {} {params}", call.path)
}

/// A raw call held back by check mode. `call` must already be masked.
pub fn render_planned_call(call: &ApiCall, json: bool) -> String {
    if json {
        let body = serde_json::json!({
            "changed": true,
            "check_mode": true,
            "calls": [call],
        });
        return serde_json::to_string_pretty(&body).unwrap_or_else(|_| planned_line(call));
    }
    format!("changed: {}", planned_line(call))
}

pub fn render_error(err: &AppError, json: bool) -> String {
    if json {
        let body = err.to_body();
        return serde_json::to_string_pretty(&body).unwrap_or(body.error);
    }
    format!("error: {err}")
}

/// Raw API response as returned by `call`.
pub fn render_response(response: &Value) -> String {
    serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string())
}
