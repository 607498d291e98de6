//! Built-in tools.

use chrono::{SecondsFormat, Utc};
use runtime::FnTool;
use serde_json::{Value, json};
use std::sync::Arc;

/// Current UTC time as an RFC 3339 string.
pub fn current_time() -> Arc<dyn runtime::Tool> {
    let tool = FnTool::new(
        "current_time",
        "Get the current date and time in UTC (RFC 3339).",
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }),
        |_: Value, _| async {
            Ok(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ))
        },
    )
    .read_only();
    Arc::new(tool)
}
