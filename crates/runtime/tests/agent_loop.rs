mod common;

use common::{InFlight, ScriptedBackend, agent, calls, fast_config, runtime, tool};
use runtime::{
    Error, FnTool, Message, RateLimitSpec, RuntimeConfig, Tool, ToolError, UsageSnapshot,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn object() -> Value {
    json!({"type": "object"})
}

fn sleeper(name: &str, in_flight: Arc<InFlight>, read_only: bool) -> Arc<dyn Tool> {
    let tool = FnTool::new(name, "sleeps briefly", object(), move |_, _| {
        let in_flight = Arc::clone(&in_flight);
        async move {
            in_flight.enter();
            tokio::time::sleep(Duration::from_millis(30)).await;
            in_flight.exit();
            Ok(json!("ok"))
        }
    });
    if read_only {
        Arc::new(tool.read_only())
    } else {
        Arc::new(tool)
    }
}

#[tokio::test]
async fn answers_without_tools() {
    let backend = Arc::new(ScriptedBackend::new("unused").then_with_usage(
        Message::assistant("42"),
        7,
        3,
    ));
    let primary = agent("primary", Arc::clone(&backend), vec![]);

    let output = runtime(fast_config())
        .execute(&primary, "What is the answer?")
        .await
        .unwrap();

    assert_eq!(output.answer, "42");
    assert_eq!(output.rounds, 1);
    assert_eq!(output.messages.len(), 2);
    assert_eq!(
        output.usage,
        UsageSnapshot {
            tokens_in: 7,
            tokens_out: 3,
            tool_calls: 0
        }
    );
}

#[tokio::test]
async fn two_reported_calls_sum_exactly() {
    let summarize = FnTool::new("summarize", "summarize", object(), |_, ctx| async move {
        ctx.report_usage(10, 5)?;
        Ok::<_, ToolError>(json!("summary"))
    })
    .read_only();

    let backend = Arc::new(
        ScriptedBackend::new("done")
            .then(calls(&[("c1", "summarize", json!({}))]))
            .then(calls(&[("c2", "summarize", json!({}))])),
    );
    let primary = agent("primary", backend, vec![tool(summarize)]);

    let output = runtime(fast_config())
        .execute(&primary, "summarize twice")
        .await
        .unwrap();

    assert_eq!(output.answer, "done");
    assert_eq!(
        output.usage,
        UsageSnapshot {
            tokens_in: 20,
            tokens_out: 10,
            tool_calls: 2
        }
    );
}

#[tokio::test]
async fn model_and_tool_usage_accumulate() {
    let summarize = FnTool::new("summarize", "summarize", object(), |_, ctx| async move {
        ctx.report_usage(4, 1)?;
        Ok::<_, ToolError>(json!("summary"))
    });

    let backend = Arc::new(
        ScriptedBackend::new("unused")
            .then_with_usage(calls(&[("c1", "summarize", json!({}))]), 100, 20)
            .then_with_usage(Message::assistant("done"), 150, 30),
    );
    let primary = agent("primary", backend, vec![tool(summarize)]);

    let output = runtime(fast_config()).execute(&primary, "go").await.unwrap();
    assert_eq!(output.usage.tokens_in, 254);
    assert_eq!(output.usage.tokens_out, 51);
    assert_eq!(output.usage.tool_calls, 1);
}

#[tokio::test]
async fn unknown_tool_is_fed_back() {
    let backend = Arc::new(
        ScriptedBackend::new("recovered").then(calls(&[("c1", "ghost", json!({}))])),
    );
    let primary = agent("primary", Arc::clone(&backend), vec![]);

    let output = runtime(fast_config()).execute(&primary, "go").await.unwrap();
    assert_eq!(output.answer, "recovered");

    let results = backend.tool_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_call_id, "c1");
    assert_eq!(
        results[0].outcome.error(),
        Some(&ToolError::NotFound("ghost".into()))
    );
}

#[tokio::test]
async fn schema_mismatch_never_reaches_handler() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invoked);
    let search = FnTool::new(
        "search",
        "web search",
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        }),
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!([])) }
        },
    );

    let backend = Arc::new(
        ScriptedBackend::new("fine").then(calls(&[("c1", "search", json!({"query": 42}))])),
    );
    let primary = agent("primary", Arc::clone(&backend), vec![tool(search)]);

    let output = runtime(fast_config()).execute(&primary, "go").await.unwrap();
    assert_eq!(output.answer, "fine");
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(output.usage.tool_calls, 0);

    let results = backend.tool_results();
    assert_eq!(results[0].outcome.error().map(ToolError::kind), Some("schema_error"));
}

#[tokio::test]
async fn results_follow_issue_order() {
    let fast = FnTool::new("fast", "fast", object(), |_, _| async { Ok(json!("fast")) }).read_only();
    let slow = FnTool::new("slow", "slow", object(), |_, _| async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        Ok(json!("slow"))
    })
    .read_only();

    let backend = Arc::new(ScriptedBackend::new("done").then(calls(&[
        ("c1", "slow", json!({})),
        ("c2", "fast", json!({})),
        ("c3", "slow", json!({})),
    ])));
    let primary = agent(
        "primary",
        Arc::clone(&backend),
        vec![tool(fast), tool(slow)],
    );

    runtime(fast_config()).execute(&primary, "go").await.unwrap();

    let ids: Vec<_> = backend
        .tool_results()
        .into_iter()
        .map(|r| r.tool_call_id)
        .collect();
    assert_eq!(ids, ["c1", "c2", "c3"]);
}

#[tokio::test]
async fn mutating_calls_never_overlap() {
    let in_flight = Arc::new(InFlight::default());
    let write = sleeper("write", Arc::clone(&in_flight), false);

    let backend = Arc::new(ScriptedBackend::new("done").then(calls(&[
        ("c1", "write", json!({})),
        ("c2", "write", json!({})),
        ("c3", "write", json!({})),
    ])));
    let primary = agent("primary", backend, vec![write]);

    runtime(fast_config()).execute(&primary, "go").await.unwrap();
    assert_eq!(in_flight.total(), 3);
    assert_eq!(in_flight.peak(), 1);
}

#[tokio::test]
async fn read_only_calls_fan_out_within_bound() {
    let in_flight = Arc::new(InFlight::default());
    let read = sleeper("read", Arc::clone(&in_flight), true);

    let backend = Arc::new(ScriptedBackend::new("done").then(calls(&[
        ("c1", "read", json!({})),
        ("c2", "read", json!({})),
        ("c3", "read", json!({})),
        ("c4", "read", json!({})),
    ])));
    let primary = agent("primary", backend, vec![read]);

    let config = RuntimeConfig {
        max_concurrency: 2,
        ..fast_config()
    };
    runtime(config).execute(&primary, "go").await.unwrap();
    assert_eq!(in_flight.total(), 4);
    assert_eq!(in_flight.peak(), 2);
}

#[tokio::test]
async fn round_limit_is_fatal() {
    let noop = FnTool::new("noop", "noop", object(), |_, _| async { Ok(Value::Null) });
    let backend = Arc::new(
        ScriptedBackend::new("never reached")
            .then(calls(&[("c1", "noop", json!({}))]))
            .then(calls(&[("c2", "noop", json!({}))]))
            .then(calls(&[("c3", "noop", json!({}))])),
    );
    let primary = agent("primary", Arc::clone(&backend), vec![tool(noop)]);

    let config = RuntimeConfig {
        max_rounds: 2,
        ..fast_config()
    };
    let err = runtime(config).execute(&primary, "loop").await.unwrap_err();
    assert_eq!(err, Error::RoundLimitExceeded { max_rounds: 2 });
    assert_eq!(backend.requests(), 2);
}

#[tokio::test]
async fn crossing_budget_stops_run() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invoked);
    let noop = FnTool::new("noop", "noop", object(), move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Value::Null) }
    });

    let backend = Arc::new(
        ScriptedBackend::new("never reached")
            .then_with_usage(calls(&[("c1", "noop", json!({}))]), 60, 30)
            .then_with_usage(calls(&[("c2", "noop", json!({}))]), 20, 0),
    );
    let primary = agent("primary", Arc::clone(&backend), vec![tool(noop)]);

    let config = RuntimeConfig {
        token_budget: Some(100),
        ..fast_config()
    };
    let err = runtime(config).execute(&primary, "go").await.unwrap_err();
    assert_eq!(err, Error::BudgetExceeded { used: 110, budget: 100 });
    assert!(err.is_fatal());
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
    assert_eq!(backend.requests(), 2);
}

#[tokio::test]
async fn budget_wins_over_round_limit() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invoked);
    let noop = FnTool::new("noop", "noop", object(), move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(Value::Null) }
    });

    let backend = Arc::new(
        ScriptedBackend::new("never reached").then_with_usage(
            calls(&[("c1", "noop", json!({}))]),
            90,
            20,
        ),
    );
    let primary = agent("primary", Arc::clone(&backend), vec![tool(noop)]);

    let config = RuntimeConfig {
        max_rounds: 1,
        token_budget: Some(100),
        ..fast_config()
    };
    let err = runtime(config).execute(&primary, "go").await.unwrap_err();
    assert_eq!(err, Error::BudgetExceeded { used: 110, budget: 100 });
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(backend.requests(), 1);
}

#[tokio::test]
async fn tool_reported_usage_can_exhaust_budget() {
    let summarize = FnTool::new("summarize", "summarize", object(), |_, ctx| async move {
        ctx.report_usage(80, 0)?;
        Ok::<_, ToolError>(json!("summary"))
    });

    let backend = Arc::new(
        ScriptedBackend::new("never reached")
            .then_with_usage(calls(&[("c1", "summarize", json!({}))]), 30, 0),
    );
    let primary = agent("primary", Arc::clone(&backend), vec![tool(summarize)]);

    let config = RuntimeConfig {
        token_budget: Some(100),
        ..fast_config()
    };
    let err = runtime(config).execute(&primary, "go").await.unwrap_err();
    assert_eq!(err, Error::BudgetExceeded { used: 110, budget: 100 });
    assert_eq!(backend.requests(), 1);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let flaky = FnTool::new("flaky", "flaky", object(), move |_, _| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(ToolError::Network("connection reset".into()))
            } else {
                Ok(json!("finally"))
            }
        }
    });

    let backend = Arc::new(ScriptedBackend::new("done").then(calls(&[("c1", "flaky", json!({}))])));
    let primary = agent("primary", Arc::clone(&backend), vec![tool(flaky)]);

    let output = runtime(fast_config()).execute(&primary, "go").await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(output.usage.tool_calls, 1);
    assert!(!backend.tool_results()[0].is_failure());
}

#[tokio::test]
async fn third_concurrent_call_is_rate_limited() {
    let search = FnTool::new("search", "search", object(), |_, _| async { Ok(json!("hit")) })
        .read_only()
        .with_rate_limit(RateLimitSpec::new(2, 0.001));

    let backend = Arc::new(ScriptedBackend::new("answered anyway").then(calls(&[
        ("c1", "search", json!({})),
        ("c2", "search", json!({})),
        ("c3", "search", json!({})),
    ])));
    let primary = agent("primary", Arc::clone(&backend), vec![tool(search)]);

    let config = RuntimeConfig {
        rate_limit_wait_ms: 10,
        ..fast_config()
    };
    let output = runtime(config).execute(&primary, "go").await.unwrap();
    assert_eq!(output.answer, "answered anyway");
    assert_eq!(output.usage.tool_calls, 2);

    let results = backend.tool_results();
    let limited: Vec<_> = results
        .iter()
        .filter(|r| r.outcome.error().map(ToolError::kind) == Some("rate_limited"))
        .collect();
    assert_eq!(results.len(), 3);
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].tool_call_id, "c3");
}

#[tokio::test]
async fn rate_limit_is_shared_across_runs() {
    let search = FnTool::new("search", "search", object(), |_, _| async { Ok(json!("hit")) })
        .with_rate_limit(RateLimitSpec::new(1, 0.001));
    let backend = Arc::new(
        ScriptedBackend::new("done")
            .then(calls(&[("c1", "search", json!({}))]))
            .then(Message::assistant("first done"))
            .then(calls(&[("c2", "search", json!({}))])),
    );
    let primary = agent("primary", Arc::clone(&backend), vec![tool(search)]);

    let config = RuntimeConfig {
        rate_limit_wait_ms: 0,
        ..fast_config()
    };
    let runtime = runtime(config);
    let first = runtime.execute(&primary, "first").await.unwrap();
    let second = runtime.execute(&primary, "second").await.unwrap();
    assert_eq!(first.usage.tool_calls, 1);
    assert_eq!(second.usage.tool_calls, 0);

    let results = backend.tool_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_call_id, "c2");
    assert_eq!(
        results[0].outcome.error().map(ToolError::kind),
        Some("rate_limited")
    );
}
