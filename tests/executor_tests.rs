//! End-to-end tests for the turn executor against a scripted provider.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{collecting_sink, send_message_tool, static_tool, ScriptedProvider};
use turnstile::agent_loop::{
    Decision, DecisionKind, InterruptOnConfig, InterruptPolicy, Phase, TurnEventPayload,
    TurnExecutor, TurnExecutorBuilder, TurnResult,
};
use turnstile::error::TurnstileError;
use turnstile::middleware::{
    default_tool_errors, pii, select_model_by_message_count, trim_messages, Middleware, PiiConfig,
    PiiKind, PiiStrategy,
};
use turnstile::provider::{ModelCapabilities, ModelRouter};
use turnstile::structured::StructuredOutput;
use turnstile::tools::{FunctionTool, StateUpdate, ToolOutput, ToolParameters};
use turnstile::types::{ResponseFormat, Role, ToolCall, ToolChoice};
use turnstile::util::retry::RetryPolicy;

fn builder(provider: &Arc<ScriptedProvider>) -> TurnExecutorBuilder {
    TurnExecutor::builder(ModelRouter::new(provider.clone())).retry(RetryPolicy::none())
}

fn approval_executor(provider: &Arc<ScriptedProvider>, sent: &Arc<Mutex<Vec<serde_json::Value>>>) -> TurnExecutor {
    builder(provider)
        .tool(send_message_tool(Arc::clone(sent)))
        .interrupt_policy(InterruptPolicy::new().on("send_message"))
        .build()
        .unwrap()
}

fn decide(result: &TurnResult, decision: Decision) -> HashMap<String, Decision> {
    result
        .interrupts()
        .iter()
        .map(|interrupt| (interrupt.id.clone(), decision.clone()))
        .collect()
}

fn contact_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "email": { "type": "string" },
            "phone": { "type": "string" }
        },
        "required": ["name", "email", "phone"]
    })
}

#[tokio::test]
async fn approved_call_runs_after_resume() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("c1", "send_message", json!({ "to": "bob" }))
            .reply("Message sent."),
    );
    let executor = approval_executor(&provider, &sent);

    let suspended = executor.start_turn("t1", "tell bob hi", json!({})).await.unwrap();
    assert!(suspended.is_suspended());
    let interrupt = &suspended.interrupts()[0];
    assert_eq!(interrupt.pending_action.name, "send_message");
    assert_eq!(interrupt.pending_action.arguments, json!({ "to": "bob" }));
    assert_eq!(interrupt.allowed_decisions, DecisionKind::ALL.to_vec());
    assert!(sent.lock().unwrap().is_empty());
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.phase, Phase::Suspended);

    let done = executor
        .resume_turn("t1", decide(&suspended, Decision::Approve))
        .await
        .unwrap();
    assert_eq!(done.message().unwrap().content, "Message sent.");
    assert_eq!(*sent.lock().unwrap(), vec![json!({ "to": "bob", "body": "hello" })]);

    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    let roles: Vec<Role> = checkpoint.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    assert_eq!(checkpoint.messages[2].content, "sent to bob");
    assert_eq!(checkpoint.phase, Phase::Done);
    assert!(checkpoint.pending.is_none());
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn rejected_call_gets_declined_result_and_never_runs() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("c1", "send_message", json!({ "to": "bob" }))
            .reply("Okay, I won't send it."),
    );
    let executor = approval_executor(&provider, &sent);

    let suspended = executor.start_turn("t1", "tell bob hi", json!({})).await.unwrap();
    let done = executor
        .resume_turn("t1", decide(&suspended, Decision::reject()))
        .await
        .unwrap();

    assert_eq!(done.message().unwrap().content, "Okay, I won't send it.");
    assert!(sent.lock().unwrap().is_empty());
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    let declined = &checkpoint.messages[2];
    assert_eq!(declined.role, Role::Tool);
    assert_eq!(declined.tool_call_id.as_deref(), Some("c1"));
    assert!(declined.is_error);
    assert!(declined.content.contains("approval declined"));
}

#[tokio::test]
async fn edited_call_runs_with_new_arguments() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("c1", "send_message", json!({ "to": "bob" }))
            .reply("Sent to carol instead."),
    );
    let executor = approval_executor(&provider, &sent);

    let suspended = executor.start_turn("t1", "tell bob hi", json!({})).await.unwrap();
    let edited = Decision::edit(ToolCall::new("", "send_message", json!({ "to": "carol" })));
    executor
        .resume_turn("t1", decide(&suspended, edited))
        .await
        .unwrap();

    assert_eq!(*sent.lock().unwrap(), vec![json!({ "to": "carol", "body": "hello" })]);
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.messages[2].content, "sent to carol");
    assert_eq!(checkpoint.messages[2].tool_call_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn mixed_batch_keeps_emission_order() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_calls(vec![
                ToolCall::new("a", "lookup", json!({})),
                ToolCall::new("b", "send_message", json!({ "to": "bob" })),
                ToolCall::new("c", "weather", json!({})),
            ])
            .reply("All done."),
    );
    let executor = builder(&provider)
        .tool(static_tool("lookup", "found"))
        .tool(send_message_tool(Arc::clone(&sent)))
        .tool(static_tool("weather", "sunny"))
        .interrupt_policy(InterruptPolicy::new().on("send_message"))
        .build()
        .unwrap();

    let suspended = executor.start_turn("t1", "do three things", json!({})).await.unwrap();
    assert_eq!(suspended.interrupts().len(), 1);

    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    let batch = checkpoint.pending.as_ref().unwrap();
    let filled = batch.results.iter().filter(|slot| slot.is_some()).count();
    assert_eq!(filled + batch.interrupts.len(), batch.calls.len());
    assert_eq!(batch.results[0].as_ref().unwrap().content, "found");
    assert!(batch.results[1].is_none());
    assert_eq!(batch.results[2].as_ref().unwrap().content, "sunny");
    assert_eq!(checkpoint.messages.len(), 2);

    executor
        .resume_turn("t1", decide(&suspended, Decision::Approve))
        .await
        .unwrap();
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    let tool_ids: Vec<&str> = checkpoint
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_ids, vec!["a", "b", "c"]);
    assert_eq!(checkpoint.messages.last().unwrap().content, "All done.");
}

#[tokio::test]
async fn incomplete_or_invalid_decisions_leave_checkpoint_untouched() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("c1", "send_message", json!({ "to": "bob" }))
            .reply("done"),
    );
    let executor = builder(&provider)
        .tool(send_message_tool(Arc::clone(&sent)))
        .interrupt_policy(InterruptPolicy::new().on_with(
            "send_message",
            InterruptOnConfig::allowing([DecisionKind::Approve, DecisionKind::Reject]),
        ))
        .build()
        .unwrap();

    let suspended = executor.start_turn("t1", "tell bob hi", json!({})).await.unwrap();
    let before = executor.checkpoint("t1").await.unwrap().unwrap();
    let id = suspended.interrupts()[0].id.clone();

    let attempts = vec![
        HashMap::new(),
        HashMap::from([("not-an-interrupt".to_string(), Decision::Approve)]),
        HashMap::from([
            (id.clone(), Decision::Approve),
            ("extra".to_string(), Decision::reject()),
        ]),
        HashMap::from([(
            id.clone(),
            Decision::edit(ToolCall::new("c1", "send_message", json!({ "to": "carol" }))),
        )]),
    ];
    for decisions in attempts {
        let err = executor.resume_turn("t1", decisions).await.unwrap_err();
        assert!(
            matches!(err, TurnstileError::UnresolvedInterrupt { .. }),
            "unexpected error: {err}"
        );
        assert_eq!(executor.checkpoint("t1").await.unwrap().unwrap(), before);
    }
    assert!(sent.lock().unwrap().is_empty());

    let done = executor
        .resume_turn("t1", HashMap::from([(id, Decision::Approve)]))
        .await
        .unwrap();
    assert_eq!(done.message().unwrap().content, "done");
}

#[tokio::test]
async fn edited_action_with_other_id_is_unresolved() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(ScriptedProvider::new("m").tool_call("c1", "send_message", json!({ "to": "bob" })));
    let executor = approval_executor(&provider, &sent);

    let suspended = executor.start_turn("t1", "tell bob hi", json!({})).await.unwrap();
    let edited = Decision::edit(ToolCall::new("c2", "send_message", json!({ "to": "bob" })));
    let err = executor
        .resume_turn("t1", decide(&suspended, edited))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnstileError::UnresolvedInterrupt { .. }));
}

#[tokio::test]
async fn starting_a_turn_on_a_suspended_thread_fails() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(ScriptedProvider::new("m").tool_call("c1", "send_message", json!({ "to": "bob" })));
    let executor = approval_executor(&provider, &sent);

    executor.start_turn("t1", "tell bob hi", json!({})).await.unwrap();
    let err = executor.start_turn("t1", "hello?", json!({})).await.unwrap_err();
    assert!(matches!(err, TurnstileError::InvalidState(_)));

    let err = executor.resume_turn("t2", HashMap::new()).await.unwrap_err();
    assert!(matches!(err, TurnstileError::InvalidState(_)));
}

#[tokio::test]
async fn iteration_cap_fails_turn_and_records_failure() {
    let mut provider = ScriptedProvider::new("m");
    for i in 0..5 {
        provider = provider.tool_call(&format!("c{i}"), "lookup", json!({}));
    }
    let provider = Arc::new(provider);
    let executor = builder(&provider)
        .tool(static_tool("lookup", "found"))
        .max_iterations(3)
        .build()
        .unwrap();

    let err = executor.start_turn("t1", "loop forever", json!({})).await.unwrap_err();
    match err {
        TurnstileError::TurnLimitExceeded {
            thread_id,
            max_iterations,
        } => {
            assert_eq!(thread_id, "t1");
            assert_eq!(max_iterations, 3);
        }
        other => panic!("expected TurnLimitExceeded, got {other}"),
    }
    assert_eq!(provider.calls(), 3);
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.phase, Phase::Failed);
    assert_eq!(checkpoint.iterations, 3);
    assert!(checkpoint.error.unwrap().contains("Turn limit exceeded"));
}

#[tokio::test]
async fn iteration_count_survives_resume() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("c1", "send_message", json!({ "to": "bob" }))
            .tool_call("c2", "send_message", json!({ "to": "carol" }))
            .reply("never reached"),
    );
    let executor = builder(&provider)
        .tool(send_message_tool(Arc::clone(&sent)))
        .interrupt_policy(InterruptPolicy::new().on("send_message"))
        .max_iterations(2)
        .build()
        .unwrap();

    let first = executor.start_turn("t1", "message both", json!({})).await.unwrap();
    let second = executor
        .resume_turn("t1", decide(&first, Decision::Approve))
        .await
        .unwrap();
    assert!(second.is_suspended());
    let err = executor
        .resume_turn("t1", decide(&second, Decision::Approve))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnstileError::TurnLimitExceeded { .. }));
    assert_eq!(provider.calls(), 2);
    assert_eq!(sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn trimming_keeps_first_message_and_recent_tail() {
    let provider = Arc::new(ScriptedProvider::new("m"));
    let executor = builder(&provider).middleware(trim_messages()).build().unwrap();

    for i in 1..=4 {
        executor
            .start_turn("t1", format!("m{i}"), json!({}))
            .await
            .unwrap();
    }

    let requests = provider.requests();
    assert_eq!(requests[2].messages.len(), 5);
    let last = &requests[3].messages;
    assert_eq!(last.len(), 5);
    assert_eq!(last[0].content, "m1");
    assert_eq!(last[1].content, "Mock response");
    assert_eq!(last[2].content, "m3");
    assert_eq!(last[4].content, "m4");

    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.messages.len(), 6);
}

#[tokio::test]
async fn tool_strategy_returns_validated_structured_response() {
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("s1", "ContactInfo", json!({ "name": "John", "email": "john@x.com" }))
            .tool_call(
                "s2",
                "ContactInfo",
                json!({ "name": "John", "email": "john@x.com", "phone": "555" }),
            ),
    );
    let executor = builder(&provider)
        .structured_output(StructuredOutput::tool("ContactInfo", contact_schema()))
        .build()
        .unwrap();

    let result = executor
        .start_turn("t1", "John, john@x.com, 555", json!({}))
        .await
        .unwrap();
    assert_eq!(
        result.structured_response(),
        Some(&json!({ "name": "John", "email": "john@x.com", "phone": "555" }))
    );
    assert_eq!(provider.calls(), 2);

    let first = &provider.requests()[0];
    assert_eq!(first.tool_choice, ToolChoice::Required);
    assert!(first.tools.iter().any(|tool| tool.name == "ContactInfo"));

    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert!(checkpoint.messages[2].is_error);
    assert!(checkpoint.messages[2].content.contains("ContactInfo"));
    assert!(!checkpoint.messages[4].is_error);
    assert_eq!(checkpoint.phase, Phase::Done);
    assert_eq!(checkpoint.structured_response, result.structured_response().cloned());
}

#[tokio::test]
async fn provider_strategy_requires_json_schema_support() {
    let provider = Arc::new(ScriptedProvider::new("m"));
    let err = builder(&provider)
        .structured_output(StructuredOutput::provider("ContactInfo", contact_schema()))
        .build()
        .unwrap_err();
    assert!(matches!(err, TurnstileError::UnsupportedStrategy(_)));
}

#[tokio::test]
async fn provider_strategy_parses_final_text() {
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .with_capabilities(ModelCapabilities::full(128_000))
            .reply("```json\n{\"name\":\"John\",\"email\":\"john@x.com\",\"phone\":\"555\"}\n```"),
    );
    let executor = builder(&provider)
        .structured_output(StructuredOutput::provider("ContactInfo", contact_schema()))
        .build()
        .unwrap();

    let result = executor.start_turn("t1", "extract", json!({})).await.unwrap();
    assert_eq!(result.structured_response().unwrap()["phone"], "555");
    assert!(matches!(
        provider.last_request().response_format,
        Some(ResponseFormat::JsonSchema { ref name, .. }) if name == "ContactInfo"
    ));
}

#[tokio::test]
async fn provider_strategy_invalid_text_fails_turn() {
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .with_capabilities(ModelCapabilities::full(128_000))
            .reply("not json at all"),
    );
    let executor = builder(&provider)
        .structured_output(StructuredOutput::provider("ContactInfo", contact_schema()))
        .build()
        .unwrap();

    let err = executor.start_turn("t1", "extract", json!({})).await.unwrap_err();
    assert!(matches!(err, TurnstileError::StructuredOutput(_)));
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.phase, Phase::Failed);
}

#[tokio::test]
async fn state_updates_feed_dynamic_prompts() {
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("c1", "set_role", json!({ "role": "expert" }))
            .reply("Noted."),
    );
    let set_role = FunctionTool::new(
        "set_role",
        "Record the user's expertise",
        ToolParameters::object().string("role", "Role", true).build(),
        |args, _ctx| async move {
            let role = args.get_str("role")?;
            Ok(ToolOutput::Update(
                StateUpdate::new(format!("role set to {role}")).set("user_role", json!(role)),
            ))
        },
    );
    let executor = builder(&provider)
        .tool(Arc::new(set_role))
        .system_prompt("Base.")
        .middleware(Middleware::dynamic_prompt(|ctx| {
            let base = ctx.previous.clone().unwrap_or_default();
            let role = ctx
                .state
                .get("user_role")
                .or_else(|| ctx.runtime.get("user_role"))
                .and_then(|v| v.as_str());
            match role {
                Some("expert") => format!("{base} Provide detailed technical responses."),
                Some("beginner") => format!("{base} Explain concepts simply and avoid jargon."),
                _ => base,
            }
        }))
        .build()
        .unwrap();

    executor
        .start_turn("t1", "I know Rust well", json!({ "user_role": "beginner" }))
        .await
        .unwrap();

    let requests = provider.requests();
    assert_eq!(
        requests[0].system_prompt.as_deref(),
        Some("Base. Explain concepts simply and avoid jargon.")
    );
    assert_eq!(
        requests[1].system_prompt.as_deref(),
        Some("Base. Provide detailed technical responses.")
    );
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.state["user_role"], "expert");
    assert_eq!(checkpoint.runtime["user_role"], "beginner");
    assert_eq!(checkpoint.system_prompt, requests[1].system_prompt);
}

#[tokio::test]
async fn runtime_context_reaches_tools_after_resume() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_by_tool = Arc::clone(&seen);
    let whoami = FunctionTool::new("whoami", "Report the caller", ToolParameters::empty(), move |_args, ctx| {
        let seen = Arc::clone(&seen_by_tool);
        async move {
            let user = ctx.runtime["user_id"].as_str().unwrap_or("unknown").to_string();
            seen.lock().unwrap().push(user.clone());
            Ok(ToolOutput::value(user))
        }
    });
    let provider = Arc::new(ScriptedProvider::new("m").tool_call("c1", "whoami", json!({})).reply("ok"));
    let executor = builder(&provider)
        .tool(Arc::new(whoami))
        .interrupt_policy(InterruptPolicy::new().on("whoami"))
        .build()
        .unwrap();

    let suspended = executor
        .start_turn("t1", "who am I?", json!({ "user_id": "u42" }))
        .await
        .unwrap();
    executor
        .resume_turn("t1", decide(&suspended, Decision::Approve))
        .await
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["u42".to_string()]);
}

#[tokio::test]
async fn unknown_tools_and_bad_arguments_become_error_results() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_calls(vec![
                ToolCall::new("c1", "nope", json!({})),
                ToolCall::new("c2", "send_message", json!({ "to": 7 })),
            ])
            .reply("Sorry."),
    );
    let executor = approval_executor(&provider, &sent);

    let result = executor.start_turn("t1", "try things", json!({})).await.unwrap();
    assert!(!result.is_suspended());

    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert!(checkpoint.messages[2].is_error);
    assert!(checkpoint.messages[2].content.contains("Tool 'nope' not found"));
    assert!(checkpoint.messages[3].is_error);
    assert!(checkpoint.messages[3].content.contains("to"));
    assert!(sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tool_error_middleware_formats_failures() {
    let failing = FunctionTool::new("flaky", "Always fails", ToolParameters::empty(), |_a, _c| async {
        Err(TurnstileError::tool("flaky", "disk full"))
    });
    let provider = Arc::new(ScriptedProvider::new("m").tool_call("c1", "flaky", json!({})).reply("ok"));
    let executor = builder(&provider)
        .tool(Arc::new(failing))
        .middleware(default_tool_errors())
        .build()
        .unwrap();

    executor.start_turn("t1", "go", json!({})).await.unwrap();
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    let result = &checkpoint.messages[2];
    assert!(result.is_error);
    assert!(result
        .content
        .starts_with("Tool error: Please check your input and try again."));
}

#[tokio::test]
async fn pii_middleware_redacts_model_input_only() {
    let provider = Arc::new(ScriptedProvider::new("m").reply("Got it."));
    let executor = builder(&provider)
        .middleware(pii(PiiConfig::new(PiiKind::Email, PiiStrategy::Redact)))
        .build()
        .unwrap();

    executor
        .start_turn("t1", "My email is john.doe@example.com", json!({}))
        .await
        .unwrap();
    assert_eq!(
        provider.last_request().messages[0].content,
        "My email is [REDACTED_EMAIL]"
    );
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.messages[0].content, "My email is john.doe@example.com");
}

#[tokio::test]
async fn long_conversations_route_to_selected_model() {
    let small = Arc::new(ScriptedProvider::new("small"));
    let large = Arc::new(ScriptedProvider::new("large"));
    let executor = TurnExecutor::builder(ModelRouter::new(small.clone()).with_model("large", large.clone()))
        .middleware(select_model_by_message_count(2, "large"))
        .build()
        .unwrap();

    executor.start_turn("t1", "first", json!({})).await.unwrap();
    executor.start_turn("t1", "second", json!({})).await.unwrap();
    assert_eq!(small.calls(), 1);
    assert_eq!(large.calls(), 1);
}

#[tokio::test]
async fn retryable_provider_errors_are_retried() {
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .error(TurnstileError::RateLimited {
                retry_after_ms: Some(1),
            })
            .reply("ok"),
    );
    let executor = builder(&provider)
        .retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        })
        .build()
        .unwrap();

    let result = executor.start_turn("t1", "hi", json!({})).await.unwrap();
    assert_eq!(result.message().unwrap().content, "ok");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn fatal_provider_errors_fail_the_turn() {
    let provider = Arc::new(
        ScriptedProvider::new("m").error(TurnstileError::Authentication("bad key".into())),
    );
    let executor = builder(&provider).retry(RetryPolicy::default()).build().unwrap();

    let err = executor.start_turn("t1", "hi", json!({})).await.unwrap_err();
    assert!(matches!(err, TurnstileError::Authentication(_)));
    assert_eq!(provider.calls(), 1);
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.phase, Phase::Failed);
    assert_eq!(checkpoint.messages.len(), 1);
}

#[tokio::test]
async fn events_are_sequenced_through_suspend_and_resume() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let provider = Arc::new(
        ScriptedProvider::new("m")
            .tool_call("c1", "send_message", json!({ "to": "bob" }))
            .reply("done"),
    );
    let (sink, events) = collecting_sink();
    let executor = builder(&provider)
        .tool(send_message_tool(Arc::clone(&sent)))
        .interrupt_policy(InterruptPolicy::new().on("send_message"))
        .event_sink(sink)
        .build()
        .unwrap();

    let suspended = executor.start_turn("t1", "hi", json!({})).await.unwrap();
    executor
        .resume_turn("t1", decide(&suspended, Decision::Approve))
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=events.len() as u64).collect::<Vec<_>>());
    let payloads: Vec<&TurnEventPayload> = events.iter().map(|e| &e.payload).collect();
    assert!(payloads
        .iter()
        .any(|p| matches!(p, TurnEventPayload::TurnStarted { resumed: false })));
    assert!(payloads
        .iter()
        .any(|p| matches!(p, TurnEventPayload::InterruptRaised { .. })));
    assert!(payloads
        .iter()
        .any(|p| matches!(p, TurnEventPayload::Suspended { interrupts: 1 })));
    assert!(payloads
        .iter()
        .any(|p| matches!(p, TurnEventPayload::TurnStarted { resumed: true })));
    assert!(payloads
        .iter()
        .any(|p| matches!(p, TurnEventPayload::CheckpointSaved { .. })));
    assert!(matches!(
        events.last().map(|e| &e.payload),
        Some(TurnEventPayload::Completed)
    ));
}

#[tokio::test]
async fn streaming_emits_deltas_and_assembles_message() {
    let provider = Arc::new(ScriptedProvider::new("m").reply("Hello from a streamed reply"));
    let (sink, events) = collecting_sink();
    let executor = builder(&provider)
        .streaming(true)
        .event_sink(sink)
        .build()
        .unwrap();

    let result = executor.start_turn("t1", "hi", json!({})).await.unwrap();
    assert_eq!(result.message().unwrap().content, "Hello from a streamed reply");

    let deltas: String = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match &e.payload {
            TurnEventPayload::AssistantDelta { text } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(deltas, "Hello from a streamed reply");
}

#[tokio::test]
async fn same_thread_calls_are_serialized() {
    let provider = Arc::new(ScriptedProvider::new("m"));
    let executor = builder(&provider).build().unwrap();

    let (a, b) = tokio::join!(
        executor.start_turn("t1", "one", json!({})),
        executor.start_turn("t1", "two", json!({})),
    );
    a.unwrap();
    b.unwrap();
    let checkpoint = executor.checkpoint("t1").await.unwrap().unwrap();
    assert_eq!(checkpoint.messages.len(), 4);
}

#[tokio::test]
async fn dropping_a_turn_cancels_work_spawned_by_tools() {
    let provider = Arc::new(ScriptedProvider::new("m").tool_call("c1", "watch", json!({})));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let watch = FunctionTool::new(
        "watch",
        "Start background work",
        ToolParameters::empty(),
        move |_args, ctx| {
            let tx = tx.lock().unwrap().take();
            async move {
                let cancel = ctx.cancel.clone();
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    if let Some(tx) = tx {
                        let _ = tx.send(());
                    }
                });
                std::future::pending::<Result<ToolOutput, TurnstileError>>().await
            }
        },
    );
    let executor = builder(&provider).tool(Arc::new(watch)).build().unwrap();

    let turn = tokio::time::timeout(
        Duration::from_millis(50),
        executor.start_turn("t1", "go", json!({})),
    )
    .await;
    assert!(turn.is_err());
    tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn duplicate_tool_names_are_rejected_at_build() {
    let provider = Arc::new(ScriptedProvider::new("m"));
    let err = builder(&provider)
        .tool(static_tool("lookup", "a"))
        .tool(static_tool("lookup", "b"))
        .build()
        .unwrap_err();
    assert!(matches!(err, TurnstileError::Configuration(_)));
}
