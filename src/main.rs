//! turnstile CLI binary entry point.

use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use turnstile::agent_loop::{
    Decision, Interrupt, InterruptPolicy, Phase, TurnEvent, TurnEventPayload, TurnExecutor,
    TurnResult,
};
use turnstile::checkpoint::{CheckpointStore, FileCheckpointStore};
use turnstile::cli::{AutoDecision, ChatArgs, Cli, Commands, ResumeArgs, ShowArgs};
use turnstile::config::TurnstileConfig;
use turnstile::provider::openai::OpenAiProvider;
use turnstile::provider::ModelRouter;
use turnstile::store::InMemoryStore;
use turnstile::types::ToolCall;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Chat(args) => handle_chat(args).await,
        Commands::Resume(args) => handle_resume(args).await,
        Commands::Show(args) => handle_show(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_show(args: ShowArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = TurnstileConfig::load()?;
    let store = FileCheckpointStore::new(config.checkpoint.resolved_dir());
    match store.get(&args.thread).await? {
        Some(checkpoint) => println!("{}", serde_json::to_string_pretty(&checkpoint)?),
        None => eprintln!("No checkpoint for thread '{}'", args.thread),
    }
    Ok(())
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let Some(prompt) = args.prompt.clone() else {
        eprintln!("Usage: turnstile chat [--thread ID] \"your message\"");
        std::process::exit(1);
    };

    let mut config = TurnstileConfig::load()?;
    if let Some(max) = args.max_iterations {
        config = config.with_max_iterations(max);
    }
    if args.stream {
        config = config.with_streaming(true);
    }
    let checkpoints = Arc::new(FileCheckpointStore::new(config.checkpoint.resolved_dir()));
    let executor = build_executor(
        &config,
        args.model.as_deref(),
        args.system.as_deref(),
        &args.approval_tools,
        checkpoints,
    )?;

    let runtime = serde_json::json!({ "user_id": args.user });
    let result = executor.start_turn(&args.thread, prompt, runtime).await?;
    finish_turn(&executor, &args.thread, result, args.auto, args.stream).await
}

async fn handle_resume(args: ResumeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = TurnstileConfig::load()?;
    if args.stream {
        config = config.with_streaming(true);
    }
    let checkpoints = Arc::new(FileCheckpointStore::new(config.checkpoint.resolved_dir()));
    let checkpoint = checkpoints
        .get(&args.thread)
        .await?
        .ok_or_else(|| format!("no checkpoint for thread '{}'", args.thread))?;
    if checkpoint.phase != Phase::Suspended {
        return Err(format!(
            "thread '{}' is not waiting for approval (phase {})",
            args.thread, checkpoint.phase
        )
        .into());
    }

    let executor = build_executor(
        &config,
        args.model.as_deref(),
        args.system.as_deref(),
        &args.approval_tools,
        checkpoints,
    )?;
    let result = TurnResult::Suspended {
        interrupts: checkpoint.interrupts().to_vec(),
    };
    finish_turn(&executor, &args.thread, result, args.auto, args.stream).await
}

/// Prompt for decisions until the turn is done, then print the answer.
async fn finish_turn(
    executor: &TurnExecutor,
    thread: &str,
    mut result: TurnResult,
    auto: Option<AutoDecision>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        match result {
            TurnResult::Done {
                message,
                structured_response,
            } => {
                if !stream {
                    println!("{}", message.content);
                } else {
                    println!();
                }
                if let Some(value) = structured_response {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                return Ok(());
            }
            TurnResult::Suspended { interrupts } => {
                let decisions = collect_decisions(&interrupts, auto)?;
                result = executor.resume_turn(thread, decisions).await?;
            }
        }
    }
}

fn build_executor(
    config: &TurnstileConfig,
    model: Option<&str>,
    system: Option<&str>,
    approval_tools: &[String],
    checkpoints: Arc<FileCheckpointStore>,
) -> Result<TurnExecutor, Box<dyn std::error::Error>> {
    let api_key = config
        .openai
        .api_key
        .clone()
        .ok_or("OPENAI_API_KEY is not set")?;
    let model = model.map_or_else(|| config.openai.model.clone(), str::to_string);
    let provider = Arc::new(OpenAiProvider::new(model, api_key, config.openai.base_url.clone()));

    let policy = approval_tools
        .iter()
        .filter(|name| !name.is_empty())
        .fold(InterruptPolicy::new(), |policy, name| policy.on(name.clone()));

    let mut builder = TurnExecutor::builder(ModelRouter::new(provider))
        .config(config)
        .tools(turnstile::tools::builtin::all_tools())
        .interrupt_policy(policy)
        .checkpoint_store(checkpoints)
        .store(Arc::new(InMemoryStore::new()))
        .event_sink(Arc::new(print_event));
    if let Some(system) = system {
        builder = builder.system_prompt(system);
    }
    Ok(builder.build()?)
}

fn print_event(event: TurnEvent) {
    match &event.payload {
        TurnEventPayload::AssistantDelta { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        TurnEventPayload::ToolStarted { call } => {
            eprintln!("\n-> {} ({})", call.name, call.id);
        }
        TurnEventPayload::ToolFinished { result } => {
            let marker = if result.is_error { "error" } else { "ok" };
            let mut preview = result.content.clone();
            if preview.len() > 200 {
                let mut end = 200;
                while end > 0 && !preview.is_char_boundary(end) {
                    end -= 1;
                }
                preview.truncate(end);
                preview.push_str("...");
            }
            eprintln!("   [{marker}] {preview}");
        }
        TurnEventPayload::Failed { error } => eprintln!("\nturn failed: {error}"),
        _ => {}
    }
}

fn collect_decisions(
    interrupts: &[Interrupt],
    auto: Option<AutoDecision>,
) -> Result<HashMap<String, Decision>, Box<dyn std::error::Error>> {
    let mut decisions = HashMap::new();
    let stdin = std::io::stdin();
    for interrupt in interrupts {
        eprintln!("\n{}", interrupt.description);
        let decision = match auto {
            Some(AutoDecision::Approve) => Decision::Approve,
            Some(AutoDecision::Reject) => Decision::reject(),
            None => prompt_decision(interrupt, &mut stdin.lock())?,
        };
        decisions.insert(interrupt.id.clone(), decision);
    }
    Ok(decisions)
}

fn prompt_decision(
    interrupt: &Interrupt,
    input: &mut impl BufRead,
) -> Result<Decision, Box<dyn std::error::Error>> {
    let choices: Vec<String> = interrupt
        .allowed_decisions
        .iter()
        .map(ToString::to_string)
        .collect();
    loop {
        eprint!("Decision ({}) [edit takes JSON arguments]: ", choices.join("/"));
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Decision::reject_with("no decision given"));
        }
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let decision = match word {
            "approve" | "a" | "y" => Decision::Approve,
            "reject" | "r" | "n" => {
                if rest.trim().is_empty() {
                    Decision::reject()
                } else {
                    Decision::reject_with(rest.trim())
                }
            }
            "edit" | "e" => match serde_json::from_str(rest.trim()) {
                Ok(arguments) => Decision::edit(ToolCall::new(
                    "",
                    interrupt.pending_action.name.clone(),
                    arguments,
                )),
                Err(e) => {
                    eprintln!("invalid JSON arguments: {e}");
                    continue;
                }
            },
            _ => continue,
        };
        if interrupt.allows(decision.kind()) {
            return Ok(decision);
        }
        eprintln!("'{}' is not allowed here", decision.kind());
    }
}
