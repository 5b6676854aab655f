//! CLI entry point for turnstile.

use clap::{Parser, Subcommand, ValueEnum};

/// turnstile CLI
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about = "Agent turns with human approval of tool calls")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one turn on a thread, prompting for approvals when it pauses
    Chat(ChatArgs),
    /// Decide the open approvals of a suspended thread and finish its turn
    Resume(ResumeArgs),
    /// Print a thread's checkpoint as JSON
    Show(ShowArgs),
}

/// Default for decisions when not prompting.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutoDecision {
    Approve,
    Reject,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Conversation thread id; reuse it to continue a conversation
    #[arg(long, default_value = "default")]
    pub thread: String,

    /// Model to use (defaults to the configured OpenAI model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Tools that require approval before running
    #[arg(long = "approve", value_delimiter = ',', default_value = "write_file")]
    pub approval_tools: Vec<String>,

    /// Answer every approval prompt automatically
    #[arg(long, value_enum)]
    pub auto: Option<AutoDecision>,

    /// User id passed to tools through the runtime context
    #[arg(long, default_value = "default")]
    pub user: String,

    /// Stream assistant text as it arrives
    #[arg(long, default_value = "false")]
    pub stream: bool,

    /// Max model calls for this turn
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// User message (positional)
    pub prompt: Option<String>,
}

/// Arguments for the `resume` subcommand.
#[derive(Parser, Debug)]
pub struct ResumeArgs {
    /// Suspended thread id
    #[arg(long)]
    pub thread: String,

    /// Model to use (defaults to the configured OpenAI model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Tools that require approval before running
    #[arg(long = "approve", value_delimiter = ',', default_value = "write_file")]
    pub approval_tools: Vec<String>,

    /// Answer every approval prompt automatically
    #[arg(long, value_enum)]
    pub auto: Option<AutoDecision>,

    /// Stream assistant text as it arrives
    #[arg(long, default_value = "false")]
    pub stream: bool,
}

/// Arguments for the `show` subcommand.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Conversation thread id
    #[arg(long, default_value = "default")]
    pub thread: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chat_with_defaults() {
        let cli = Cli::try_parse_from(["turnstile", "chat", "hello"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.thread, "default");
                assert!(args.model.is_none());
                assert_eq!(args.approval_tools, vec!["write_file".to_string()]);
                assert!(args.auto.is_none());
                assert!(!args.stream);
                assert_eq!(args.prompt.as_deref(), Some("hello"));
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_all_options() {
        let cli = Cli::try_parse_from([
            "turnstile",
            "chat",
            "--thread",
            "t-7",
            "-m",
            "gpt-4o",
            "-s",
            "You are helpful",
            "--approve",
            "write_file,remember",
            "--auto",
            "reject",
            "--user",
            "u42",
            "--stream",
            "--max-iterations",
            "5",
            "Save my notes",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.thread, "t-7");
                assert_eq!(args.model.as_deref(), Some("gpt-4o"));
                assert_eq!(args.system.as_deref(), Some("You are helpful"));
                assert_eq!(args.approval_tools, vec!["write_file", "remember"]);
                assert_eq!(args.auto, Some(AutoDecision::Reject));
                assert_eq!(args.user, "u42");
                assert!(args.stream);
                assert_eq!(args.max_iterations, Some(5));
                assert_eq!(args.prompt.as_deref(), Some("Save my notes"));
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_show() {
        let cli = Cli::try_parse_from(["turnstile", "show", "--thread", "t-1"]).unwrap();
        match cli.command {
            Commands::Show(args) => assert_eq!(args.thread, "t-1"),
            other => panic!("expected Show, got {other:?}"),
        }
    }

    #[test]
    fn parse_resume_requires_thread() {
        let cli = Cli::try_parse_from(["turnstile", "resume", "--thread", "t-9", "--auto", "approve"])
            .unwrap();
        match cli.command {
            Commands::Resume(args) => {
                assert_eq!(args.thread, "t-9");
                assert_eq!(args.auto, Some(AutoDecision::Approve));
                assert_eq!(args.approval_tools, vec!["write_file".to_string()]);
            }
            other => panic!("expected Resume, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["turnstile", "resume"]).is_err());
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["turnstile"]).is_err());
    }

    #[test]
    fn parse_unknown_auto_decision_is_error() {
        assert!(Cli::try_parse_from(["turnstile", "chat", "--auto", "edit", "hi"]).is_err());
    }
}
