//! Ready-made tools used by the CLI.
//!
//! `read_file` and `write_file` touch the local filesystem; `remember` and
//! `recall` keep per-user notes in the executor's key-value store under
//! `["memories", <user_id>]`, where `user_id` comes from the runtime context.

use std::sync::Arc;

use serde_json::json;

use crate::error::TurnstileError;
use crate::tools::tool::{FunctionTool, Tool, ToolContext};
use crate::tools::types::{StateUpdate, ToolOutput, ToolParameters};

const READ_FILE_MAX_BYTES: usize = 65_536;

fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn memory_namespace(ctx: &ToolContext) -> Vec<String> {
    let user = ctx.runtime["user_id"].as_str().unwrap_or("default");
    vec!["memories".to_string(), user.to_string()]
}

/// `read_file`: UTF-8 contents, capped at 64 KB.
pub fn read_file_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        "read_file",
        "Read a file's contents as UTF-8 text",
        ToolParameters::object()
            .string("path", "Path to the file to read", true)
            .build(),
        |args, _ctx| async move {
            let path = args.get_str("path")?;
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| TurnstileError::tool("read_file", format!("{path}: {e}")))?;
            let truncated = content.len() > READ_FILE_MAX_BYTES;
            Ok(ToolOutput::value(json!({
                "content": truncate_utf8(&content, READ_FILE_MAX_BYTES),
                "bytes": content.len(),
                "truncated": truncated,
            })))
        },
    ))
}

/// `write_file`: writes content, creating parent directories. Usually gated
/// behind approval.
pub fn write_file_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        "write_file",
        "Write content to a file, creating parent directories if needed",
        ToolParameters::object()
            .string("path", "Path to the file to write", true)
            .string("content", "Content to write to the file", true)
            .build(),
        |args, ctx| async move {
            let path = args.get_str("path")?;
            let content = args.get_str("content")?;
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        TurnstileError::tool("write_file", format!("creating directories for {path}: {e}"))
                    })?;
                }
            }
            tokio::fs::write(path, content)
                .await
                .map_err(|e| TurnstileError::tool("write_file", format!("{path}: {e}")))?;
            ctx.report_progress(json!({ "written": path }));
            Ok(ToolOutput::value(json!({
                "path": path,
                "bytes_written": content.len(),
            })))
        },
    ))
}

/// `remember`: store a note in long-term memory and record the last topic in
/// thread state.
pub fn remember_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        "remember",
        "Save a note about the user for later conversations",
        ToolParameters::object()
            .string("topic", "Short key for the note", true)
            .string("note", "What to remember", true)
            .build(),
        |args, ctx| async move {
            let topic = args.get_str("topic")?;
            let note = args.get_str("note")?;
            ctx.require_store()?
                .put(&memory_namespace(&ctx), topic, json!(note))
                .await?;
            Ok(ToolOutput::Update(
                StateUpdate::new(format!("Remembered '{topic}'."))
                    .set("last_memory_topic", json!(topic)),
            ))
        },
    ))
}

/// `recall`: one note by topic, or every note when no topic is given.
pub fn recall_tool() -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        "recall",
        "Look up saved notes about the user",
        ToolParameters::object()
            .string("topic", "Key of the note; omit to list all notes", false)
            .build(),
        |args, ctx| async move {
            let store = ctx.require_store()?;
            let namespace = memory_namespace(&ctx);
            let text = match args.get_str_opt("topic") {
                Some(topic) => match store.get(&namespace, topic).await? {
                    Some(item) => format!("{topic}: {}", item.value.as_str().unwrap_or_default()),
                    None => format!("Nothing saved about '{topic}'."),
                },
                None => {
                    let items = store.list(&namespace).await?;
                    if items.is_empty() {
                        "No notes saved.".to_string()
                    } else {
                        items
                            .iter()
                            .map(|item| format!("{}: {}", item.key, item.value.as_str().unwrap_or_default()))
                            .collect::<Vec<_>>()
                            .join("\n")
                    }
                }
            };
            Ok(ToolOutput::value(text))
        },
    ))
}

/// Every built-in tool.
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![read_file_tool(), write_file_tool(), remember_tool(), recall_tool()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, SharedStore};
    use crate::tools::ToolArguments;

    fn ctx(store: Option<SharedStore>) -> ToolContext {
        ToolContext::new("t1", "c1", "test")
            .with_runtime(json!({ "user_id": "u42" }))
            .with_store(store)
    }

    #[test]
    fn truncate_utf8_never_splits_codepoints() {
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[tokio::test]
    async fn write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.txt");
        let path_str = path.to_str().unwrap();

        let written = write_file_tool()
            .execute(
                &ToolArguments::new(json!({ "path": path_str, "content": "hello" })),
                &ctx(None),
            )
            .await
            .unwrap();
        assert!(written.content().contains("\"bytes_written\":5"));

        let read = read_file_tool()
            .execute(&ToolArguments::new(json!({ "path": path_str })), &ctx(None))
            .await
            .unwrap();
        match read {
            ToolOutput::Value { value } => {
                assert_eq!(value["content"], "hello");
                assert_eq!(value["truncated"], false);
            }
            other => panic!("expected value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_a_tool_error() {
        let err = read_file_tool()
            .execute(&ToolArguments::new(json!({ "path": "/definitely/not/here" })), &ctx(None))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnstileError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn remember_and_recall_use_the_store() {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let saved = remember_tool()
            .execute(
                &ToolArguments::new(json!({ "topic": "language", "note": "prefers Rust" })),
                &ctx(Some(Arc::clone(&store))),
            )
            .await
            .unwrap();
        match saved {
            ToolOutput::Update(update) => assert_eq!(update.fields["last_memory_topic"], "language"),
            other => panic!("expected state update, got {other:?}"),
        }

        let recalled = recall_tool()
            .execute(&ToolArguments::new(json!({})), &ctx(Some(store)))
            .await
            .unwrap();
        assert_eq!(recalled.content(), "language: prefers Rust");
    }

    #[tokio::test]
    async fn memory_tools_need_a_store() {
        let err = recall_tool()
            .execute(&ToolArguments::new(json!({})), &ctx(None))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnstileError::Configuration(_)));
    }
}
