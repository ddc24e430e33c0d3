//! Parse a recorded event stream from disk.

use agentwatch_telemetry::SessionOutputStream;
use anyhow::Context;
use clap::Args;
use futures::future::ready;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::warn;

/// Parse command arguments.
#[derive(Args)]
pub struct ParseArgs {
    /// Recorded line stream (NDJSON or asciicast v2)
    pub file: PathBuf,

    /// Session id (defaults to the file stem)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Print each event as NDJSON before the summary
    #[arg(long)]
    pub events: bool,
}

/// Run the parse command.
pub async fn run(args: ParseArgs) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    let session_id = args.session.clone().unwrap_or_else(|| {
        args.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string())
    });

    let lines = LinesStream::new(BufReader::new(file).lines()).filter_map(|line| {
        ready(match line {
            Ok(line) => Some(line),
            Err(e) => {
                warn!("Skipping unreadable line: {}", e);
                None
            }
        })
    });
    let mut output = SessionOutputStream::new(session_id, lines);

    if args.events {
        let mut events = output.events();
        while let Some(event) = events.next().await {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    let summary = output
        .consume()
        .await
        .with_context(|| format!("No lines in {}", args.file.display()))?;
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parse_missing_file() {
        let args = ParseArgs {
            file: PathBuf::from("/nonexistent/agentwatch/session.jsonl"),
            session: None,
            events: false,
        };
        assert!(run(args).await.is_err());
    }

    #[tokio::test]
    async fn test_parse_recorded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"system","subtype":"init"}"#,
                "\n",
                r#"{"type":"result","is_error":false,"duration_ms":5}"#,
                "\n"
            ),
        )
        .unwrap();

        let args = ParseArgs {
            file: path,
            session: None,
            events: true,
        };
        run(args).await.unwrap();
    }

    #[tokio::test]
    async fn test_parse_empty_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "").unwrap();

        let args = ParseArgs {
            file: path,
            session: None,
            events: false,
        };
        assert!(run(args).await.is_err());
    }
}
