use agent_trace::WatchConfig;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory to watch
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Trace log to append to, relative to the root
    #[arg(long, default_value = "docs/agent-trace.md")]
    log: PathBuf,

    /// JSONL conversation log to correlate changes with
    #[arg(long)]
    conversation_log: Option<PathBuf>,

    /// State file holding the last traced content, relative to the root
    #[arg(long, default_value = ".trace_state.json")]
    state: PathBuf,

    /// Quiet period before a changed file is traced
    #[arg(long, default_value_t = 800)]
    debounce_ms: u64,

    /// How often settled changes are collected
    #[arg(long, default_value_t = 200)]
    sweep_ms: u64,

    /// Extra directory names to ignore (repeatable)
    #[arg(long = "exclude", value_name = "SEGMENT")]
    exclude: Vec<String>,

    /// Do not attach git HEAD/branch/dirty state
    #[arg(long)]
    no_git: bool,

    /// Also attach the last N conversation turns to each entry
    #[arg(long, default_value_t = 0)]
    context_turns: usize,
}

impl WatchArgs {
    fn into_config(self) -> Result<WatchConfig> {
        let conversation_log = match self.conversation_log {
            Some(path) if path.is_relative() => Some(
                std::env::current_dir()
                    .context("failed to resolve current directory")?
                    .join(path),
            ),
            other => other,
        };
        Ok(WatchConfig {
            root: self.root,
            trace_log: self.log,
            state_file: self.state,
            conversation_log,
            debounce: Duration::from_millis(self.debounce_ms),
            sweep_interval: Duration::from_millis(self.sweep_ms.max(1)),
            exclude: self.exclude,
            git: !self.no_git,
            context_turns: self.context_turns,
        })
    }
}

pub fn run(args: WatchArgs) -> Result<()> {
    let config = args.into_config()?;
    let root = config.root.clone();
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime
        .block_on(agent_trace::run(config, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for interrupt: {}", e);
                std::future::pending::<()>().await;
            }
        }))
        .with_context(|| format!("failed to watch {}", root.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: WatchArgs,
    }

    #[test]
    fn test_defaults() {
        let config = Harness::parse_from(["watch"]).args.into_config().unwrap();
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.trace_log, PathBuf::from("docs/agent-trace.md"));
        assert_eq!(config.state_file, PathBuf::from(".trace_state.json"));
        assert_eq!(config.debounce, Duration::from_millis(800));
        assert_eq!(config.sweep_interval, Duration::from_millis(200));
        assert!(config.conversation_log.is_none());
        assert!(config.git);
        assert_eq!(config.context_turns, 0);
    }

    #[test]
    fn test_flags() {
        let config = Harness::parse_from([
            "watch",
            "--root",
            "/work",
            "--conversation-log",
            "/logs/conv.jsonl",
            "--debounce-ms",
            "50",
            "--exclude",
            "dist",
            "--exclude",
            "build",
            "--no-git",
            "--context-turns",
            "3",
        ])
        .args
        .into_config()
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/work"));
        assert_eq!(
            config.conversation_log,
            Some(PathBuf::from("/logs/conv.jsonl"))
        );
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.exclude, vec!["dist", "build"]);
        assert!(!config.git);
        assert_eq!(config.context_turns, 3);
    }

    #[test]
    fn test_relative_conversation_log_uses_cwd() {
        let config = Harness::parse_from(["watch", "--conversation-log", "conv.jsonl"])
            .args
            .into_config()
            .unwrap();
        let expected = std::env::current_dir().unwrap().join("conv.jsonl");
        assert_eq!(config.conversation_log, Some(expected));
    }
}
