//! The long-running watch loop.
//!
//! A `notify` watcher feeds create/modify events into an
//! [`EventDebouncer`]; a tokio interval sweeps it and hands settled paths to
//! a [`TraceRecorder`] one at a time. The loop ends when the `shutdown`
//! future resolves. Pending changes are discarded at that point.

use crate::debounce::{DEFAULT_DEBOUNCE, DEFAULT_SWEEP_INTERVAL, EventDebouncer, EventKind};
use crate::error::{Result, TraceError};
use crate::exclude::ExcludePolicy;
use crate::recorder::TraceRecorder;
use crate::state::HashStore;
use notify::event::EventKind as NotifyKind;
use notify::{Event, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for [`run`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory to watch recursively.
    pub root: PathBuf,
    /// Trace log, relative to `root` unless absolute.
    pub trace_log: PathBuf,
    /// State file, relative to `root` unless absolute.
    pub state_file: PathBuf,
    /// External JSONL conversation log.
    pub conversation_log: Option<PathBuf>,
    /// Quiet period before a changed path is evaluated.
    pub debounce: Duration,
    /// How often settled paths are collected.
    pub sweep_interval: Duration,
    /// Extra path segments to skip, on top of the defaults.
    pub exclude: Vec<String>,
    /// Attach repository context to entries.
    pub git: bool,
    /// Conversation turns attached as `context`.
    pub context_turns: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            trace_log: PathBuf::from("docs/agent-trace.md"),
            state_file: PathBuf::from(".trace_state.json"),
            conversation_log: None,
            debounce: DEFAULT_DEBOUNCE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            exclude: Vec::new(),
            git: true,
            context_turns: 0,
        }
    }
}

impl WatchConfig {
    /// Canonical root plus the output paths resolved against it.
    fn resolve(&self) -> Result<(PathBuf, PathBuf, PathBuf)> {
        let root = self
            .root
            .canonicalize()
            .map_err(|_| TraceError::RootNotFound(self.root.clone()))?;
        if !root.is_dir() {
            return Err(TraceError::RootNotFound(self.root.clone()));
        }
        let trace_log = canonical_or_planned(&root.join(&self.trace_log));
        let state_file = canonical_or_planned(&root.join(&self.state_file));
        Ok((root, trace_log, state_file))
    }

    fn policy(&self, root: &Path, trace_log: &Path, state_file: &Path) -> ExcludePolicy {
        let mut policy = ExcludePolicy::new(root)
            .with_file(trace_log)
            .with_file(state_file);
        if let Some(conv) = &self.conversation_log {
            policy = policy.with_file(canonical_or_planned(conv));
        }
        for segment in &self.exclude {
            policy = policy.with_segment(segment.clone());
        }
        policy
    }
}

/// Canonical form of `path`, including one that does not exist yet: the
/// parent is canonicalized and the file name re-attached. Falls back to the
/// absolute path when the parent is missing too.
fn canonical_or_planned(path: &Path) -> PathBuf {
    if let Ok(path) = path.canonicalize() {
        return path;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (
        absolute.parent().and_then(|p| p.canonicalize().ok()),
        absolute.file_name(),
    ) {
        (Some(parent), Some(name)) => parent.join(name),
        _ => absolute,
    }
}

fn event_kind(kind: &NotifyKind) -> Option<EventKind> {
    match kind {
        NotifyKind::Create(_) => Some(EventKind::Created),
        NotifyKind::Modify(_) => Some(EventKind::Modified),
        _ => None,
    }
}

/// Watch `config.root` until `shutdown` resolves.
///
/// Fails before watching if the root does not exist or the platform
/// watcher cannot be started. Errors while recording a single path are
/// logged and the loop continues.
pub async fn run<F>(config: WatchConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (root, trace_log, state_file) = config.resolve()?;
    let policy = config.policy(&root, &trace_log, &state_file);
    let debouncer = EventDebouncer::new(config.debounce, policy.clone());

    let store = HashStore::open(&state_file);
    let mut recorder = TraceRecorder::new(&root, &trace_log, store)
        .with_policy(policy)
        .with_conversation_log(config.conversation_log.clone())
        .with_git(config.git)
        .with_context_turns(config.context_turns);

    let ingest = debouncer.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let Some(kind) = event_kind(&event.kind) else {
                return;
            };
            for path in &event.paths {
                if ingest.observe(path, kind) {
                    debug!(path = %path.display(), ?kind, "queued");
                }
            }
        }
        Err(e) => warn!("watch error: {}", e),
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(
        root = %root.display(),
        log = %trace_log.display(),
        debounce_ms = config.debounce.as_millis() as u64,
        "watching"
    );

    let mut sweep = tokio::time::interval(config.sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = sweep.tick() => {
                for change in debouncer.drain_ready(Instant::now()) {
                    if let Err(e) = recorder.process(&change.path) {
                        warn!(path = %change.path.display(), "failed to record: {}", e);
                    }
                }
            }
        }
    }

    drop(watcher);
    let dropped = debouncer.pending_len();
    if dropped > 0 {
        debug!(dropped, "discarding unsettled changes");
    }
    info!("stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracelog;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use tokio::time::{sleep, timeout};

    fn fast_config(root: &Path) -> WatchConfig {
        WatchConfig {
            root: root.to_path_buf(),
            debounce: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(20),
            git: false,
            ..WatchConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = WatchConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(800));
        assert_eq!(config.sweep_interval, Duration::from_millis(200));
        assert_eq!(config.trace_log, PathBuf::from("docs/agent-trace.md"));
        assert_eq!(config.state_file, PathBuf::from(".trace_state.json"));
        assert!(config.git);
    }

    #[test]
    fn test_event_kind_mapping() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        assert_eq!(
            event_kind(&NotifyKind::Create(CreateKind::File)),
            Some(EventKind::Created)
        );
        assert_eq!(
            event_kind(&NotifyKind::Modify(ModifyKind::Any)),
            Some(EventKind::Modified)
        );
        assert_eq!(event_kind(&NotifyKind::Remove(RemoveKind::File)), None);
    }

    #[test]
    fn test_canonical_or_planned() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("docs")).unwrap();

        let planned = canonical_or_planned(&root.join("docs/../docs/conv.jsonl"));
        assert_eq!(planned, root.join("docs/conv.jsonl"));

        let orphan = root.join("absent/conv.jsonl");
        assert_eq!(canonical_or_planned(&orphan), orphan);
    }

    #[test]
    fn test_conversation_log_created_later_is_excluded() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir(root.join("docs")).unwrap();
        let config = WatchConfig {
            conversation_log: Some(root.join("docs/../docs/conversation.jsonl")),
            ..fast_config(&root)
        };
        let (root, trace_log, state_file) = config.resolve().unwrap();
        let policy = config.policy(&root, &trace_log, &state_file);

        let conv = root.join("docs/conversation.jsonl");
        std::fs::write(&conv, "{\"id\":\"c1\"}\n").unwrap();
        assert!(policy.is_excluded(&conv));
        assert!(!policy.is_excluded(&root.join("docs/notes.md")));
    }

    #[tokio::test]
    async fn test_missing_root_fails_fast() {
        let temp = TempDir::new().unwrap();
        let config = fast_config(&temp.path().join("absent"));
        let err = run(config, std::future::pending()).await.unwrap_err();
        assert!(matches!(err, TraceError::RootNotFound(_)));
    }

    #[tokio::test]
    async fn test_watch_records_settled_change() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let config = fast_config(&root);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(run(config, async {
            let _ = stop_rx.await;
        }));

        // Give the platform watcher a moment to register.
        sleep(Duration::from_millis(200)).await;
        std::fs::create_dir_all(root.join("node_modules")).unwrap();
        std::fs::write(root.join("node_modules/skip.js"), "x\n").unwrap();
        for i in 0..5 {
            std::fs::write(root.join("main.py"), format!("x = {}\n", i)).unwrap();
            sleep(Duration::from_millis(10)).await;
        }

        let log = root.join("docs/agent-trace.md");
        let found = timeout(Duration::from_secs(10), async {
            loop {
                let entries = tracelog::read_entries(&log).unwrap();
                if !entries.is_empty() {
                    return entries;
                }
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("no trace entry written");

        // Let any straggling sweep finish before counting.
        sleep(Duration::from_millis(400)).await;
        let entries = tracelog::read_entries(&log).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(found[0].file, "main.py");
        assert!(entries.iter().all(|e| !e.file.starts_with("node_modules")));

        stop_tx.send(()).unwrap();
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(root.join(".trace_state.json").exists());
    }
}
