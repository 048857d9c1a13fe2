//! Debounced file watcher driving disk → database ingestion.
//!
//! A notify backend feeds raw filesystem events into a dedicated thread.
//! The thread keeps a per-path sliding debounce table: every event on a
//! path restarts that path's quiet window, so an editor "save storm"
//! collapses into a single ingest. Paths whose window elapses are routed,
//! validated (exists, non-empty, within the size bound) and dispatched
//! onto the tokio runtime where the blocking work (file read, DB write,
//! cache refresh) happens.
//!
//! Per-event failures are logged and never propagate: one bad file must
//! not take the watcher down.

use crate::{
    error::{Result, SyncError},
    log,
    router::{PathRouter, RouteKey},
};
use async_trait::async_trait;
use notify::{Event, EventKind, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

/// Watcher lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Receiver of validated file content, keyed by its sync layout route.
#[async_trait]
pub trait Ingest: Send + Sync {
    async fn ingest(&self, key: RouteKey, bytes: Vec<u8>) -> Result<()>;
}

/// Receive timeout when no debounce deadline is pending
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// State shared between the watcher handle and its event-loop thread.
struct WatchContext {
    debounce: Duration,
    max_file_bytes: u64,
    router: PathRouter,
    sink: Arc<dyn Ingest>,
    handle: tokio::runtime::Handle,
    state: Mutex<WatcherState>,
}

/// Debounced, validated dispatcher of filesystem events.
pub struct FileWatcher {
    sync_root: PathBuf,
    ctx: Arc<WatchContext>,
    watcher: Option<notify::RecommendedWatcher>,
    thread: Option<thread::JoinHandle<()>>,
}

impl FileWatcher {
    /// Build a watcher over `sync_root`.
    ///
    /// Must be constructed on the tokio runtime: the current handle is
    /// captured for dispatching ingest work.
    pub fn new(
        sync_root: impl Into<PathBuf>,
        debounce: Duration,
        max_file_bytes: u64,
        sink: Arc<dyn Ingest>,
    ) -> Self {
        let sync_root = sync_root.into();
        Self {
            ctx: Arc::new(WatchContext {
                debounce,
                max_file_bytes,
                router: PathRouter::new(sync_root.clone()),
                sink,
                handle: tokio::runtime::Handle::current(),
                state: Mutex::new(WatcherState::Stopped),
            }),
            sync_root,
            watcher: None,
            thread: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        *self.ctx.state.lock()
    }

    /// Start observing the sync root. A no-op when already started.
    pub fn start(&mut self) -> Result<()> {
        if self.state() != WatcherState::Stopped {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        watcher.watch(&self.sync_root, RecursiveMode::Recursive)?;

        *self.ctx.state.lock() = WatcherState::Running;
        self.watcher = Some(watcher);

        let ctx = Arc::clone(&self.ctx);
        self.thread = Some(thread::spawn(move || run_event_loop(&rx, &ctx)));

        log!("watch"; "watching for changes in {}", self.sync_root.display());
        Ok(())
    }

    /// Stop observing and cancel pending debounces. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut state = self.ctx.state.lock();
            if *state == WatcherState::Stopped {
                return;
            }
            *state = WatcherState::Stopped;
        }

        // Dropping the notify watcher closes the event channel; the loop
        // observes the disconnect, exits, and drops its debounce table.
        // Work already dispatched onto the runtime runs to completion.
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        log!("watch"; "stopped");
    }

    /// Suspend ingestion; events arriving while paused are discarded.
    /// Idempotent.
    pub fn pause(&self) {
        let mut state = self.ctx.state.lock();
        if *state == WatcherState::Running {
            *state = WatcherState::Paused;
        }
    }

    /// Resume ingestion after a pause. Idempotent.
    pub fn resume(&self) {
        let mut state = self.ctx.state.lock();
        if *state == WatcherState::Paused {
            *state = WatcherState::Running;
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Demultiplex notify events and fire debounced paths.
fn run_event_loop(rx: &mpsc::Receiver<notify::Result<Event>>, ctx: &Arc<WatchContext>) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match rx.recv_timeout(next_timeout(&pending, ctx.debounce)) {
            Ok(Ok(event)) if should_process_event(&event) => {
                // While paused the exporter owns the sync root; ingesting
                // its own atomic writes would churn the DB it just read.
                if *ctx.state.lock() != WatcherState::Running {
                    continue;
                }
                let now = Instant::now();
                for path in event.paths {
                    if is_candidate(&path) {
                        pending.insert(path, now);
                    }
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => log!("watch"; "error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        fire_due_paths(&mut pending, ctx);
    }
}

/// Time until the earliest pending deadline, or the idle timeout.
fn next_timeout(pending: &HashMap<PathBuf, Instant>, debounce: Duration) -> Duration {
    let now = Instant::now();
    pending
        .values()
        .map(|seen| (*seen + debounce).saturating_duration_since(now))
        .min()
        .unwrap_or(IDLE_TIMEOUT)
}

/// Dispatch every path whose quiet window has elapsed.
fn fire_due_paths(pending: &mut HashMap<PathBuf, Instant>, ctx: &Arc<WatchContext>) {
    let now = Instant::now();
    let due: Vec<PathBuf> = pending
        .iter()
        .filter(|(_, seen)| now.duration_since(**seen) >= ctx.debounce)
        .map(|(path, _)| path.clone())
        .collect();

    for path in due {
        pending.remove(&path);
        if *ctx.state.lock() != WatcherState::Running {
            continue;
        }
        dispatch(path, ctx);
    }
}

/// Route a fired path and hand it to the runtime for ingestion.
fn dispatch(path: PathBuf, ctx: &Arc<WatchContext>) {
    // NotRoutable means the file is not part of the sync layout: ignore
    let Ok(key) = ctx.router.route(&path) else {
        return;
    };

    let ctx = Arc::clone(ctx);
    ctx.handle.clone().spawn(async move {
        if let Err(err) = ingest_path(&path, key, &ctx).await {
            log!("watch"; "{}: {err}", path.display());
        }
    });
}

/// Validation gate and ingestion for a single path.
async fn ingest_path(path: &Path, key: RouteKey, ctx: &WatchContext) -> Result<()> {
    // stat before any read or DB call
    let Ok(meta) = tokio::fs::metadata(path).await else {
        // deleted between debounce and dispatch
        return Ok(());
    };
    if !meta.is_file() {
        return Ok(());
    }
    if meta.len() == 0 {
        // editors commonly truncate then write; the follow-up write will
        // re-arm the debounce with real content
        log!("watch"; "skipping {}: file is empty", path.display());
        return Ok(());
    }
    if meta.len() > ctx.max_file_bytes {
        return Err(SyncError::Invalid(format!(
            "{} is {} bytes, over the {} byte import limit",
            path.display(),
            meta.len(),
            ctx.max_file_bytes,
        )));
    }

    let bytes = tokio::fs::read(path).await?;
    ctx.sink.ingest(key, bytes).await
}

/// Only content changes matter; renames surface as name modifications.
fn should_process_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

/// Cheap suffix filter applied before debouncing.
fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    // .tmp is the atomic-rename staging suffix; half-written data
    if name.ends_with(".tmp") {
        return false;
    }
    name.ends_with(".html") || name.ends_with(".css")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Debounce window used by the tests
    const WINDOW: Duration = Duration::from_millis(150);
    /// Comfortably past the window plus dispatch latency
    const SETTLE: Duration = Duration::from_millis(700);

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(RouteKey, Vec<u8>)>>,
    }

    #[async_trait]
    impl Ingest for RecordingSink {
        async fn ingest(&self, key: RouteKey, bytes: Vec<u8>) -> Result<()> {
            self.events.lock().push((key, bytes));
            Ok(())
        }
    }

    impl RecordingSink {
        fn events(&self) -> Vec<(RouteKey, Vec<u8>)> {
            self.events.lock().clone()
        }
    }

    fn watcher_over(
        root: &Path,
        max_file_bytes: u64,
    ) -> (FileWatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let watcher = FileWatcher::new(root, WINDOW, max_file_bytes, sink.clone());
        (watcher, sink)
    }

    fn template_dir(root: &Path) -> PathBuf {
        let dir = root.join("template_sets/Default Templates/header");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_single_edit_is_ingested() {
        let dir = tempfile::tempdir().unwrap();
        let target = template_dir(dir.path()).join("welcome.html");

        let (mut watcher, sink) = watcher_over(dir.path(), 1024);
        watcher.start().unwrap();

        std::fs::write(&target, "<b>hi</b>").unwrap();
        tokio::time::sleep(SETTLE).await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].0,
            RouteKey::Template {
                set_name: "Default Templates".into(),
                group: "header".into(),
                title: "welcome".into(),
            }
        );
        assert_eq!(events[0].1, b"<b>hi</b>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_storm_coalesces_into_one_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let target = template_dir(dir.path()).join("welcome.html");

        let (mut watcher, sink) = watcher_over(dir.path(), 1024);
        watcher.start().unwrap();

        for body in ["<b>1</b>", "<b>2</b>", "<b>3</b>"] {
            std::fs::write(&target, body).unwrap();
        }
        tokio::time::sleep(SETTLE).await;

        let events = sink.events();
        assert_eq!(events.len(), 1, "burst within the window must coalesce");
        assert_eq!(events[0].1, b"<b>3</b>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_truncate_then_write_never_ingests_empty() {
        let dir = tempfile::tempdir().unwrap();
        let target = template_dir(dir.path()).join("welcome.html");

        let (mut watcher, sink) = watcher_over(dir.path(), 1024);
        watcher.start().unwrap();

        std::fs::write(&target, "").unwrap();
        std::fs::write(&target, "<b>hi</b>").unwrap();
        tokio::time::sleep(SETTLE).await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, b"<b>hi</b>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_staging_files_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let staging = template_dir(dir.path()).join("welcome.html.tmp");

        let (mut watcher, sink) = watcher_over(dir.path(), 1024);
        watcher.start().unwrap();

        std::fs::write(&staging, "half-written").unwrap();
        tokio::time::sleep(SETTLE).await;

        assert!(sink.events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unroutable_paths_are_ignored() {
        let dir = tempfile::tempdir().unwrap();

        let (mut watcher, sink) = watcher_over(dir.path(), 1024);
        watcher.start().unwrap();

        // right suffix, wrong depth: not part of the sync layout
        std::fs::write(dir.path().join("notes.html"), "<p>scratch</p>").unwrap();
        tokio::time::sleep(SETTLE).await;

        assert!(sink.events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oversize_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = template_dir(dir.path()).join("welcome.html");

        let (mut watcher, sink) = watcher_over(dir.path(), 8);
        watcher.start().unwrap();

        std::fs::write(&target, "well over eight bytes").unwrap();
        tokio::time::sleep(SETTLE).await;

        assert!(sink.events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_discards_resume_rearms() {
        let dir = tempfile::tempdir().unwrap();
        let target = template_dir(dir.path()).join("welcome.html");

        let (mut watcher, sink) = watcher_over(dir.path(), 1024);
        watcher.start().unwrap();
        watcher.pause();
        assert_eq!(watcher.state(), WatcherState::Paused);

        std::fs::write(&target, "<b>ignored</b>").unwrap();
        tokio::time::sleep(SETTLE).await;
        assert!(sink.events().is_empty());

        watcher.resume();
        std::fs::write(&target, "<b>seen</b>").unwrap();
        tokio::time::sleep(SETTLE).await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, b"<b>seen</b>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_cancels_pending_debounces() {
        let dir = tempfile::tempdir().unwrap();
        let target = template_dir(dir.path()).join("welcome.html");

        let (mut watcher, sink) = watcher_over(dir.path(), 1024);
        watcher.start().unwrap();

        std::fs::write(&target, "<b>late</b>").unwrap();
        // Stop before the quiet window elapses
        watcher.stop();
        tokio::time::sleep(SETTLE).await;

        assert!(sink.events().is_empty());
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_machine_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, _sink) = watcher_over(dir.path(), 1024);

        assert_eq!(watcher.state(), WatcherState::Stopped);
        // pause/resume before start are no-ops
        watcher.pause();
        watcher.resume();
        assert_eq!(watcher.state(), WatcherState::Stopped);

        watcher.start().unwrap();
        assert_eq!(watcher.state(), WatcherState::Running);
        // re-entering start is a no-op, not an error
        watcher.start().unwrap();
        assert_eq!(watcher.state(), WatcherState::Running);

        watcher.pause();
        watcher.pause();
        assert_eq!(watcher.state(), WatcherState::Paused);
        watcher.resume();
        watcher.resume();
        assert_eq!(watcher.state(), WatcherState::Running);

        watcher.stop();
        watcher.stop();
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[test]
    fn test_candidate_filter() {
        assert!(is_candidate(Path::new("/s/template_sets/D/header/welcome.html")));
        assert!(is_candidate(Path::new("/s/styles/Default/global.css")));
        assert!(!is_candidate(Path::new("/s/styles/Default/global.css.tmp")));
        assert!(!is_candidate(Path::new("/s/template_sets/D/header/welcome.html.tmp")));
        assert!(!is_candidate(Path::new("/s/styles/Default/readme.md")));
        assert!(!is_candidate(Path::new("/s/styles/Default")));
    }

    #[test]
    fn test_watcher_state_display() {
        assert_eq!(WatcherState::Stopped.to_string(), "stopped");
        assert_eq!(WatcherState::Running.to_string(), "running");
        assert_eq!(WatcherState::Paused.to_string(), "paused");
    }
}
