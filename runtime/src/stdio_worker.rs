//! Worker handle that owns a child process speaking framed JSON-RPC over stdio.
//!
//! One reader task routes responses to waiting callers and worker log
//! notifications into the worker's span; one writer task serializes frames
//! onto stdin; a watchdog disposes the process after a period of idleness.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde_json::Value;
use stylist_types::{LintOutcome, PnpConfiguration, ResolvedLinter, WorkerError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, Span};

use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{
    Incoming, LogLevel, METHOD_LINT, METHOD_RESOLVE, METHOD_SHUTDOWN, Request, RpcError,
    parse_incoming,
};
use crate::worker::{DisposeFut, LintParams, ResolveParams, WorkerFut, WorkerProcess};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long disposal waits for in-flight requests before stopping the process anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const WRITER_CHANNEL_CAPACITY: usize = 64;

const MIN_WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>;

enum WriterCommand {
    Send(Value),
    Shutdown,
}

/// Everything needed to start one worker process.
#[derive(Debug, Clone)]
pub(crate) struct WorkerLaunch {
    pub command: String,
    pub script: PathBuf,
    pub root: PathBuf,
    pub pnp: Option<PnpConfiguration>,
    pub request_timeout: Duration,
    /// `Duration::ZERO` disables idle eviction.
    pub idle_timeout: Duration,
}

/// Node arguments that install the PnP runtime before the worker script loads.
pub(crate) fn node_arguments(pnp: Option<&PnpConfiguration>, script: &Path) -> Vec<OsString> {
    let mut args = Vec::new();
    if let Some(pnp) = pnp {
        args.push(OsString::from("--require"));
        args.push(pnp.register_path.clone().into_os_string());
        if let Some(loader) = &pnp.loader_path {
            args.push(OsString::from("--experimental-loader"));
            args.push(loader.clone().into_os_string());
        }
    }
    args.push(script.as_os_str().to_os_string());
    args
}

struct Shared {
    root: PathBuf,
    span: Span,
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: PendingMap,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    drained: Notify,
    last_activity: StdMutex<Instant>,
    disposed: AtomicBool,
    exited: AtomicBool,
    exit_reason: StdMutex<Option<String>>,
    child: Mutex<Option<Child>>,
}

impl Shared {
    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn exit_message(&self) -> String {
        self.exit_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| "worker exited during request".to_string())
    }

    fn crashed(&self, message: impl Into<String>) -> WorkerError {
        WorkerError::crashed(self.root.clone(), message)
    }
}

/// Decrements the in-flight count even when the caller abandons the request.
struct InFlight<'a>(&'a Shared);

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        shared.touch();
        Self(shared)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.touch();
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

pub(crate) struct StdioWorker {
    shared: Arc<Shared>,
    request_timeout: Duration,
    idle_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl StdioWorker {
    pub async fn start(launch: WorkerLaunch) -> Result<Self> {
        let command = which::which(&launch.command)
            .with_context(|| format!("{} not found in PATH", launch.command))?;
        if !launch.script.is_file() {
            bail!("worker script {} does not exist", launch.script.display());
        }

        let mut cmd = Command::new(&command);
        cmd.args(node_arguments(launch.pnp.as_ref(), &launch.script))
            .current_dir(&launch.root)
            .env("STYLIST_WORKER_ROOT", &launch.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning worker for {}", launch.root.display()))?;
        let stdin = child.stdin.take().context("no stdin from worker")?;
        let stdout = child.stdout.take().context("no stdout from worker")?;
        let stderr = child.stderr.take().context("no stderr from worker")?;

        let span = tracing::info_span!("worker", root = %launch.root.display());
        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);

        let shared = Arc::new(Shared {
            root: launch.root.clone(),
            span: span.clone(),
            writer_tx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
            last_activity: StdMutex::new(Instant::now()),
            disposed: AtomicBool::new(false),
            exited: AtomicBool::new(false),
            exit_reason: StdMutex::new(None),
            child: Mutex::new(Some(child)),
        });

        let writer_handle = tokio::spawn(
            async move {
                let mut writer = FrameWriter::new(stdin);
                while let Some(command) = writer_rx.recv().await {
                    match command {
                        WriterCommand::Send(frame) => {
                            if let Err(e) = writer.write_frame(&frame).await {
                                tracing::warn!("Worker write error: {e:#}");
                                break;
                            }
                        }
                        WriterCommand::Shutdown => break,
                    }
                }
            }
            .instrument(span.clone()),
        );

        let reader_handle =
            tokio::spawn(read_loop(shared.clone(), stdout).instrument(span.clone()));
        let stderr_handle = tokio::spawn(forward_stderr(stderr).instrument(span.clone()));

        let mut tasks = vec![writer_handle, reader_handle, stderr_handle];
        if !launch.idle_timeout.is_zero() {
            tasks.push(tokio::spawn(
                watchdog(shared.clone(), launch.idle_timeout).instrument(span.clone()),
            ));
        }

        span.in_scope(|| tracing::debug!(command = %command.display(), "Worker started"));

        Ok(Self {
            shared,
            request_timeout: launch.request_timeout,
            idle_timeout: launch.idle_timeout,
            tasks,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, WorkerError> {
        let shared = &*self.shared;
        if self.is_disposed() {
            return Err(shared.crashed("worker is no longer running"));
        }
        let _in_flight = InFlight::enter(shared);

        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().await.insert(id, tx);
        if shared.exited.load(Ordering::SeqCst) {
            shared.pending.lock().await.remove(&id);
            return Err(shared.crashed(shared.exit_message()));
        }

        let frame = serde_json::to_value(Request::new(id, method, params))
            .map_err(|e| WorkerError::Failed(format!("serializing {method} request: {e}")))?;
        if shared
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            shared.pending.lock().await.remove(&id);
            return Err(shared.crashed("worker stdin closed"));
        }

        let outcome = match timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(shared.crashed(shared.exit_message())),
            Err(_) => {
                shared.pending.lock().await.remove(&id);
                tracing::warn!(
                    parent: &shared.span,
                    method,
                    "Worker did not answer in time, stopping it"
                );
                if !shared.disposed.swap(true, Ordering::SeqCst) {
                    tokio::spawn(stop(self.shared.clone()).instrument(shared.span.clone()));
                }
                return Err(shared.crashed(format!(
                    "no response to {method} within {}s",
                    self.request_timeout.as_secs()
                )));
            }
        };

        match outcome {
            Ok(Value::Null) => Ok(None),
            Ok(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| WorkerError::Failed(format!("malformed {method} result: {e}"))),
            Err(rpc) => {
                tracing::debug!(
                    parent: &shared.span,
                    method,
                    code = rpc.code,
                    "Worker reported an error"
                );
                Err(WorkerError::Failed(rpc.message))
            }
        }
    }
}

impl WorkerProcess for StdioWorker {
    fn lint(&self, params: LintParams) -> WorkerFut<'_, Option<LintOutcome>> {
        Box::pin(async move {
            let params = serde_json::to_value(&params)
                .map_err(|e| WorkerError::Failed(format!("serializing lint params: {e}")))?;
            self.request(METHOD_LINT, params).await
        })
    }

    fn resolve(&self, params: ResolveParams) -> WorkerFut<'_, Option<ResolvedLinter>> {
        Box::pin(async move {
            let params = serde_json::to_value(&params)
                .map_err(|e| WorkerError::Failed(format!("serializing resolve params: {e}")))?;
            self.request(METHOD_RESOLVE, params).await
        })
    }

    fn dispose(&self) -> DisposeFut<'_> {
        let span = self.shared.span.clone();
        Box::pin(shutdown(self.shared.clone()).instrument(span))
    }

    fn is_disposed(&self) -> bool {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::SeqCst) || shared.exited.load(Ordering::SeqCst) {
            return true;
        }
        !self.idle_timeout.is_zero()
            && shared.in_flight.load(Ordering::SeqCst) == 0
            && shared.idle_for() >= self.idle_timeout
    }
}

impl Drop for StdioWorker {
    fn drop(&mut self) {
        // The tasks hold the shared state; aborting them lets the child drop and be killed.
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn read_loop(shared: Arc<Shared>, stdout: ChildStdout) {
    let mut reader = FrameReader::new(stdout);
    let reason = loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => dispatch(&shared, frame).await,
            Ok(None) => break "worker closed its output".to_string(),
            Err(e) => break format!("unreadable worker output: {e:#}"),
        }
    };

    let status = {
        let mut child = shared.child.lock().await;
        match child.as_mut() {
            Some(child) => timeout(SHUTDOWN_TIMEOUT, child.wait())
                .await
                .ok()
                .and_then(Result::ok),
            None => None,
        }
    };
    let reason = match status {
        Some(status) => format!("{reason} ({status})"),
        None => reason,
    };

    if shared.disposed.load(Ordering::SeqCst) {
        tracing::debug!("Worker stopped: {reason}");
    } else {
        tracing::warn!("Worker exited unexpectedly: {reason}");
    }

    *shared
        .exit_reason
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(reason);
    shared.exited.store(true, Ordering::SeqCst);
    // Dropping the senders fails every waiting request with the recorded reason.
    shared.pending.lock().await.clear();
}

async fn dispatch(shared: &Shared, frame: Value) {
    match parse_incoming(frame) {
        Some(Incoming::Response { id, outcome }) => {
            let sender = shared.pending.lock().await.remove(&id);
            if let Some(tx) = sender {
                let _ = tx.send(outcome);
            }
        }
        Some(Incoming::Log { level, message }) => match level {
            LogLevel::Error => tracing::error!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Debug => tracing::debug!("{message}"),
        },
        None => tracing::trace!("Ignoring unrecognized frame from worker"),
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "stylist_runtime::worker_stderr", "{line}");
    }
}

async fn watchdog(shared: Arc<Shared>, idle_timeout: Duration) {
    let interval = (idle_timeout / 4).max(MIN_WATCHDOG_INTERVAL);
    loop {
        sleep(interval).await;
        if shared.disposed.load(Ordering::SeqCst) || shared.exited.load(Ordering::SeqCst) {
            return;
        }
        if shared.in_flight.load(Ordering::SeqCst) == 0 && shared.idle_for() >= idle_timeout {
            tracing::debug!(idle_secs = idle_timeout.as_secs(), "Worker idle, disposing");
            shutdown(shared).await;
            return;
        }
    }
}

async fn shutdown(shared: Arc<Shared>) {
    if shared.disposed.swap(true, Ordering::SeqCst) {
        return;
    }
    stop(shared).await;
}

/// Drain, ask the worker to exit, then make sure it did. The caller has
/// already marked the worker disposed.
async fn stop(shared: Arc<Shared>) {
    let drained = timeout(DRAIN_TIMEOUT, async {
        loop {
            let notified = shared.drained.notified();
            if shared.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::debug!("Worker still busy after drain timeout, stopping anyway");
    }

    if !shared.exited.load(Ordering::SeqCst) {
        let id = shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().await.insert(id, tx);
        if let Ok(frame) = serde_json::to_value(Request::new(id, METHOD_SHUTDOWN, Value::Null))
            && shared.writer_tx.send(WriterCommand::Send(frame)).await.is_ok()
        {
            let _ = timeout(SHUTDOWN_TIMEOUT, rx).await;
        }
        shared.pending.lock().await.remove(&id);
    }
    let _ = shared.writer_tx.send(WriterCommand::Shutdown).await;

    let mut child = shared.child.lock().await;
    if let Some(mut process) = child.take() {
        let exited = timeout(SHUTDOWN_TIMEOUT, process.wait()).await;
        if exited.is_err() {
            tracing::debug!("Worker didn't exit in time, killing");
            let _ = process.kill().await;
        }
    }
    tracing::debug!("Worker disposed");
}
