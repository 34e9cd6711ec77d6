//! Process supervisor
//!
//! Owns the life cycle of one model process per run: writes the datastack,
//! spawns the model, captures its output, finds its log file, delivers
//! cancellation and interprets the exit code.
//!
//! Each run is driven by one task that is the only writer of the run's
//! [`JobRecord`]. Output is read by two producer tasks (stdout and stderr)
//! and handed to that task as chunks; the caller observes the run through
//! pushed [`JobEvent`]s and a watch on the record.

mod active;
mod command;
mod events;
mod logfile;
mod process;

pub use command::build_invocation;
pub use events::JobEvent;
pub use logfile::{find_most_recent_logfile, is_model_logfile};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use workbench_core::datastack::{self, Datastack};
use workbench_core::domain::args::{ArgValue, N_WORKERS_KEY};
use workbench_core::domain::job::{JobRecord, JobStatus, WorkspaceHash};
use workbench_core::validation::ValidationState;

use crate::config::Config;
use crate::error::{SupervisorError, SupervisorResult};
use crate::service::{CANCEL_NOTICE, DiagnosticBuffer};
use crate::store::JobStore;
use active::{ActiveRun, ActiveRuns};

const DATASTACK_FILENAME: &str = "datastack.json";
const READ_CHUNK_SIZE: usize = 8192;

/// Tolerance for filesystems with coarse modification times
const LOGFILE_MTIME_SLACK: Duration = Duration::from_secs(1);

type CancelRequest = oneshot::Sender<SupervisorResult<bool>>;

/// Launches model runs
///
/// Independent runs share nothing except the optional history store. At
/// most one run per workspace is in progress at a time.
pub struct ProcessSupervisor {
    config: Arc<Config>,
    store: Option<JobStore>,
    active: Arc<ActiveRuns>,
}

impl ProcessSupervisor {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            store: None,
            active: Arc::new(ActiveRuns::default()),
        }
    }

    /// Persists every run's progress to `store`
    pub fn with_store(mut self, store: JobStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a run started here is still in progress in `workspace`
    pub fn has_active_run(&self, workspace: &WorkspaceHash) -> bool {
        self.active.contains(workspace)
    }

    /// Starts a run of `job`
    ///
    /// Refuses to start unless `validation` is ready to run and was computed
    /// for the job's current arguments, and while another run started by
    /// this supervisor is still in progress in the same workspace. A refusal
    /// leaves `job.status` as it was; a status loaded from history is never
    /// taken as evidence of a live process.
    ///
    /// On success `job.status` is already `Running` when this returns; the
    /// record's later changes are seen through the returned handle. If the
    /// launch itself fails (scratch directory, datastack or spawn),
    /// `job.status` becomes `Error` and nothing is left behind.
    ///
    /// # Arguments
    /// * `job` - The job to run; its workspace is made absolute in place
    /// * `validation` - Validation state of the job's arguments
    pub async fn start(
        &self,
        job: &mut JobRecord,
        validation: &ValidationState,
    ) -> SupervisorResult<RunHandle> {
        if !validation.ready_to_run() {
            return Err(SupervisorError::ValidationFailed {
                invalid: validation.invalid_keys(),
            });
        }
        if !validation.matches_args(&job.args_values) {
            return Err(SupervisorError::StaleValidation);
        }

        match std::env::current_dir() {
            Ok(base) => job.absolutize_workspace(&base),
            Err(e) => warn!("Cannot resolve current directory, keeping workspace as given: {}", e),
        }
        let (Some(workspace_dir), Some(workspace_hash)) =
            (job.workspace.directory.clone(), job.workspace_hash())
        else {
            return Err(SupervisorError::MissingWorkspace);
        };
        let Some(active) = self.active.claim(workspace_hash) else {
            return Err(SupervisorError::AlreadyRunning);
        };

        let scratch = match ScratchDir::create(&self.config.temp_dir).await {
            Ok(scratch) => scratch,
            Err(e) => {
                error!("Cannot prepare a run of {}: {}", job.model_run_name, e);
                job.status = JobStatus::Error;
                return Err(e);
            }
        };
        if let Err(e) = scratch.write_datastack(&self.datastack_for(job)).await {
            error!("Cannot prepare a run of {}: {}", job.model_run_name, e);
            job.status = JobStatus::Error;
            scratch.remove().await;
            return Err(e);
        }

        let argv = build_invocation(&self.config, &job.model_run_name, &scratch.datastack);
        let started_at = SystemTime::now();
        let mut child = match process::spawn_model(&argv) {
            Ok(child) => child,
            Err(source) => {
                error!(
                    "Failed to spawn {} for {}: {}",
                    self.config.invest_exe.display(),
                    job.model_run_name,
                    source
                );
                job.status = JobStatus::Error;
                scratch.remove().await;
                return Err(SupervisorError::Spawn {
                    executable: self.config.invest_exe.clone(),
                    source,
                });
            }
        };

        let pid = child.id();
        job.status = JobStatus::Running;
        info!(
            "Started {} (pid {}) in {}",
            job.model_run_name,
            pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string()),
            workspace_dir.display()
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(JobEvent::StatusChanged(JobStatus::Running));
        let (record_tx, record_rx) = watch::channel(job.clone());
        let (cancel_tx, cancel_rx) = mpsc::channel(4);
        let (discovery_tx, discovery_rx) = mpsc::channel(1);
        let diagnostics = DiagnosticBuffer::new();

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, OutputChunk::Stdout, output_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, OutputChunk::Stderr, output_tx));
        }

        let task = RunTask {
            job: job.clone(),
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            events: event_tx,
            record: record_tx,
            diagnostics: diagnostics.clone(),
            scratch,
            active: Some(active),
            workspace_dir,
            started_at,
            pid,
            cancelled: false,
            seen_output: false,
            discovery_pending: false,
            discovery_tx,
        };
        let task = tokio::spawn(task.run(child, output_rx, cancel_rx, discovery_rx));

        Ok(RunHandle {
            pid,
            events: event_rx,
            canceller: Canceller {
                cancel: cancel_tx,
                record: record_rx,
            },
            diagnostics,
            task,
        })
    }

    fn datastack_for(&self, job: &JobRecord) -> Datastack {
        let mut args = job.args_values.clone();
        let n_workers = &self.config.settings.n_workers;
        args.entry(N_WORKERS_KEY.to_string())
            .or_insert_with(|| ArgValue::number(n_workers).unwrap_or_else(|| ArgValue::from(n_workers.as_str())));

        Datastack::new(args, &job.model_run_name, &self.config.invest_version)
            .with_human_name(job.model_human_name.clone())
    }
}

/// Caller's side of one run
///
/// Dropping the handle does not stop the model; the run continues and is
/// still persisted when it ends.
pub struct RunHandle {
    pid: Option<u32>,
    events: mpsc::UnboundedReceiver<JobEvent>,
    canceller: Canceller,
    diagnostics: DiagnosticBuffer,
    task: JoinHandle<JobRecord>,
}

impl RunHandle {
    /// Waits for the next event; `None` once the run has finished
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    pub fn status(&self) -> JobStatus {
        self.canceller.record.borrow().status
    }

    /// A copy of the job as it currently stands
    pub fn snapshot(&self) -> JobRecord {
        self.canceller.record.borrow().clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Standard-error text collected so far
    pub fn diagnostics(&self) -> String {
        self.diagnostics.contents()
    }

    /// A cloneable cancel handle, usable while events are being consumed
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Terminates the run's whole process tree
    ///
    /// # Returns
    /// `true` if the run was canceled, `false` if it was not running
    pub async fn terminate(&self) -> SupervisorResult<bool> {
        self.canceller.terminate().await
    }

    /// Waits for the run to end and returns the final record
    pub async fn wait(self) -> JobRecord {
        let RunHandle { canceller, task, .. } = self;
        match task.await {
            Ok(job) => job,
            Err(e) => {
                error!("Run task failed: {}", e);
                let mut job = canceller.record.borrow().clone();
                job.status = JobStatus::Error;
                job
            }
        }
    }
}

/// Delivers a cancel request to a run
#[derive(Clone)]
pub struct Canceller {
    cancel: mpsc::Sender<CancelRequest>,
    record: watch::Receiver<JobRecord>,
}

impl Canceller {
    /// Terminates the run if it is running; a no-op otherwise
    pub async fn terminate(&self) -> SupervisorResult<bool> {
        if self.record.borrow().status != JobStatus::Running {
            return Ok(false);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cancel.send(reply_tx).await.is_err() {
            return Ok(false);
        }
        // The run ended before the request was handled
        reply_rx.await.unwrap_or(Ok(false))
    }
}

#[derive(Debug)]
enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Reads one output stream until it closes
async fn pump<R>(mut reader: R, wrap: fn(String) -> OutputChunk, tx: mpsc::UnboundedSender<OutputChunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send(wrap(text)).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Error reading model output: {}", e);
                break;
            }
        }
    }
}

/// Scratch directory holding the datastack of one run
struct ScratchDir {
    dir: PathBuf,
    datastack: PathBuf,
}

impl ScratchDir {
    async fn create(parent: &Path) -> SupervisorResult<Self> {
        let dir = parent.join(format!("data-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| SupervisorError::Scratch {
                path: dir.clone(),
                source,
            })?;

        Ok(Self {
            datastack: dir.join(DATASTACK_FILENAME),
            dir,
        })
    }

    async fn write_datastack(&self, datastack: &Datastack) -> SupervisorResult<()> {
        let bytes = datastack::encode(datastack)?;
        tokio::fs::write(&self.datastack, bytes)
            .await
            .map_err(|source| SupervisorError::Scratch {
                path: self.datastack.clone(),
                source,
            })
    }

    /// Best-effort removal; failures are logged only
    async fn remove(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.datastack).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", self.datastack.display(), e);
            }
        }
        if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
            warn!("Failed to remove {}: {}", self.dir.display(), e);
        }
    }
}

/// State owned by the task driving one run
struct RunTask {
    job: JobRecord,
    config: Arc<Config>,
    store: Option<JobStore>,
    events: mpsc::UnboundedSender<JobEvent>,
    record: watch::Sender<JobRecord>,
    diagnostics: DiagnosticBuffer,
    scratch: ScratchDir,
    active: Option<ActiveRun>,
    workspace_dir: PathBuf,
    started_at: SystemTime,
    pid: Option<u32>,
    cancelled: bool,
    seen_output: bool,
    discovery_pending: bool,
    discovery_tx: mpsc::Sender<Option<PathBuf>>,
}

impl RunTask {
    async fn run(
        mut self,
        mut child: Child,
        mut output: mpsc::UnboundedReceiver<OutputChunk>,
        mut cancel: mpsc::Receiver<CancelRequest>,
        mut discovered: mpsc::Receiver<Option<PathBuf>>,
    ) -> JobRecord {
        let exit = loop {
            tokio::select! {
                Some(chunk) = output.recv() => self.handle_output(chunk),
                Some(found) = discovered.recv() => self.handle_discovery(found).await,
                Some(reply) = cancel.recv() => {
                    let result = self.cancel().await;
                    let _ = reply.send(result);
                }
                status = child.wait() => break status,
            }
        };

        // Output written just before exit may still be in the pipes
        let drain_timeout = self.config.output_drain_timeout;
        let drain = async {
            while let Some(chunk) = output.recv().await {
                self.handle_output(chunk);
            }
        };
        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
            warn!(
                "Output of {} still open {:?} after exit; giving up on it",
                self.job.model_run_name, drain_timeout
            );
        }

        if self.discovery_pending {
            if let Some(found) = discovered.recv().await {
                self.handle_discovery(found).await;
            }
        }

        let exit_code = match exit {
            Ok(status) => {
                info!("{} exited with {}", self.job.model_run_name, status);
                status.code()
            }
            Err(e) => {
                error!("Failed to wait for {}: {}", self.job.model_run_name, e);
                None
            }
        };
        let status = if self.cancelled {
            JobStatus::Error
        } else {
            JobStatus::from_exit_code(exit_code)
        };

        self.set_status(status);
        self.persist().await;
        self.scratch.remove().await;
        // Released before Finished so that a caller may rerun right away
        self.active.take();
        self.emit(JobEvent::Finished { status, exit_code });

        self.job
    }

    fn handle_output(&mut self, chunk: OutputChunk) {
        match chunk {
            OutputChunk::Stdout(text) => {
                if !self.seen_output {
                    self.seen_output = true;
                    info!(
                        "First output from {}; looking for its log file",
                        self.job.model_run_name
                    );
                    self.start_discovery();
                }
                self.emit(JobEvent::Stdout(text));
            }
            OutputChunk::Stderr(text) => {
                debug!("{} stderr: {}", self.job.model_run_name, text.trim_end());
                if !self.cancelled {
                    self.diagnostics.append(&text);
                }
                self.emit(JobEvent::Stderr(text));
            }
        }
    }

    fn start_discovery(&mut self) {
        self.discovery_pending = true;

        let dir = self.workspace_dir.clone();
        let not_before = self
            .started_at
            .checked_sub(LOGFILE_MTIME_SLACK)
            .unwrap_or(self.started_at);
        let timeout = self.config.logfile_timeout;
        let interval = self.config.logfile_poll_interval;
        let tx = self.discovery_tx.clone();

        tokio::spawn(async move {
            let found = logfile::discover_logfile(&dir, not_before, timeout, interval).await;
            let _ = tx.send(found).await;
        });
    }

    async fn handle_discovery(&mut self, found: Option<PathBuf>) {
        self.discovery_pending = false;
        match found {
            Some(path) => {
                info!("Found log file {}", path.display());
                self.job.logfile = Some(path.clone());
                self.publish();
                self.emit(JobEvent::LogfileDiscovered(path));
            }
            None => {
                warn!(
                    "No log file appeared in {} within {:?}",
                    self.workspace_dir.display(),
                    self.config.logfile_timeout
                );
                self.emit(JobEvent::LogfileUnavailable);
            }
        }
        self.persist().await;
    }

    async fn cancel(&mut self) -> SupervisorResult<bool> {
        if self.cancelled {
            return Ok(false);
        }
        let Some(pid) = self.pid else {
            return Ok(false);
        };

        process::terminate_tree(pid).await?;
        self.cancelled = true;
        self.diagnostics.replace(CANCEL_NOTICE);
        info!("Canceled {} (pid {})", self.job.model_run_name, pid);
        Ok(true)
    }

    fn set_status(&mut self, status: JobStatus) {
        info!(
            "{} status {} -> {}",
            self.job.model_run_name, self.job.status, status
        );
        self.job.status = status;
        self.publish();
        self.emit(JobEvent::StatusChanged(status));
    }

    fn publish(&self) {
        self.record.send_replace(self.job.clone());
    }

    fn emit(&self, event: JobEvent) {
        // The caller may have stopped listening; the run goes on regardless
        let _ = self.events.send(event);
    }

    async fn persist(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.upsert(&self.job).await {
                error!("Failed to save {} to history: {}", self.job.model_run_name, e);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::store::backend::MemoryBackend;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use workbench_core::domain::args::{ArgsValues, WORKSPACE_DIR_KEY};
    use workbench_core::dto::validation::ValidationIssue;
    use workbench_core::validation;

    const LOG_NAME: &str = "InVEST-carbon-log-test.txt";

    /// Writes an executable shell script standing in for the model
    fn fake_model(root: &Path, name: &str, body: &str) -> PathBuf {
        let path = root.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// A model that logs to `workspace`, copies its datastack there and exits
    fn finishing_model(workspace: &Path, exit_code: i32) -> String {
        format!(
            r#"echo "model starting $3"
touch "{ws}/{log}"
echo "model warning" >&2
cp "$6" "{ws}/seen-datastack.json"
sleep 0.1
exit {code}"#,
            ws = workspace.display(),
            log = LOG_NAME,
            code = exit_code
        )
    }

    fn test_config(root: &Path, exe: PathBuf) -> Config {
        Config::new(exe)
            .with_temp_dir(root.join("scratch"))
            .with_invest_version("3.14.2")
            .with_timing(
                Duration::from_secs(2),
                Duration::from_millis(20),
                Duration::from_secs(1),
            )
    }

    fn workspace(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ready_job(workspace: &Path) -> (JobRecord, ValidationState) {
        let mut args = ArgsValues::new();
        args.insert(
            WORKSPACE_DIR_KEY.to_string(),
            ArgValue::from(workspace.to_string_lossy().as_ref()),
        );
        args.insert("lulc_cur_path".to_string(), ArgValue::from("lulc.tif"));
        let job = JobRecord::new("carbon", Some("Carbon Storage".to_string())).with_args(args.clone());
        (job, validation::aggregate(&args, &[]))
    }

    async fn collect_events(handle: &mut RunHandle) -> Vec<JobEvent> {
        tokio::time::timeout(Duration::from_secs(20), async {
            let mut events = Vec::new();
            while let Some(event) = handle.next_event().await {
                events.push(event);
            }
            events
        })
        .await
        .expect("run did not finish in time")
    }

    fn scratch_entries(root: &Path) -> usize {
        std::fs::read_dir(root.join("scratch"))
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_successful_run() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let exe = fake_model(root.path(), "ok.sh", &finishing_model(&ws, 0));
        let store = JobStore::new(MemoryBackend::new(), 10);
        let supervisor = ProcessSupervisor::new(test_config(root.path(), exe)).with_store(store.clone());
        let (mut job, validation) = ready_job(&ws);

        let mut handle = supervisor.start(&mut job, &validation).await.unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(handle.pid().is_some());

        let events = collect_events(&mut handle).await;
        assert_eq!(events[0], JobEvent::StatusChanged(JobStatus::Running));
        assert_eq!(
            events.last(),
            Some(&JobEvent::Finished {
                status: JobStatus::Success,
                exit_code: Some(0)
            })
        );
        assert!(events.contains(&JobEvent::LogfileDiscovered(ws.join(LOG_NAME))));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, JobEvent::Stdout(text) if text.contains("model starting carbon")))
        );
        assert_eq!(handle.diagnostics(), "model warning\n");

        let finished = handle.wait().await;
        assert_eq!(finished.status, JobStatus::Success);
        assert_eq!(finished.logfile, Some(ws.join(LOG_NAME)));

        let history = store.load().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobStatus::Success);

        let seen = datastack::read_from_path(&ws.join("seen-datastack.json")).unwrap();
        assert_eq!(seen.model_run_name, "carbon");
        assert_eq!(seen.invest_version, "3.14.2");
        assert_eq!(seen.args[N_WORKERS_KEY], ArgValue::from(-1i64));
        assert_eq!(seen.args["lulc_cur_path"], ArgValue::from("lulc.tif"));

        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_rerun_updates_history_in_place() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let store = JobStore::new(MemoryBackend::new(), 10);
        let (mut job, validation) = ready_job(&ws);

        let ok = fake_model(root.path(), "ok.sh", &finishing_model(&ws, 0));
        let supervisor = ProcessSupervisor::new(test_config(root.path(), ok)).with_store(store.clone());
        let first = supervisor.start(&mut job, &validation).await.unwrap().wait().await;
        assert_eq!(first.status, JobStatus::Success);

        let mut job = first;
        let failing = fake_model(root.path(), "fail.sh", &finishing_model(&ws, 2));
        let supervisor = ProcessSupervisor::new(test_config(root.path(), failing)).with_store(store.clone());
        let second = supervisor.start(&mut job, &validation).await.unwrap().wait().await;
        assert_eq!(second.status, JobStatus::Error);

        let history = store.load().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobStatus::Error);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let root = TempDir::new().unwrap();
        let store = JobStore::new(MemoryBackend::new(), 10);

        let ws1 = workspace(root.path(), "ws1");
        let ws2 = workspace(root.path(), "ws2");
        let ok = fake_model(root.path(), "ok.sh", &finishing_model(&ws1, 0));
        let fail = fake_model(root.path(), "fail.sh", &finishing_model(&ws2, 1));
        let first = ProcessSupervisor::new(test_config(root.path(), ok)).with_store(store.clone());
        let second = ProcessSupervisor::new(test_config(root.path(), fail)).with_store(store.clone());

        let (mut job1, validation1) = ready_job(&ws1);
        let (mut job2, validation2) = ready_job(&ws2);
        let run1 = first.start(&mut job1, &validation1).await.unwrap();
        let run2 = second.start(&mut job2, &validation2).await.unwrap();
        let (done1, done2) = tokio::join!(run1.wait(), run2.wait());

        assert_eq!(done1.status, JobStatus::Success);
        assert_eq!(done2.status, JobStatus::Error);

        let history = store.load().await.unwrap();
        assert_eq!(history.len(), 2);
        for job in history {
            let expected = if job.workspace.directory == Some(ws1.clone()) {
                JobStatus::Success
            } else {
                JobStatus::Error
            };
            assert_eq!(job.status, expected);
        }
    }

    #[tokio::test]
    async fn test_terminate_replaces_diagnostics() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let exe = fake_model(
            root.path(),
            "slow.sh",
            "echo started\necho partial stderr >&2\nsleep 30",
        );
        let supervisor = ProcessSupervisor::new(test_config(root.path(), exe));
        let (mut job, validation) = ready_job(&ws);

        let mut handle = supervisor.start(&mut job, &validation).await.unwrap();
        while let Some(event) = handle.next_event().await {
            if matches!(event, JobEvent::Stderr(_)) {
                break;
            }
        }
        assert_eq!(handle.diagnostics(), "partial stderr\n");

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(handle.terminate().await.unwrap());

        let events = collect_events(&mut handle).await;
        assert!(matches!(
            events.last(),
            Some(JobEvent::Finished {
                status: JobStatus::Error,
                ..
            })
        ));
        assert_eq!(handle.status(), JobStatus::Error);
        assert_eq!(handle.diagnostics(), CANCEL_NOTICE);

        // A finished run cannot be canceled again
        assert!(!handle.terminate().await.unwrap());
        assert_eq!(handle.wait().await.status, JobStatus::Error);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_terminate_after_exit_is_noop() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let exe = fake_model(root.path(), "ok.sh", &finishing_model(&ws, 0));
        let supervisor = ProcessSupervisor::new(test_config(root.path(), exe));
        let (mut job, validation) = ready_job(&ws);

        let mut handle = supervisor.start(&mut job, &validation).await.unwrap();
        collect_events(&mut handle).await;

        assert!(!handle.terminate().await.unwrap());
        assert_eq!(handle.status(), JobStatus::Success);
        assert_eq!(handle.diagnostics(), "model warning\n");
    }

    #[tokio::test]
    async fn test_missing_logfile_is_reported() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let exe = fake_model(root.path(), "quiet.sh", "echo no log here\nexit 0");
        let config = test_config(root.path(), exe).with_timing(
            Duration::from_millis(200),
            Duration::from_millis(20),
            Duration::from_secs(1),
        );
        let supervisor = ProcessSupervisor::new(config);
        let (mut job, validation) = ready_job(&ws);

        let mut handle = supervisor.start(&mut job, &validation).await.unwrap();
        let events = collect_events(&mut handle).await;

        let unavailable = events
            .iter()
            .position(|e| *e == JobEvent::LogfileUnavailable)
            .unwrap();
        let finished = events
            .iter()
            .position(|e| matches!(e, JobEvent::Finished { .. }))
            .unwrap();
        assert!(unavailable < finished);
        assert_eq!(handle.wait().await.logfile, None);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let supervisor = ProcessSupervisor::new(test_config(root.path(), root.path().join("missing-invest")));
        let (mut job, validation) = ready_job(&ws);

        let result = supervisor.start(&mut job, &validation).await;
        assert!(matches!(result, Err(SupervisorError::Spawn { .. })));
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_refuses_invalid_or_unvalidated_args() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let supervisor = ProcessSupervisor::new(test_config(root.path(), PathBuf::from("/bin/true")));
        let (mut job, _) = ready_job(&ws);

        let unvalidated = ValidationState::new(&job.args_values);
        let result = supervisor.start(&mut job, &unvalidated).await;
        assert!(matches!(result, Err(SupervisorError::ValidationFailed { .. })));

        let issues = vec![ValidationIssue::new(["lulc_cur_path"], "File not found")];
        let invalid = validation::aggregate(&job.args_values, &issues);
        match supervisor.start(&mut job, &invalid).await {
            Err(SupervisorError::ValidationFailed { invalid }) => {
                assert_eq!(invalid, vec!["lulc_cur_path".to_string()]);
            }
            _ => panic!("expected ValidationFailed"),
        }

        let stale = validation::aggregate(&job.args_values, &[]);
        job.set_arg("lulc_cur_path", ArgValue::from("other.tif"));
        let result = supervisor.start(&mut job, &stale).await;
        assert!(matches!(result, Err(SupervisorError::StaleValidation)));

        assert_eq!(job.status, JobStatus::Unrun);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_refuses_missing_workspace() {
        let root = TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(test_config(root.path(), PathBuf::from("/bin/true")));

        let mut args = ArgsValues::new();
        args.insert("lulc_cur_path".to_string(), ArgValue::from("lulc.tif"));
        let mut job = JobRecord::new("carbon", None).with_args(args.clone());
        let result = supervisor
            .start(&mut job, &validation::aggregate(&args, &[]))
            .await;
        assert!(matches!(result, Err(SupervisorError::MissingWorkspace)));
        assert_eq!(job.status, JobStatus::Unrun);
    }

    #[tokio::test]
    async fn test_one_run_per_workspace_at_a_time() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let exe = fake_model(root.path(), "slow.sh", "echo started
sleep 30");
        let supervisor = ProcessSupervisor::new(test_config(root.path(), exe));

        let (mut first, validation) = ready_job(&ws);
        let mut handle = supervisor.start(&mut first, &validation).await.unwrap();
        let hash = first.workspace_hash().unwrap();
        assert!(supervisor.has_active_run(&hash));

        let (mut second, validation) = ready_job(&ws);
        let result = supervisor.start(&mut second, &validation).await;
        assert!(matches!(result, Err(SupervisorError::AlreadyRunning)));
        assert_eq!(second.status, JobStatus::Unrun);

        let other_ws = workspace(root.path(), "ws2");
        let (mut third, validation) = ready_job(&other_ws);
        let other = supervisor.start(&mut third, &validation).await.unwrap();
        assert!(other.terminate().await.unwrap());
        other.wait().await;

        assert!(handle.terminate().await.unwrap());
        collect_events(&mut handle).await;
        assert!(!supervisor.has_active_run(&hash));

        let (mut rerun, validation) = ready_job(&ws);
        let again = supervisor.start(&mut rerun, &validation).await.unwrap();
        assert!(again.terminate().await.unwrap());
        assert_eq!(again.wait().await.status, JobStatus::Error);
    }

    #[tokio::test]
    async fn test_running_status_from_history_does_not_block() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let store = JobStore::new(MemoryBackend::new(), 10);

        // Left behind by a launcher that died mid-run
        let (mut abandoned, _) = ready_job(&ws);
        abandoned.status = JobStatus::Running;
        store.upsert(&abandoned).await.unwrap();

        let mut loaded = store.load().await.unwrap().remove(0);
        assert_eq!(loaded.status, JobStatus::Running);
        let validation = validation::aggregate(&loaded.args_values, &[]);

        let exe = fake_model(root.path(), "ok.sh", &finishing_model(&ws, 0));
        let supervisor = ProcessSupervisor::new(test_config(root.path(), exe)).with_store(store.clone());
        let finished = supervisor
            .start(&mut loaded, &validation)
            .await
            .unwrap()
            .wait()
            .await;

        assert_eq!(finished.status, JobStatus::Success);
        assert_eq!(store.load().await.unwrap()[0].status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_scratch_failure_marks_job_error() {
        let root = TempDir::new().unwrap();
        let ws = workspace(root.path(), "ws1");
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config = test_config(root.path(), PathBuf::from("/bin/true")).with_temp_dir(blocker.join("scratch"));
        let supervisor = ProcessSupervisor::new(config);
        let (mut job, validation) = ready_job(&ws);

        let result = supervisor.start(&mut job, &validation).await;
        assert!(matches!(result, Err(SupervisorError::Scratch { .. })));
        assert_eq!(job.status, JobStatus::Error);
        assert!(!supervisor.has_active_run(&job.workspace_hash().unwrap()));
    }
}
