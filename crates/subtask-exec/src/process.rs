use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use subtask_core::{ExecOptions, ExecOutcome, SubAgentExecutor};
use subtask_model::TaskId;

use crate::error::ExecError;
use crate::util::kill_graceful;

/// How the child process is launched for every task.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Program to execute (e.g. a headless agent CLI).
    pub program: String,
    /// Arguments prepended to every invocation.
    pub args: Vec<String>,
    /// Environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Fallback working directory when the task carries none.
    pub working_dir: Option<PathBuf>,
    /// Treat non-zero exit codes as task failure.
    pub fail_on_non_zero: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            program: String::new(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            fail_on_non_zero: true,
        }
    }
}

/// Executor that runs one child process per task.
///
/// The assembled prompt is written to the child's stdin; captured stdout is
/// the result payload, stderr stays inherited. The child is owned by an
/// inner spawned task, so cooperative cancellation tears it down even after
/// the engine stops polling the execute future.
pub struct ProcessExecutor {
    name: &'static str,
    cfg: ProcessConfig,
    in_flight: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl ProcessExecutor {
    pub fn new(cfg: ProcessConfig) -> Self {
        Self {
            name: "process",
            cfg,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[async_trait]
impl SubAgentExecutor for ProcessExecutor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_sub_agents(&self) -> bool {
        !self.cfg.program.is_empty()
    }

    async fn execute_sub_agent(
        &self,
        task_type: &str,
        prompt: &str,
        opts: ExecOptions,
    ) -> ExecOutcome {
        let start = Instant::now();
        let task_id = opts.task_id.clone();

        let token = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap()
            .insert(task_id.clone(), token.clone());

        trace!(task = %task_id, task_type, program = %self.cfg.program, "spawning child");
        let handle = tokio::spawn(run_child(
            self.cfg.clone(),
            prompt.to_string(),
            opts.working_dir.clone(),
            token,
        ));
        let joined = handle.await;

        self.in_flight.lock().unwrap().remove(&task_id);
        let duration_ms = start.elapsed().as_millis() as u64;

        match joined {
            Ok(Ok(output)) => ExecOutcome::success(task_id, Some(output), duration_ms),
            Ok(Err(e)) => ExecOutcome::failure(task_id, e.to_string(), duration_ms),
            Err(e) => ExecOutcome::failure(task_id, format!("executor task failed: {e}"), duration_ms),
        }
    }

    async fn cancel_sub_agent(&self, task_id: &TaskId) {
        // Remove, don't just signal: the engine may have stopped polling the
        // execute future, in which case its own cleanup never runs.
        if let Some(token) = self.in_flight.lock().unwrap().remove(task_id) {
            debug!(task = %task_id, "abort requested; cancelling child");
            token.cancel();
        }
    }
}

/// Runs to completion independently of the caller: owning the child here
/// means a kill still happens when the execute future is dropped mid-race.
async fn run_child(
    cfg: ProcessConfig,
    prompt: String,
    working_dir: Option<PathBuf>,
    token: CancellationToken,
) -> Result<String, ExecError> {
    if cfg.program.is_empty() {
        return Err(ExecError::MissingProgram);
    }

    let mut cmd = Command::new(&cfg.program);
    cmd.args(&cfg.args);
    if let Some(dir) = working_dir.or(cfg.working_dir) {
        cmd.current_dir(dir);
    }
    for (k, v) in &cfg.env {
        cmd.env(k, v);
    }
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;

    // A child that exits without consuming stdin closes the pipe; that is
    // its business, not a task failure.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(prompt.as_bytes()).await;
        let _ = stdin.shutdown().await;
    }

    let Some(stdout) = child.stdout.take() else {
        return Err(ExecError::Io("stdout not captured".to_string()));
    };
    let mut lines = BufReader::new(stdout).lines();
    let reader = tokio::spawn(async move {
        let mut out = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            out.push_str(&line);
            out.push('\n');
        }
        out
    });

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| ExecError::Io(e.to_string()))?;
            let output = reader.await.unwrap_or_default();

            if !status.success() && cfg.fail_on_non_zero {
                return match status.code() {
                    Some(code) => Err(ExecError::NonZeroExit { code }),
                    None => Err(ExecError::KilledBySignal),
                };
            }
            Ok(output.trim_end().to_string())
        }
        _ = token.cancelled() => {
            debug!("cancelled; killing child");
            kill_graceful(&mut child).await;
            reader.abort();
            Err(ExecError::Cancelled)
        }
    }
}
