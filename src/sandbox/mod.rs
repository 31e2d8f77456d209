//! Resource-bounded command execution for agent tooling.
//!
//! A [`Sandbox`] owns a scratch working directory (`sandbox_` prefix)
//! that is removed recursively on drop, errors ignored — acquisition
//! always pairs with release.  Commands run as subprocesses under a
//! wall-clock timeout; in [`SandboxMode::Process`] the inherited
//! environment is scrubbed of sensitive keys, and in
//! [`SandboxMode::Container`] the command is wrapped in a container
//! launch with memory, CPU, network, and filesystem restrictions.
//!
//! [`SandboxPool`] keeps a fixed set of pre-initialized sandboxes
//! behind a claim/release contract; claims block until one is free.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Environment keys removed before a process-mode launch.
const SCRUBBED_ENV_KEYS: &[&str] = &[
    "AWS_SECRET_ACCESS_KEY",
    "AWS_ACCESS_KEY_ID",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "DATABASE_URL",
    "SECRET_KEY",
];

/// Extra launcher budget for container startup.
const CONTAINER_STARTUP_GRACE: Duration = Duration::from_secs(10);

// ── SandboxMode ────────────────────────────────────────────────────────

/// Isolation level for sandboxed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMode {
    /// Bare subprocess under a scratch cwd.
    None,
    /// Subprocess with a timeout wrapper and a scrubbed environment.
    Process,
    /// Container launch with resource and filesystem restrictions.
    Container,
}

impl std::fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Process => write!(f, "process"),
            Self::Container => write!(f, "container"),
        }
    }
}

// ── SandboxConfig ──────────────────────────────────────────────────────

/// Configuration for a [`Sandbox`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Isolation mode.
    pub mode: SandboxMode,
    /// Wall-clock execution budget in seconds.
    pub timeout_seconds: u64,
    /// Container memory limit in MiB.
    pub max_memory_mb: u64,
    /// Container CPU share as a percentage of one core.
    pub max_cpu_percent: u64,
    /// Whether the container gets network access.
    pub network_enabled: bool,
    /// Whether the container filesystem is read-only.
    pub filesystem_readonly: bool,
    /// Host paths mounted read-only into the container.
    pub allowed_paths: Vec<String>,
    /// Extra environment layered on top of the scrubbed base.
    pub environment: Vec<(String, String)>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::Process,
            timeout_seconds: 30,
            max_memory_mb: 512,
            max_cpu_percent: 50,
            network_enabled: false,
            filesystem_readonly: true,
            allowed_paths: Vec::new(),
            environment: Vec::new(),
        }
    }
}

// ── SandboxOutcome ─────────────────────────────────────────────────────

/// Result of one sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutcome {
    /// Whether the command exited zero.
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr, when non-empty.
    pub stderr: Option<String>,
    /// Exit code; `-1` on timeout or launch failure.
    pub exit_code: i32,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Launch/timeout error, when the command did not complete.
    pub error: Option<String>,
}

impl SandboxOutcome {
    fn failure(error: String, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: None,
            exit_code: -1,
            execution_time_ms: elapsed_ms,
            error: Some(error),
        }
    }
}

// ── SandboxError ───────────────────────────────────────────────────────

/// Errors raised while managing sandbox resources.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The scratch directory could not be created.
    #[error("failed to create sandbox working directory: {0}")]
    Workdir(#[from] std::io::Error),

    /// The pool has been shut down.
    #[error("sandbox pool is closed")]
    PoolClosed,
}

// ── Sandbox ────────────────────────────────────────────────────────────

/// One isolated execution environment.
///
/// The working directory lives as long as the sandbox; dropping the
/// sandbox removes it recursively, ignoring errors.
#[derive(Debug)]
pub struct Sandbox {
    config: SandboxConfig,
    workdir: TempDir,
}

impl Sandbox {
    /// Allocate a sandbox with its scratch directory.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Workdir`] when the directory cannot be
    /// created.
    pub fn create(config: SandboxConfig) -> Result<Self, SandboxError> {
        let workdir = tempfile::Builder::new().prefix("sandbox_").tempdir()?;
        tracing::info!(mode = %config.mode, dir = %workdir.path().display(), "sandbox initialized");
        Ok(Self { config, workdir })
    }

    /// The sandbox configuration.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Path of the scratch working directory.
    #[must_use]
    pub fn workdir(&self) -> &std::path::Path {
        self.workdir.path()
    }

    /// Execute `command` with `args`, feeding `input` to stdin when
    /// given.
    ///
    /// A non-container run is bounded to exactly the configured
    /// timeout; a container run receives an extra startup grace at the
    /// launcher.  Timeout always yields `success = false` and
    /// `exit_code = -1`.
    pub async fn execute(
        &self,
        command: &str,
        args: &[&str],
        input: Option<&str>,
    ) -> SandboxOutcome {
        let start = std::time::Instant::now();

        let (mut cmd, budget) = match self.config.mode {
            SandboxMode::None => {
                let mut cmd = Command::new(command);
                cmd.args(args).current_dir(self.workdir.path());
                (cmd, Duration::from_secs(self.config.timeout_seconds))
            }
            SandboxMode::Process => {
                // timeout(1) as a second line of defence under the
                // launcher-side budget.
                let mut cmd = Command::new("timeout");
                cmd.arg(self.config.timeout_seconds.to_string())
                    .arg(command)
                    .args(args)
                    .current_dir(self.workdir.path())
                    .env_clear()
                    .envs(self.scrubbed_env());
                (cmd, Duration::from_secs(self.config.timeout_seconds))
            }
            SandboxMode::Container => {
                let argv = self.container_argv(command, args);
                let mut cmd = Command::new(&argv[0]);
                cmd.args(&argv[1..]);
                (
                    cmd,
                    Duration::from_secs(self.config.timeout_seconds) + CONTAINER_STARTUP_GRACE,
                )
            }
        };

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return SandboxOutcome::failure(
                    e.to_string(),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        if let Some(input) = input
            && let Some(mut stdin) = child.stdin.take()
        {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::warn!(error = %e, "failed to write sandbox stdin");
            }
            drop(stdin);
        }

        match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                SandboxOutcome {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: (!stderr.is_empty()).then_some(stderr),
                    exit_code: output.status.code().unwrap_or(-1),
                    execution_time_ms: start.elapsed().as_millis() as u64,
                    error: None,
                }
            }
            Ok(Err(e)) => {
                SandboxOutcome::failure(e.to_string(), start.elapsed().as_millis() as u64)
            }
            Err(_elapsed) => {
                // The child is killed as its handle drops.
                tracing::warn!(command, "sandboxed command timed out");
                SandboxOutcome::failure(
                    format!(
                        "execution timed out after {}s",
                        self.config.timeout_seconds
                    ),
                    start.elapsed().as_millis() as u64,
                )
            }
        }
    }

    /// The process-mode environment: inherited, minus sensitive keys,
    /// plus the sandbox markers and configured additions.
    fn scrubbed_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = std::env::vars()
            .filter(|(key, _)| !SCRUBBED_ENV_KEYS.contains(&key.as_str()))
            .collect();
        env.push(("SANDBOX".to_string(), "1".to_string()));
        env.push(("SANDBOX_MODE".to_string(), self.config.mode.to_string()));
        env.extend(self.config.environment.iter().cloned());
        env
    }

    /// Assemble the container launch argv.
    fn container_argv(&self, command: &str, args: &[&str]) -> Vec<String> {
        let mut argv = vec![
            "docker".to_string(),
            "run".to_string(),
            "--rm".to_string(),
            format!("--memory={}m", self.config.max_memory_mb),
            format!("--cpus={}", self.config.max_cpu_percent as f64 / 100.0),
        ];

        if self.config.filesystem_readonly {
            argv.push("--read-only".to_string());
        }
        if !self.config.network_enabled {
            argv.push("--network=none".to_string());
        }

        for path in &self.config.allowed_paths {
            argv.push("-v".to_string());
            argv.push(format!("{path}:{path}:ro"));
        }

        argv.push("-v".to_string());
        argv.push(format!("{}:/workspace", self.workdir.path().display()));
        argv.push("-w".to_string());
        argv.push("/workspace".to_string());

        for (key, value) in &self.config.environment {
            argv.push("-e".to_string());
            argv.push(format!("{key}={value}"));
        }

        argv.push("alpine:latest".to_string());
        argv.push(command.to_string());
        argv.extend(args.iter().map(ToString::to_string));
        argv
    }
}

// ── SandboxPool ────────────────────────────────────────────────────────

/// Fixed-size pool of pre-initialized sandboxes.
///
/// [`claim`](Self::claim) blocks until a sandbox is free;
/// [`release`](Self::release) returns it without resetting the scratch
/// directory — scrubbing between uses is the caller's responsibility.
#[derive(Debug)]
pub struct SandboxPool {
    available: tokio::sync::Mutex<VecDeque<Sandbox>>,
    permits: tokio::sync::Semaphore,
    size: usize,
}

impl SandboxPool {
    /// Initialize a pool of `size` sandboxes sharing one configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Workdir`] if any scratch directory
    /// cannot be created; already-created sandboxes are released.
    pub fn initialize(size: usize, config: &SandboxConfig) -> Result<Self, SandboxError> {
        let mut sandboxes = VecDeque::with_capacity(size);
        for _ in 0..size {
            sandboxes.push_back(Sandbox::create(config.clone())?);
        }
        tracing::info!(size, "sandbox pool initialized");

        Ok(Self {
            available: tokio::sync::Mutex::new(sandboxes),
            permits: tokio::sync::Semaphore::new(size),
            size,
        })
    }

    /// Claim a sandbox, waiting until one is free.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::PoolClosed`] after
    /// [`shutdown`](Self::shutdown).
    pub async fn claim(&self) -> Result<Sandbox, SandboxError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SandboxError::PoolClosed)?;
        permit.forget();

        loop {
            if let Some(sandbox) = self.available.lock().await.pop_front() {
                return Ok(sandbox);
            }
            // A release is in flight between its permit add and its
            // queue push; yield until the sandbox lands.
            tokio::task::yield_now().await;
        }
    }

    /// Return a sandbox to the pool.
    pub async fn release(&self, sandbox: Sandbox) {
        self.available.lock().await.push_back(sandbox);
        self.permits.add_permits(1);
    }

    /// Configured pool size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Sandboxes currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Tear the pool down; queued sandboxes are dropped (removing their
    /// scratch directories) and future claims fail.
    pub async fn shutdown(&self) {
        self.permits.close();
        self.available.lock().await.clear();
        tracing::info!("sandbox pool shutdown complete");
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
