//! A live engine process and the line protocol spoken over its pipes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use super::Engine;
use crate::config::BridgeConfig;
use crate::consts::EMPTY_OUTPUT_MESSAGE;
use crate::error::{BridgeError, Result};
use crate::protocol::{Request, Response};

/// Everything needed to launch one engine process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<PathBuf>,
    pub working_dir: PathBuf,
    pub startup_timeout: Duration,
    pub read_timeout: Option<Duration>,
}

impl LaunchSpec {
    /// `<program> <books> <users> <transactions>`, run from the project root.
    pub fn from_config(config: &BridgeConfig, program: PathBuf) -> Self {
        let working_dir = if config.project_root.is_dir() {
            config.project_root.clone()
        } else {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        };
        Self {
            program,
            args: config.engine_args().to_vec(),
            working_dir,
            startup_timeout: config.startup_timeout,
            read_timeout: config.read_timeout,
        }
    }
}

/// One running engine. Dropping it kills the process.
pub struct ProcessEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    read_timeout: Option<Duration>,
    dead: bool,
}

impl ProcessEngine {
    /// Spawn the engine and wait for its readiness banner.
    pub async fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::ProcessDied("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::ProcessDied("stdout not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, pid));
        }

        let mut stdout = BufReader::new(stdout).lines();
        let banner = match tokio::time::timeout(spec.startup_timeout, stdout.next_line()).await {
            Ok(line) => line?,
            Err(_) => {
                let _ = child.start_kill();
                return Err(BridgeError::ReadTimeout(spec.startup_timeout));
            }
        };
        match banner {
            Some(banner) => debug!(?pid, %banner, "engine ready"),
            None => {
                let _ = child.start_kill();
                return Err(BridgeError::NoBanner);
            }
        }

        Ok(Self {
            child,
            stdin,
            stdout,
            read_timeout: spec.read_timeout,
            dead: false,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Write one request line and read one response line.
    /// `Ok(None)` means the engine closed its output.
    pub async fn exchange(&mut self, request: &Request) -> Result<Option<String>> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BridgeError::ProcessDied(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| BridgeError::ProcessDied(e.to_string()))?;

        let read = self.stdout.next_line();
        let next = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| BridgeError::ReadTimeout(limit))?,
            None => read.await,
        };
        Ok(next?)
    }

    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        self.dead = true;
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "kill on a finished engine");
        }
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    fn name(&self) -> &str {
        "process"
    }

    fn pid(&self) -> Option<u32> {
        self.id()
    }

    fn is_alive(&mut self) -> bool {
        !self.dead && !self.has_exited()
    }

    async fn handle(&mut self, request: &Request) -> Response {
        match self.exchange(request).await {
            Ok(Some(line)) => Response::from_line(&line),
            Ok(None) => Response::failure(EMPTY_OUTPUT_MESSAGE),
            Err(e) => {
                if e.is_process_death() {
                    warn!(error = %e, action = %request.action, "engine lost mid-request");
                    self.kill();
                }
                Response::failure(e.to_string())
            }
        }
    }
}

async fn drain_stderr(stderr: ChildStderr, pid: Option<u32>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(?pid, "engine stderr: {line}");
    }
}
