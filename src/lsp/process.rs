use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;

use crate::utils::error::{BridgeError, Result};

/// Executable plus extra arguments used to launch the language server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    pub fn label(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// The pipes handed over to the transport.
pub struct ProcessIo {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// Owns the language server child process.
///
/// The child is killed when this handle is dropped.
pub struct LspProcess {
    program: String,
    pid: Option<u32>,
    /// Holds the child until [`LspProcess::watch_exit`] moves it into the
    /// watcher task.
    child: Mutex<Option<Child>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    terminated: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl LspProcess {
    pub fn start(working_dir: &Path, command: &ServerCommand) -> Result<(Self, ProcessIo)> {
        tracing::debug!(
            "Starting language server '{}' in {}",
            command.label(),
            working_dir.display()
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BridgeError::Spawn { program: command.program.clone(), source })?;

        let pid = child.id();
        tracing::info!("Language server '{}' started (pid: {pid:?})", command.program);

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(BridgeError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::other("child stdio pipes were not captured"),
            });
        };
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(command.program.clone(), stderr);
        }

        let process = Self {
            program: command.program.clone(),
            pid,
            child: Mutex::new(Some(child)),
            kill_tx: Mutex::new(None),
            terminated: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(true)),
        };
        Ok((process, ProcessIo { stdin, stdout }))
    }

    /// Start observing the child. `on_unexpected_exit` runs once if the child
    /// exits before [`LspProcess::terminate`] was called.
    pub fn watch_exit<F>(&self, on_unexpected_exit: F)
    where
        F: FnOnce(ExitStatus) + Send + 'static,
    {
        let Some(mut child) = self.child.lock().expect("child mutex poisoned").take() else {
            return;
        };
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        *self.kill_tx.lock().expect("kill_tx mutex poisoned") = Some(kill_tx);

        let terminated = Arc::clone(&self.terminated);
        let running = Arc::clone(&self.running);
        let program = self.program.clone();

        // A dropped sender also resolves `kill_rx`, so dropping the handle kills the child.
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    running.store(false, Ordering::SeqCst);
                    match status {
                        Ok(status) if !terminated.load(Ordering::SeqCst) => {
                            tracing::warn!("Language server '{program}' exited unexpectedly: {status}");
                            on_unexpected_exit(status);
                        }
                        Ok(status) => tracing::debug!("Language server '{program}' exited: {status}"),
                        Err(e) => tracing::warn!("Failed to wait on language server '{program}': {e}"),
                    }
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!("Kill of language server '{program}' failed: {e}");
                    }
                    running.store(false, Ordering::SeqCst);
                    tracing::debug!("Language server '{program}' killed");
                }
            }
        });
    }

    /// Kill the child. Calling this more than once is a no-op.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Terminating language server '{}' (pid: {:?})", self.program, self.pid);

        if let Some(kill_tx) = self.kill_tx.lock().expect("kill_tx mutex poisoned").take() {
            let _ = kill_tx.send(());
        } else if let Some(mut child) = self.child.lock().expect("child mutex poisoned").take() {
            let _ = child.start_kill();
            self.running.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for LspProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn forward_stderr(program: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::debug!(target: "lsp_bridge::server_stderr", "[{program}] {line}"),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Stopped reading stderr of '{program}': {e}");
                    break;
                }
            }
        }
    });
}
