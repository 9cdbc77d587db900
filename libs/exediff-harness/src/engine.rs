/// Execution Engine - Abstraction for Running Test Executables
///
/// **Core Responsibility:**
/// Launch a pre-built test executable and capture its raw result.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local subprocess, or a stand-in in tests)
/// - Engine does NOT know where references live
/// - Engine does NOT compare anything
/// - Engine returns raw exit status and streams for the runner to judge
///
/// **Resource Rules:**
/// - The child is killed if its handle is dropped (`kill_on_drop`)
/// - A hard timeout kills and reaps the child
/// - The produced artifact is owned by an [`ArtifactGuard`] and removed on drop

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ExecutionFailure;

/// errno for "text file busy" on Linux and the BSDs
#[cfg(unix)]
const ETXTBSY: i32 = 26;

/// Launch attempts made while the executable is reported busy
const SPAWN_ATTEMPTS: u32 = 5;

/// How long to keep draining stdout/stderr once the child is gone
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// What to run, where, and for how long
#[derive(Debug, Clone)]
pub struct Invocation {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Raw result of one execution
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    /// `None` when the process was killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    pub timed_out: bool,
}

impl ExecutionOutput {
    /// Classify the raw result; only a clean exit with status 0 is success
    ///
    /// Timeout wins over everything else, then signal termination, then the
    /// exit code.
    pub fn check_status(&self, timeout_ms: u64) -> Result<(), ExecutionFailure> {
        if self.timed_out {
            return Err(ExecutionFailure::TimedOut { timeout_ms });
        }
        match self.exit_code {
            Some(0) => Ok(()),
            Some(code) => Err(ExecutionFailure::NonZeroExit {
                code,
                stderr: self.stderr.clone(),
            }),
            None => Err(ExecutionFailure::Terminated {
                stderr: self.stderr.clone(),
            }),
        }
    }
}

/// Swappable execution backend
///
/// `Err` is reserved for failures to run at all (missing executable, launch
/// failure); a process that ran and failed is reported through
/// [`ExecutionOutput`].
pub trait ExecutionEngine {
    fn execute(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<ExecutionOutput, ExecutionFailure>> + Send;
}

/// Runs executables as local child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessEngine;

impl ProcessEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionEngine for ProcessEngine {
    async fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutput, ExecutionFailure> {
        let path = &invocation.executable;
        if !path.is_file() {
            return Err(ExecutionFailure::ExecutableNotFound { path: path.clone() });
        }

        // Relative program paths are ambiguous once current_dir is set
        let program = tokio::fs::canonicalize(path)
            .await
            .map_err(|source| ExecutionFailure::Spawn {
                path: path.clone(),
                source,
            })?;

        let start_time = Instant::now();
        let mut child = spawn(&program, &invocation.working_dir)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => {
                    ExecutionFailure::ExecutableNotFound { path: path.clone() }
                }
                _ => ExecutionFailure::Spawn {
                    path: path.clone(),
                    source,
                },
            })?;

        debug!(
            executable = %program.display(),
            pid = child.id(),
            timeout_ms = invocation.timeout.as_millis() as u64,
            "Spawned test executable"
        );

        let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
        let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

        let waited = tokio::time::timeout(invocation.timeout, child.wait()).await;
        let (exit_code, timed_out) = match waited {
            Ok(status) => (status.map_err(ExecutionFailure::Wait)?.code(), false),
            Err(_) => {
                warn!(
                    executable = %program.display(),
                    timeout_ms = invocation.timeout.as_millis() as u64,
                    "Execution timed out, killing process"
                );
                // kill() also reaps the child
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out process");
                }
                (None, true)
            }
        };

        let stdout = drain(stdout_task).await;
        let stderr = drain(stderr_task).await;
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        debug!(
            exit_code = ?exit_code,
            timed_out,
            execution_ms = execution_time_ms,
            "Test executable finished"
        );

        Ok(ExecutionOutput {
            exit_code,
            stdout,
            stderr,
            execution_time_ms,
            timed_out,
        })
    }
}

async fn spawn(program: &Path, working_dir: &Path) -> std::io::Result<Child> {
    let mut attempts = 0;
    loop {
        let result = Command::new(program)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        match result {
            Err(e) if is_text_file_busy(&e) && attempts < SPAWN_ATTEMPTS => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            result => return result,
        }
    }
}

/// ETXTBSY: a freshly written executable is still open in a sibling process
/// forked between its write and our exec
fn is_text_file_busy(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(ETXTBSY)
    }
    #[cfg(not(unix))]
    {
        let _ = e;
        false
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to read child output");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Collect a pipe reader; a grandchild may keep the pipe open, so bound the wait
async fn drain(task: JoinHandle<String>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(PIPE_DRAIN_GRACE, task).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}

/// Artifact cleanup guard - guarantees the output file is removed on drop
///
/// Creating the guard also removes any stale file at the path, so output
/// left over from an earlier run can never satisfy a comparison.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: PathBuf,
    armed: bool,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed stale artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(Self { path, armed: true })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the artifact on disk after the guard goes away
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::test_support::write_script;

    fn invocation(dir: &Path, name: &str, timeout_ms: u64) -> Invocation {
        Invocation {
            executable: dir.join(name),
            working_dir: dir.to_path_buf(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn test_check_status() {
        let mut output = ExecutionOutput {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            execution_time_ms: 3,
            timed_out: false,
        };
        assert!(output.check_status(100).is_ok());

        output.exit_code = Some(2);
        assert!(matches!(
            output.check_status(100),
            Err(ExecutionFailure::NonZeroExit { code: 2, .. })
        ));

        output.exit_code = None;
        assert!(matches!(
            output.check_status(100),
            Err(ExecutionFailure::Terminated { .. })
        ));

        output.timed_out = true;
        assert!(matches!(
            output.check_status(100),
            Err(ExecutionFailure::TimedOut { timeout_ms: 100 })
        ));
    }

    #[test]
    fn test_guard_removes_stale_and_produced_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        std::fs::write(&path, b"stale").unwrap();

        let guard = ArtifactGuard::new(&path).unwrap();
        assert!(!path.exists(), "stale artifact must be removed up front");

        std::fs::write(&path, b"fresh").unwrap();
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_disarm_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let mut guard = ArtifactGuard::new(&path).unwrap();
        std::fs::write(guard.path(), b"keep me").unwrap();
        guard.disarm();
        drop(guard);
        assert!(path.exists());
    }

    #[test]
    fn test_guard_cleans_up_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");

        let result = std::panic::catch_unwind(|| {
            let guard = ArtifactGuard::new(&path).unwrap();
            std::fs::write(guard.path(), b"partial").unwrap();
            panic!("comparison blew up");
        });

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_text_file_busy_detection() {
        assert!(is_text_file_busy(&std::io::Error::from_raw_os_error(ETXTBSY)));
        assert!(!is_text_file_busy(&std::io::Error::from_raw_os_error(2)));
        assert!(!is_text_file_busy(&std::io::Error::new(std::io::ErrorKind::Other, "busy")));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProcessEngine::new()
            .execute(&invocation(dir.path(), "test_nope", 1000))
            .await;

        assert!(matches!(result, Err(ExecutionFailure::ExecutableNotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "test_streams", "echo out\necho err >&2\nexit 3\n");

        let output = ProcessEngine::new()
            .execute(&invocation(dir.path(), "test_streams", 5000))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert!(!output.timed_out);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "test_pwd", "printf data > produced.bin\n");

        let output = ProcessEngine::new()
            .execute(&invocation(dir.path(), "test_pwd", 5000))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(0));
        assert!(dir.path().join("produced.bin").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "test_sleepy", "exec sleep 30\n");

        let start = Instant::now();
        let output = ProcessEngine::new()
            .execute(&invocation(dir.path(), "test_sleepy", 200))
            .await
            .unwrap();

        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_not_runnable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_plain");
        std::fs::write(&path, "not a program").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let result = ProcessEngine::new()
            .execute(&invocation(dir.path(), "test_plain", 1000))
            .await;

        assert!(matches!(result, Err(ExecutionFailure::Spawn { .. })));
    }
}
