use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ProcessError;
use crate::ids::UserId;

use super::group::{self, ProcessGroup};
use super::registry::ActiveProcessRegistry;

/// Cooperative cancellation flag shared between a Job and every Process
/// Runner invocation it spawns.
pub type CancelToken = Arc<AtomicBool>;

pub struct RunOutcome {
    pub exit_code: Option<i32>,
}

/// Spawns a child process in its own process group, streams its stderr (and
/// optionally stdout) line-by-line to `on_line`, and guarantees a group kill
/// on timeout or cancellation.
pub struct ProcessRunner {
    registry: Arc<ActiveProcessRegistry>,
}

impl ProcessRunner {
    pub fn new(registry: Arc<ActiveProcessRegistry>) -> Self {
        Self { registry }
    }

    /// `capture_stdout` mirrors the downloader's need to read progress off
    /// stdout while the encoder only ever reads stderr.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        user: UserId,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
        cancel: &CancelToken,
        capture_stdout: bool,
        mut on_line: impl FnMut(&str),
    ) -> Result<RunOutcome, ProcessError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        group::configure_new_group(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
                program: program.to_string(),
                source,
            })?;
        let pid = child.id();
        group::register_child_in_group(pid);
        let process_group = ProcessGroup::of(pid);
        self.registry.register(user, process_group);

        let (tx, rx) = mpsc::channel::<String>();
        let stderr_tx = tx.clone();
        let stderr_handle = child
        .stderr
        .take()
        .map(|stderr| spawn_line_pump(stderr, stderr_tx));
        let stdout_handle = if capture_stdout {
            child.stdout.take().map(|stdout| spawn_line_pump(stdout, tx))
        } else {
            None
        };

        let start = Instant::now();
        let mut stderr_tail = String::new();
        let status = loop {
            if cancel.load(Ordering::SeqCst) {
                process_group.kill();
                let _ = child.wait();
                break None;
            }
            if let Some(timeout) = timeout
            && start.elapsed() >= timeout
            {
                process_group.kill();
                let _ = child.wait();
                self.registry.unregister(user, process_group);
                if let Some(handle) = stderr_handle {
                    let _ = handle.join();
                }
                if let Some(handle) = stdout_handle {
                    let _ = handle.join();
                }
                return Err(ProcessError::Timeout(timeout));
            }

            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(line) => {
                    append_tail(&mut stderr_tail, &line);
                    on_line(&line);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => {}
            }

            if let Ok(Some(status)) = child.try_wait() {
                break Some(status);
            }
        };

        // Drain any remaining buffered lines so `on_line` sees everything the
        // process wrote before exit.
        while let Ok(line) = rx.try_recv() {
            append_tail(&mut stderr_tail, &line);
            on_line(&line);
        }

        if let Some(handle) = stderr_handle {
            let _ = handle.join();
        }
        if let Some(handle) = stdout_handle {
            let _ = handle.join();
        }
        self.registry.unregister(user, process_group);

        let Some(status) = status else {
            return Err(ProcessError::Cancelled);
        };

        if !status.success() {
            return Err(ProcessError::NonZeroExit {
                    code: status.code(),
                    stderr_tail,
                });
        }

        Ok(RunOutcome {
                exit_code: status.code(),
            })
    }
}

fn append_tail(tail: &mut String, line: &str) {
    const MAX_TAIL: usize = 4096;
    tail.push_str(line);
    tail.push('\n');
    if tail.len() > MAX_TAIL {
        let start = tail.len() - MAX_TAIL;
        *tail = tail[start..].to_string();
    }
}

fn spawn_line_pump<R>(reader: R, tx: mpsc::Sender<String>) -> std::thread::JoinHandle<()>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
            let mut lines = BufReader::new(reader).lines();
            while let Some(Ok(line)) = lines.next() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(cancelled: bool) -> CancelToken {
        Arc::new(AtomicBool::new(cancelled))
    }

    #[test]
    fn run_captures_stdout_lines_in_order() {
        let runner = ProcessRunner::new(Arc::new(ActiveProcessRegistry::new()));
        let mut lines = Vec::new();
        let outcome = runner
        .run(
            UserId(1),
            "printf",
            &["one\ntwo\nthree\n".to_string()],
            None,
            &token(false),
            true,
            |line| lines.push(line.to_string()),
        )
        .unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn run_reports_nonzero_exit_with_stderr_tail() {
        let runner = ProcessRunner::new(Arc::new(ActiveProcessRegistry::new()));
        let err = runner
        .run(
            UserId(1),
            "sh",
            &["-c".to_string(), "echo boom 1>&2; exit 3".to_string()],
            None,
            &token(false),
            false,
            |_| {},
        )
        .unwrap_err();
        match err {
            ProcessError::NonZeroExit { code, stderr_tail } => {
                assert_eq!(code, Some(3));
                assert!(stderr_tail.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn run_honors_pre_set_cancel_token() {
        let runner = ProcessRunner::new(Arc::new(ActiveProcessRegistry::new()));
        let err = runner
        .run(
            UserId(1),
            "sleep",
            &["5".to_string()],
            None,
            &token(true),
            false,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Cancelled));
    }

    #[test]
    fn run_times_out_and_kills_process() {
        let runner = ProcessRunner::new(Arc::new(ActiveProcessRegistry::new()));
        let err = runner
        .run(
            UserId(1),
            "sleep",
            &["5".to_string()],
            Some(Duration::from_millis(100)),
            &token(false),
            false,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(_)));
    }
}
