//! Streamed command execution with timeout kill
//!
//! The child's stdout and stderr share one pipe. A dedicated reader thread
//! splits the pipe into lines and sends them over an unbounded channel; the
//! [`LineStream`] hands them to the caller one at a time while watching the
//! deadline. The channel closing is the end-of-stream signal: it only happens
//! once the reader has seen end-of-file and every line it sent has been
//! received, so no output is lost when the child exits between two reads.

use std::io::{BufRead, BufReader, PipeReader};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::command::{exit_code_of, merged_pipe, CommandSpec, ExecOptions};
use crate::error::ExecError;

/// Lines of a running command, in the order the command wrote them
///
/// Dropping the stream kills the child. With a timeout set the child runs in
/// its own process group, and the timeout or a drop kills the whole group.
#[derive(Debug)]
pub struct LineStream {
    command: String,
    options: ExecOptions,
    child: Child,
    own_group: bool,
    lines: mpsc::UnboundedReceiver<String>,
    reader: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
    killed: bool,
    done: bool,
    exit_code: Option<i32>,
    transcript: Vec<String>,
}

enum Next {
    Line(Option<String>),
    Deadline,
}

impl LineStream {
    /// Wait for the next line
    ///
    /// Returns `Ok(None)` once the command has exited, all of its output has
    /// been delivered and its exit code passed the check. Line terminators
    /// are stripped.
    ///
    /// # Errors
    /// * `ExecError::UnexpectedExitCode` - The exit code is neither the
    ///   expected one nor the kill exit code
    /// * `ExecError::TimeoutKill` - The deadline killed the command and
    ///   `fail_on_timeout` is set
    /// * `ExecError::Io` - Waiting for the child failed
    pub async fn next_line(&mut self) -> Result<Option<String>, ExecError> {
        if self.done {
            return Ok(None);
        }

        loop {
            let next = match self.pending_deadline() {
                Some(deadline) => tokio::select! {
                    line = self.lines.recv() => Next::Line(line),
                    _ = tokio::time::sleep_until(deadline) => Next::Deadline,
                },
                None => Next::Line(self.lines.recv().await),
            };

            match next {
                Next::Line(Some(line)) => {
                    self.transcript.push(line.clone());
                    return Ok(Some(line));
                }
                Next::Line(None) => {
                    // Only mark done once finish resolves, so a cancelled
                    // call still checks the exit code on the next one
                    let result = self.finish().await;
                    self.done = true;
                    return result.map(|()| None);
                }
                Next::Deadline => self.kill_on_timeout(),
            }
        }
    }

    /// Drain the stream and return every line
    pub async fn collect_lines(mut self) -> Result<Vec<String>, ExecError> {
        while self.next_line().await?.is_some() {}
        Ok(std::mem::take(&mut self.transcript))
    }

    /// Command line being executed
    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id, while the child has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Lines delivered so far
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Whether the deadline passed and the child was killed
    pub fn timed_out(&self) -> bool {
        self.killed
    }

    /// Exit code, once the stream has finished
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn pending_deadline(&self) -> Option<Instant> {
        if self.killed {
            None
        } else {
            self.deadline
        }
    }

    /// Kill the child; the stream keeps draining whatever it already wrote
    fn kill_on_timeout(&mut self) {
        self.killed = true;
        tracing::warn!(
            "Killed by timeout after {:.1}s: {}",
            self.options.timeout.as_secs_f64(),
            self.command
        );
        if self.kill_group() {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("Failed to kill {}: {}", self.command, e);
        }
    }

    /// SIGKILL the child's process group; false when there is none to kill
    #[cfg(unix)]
    fn kill_group(&self) -> bool {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // A reaped child's group id may already be reused
        let Some(pid) = self.child.id().filter(|_| self.own_group) else {
            return false;
        };
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to kill process group of {}: {}", self.command, e);
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) -> bool {
        false
    }

    /// Wait for the child to exit, killing it if the deadline passes first
    async fn wait_child(&mut self) -> std::io::Result<std::process::ExitStatus> {
        if let Some(deadline) = self.pending_deadline() {
            let exited = tokio::select! {
                status = self.child.wait() => Some(status),
                _ = tokio::time::sleep_until(deadline) => None,
            };
            match exited {
                Some(status) => return status,
                None => self.kill_on_timeout(),
            }
        }
        self.child.wait().await
    }

    async fn finish(&mut self) -> Result<(), ExecError> {
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::warn!("Output reader for {} panicked", self.command);
            }
        }

        let status = match self.wait_child().await {
            Ok(status) => status,
            Err(source) => {
                return Err(ExecError::Io {
                    command: self.command.clone(),
                    output: self.transcript.join("\n"),
                    source,
                })
            }
        };
        let exit_code = exit_code_of(status);
        self.exit_code = Some(exit_code);

        tracing::debug!("{} exited with code {}", self.command, exit_code);

        if self.killed && self.options.fail_on_timeout && exit_code == self.options.kill_exit_code
        {
            return Err(ExecError::TimeoutKill {
                command: self.command.clone(),
                timeout_secs: self.options.timeout.as_secs_f64(),
                exit_code,
                output: self.transcript.join("\n"),
            });
        }

        if let Some(expected) = self.options.expected_exit_code {
            if exit_code != expected && exit_code != self.options.kill_exit_code {
                return Err(ExecError::UnexpectedExitCode {
                    message: self.options.error_message.clone(),
                    command: self.command.clone(),
                    exit_code,
                    output: self.transcript.join("\n"),
                });
            }
        }

        Ok(())
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        // kill_on_drop only reaches the direct child
        if self.exit_code.is_none() {
            self.kill_group();
        }
    }
}

/// Start a command and stream its merged output line by line
///
/// A non-zero `options.timeout` sets a deadline measured from launch; when
/// it passes, the child is killed. The deadline also covers a child that
/// closed its output but keeps running. On Unix a timed child is started in
/// a new process group so the kill reaches anything it spawned.
///
/// # Errors
/// * `ExecError::LaunchFailure` - If the command couldn't be spawned
/// * `ExecError::Io` - If the reader thread couldn't be started
pub async fn exec_streaming(
    spec: &CommandSpec,
    options: &ExecOptions,
) -> Result<LineStream, ExecError> {
    let command_str = spec.to_string();

    let launch_failure = |source| ExecError::LaunchFailure {
        executable: spec.executable().to_string(),
        command: command_str.clone(),
        source,
    };

    let mut std_cmd = spec.std_command(options);
    let pipe = merged_pipe(&mut std_cmd).map_err(launch_failure)?;

    let own_group = cfg!(unix) && !options.timeout.is_zero();
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        if own_group {
            std_cmd.process_group(0);
        }
    }

    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    tracing::debug!("Executing streamed: {}", command_str);

    let child = cmd.spawn().map_err(launch_failure)?;
    // Release our copies of the pipe's write end
    drop(cmd);

    let (tx, rx) = mpsc::unbounded_channel();
    let reader = spawn_reader(pipe, tx).map_err(|source| ExecError::Io {
        command: command_str.clone(),
        output: String::new(),
        source,
    })?;

    let deadline = if options.timeout.is_zero() {
        None
    } else {
        Some(Instant::now() + options.timeout)
    };

    Ok(LineStream {
        command: command_str,
        options: options.clone(),
        child,
        own_group,
        lines: rx,
        reader: Some(reader),
        deadline,
        killed: false,
        done: false,
        exit_code: None,
        transcript: Vec::new(),
    })
}

/// Start `executable` with `args` and stream its output
///
/// A zero `timeout` never kills; `expected_exit_code` of `None` accepts any
/// exit code.
pub async fn run_async<S: AsRef<str>>(
    executable: &str,
    args: &[S],
    timeout: Duration,
    error_message: &str,
    expected_exit_code: Option<i32>,
) -> Result<LineStream, ExecError> {
    let spec = CommandSpec::new(executable, args.iter().map(|a| a.as_ref()));
    let options = ExecOptions::default()
        .with_timeout(timeout)
        .with_error_message(error_message)
        .with_expected_exit_code(expected_exit_code);

    exec_streaming(&spec, &options).await
}

/// Read lines from the pipe until end-of-file, sending each to `tx`
///
/// The sender is dropped when the thread ends, closing the channel.
fn spawn_reader(
    pipe: PipeReader,
    tx: mpsc::UnboundedSender<String>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("procwrap-reader".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::with_capacity(4096);

            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
                        if tx.send(line).is_err() {
                            // Stream dropped
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("Error reading output: {}", e);
                        break;
                    }
                }
            }
        })
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"abc\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc"), b"abc");
        assert_eq!(trim_line_ending(b"\n"), b"");
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;
        use std::time::Instant as StdInstant;

        fn sh(script: &str) -> CommandSpec {
            CommandSpec::new("sh", ["-c", script])
        }

        #[tokio::test]
        async fn test_streams_lines_in_order() {
            let spec = sh("for i in 1 2 3 4 5; do echo line$i; done");
            let lines = exec_streaming(&spec, &ExecOptions::default())
                .await
                .unwrap()
                .collect_lines()
                .await
                .unwrap();

            assert_eq!(lines, vec!["line1", "line2", "line3", "line4", "line5"]);
        }

        #[tokio::test]
        async fn test_streams_merged_stderr() {
            let spec = sh("echo out; echo err 1>&2; echo last");
            let lines = exec_streaming(&spec, &ExecOptions::default())
                .await
                .unwrap()
                .collect_lines()
                .await
                .unwrap();

            assert_eq!(lines, vec!["out", "err", "last"]);
        }

        #[tokio::test]
        async fn test_last_line_without_newline() {
            let spec = sh("printf 'first\\nno-newline'");
            let lines = exec_streaming(&spec, &ExecOptions::default())
                .await
                .unwrap()
                .collect_lines()
                .await
                .unwrap();

            assert_eq!(lines, vec!["first", "no-newline"]);
        }

        #[tokio::test]
        async fn test_lines_arrive_before_exit() {
            let spec = sh("echo ready; sleep 1; echo finished");
            let mut stream = exec_streaming(&spec, &ExecOptions::default())
                .await
                .unwrap();

            let start = StdInstant::now();
            let first = stream.next_line().await.unwrap();
            assert_eq!(first.as_deref(), Some("ready"));
            assert!(start.elapsed() < Duration::from_millis(900));
            assert!(stream.exit_code().is_none());

            assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("finished"));
            assert_eq!(stream.next_line().await.unwrap(), None);
            assert_eq!(stream.exit_code(), Some(0));
        }

        #[tokio::test]
        async fn test_finished_stream_keeps_returning_none() {
            let mut stream = exec_streaming(&sh("true"), &ExecOptions::default())
                .await
                .unwrap();

            assert_eq!(stream.next_line().await.unwrap(), None);
            assert_eq!(stream.next_line().await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_unexpected_exit_code() {
            let spec = sh("echo one; echo two; exit 4");
            let options = ExecOptions::default().with_error_message("stream failed");
            let result = exec_streaming(&spec, &options)
                .await
                .unwrap()
                .collect_lines()
                .await;

            match result {
                Err(ExecError::UnexpectedExitCode {
                    message,
                    exit_code,
                    output,
                    ..
                }) => {
                    assert_eq!(message, "stream failed");
                    assert_eq!(exit_code, 4);
                    assert_eq!(output, "one\ntwo");
                }
                other => panic!("Expected UnexpectedExitCode, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_any_exit_code_accepted_without_expectation() {
            let mut stream = run_async("sh", &["-c", "echo x; exit 7"], Duration::ZERO, "", None)
                .await
                .unwrap();

            assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("x"));
            assert_eq!(stream.next_line().await.unwrap(), None);
            assert_eq!(stream.exit_code(), Some(7));
        }

        #[tokio::test]
        async fn test_timeout_kills_and_tolerates_kill_code() {
            let spec = sh("echo started; exec sleep 10");
            let options = ExecOptions::default().with_timeout(Duration::from_millis(300));

            let start = StdInstant::now();
            let mut stream = exec_streaming(&spec, &options).await.unwrap();
            let mut lines = Vec::new();
            while let Some(line) = stream.next_line().await.unwrap() {
                lines.push(line);
            }

            assert_eq!(lines, vec!["started"]);
            assert!(stream.timed_out());
            assert_eq!(stream.exit_code(), Some(-9));
            assert!(start.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_timeout_kills_child_that_closed_its_output() {
            let spec = sh("echo hi; exec >/dev/null 2>&1; sleep 6; exit 3");
            let options = ExecOptions::default().with_timeout(Duration::from_millis(500));

            let start = StdInstant::now();
            let mut stream = exec_streaming(&spec, &options).await.unwrap();
            assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("hi"));
            assert_eq!(stream.next_line().await.unwrap(), None);

            assert!(stream.timed_out());
            assert_eq!(stream.exit_code(), Some(-9));
            assert!(start.elapsed() < Duration::from_secs(4));
        }

        #[tokio::test]
        async fn test_timeout_kills_background_children() {
            // Without `exec` the sleeping grandchild holds the pipe open
            let spec = sh("echo started; sleep 30");
            let options = ExecOptions::default().with_timeout(Duration::from_millis(300));

            let start = StdInstant::now();
            let lines = exec_streaming(&spec, &options)
                .await
                .unwrap()
                .collect_lines()
                .await
                .unwrap();

            assert_eq!(lines, vec!["started"]);
            assert!(start.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_cancelled_wait_still_checks_exit_code() {
            let spec = sh("exec >/dev/null 2>&1; sleep 1; exit 3");
            let mut stream = exec_streaming(&spec, &ExecOptions::default())
                .await
                .unwrap();

            let first =
                tokio::time::timeout(Duration::from_millis(300), stream.next_line()).await;
            assert!(first.is_err(), "command should still be running");

            match stream.next_line().await {
                Err(ExecError::UnexpectedExitCode { exit_code, .. }) => assert_eq!(exit_code, 3),
                other => panic!("Expected UnexpectedExitCode, got {:?}", other),
            }
            assert_eq!(stream.exit_code(), Some(3));
            assert_eq!(stream.next_line().await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_zero_timeout_never_kills() {
            let spec = sh("sleep 0.5; echo done");
            let lines = exec_streaming(&spec, &ExecOptions::default().with_timeout(Duration::ZERO))
                .await
                .unwrap()
                .collect_lines()
                .await
                .unwrap();

            assert_eq!(lines, vec!["done"]);
        }

        #[tokio::test]
        async fn test_generous_timeout_does_not_kill() {
            let spec = sh("echo quick");
            let mut stream = exec_streaming(&spec, &ExecOptions::default().with_timeout_secs(30))
                .await
                .unwrap();

            while stream.next_line().await.unwrap().is_some() {}
            assert!(!stream.timed_out());
            assert_eq!(stream.exit_code(), Some(0));
        }

        #[tokio::test]
        async fn test_fail_on_timeout() {
            let options = ExecOptions::default()
                .with_timeout(Duration::from_millis(200))
                .with_fail_on_timeout(true);
            let result = exec_streaming(&CommandSpec::new("sleep", ["10"]), &options)
                .await
                .unwrap()
                .collect_lines()
                .await;

            match result {
                Err(err @ ExecError::TimeoutKill { .. }) => assert_eq!(err.exit_code(), -9),
                other => panic!("Expected TimeoutKill, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_kill_exit_code_is_configurable() {
            // With -15 tolerated instead of -9, a SIGKILL is an unexpected exit
            let options = ExecOptions::default()
                .with_timeout(Duration::from_millis(200))
                .with_kill_exit_code(-15);
            let result = exec_streaming(&CommandSpec::new("sleep", ["10"]), &options)
                .await
                .unwrap()
                .collect_lines()
                .await;

            match result {
                Err(ExecError::UnexpectedExitCode { exit_code, .. }) => assert_eq!(exit_code, -9),
                other => panic!("Expected UnexpectedExitCode, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_launch_failure() {
            let result = run_async::<&str>(
                "nonexistent_command_12345",
                &[],
                Duration::ZERO,
                "unused",
                Some(0),
            )
            .await;

            match result {
                Err(ExecError::LaunchFailure {
                    executable,
                    command,
                    ..
                }) => {
                    assert_eq!(executable, "nonexistent_command_12345");
                    assert_eq!(command, "nonexistent_command_12345");
                }
                other => panic!("Expected LaunchFailure, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_dropping_stream_early_does_not_hang() {
            let mut stream = exec_streaming(&CommandSpec::new("yes", Vec::<String>::new()), &ExecOptions::default())
                .await
                .unwrap();

            assert_eq!(stream.next_line().await.unwrap().as_deref(), Some("y"));
            assert!(stream.id().is_some());
            drop(stream);
        }

        #[tokio::test]
        async fn test_transcript_tracks_delivered_lines() {
            let mut stream = exec_streaming(&sh("echo a; echo b"), &ExecOptions::default())
                .await
                .unwrap();

            stream.next_line().await.unwrap();
            assert_eq!(stream.transcript(), ["a"]);
            stream.next_line().await.unwrap();
            assert_eq!(stream.transcript(), ["a", "b"]);
            assert!(stream.command().starts_with("sh -c"));
        }
    }
}
