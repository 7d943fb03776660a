use super::slot::{TransferSlot, send_kill, send_terminate};
use super::stats::parse_stats;
use super::{Transfer, TransferOutcome, TransferRequest};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Bytes of combined output kept per run; the summary and errors are at the end
const OUTPUT_TAIL_BYTES: usize = 256 * 1024;

/// How long a process gets to honor SIGTERM after the runtime cap fires
const KILL_GRACE: Duration = Duration::from_secs(30);

/// Runs rsync as a subprocess
#[derive(Debug, Clone)]
pub struct RsyncExecutor {
    program: PathBuf,
    max_runtime: Option<Duration>,
}

impl RsyncExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            max_runtime: None,
        }
    }

    /// Cap the wall-clock duration of a single run
    pub fn with_max_runtime(mut self, max_runtime: Option<Duration>) -> Self {
        self.max_runtime = max_runtime.filter(|d| !d.is_zero());
        self
    }

    /// Command line for one run, program excluded
    pub fn arguments(request: &TransferRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-avHz",
            "--delete",
            "--delete-delay",
            "--delay-updates",
            "--stats",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push(format!("--timeout={}", request.timeout.as_secs()).into());
        if request.bandwidth_limit_kbs > 0 {
            args.push(format!("--bwlimit={}", request.bandwidth_limit_kbs).into());
        }

        args.push(OsString::from(&request.source));
        args.push(request.destination.clone().into_os_string());
        args
    }
}

impl Transfer for RsyncExecutor {
    async fn execute(&self, request: &TransferRequest, slot: &TransferSlot) -> TransferOutcome {
        if let Err(e) = tokio::fs::create_dir_all(&request.destination).await {
            tracing::error!(
                target: "transfer",
                mirror = %request.label,
                destination = %request.destination.display(),
                error = %e,
                "Failed to create destination directory"
            );
            return TransferOutcome::failed_to_launch(format!(
                "Failed to create destination {}: {e}",
                request.destination.display()
            ));
        }

        let mut command = Command::new(&self.program);
        command
            .args(Self::arguments(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            target: "transfer",
            mirror = %request.label,
            source = %request.source,
            destination = %request.destination.display(),
            bwlimit = request.bandwidth_limit_kbs,
            timeout_secs = request.timeout.as_secs(),
            "Starting transfer"
        );

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(
                    target: "transfer",
                    mirror = %request.label,
                    program = %self.program.display(),
                    error = %e,
                    "Failed to launch transfer"
                );
                return TransferOutcome::failed_to_launch(format!(
                    "Failed to launch {}: {e}",
                    self.program.display()
                ));
            }
        };

        let pid = child.id();
        let _registration = slot.occupy(pid);

        let stdout = child.stdout.take().map(pipe_lines);
        let stderr = child.stderr.take().map(pipe_lines);
        let mut output = OutputTail::new(OUTPUT_TAIL_BYTES);
        let mut timed_out = false;

        let status = {
            let run = async {
                let mut merged = stream::select(
                    stdout.unwrap_or_else(|| stream::empty().boxed()),
                    stderr.unwrap_or_else(|| stream::empty().boxed()),
                );
                while let Some(line) = merged.next().await {
                    output.push(&line);
                }
                child.wait().await
            };
            tokio::pin!(run);

            match self.max_runtime {
                None => run.await,
                Some(limit) => tokio::select! {
                    status = &mut run => status,
                    _ = tokio::time::sleep(limit) => {
                        timed_out = true;
                        tracing::warn!(
                            target: "transfer",
                            mirror = %request.label,
                            limit_secs = limit.as_secs(),
                            "Transfer exceeded its maximum runtime, terminating"
                        );
                        if let Some(pid) = pid {
                            send_terminate(pid);
                        }
                        tokio::select! {
                            status = &mut run => status,
                            _ = tokio::time::sleep(KILL_GRACE) => {
                                if let Some(pid) = pid {
                                    send_kill(pid);
                                }
                                run.await
                            }
                        }
                    }
                },
            }
        };

        let mut output = output.into_string();
        if timed_out {
            if let Some(limit) = self.max_runtime {
                output.push_str(&format!(
                    "\nTransfer terminated after exceeding the maximum runtime of {} seconds\n",
                    limit.as_secs()
                ));
            }
        }

        let success = match &status {
            Ok(status) => status.success() && !timed_out,
            Err(e) => {
                output.push_str(&format!("\nFailed to wait for transfer process: {e}\n"));
                false
            }
        };

        let exit_code = status.as_ref().ok().and_then(|s| s.code());
        if success {
            tracing::info!(target: "transfer", mirror = %request.label, "Transfer finished");
        } else {
            tracing::warn!(
                target: "transfer",
                mirror = %request.label,
                exit_code = ?exit_code,
                timed_out,
                "Transfer failed"
            );
        }

        let stats = parse_stats(&output);
        TransferOutcome {
            success,
            output,
            stats,
        }
    }
}

/// Line stream over one pipe; read errors end the stream
fn pipe_lines<R>(reader: R) -> BoxStream<'static, Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(BufReader::new(reader), |mut reader| async move {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => None,
            Ok(_) => Some((line, reader)),
            Err(e) => {
                tracing::debug!(target: "transfer", error = %e, "Stopped reading transfer output");
                None
            }
        }
    })
    .boxed()
}

/// Bounded buffer keeping the most recent bytes of output
struct OutputTail {
    buf: VecDeque<u8>,
    limit: usize,
}

impl OutputTail {
    fn new(limit: usize) -> Self {
        Self {
            buf: VecDeque::new(),
            limit,
        }
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes);
        if self.buf.len() > self.limit {
            let excess = self.buf.len() - self.limit;
            self.buf.drain(..excess);
        }
    }

    fn into_string(self) -> String {
        let bytes: Vec<u8> = self.buf.into();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
