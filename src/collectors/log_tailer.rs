use crate::error::CollectorError;
use crate::events::LogRecord;
use crate::monitoring::PipelineStats;
use log::{debug, error, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const INITIAL_RESTART_DELAY: Duration = Duration::from_secs(1);
const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);

/// Longest partial line kept while waiting for its newline
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Backoff step between two `tail` restarts, capped at one minute
fn next_restart_delay(current: Duration) -> Duration {
    std::cmp::min(current.saturating_mul(2), MAX_RESTART_DELAY)
}

/// Follows an access log file and forwards parsed records
///
/// Runs `tail -F -n 0 <path>` in a background thread, so only lines appended
/// after start are seen and log rotation is followed by name. Each complete
/// line is parsed into a [`LogRecord`] and sent over the channel in file
/// order; malformed lines are reported and skipped, as are lines longer than
/// 64 KiB. If `tail` exits, it is restarted with exponential backoff until the
/// tailer is stopped.
pub struct LogTailer {
    /// File being followed
    path: PathBuf,
    /// Channel to send parsed records
    output_channel: Sender<LogRecord>,
    stats: Arc<PipelineStats>,
    /// Handle to the background thread
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

/// Why a single `tail` run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// The tailer was asked to stop
    Stopped,
    /// The subprocess closed its stdout
    Eof,
    /// Nobody is listening for records anymore
    ReceiverClosed,
}

/// Outcome of waiting for the log source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Found,
    /// Shutdown was requested while waiting
    Interrupted,
}

/// Poll until `path` exists
///
/// Checks up to `attempts` times, sleeping `interval` between checks, and
/// gives up early if `shutdown` is set.
///
/// # Errors
///
/// Returns `CollectorError::SourceUnavailable` if the file never appears.
pub fn wait_for_source(
    path: &Path,
    attempts: u32,
    interval: Duration,
    shutdown: &AtomicBool,
) -> Result<SourceStatus, CollectorError> {
    info!("Waiting for log file to be created: {}", path.display());

    for attempt in 1..=attempts {
        if shutdown.load(Ordering::SeqCst) {
            return Ok(SourceStatus::Interrupted);
        }
        if path.exists() {
            info!("Log file found: {}", path.display());
            return Ok(SourceStatus::Found);
        }
        debug!("Log file not there yet (attempt {}/{})", attempt, attempts);
        if attempt < attempts {
            thread::sleep(interval);
        }
    }

    Err(CollectorError::SourceUnavailable {
        path: path.display().to_string(),
        attempts,
    })
}

impl LogTailer {
    /// Create a new LogTailer for the given file
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::sync::{mpsc, Arc};
    /// use poolwatch::collectors::LogTailer;
    /// use poolwatch::monitoring::PipelineStats;
    ///
    /// let (tx, rx) = mpsc::channel();
    /// let tailer = LogTailer::new(
    ///     "/var/log/nginx/access.log".into(),
    ///     tx,
    ///     Arc::new(PipelineStats::new()),
    /// );
    /// ```
    pub fn new(path: PathBuf, channel: Sender<LogRecord>, stats: Arc<PipelineStats>) -> Self {
        Self {
            path,
            output_channel: channel,
            stats,
            thread_handle: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start following the file
    ///
    /// The first `tail` subprocess is spawned before returning so a missing
    /// `tail` binary is reported right away. The thread is created first and
    /// then handed the child, so a failure on either side never leaves a
    /// `tail` process behind.
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::SubprocessSpawn` if `tail` cannot be started.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(()); // Already running
        }

        let (child_sender, child_receiver) = mpsc::sync_channel::<Child>(1);
        let path = self.path.clone();
        let channel = self.output_channel.clone();
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("log-tailer".to_string())
            .spawn(move || {
                // No child means start() gave up
                let Ok(first_child) = child_receiver.recv() else {
                    return;
                };
                Self::tailer_thread(path, first_child, channel, stats, running);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CollectorError::IoError(e));
            }
        };

        let child = match Self::spawn_tail(&self.path) {
            Ok(child) => child,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                drop(child_sender);
                let _ = handle.join();
                return Err(e);
            }
        };

        if let Err(mpsc::SendError(mut child)) = child_sender.send(child) {
            let _ = child.kill();
            let _ = child.wait();
            self.running.store(false, Ordering::SeqCst);
            let _ = handle.join();
            return Err(CollectorError::SubprocessTerminated(
                "Tailer thread exited before start".to_string(),
            ));
        }

        self.thread_handle = Some(handle);
        info!("LogTailer started on {}", self.path.display());
        Ok(())
    }

    /// Stop following the file
    ///
    /// Signals the background thread, which kills the `tail` subprocess, and
    /// waits for it to finish.
    pub fn stop(&mut self) -> Result<(), CollectorError> {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            handle.join().map_err(|_| {
                CollectorError::SubprocessTerminated("Failed to join tailer thread".to_string())
            })?;
            info!("LogTailer stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Main tailer thread function
    fn tailer_thread(
        path: PathBuf,
        first_child: Child,
        channel: Sender<LogRecord>,
        stats: Arc<PipelineStats>,
        running: Arc<AtomicBool>,
    ) {
        let mut restart_delay = INITIAL_RESTART_DELAY;
        let mut next_child = Some(first_child);

        while running.load(Ordering::SeqCst) {
            let spawned = match next_child.take() {
                Some(child) => Ok(child),
                None => Self::spawn_tail(&path),
            };

            match spawned {
                Ok(mut child) => {
                    let started = Instant::now();
                    let result = Self::process_stream(&mut child, &channel, &stats, &running);

                    if let Err(e) = child.kill() {
                        debug!("tail subprocess already gone: {}", e);
                    }
                    let _ = child.wait();

                    match result {
                        Ok(StreamEnd::Stopped) => break,
                        Ok(StreamEnd::ReceiverClosed) => {
                            info!("Record receiver closed, stopping tailer");
                            break;
                        }
                        Ok(StreamEnd::Eof) => warn!("tail subprocess exited"),
                        Err(e) => error!("Error reading from tail: {}", e),
                    }

                    // A long healthy run earns a fresh backoff
                    if started.elapsed() >= MAX_RESTART_DELAY {
                        restart_delay = INITIAL_RESTART_DELAY;
                    }
                }
                Err(e) => error!("Failed to spawn tail subprocess: {}", e),
            }

            if !running.load(Ordering::SeqCst) {
                break;
            }

            warn!("Restarting tail in {:?}", restart_delay);
            Self::sleep_while_running(restart_delay, &running);
            restart_delay = next_restart_delay(restart_delay);
        }

        running.store(false, Ordering::SeqCst);
        info!("Log tailer thread finished");
    }

    /// Sleep in short slices so a stop request is honoured promptly
    fn sleep_while_running(duration: Duration, running: &AtomicBool) {
        let slice = Duration::from_millis(100);
        let mut remaining = duration;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let step = std::cmp::min(remaining, slice);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }

    /// Spawn `tail -F -n 0 <path>` with a non-blocking stdout
    fn spawn_tail(path: &Path) -> Result<Child, CollectorError> {
        debug!("Spawning tail on {}", path.display());

        let mut child = Command::new("tail")
            .args(["-F", "-n", "0"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CollectorError::SubprocessSpawn(format!("tail: {}", e)))?;

        // Non-blocking stdout lets the reader notice a stop request
        if let Some(ref mut stdout) = child.stdout {
            #[cfg(unix)]
            {
                use std::os::unix::io::AsRawFd;
                let fd = stdout.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                }
            }
        }

        Ok(child)
    }

    /// Read the subprocess output line by line until it ends or we are stopped
    fn process_stream(
        child: &mut Child,
        channel: &Sender<LogRecord>,
        stats: &PipelineStats,
        running: &AtomicBool,
    ) -> Result<StreamEnd, CollectorError> {
        let mut stdout = child.stdout.take().ok_or_else(|| {
            CollectorError::SubprocessTerminated("No stdout available".to_string())
        })?;

        let mut buffer: Vec<u8> = Vec::new();
        let mut temp_buf = [0u8; 4096];
        // Set while skipping the rest of an oversized line
        let mut discarding = false;

        loop {
            if !running.load(Ordering::SeqCst) {
                debug!("Stopping log processing due to shutdown signal");
                return Ok(StreamEnd::Stopped);
            }

            match stdout.read(&mut temp_buf) {
                Ok(0) => {
                    debug!("tail closed stdout");
                    return Ok(StreamEnd::Eof);
                }
                Ok(n) => {
                    buffer.extend_from_slice(&temp_buf[..n]);

                    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
                        if discarding {
                            discarding = false;
                            continue;
                        }
                        let line = String::from_utf8_lossy(&raw);
                        if !Self::handle_line(&line, channel, stats) {
                            return Ok(StreamEnd::ReceiverClosed);
                        }
                    }

                    if buffer.len() > MAX_LINE_BYTES {
                        if !discarding {
                            warn!("Dropping log line longer than {} bytes", MAX_LINE_BYTES);
                            stats.record_line(false);
                            discarding = true;
                        }
                        buffer.clear();
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(CollectorError::IoError(e)),
            }
        }
    }

    /// Parse one line and forward it
    ///
    /// Returns `false` once the receiving side of the channel is gone.
    fn handle_line(line: &str, channel: &Sender<LogRecord>, stats: &PipelineStats) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return true;
        }

        match LogRecord::from_json(line) {
            Ok(record) => {
                stats.record_line(true);
                if channel.send(record).is_err() {
                    return false;
                }
            }
            Err(e) => {
                stats.record_line(false);
                warn!("Failed to parse log line '{}': {}", line, e);
            }
        }
        true
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        if self.is_running() || self.thread_handle.is_some() {
            let _ = self.stop();
        }
    }
}
