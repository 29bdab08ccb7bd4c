use std::{process::Stdio, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::{self, Child, ChildStderr, ChildStdin, ChildStdout},
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::{
        JAR_NAME, ServerConfig, Settings,
        stream::{Event, EventKind, StreamLine, StreamSource},
    },
    error::ServerError,
    events::Bus,
    parser, properties, query, utils,
};

use super::types::{InstanceStatus, PlayerInfo, ServerInfo, StatusCell};

/// How long the exit waiter lets the readers drain after the process exits.
const READER_GRACE: Duration = Duration::from_secs(1);

/// Supervisor of one server process.
///
/// Cheap to clone; clones share the same process and state. Ownership of the
/// process resources is split by task, never shared:
/// - the [`Child`] is moved into the exit waiter, which alone observes the exit;
/// - each output pipe is moved into its line reader;
/// - the log file is written by the readers and closed by the exit waiter
///   after both readers finished;
/// - the stdin slot is filled by `start` and emptied by the exit waiter.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ServerConfig,
    settings: Arc<Settings>,
    bus: Bus,
    status: StatusCell,
    runtime: RwLock<Runtime>,
    stdin: Mutex<Option<ChildStdin>>,
}

#[derive(Debug, Default)]
struct Runtime {
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    last_exit_error: Option<String>,
}

impl InstanceHandle {
    /// A handle in the `Stopped` state.
    pub fn new(config: ServerConfig, settings: Arc<Settings>, bus: Bus) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                settings,
                bus,
                status: StatusCell::new(InstanceStatus::Stopped),
                runtime: RwLock::new(Runtime::default()),
                stdin: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn status(&self) -> InstanceStatus {
        self.inner.status.load()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.inner.runtime.read().await.pid
    }

    /// Spawns the server. Returns once the process exists; a running
    /// instance is left untouched.
    pub async fn start(&self) -> Result<(), ServerError> {
        let Some(previous) = self.claim_start() else {
            debug!(id = %self.id(), name = %self.inner.config.name, "server already running");
            return Ok(());
        };

        let cfg = &self.inner.config;
        info!(id = %cfg.id, name = %cfg.name, port = cfg.port, "starting server");

        let log = match self.open_log().await {
            Ok(file) => file,
            Err(err) => {
                self.inner.status.store(previous);
                return Err(err);
            }
        };

        let mut child = match self.build_start_command().spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(id = %cfg.id, %err, "failed to start server");
                self.inner.runtime.write().await.last_exit_error = Some(err.to_string());
                self.inner.status.store(InstanceStatus::Crashed);
                return Err(ServerError::CommandFailed(err.to_string()));
            }
        };

        let pipes = match take_pipes(&mut child) {
            Ok(pipes) => pipes,
            Err(err) => {
                let _ = child.start_kill();
                self.inner.runtime.write().await.last_exit_error = Some(err.to_string());
                self.inner.status.store(InstanceStatus::Crashed);
                return Err(err);
            }
        };
        let (stdout, stderr, stdin) = pipes;

        let pid = child.id();
        {
            let mut runtime = self.inner.runtime.write().await;
            runtime.pid = pid;
            runtime.started_at = Some(Utc::now());
        }
        *self.inner.stdin.lock().await = Some(stdin);

        self.inner.status.store(InstanceStatus::Running);
        info!(id = %cfg.id, name = %cfg.name, pid = pid.unwrap_or(0), "server started successfully");
        self.inner.bus.publish(Event::new(EventKind::Started, cfg.id.clone()));

        let log = Arc::new(Mutex::new(log));
        let readers = [
            self.spawn_reader(stdout, StreamSource::Stdout, log.clone()),
            self.spawn_reader(stderr, StreamSource::Stderr, log.clone()),
        ];
        self.spawn_exit_waiter(child, readers, log);

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn set_status(&self, status: InstanceStatus) {
        self.inner.status.store(status);
    }

    /// `Stopped`/`Crashed` -> `Starting`, returning the state left behind.
    fn claim_start(&self) -> Option<InstanceStatus> {
        [InstanceStatus::Stopped, InstanceStatus::Crashed]
            .into_iter()
            .find(|&from| self.inner.status.transition(from, InstanceStatus::Starting))
    }

    async fn open_log(&self) -> Result<File, ServerError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.inner.config.log_path())
            .await
            .map_err(|e| ServerError::FileIO(e.to_string()))
    }

    fn build_start_command(&self) -> process::Command {
        let cfg = &self.inner.config;
        let mut command = process::Command::new(&self.inner.settings.java);
        command
            .arg(format!("-Xmx{}M", cfg.memory_mb))
            .arg("-jar")
            .arg(JAR_NAME)
            .arg("nogui")
            .current_dir(&cfg.path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped());

        // Keep terminal signals away from the server; it is stopped via stdin.
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    fn spawn_reader<R>(&self, pipe: R, source: StreamSource, log: Arc<Mutex<File>>) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = self.inner.config.id.clone();
        let bus = self.inner.bus.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf)
                            .trim_end_matches(['\r', '\n'])
                            .to_string();

                        let mut file = log.lock().await;
                        let written = match file.write_all(format!("{line}\n").as_bytes()).await {
                            Ok(()) => file.flush().await,
                            Err(err) => Err(err),
                        };
                        drop(file);
                        if let Err(err) = written {
                            debug!(%id, stream = %source, %err, "failed to append to server log");
                        }

                        bus.publish(Event::log(id.clone(), StreamLine::new(line, source)));
                    }
                    Err(err) => {
                        debug!(%id, stream = %source, %err, "stopped reading server output");
                        break;
                    }
                }
            }
        })
    }

    /// Sole owner of the exit transition and of closing the log file.
    fn spawn_exit_waiter(&self, mut child: Child, mut readers: [JoinHandle<()>; 2], log: Arc<Mutex<File>>) {
        let handle = self.clone();

        tokio::spawn(async move {
            let exit = child.wait().await;
            let inner = &handle.inner;

            // Readers end at EOF, which a descendant still holding the pipes
            // can delay indefinitely.
            let drained = timeout(READER_GRACE, async {
                for reader in readers.iter_mut() {
                    let _ = reader.await;
                }
            })
            .await;
            if drained.is_err() {
                debug!(id = %inner.config.id, "output still open after exit, dropping readers");
                for reader in &readers {
                    reader.abort();
                }
            }
            let _ = log.lock().await.flush().await;
            drop(log);

            inner.stdin.lock().await.take();

            let failure = match exit {
                Ok(status) if status.success() => None,
                Ok(status) => Some(status.to_string()),
                Err(err) => Some(err.to_string()),
            };

            {
                let mut runtime = inner.runtime.write().await;
                runtime.pid = None;
                runtime.started_at = None;
                runtime.last_exit_error = failure.clone();
            }

            match failure {
                Some(err) => {
                    inner.status.store(InstanceStatus::Crashed);
                    error!(id = %inner.config.id, %err, "server crashed");
                }
                None => {
                    inner.status.store(InstanceStatus::Stopped);
                    info!(id = %inner.config.id, "server stopped");
                }
            }

            inner.bus.publish(Event::new(EventKind::Exited, inner.config.id.clone()));
        });
    }

    /// Asks a running server to shut down and returns without waiting.
    /// The exit shows up as a `server.exited` event.
    pub async fn stop(&self) -> Result<(), ServerError> {
        if self.status() != InstanceStatus::Running {
            debug!(id = %self.id(), "server not running, nothing to stop");
            return Ok(());
        }
        info!(id = %self.id(), name = %self.inner.config.name, "stopping server");
        self.write_line("stop").await
    }

    /// Writes `cmd` and a newline to the server console.
    pub async fn send_command(&self, cmd: &str) -> Result<(), ServerError> {
        debug!(id = %self.id(), cmd, "sending command to server");
        self.write_line(cmd).await
    }

    async fn write_line(&self, line: &str) -> Result<(), ServerError> {
        let mut guard = self.inner.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            warn!(id = %self.id(), cmd = line, "server not running, cannot send command");
            return Err(ServerError::NotRunning);
        };

        stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| ServerError::StdinWriteFailed(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| ServerError::StdinWriteFailed(e.to_string()))
    }

    /// Stops the server, waits for its exit (bounded by the restart timeout)
    /// and starts it again.
    pub async fn restart(&self) -> Result<(), ServerError> {
        info!(id = %self.id(), name = %self.inner.config.name, "restarting server");

        if self.status() != InstanceStatus::Running {
            return self.start().await;
        }

        // Subscribed before the stop so the exit cannot slip past.
        let mut sub = self.inner.bus.subscribe();

        if self.status() == InstanceStatus::Running {
            if let Err(err) = self.stop().await {
                warn!(id = %self.id(), %err, "stop command failed during restart");
            }

            let id = self.id().to_string();
            let exited = async {
                while let Some(event) = sub.recv().await {
                    if event.is(EventKind::Exited, &id) {
                        return true;
                    }
                }
                false
            };

            match timeout(self.inner.settings.restart_timeout(), exited).await {
                Ok(true) => debug!(%id, "server stopped, starting again"),
                Ok(false) => warn!(%id, "event bus closed while waiting for exit"),
                Err(_) => warn!(%id, "timeout waiting for server to stop, starting anyway"),
            }
        }
        sub.unsubscribe();

        self.start().await
    }

    /// Current snapshot. Player counts are only probed while running.
    pub async fn info(&self) -> ServerInfo {
        let state = self.status();
        let (pid, uptime_sec, last_exit_err) = {
            let runtime = self.inner.runtime.read().await;
            let uptime = runtime
                .started_at
                .map(|at| (Utc::now() - at).num_seconds().max(0) as u64)
                .unwrap_or(0);
            (
                runtime.pid.unwrap_or(0),
                uptime,
                runtime.last_exit_error.clone().unwrap_or_default(),
            )
        };

        let players = if state == InstanceStatus::Running {
            self.players().await
        } else {
            None
        };

        ServerInfo {
            config: self.inner.config.clone(),
            state,
            pid,
            uptime_sec,
            last_exit_err,
            players,
        }
    }

    /// Status protocol first, then the log, then `max-players` alone.
    async fn players(&self) -> Option<PlayerInfo> {
        let cfg = &self.inner.config;
        let settings = &self.inner.settings;

        match query::ping(&settings.status_host, cfg.port, settings.status_timeout()).await {
            Ok(status) => {
                return Some(PlayerInfo {
                    current: status.players.online,
                    max: status.players.max,
                });
            }
            Err(err) => debug!(id = %cfg.id, %err, "status ping failed, reading log"),
        }

        let properties_path = cfg.properties_path();
        match parser::read_players_from_log(&cfg.log_path()).await {
            Ok(Some((current, mut max))) => {
                if max == 0 {
                    if let Ok(configured) = properties::max_players(&properties_path).await {
                        max = configured;
                    }
                }
                return Some(PlayerInfo { current, max });
            }
            Ok(None) => {}
            Err(err) => debug!(id = %cfg.id, %err, "could not read server log"),
        }

        properties::max_players(&properties_path)
            .await
            .ok()
            .map(|max| PlayerInfo { current: 0, max })
    }

    /// Last `lines` lines of the persisted server log.
    pub async fn tail_log(&self, lines: usize) -> Result<String, ServerError> {
        utils::tail_file(&self.inner.config.log_path(), lines)
            .await
            .map_err(|e| ServerError::FileIO(e.to_string()))
    }
}

fn take_pipes(child: &mut Child) -> Result<(ChildStdout, ChildStderr, ChildStdin), ServerError> {
    let stdout = child.stdout.take().ok_or(ServerError::NoStdoutPipe)?;
    let stderr = child.stderr.take().ok_or(ServerError::NoStderrPipe)?;
    let stdin = child.stdin.take().ok_or(ServerError::NoStdinPipe)?;
    Ok((stdout, stderr, stdin))
}
