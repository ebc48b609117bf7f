use std::env;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrackExit {
    pub(crate) code: Option<i32>,
}

pub(crate) trait TrackProcess {
    fn id(&self) -> u32;

    fn poll_exit(&mut self) -> Result<Option<TrackExit>>;

    fn terminate(&mut self) -> Result<()>;
}

pub(crate) trait Launcher {
    type Process: TrackProcess;

    fn start(&mut self, audio_url: &str) -> Result<Self::Process>;
}

pub(crate) fn resolve_player_bin() -> PathBuf {
    resolve_player_bin_from_env(env::var_os("NPRCLI_PLAYER_BIN"))
}

pub(crate) fn resolve_player_bin_from_env(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from("mplayer"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlayerConfig {
    pub(crate) bin: PathBuf,
    pub(crate) cache_min: u32,
    pub(crate) console_controls: bool,
}

impl PlayerConfig {
    pub(crate) fn args(&self, audio_url: &str) -> Vec<OsString> {
        let mut args = Vec::with_capacity(4);
        if !self.console_controls {
            args.push(OsString::from("-noconsolecontrols"));
        }
        args.push(OsString::from("-cache-min"));
        args.push(OsString::from(self.cache_min.to_string()));
        args.push(OsString::from(audio_url));
        args
    }
}

#[derive(Debug)]
pub(crate) struct PlayerLauncher {
    config: PlayerConfig,
}

impl PlayerLauncher {
    pub(crate) fn new(config: PlayerConfig) -> Self {
        Self { config }
    }
}

impl Launcher for PlayerLauncher {
    type Process = PlayerProcess;

    fn start(&mut self, audio_url: &str) -> Result<PlayerProcess> {
        let child = ProcessCommand::new(&self.config.bin)
            .args(self.config.args(audio_url))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                let player = self.config.bin.display().to_string();
                let detail = err.to_string();
                match err.kind() {
                    ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                        PlayerError::PlayerMissing { player, detail }
                    }
                    _ => PlayerError::PlayerLaunch { player, detail },
                }
            })?;
        debug!(pid = child.id(), audio_url, "player started");
        Ok(PlayerProcess::new(child))
    }
}

#[derive(Debug)]
pub(crate) struct PlayerProcess {
    pid: u32,
    child: Option<Child>,
    exit: Option<TrackExit>,
    signalled: bool,
}

impl PlayerProcess {
    pub(crate) fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
            exit: None,
            signalled: false,
        }
    }
}

impl TrackProcess for PlayerProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn poll_exit(&mut self) -> Result<Option<TrackExit>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child
            .try_wait()
            .with_context(|| format!("failed polling player process {}", self.pid))?;
        self.exit = status.map(|status| TrackExit {
            code: status.code(),
        });
        Ok(self.exit)
    }

    fn terminate(&mut self) -> Result<()> {
        if self.signalled || self.poll_exit()?.is_some() {
            return Ok(());
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        send_terminate(child)?;
        self.signalled = true;
        debug!(pid = self.pid, "player terminate requested");
        Ok(())
    }
}

// The child is not reaped until try_wait/wait observes it, so its pid
// cannot be recycled before the signal is sent.
#[cfg(unix)]
fn send_terminate(child: &mut Child) -> Result<()> {
    let pid = child.id() as libc::pid_t;
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err).with_context(|| format!("failed to signal player process {pid}"))
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> Result<()> {
    match child.kill() {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(err).context("failed to stop player process"),
    }
}

impl Drop for PlayerProcess {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => {
                let pid = self.pid;
                thread::spawn(move || {
                    if let Err(err) = child.wait() {
                        warn!(pid, "failed reaping player process: {err}");
                    }
                });
            }
            Err(err) => warn!(pid = self.pid, "failed polling player process: {err}"),
        }
    }
}
