use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, warn};

use super::keypress::{Action, KeyBindings, KeySource, ListenOutcome, listen};
use super::process::{Launcher, TrackProcess};
use crate::app::feed::ShowInfo;
use crate::app::source::{Playlist, PlaylistEntry, PlaylistSource};
use crate::error::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Circular step from `cursor`. A missing or out-of-range cursor starts
    /// over at the first entry. `None` only for an empty playlist.
    pub(crate) fn step(self, cursor: Option<usize>, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(match (self, cursor) {
            (Self::Forward, Some(current)) if current < len => (current + 1) % len,
            (Self::Backward, Some(current)) if current < len => (current + len - 1) % len,
            _ => 0,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ControllerOptions {
    pub(crate) bindings: KeyBindings,
    pub(crate) poll_interval: Duration,
    pub(crate) verbose: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            bindings: KeyBindings::default(),
            poll_interval: Duration::from_millis(500),
            verbose: true,
        }
    }
}

enum TrackStart {
    Playing,
    Skipped(Option<anyhow::Error>),
}

pub(crate) struct PlaybackController<S, L, K>
where
    S: PlaylistSource,
    L: Launcher,
    K: KeySource,
{
    source: S,
    launcher: L,
    keys: K,
    options: ControllerOptions,
    show: ShowInfo,
    playlist: Option<Playlist>,
    cursor: Option<usize>,
    active: Option<L::Process>,
}

impl<S, L, K> PlaybackController<S, L, K>
where
    S: PlaylistSource,
    L: Launcher,
    K: KeySource,
{
    pub(crate) fn new(
        mut source: S,
        launcher: L,
        keys: K,
        options: ControllerOptions,
    ) -> Result<Self> {
        let show = source.load_show()?;
        if options.verbose {
            println!("Now playing: {show}");
        }
        Ok(Self {
            source,
            launcher,
            keys,
            options,
            show,
            playlist: None,
            cursor: None,
            active: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[cfg(test)]
    pub(crate) fn has_active_process(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn playlist(&mut self) -> Result<&Playlist> {
        let playlist = match self.playlist.take() {
            Some(playlist) => playlist,
            None => {
                let entries = self.source.resolve_episodes(&self.show)?;
                debug!(entries = entries.len(), "playlist resolved");
                Playlist::new(entries)
            }
        };
        Ok(self.playlist.insert(playlist))
    }

    #[cfg(test)]
    pub(crate) fn now_playing(&self) -> Option<&PlaylistEntry> {
        let cursor = self.cursor?;
        self.playlist.as_ref()?.get(cursor)
    }

    pub(crate) fn play(&mut self, index: Option<usize>) -> Result<()> {
        match index {
            Some(index) => self.run_session(index, Direction::Forward),
            None => self.next(),
        }
    }

    pub(crate) fn next(&mut self) -> Result<()> {
        let index = self.step_index(Direction::Forward)?;
        self.run_session(index, Direction::Forward)
    }

    pub(crate) fn previous(&mut self) -> Result<()> {
        let index = self.step_index(Direction::Backward)?;
        self.run_session(index, Direction::Backward)
    }

    pub(crate) fn quit(&mut self) {
        self.terminate_active();
        if self.options.verbose {
            println!("\n\nExit");
        }
    }

    pub(crate) fn step_index(&mut self, direction: Direction) -> Result<usize> {
        let len = self.playlist()?.len();
        direction
            .step(self.cursor, len)
            .ok_or_else(|| PlayerError::EmptyPlaylist.into())
    }

    pub(crate) fn terminate_active(&mut self) {
        if let Some(mut process) = self.active.take() {
            if let Err(err) = process.terminate() {
                warn!(pid = process.id(), "failed to stop player: {err:#}");
            }
        }
    }

    fn run_session(&mut self, start: usize, direction: Direction) -> Result<()> {
        let mut index = start;
        let mut direction = direction;
        let mut consecutive_misses = 0_usize;

        loop {
            let len = self.playlist()?.len();
            match self.start_track(index)? {
                TrackStart::Playing => consecutive_misses = 0,
                TrackStart::Skipped(launch_error) => {
                    consecutive_misses += 1;
                    if consecutive_misses >= len {
                        self.terminate_active();
                        return Err(launch_error
                            .unwrap_or_else(|| PlayerError::NothingPlayable.into()));
                    }
                    index = self.step_index(direction)?;
                    continue;
                }
            }

            let action = match self.listen_active()? {
                ListenOutcome::Key(action) => action,
                ListenOutcome::TrackEnded(exit) => {
                    debug!(code = ?exit.code, "track finished");
                    Action::Next
                }
            };

            match action {
                Action::Next => direction = Direction::Forward,
                Action::Previous => direction = Direction::Backward,
                Action::Quit => {
                    self.quit();
                    return Ok(());
                }
            }
            index = self.step_index(direction)?;
        }
    }

    fn start_track(&mut self, index: usize) -> Result<TrackStart> {
        self.terminate_active();
        self.cursor = Some(index);

        let entry = self
            .playlist()?
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("playlist has no entry {index}"))?;
        let episode = match entry {
            PlaylistEntry::Playable(episode) => episode,
            PlaylistEntry::Unplayable(unplayable) => {
                if self.options.verbose {
                    println!(
                        "\n - {} (skipped: {})",
                        unplayable.title.as_deref().unwrap_or(&unplayable.source_url),
                        unplayable.reason
                    );
                }
                return Ok(TrackStart::Skipped(None));
            }
        };

        match self.launcher.start(&episode.audio_url) {
            Ok(process) => {
                debug!(pid = process.id(), index, "now playing");
                self.active = Some(process);
                if self.options.verbose {
                    print!("\n - {}", episode.title);
                    flush_stdout();
                }
                Ok(TrackStart::Playing)
            }
            Err(err) if is_missing_player(&err) => Err(err),
            Err(err) => {
                eprintln!("\nCould not play {}: {err:#}", episode.title);
                Ok(TrackStart::Skipped(Some(err)))
            }
        }
    }

    fn listen_active(&mut self) -> Result<ListenOutcome> {
        let Some(process) = self.active.as_mut() else {
            return Err(anyhow!("no player process to supervise"));
        };
        let mut scope = self.keys.acquire()?;
        listen(
            process,
            &mut scope,
            &self.options.bindings,
            self.options.poll_interval,
        )
    }
}

impl<S, L, K> Drop for PlaybackController<S, L, K>
where
    S: PlaylistSource,
    L: Launcher,
    K: KeySource,
{
    fn drop(&mut self) {
        self.terminate_active();
    }
}

// The same binary backs every track, so no other entry can fare better.
fn is_missing_player(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<PlayerError>(),
        Some(PlayerError::PlayerMissing { .. })
    )
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}
