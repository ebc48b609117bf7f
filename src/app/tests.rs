use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;

use super::feed::ShowInfo;
use super::playback::*;
use super::source::*;
use super::truncate;
use crate::error::{PlayerError, exit_code_for};

#[derive(Debug, Default)]
struct Recorder {
    launched: Vec<String>,
    terminated: Vec<u32>,
    resolves: usize,
    scopes_open: usize,
    scopes_acquired: usize,
}

type Shared = Rc<RefCell<Recorder>>;

struct FakeSource {
    feed_error: Option<String>,
    entries: Vec<PlaylistEntry>,
    log: Shared,
}

impl PlaylistSource for FakeSource {
    fn load_show(&mut self) -> Result<ShowInfo> {
        if let Some(detail) = self.feed_error.clone() {
            return Err(PlayerError::FeedUnreachable { detail }.into());
        }
        Ok(ShowInfo {
            title: "Morning Edition".to_string(),
            date: "Fri, 17 Jan 2014".to_string(),
            articles: self
                .entries
                .iter()
                .map(|entry| entry.title().to_string())
                .collect(),
        })
    }

    fn resolve_episodes(&mut self, _show: &ShowInfo) -> Result<Vec<PlaylistEntry>> {
        self.log.borrow_mut().resolves += 1;
        Ok(self.entries.clone())
    }
}

struct FakeProcess {
    id: u32,
    polls_before_exit: Option<usize>,
    log: Shared,
}

impl TrackProcess for FakeProcess {
    fn id(&self) -> u32 {
        self.id
    }

    fn poll_exit(&mut self) -> Result<Option<TrackExit>> {
        match self.polls_before_exit.as_mut() {
            Some(0) => Ok(Some(TrackExit { code: Some(0) })),
            Some(left) => {
                *left -= 1;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn terminate(&mut self) -> Result<()> {
        self.log.borrow_mut().terminated.push(self.id);
        Ok(())
    }
}

#[derive(Default)]
struct FakeLauncher {
    log: Shared,
    next_id: u32,
    finishes_after: HashMap<String, usize>,
    broken: HashSet<String>,
    player_missing: bool,
}

impl Launcher for FakeLauncher {
    type Process = FakeProcess;

    fn start(&mut self, audio_url: &str) -> Result<FakeProcess> {
        self.log.borrow_mut().launched.push(audio_url.to_string());
        if self.player_missing {
            return Err(PlayerError::PlayerMissing {
                player: "mplayer".to_string(),
                detail: "No such file or directory (os error 2)".to_string(),
            }
            .into());
        }
        if self.broken.contains(audio_url) {
            return Err(PlayerError::PlayerLaunch {
                player: "mplayer".to_string(),
                detail: "exec format error".to_string(),
            }
            .into());
        }
        self.next_id += 1;
        Ok(FakeProcess {
            id: self.next_id,
            polls_before_exit: self.finishes_after.get(audio_url).copied(),
            log: Rc::clone(&self.log),
        })
    }
}

struct FakeKeys {
    script: Rc<RefCell<VecDeque<Option<char>>>>,
    log: Shared,
}

struct FakeScope {
    script: Rc<RefCell<VecDeque<Option<char>>>>,
    log: Shared,
}

impl KeySource for FakeKeys {
    type Scope = FakeScope;

    fn acquire(&mut self) -> Result<FakeScope> {
        {
            let mut log = self.log.borrow_mut();
            log.scopes_open += 1;
            log.scopes_acquired += 1;
        }
        Ok(FakeScope {
            script: Rc::clone(&self.script),
            log: Rc::clone(&self.log),
        })
    }
}

impl KeyScope for FakeScope {
    // An exhausted script answers 'q' so every session terminates.
    fn poll_key(&mut self, _timeout: Duration) -> Result<Option<Keystroke>> {
        let key = self.script.borrow_mut().pop_front().unwrap_or(Some('q'));
        Ok(key.map(Keystroke::Char))
    }
}

impl Drop for FakeScope {
    fn drop(&mut self) {
        self.log.borrow_mut().scopes_open -= 1;
    }
}

type TestController = PlaybackController<FakeSource, FakeLauncher, FakeKeys>;

fn audio_url(name: &str) -> String {
    format!("http://pd.npr.org/anon.npr-mp3/me/{name}.mp3")
}

fn episode(name: &str) -> PlaylistEntry {
    PlaylistEntry::Playable(Episode {
        title: name.to_string(),
        program: "Morning Edition".to_string(),
        date: "January 17, 2014".to_string(),
        audio_url: audio_url(name),
        source_url: format!("http://www.npr.org/2014/01/17/{name}"),
    })
}

fn unpublished(name: &str) -> PlaylistEntry {
    PlaylistEntry::Unplayable(UnplayableEpisode {
        source_url: format!("http://www.npr.org/2014/01/17/{name}"),
        title: Some(name.to_string()),
        reason: PlayerError::AudioNotAvailable.to_string(),
    })
}

fn abc() -> Vec<PlaylistEntry> {
    vec![episode("A"), episode("B"), episode("C")]
}

fn urls(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| audio_url(name)).collect()
}

struct Harness {
    entries: Vec<PlaylistEntry>,
    keys: Vec<Option<char>>,
    feed_error: Option<String>,
    launcher: FakeLauncher,
}

impl Harness {
    fn new(entries: Vec<PlaylistEntry>, keys: &[Option<char>]) -> Self {
        Self {
            entries,
            keys: keys.to_vec(),
            feed_error: None,
            launcher: FakeLauncher::default(),
        }
    }

    fn finishing(mut self, name: &str, polls: usize) -> Self {
        self.launcher.finishes_after.insert(audio_url(name), polls);
        self
    }

    fn broken(mut self, name: &str) -> Self {
        self.launcher.broken.insert(audio_url(name));
        self
    }

    fn without_player(mut self) -> Self {
        self.launcher.player_missing = true;
        self
    }

    fn build(self) -> (Result<TestController>, Shared) {
        let log = Shared::default();
        let source = FakeSource {
            feed_error: self.feed_error,
            entries: self.entries,
            log: Rc::clone(&log),
        };
        let launcher = FakeLauncher {
            log: Rc::clone(&log),
            ..self.launcher
        };
        let keys = FakeKeys {
            script: Rc::new(RefCell::new(self.keys.into_iter().collect())),
            log: Rc::clone(&log),
        };
        let options = ControllerOptions {
            poll_interval: Duration::ZERO,
            verbose: false,
            ..ControllerOptions::default()
        };
        (
            PlaybackController::new(source, launcher, keys, options),
            log,
        )
    }

    fn controller(self) -> (TestController, Shared) {
        let (controller, log) = self.build();
        (controller.expect("controller should build"), log)
    }
}

fn now_playing_title(controller: &TestController) -> Option<String> {
    controller
        .now_playing()
        .map(|entry| entry.title().to_string())
}

#[test]
fn play_without_episode_starts_with_first_entry() {
    let (mut controller, log) = Harness::new(abc(), &[Some('q')]).controller();

    controller.play(None).expect("session should end cleanly");

    assert_eq!(log.borrow().launched, urls(&["A"]));
    assert_eq!(controller.cursor(), Some(0));
    assert_eq!(now_playing_title(&controller).as_deref(), Some("A"));
}

#[test]
fn next_key_advances_and_wraps_to_first() {
    let keys = [Some('n'), Some('n'), Some('n'), Some('q')];
    let (mut controller, log) = Harness::new(abc(), &keys).controller();

    controller.play(None).expect("session");

    assert_eq!(log.borrow().launched, urls(&["A", "B", "C", "A"]));
    assert_eq!(now_playing_title(&controller).as_deref(), Some("A"));
}

#[test]
fn previous_key_steps_back_and_wraps_to_last() {
    let keys = [Some('p'), Some('p'), Some('q')];
    let (mut controller, log) = Harness::new(abc(), &keys).controller();

    controller.play(Some(1)).expect("session");

    assert_eq!(log.borrow().launched, urls(&["B", "A", "C"]));
    assert_eq!(controller.cursor(), Some(2));
}

#[test]
fn finished_track_auto_advances_without_keystroke() {
    let keys = [None, None, None, Some('q')];
    let (mut controller, log) = Harness::new(abc(), &keys).finishing("A", 2).controller();

    controller.play(None).expect("session");

    assert_eq!(log.borrow().launched, urls(&["A", "B"]));
    assert_eq!(now_playing_title(&controller).as_deref(), Some("B"));
}

#[test]
fn next_key_matches_natural_end_of_track() {
    let (mut pressed, pressed_log) = Harness::new(abc(), &[Some('n'), Some('q')]).controller();
    let (mut finished, finished_log) = Harness::new(abc(), &[Some('q')])
        .finishing("A", 0)
        .controller();

    pressed.play(None).expect("pressed session");
    finished.play(None).expect("finished session");

    assert_eq!(pressed_log.borrow().launched, finished_log.borrow().launched);
    assert_eq!(pressed.cursor(), finished.cursor());
}

#[test]
fn unbound_key_leaves_state_unchanged() {
    let keys = [Some('x'), None, Some('N'), Some('q')];
    let (mut controller, log) = Harness::new(abc(), &keys).controller();

    controller.play(None).expect("session");

    assert_eq!(log.borrow().launched, urls(&["A"]));
    assert_eq!(controller.cursor(), Some(0));
}

#[test]
fn quit_terminates_player_exactly_once() {
    let (mut controller, log) = Harness::new(abc(), &[Some('q')]).controller();

    let result = controller.play(None);

    assert!(result.is_ok(), "quit is a normal exit");
    assert_eq!(log.borrow().terminated, vec![1]);
    assert!(!controller.has_active_process());

    controller.terminate_active();
    controller.terminate_active();
    assert_eq!(log.borrow().terminated, vec![1]);
}

#[test]
fn switching_tracks_stops_previous_player_first() {
    let keys = [Some('n'), Some('p'), Some('q')];
    let (mut controller, log) = Harness::new(abc(), &keys).controller();

    controller.play(None).expect("session");

    let log = log.borrow();
    assert_eq!(log.launched, urls(&["A", "B", "A"]));
    assert_eq!(log.terminated, vec![1, 2, 3]);
}

#[test]
fn feed_failure_fails_construction_before_any_launch() {
    let mut harness = Harness::new(abc(), &[]);
    harness.feed_error = Some("connection refused".to_string());

    let (controller, log) = harness.build();

    let err = controller.err().expect("construction must fail");
    assert!(matches!(
        err.downcast_ref::<PlayerError>(),
        Some(PlayerError::FeedUnreachable { .. })
    ));
    assert_eq!(exit_code_for(&err), 2);
    assert!(log.borrow().launched.is_empty());
    assert_eq!(log.borrow().resolves, 0);
}

#[test]
fn playlist_is_resolved_lazily_and_once() {
    let keys = [Some('n'), Some('p'), Some('n'), Some('q')];
    let (mut controller, log) = Harness::new(abc(), &keys).controller();
    assert_eq!(log.borrow().resolves, 0);

    controller.play(None).expect("session");
    assert_eq!(controller.playlist().expect("cached").len(), 3);

    assert_eq!(log.borrow().resolves, 1);
}

#[test]
fn next_and_previous_without_cursor_select_first_entry() {
    let (mut forward, forward_log) = Harness::new(abc(), &[Some('q')]).controller();
    let (mut backward, backward_log) = Harness::new(abc(), &[Some('q')]).controller();

    forward.next().expect("next session");
    backward.previous().expect("previous session");

    assert_eq!(forward_log.borrow().launched, urls(&["A"]));
    assert_eq!(backward_log.borrow().launched, urls(&["A"]));
}

#[test]
fn unplayable_entry_is_skipped_forward() {
    let entries = vec![episode("A"), unpublished("B"), episode("C")];
    let (mut controller, log) = Harness::new(entries, &[Some('n'), Some('q')]).controller();

    controller.play(None).expect("session");

    assert_eq!(log.borrow().launched, urls(&["A", "C"]));
    assert_eq!(controller.cursor(), Some(2));
}

#[test]
fn unplayable_entry_is_skipped_backward() {
    let entries = vec![episode("A"), unpublished("B"), episode("C")];
    let (mut controller, log) = Harness::new(entries, &[Some('p'), Some('q')]).controller();

    controller.play(Some(2)).expect("session");

    assert_eq!(log.borrow().launched, urls(&["C", "A"]));
    assert_eq!(controller.cursor(), Some(0));
}

#[test]
fn playlist_without_playable_entries_ends_session() {
    let entries = vec![unpublished("A"), unpublished("B")];
    let (mut controller, log) = Harness::new(entries, &[]).controller();

    let err = controller.play(None).expect_err("nothing can play");

    assert!(matches!(
        err.downcast_ref::<PlayerError>(),
        Some(PlayerError::NothingPlayable)
    ));
    assert_eq!(exit_code_for(&err), 3);
    assert!(log.borrow().launched.is_empty());
}

#[test]
fn launch_failure_moves_on_to_next_entry() {
    let (mut controller, log) = Harness::new(abc(), &[Some('n'), Some('q')])
        .broken("B")
        .controller();

    controller.play(None).expect("session survives one broken track");

    assert_eq!(log.borrow().launched, urls(&["A", "B", "C"]));
    assert_eq!(now_playing_title(&controller).as_deref(), Some("C"));
}

#[test]
fn launch_failure_on_every_entry_is_fatal() {
    let (mut controller, log) = Harness::new(abc(), &[])
        .broken("A")
        .broken("B")
        .broken("C")
        .controller();

    let err = controller.play(None).expect_err("no track can launch");

    assert!(matches!(
        err.downcast_ref::<PlayerError>(),
        Some(PlayerError::PlayerLaunch { .. })
    ));
    assert_eq!(log.borrow().launched, urls(&["A", "B", "C"]));
    assert!(log.borrow().terminated.is_empty());
}

#[test]
fn missing_player_ends_session_after_one_attempt() {
    let (mut controller, log) = Harness::new(abc(), &[Some('n'), Some('q')])
        .without_player()
        .controller();

    let err = controller.play(None).expect_err("player cannot start");

    assert!(matches!(
        err.downcast_ref::<PlayerError>(),
        Some(PlayerError::PlayerMissing { .. })
    ));
    assert_eq!(exit_code_for(&err), 3);
    assert_eq!(log.borrow().launched, urls(&["A"]));
    assert_eq!(log.borrow().scopes_acquired, 0);
}

#[test]
fn empty_playlist_is_reported_not_ignored() {
    let (mut controller, log) = Harness::new(Vec::new(), &[]).controller();

    let err = controller.next().expect_err("empty playlist");

    assert!(matches!(
        err.downcast_ref::<PlayerError>(),
        Some(PlayerError::EmptyPlaylist)
    ));
    assert!(log.borrow().launched.is_empty());
}

#[test]
fn input_mode_is_restored_after_every_track() {
    let keys = [Some('n'), None, Some('p'), Some('q')];
    let (mut controller, log) = Harness::new(abc(), &keys).finishing("B", 5).controller();

    controller.play(None).expect("session");

    let log = log.borrow();
    assert_eq!(log.scopes_acquired, log.launched.len());
    assert_eq!(log.scopes_open, 0);
}

#[test]
fn truncate_marks_cut_titles() {
    assert_eq!(truncate("Short", 10), "Short");
    assert_eq!(truncate("A Very Long Story Title", 10), "A Very ...");
    assert_eq!(truncate("abcdef", 2), "..");
}
