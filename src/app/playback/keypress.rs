use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use super::process::{TrackExit, TrackProcess};
use crate::error::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Next,
    Previous,
    Quit,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyBindings {
    table: HashMap<char, Action>,
}

impl KeyBindings {
    pub(crate) fn new(bindings: impl IntoIterator<Item = (char, Action)>) -> Self {
        Self {
            table: bindings.into_iter().collect(),
        }
    }

    pub(crate) fn action_for(&self, key: char) -> Option<Action> {
        self.table.get(&key).copied()
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new([('n', Action::Next), ('p', Action::Previous), ('q', Action::Quit)])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keystroke {
    Char(char),
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenOutcome {
    Key(Action),
    TrackEnded(TrackExit),
}

pub(crate) trait KeySource {
    type Scope: KeyScope;

    fn acquire(&mut self) -> Result<Self::Scope>;
}

pub(crate) trait KeyScope {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<Keystroke>>;
}

#[derive(Debug, Default)]
pub(crate) struct TerminalKeys;

impl KeySource for TerminalKeys {
    type Scope = RawInputGuard;

    fn acquire(&mut self) -> Result<RawInputGuard> {
        RawInputGuard::enter()
    }
}

#[derive(Debug)]
pub(crate) struct RawInputGuard {
    active: bool,
}

impl RawInputGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().map_err(|err| PlayerError::Terminal {
            detail: err.to_string(),
        })?;
        Ok(Self { active: true })
    }
}

impl KeyScope for RawInputGuard {
    fn poll_key(&mut self, timeout: Duration) -> Result<Option<Keystroke>> {
        if !event::poll(timeout).context("failed to poll terminal input")? {
            return Ok(None);
        }
        let Event::Key(key) = event::read().context("failed to read terminal input")? else {
            return Ok(None);
        };
        if key.kind != KeyEventKind::Press {
            return Ok(None);
        }
        Ok(match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Keystroke::Interrupt)
            }
            KeyCode::Char(ch) => Some(Keystroke::Char(ch)),
            _ => None,
        })
    }
}

impl Drop for RawInputGuard {
    fn drop(&mut self) {
        if self.active {
            let _ = disable_raw_mode();
            self.active = false;
        }
    }
}

/// Supervises `process` until it exits or a bound key arrives. Liveness is
/// checked before each key poll, so at most one of the two fires per
/// iteration. Unbound keys are ignored.
pub(crate) fn listen<P, S>(
    process: &mut P,
    keys: &mut S,
    bindings: &KeyBindings,
    interval: Duration,
) -> Result<ListenOutcome>
where
    P: TrackProcess + ?Sized,
    S: KeyScope + ?Sized,
{
    loop {
        if let Some(exit) = process.poll_exit()? {
            return Ok(ListenOutcome::TrackEnded(exit));
        }
        match keys.poll_key(interval)? {
            Some(Keystroke::Interrupt) => return Ok(ListenOutcome::Key(Action::Quit)),
            Some(Keystroke::Char(ch)) => {
                if let Some(action) = bindings.action_for(ch) {
                    return Ok(ListenOutcome::Key(action));
                }
            }
            None => {}
        }
    }
}
