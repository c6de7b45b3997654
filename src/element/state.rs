//! Element states and the state change driver.
//!
//! ```text
//! NULL <──> READY <──> PAUSED <──> PLAYING
//! ```
//!
//! `set_state` walks one transition at a time. Each committed step posts a
//! `StateChanged` message. A step may return `Async` (sinks waiting for their
//! first buffer); the element then keeps `next` and `pending` set until
//! [`Element::continue_state`] commits the step and resumes the walk.

use super::Element;
use crate::bus::Message;
use crate::error::StateChangeError;
use crate::observability::record_state_change;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Element state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum State {
    /// Initial state; no resources allocated.
    #[default]
    Null,
    /// Resources allocated, no data flowing.
    Ready,
    /// Data flows up to the sinks, which hold it.
    Paused,
    /// Data flows and the clock runs.
    Playing,
}

impl State {
    /// Upper-case name, as printed by diagnostic tools.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Ready => "READY",
            Self::Paused => "PAUSED",
            Self::Playing => "PLAYING",
        }
    }

    fn step_toward(self, target: State) -> State {
        use State::*;
        match (self < target, self) {
            (true, Null) => Ready,
            (true, Ready) => Paused,
            (true, _) => Playing,
            (false, Playing) => Paused,
            (false, Paused) => Ready,
            (false, _) => Null,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single-step transition between adjacent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    /// NULL to READY.
    NullToReady,
    /// READY to PAUSED.
    ReadyToPaused,
    /// PAUSED to PLAYING.
    PausedToPlaying,
    /// PLAYING to PAUSED.
    PlayingToPaused,
    /// PAUSED to READY.
    PausedToReady,
    /// READY to NULL.
    ReadyToNull,
}

impl StateChange {
    /// The transition from `current` to the adjacent `next`, if they are
    /// adjacent.
    pub fn between(current: State, next: State) -> Option<Self> {
        use State::*;
        Some(match (current, next) {
            (Null, Ready) => Self::NullToReady,
            (Ready, Paused) => Self::ReadyToPaused,
            (Paused, Playing) => Self::PausedToPlaying,
            (Playing, Paused) => Self::PlayingToPaused,
            (Paused, Ready) => Self::PausedToReady,
            (Ready, Null) => Self::ReadyToNull,
            _ => return None,
        })
    }

    /// State before the transition.
    pub fn current(&self) -> State {
        match self {
            Self::NullToReady => State::Null,
            Self::ReadyToPaused | Self::ReadyToNull => State::Ready,
            Self::PausedToPlaying | Self::PausedToReady => State::Paused,
            Self::PlayingToPaused => State::Playing,
        }
    }

    /// State after the transition.
    pub fn next(&self) -> State {
        match self {
            Self::ReadyToNull => State::Null,
            Self::NullToReady | Self::PausedToReady => State::Ready,
            Self::ReadyToPaused | Self::PlayingToPaused => State::Paused,
            Self::PausedToPlaying => State::Playing,
        }
    }

    /// Whether the transition goes toward PLAYING.
    pub fn is_upward(&self) -> bool {
        self.next() > self.current()
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.current(), self.next())
    }
}

/// Successful outcome of a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChangeSuccess {
    /// The target state was reached.
    Success,
    /// The change completes later; see [`Element::state`].
    Async,
    /// Reached, but the element produces no preroll data (live sources).
    NoPreroll,
}

/// Result of a state change.
pub type StateChangeResult = Result<StateChangeSuccess, StateChangeError>;

pub(crate) struct StateData {
    pub(crate) current: State,
    pub(crate) next: Option<State>,
    pub(crate) pending: Option<State>,
    pub(crate) last_return: StateChangeResult,
}

impl Default for StateData {
    fn default() -> Self {
        Self {
            current: State::Null,
            next: None,
            pending: None,
            last_return: Ok(StateChangeSuccess::Success),
        }
    }
}

impl Element {
    /// Current committed state.
    pub fn current_state(&self) -> State {
        self.0.state.lock().unwrap().current
    }

    /// Target of an unfinished state change, if any.
    pub fn pending_state(&self) -> Option<State> {
        let st = self.0.state.lock().unwrap();
        st.next.map(|next| st.pending.unwrap_or(next))
    }

    pub(crate) fn is_async_pending(&self) -> bool {
        self.0.state.lock().unwrap().next.is_some()
    }

    /// Change state, walking through intermediate states.
    pub fn set_state(&self, target: State) -> StateChangeResult {
        let result = {
            let _guard = self.0.state_lock.lock().unwrap();
            self.change_state_locked(target)
        };
        if target == State::Null {
            self.imp_dyn().join_threads(self);
        }
        result
    }

    /// Wait up to `timeout` (forever when `None`) for an async state change,
    /// returning the last result with the current and pending states.
    pub fn state(&self, timeout: Option<Duration>) -> (StateChangeResult, State, Option<State>) {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut st = self.0.state.lock().unwrap();
        while st.next.is_some() {
            st = match deadline {
                None => self.0.state_cond.wait(st).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.0.state_cond.wait_timeout(st, deadline - now).unwrap().0
                }
            };
        }
        if st.next.is_some() {
            let pending = st.pending.or(st.next);
            return (Ok(StateChangeSuccess::Async), st.current, pending);
        }
        (st.last_return, st.current, None)
    }

    /// Commit an async transition and continue toward the pending state.
    ///
    /// Called by the element itself (a sink after preroll, a bin after its
    /// last async child) on whatever thread completed the transition.
    /// Does nothing when no async transition is in progress.
    pub fn continue_state(&self) {
        let _guard = self.0.state_lock.lock().unwrap();
        let (old, next, target) = {
            let st = self.0.state.lock().unwrap();
            let Some(next) = st.next else {
                return;
            };
            (st.current, next, st.pending.unwrap_or(next))
        };
        self.commit(old, next, target);
        self.post_message(Message::async_done(self));
        if next == target {
            let _ = self.finish(Ok(StateChangeSuccess::Success));
        } else {
            let _ = self.change_state_locked(target);
        }
    }

    /// Bring the element to its parent's state.
    pub fn sync_state_with_parent(&self) -> StateChangeResult {
        let Some(parent) = self.parent() else {
            return Ok(StateChangeSuccess::Success);
        };
        let target = parent.pending_state().unwrap_or_else(|| parent.current_state());
        self.set_state(target)
    }

    /// Cancel an async transition heading away from `target`.
    fn abort_async(&self, current: State, next: State) {
        debug!(element = %self.name(), from = %current, to = %next, "aborting async state change");
        if let Some(undo) = StateChange::between(next, current) {
            if undo == StateChange::PausedToReady {
                self.activate_pads(false);
            }
            let _ = self.imp_dyn().change_state(self, undo);
        }
        let mut st = self.0.state.lock().unwrap();
        st.next = None;
        st.pending = None;
        self.0.state_cond.notify_all();
    }

    pub(crate) fn change_state_locked(&self, target: State) -> StateChangeResult {
        {
            let mut st = self.0.state.lock().unwrap();
            if let Some(next) = st.next {
                let current = st.current;
                let same_way = (next > current && target >= next) || (next < current && target <= next);
                if same_way {
                    st.pending = Some(target);
                    st.last_return = Ok(StateChangeSuccess::Async);
                    return Ok(StateChangeSuccess::Async);
                }
                drop(st);
                self.abort_async(current, next);
            }
        }

        let mut ret = StateChangeSuccess::Success;
        loop {
            let (current, next) = {
                let mut st = self.0.state.lock().unwrap();
                if st.current == target {
                    drop(st);
                    return self.finish(Ok(ret));
                }
                let current = st.current;
                let next = current.step_toward(target);
                st.next = Some(next);
                st.pending = Some(target);
                (current, next)
            };
            let Some(transition) = StateChange::between(current, next) else {
                return self.finish(Err(StateChangeError));
            };

            match transition {
                StateChange::ReadyToPaused => self.activate_pads(true),
                StateChange::PausedToReady => self.activate_pads(false),
                _ => {}
            }

            debug!(element = %self.name(), %transition, "changing state");
            match self.imp_dyn().change_state(self, transition) {
                Ok(StateChangeSuccess::Async) => {
                    debug!(element = %self.name(), %transition, "state change is async");
                    let mut st = self.0.state.lock().unwrap();
                    st.last_return = Ok(StateChangeSuccess::Async);
                    return Ok(StateChangeSuccess::Async);
                }
                Ok(success) => {
                    ret = success;
                    self.commit(current, next, target);
                }
                Err(err) => {
                    warn!(element = %self.name(), %transition, "state change failed");
                    if transition == StateChange::ReadyToPaused {
                        self.activate_pads(false);
                    }
                    {
                        let mut st = self.0.state.lock().unwrap();
                        st.next = None;
                        st.pending = None;
                    }
                    return self.finish(Err(err));
                }
            }
        }
    }

    /// Commit `old -> new` and post `StateChanged`.
    fn commit(&self, old: State, new: State, target: State) {
        {
            let mut st = self.0.state.lock().unwrap();
            st.current = new;
            st.next = None;
            if new == target {
                st.pending = None;
            }
        }
        record_state_change(self.name(), new.name());
        let pending = (new != target).then_some(target);
        debug!(element = %self.name(), %old, %new, pending = ?pending, "state changed");
        self.post_message(Message::state_changed(self, old, new, pending));
    }

    fn finish(&self, result: StateChangeResult) -> StateChangeResult {
        let mut st = self.0.state.lock().unwrap();
        st.last_return = result;
        if st.next.is_none() {
            st.pending = None;
        }
        self.0.state_cond.notify_all();
        result
    }

    fn activate_pads(&self, active: bool) {
        for pad in self.pads() {
            pad.set_active(active);
            if !active {
                pad.clear_sticky();
            }
        }
    }
}
