//! Run state, signal intake and the event loop that keeps the overlay alive.

use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{debug, info, trace, warn};
use wayland_client::{Connection, DispatchError, EventQueue, backend::WaylandError};

use crate::error::{OverlayError, Result};
use crate::wayland_overlay::OverlayState;

/// Why the loop stopped. All of these are graceful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopReason {
    Interrupt = 1,
    Terminate = 2,
    Closed = 3,
}

impl StopReason {
    fn from_word(word: u8) -> Option<Self> {
        match word {
            1 => Some(Self::Interrupt),
            2 => Some(Self::Terminate),
            3 => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Closed => f.write_str("layer surface closed by compositor"),
        }
    }
}

const RUNNING: u8 = 0;

/// Process-wide run flag. Starts running; the first stop request wins and later ones
/// are ignored so the reported reason is the one that actually ended the loop.
#[derive(Debug)]
pub struct RunState {
    word: AtomicU8,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            word: AtomicU8::new(RUNNING),
        }
    }

    pub fn is_running(&self) -> bool {
        self.word.load(Ordering::Acquire) == RUNNING
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        StopReason::from_word(self.word.load(Ordering::Acquire))
    }

    /// Returns `true` if this call is the one that stopped the loop.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        let first = self
            .word
            .compare_exchange(RUNNING, reason as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            info!("Stop requested: {}", reason);
        } else {
            debug!("Ignoring stop request ({}); already stopping", reason);
        }
        first
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoopPhase {
    Idle,
    Running,
    Stopping,
    Terminated,
}

/// Tracks the loop's phase. Phases only move forward.
#[derive(Debug)]
pub struct Lifecycle {
    phase: LoopPhase,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: LoopPhase::Idle,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn advance(&mut self, next: LoopPhase) {
        if next <= self.phase {
            warn!("Ignoring phase change {:?} -> {:?}", self.phase, next);
            return;
        }
        debug!("Loop phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

/// SIGINT and SIGTERM. Installing replaces the default action, so a signal that
/// arrives during setup is held until the loop asks for it.
pub struct Signals {
    interrupt: Signal,
    terminate: Signal,
}

impl Signals {
    pub fn install() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).map_err(OverlayError::Signals)?,
            terminate: signal(SignalKind::terminate()).map_err(OverlayError::Signals)?,
        })
    }

    pub async fn recv(&mut self) -> StopReason {
        tokio::select! {
            _ = self.interrupt.recv() => StopReason::Interrupt,
            _ = self.terminate.recv() => StopReason::Terminate,
        }
    }
}

fn dispatch_failure(error: DispatchError) -> OverlayError {
    OverlayError::ProtocolViolation(format!("event dispatch failed: {}", error))
}

fn connection_failure(error: WaylandError) -> OverlayError {
    OverlayError::ProtocolViolation(format!("connection failed: {}", error))
}

/// Blocks until the compositor has processed every request sent so far, dispatching
/// whatever arrives meanwhile.
pub fn roundtrip(event_queue: &mut EventQueue<OverlayState>, state: &mut OverlayState) -> Result<()> {
    event_queue.roundtrip(state).map_err(dispatch_failure)?;
    match state.take_fault() {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}

/// Pumps events until a signal, a `closed` event, or a fatal connection error.
///
/// The run flag is checked once per wake-up, after queued events are dispatched.
pub async fn run(
    connection: &Connection,
    event_queue: &mut EventQueue<OverlayState>,
    state: &mut OverlayState,
    signals: &mut Signals,
    lifecycle: &mut Lifecycle,
) -> Result<StopReason> {
    let backend = connection.backend();
    let socket = AsyncFd::with_interest(backend.poll_fd(), Interest::READABLE)
        .map_err(|e| connection_failure(WaylandError::Io(e)))?;

    lifecycle.advance(LoopPhase::Running);
    info!("Overlay is up; waiting for events");

    let reason = loop {
        event_queue.dispatch_pending(state).map_err(dispatch_failure)?;
        if let Some(fault) = state.take_fault() {
            return Err(fault);
        }
        if let Some(reason) = state.run_state().stop_reason() {
            break reason;
        }

        event_queue.flush().map_err(connection_failure)?;
        // Events were queued by another reader; dispatch them first.
        let Some(guard) = event_queue.prepare_read() else {
            continue;
        };

        tokio::select! {
            reason = signals.recv() => {
                drop(guard);
                state.run_state().request_stop(reason);
            }
            ready = socket.readable() => {
                let mut ready = ready.map_err(|e| connection_failure(WaylandError::Io(e)))?;
                match guard.read() {
                    Ok(count) => trace!("Read {} events", count),
                    Err(WaylandError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                        ready.clear_ready();
                    }
                    Err(e) => return Err(connection_failure(e)),
                }
            }
        }
    };

    lifecycle.advance(LoopPhase::Stopping);
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_starts_running() {
        let run = RunState::new();
        assert!(run.is_running());
        assert_eq!(run.stop_reason(), None);
    }

    #[test]
    fn test_first_stop_reason_wins() {
        let run = RunState::new();
        assert!(run.request_stop(StopReason::Closed));
        assert!(!run.request_stop(StopReason::Terminate));
        assert!(!run.is_running());
        assert_eq!(run.stop_reason(), Some(StopReason::Closed));
    }

    #[test]
    fn test_stop_reason_word_roundtrip() {
        for reason in [StopReason::Interrupt, StopReason::Terminate, StopReason::Closed] {
            assert_eq!(StopReason::from_word(reason as u8), Some(reason));
        }
        assert_eq!(StopReason::from_word(RUNNING), None);
    }

    #[test]
    fn test_lifecycle_moves_forward_only() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.phase(), LoopPhase::Idle);

        lifecycle.advance(LoopPhase::Running);
        lifecycle.advance(LoopPhase::Stopping);
        lifecycle.advance(LoopPhase::Running);
        assert_eq!(lifecycle.phase(), LoopPhase::Stopping);

        lifecycle.advance(LoopPhase::Terminated);
        assert_eq!(lifecycle.phase(), LoopPhase::Terminated);
    }

    #[test]
    fn test_stop_during_setup_skips_running() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.advance(LoopPhase::Stopping);
        lifecycle.advance(LoopPhase::Terminated);
        assert_eq!(lifecycle.phase(), LoopPhase::Terminated);
    }
}
