//! Per-stream access rules for blocking and asynchronous reads.
//!
//! Each redirected stream is read either through its blocking reader or
//! through a pump, never both. The choice is made by the first access after
//! the process starts and holds until the process is started again.

use thiserror::Error;

use crate::core::types::StreamKind;

/// A call that broke the stream access contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("{0} is not available before the process has started")]
    NotStarted(StreamKind),
    #[error("{0} was not redirected when the process was started")]
    NotRedirected(StreamKind),
    #[error("cannot mix synchronous and asynchronous reads on {0}")]
    MixedSyncAsync(StreamKind),
    #[error("an asynchronous read was already started on {0}")]
    AlreadyReading(StreamKind),
    #[error("no asynchronous read was started on {0}")]
    NoPendingRead(StreamKind),
    #[error("the blocking reader for {0} was already taken")]
    ReaderTaken(StreamKind),
    #[error("the {0} line callback cannot change once reading has begun")]
    CallbackLocked(StreamKind),
    #[error("the process has not been started")]
    ProcessNotStarted,
    #[error("the process is already running")]
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Started,
    SyncEngaged,
    AsyncEngaged,
}

#[derive(Debug, Clone)]
pub struct StreamGuard {
    kind: StreamKind,
    redirected: bool,
    state: StreamState,
}

impl StreamGuard {
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            redirected: false,
            state: StreamState::NotStarted,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Reset for a fresh process run. Any previous engagement is forgotten.
    pub fn on_process_start(&mut self, redirected: bool) {
        self.redirected = redirected;
        self.state = StreamState::Started;
    }

    /// Engage synchronous mode (hand out the blocking reader).
    pub fn claim_blocking(&mut self) -> Result<(), GuardViolation> {
        self.ensure_readable()?;
        match self.state {
            StreamState::AsyncEngaged => Err(GuardViolation::MixedSyncAsync(self.kind)),
            StreamState::SyncEngaged => Err(GuardViolation::ReaderTaken(self.kind)),
            _ => {
                self.state = StreamState::SyncEngaged;
                Ok(())
            }
        }
    }

    /// Whether a pump may be started, without engaging asynchronous mode.
    pub fn check_async(&self) -> Result<(), GuardViolation> {
        self.ensure_readable()?;
        match self.state {
            StreamState::SyncEngaged => Err(GuardViolation::MixedSyncAsync(self.kind)),
            StreamState::AsyncEngaged => Err(GuardViolation::AlreadyReading(self.kind)),
            _ => Ok(()),
        }
    }

    /// Engage asynchronous mode (start the pump).
    pub fn claim_async(&mut self) -> Result<(), GuardViolation> {
        self.check_async()?;
        self.state = StreamState::AsyncEngaged;
        Ok(())
    }

    pub fn check_cancel(&self) -> Result<(), GuardViolation> {
        match self.state {
            StreamState::NotStarted => Err(GuardViolation::NotStarted(self.kind)),
            StreamState::AsyncEngaged => Ok(()),
            _ => Err(GuardViolation::NoPendingRead(self.kind)),
        }
    }

    pub fn check_callback_change(&self) -> Result<(), GuardViolation> {
        if self.state == StreamState::AsyncEngaged {
            return Err(GuardViolation::CallbackLocked(self.kind));
        }
        Ok(())
    }

    fn ensure_readable(&self) -> Result<(), GuardViolation> {
        if self.state == StreamState::NotStarted {
            return Err(GuardViolation::NotStarted(self.kind));
        }
        if !self.redirected {
            return Err(GuardViolation::NotRedirected(self.kind));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(redirected: bool) -> StreamGuard {
        let mut guard = StreamGuard::new(StreamKind::Output);
        guard.on_process_start(redirected);
        guard
    }

    #[test]
    fn everything_fails_before_start() {
        let mut guard = StreamGuard::new(StreamKind::Error);
        let expected = GuardViolation::NotStarted(StreamKind::Error);
        assert_eq!(guard.claim_blocking(), Err(expected));
        assert_eq!(guard.claim_async(), Err(expected));
        assert_eq!(guard.check_cancel(), Err(expected));
        assert_eq!(guard.state(), StreamState::NotStarted);
    }

    #[test]
    fn not_redirected_rejects_both_modes() {
        let mut guard = started(false);
        let expected = GuardViolation::NotRedirected(StreamKind::Output);
        assert_eq!(guard.claim_blocking(), Err(expected));
        assert_eq!(guard.claim_async(), Err(expected));
    }

    #[test]
    fn async_then_blocking_is_mixed() {
        let mut guard = started(true);
        guard.claim_async().expect("async");
        assert_eq!(
            guard.claim_blocking(),
            Err(GuardViolation::MixedSyncAsync(StreamKind::Output))
        );
    }

    #[test]
    fn blocking_then_async_is_mixed() {
        let mut guard = started(true);
        guard.claim_blocking().expect("blocking");
        assert_eq!(
            guard.claim_async(),
            Err(GuardViolation::MixedSyncAsync(StreamKind::Output))
        );
    }

    #[test]
    fn second_claims_fail() {
        let mut guard = started(true);
        guard.claim_async().expect("async");
        assert_eq!(
            guard.claim_async(),
            Err(GuardViolation::AlreadyReading(StreamKind::Output))
        );

        let mut guard = started(true);
        guard.claim_blocking().expect("blocking");
        assert_eq!(
            guard.claim_blocking(),
            Err(GuardViolation::ReaderTaken(StreamKind::Output))
        );
    }

    #[test]
    fn check_async_leaves_state_alone() {
        let guard = started(true);
        assert_eq!(guard.check_async(), Ok(()));
        assert_eq!(guard.state(), StreamState::Started);

        let mut guard = started(true);
        guard.claim_blocking().expect("blocking");
        assert_eq!(
            guard.check_async(),
            Err(GuardViolation::MixedSyncAsync(StreamKind::Output))
        );
    }

    #[test]
    fn cancel_requires_async_mode() {
        let mut guard = started(true);
        assert_eq!(
            guard.check_cancel(),
            Err(GuardViolation::NoPendingRead(StreamKind::Output))
        );
        guard.claim_async().expect("async");
        assert_eq!(guard.check_cancel(), Ok(()));
    }

    #[test]
    fn callback_locked_once_async() {
        let mut guard = started(true);
        assert_eq!(guard.check_callback_change(), Ok(()));
        guard.claim_async().expect("async");
        assert_eq!(
            guard.check_callback_change(),
            Err(GuardViolation::CallbackLocked(StreamKind::Output))
        );
    }

    #[test]
    fn restart_resets_engagement() {
        let mut guard = started(true);
        guard.claim_async().expect("async");
        guard.on_process_start(true);
        assert_eq!(guard.state(), StreamState::Started);
        guard.claim_blocking().expect("blocking after restart");
    }
}
