//! Process-level stream access: line callbacks, pumps, blocking readers and
//! exit waiting, with the guard rules enforced per stream.

use std::process::{ChildStdin, Command};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::core::gate::CancellationGate;
use crate::core::guard::{GuardViolation, StreamGuard};
use crate::core::types::{LineCallback, LineEvent, PumpEnd, PumpFault, StreamKind};
use crate::error::{StreamError, StreamResult};
use crate::io::child::{ChildHost, Redirects};
use crate::io::config::StreamConfig;
use crate::io::exit::ExitSynchronizer;
use crate::io::host::ProcessHost;
use crate::io::pump::AsyncStreamPump;
use crate::io::reader::StreamReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessPhase {
    NotStarted,
    Running,
    Exited,
}

/// Cancels one stream's pump from any thread, including from inside its
/// own line callback.
///
/// Obtained with [`StreamedProcess::read_canceller`] after the process has
/// started. Cancelling before the pump was started is a contract violation.
#[derive(Debug, Clone)]
pub struct ReadCanceller {
    kind: StreamKind,
    gate: CancellationGate,
    reading: Arc<AtomicBool>,
}

impl ReadCanceller {
    pub fn cancel(&self) -> StreamResult<()> {
        if !self.reading.load(Ordering::Acquire) {
            return Err(GuardViolation::NoPendingRead(self.kind).into());
        }
        if self.gate.cancel() {
            debug!(stream = %self.kind, "read cancelled");
        }
        Ok(())
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

/// One redirected stream and its at-most-one pump.
struct StreamSlot {
    guard: StreamGuard,
    callback: Option<LineCallback>,
    gate: CancellationGate,
    reading: Arc<AtomicBool>,
    pump: Option<AsyncStreamPump>,
}

impl StreamSlot {
    fn new(kind: StreamKind) -> Self {
        Self {
            guard: StreamGuard::new(kind),
            callback: None,
            gate: CancellationGate::new(),
            reading: Arc::new(AtomicBool::new(false)),
            pump: None,
        }
    }

    fn reset(&mut self, redirected: bool) {
        self.guard.on_process_start(redirected);
        self.gate = CancellationGate::new();
        self.reading = Arc::new(AtomicBool::new(false));
        self.pump = None;
    }
}

/// A child process whose stdout/stderr can be consumed line by line on
/// background pumps, or read synchronously, but not both.
pub struct StreamedProcess<H: ProcessHost> {
    host: H,
    config: StreamConfig,
    phase: ProcessPhase,
    output: StreamSlot,
    error: StreamSlot,
    exit: ExitSynchronizer,
}

impl<H: ProcessHost> StreamedProcess<H> {
    pub fn new(host: H, config: StreamConfig) -> Self {
        Self {
            host,
            config,
            phase: ProcessPhase::NotStarted,
            output: StreamSlot::new(StreamKind::Output),
            error: StreamSlot::new(StreamKind::Error),
            exit: ExitSynchronizer::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Start the process. Starting again is allowed once the previous run
    /// was observed to exit; both streams then return to their initial state.
    #[instrument(skip_all)]
    pub fn start(&mut self) -> StreamResult<()> {
        if self.phase == ProcessPhase::Running {
            return Err(GuardViolation::AlreadyRunning.into());
        }
        if self.phase == ProcessPhase::Exited {
            // Old pumps saw their process exit; let them finish first.
            for pump in self.output.pump.iter_mut().chain(self.error.pump.iter_mut()) {
                pump.join();
            }
        }
        self.host
            .start()
            .map_err(|err| StreamError::io("start process", err))?;
        for kind in StreamKind::ALL {
            let redirected = self.host.is_redirected(kind);
            self.slot_mut(kind).reset(redirected);
        }
        self.exit.reset();
        self.phase = ProcessPhase::Running;
        info!(
            stdout = self.host.is_redirected(StreamKind::Output),
            stderr = self.host.is_redirected(StreamKind::Error),
            "process started"
        );
        Ok(())
    }

    pub fn has_started(&self) -> bool {
        self.phase != ProcessPhase::NotStarted && self.host.has_started()
    }

    pub fn has_exited(&self) -> bool {
        self.phase == ProcessPhase::Exited
    }

    /// Register the line callback for `kind`.
    ///
    /// Replaceable until `begin_read`; after the process exits, a callback
    /// may be registered for the next `start`.
    pub fn on_line<F>(&mut self, kind: StreamKind, callback: F) -> StreamResult<()>
    where
        F: FnMut(LineEvent) + Send + 'static,
    {
        let exited = self.phase == ProcessPhase::Exited;
        let slot = self.slot_mut(kind);
        if !exited {
            slot.guard.check_callback_change()?;
        }
        slot.callback = Some(Box::new(callback));
        Ok(())
    }

    /// Start the background pump for `kind`. Returns without blocking.
    #[instrument(skip(self))]
    pub fn begin_read(&mut self, kind: StreamKind) -> StreamResult<()> {
        let options = self.config.framer_options(kind);
        let slot = match kind {
            StreamKind::Output => &mut self.output,
            StreamKind::Error => &mut self.error,
        };
        // A failed begin_read leaves the guard untouched.
        slot.guard.check_async()?;
        let raw = self
            .host
            .take_raw_handle(kind)
            .ok_or(GuardViolation::NotRedirected(kind))?;
        let callback = slot.callback.take().unwrap_or_else(|| {
            debug!(stream = %kind, "no line callback registered, discarding lines");
            Box::new(|_: LineEvent| {})
        });
        let pump = AsyncStreamPump::start(kind, raw, &options, callback, slot.gate.clone())
            .map_err(|err| StreamError::io("spawn pump thread", err))?;
        slot.guard.claim_async()?;
        slot.reading.store(true, Ordering::Release);
        slot.pump = Some(pump);
        Ok(())
    }

    /// Stop delivering lines for `kind`. A no-op once the pump has ended.
    pub fn cancel_read(&mut self, kind: StreamKind) -> StreamResult<()> {
        let slot = self.slot(kind);
        slot.guard.check_cancel()?;
        match slot.pump.as_ref() {
            Some(pump) if pump.is_finished() => {
                debug!(stream = %kind, "cancel after terminal event ignored");
            }
            Some(pump) => {
                if pump.cancel() {
                    debug!(stream = %kind, "read cancelled");
                }
            }
            None => return Err(GuardViolation::NoPendingRead(kind).into()),
        }
        Ok(())
    }

    /// Handle for cancelling `kind` from another thread or its own callback.
    pub fn read_canceller(&self, kind: StreamKind) -> StreamResult<ReadCanceller> {
        if self.phase == ProcessPhase::NotStarted {
            return Err(GuardViolation::NotStarted(kind).into());
        }
        let slot = self.slot(kind);
        Ok(ReadCanceller {
            kind,
            gate: slot.gate.clone(),
            reading: Arc::clone(&slot.reading),
        })
    }

    /// Take the blocking reader for `kind`, ruling out a pump on it.
    pub fn blocking_reader(&mut self, kind: StreamKind) -> StreamResult<StreamReader> {
        let options = self.config.framer_options(kind);
        let slot = match kind {
            StreamKind::Output => &mut self.output,
            StreamKind::Error => &mut self.error,
        };
        slot.guard.claim_blocking()?;
        let raw = self
            .host
            .take_raw_handle(kind)
            .ok_or(GuardViolation::NotRedirected(kind))?;
        Ok(StreamReader::new(kind, raw, &options))
    }

    /// Wait for the process to exit.
    ///
    /// With a timeout, returns whether the OS process terminated in time and
    /// gives no guarantee about pending line events. Without one, also
    /// waits until every started pump has delivered its terminal event.
    pub fn wait_for_exit(&mut self, timeout: Option<Duration>) -> StreamResult<bool> {
        if self.phase == ProcessPhase::NotStarted {
            return Err(GuardViolation::ProcessNotStarted.into());
        }
        let pumps = self.output.pump.iter_mut().chain(self.error.pump.iter_mut());
        let exited = self.exit.wait(&mut self.host, timeout, pumps)?;
        if exited {
            self.phase = ProcessPhase::Exited;
        }
        Ok(exited)
    }

    /// Read failure recorded by the pump for `kind`, if any.
    pub fn read_fault(&self, kind: StreamKind) -> Option<PumpFault> {
        self.slot(kind).pump.as_ref().and_then(AsyncStreamPump::fault)
    }

    /// How the pump for `kind` ended, once it has.
    pub fn pump_end(&self, kind: StreamKind) -> Option<PumpEnd> {
        self.slot(kind).pump.as_ref().and_then(AsyncStreamPump::end)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.host.exit_code()
    }

    fn slot(&self, kind: StreamKind) -> &StreamSlot {
        match kind {
            StreamKind::Output => &self.output,
            StreamKind::Error => &self.error,
        }
    }

    fn slot_mut(&mut self, kind: StreamKind) -> &mut StreamSlot {
        match kind {
            StreamKind::Output => &mut self.output,
            StreamKind::Error => &mut self.error,
        }
    }
}

impl StreamedProcess<ChildHost> {
    /// Wrap `command`; nothing is spawned until [`start`](Self::start).
    pub fn from_command(command: Command, redirects: Redirects, config: StreamConfig) -> Self {
        Self::new(ChildHost::new(command, redirects), config)
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.host.take_stdin()
    }

    pub fn kill(&mut self) -> StreamResult<()> {
        self.host
            .kill()
            .map_err(|err| StreamError::io("kill process", err))
    }
}
