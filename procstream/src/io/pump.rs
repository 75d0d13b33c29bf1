//! Background line pump for one redirected stream.
//!
//! Each pump owns a dedicated thread that frames the stream into lines and
//! hands every line to the caller's callback, in arrival order, then finishes
//! with exactly one terminal event. The callback runs on the pump thread, so
//! a slow callback only delays its own stream.

use std::io::{self, Read};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::core::framer::{FramerOptions, LineFramer};
use crate::core::gate::CancellationGate;
use crate::core::types::{LineCallback, LineEvent, PumpEnd, PumpFault, StreamKind};

#[derive(Debug, Default)]
struct PumpStatus {
    end: Option<PumpEnd>,
    fault: Option<PumpFault>,
    delivered: u64,
}

#[derive(Debug, Default)]
struct PumpShared {
    status: Mutex<PumpStatus>,
}

impl PumpShared {
    fn update<T>(&self, f: impl FnOnce(&mut PumpStatus) -> T) -> T {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status)
    }
}

pub struct AsyncStreamPump {
    kind: StreamKind,
    gate: CancellationGate,
    shared: Arc<PumpShared>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncStreamPump {
    /// Spawn the pump thread and return immediately.
    ///
    /// `reader` is owned by the pump and dropped exactly once, after the
    /// terminal event has been delivered.
    pub fn start<R>(
        kind: StreamKind,
        reader: R,
        options: &FramerOptions,
        callback: LineCallback,
        gate: CancellationGate,
    ) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let shared = Arc::new(PumpShared::default());
        let framer = options.framer(reader);
        let thread_gate = gate.clone();
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("procstream-{kind}"))
            .spawn(move || run_pump(kind, framer, callback, thread_gate, thread_shared))?;
        debug!(stream = %kind, encoding = ?options.encoding, "pump started");
        Ok(Self {
            kind,
            gate,
            shared,
            handle: Some(handle),
        })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Request cancellation. Returns `true` if this call set the flag.
    pub fn cancel(&self) -> bool {
        self.gate.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }

    /// Whether the terminal event has been delivered.
    pub fn is_finished(&self) -> bool {
        self.end().is_some()
    }

    pub fn end(&self) -> Option<PumpEnd> {
        self.shared.update(|status| status.end)
    }

    pub fn fault(&self) -> Option<PumpFault> {
        self.shared.update(|status| status.fault.clone())
    }

    /// Lines handed to the callback so far, excluding the terminal event.
    pub fn delivered(&self) -> u64 {
        self.shared.update(|status| status.delivered)
    }

    /// Block until the pump thread exits. Idempotent.
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.join().is_err() {
            warn!(stream = %self.kind, "pump thread panicked");
            self.shared.update(|status| {
                status.end.get_or_insert(PumpEnd::Failed);
                status
                    .fault
                    .get_or_insert_with(|| PumpFault::callback_panicked(self.kind));
            });
        }
    }
}

fn run_pump<R: Read>(
    kind: StreamKind,
    mut framer: LineFramer<R>,
    mut callback: LineCallback,
    gate: CancellationGate,
    shared: Arc<PumpShared>,
) {
    let mut callback_alive = true;
    let end = loop {
        if gate.is_cancelled() {
            break PumpEnd::Cancelled;
        }
        match framer.next_line() {
            Ok(Some(line)) => {
                // Read raced with cancel: drop the line.
                if gate.is_cancelled() {
                    break PumpEnd::Cancelled;
                }
                if !deliver(&mut callback, LineEvent::line(kind, line)) {
                    warn!(stream = %kind, "line callback panicked");
                    shared.update(|status| status.fault = Some(PumpFault::callback_panicked(kind)));
                    callback_alive = false;
                    break PumpEnd::Failed;
                }
                shared.update(|status| status.delivered += 1);
            }
            Ok(None) => break PumpEnd::EndOfStream,
            Err(err) => {
                warn!(stream = %kind, err = %err, "read failed, ending pump");
                shared.update(|status| status.fault = Some(PumpFault::from_io(kind, &err)));
                break PumpEnd::Failed;
            }
        }
    };

    if callback_alive && !deliver(&mut callback, LineEvent::terminal(kind)) {
        shared.update(|status| {
            status
                .fault
                .get_or_insert_with(|| PumpFault::callback_panicked(kind));
        });
    }
    let delivered = shared.update(|status| {
        status.end = Some(end);
        status.delivered
    });
    info!(stream = %kind, lines = delivered, end = ?end, "pump reached terminal state");

    if end == PumpEnd::Cancelled {
        // Keep the child from blocking on a full pipe.
        let mut reader = framer.into_inner();
        match io::copy(&mut reader, &mut io::sink()) {
            Ok(discarded) => debug!(stream = %kind, discarded, "drained cancelled stream"),
            Err(err) => debug!(stream = %kind, err = %err, "drain after cancel stopped"),
        }
    }
}

fn deliver(callback: &mut LineCallback, event: LineEvent) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_ok()
}
