//! Test-only hosts, readers and recorders for driving pumps deterministically.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::core::types::{LineEvent, StreamKind};
use crate::io::child::Redirects;
use crate::io::host::{ProcessHost, RawStream};

/// Manually signalled "process exited" flag.
#[derive(Debug, Clone, Default)]
pub struct ExitLatch {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ExitLatch {
    pub fn signal(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_signalled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self) {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn wait(&self, timeout: Option<Duration>) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        match timeout {
            Some(timeout) => {
                let (guard, _) = cvar
                    .wait_timeout_while(guard, timeout, |exited| !*exited)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard
            }
            None => *cvar
                .wait_while(guard, |exited| !*exited)
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// In-memory [`ProcessHost`]: streams come from supplied readers and exit is
/// controlled through an [`ExitLatch`].
pub struct ScriptedHost {
    redirects: Redirects,
    staged: VecDeque<(Option<RawStream>, Option<RawStream>)>,
    output: Option<RawStream>,
    error: Option<RawStream>,
    exit_on_start: bool,
    exit_code: i32,
    withheld: u32,
    latch: ExitLatch,
    starts: u32,
}

impl ScriptedHost {
    pub fn new(redirects: Redirects) -> Self {
        Self {
            redirects,
            staged: VecDeque::new(),
            output: None,
            error: None,
            exit_on_start: false,
            exit_code: 0,
            withheld: 0,
            latch: ExitLatch::default(),
            starts: 0,
        }
    }

    /// Queue the stream contents for the next `start`. Call again to script restarts.
    pub fn with_run<O, E>(mut self, output: Option<O>, error: Option<E>) -> Self
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        self.staged.push_back((
            output.map(|r| Box::new(r) as RawStream),
            error.map(|r| Box::new(r) as RawStream),
        ));
        self
    }

    pub fn with_output<O: Read + Send + 'static>(self, output: O) -> Self {
        self.with_run(Some(output), None::<io::Empty>)
    }

    pub fn with_error<E: Read + Send + 'static>(self, error: E) -> Self {
        self.with_run(None::<io::Empty>, Some(error))
    }

    pub fn with_streams<O, E>(self, output: O, error: E) -> Self
    where
        O: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        self.with_run(Some(output), Some(error))
    }

    /// The process counts as exited as soon as it starts.
    pub fn exits_immediately(mut self) -> Self {
        self.exit_on_start = true;
        self
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// The next `count` handle requests find no pipe, as if it had been
    /// closed underneath the host.
    pub fn withholding_handles(mut self, count: u32) -> Self {
        self.withheld = count;
        self
    }

    pub fn latch(&self) -> ExitLatch {
        self.latch.clone()
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }
}

impl ProcessHost for ScriptedHost {
    fn start(&mut self) -> io::Result<()> {
        let (output, error) = self.staged.pop_front().unwrap_or((None, None));
        self.output = output;
        self.error = error;
        self.starts += 1;
        if self.exit_on_start {
            self.latch.signal();
        } else {
            self.latch.reset();
        }
        Ok(())
    }

    fn has_started(&self) -> bool {
        self.starts > 0
    }

    fn is_redirected(&self, kind: StreamKind) -> bool {
        self.redirects.contains(kind)
    }

    fn take_raw_handle(&mut self, kind: StreamKind) -> Option<RawStream> {
        if !self.redirects.contains(kind) {
            return None;
        }
        if self.withheld > 0 {
            self.withheld -= 1;
            return None;
        }
        let slot = match kind {
            StreamKind::Output => &mut self.output,
            StreamKind::Error => &mut self.error,
        };
        Some(slot.take().unwrap_or_else(|| Box::new(io::empty())))
    }

    fn wait_for_exit(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        Ok(self.latch.wait(timeout))
    }

    fn exit_code(&self) -> Option<i32> {
        self.latch.is_signalled().then_some(self.exit_code)
    }
}

/// Reader returning one scripted chunk per `read` call, fixing read boundaries.
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
}

impl ChunkedReader {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
        }
    }

    /// Deliver `bytes` one byte per read.
    pub fn byte_at_a_time(bytes: &[u8]) -> Self {
        Self::new(bytes.iter().map(std::slice::from_ref))
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

/// Writing half of [`channel_reader`]. Dropping it ends the stream.
pub struct ChunkSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChunkSender {
    pub fn send(&self, bytes: impl AsRef<[u8]>) {
        let _ = self.tx.send(bytes.as_ref().to_vec());
    }

    pub fn close(self) {}
}

/// Reader that blocks until a test thread sends bytes.
pub struct ChannelReader {
    rx: mpsc::Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

pub fn channel_reader() -> (ChunkSender, ChannelReader) {
    let (tx, rx) = mpsc::channel();
    (
        ChunkSender { tx },
        ChannelReader {
            rx,
            leftover: Vec::new(),
        },
    )
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv() {
                Ok(bytes) => self.leftover = bytes,
                Err(_) => return Ok(0),
            }
        }
        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

/// Reader that yields `prefix` and then fails.
pub struct FailingReader {
    prefix: Option<Vec<u8>>,
    kind: io::ErrorKind,
}

impl FailingReader {
    pub fn after(prefix: &[u8], kind: io::ErrorKind) -> Self {
        Self {
            prefix: Some(prefix.to_vec()),
            kind,
        }
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.prefix.take() {
            Some(prefix) if !prefix.is_empty() => {
                let n = prefix.len().min(buf.len());
                buf[..n].copy_from_slice(&prefix[..n]);
                if n < prefix.len() {
                    self.prefix = Some(prefix[n..].to_vec());
                }
                Ok(n)
            }
            _ => Err(io::Error::new(self.kind, "scripted read failure")),
        }
    }
}

/// Thread-safe recorder of delivered line events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    inner: Arc<(Mutex<Vec<LineEvent>>, Condvar)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback that appends every event to this log.
    pub fn callback(&self) -> impl FnMut(LineEvent) + Send + 'static {
        let log = self.clone();
        move |event| log.push(event)
    }

    pub fn push(&self, event: LineEvent) {
        let (lock, cvar) = &*self.inner;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        cvar.notify_all();
    }

    pub fn events(&self) -> Vec<LineEvent> {
        self.inner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn texts(&self) -> Vec<Option<String>> {
        self.events().into_iter().map(|event| event.data).collect()
    }

    /// Block until at least `count` events were recorded or `timeout` passes.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut events = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while events.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = cvar
                .wait_timeout(events, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Shorthand for an expected callback sequence.
pub fn lines(texts: &[&str]) -> Vec<Option<String>> {
    let mut out: Vec<Option<String>> = texts.iter().map(|t| Some(t.to_string())).collect();
    out.push(None);
    out
}
