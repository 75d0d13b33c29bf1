//! Coordinates waiting for process exit with draining the pumps.
//!
//! A timed wait only reports whether the OS process terminated. An untimed
//! wait additionally joins every started pump, so once it returns every
//! line event, terminal event included, has been delivered.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{StreamError, StreamResult};
use crate::io::host::ProcessHost;
use crate::io::pump::AsyncStreamPump;

#[derive(Debug, Default)]
pub struct ExitSynchronizer {
    exited: bool,
}

impl ExitSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Forget a previous exit; used when the process is started again.
    pub fn reset(&mut self) {
        self.exited = false;
    }

    #[instrument(skip_all, fields(timeout_ms = timeout.map(|t| t.as_millis() as u64)))]
    pub fn wait<'a, H, I>(
        &mut self,
        host: &mut H,
        timeout: Option<Duration>,
        pumps: I,
    ) -> StreamResult<bool>
    where
        H: ProcessHost + ?Sized,
        I: IntoIterator<Item = &'a mut AsyncStreamPump>,
    {
        if !self.exited {
            self.exited = host
                .wait_for_exit(timeout)
                .map_err(|err| StreamError::io("wait for process exit", err))?;
        }
        if !self.exited {
            return Ok(false);
        }
        if timeout.is_none() {
            for pump in pumps {
                debug!(stream = %pump.kind(), "draining pump");
                pump.join();
            }
        }
        Ok(true)
    }
}
