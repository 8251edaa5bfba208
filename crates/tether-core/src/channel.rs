//! Timeout-bounded reads with a sticky error flag

use std::io;
use std::time::Duration;

use tracing::{trace, warn};

use crate::connection::PortConnection;

/// Upper bound on a single read
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Read side of the bridge
///
/// The error flag is sticky: after the first I/O failure it stays set and no
/// further reads are attempted until the connection is closed or replaced.
#[derive(Debug, Default)]
pub struct ReadChannel {
    had_error: bool,
}

impl ReadChannel {
    /// Create a channel with the error flag cleared
    pub fn new() -> Self {
        Self::default()
    }

    /// Read whatever arrives within [`READ_TIMEOUT`]
    ///
    /// Returns an empty vector when nothing is open, on timeout, and on
    /// failure. Use [`has_error`](Self::has_error) to tell them apart.
    pub fn read_batch(&mut self, connection: &mut PortConnection) -> Vec<u8> {
        if self.had_error {
            return Vec::new();
        }
        let Some(result) = connection.read(READ_TIMEOUT) else {
            return Vec::new();
        };

        match result {
            Ok(bytes) => {
                if !bytes.is_empty() {
                    trace!("Read {} byte(s)", bytes.len());
                }
                bytes.to_vec()
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Vec::new(),
            Err(e) => {
                warn!("Read failed, marking channel as broken: {}", e);
                self.had_error = true;
                Vec::new()
            }
        }
    }

    /// Whether a read has ever failed on the current connection
    pub fn has_error(&self) -> bool {
        self.had_error
    }

    /// Clear the flag once the connection it describes is gone
    pub(crate) fn rearm(&mut self) {
        self.had_error = false;
    }
}
