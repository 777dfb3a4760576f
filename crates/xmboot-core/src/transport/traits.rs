//! Serial transport abstraction.
//!
//! Defines the `SerialTransport` trait the receiver drives, allowing
//! different implementations (serialport, mock, etc.). The receiver owns the
//! transport exclusively for the duration of one transfer.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// No byte arrived before the deadline. A protocol-level event, not
    /// fatal until the receiver's retry bound is exhausted.
    #[error("No byte received within {timeout:?}")]
    Timeout { timeout: Duration },

    /// The transport was deinitialized or the device went away.
    #[error("Transport closed")]
    Closed,

    #[error("Failed to open {port}: {message}")]
    OpenFailed { port: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract byte-level serial interface.
///
/// All calls are blocking; reception is bounded by an explicit deadline
/// rather than an internal tick counter, so the suspension point and its
/// bound are visible to the caller.
pub trait SerialTransport {
    /// Transmit a single byte.
    fn send(&mut self, byte: u8) -> Result<(), TransportError>;

    /// Transmit a buffer in order.
    fn send_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        for &b in bytes {
            self.send(b)?;
        }
        Ok(())
    }

    /// Receive one byte, waiting at most `timeout`.
    fn recv_byte(&mut self, timeout: Duration) -> Result<u8, TransportError>;

    /// Reverse all setup performed when the transport was opened.
    ///
    /// Must be called before handing control to the application so it
    /// inherits a clean peripheral state. Any use after `deinit` fails with
    /// [`TransportError::Closed`].
    fn deinit(&mut self) -> Result<(), TransportError>;
}
