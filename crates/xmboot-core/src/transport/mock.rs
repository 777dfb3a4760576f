//! Mock serial transport for testing.

use std::collections::VecDeque;
use std::time::Duration;

use super::traits::{SerialTransport, TransportError};

/// One scripted reception event.
#[derive(Debug, Clone, Copy)]
enum ScriptStep {
    /// Deliver this byte.
    Byte(u8),
    /// Let the read deadline expire once.
    Timeout,
}

/// Scriptable transport for unit testing the receiver and session logic.
///
/// Incoming bytes are queued up front with [`feed`](Self::feed) /
/// [`feed_timeout`](Self::feed_timeout); everything the code under test
/// transmits is captured and inspectable via [`sent`](Self::sent). An
/// exhausted script behaves like a silent line: every read times out.
pub struct MockSerial {
    script: VecDeque<ScriptStep>,
    sent: Vec<u8>,
    closed: bool,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            sent: Vec::new(),
            closed: false,
        }
    }

    /// Queue bytes to be delivered in order.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.script.extend(bytes.iter().map(|&b| ScriptStep::Byte(b)));
    }

    /// Queue a single read timeout.
    pub fn feed_timeout(&mut self) {
        self.script.push_back(ScriptStep::Timeout);
    }

    /// Queue `n` consecutive read timeouts.
    pub fn feed_timeouts(&mut self, n: usize) {
        for _ in 0..n {
            self.feed_timeout();
        }
    }

    /// Everything transmitted so far, in order.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Whether `deinit` has been called.
    pub fn is_deinitialized(&self) -> bool {
        self.closed
    }

    /// Scripted bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport for MockSerial {
    fn send(&mut self, byte: u8) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.push(byte);
        Ok(())
    }

    fn recv_byte(&mut self, timeout: Duration) -> Result<u8, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.script.pop_front() {
            Some(ScriptStep::Byte(b)) => Ok(b),
            Some(ScriptStep::Timeout) | None => Err(TransportError::Timeout { timeout }),
        }
    }

    fn deinit(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}
