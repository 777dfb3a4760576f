//! Receiver state machine vocabulary and per-transfer session state.

use std::fmt;

/// Protocol state of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolState {
    /// Handshaking, no data packet accepted yet.
    #[default]
    AwaitFirst,
    /// At least one packet accepted, transfer in flight.
    Receiving,
    /// Terminal: transfer completed.
    Done,
    /// Terminal: transfer aborted or timed out.
    Failed,
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolState::AwaitFirst => write!(f, "AWAIT_FIRST"),
            ProtocolState::Receiving => write!(f, "RECEIVING"),
            ProtocolState::Done => write!(f, "DONE"),
            ProtocolState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Final outcome of one `receive` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Image fully received and durably written.
    Success,
    /// Sender cancelled, or the transfer died on a flash fault.
    Aborted,
    /// Handshake or retry budget exhausted.
    Timeout,
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Success => write!(f, "success"),
            TransferOutcome::Aborted => write!(f, "aborted"),
            TransferOutcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// Why a frame was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A byte deadline expired mid-frame or between frames.
    Timeout,
    /// Checksum/CRC trailer did not match the payload.
    BadChecksum,
    /// Sequence number was neither expected nor the previous one.
    BadSequence,
    /// Sequence complement byte inconsistent with the sequence byte.
    BadComplement,
    /// `EOT` before any data packet.
    UnexpectedEot,
    /// First byte of the frame was not a known header.
    UnknownHeader(u8),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Timeout => write!(f, "timeout"),
            RejectReason::BadChecksum => write!(f, "bad checksum"),
            RejectReason::BadSequence => write!(f, "bad sequence"),
            RejectReason::BadComplement => write!(f, "bad sequence complement"),
            RejectReason::UnexpectedEot => write!(f, "unexpected EOT"),
            RejectReason::UnknownHeader(b) => write!(f, "unknown header {b:#04x}"),
        }
    }
}

/// Transient state owned exclusively by the receiver for one transfer.
///
/// Created when a transfer begins and reset when it terminates.
#[derive(Debug)]
pub struct TransferSession {
    start: u32,
    write_cursor: u32,
    expected_sequence: u8,
    retry_count: u32,
    /// Sequence of the most recently accepted packet; duplicate retransmits
    /// of this one re-ACK without a second write.
    last_acked: Option<u8>,
    state: ProtocolState,
}

impl TransferSession {
    pub fn new(app_start: u32) -> Self {
        Self {
            start: app_start,
            write_cursor: app_start,
            expected_sequence: crate::protocol::constants::FIRST_SEQUENCE,
            retry_count: 0,
            last_acked: None,
            state: ProtocolState::AwaitFirst,
        }
    }

    pub fn reset(&mut self, app_start: u32) {
        *self = Self::new(app_start);
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn expected_sequence(&self) -> u8 {
        self.expected_sequence
    }

    pub fn write_cursor(&self) -> u32 {
        self.write_cursor
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn bytes_written(&self) -> u32 {
        self.write_cursor - self.start
    }

    /// Transition to a new protocol state.
    pub fn goto_state(&mut self, new_state: ProtocolState) {
        tracing::debug!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
    }

    /// Whether `sequence` is a retransmit of the packet already accepted
    /// (sender lost our ACK). Never true before the first accept.
    pub fn is_duplicate(&self, sequence: u8) -> bool {
        self.last_acked == Some(sequence)
    }

    /// Record an accepted packet of `len` payload bytes: advance the cursor
    /// and the expected sequence (wrapping mod 256), clear the consecutive
    /// retry budget.
    pub fn accept(&mut self, len: u32) {
        self.last_acked = Some(self.expected_sequence);
        self.expected_sequence = self.expected_sequence.wrapping_add(1);
        self.write_cursor += len;
        self.retry_count = 0;
        if self.state == ProtocolState::AwaitFirst {
            self.goto_state(ProtocolState::Receiving);
        }
    }

    pub fn bump_retry(&mut self) {
        self.retry_count += 1;
    }
}
