//! Event system for UI decoupling.
//!
//! Lets a CLI or any other front end follow a boot session without coupling
//! it to the protocol internals.

use crate::flash::WriteStatus;
use crate::handoff::VectorTable;
use crate::protocol::TransferMode;
use crate::state::{RejectReason, TransferOutcome};

/// Events emitted while a boot session runs.
#[derive(Debug, Clone)]
pub enum BootEvent {
    /// A whole-transfer attempt began (prompt transmitted, flash erased).
    AttemptStarted { attempt: u32, mode: TransferMode },
    /// A start-of-transfer control byte went out.
    HandshakeSent { attempt: u32 },
    /// A validated packet was durably written and acknowledged.
    PacketAccepted {
        sequence: u8,
        length: usize,
        address: u32,
    },
    /// Retransmit of the previously accepted packet, re-acknowledged
    /// without a second write.
    DuplicateAcknowledged { sequence: u8 },
    /// A frame failed validation and was NAKed.
    FrameRejected { reason: RejectReason, retries: u32 },
    /// The flash engine reported a non-OK status; the transfer aborts.
    FlashDegraded { status: WriteStatus },
    /// One `receive` call finished.
    TransferFinished {
        outcome: TransferOutcome,
        bytes_written: u32,
    },
    /// The failure-retry notice went out, another attempt follows.
    RetryNoticeSent { attempt: u32 },
    /// Transfer verified; these vectors are about to take over the core.
    HandoffReady { vectors: VectorTable },
}

/// Observer trait for receiving boot events.
///
/// Implement this in the front-end layer to receive updates.
pub trait BootObserver {
    fn on_event(&self, event: &BootEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl BootObserver for NullObserver {
    fn on_event(&self, _event: &BootEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl BootObserver for TracingObserver {
    fn on_event(&self, event: &BootEvent) {
        match event {
            BootEvent::AttemptStarted { attempt, mode } => {
                tracing::info!(attempt, mode = %mode, "Transfer attempt started");
            }
            BootEvent::HandshakeSent { attempt } => {
                tracing::trace!(attempt, "Handshake byte sent");
            }
            BootEvent::PacketAccepted {
                sequence,
                length,
                address,
            } => {
                tracing::debug!(
                    sequence,
                    length,
                    address = %format!("{address:#010x}"),
                    "Packet accepted"
                );
            }
            BootEvent::DuplicateAcknowledged { sequence } => {
                tracing::debug!(sequence, "Duplicate packet re-acknowledged");
            }
            BootEvent::FrameRejected { reason, retries } => {
                tracing::warn!(%reason, retries, "Frame rejected");
            }
            BootEvent::FlashDegraded { status } => {
                tracing::error!(%status, "Flash write degraded, aborting transfer");
            }
            BootEvent::TransferFinished {
                outcome,
                bytes_written,
            } => {
                tracing::info!(%outcome, bytes_written, "Transfer finished");
            }
            BootEvent::RetryNoticeSent { attempt } => {
                tracing::warn!(attempt, "Transfer failed, retry notice sent");
            }
            BootEvent::HandoffReady { vectors } => {
                tracing::info!(
                    initial_sp = %format!("{:#010x}", vectors.initial_sp),
                    reset_vector = %format!("{:#010x}", vectors.reset_vector),
                    "Image verified, ready for handoff"
                );
            }
        }
    }
}
