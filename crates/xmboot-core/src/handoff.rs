//! Transfer of control to the freshly written application.
//!
//! The image head follows the hardware's native exception-vector
//! convention: word 0 holds the application's initial stack pointer, word 1
//! its reset-vector entry address. The bootloader reads that pair as a
//! fixed-layout record and hands it to an opaque, irreversible handoff
//! operation.

use crate::flash::{FlashControl, FlashEngine, WORD_BYTES};

/// First two words of the application image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorTable {
    /// Initial value of the active stack pointer.
    pub initial_sp: u32,
    /// Entry address execution is transferred to.
    pub reset_vector: u32,
}

impl VectorTable {
    /// Read the vector pair from the head of the image region.
    pub fn read_from<F: FlashControl>(engine: &FlashEngine<F>) -> Self {
        let base = engine.app_start();
        Self {
            initial_sp: engine.read_word(base),
            reset_vector: engine.read_word(base + WORD_BYTES),
        }
    }
}

/// Irreversible jump into the application.
///
/// Implementations must only be invoked after a transfer reported
/// [`TransferOutcome::Success`](crate::state::TransferOutcome::Success) and
/// after the serial transport has been deinitialized, so the application
/// inherits clean peripherals. The call consumes the implementor and never
/// returns; a corrupt image yields undefined behavior, since verification
/// already happened during the write phase.
pub trait Handoff {
    fn handoff(self, vectors: VectorTable) -> !;
}
