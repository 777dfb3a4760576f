//! Flash controller abstraction.
//!
//! The capability set is deliberately narrow (unlock/lock bracketing, page
//! erase, word program, readback) so the engine and the Xmodem receiver can
//! be exercised against a simulated controller.

use thiserror::Error;

use super::region::MemoryRegion;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("Page size {page_size:#x} is not a power of two")]
    BadPageSize { page_size: u32 },

    #[error("App start {app_start:#010x} is not aligned to {page_size:#x}-byte pages")]
    MisalignedAppStart { app_start: u32, page_size: u32 },

    #[error("Empty region: app start {app_start:#010x} is not below flash end {flash_end:#010x}")]
    EmptyRegion { app_start: u32, flash_end: u32 },

    #[error("Controller locked during operation at {address:#010x}")]
    Locked { address: u32 },

    #[error("Erase fault at {address:#010x}")]
    EraseFault { address: u32 },

    #[error("Program fault at {address:#010x}")]
    ProgramFault { address: u32 },
}

/// Low-level flash controller capabilities.
///
/// Mutating operations are only legal inside an `unlock`/`lock` bracket;
/// the bracket is never re-entered, execution being single-threaded.
pub trait FlashControl {
    /// Layout of the programmable region this controller fronts.
    fn region(&self) -> MemoryRegion;

    /// Open the controller for erase/program operations.
    fn unlock(&mut self);

    /// Close the controller again.
    fn lock(&mut self);

    /// Block until the previous erase/program operation has finished.
    fn wait_ready(&mut self);

    /// Erase the page starting at `address` (must be page-aligned).
    fn erase_page(&mut self, address: u32) -> Result<(), FlashError>;

    /// Program one word at `address`.
    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError>;

    /// Read one word back from `address`.
    fn read_word(&self, address: u32) -> u32;
}
