//! Erase/program/verify engine.
//!
//! The engine owns the only mutating access to the image region. Every
//! programmed word is immediately read back and compared; failures
//! accumulate in [`WriteStatus`] instead of short-circuiting, so one pass
//! reports complete diagnostics. Re-running a write after a partial failure
//! is not safe on memories where programming is not idempotent without an
//! erase.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, warn};

use super::region::MemoryRegion;
use super::traits::{FlashControl, FlashError};

/// Width of one programming unit.
pub const WORD_BYTES: u32 = 4;

/// Accumulated outcome of one `write` call. Flags are independent; several
/// can be set by a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStatus {
    /// Input ran past the end of the programmable region.
    pub size_exceeded: bool,
    /// The controller reported a programming fault.
    pub program_failed: bool,
    /// A programmed word read back with different contents.
    pub readback_mismatch: bool,
}

impl WriteStatus {
    pub fn is_ok(&self) -> bool {
        !self.size_exceeded && !self.program_failed && !self.readback_mismatch
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "ok");
        }
        let mut flags = Vec::new();
        if self.size_exceeded {
            flags.push("size-exceeded");
        }
        if self.program_failed {
            flags.push("program-failed");
        }
        if self.readback_mismatch {
            flags.push("readback-mismatch");
        }
        write!(f, "{}", flags.join("+"))
    }
}

/// Flash engine over an abstract controller.
pub struct FlashEngine<F: FlashControl> {
    ctl: F,
}

impl<F: FlashControl> FlashEngine<F> {
    pub fn new(ctl: F) -> Self {
        Self { ctl }
    }

    /// Layout of the region this engine programs.
    pub fn region(&self) -> MemoryRegion {
        self.ctl.region()
    }

    /// Base address of the application image.
    pub fn app_start(&self) -> u32 {
        self.ctl.region().app_start()
    }

    /// Read one word, e.g. for vector-table extraction.
    pub fn read_word(&self, address: u32) -> u32 {
        self.ctl.read_word(address)
    }

    /// Access the underlying controller (simulated backends expose their
    /// memory for inspection).
    pub fn controller(&self) -> &F {
        &self.ctl
    }

    /// Erase every page from the one containing `address` to the end of
    /// flash. The erase is unconditional; callers must not assume a partial
    /// range survives.
    pub fn erase(&mut self, address: u32) -> Result<(), FlashError> {
        self.ctl.unlock();
        let result = self.erase_unlocked(address);
        self.ctl.lock();
        result
    }

    fn erase_unlocked(&mut self, address: u32) -> Result<(), FlashError> {
        let region = self.ctl.region();
        let mut page = region.page_base(address);
        let pages = region.pages_from(address);
        debug!(from = %format!("{page:#010x}"), pages, "Erasing");
        for _ in 0..pages {
            self.ctl.wait_ready();
            self.ctl.erase_page(page)?;
            page += region.page_size();
        }
        Ok(())
    }

    /// Program `data` starting at `address`, word by word, verifying each
    /// word by readback. Returns the accumulated status; the loop never
    /// stops early, so all failure flags from one pass are reported
    /// together.
    ///
    /// Once the cursor reaches the end of flash it stops advancing;
    /// remaining input is still scanned but never written.
    pub fn write(&mut self, address: u32, data: &[u8]) -> WriteStatus {
        let region = self.ctl.region();
        let mut status = WriteStatus::default();
        let mut cursor = address;

        self.ctl.unlock();
        for chunk in data.chunks(WORD_BYTES as usize) {
            if cursor >= region.flash_end() {
                status.size_exceeded = true;
                continue;
            }

            let word = pack_word(chunk);
            self.ctl.wait_ready();
            match self.ctl.program_word(cursor, word) {
                Ok(()) => {
                    if self.ctl.read_word(cursor) != word {
                        warn!(address = %format!("{cursor:#010x}"), "Readback mismatch");
                        status.readback_mismatch = true;
                    }
                }
                Err(e) => {
                    warn!(address = %format!("{cursor:#010x}"), error = %e, "Program fault");
                    status.program_failed = true;
                }
            }
            cursor += WORD_BYTES;
        }
        self.ctl.lock();

        status
    }
}

/// Pack up to four payload bytes into a little-endian word, padding the
/// tail with the erased-cell value.
fn pack_word(chunk: &[u8]) -> u32 {
    if chunk.len() == WORD_BYTES as usize {
        LittleEndian::read_u32(chunk)
    } else {
        let mut buf = [0xFFu8; WORD_BYTES as usize];
        buf[..chunk.len()].copy_from_slice(chunk);
        LittleEndian::read_u32(&buf)
    }
}
