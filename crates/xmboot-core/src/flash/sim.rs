//! RAM-backed simulated flash controller.
//!
//! Models the properties the engine relies on: an unlock/lock gate,
//! page-granular erase to `0xFF`, NOR-style programming (bits can only be
//! cleared until the next erase) and readback. Fault injection hooks let
//! tests exercise the engine's failure accumulation.

use tracing::trace;

use super::region::MemoryRegion;
use super::traits::{FlashControl, FlashError};

pub struct SimFlash {
    region: MemoryRegion,
    /// Backing store for `[app_start, flash_end)`.
    mem: Vec<u8>,
    unlocked: bool,
    /// Addresses programmed, in call order.
    program_log: Vec<u32>,
    fail_program_at: Option<u32>,
    corrupt_readback_at: Option<u32>,
}

impl SimFlash {
    pub fn new(region: MemoryRegion) -> Self {
        Self {
            region,
            mem: vec![0xFF; region.capacity() as usize],
            unlocked: false,
            program_log: Vec::new(),
            fail_program_at: None,
            corrupt_readback_at: None,
        }
    }

    /// Make `program_word` fail at one address.
    pub fn fail_program_at(&mut self, address: u32) {
        self.fail_program_at = Some(address);
    }

    /// Make `read_word` return flipped bits at one address.
    pub fn corrupt_readback_at(&mut self, address: u32) {
        self.corrupt_readback_at = Some(address);
    }

    /// Entire simulated image region.
    pub fn bytes(&self) -> &[u8] {
        &self.mem
    }

    /// Addresses handed to `program_word`, in order.
    pub fn program_log(&self) -> &[u32] {
        &self.program_log
    }

    fn offset(&self, address: u32) -> Option<usize> {
        self.region
            .contains(address)
            .then(|| (address - self.region.app_start()) as usize)
    }

    /// Offset of a whole word; `None` if any of its four bytes would fall
    /// outside the region.
    fn word_offset(&self, address: u32) -> Option<usize> {
        let start = self.offset(address)?;
        (start + 4 <= self.mem.len()).then_some(start)
    }
}

impl FlashControl for SimFlash {
    fn region(&self) -> MemoryRegion {
        self.region
    }

    fn unlock(&mut self) {
        self.unlocked = true;
    }

    fn lock(&mut self) {
        self.unlocked = false;
    }

    fn wait_ready(&mut self) {
        // The simulated controller is always idle.
    }

    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        if !self.unlocked {
            return Err(FlashError::Locked { address });
        }
        if address % self.region.page_size() != 0 {
            return Err(FlashError::EraseFault { address });
        }
        let Some(start) = self.offset(address) else {
            return Err(FlashError::EraseFault { address });
        };
        let end = (start + self.region.page_size() as usize).min(self.mem.len());
        self.mem[start..end].fill(0xFF);
        trace!(address = %format!("{address:#010x}"), "Page erased");
        Ok(())
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError> {
        if !self.unlocked {
            return Err(FlashError::Locked { address });
        }
        if self.fail_program_at == Some(address) {
            return Err(FlashError::ProgramFault { address });
        }
        let Some(start) = self.word_offset(address) else {
            return Err(FlashError::ProgramFault { address });
        };
        self.program_log.push(address);
        // NOR cells: programming can only clear bits.
        for (i, byte) in word.to_le_bytes().iter().enumerate() {
            self.mem[start + i] &= byte;
        }
        Ok(())
    }

    fn read_word(&self, address: u32) -> u32 {
        let word = match self.word_offset(address) {
            Some(start) => u32::from_le_bytes([
                self.mem[start],
                self.mem[start + 1],
                self.mem[start + 2],
                self.mem[start + 3],
            ]),
            // Off-region reads float high like an erased bus.
            None => 0xFFFF_FFFF,
        };
        if self.corrupt_readback_at == Some(address) {
            !word
        } else {
            word
        }
    }
}
