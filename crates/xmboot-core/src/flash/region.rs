//! Application image memory layout.

use super::traits::FlashError;

/// Flat, linearly addressed flash region holding the application image.
///
/// All erase/program operations are clipped to `[app_start, flash_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    app_start: u32,
    flash_end: u32,
    page_size: u32,
}

impl MemoryRegion {
    /// Build a region, enforcing the layout invariants: `page_size` is a
    /// power of two, `app_start` is page-aligned and the region is non-empty.
    pub fn new(app_start: u32, flash_end: u32, page_size: u32) -> Result<Self, FlashError> {
        if page_size == 0 || !page_size.is_power_of_two() {
            return Err(FlashError::BadPageSize { page_size });
        }
        if app_start % page_size != 0 {
            return Err(FlashError::MisalignedAppStart {
                app_start,
                page_size,
            });
        }
        if app_start >= flash_end {
            return Err(FlashError::EmptyRegion {
                app_start,
                flash_end,
            });
        }
        Ok(Self {
            app_start,
            flash_end,
            page_size,
        })
    }

    /// Base address of the application image.
    pub fn app_start(&self) -> u32 {
        self.app_start
    }

    /// First address past the programmable range.
    pub fn flash_end(&self) -> u32 {
        self.flash_end
    }

    /// Erase granularity in bytes.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Capacity of the image region in bytes.
    pub fn capacity(&self) -> u32 {
        self.flash_end - self.app_start
    }

    /// Align `address` down to the base of its containing page.
    pub fn page_base(&self, address: u32) -> u32 {
        address & !(self.page_size - 1)
    }

    /// Number of whole pages from `address` (page-aligned down) to the end
    /// of flash.
    pub fn pages_from(&self, address: u32) -> u32 {
        let base = self.page_base(address);
        if base >= self.flash_end {
            return 0;
        }
        (self.flash_end - base) / self.page_size
    }

    /// Whether `address` falls inside the programmable range.
    pub fn contains(&self, address: u32) -> bool {
        address >= self.app_start && address < self.flash_end
    }
}
