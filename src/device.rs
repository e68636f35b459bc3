use crate::Result;

/// Operations every flash variant supports.
///
/// Implemented by [`Flash`](crate::Flash) for both the main flash array and the
/// user page; orchestration in [`Flasher`](crate::Flasher) is written against this
/// trait only.
///
/// Brownout and boot-source bits are only meaningful when the matching `can_*`
/// capability is true. On other devices the getters return `false` and the
/// setters do nothing, so callers should consult the capability first.
pub trait FlashDevice {
    /// Device family name.
    fn name(&self) -> &str;

    /// Address of the first page.
    fn address(&self) -> u32;

    fn page_size(&self) -> u32;

    fn page_count(&self) -> u32;

    fn lock_region_count(&self) -> u32;

    /// Erase the entire addressable region.
    fn erase_all(&mut self) -> Result<()>;

    /// Enable or disable erasing each page before it is written.
    fn erase_auto(&mut self, enable: bool);

    /// Check if any lock region is locked.
    fn is_locked(&mut self) -> Result<bool>;

    /// Read the raw lock bitmask, bit n set when region n reads as locked.
    fn lock_mask(&mut self) -> Result<u32>;

    fn get_lock_region(&mut self, region: u32) -> Result<bool>;

    /// Lock or unlock `region`, doing nothing if it is already in that state.
    fn set_lock_region(&mut self, region: u32, enable: bool) -> Result<()>;

    fn get_security(&mut self) -> Result<bool>;

    /// Set the security bit. This cannot be undone through the flash controller.
    fn set_security(&mut self) -> Result<()>;

    fn can_bod(&self) -> bool;
    fn get_bod(&mut self) -> Result<bool>;
    fn set_bod(&mut self, enable: bool) -> Result<()>;

    fn can_bor(&self) -> bool;
    fn get_bor(&mut self) -> Result<bool>;
    fn set_bor(&mut self, enable: bool) -> Result<()>;

    fn can_boot_flash(&self) -> bool;
    fn get_boot_flash(&mut self) -> Result<bool>;
    fn set_boot_flash(&mut self, enable: bool) -> Result<()>;

    /// Load up to one page of `data` into the staging buffer used by the next
    /// `write_page()`, padding with 0xFF.
    fn load_buffer(&mut self, data: &[u8]) -> Result<()>;

    /// Program `page` from the previously loaded staging buffer.
    fn write_page(&mut self, page: u32) -> Result<()>;

    /// Read `page` into the first `page_size()` bytes of `data`.
    fn read_page(&mut self, page: u32, data: &mut [u8]) -> Result<()>;
}
