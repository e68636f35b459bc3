use alloc::string::String;
use alloc::vec::Vec;
use core::convert::TryFrom;
use core::fmt;

#[cfg(feature = "std")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::device::FlashDevice;
use crate::{Error, Result};

/// Whole-image operations on a [`FlashDevice`].
///
/// Offsets are relative to the start of the flash and must be page aligned.
pub struct Flasher<'f, F: FlashDevice> {
    flash: &'f mut F,
}

impl<'f, F: FlashDevice> Flasher<'f, F> {
    #[cfg(feature = "std")]
    const DATA_PROGRESS_TPL: &'static str =
        " {msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}; {eta_precise})";
    #[cfg(feature = "std")]
    const DATA_PROGRESS_CHARS: &'static str = "=> ";

    pub fn new(flash: &'f mut F) -> Self {
        Flasher { flash }
    }

    /// Access the underlying flash for single operations.
    pub fn flash(&mut self) -> &mut F {
        &mut *self.flash
    }

    /// Erase the entire flash.
    ///
    /// Once erased, pages are no longer erased individually before writing.
    pub fn erase(&mut self) -> Result<()> {
        log::info!("Erasing {} flash", self.flash.name());
        self.flash.erase_all()?;
        self.flash.erase_auto(false);
        Ok(())
    }

    /// Write `data` to the flash starting at `offset`.
    ///
    /// The final page is padded with 0xFF.
    pub fn write(&mut self, data: &[u8], offset: u32) -> Result<()> {
        self.write_cb(data, offset, |_| {})
    }

    /// Write `data` to the flash starting at `offset`.
    ///
    /// Calls `cb` with the number of bytes written so far after each page.
    pub fn write_cb<C: Fn(usize)>(&mut self, data: &[u8], offset: u32, cb: C) -> Result<()> {
        let first_page = self.check_range(offset, data.len())?;
        let page_size = self.flash.page_size() as usize;
        log::debug!("Writing {} bytes from page {}", data.len(), first_page);

        let mut total_bytes = 0;
        cb(total_bytes);
        for (page, page_data) in (first_page..).zip(data.chunks(page_size)) {
            self.flash.load_buffer(page_data)?;
            self.flash.write_page(page)?;
            total_bytes += page_data.len();
            cb(total_bytes);
        }
        Ok(())
    }

    /// Write `data` to the flash starting at `offset`, drawing a progress bar
    /// to the terminal.
    #[cfg(feature = "std")]
    pub fn write_progress(&mut self, data: &[u8], offset: u32) -> Result<()> {
        let pb = Self::progress_bar(data.len(), "Writing");
        self.write_cb(data, offset, |n| pb.set_position(n as u64))?;
        pb.finish();
        Ok(())
    }

    /// Check the flash contents starting at `offset` match `data`.
    ///
    /// Returns `Error::ReadbackError` for the first mismatching byte.
    pub fn verify(&mut self, data: &[u8], offset: u32) -> Result<()> {
        self.verify_cb(data, offset, |_| {})
    }

    /// Check the flash contents starting at `offset` match `data`.
    ///
    /// Calls `cb` with the number of bytes checked so far after each page.
    pub fn verify_cb<C: Fn(usize)>(&mut self, data: &[u8], offset: u32, cb: C) -> Result<()> {
        let first_page = self.check_range(offset, data.len())?;
        let page_size = self.flash.page_size() as usize;
        let mut buffer = alloc::vec![0u8; page_size];

        let mut total_bytes = 0;
        cb(total_bytes);
        for (page, page_data) in (first_page..).zip(data.chunks(page_size)) {
            self.flash.read_page(page, &mut buffer)?;
            let address = self.flash.address() + page * page_size as u32;
            verify_readback(address, page_data, &buffer)?;
            total_bytes += page_data.len();
            cb(total_bytes);
        }
        Ok(())
    }

    /// Check the flash contents starting at `offset` match `data`, drawing a
    /// progress bar to the terminal.
    #[cfg(feature = "std")]
    pub fn verify_progress(&mut self, data: &[u8], offset: u32) -> Result<()> {
        let pb = Self::progress_bar(data.len(), "Verifying");
        self.verify_cb(data, offset, |n| pb.set_position(n as u64))?;
        pb.finish();
        Ok(())
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// A `length` of 0 reads up to the end of the flash.
    pub fn read(&mut self, offset: u32, length: usize) -> Result<Vec<u8>> {
        self.read_cb(offset, length, |_| {})
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// Calls `cb` with the number of bytes read so far after each page.
    pub fn read_cb<C: Fn(usize)>(&mut self, offset: u32, length: usize, cb: C)
        -> Result<Vec<u8>>
    {
        let length = self.read_length(offset, length)?;
        let first_page = self.check_range(offset, length)?;
        let page_size = self.flash.page_size() as usize;
        let mut buffer = alloc::vec![0u8; page_size];
        let mut data = Vec::with_capacity(length);

        cb(0);
        let mut page = first_page;
        while data.len() < length {
            self.flash.read_page(page, &mut buffer)?;
            let n = usize::min(page_size, length - data.len());
            data.extend_from_slice(&buffer[..n]);
            page += 1;
            cb(data.len());
        }
        Ok(data)
    }

    /// Read `length` bytes starting at `offset`, drawing a progress bar to the terminal.
    #[cfg(feature = "std")]
    pub fn read_progress(&mut self, offset: u32, length: usize) -> Result<Vec<u8>> {
        let length = self.read_length(offset, length)?;
        let pb = Self::progress_bar(length, "Reading");
        let result = self.read_cb(offset, length, |n| pb.set_position(n as u64));
        pb.finish();
        result
    }

    /// Lock or unlock the lock regions listed in `regions`.
    ///
    /// `regions` is a comma-separated list of region numbers, in decimal or
    /// 0x-prefixed hexadecimal. An empty list selects every region; when unlocking
    /// every region, regions holding reserved pages are left locked.
    pub fn lock(&mut self, regions: &str, enable: bool) -> Result<()> {
        let all = regions.trim().is_empty();
        for region in parse_regions(regions, self.flash.lock_region_count())? {
            log::debug!("{} region {}", if enable { "Locking" } else { "Unlocking" }, region);
            match self.flash.set_lock_region(region, enable) {
                Err(Error::ReservedPageViolation { page }) if all && !enable => {
                    log::warn!("Leaving region {} locked, it contains reserved page {}",
                               region, page);
                },
                result => result?,
            }
        }
        Ok(())
    }

    /// Collect a summary of the flash configuration and state.
    pub fn info(&mut self) -> Result<FlashInfo> {
        let lock_regions = self.flash.lock_region_count();
        let locked = if lock_regions > 0 {
            let mask = self.flash.lock_mask()?;
            (0..lock_regions).filter(|r| mask & (1 << *r) != 0).collect()
        } else {
            Vec::new()
        };
        let bod = if self.flash.can_bod() { Some(self.flash.get_bod()?) } else { None };
        let bor = if self.flash.can_bor() { Some(self.flash.get_bor()?) } else { None };
        let boot_flash = if self.flash.can_boot_flash() {
            Some(self.flash.get_boot_flash()?)
        } else {
            None
        };

        Ok(FlashInfo {
            name: String::from(self.flash.name()),
            address: self.flash.address(),
            pages: self.flash.page_count(),
            page_size: self.flash.page_size(),
            lock_regions,
            locked,
            security: self.flash.get_security()?,
            bod,
            bor,
            boot_flash,
        })
    }

    /// Check `length` bytes from `offset` fit in the flash, returning the first page.
    fn check_range(&self, offset: u32, length: usize) -> Result<u32> {
        let page_size = self.flash.page_size();
        if offset % page_size != 0 {
            log::error!("Offset 0x{:08X} is not a multiple of the page size {}",
                        offset, page_size);
            return Err(Error::InvalidOffset { offset });
        }
        let first_page = offset / page_size;
        let page_size = page_size as usize;
        let pages = length / page_size + (length % page_size != 0) as usize;
        let end_page = first_page.saturating_add(u32::try_from(pages).unwrap_or(u32::MAX));
        if end_page > self.flash.page_count() || first_page >= self.flash.page_count() {
            log::error!("{} bytes at offset 0x{:08X} do not fit in flash", length, offset);
            return Err(Error::PageOutOfRange { page: end_page.saturating_sub(1) });
        }
        Ok(first_page)
    }

    fn read_length(&self, offset: u32, length: usize) -> Result<usize> {
        if length != 0 {
            return Ok(length);
        }
        let total = self.flash.page_count() * self.flash.page_size();
        if offset >= total {
            return Err(Error::InvalidOffset { offset });
        }
        Ok((total - offset) as usize)
    }

    #[cfg(feature = "std")]
    fn progress_bar(length: usize, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(length as u64).with_style(ProgressStyle::default_bar()
            .template(Self::DATA_PROGRESS_TPL).progress_chars(Self::DATA_PROGRESS_CHARS));
        pb.set_message(msg);
        pb
    }
}

/// Compare programmed `data` with `new_data` read back from `address`.
///
/// Returns Err::ReadbackError on mismatch.
fn verify_readback(address: u32, data: &[u8], new_data: &[u8]) -> Result<()> {
    let mismatch = data.iter().zip(new_data).enumerate().find(|(_, (a, b))| a != b);
    match mismatch {
        Some((idx, (a, b))) => {
            let addr = address + idx as u32;
            log::error!("Readback mismatch at 0x{:08X}: Wrote 0x{:02X}, read 0x{:02X}",
                        addr, a, b);
            Err(Error::ReadbackError { address: addr, wrote: *a, read: *b })
        },
        None => Ok(()),
    }
}

/// Parse a comma-separated list of lock regions; an empty list selects all `count` regions.
fn parse_regions(regions: &str, count: u32) -> Result<Vec<u32>> {
    if regions.trim().is_empty() {
        return Ok((0..count).collect());
    }
    regions.split(',').map(|region| {
        let region = region.trim();
        let parsed = if let Some(hex) = region.strip_prefix("0x") {
            u32::from_str_radix(hex, 16)
        } else {
            region.parse::<u32>()
        };
        parsed.map_err(|_| {
            log::error!("Invalid lock region '{}'", region);
            Error::InvalidRegionList
        })
    }).collect()
}

/// Summary of a flash device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlashInfo {
    pub name: String,
    pub address: u32,
    pub pages: u32,
    pub page_size: u32,
    pub lock_regions: u32,
    /// Lock regions which currently read as locked.
    pub locked: Vec<u32>,
    pub security: bool,
    /// Brownout detect, if the device exposes it.
    pub bod: Option<bool>,
    /// Brownout reset, if the device exposes it.
    pub bor: Option<bool>,
    /// Boot from flash, if the device exposes it.
    pub boot_flash: Option<bool>,
}

impl fmt::Display for FlashInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Device       : {}", self.name)?;
        writeln!(f, "Address      : 0x{:08X}", self.address)?;
        writeln!(f, "Pages        : {}", self.pages)?;
        writeln!(f, "Page Size    : {} bytes", self.page_size)?;
        writeln!(f, "Total Size   : {}KB", self.pages * self.page_size / 1024)?;
        writeln!(f, "Lock Regions : {}", self.lock_regions)?;
        write!(f, "Locked       : ")?;
        if self.locked.is_empty() {
            write!(f, "none")?;
        }
        for (i, region) in self.locked.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", region)?;
        }
        writeln!(f)?;
        write!(f, "Security     : {}", self.security)?;
        if let Some(bod) = self.bod {
            write!(f, "\nBOD          : {}", bod)?;
        }
        if let Some(bor) = self.bor {
            write!(f, "\nBOR          : {}", bor)?;
        }
        if let Some(boot_flash) = self.boot_flash {
            write!(f, "\nBoot Flash   : {}", boot_flash)?;
        }
        Ok(())
    }
}

#[test]
fn test_parse_regions() {
    assert_eq!(parse_regions("", 4).unwrap(), alloc::vec![0, 1, 2, 3]);
    assert_eq!(parse_regions("  ", 2).unwrap(), alloc::vec![0, 1]);
    assert_eq!(parse_regions("1, 3,0x0A", 16).unwrap(), alloc::vec![1, 3, 10]);
    assert!(matches!(parse_regions("1,,2", 16), Err(Error::InvalidRegionList)));
    assert!(matches!(parse_regions("one", 16), Err(Error::InvalidRegionList)));
    assert!(matches!(parse_regions("-1", 16), Err(Error::InvalidRegionList)));
}

#[test]
fn test_verify_readback() {
    assert!(verify_readback(0x100, &[1, 2, 3], &[1, 2, 3, 0xFF]).is_ok());
    assert!(matches!(verify_readback(0x100, &[1, 2, 3], &[1, 9, 3]),
                     Err(Error::ReadbackError { address: 0x101, wrote: 2, read: 9 })));
}
