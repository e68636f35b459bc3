use crate::{Error, Result};

/// Base address of the FLASHCALW controller registers on SAM4L devices.
pub const FLASHCALW_REGS: u32 = 0x400A_0000;

/// Largest number of pages addressable through the FCMD page field on supported parts.
pub const MAX_PAGES: u32 = 1024;

/// Largest number of lock regions representable in the FSR lock mask.
pub const MAX_LOCK_REGIONS: u32 = 32;

/// Per-chip flash configuration.
///
/// These are the constants a chip identification table supplies for each supported
/// device. They are checked against the hardware when a [`Flash`](crate::Flash) is
/// constructed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashConfig {
    /// Human readable device family name.
    pub name: &'static str,
    /// Address of the first flash page.
    pub address: u32,
    /// Number of pages.
    pub pages: u32,
    /// Page size in bytes.
    pub size: u32,
    /// Number of lock regions.
    pub lock_regions: u32,
    /// Size in bytes of the region at the start of flash holding the boot monitor.
    pub reserved_size: u32,
    /// RAM address of the resident page transfer routine.
    pub user: u32,
    /// Stack top used by the monitor while running code on the target.
    ///
    /// Informational: the monitor sets up the stack itself when asked to execute
    /// the transfer routine, so the driver only reports this value.
    pub stack: u32,
    /// Base address of the flash controller registers.
    pub regs: u32,
    /// Whether brownout detect/reset configuration can be exposed.
    pub can_brownout: bool,
    /// Size in bytes of the page transfer routine, the staging buffers follow it.
    pub applet_size: u32,
}

impl FlashConfig {
    /// Default size reserved for the transfer routine in front of the staging buffers.
    pub const DEFAULT_APPLET_SIZE: u32 = 0x40;

    /// Create a configuration for the main flash array.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        address: u32,
        pages: u32,
        size: u32,
        lock_regions: u32,
        reserved_size: u32,
        user: u32,
        stack: u32,
        regs: u32,
        can_brownout: bool,
    ) -> Self {
        FlashConfig {
            name,
            address,
            pages,
            size,
            lock_regions,
            reserved_size,
            user,
            stack,
            regs,
            can_brownout,
            applet_size: Self::DEFAULT_APPLET_SIZE,
        }
    }

    /// Set the size of the resident page transfer routine.
    pub fn with_applet_size(mut self, applet_size: u32) -> Self {
        self.applet_size = applet_size;
        self
    }

    /// Derive the configuration of the user page at `address` from this configuration.
    ///
    /// The user page is a single page with no lock regions and nothing reserved,
    /// sharing the controller, RAM layout and page size of the main array.
    pub fn user_page(&self, address: u32) -> Self {
        FlashConfig {
            address,
            pages: 1,
            lock_regions: 0,
            reserved_size: 0,
            can_brownout: false,
            ..*self
        }
    }

    /// Check the configuration is self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.pages == 0 || self.pages > MAX_PAGES {
            log::error!("Invalid page count {}", self.pages);
            return Err(Error::InvalidGeometry);
        }
        if self.lock_regions > MAX_LOCK_REGIONS || self.lock_regions > self.pages {
            log::error!("Invalid lock region count {}", self.lock_regions);
            return Err(Error::InvalidGeometry);
        }
        if self.size == 0 || self.size % 4 != 0 {
            log::error!("Invalid page size {}", self.size);
            return Err(Error::InvalidGeometry);
        }
        if self.reserved_size % self.size != 0 {
            log::error!("Reserved region of {} bytes does not end on a page boundary",
                        self.reserved_size);
            return Err(Error::MisalignedReservedRegion {
                size: self.reserved_size, page_size: self.size
            });
        }
        if self.reserved_size / self.size > self.pages {
            log::error!("Reserved region of {} bytes exceeds the flash", self.reserved_size);
            return Err(Error::InvalidGeometry);
        }
        Ok(())
    }

    /// Validate this configuration against the page size reported by the hardware,
    /// returning the resulting geometry.
    pub fn geometry(&self, detected_page_size: u32) -> Result<FlashGeometry> {
        self.validate()?;
        if detected_page_size != self.size {
            log::error!("Configured page size {} but hardware reports {}",
                        self.size, detected_page_size);
            return Err(Error::GeometryMismatch {
                configured: self.size, detected: detected_page_size
            });
        }
        let geometry = FlashGeometry {
            address: self.address,
            pages: self.pages,
            page_size: self.size,
            lock_regions: self.lock_regions,
            user: self.user,
            stack: self.stack,
            reserved_pages: self.reserved_size / self.size,
        };
        log::debug!("Flash geometry: {:?}", geometry);
        Ok(geometry)
    }
}

/// Flash layout fixed for the lifetime of a driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlashGeometry {
    pub address: u32,
    pub pages: u32,
    pub page_size: u32,
    pub lock_regions: u32,
    pub user: u32,
    /// Monitor stack top, reported only.
    pub stack: u32,
    /// Pages at the start of flash which back the running boot monitor.
    pub reserved_pages: u32,
}

impl FlashGeometry {
    /// Total flash size in bytes.
    pub fn total_size(&self) -> u32 {
        self.pages * self.page_size
    }

    /// Absolute address of `page`.
    pub fn page_address(&self, page: u32) -> u32 {
        self.address + page * self.page_size
    }

    /// First page covered by lock region `region`.
    ///
    /// Only meaningful when the flash has lock regions.
    pub fn region_first_page(&self, region: u32) -> u32 {
        region * self.pages / self.lock_regions
    }

    /// Number of pages in each lock region.
    pub fn region_pages(&self) -> u32 {
        if self.lock_regions == 0 {
            0
        } else {
            self.pages / self.lock_regions
        }
    }

    pub fn is_reserved(&self, page: u32) -> bool {
        page < self.reserved_pages
    }
}

#[cfg(test)]
fn sam4l() -> FlashConfig {
    FlashConfig::new("ATSAM4L", 0, 1024, 512, 16, 0x2000, 0x2000_1000, 0x2000_8000,
                     FLASHCALW_REGS, false)
}

#[test]
fn test_geometry() {
    let geometry = sam4l().geometry(512).unwrap();
    assert_eq!(geometry.reserved_pages, 16);
    assert_eq!(geometry.total_size(), 512 * 1024);
    assert_eq!(geometry.page_address(20), 20 * 512);
    assert_eq!(geometry.region_pages(), 64);
    assert_eq!(geometry.region_first_page(3), 192);
    assert!(geometry.is_reserved(15));
    assert!(!geometry.is_reserved(16));
    assert_eq!(geometry.user, 0x2000_1000);
    assert_eq!(geometry.stack, 0x2000_8000);
}

#[test]
fn test_geometry_mismatch() {
    assert!(matches!(sam4l().geometry(256),
                     Err(Error::GeometryMismatch { configured: 512, detected: 256 })));
}

#[test]
fn test_invalid_config() {
    let mut config = sam4l();
    config.reserved_size = 0x2100;
    assert!(matches!(config.validate(),
                     Err(Error::MisalignedReservedRegion { size: 0x2100, page_size: 512 })));

    let mut config = sam4l();
    config.pages = 2048;
    assert!(matches!(config.validate(), Err(Error::InvalidGeometry)));

    let mut config = sam4l();
    config.lock_regions = 33;
    assert!(matches!(config.validate(), Err(Error::InvalidGeometry)));
}

#[test]
fn test_user_page_config() {
    let config = sam4l().with_applet_size(0x80).user_page(0x0080_0000);
    assert_eq!(config.address, 0x0080_0000);
    assert_eq!(config.pages, 1);
    assert_eq!(config.lock_regions, 0);
    assert_eq!(config.applet_size, 0x80);
    let geometry = config.geometry(512).unwrap();
    assert_eq!(geometry.reserved_pages, 0);
    assert_eq!(geometry.region_pages(), 0);
}
