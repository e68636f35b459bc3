use core::time::Duration;

use crate::config::{FlashConfig, FlashGeometry};
use crate::device::FlashDevice;
use crate::regs::{self, CommandWord, ParameterRegister, StatusRegister};
use crate::transfer::PageTransfer;
use crate::{Error, MonitorAccess, Result};

/// Which flash space a [`Flash`] driver addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// The main flash array, shared with the resident boot monitor.
    GeneralFlash,
    /// The single user page, separate from the boot monitor's code.
    UserPage,
}

impl Variant {
    fn write_command(&self) -> Command {
        match self {
            Variant::GeneralFlash => Command::WritePage,
            Variant::UserPage => Command::WriteUserPage,
        }
    }

    fn erase_command(&self) -> Command {
        match self {
            Variant::GeneralFlash => Command::ErasePage,
            Variant::UserPage => Command::EraseUserPage,
        }
    }

    fn lock_command(&self, enable: bool) -> Option<Command> {
        match (self, enable) {
            (Variant::GeneralFlash, true) => Some(Command::LockRegion),
            (Variant::GeneralFlash, false) => Some(Command::UnlockRegion),
            (Variant::UserPage, _) => None,
        }
    }

    fn has_lock_regions(&self) -> bool {
        matches!(self, Variant::GeneralFlash)
    }

    fn can_brownout(&self) -> bool {
        matches!(self, Variant::GeneralFlash)
    }

    /// Narrow `config` to what this variant supports.
    fn restrict(&self, config: &FlashConfig) -> FlashConfig {
        match self {
            Variant::GeneralFlash => *config,
            Variant::UserPage => FlashConfig {
                pages: 1,
                lock_regions: 0,
                reserved_size: 0,
                can_brownout: false,
                ..*config
            },
        }
    }
}

/// FLASHCALW flash driver.
///
/// Each page operation waits for the controller to report ready before issuing
/// a command, and page data moves between flash and one of two RAM staging
/// buffers using the resident [`PageTransfer`] routine. The staging buffers are
/// used alternately, switching after every page transfer.
///
/// Pages holding the boot monitor are never written, erased or unlocked.
pub struct Flash<'a, A: MonitorAccess> {
    access: &'a mut A,

    variant: Variant,
    name: &'static str,

    /// Base address of the controller registers.
    regs: u32,

    geometry: FlashGeometry,
    can_brownout: bool,

    transfer: PageTransfer,

    /// Staging buffer addresses and the index of the one used by the next transfer.
    buffers: [u32; 2],
    next_buffer: usize,

    /// Erase each page before it is written.
    erase_auto: bool,
}

impl<'a, A: MonitorAccess> Flash<'a, A> {
    /// Maximum number of status reads while waiting for the controller.
    pub const POLL_ATTEMPTS: u32 = 500;
    /// Delay between status reads.
    pub const POLL_INTERVAL: Duration = Duration::from_micros(100);

    /// Create a new driver for `variant` using `config`.
    ///
    /// The page size is read back from the controller and must match the configured
    /// page size, otherwise the configuration is for a different device and
    /// `Error::GeometryMismatch` is returned.
    pub fn new(access: &'a mut A, config: &FlashConfig, variant: Variant) -> Result<Self> {
        let config = variant.restrict(config);
        config.validate()?;

        let fpr = ParameterRegister(access.read_word(config.regs + regs::FPR)?);
        log::debug!("Read FPR: 0x{:08X}", fpr.0);
        let geometry = config.geometry(fpr.page_size())?;

        let transfer = PageTransfer::new(config.user, config.applet_size, geometry.page_size);
        let buffers = transfer.staging_buffers();
        log::debug!("{} {:?}: staging buffers at 0x{:08X} and 0x{:08X}, {} reserved pages",
                    config.name, variant, buffers[0], buffers[1], geometry.reserved_pages);
        log::debug!("Transfer routine at 0x{:08X}, monitor stack at 0x{:08X}",
                    transfer.entry(), geometry.stack);

        Ok(Flash {
            access,
            variant,
            name: config.name,
            regs: config.regs,
            geometry,
            can_brownout: config.can_brownout,
            transfer,
            buffers,
            next_buffer: 0,
            erase_auto: true,
        })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    /// Number of pages at the start of flash which are protected.
    pub fn reserved_pages(&self) -> u32 {
        self.geometry.reserved_pages
    }

    /// Address of the staging buffer the next page transfer will use.
    pub fn staging_buffer(&self) -> u32 {
        self.buffers[self.next_buffer]
    }

    /// Read the controller version register.
    pub fn version(&mut self) -> Result<u32> {
        Ok(self.access.read_word(self.regs + regs::FVR)?)
    }

    /// Read the flash status register.
    pub fn read_status(&mut self) -> Result<StatusRegister> {
        let fsr = StatusRegister(self.access.read_word(self.regs + regs::FSR)?);
        log::trace!("Read FSR: 0x{:08X}", fsr.0);
        Ok(fsr)
    }

    /// Wait until the controller reports ready.
    ///
    /// Polls FSR up to `POLL_ATTEMPTS` times, sleeping `POLL_INTERVAL` after each
    /// read which is not ready. A lock error fails immediately.
    pub fn wait_ready(&mut self) -> Result<()> {
        for _ in 0..Self::POLL_ATTEMPTS {
            let fsr = self.read_status()?;
            if fsr.get_lock_error() {
                log::error!("Flash controller reported lock error, FSR=0x{:08X}", fsr.0);
                return Err(Error::FlashLockError);
            }
            if fsr.get_ready() {
                return Ok(());
            }
            self.access.sleep(Self::POLL_INTERVAL);
        }
        log::error!("Flash controller not ready after {} polls", Self::POLL_ATTEMPTS);
        Err(Error::FlashCommandTimeout)
    }

    /// Write `command` for `page` to FCMD.
    fn command(&mut self, command: Command, page: u32) -> Result<()> {
        let cmd = CommandWord::new(command.into(), page as u16);
        log::trace!("Flash command {:?} page {}: FCMD=0x{:08X}", command, page, cmd.0);
        self.access.write_word(self.regs + regs::FCMD, cmd.0)?;
        Ok(())
    }

    /// Return the staging buffer for this transfer and switch to the other one.
    fn take_buffer(&mut self) -> u32 {
        let buffer = self.buffers[self.next_buffer];
        self.next_buffer ^= 1;
        log::trace!("Using staging buffer 0x{:08X}", buffer);
        buffer
    }

    fn check_page(&self, page: u32) -> Result<()> {
        if page >= self.geometry.pages {
            log::error!("Page {} out of range, flash has {} pages", page, self.geometry.pages);
            Err(Error::PageOutOfRange { page })
        } else {
            Ok(())
        }
    }

    fn check_region(&self, region: u32) -> Result<()> {
        if region >= self.geometry.lock_regions {
            log::error!("Lock region {} out of range, flash has {} regions",
                        region, self.geometry.lock_regions);
            Err(Error::RegionOutOfRange { region })
        } else {
            Ok(())
        }
    }
}

impl<'a, A: MonitorAccess> FlashDevice for Flash<'a, A> {
    fn name(&self) -> &str {
        self.name
    }

    fn address(&self) -> u32 {
        self.geometry.address
    }

    fn page_size(&self) -> u32 {
        self.geometry.page_size
    }

    fn page_count(&self) -> u32 {
        self.geometry.pages
    }

    fn lock_region_count(&self) -> u32 {
        self.geometry.lock_regions
    }

    /// Erase the whole flash space.
    ///
    /// The main flash array holds the running boot monitor and a mass erase might
    /// remove it, so it is refused with `Error::CommandUnsupported`. The user page is
    /// erased with a single command.
    fn erase_all(&mut self) -> Result<()> {
        match self.variant {
            Variant::GeneralFlash => {
                log::error!("Refusing to mass erase flash shared with the boot monitor");
                Err(Error::CommandUnsupported)
            },
            Variant::UserPage => {
                self.wait_ready()?;
                self.command(Command::EraseUserPage, 0)
            },
        }
    }

    fn erase_auto(&mut self, enable: bool) {
        log::debug!("Auto erase {}", if enable { "enabled" } else { "disabled" });
        self.erase_auto = enable;
    }

    fn is_locked(&mut self) -> Result<bool> {
        if !self.variant.has_lock_regions() {
            return Ok(false);
        }
        Ok(self.lock_mask()? != 0)
    }

    // Regions covering the boot monitor may always read as locked whatever their
    // real state; the mask is returned as read.
    fn lock_mask(&mut self) -> Result<u32> {
        self.wait_ready()?;
        Ok(self.read_status()?.get_lock_mask())
    }

    fn get_lock_region(&mut self, region: u32) -> Result<bool> {
        self.check_region(region)?;
        Ok(self.lock_mask()? & (1 << region) != 0)
    }

    fn set_lock_region(&mut self, region: u32, enable: bool) -> Result<()> {
        self.check_region(region)?;
        let command = self.variant.lock_command(enable).ok_or(Error::CommandUnsupported)?;

        if self.get_lock_region(region)? == enable {
            log::debug!("Lock region {} already {}", region,
                        if enable { "locked" } else { "unlocked" });
            return Ok(());
        }

        let page = self.geometry.region_first_page(region);
        if !enable && self.geometry.is_reserved(page) {
            log::error!("Refusing to unlock region {} containing reserved page {}", region, page);
            return Err(Error::ReservedPageViolation { page });
        }

        self.wait_ready()?;
        self.command(command, page)
    }

    fn get_security(&mut self) -> Result<bool> {
        self.wait_ready()?;
        Ok(self.read_status()?.get_security())
    }

    fn set_security(&mut self) -> Result<()> {
        self.wait_ready()?;
        self.command(Command::SetSecurityBit, 0)
    }

    fn can_bod(&self) -> bool {
        self.can_brownout && self.variant.can_brownout()
    }

    // On SAM4L the brownout settings live in the user page fuses rather than
    // behind the flash controller, so there is nothing to read here yet.
    fn get_bod(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn set_bod(&mut self, enable: bool) -> Result<()> {
        if self.can_bod() {
            log::warn!("Setting brownout detect to {} is not implemented", enable);
        }
        Ok(())
    }

    fn can_bor(&self) -> bool {
        self.can_brownout && self.variant.can_brownout()
    }

    fn get_bor(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn set_bor(&mut self, enable: bool) -> Result<()> {
        if self.can_bor() {
            log::warn!("Setting brownout reset to {} is not implemented", enable);
        }
        Ok(())
    }

    fn can_boot_flash(&self) -> bool {
        false
    }

    fn get_boot_flash(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn set_boot_flash(&mut self, enable: bool) -> Result<()> {
        log::debug!("Ignoring boot from flash={}, not supported on {}", enable, self.name);
        Ok(())
    }

    fn load_buffer(&mut self, data: &[u8]) -> Result<()> {
        let page_size = self.geometry.page_size;
        if data.len() > page_size as usize {
            log::error!("Cannot load {} bytes into a {} byte page buffer", data.len(), page_size);
            return Err(Error::BufferOverflow { len: data.len(), page_size });
        }
        let mut page = alloc::vec![0xFF; page_size as usize];
        page[..data.len()].copy_from_slice(data);
        let buffer = self.staging_buffer();
        log::trace!("Loading {} bytes into staging buffer 0x{:08X}", data.len(), buffer);
        self.access.write_block(buffer, &page)?;
        Ok(())
    }

    /// Program `page` from the staging buffer most recently filled by `load_buffer()`.
    ///
    /// With auto erase enabled the page is erased first. The page buffer is cleared,
    /// the staging buffer is copied into it by the transfer routine, and the write
    /// command is issued. The final write is not waited for; the next operation
    /// waits for the controller before doing anything else.
    fn write_page(&mut self, page: u32) -> Result<()> {
        self.check_page(page)?;
        if self.geometry.is_reserved(page) {
            log::error!("Refusing to write page {} reserved for the boot monitor", page);
            return Err(Error::ReservedPageViolation { page });
        }

        if self.erase_auto {
            self.wait_ready()?;
            self.command(self.variant.erase_command(), page)?;
        }

        self.wait_ready()?;
        self.command(Command::ClearPageBuffer, 0)?;

        self.wait_ready()?;
        let src = self.take_buffer();
        let dst = self.geometry.page_address(page);
        let transfer = self.transfer;
        transfer.run(&mut *self.access, src, dst)?;

        self.wait_ready()?;
        self.command(self.variant.write_command(), page)
    }

    /// Read `page` into `data`.
    ///
    /// Some monitors return all zeros when reading flash directly, so the page is
    /// first copied into a staging buffer and read back from RAM.
    fn read_page(&mut self, page: u32, data: &mut [u8]) -> Result<()> {
        self.check_page(page)?;
        let page_size = self.geometry.page_size;
        if data.len() < page_size as usize {
            log::error!("Buffer of {} bytes too small for a {} byte page", data.len(), page_size);
            return Err(Error::BufferOverflow { len: data.len(), page_size });
        }

        self.wait_ready()?;
        let src = self.geometry.page_address(page);
        let dst = self.take_buffer();
        let transfer = self.transfer;
        transfer.run(&mut *self.access, src, dst)?;

        let bytes = self.access.read_block(dst, page_size as usize)?;
        if bytes.len() != page_size as usize {
            log::error!("Monitor returned {} bytes for a {} byte page", bytes.len(), page_size);
            return Err(Error::BufferOverflow { len: bytes.len(), page_size });
        }
        data[..page_size as usize].copy_from_slice(&bytes);
        Ok(())
    }
}

/// FLASHCALW command opcodes, written to the low byte of FCMD.
#[derive(Copy, Clone, Debug, num_enum::IntoPrimitive)]
#[allow(unused)]
#[repr(u8)]
enum Command {
    WritePage = 0x01,
    ErasePage = 0x02,
    ClearPageBuffer = 0x03,
    LockRegion = 0x04,
    UnlockRegion = 0x05,
    // Never issued, see `erase_all()`.
    EraseAll = 0x06,
    SetSecurityBit = 0x09,
    WriteUserPage = 0x0D,
    EraseUserPage = 0x0E,
}
