use crate::{MonitorAccess, Result};

/// Page Transfer Routine.
///
/// A word-copy routine resident in target RAM, run by the monitor to move one page
/// between a RAM staging buffer and the flash address space. It is invoked with
/// (source, destination, length) and the monitor only returns once it has finished.
///
/// All bytes moving into or out of flash go through this routine; no flash
/// contents are ever written by register access.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PageTransfer {
    entry: u32,
    size: u32,
    length: u32,
}

impl PageTransfer {
    /// Describe a transfer routine loaded at `entry` occupying `size` bytes,
    /// copying `length` bytes per run.
    pub fn new(entry: u32, size: u32, length: u32) -> Self {
        PageTransfer { entry, size, length }
    }

    /// Address the routine is run from.
    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// Number of bytes copied per run.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Addresses of the two page-sized staging buffers.
    ///
    /// The first starts at the first word boundary after the routine,
    /// the second immediately follows it.
    pub fn staging_buffers(&self) -> [u32; 2] {
        let a = (self.entry + self.size + 3) & !3;
        [a, a + self.length]
    }

    /// Copy one page from `src` to `dst` on the target.
    pub fn run<A: MonitorAccess>(&self, access: &mut A, src: u32, dst: u32) -> Result<()> {
        log::trace!("Page transfer: 0x{:08X} -> 0x{:08X}, {} bytes", src, dst, self.length);
        access.execute(self.entry, src, dst, self.length)?;
        Ok(())
    }
}

#[test]
fn test_staging_buffers() {
    let transfer = PageTransfer::new(0x2000_1000, 0x3E, 512);
    assert_eq!(transfer.staging_buffers(), [0x2000_1040, 0x2000_1240]);
    let transfer = PageTransfer::new(0x2000_1000, 0x40, 256);
    assert_eq!(transfer.staging_buffers(), [0x2000_1040, 0x2000_1140]);
}
