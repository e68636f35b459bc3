/// Offset of the Flash Command Register (FCMD).
pub const FCMD: u32 = 0x04;
/// Offset of the Flash Status Register (FSR).
pub const FSR: u32 = 0x08;
/// Offset of the Flash Parameter Register (FPR).
pub const FPR: u32 = 0x0C;
/// Offset of the Flash Version Register (FVR).
pub const FVR: u32 = 0x10;

/// Key which must be present in the top byte of every FCMD write.
pub const FCMD_KEY: u8 = 0xA5;

/// Flash Status Register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusRegister(pub u32);

impl StatusRegister {
    /// Get FRDY (flash ready) bit.
    pub fn get_ready(&self) -> bool {
        self.0 & (1 << 0) != 0
    }

    /// Get LOCKE (lock error) bit.
    ///
    /// Set when a programming or erase command targeted a locked region.
    pub fn get_lock_error(&self) -> bool {
        self.0 & (1 << 2) != 0
    }

    /// Get SECURITY bit.
    pub fn get_security(&self) -> bool {
        self.0 & (1 << 4) != 0
    }

    /// Get the raw lock-region bitmask, bit n set when region n is locked.
    pub fn get_lock_mask(&self) -> u32 {
        self.0 >> 16
    }
}

/// Flash Parameter Register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParameterRegister(pub u32);

impl ParameterRegister {
    /// Get the page size in bytes encoded in the PSZ field.
    pub fn page_size(&self) -> u32 {
        32 << ((self.0 >> 8) & 0x7)
    }
}

/// Value written to FCMD: key, page number and opcode, from the most significant byte down.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandWord(pub u32);

impl CommandWord {
    pub fn new(opcode: u8, page: u16) -> Self {
        CommandWord(((FCMD_KEY as u32) << 24) | ((page as u32) << 8) | opcode as u32)
    }

    pub fn opcode(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn page(&self) -> u16 {
        ((self.0 >> 8) & 0xFFFF) as u16
    }

    pub fn key(&self) -> u8 {
        (self.0 >> 24) as u8
    }
}

#[test]
fn test_status_register() {
    let fsr = StatusRegister(0x8001_0011);
    assert!(fsr.get_ready());
    assert!(!fsr.get_lock_error());
    assert!(fsr.get_security());
    assert_eq!(fsr.get_lock_mask(), 0x8001);
    assert!(StatusRegister(0b100).get_lock_error());
    assert!(!StatusRegister(0b100).get_ready());
}

#[test]
fn test_parameter_register() {
    assert_eq!(ParameterRegister(0x0000_0000).page_size(), 32);
    // SAM4L parts report PSZ=4, 512-byte pages.
    assert_eq!(ParameterRegister(0x0000_0409).page_size(), 512);
    assert_eq!(ParameterRegister(0x0000_0700).page_size(), 4096);
    // Only three bits of PSZ are significant.
    assert_eq!(ParameterRegister(0x0000_0C00).page_size(), 512);
}

#[test]
fn test_command_word() {
    let cmd = CommandWord::new(0x02, 20);
    assert_eq!(cmd.0, 0xA500_1402);
    assert_eq!(cmd.key(), FCMD_KEY);
    assert_eq!(cmd.page(), 20);
    assert_eq!(cmd.opcode(), 0x02);
    assert_eq!(CommandWord::new(0x0D, 0).0, 0xA500_000D);
}
