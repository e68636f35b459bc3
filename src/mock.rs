//! Simulated remote monitor used by the tests.
//!
//! Records every access, keeps a sparse byte-addressed memory (unwritten bytes
//! read as 0xFF), and models the effect of FLASHCALW commands on that memory.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::config::{FlashConfig, FLASHCALW_REGS};
use crate::regs::{self, CommandWord};
use crate::{AnyhowResult, MonitorAccess};

pub const USER: u32 = 0x2000_1000;
pub const BUFFER_A: u32 = USER + FlashConfig::DEFAULT_APPLET_SIZE;
pub const BUFFER_B: u32 = BUFFER_A + 512;
pub const USER_PAGE: u32 = 0x0080_0000;

/// 1024 pages of 512 bytes, 16 lock regions, 8kB reserved for the monitor.
pub fn sam4l_config() -> FlashConfig {
    FlashConfig::new("ATSAM4L", 0, 1024, 512, 16, 0x2000, USER, 0x2000_8000,
                     FLASHCALW_REGS, false)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    ReadWord(u32),
    WriteWord(u32, u32),
    ReadBlock(u32, usize),
    WriteBlock(u32, usize),
    Execute(u32, u32, u32, u32),
}

/// Driver-level view of the recorded operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// One status register read.
    Wait,
    /// FCMD write of (opcode, page).
    Command(u8, u16),
    /// Transfer routine run with (source, destination, length).
    Transfer(u32, u32, u32),
}

pub struct MockMonitor {
    pub ops: Vec<Op>,
    pub sleeps: usize,
    pub memory: BTreeMap<u32, u8>,

    pub regs: u32,
    pub fpr: u32,
    pub fvr: u32,
    /// Status values returned before falling back to `fsr_default`.
    pub fsr: VecDeque<u32>,
    pub fsr_default: u32,
    pub lock_mask: u32,
    pub security: bool,

    pub page_size: u32,
    pub flash_base: u32,
    pub flash_pages: u32,
    pub user_page: u32,
    pub region_pages: u32,
}

impl MockMonitor {
    pub fn sam4l() -> Self {
        MockMonitor {
            ops: Vec::new(),
            sleeps: 0,
            memory: BTreeMap::new(),
            regs: FLASHCALW_REGS,
            fpr: 0x0000_0409,
            fvr: 0x0000_0102,
            fsr: VecDeque::new(),
            fsr_default: 0x0000_0001,
            lock_mask: 0,
            security: false,
            page_size: 512,
            flash_base: 0,
            flash_pages: 1024,
            user_page: USER_PAGE,
            region_pages: 64,
        }
    }

    pub fn write_memory(&mut self, address: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.memory.insert(address + i as u32, *byte);
        }
    }

    pub fn read_memory(&self, address: u32, length: usize) -> Vec<u8> {
        (0..length as u32)
            .map(|i| *self.memory.get(&(address + i)).unwrap_or(&0xFF))
            .collect()
    }

    fn erase(&mut self, address: u32, length: u32) {
        let keys: Vec<u32> = self.memory.range(address..address + length).map(|(k, _)| *k)
                                 .collect();
        for key in keys {
            self.memory.remove(&key);
        }
    }

    fn status(&mut self) -> u32 {
        let base = self.fsr.pop_front().unwrap_or(self.fsr_default);
        base | (self.lock_mask << 16) | ((self.security as u32) << 4)
    }

    fn run_command(&mut self, cmd: CommandWord) {
        assert_eq!(cmd.key(), regs::FCMD_KEY, "FCMD written without key");
        let page = cmd.page() as u32;
        match cmd.opcode() {
            // Write page and clear page buffer: the transfer routine already
            // placed the data.
            0x01 | 0x03 | 0x0D => (),
            0x02 => self.erase(self.flash_base + page * self.page_size, self.page_size),
            0x04 => self.lock_mask |= 1 << (page / self.region_pages),
            0x05 => self.lock_mask &= !(1 << (page / self.region_pages)),
            0x06 => self.erase(self.flash_base, self.flash_pages * self.page_size),
            0x09 => self.security = true,
            0x0E => self.erase(self.user_page, self.page_size),
            op => panic!("Unexpected flash command 0x{:02X}", op),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        let fsr = self.regs + regs::FSR;
        let fcmd = self.regs + regs::FCMD;
        self.ops.iter().filter_map(|op| match *op {
            Op::ReadWord(addr) if addr == fsr => Some(Event::Wait),
            Op::WriteWord(addr, value) if addr == fcmd => {
                let cmd = CommandWord(value);
                Some(Event::Command(cmd.opcode(), cmd.page()))
            },
            Op::Execute(_, src, dst, len) => Some(Event::Transfer(src, dst, len)),
            _ => None,
        }).collect()
    }

    pub fn commands(&self) -> Vec<(u8, u16)> {
        self.events().into_iter().filter_map(|e| match e {
            Event::Command(op, page) => Some((op, page)),
            _ => None,
        }).collect()
    }

    pub fn transfers(&self) -> Vec<(u32, u32, u32)> {
        self.events().into_iter().filter_map(|e| match e {
            Event::Transfer(src, dst, len) => Some((src, dst, len)),
            _ => None,
        }).collect()
    }

    pub fn block_reads(&self) -> Vec<(u32, usize)> {
        self.ops.iter().filter_map(|op| match *op {
            Op::ReadBlock(addr, len) => Some((addr, len)),
            _ => None,
        }).collect()
    }
}

impl MonitorAccess for MockMonitor {
    fn read_word(&mut self, address: u32) -> AnyhowResult<u32> {
        self.ops.push(Op::ReadWord(address));
        let value = if address == self.regs + regs::FSR {
            self.status()
        } else if address == self.regs + regs::FPR {
            self.fpr
        } else if address == self.regs + regs::FVR {
            self.fvr
        } else {
            let bytes = self.read_memory(address, 4);
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        };
        Ok(value)
    }

    fn write_word(&mut self, address: u32, value: u32) -> AnyhowResult<()> {
        self.ops.push(Op::WriteWord(address, value));
        if address == self.regs + regs::FCMD {
            self.run_command(CommandWord(value));
        } else {
            self.write_memory(address, &value.to_le_bytes());
        }
        Ok(())
    }

    fn read_block(&mut self, address: u32, length: usize) -> AnyhowResult<Vec<u8>> {
        self.ops.push(Op::ReadBlock(address, length));
        Ok(self.read_memory(address, length))
    }

    fn write_block(&mut self, address: u32, data: &[u8]) -> AnyhowResult<()> {
        self.ops.push(Op::WriteBlock(address, data.len()));
        self.write_memory(address, data);
        Ok(())
    }

    fn execute(&mut self, entry: u32, param0: u32, param1: u32, param2: u32)
        -> AnyhowResult<()>
    {
        self.ops.push(Op::Execute(entry, param0, param1, param2));
        anyhow::ensure!(entry == USER, "no routine loaded at 0x{:08X}", entry);
        let data = self.read_memory(param0, param2 as usize);
        self.write_memory(param1, &data);
        Ok(())
    }

    fn sleep(&mut self, _dur: Duration) {
        self.sleeps += 1;
    }
}
