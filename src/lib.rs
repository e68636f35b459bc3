// Copyright 2020, 2021 Adam Greig
// Licensed under the Apache-2.0 and MIT licenses.

//! calw-flash
//!
//! This crate programs the internal flash of microcontrollers using a FLASHCALW
//! flash controller, driven through a boot-resident remote monitor which can
//! access target registers and memory and run small routines from target RAM.
//!
//! The remote monitor is provided by implementing [`MonitorAccess`]. A [`Flash`]
//! driver is then constructed from a [`FlashConfig`] for either the main flash
//! array or the user page, and [`Flasher`] sequences whole-image operations.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
use alloc::vec::Vec;

use core::time::Duration;

pub mod config;
pub mod controller;
pub mod device;
pub mod flasher;
pub mod regs;
pub mod transfer;

#[cfg(all(test, feature = "std"))]
mod mock;

pub use config::{FlashConfig, FlashGeometry, FLASHCALW_REGS};
pub use controller::{Flash, Variant};
pub use device::FlashDevice;
pub use flasher::{FlashInfo, Flasher};
pub use regs::{CommandWord, ParameterRegister, StatusRegister};
pub use transfer::PageTransfer;

#[cfg(feature = "std")]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Page {page} is out of range for this flash.")]
    PageOutOfRange { page: u32 },
    #[error("Lock region {region} is out of range for this flash.")]
    RegionOutOfRange { region: u32 },
    #[error("Page {page} is reserved for the resident bootloader.")]
    ReservedPageViolation { page: u32 },
    #[error("Flash controller reported a lock error.")]
    FlashLockError,
    #[error("Timed out waiting for the flash controller to become ready.")]
    FlashCommandTimeout,
    #[error("Command is not supported by this flash.")]
    CommandUnsupported,
    #[error("Configured page size {configured} does not match detected page size {detected}.")]
    GeometryMismatch { configured: u32, detected: u32 },
    #[error("Reserved region size {size} is not a multiple of the page size {page_size}.")]
    MisalignedReservedRegion { size: u32, page_size: u32 },
    #[error("Invalid flash geometry in configuration.")]
    InvalidGeometry,
    #[error("Buffer of {len} bytes is incompatible with the page size {page_size}.")]
    BufferOverflow { len: usize, page_size: u32 },
    #[error("Offset 0x{offset:08X} is not a multiple of the page size.")]
    InvalidOffset { offset: u32 },
    #[error("Invalid lock region list.")]
    InvalidRegionList,
    #[error("Mismatch during flash readback verification.")]
    ReadbackError { address: u32, wrote: u8, read: u8 },

    #[error(transparent)]
    Access(#[from] anyhow::Error),
}
#[cfg(not(feature = "std"))]
#[derive(Debug)]
pub enum Error<E> {
    PageOutOfRange { page: u32 },
    RegionOutOfRange { region: u32 },
    ReservedPageViolation { page: u32 },
    FlashLockError,
    FlashCommandTimeout,
    CommandUnsupported,
    GeometryMismatch { configured: u32, detected: u32 },
    MisalignedReservedRegion { size: u32, page_size: u32 },
    InvalidGeometry,
    BufferOverflow { len: usize, page_size: u32 },
    InvalidOffset { offset: u32 },
    InvalidRegionList,
    ReadbackError { address: u32, wrote: u8, read: u8 },

    Access(E),
}

#[cfg(feature = "std")]
pub type Result<T> = std::result::Result<T, Error>;
#[cfg(not(feature = "std"))]
pub type Result<T> = core::result::Result<T, Error<()>>;

#[cfg(feature = "std")]
pub type AnyhowResult<T> = anyhow::Result<T>;
#[cfg(not(feature = "std"))]
pub type AnyhowResult<T> = Result<T>;

/// Trait for objects which provide access to a remote boot monitor on the target.
///
/// Every method is expected to complete the whole operation before returning;
/// the flash driver never pipelines requests.
pub trait MonitorAccess {
    /// Read a 32-bit word from `address`.
    fn read_word(&mut self, address: u32) -> AnyhowResult<u32>;

    /// Write a 32-bit word to `address`.
    fn write_word(&mut self, address: u32, value: u32) -> AnyhowResult<()>;

    /// Read `length` bytes starting at `address`.
    fn read_block(&mut self, address: u32, length: usize) -> AnyhowResult<Vec<u8>>;

    /// Write all bytes in `data` starting at `address`.
    fn write_block(&mut self, address: u32, data: &[u8]) -> AnyhowResult<()>;

    /// Run the code at `entry` with three word parameters, returning once it has finished.
    fn execute(&mut self, entry: u32, param0: u32, param1: u32, param2: u32)
        -> AnyhowResult<()>;

    fn sleep(&mut self, dur: Duration);
}
