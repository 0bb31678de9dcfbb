//! LPC546xx boot ROM In-Application Programming (IAP) calls.
//!
//! Refer to UM10912, chapter "Flash API".
//!
//! The ROM routines run from ROM, but everything between the engine and the
//! ROM entry point must not be fetched from flash while the controller is busy,
//! so the `RomIap` methods are kept in `.data.ramfunc` on bare-metal targets.

#[cfg(target_arch = "arm")]
use core::arch::asm;

use crate::board::CoreClock;
use crate::traits::FlashIap;

/// Thumb entry point of the IAP routine.
const IAP_ENTRY_LOCATION: usize = 0x0300_0205;

type IapEntry = unsafe extern "C" fn(command: *const u32, result: *mut u32);

#[derive(Clone, Copy)]
enum Command {
    PrepareSectorForWrite = 50,
    CopyRamToFlash = 51,
    EraseSector = 52,
    BlankCheckSector = 53,
    Compare = 56,
}

/// Failure codes returned by the boot ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IapStatus {
    InvalidCommand,
    /// Source address is not on a word boundary.
    SrcAddrError,
    /// Destination address is not on a correct boundary.
    DstAddrError,
    SrcAddrNotMapped,
    DstAddrNotMapped,
    /// Byte count is not a supported program size.
    CountError,
    InvalidSector,
    SectorNotBlank,
    /// The prepare command was not run before this program or erase.
    SectorNotPrepared,
    CompareError,
    Busy,
    ParamError,
    AddrError,
    AddrNotMapped,
    CmdLocked,
    InvalidCode,
    InvalidBaudRate,
    InvalidStopBit,
    CodeReadProtectionEnabled,
    Unknown(u32),
}

impl IapStatus {
    /// Decodes the first result word of an IAP call.
    pub const fn check(code: u32) -> Result<(), IapStatus> {
        let status = match code {
            0 => return Ok(()),
            1 => IapStatus::InvalidCommand,
            2 => IapStatus::SrcAddrError,
            3 => IapStatus::DstAddrError,
            4 => IapStatus::SrcAddrNotMapped,
            5 => IapStatus::DstAddrNotMapped,
            6 => IapStatus::CountError,
            7 => IapStatus::InvalidSector,
            8 => IapStatus::SectorNotBlank,
            9 => IapStatus::SectorNotPrepared,
            10 => IapStatus::CompareError,
            11 => IapStatus::Busy,
            12 => IapStatus::ParamError,
            13 => IapStatus::AddrError,
            14 => IapStatus::AddrNotMapped,
            15 => IapStatus::CmdLocked,
            16 => IapStatus::InvalidCode,
            17 => IapStatus::InvalidBaudRate,
            18 => IapStatus::InvalidStopBit,
            19 => IapStatus::CodeReadProtectionEnabled,
            other => IapStatus::Unknown(other),
        };
        Err(status)
    }
}

/// [`FlashIap`] backed by the boot ROM.
///
/// The internal flash is memory mapped at address 0, so reads are plain
/// byte loads.
pub struct RomIap {
    entry: IapEntry,
}

impl core::fmt::Debug for RomIap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RomIap")
    }
}

impl RomIap {
    /// # Safety
    ///
    /// 1. Must only be used on an LPC546xx, where the IAP routine lives at
    ///    `0x0300_0205`.
    /// 2. The top 32 bytes of on-chip SRAM are used by the ROM and must not
    ///    hold live data during a call.
    pub unsafe fn new() -> Self {
        Self {
            entry: core::mem::transmute::<usize, IapEntry>(IAP_ENTRY_LOCATION),
        }
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn call(&mut self, command: Command, params: [u32; 4]) -> [u32; 5] {
        let cmd: [u32; 5] = [command as u32, params[0], params[1], params[2], params[3]];
        let mut result: [u32; 5] = [0; 5];
        // SAFETY: `new` guarantees the entry point is the ROM IAP routine,
        // which reads 5 command words and writes at most 5 result words.
        unsafe { (self.entry)(cmd.as_ptr(), result.as_mut_ptr()) };
        result
    }
}

/// Loads one byte of the memory mapped flash.
///
/// Page 0 lives at address 0, which Rust treats as the null pointer, so the
/// load is issued with `ldrb` directly instead of through `read_volatile`.
#[cfg(target_arch = "arm")]
#[inline(always)]
fn load_flash_byte(addr: usize) -> u8 {
    let value: u32;
    // SAFETY: the whole flash array is mapped for reads at its physical
    // offset, starting at 0, and reading it has no side effects.
    unsafe {
        asm!(
            "ldrb {value}, [{addr}]",
            addr = in(reg) addr,
            value = out(reg) value,
            options(nostack, preserves_flags, readonly)
        );
    }
    value as u8
}

#[cfg(not(target_arch = "arm"))]
#[inline(always)]
fn load_flash_byte(addr: usize) -> u8 {
    // only reachable through `RomIap::new`, which is LPC546xx only
    debug_assert_ne!(addr, 0);
    // SAFETY: see `RomIap::new`.
    unsafe { core::ptr::read_volatile(addr as *const u8) }
}

impl FlashIap for RomIap {
    type Error = IapStatus;

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), IapStatus> {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = load_flash_byte(addr as usize + i);
        }
        Ok(())
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn is_busy(&mut self) -> Result<bool, IapStatus> {
        // ROM calls return only when the controller is done
        Ok(false)
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn prepare_sectors(&mut self, first: u32, last: u32) -> Result<(), IapStatus> {
        let result = self.call(Command::PrepareSectorForWrite, [first, last, 0, 0]);
        IapStatus::check(result[0])
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn copy_ram_to_flash(
        &mut self,
        dst: u32,
        src: &[u8],
        clock: CoreClock,
    ) -> Result<(), IapStatus> {
        if src.as_ptr() as usize % 4 != 0 {
            return Err(IapStatus::SrcAddrError);
        }
        let result = self.call(
            Command::CopyRamToFlash,
            [dst, src.as_ptr() as u32, src.len() as u32, clock.khz()],
        );
        IapStatus::check(result[0])
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn erase_sectors(&mut self, first: u32, last: u32, clock: CoreClock) -> Result<(), IapStatus> {
        let result = self.call(Command::EraseSector, [first, last, clock.khz(), 0]);
        IapStatus::check(result[0])
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn compare(&mut self, dst: u32, src: &[u8]) -> Result<bool, IapStatus> {
        let result = self.call(
            Command::Compare,
            [dst, src.as_ptr() as u32, src.len() as u32, 0],
        );
        match IapStatus::check(result[0]) {
            Ok(()) => Ok(true),
            Err(IapStatus::CompareError) => Ok(false),
            Err(status) => Err(status),
        }
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn blank_check(&mut self, first: u32, last: u32) -> Result<bool, IapStatus> {
        let result = self.call(Command::BlankCheckSector, [first, last, 0, 0]);
        match IapStatus::check(result[0]) {
            Ok(()) => Ok(true),
            Err(IapStatus::SectorNotBlank) => Ok(false),
            Err(status) => Err(status),
        }
    }
}
