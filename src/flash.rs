//! Page-merge write and sector erase on top of [`FlashIap`].

use core::fmt::Debug;

use crate::board::CoreClock;
use crate::error::Error;
use crate::geometry::{Geometry, ERASED_BYTE};
use crate::traits::FlashIap;
use embedded_hal::delay::DelayNs;
use hardware_traits::HardwareFlashDevice;

/// Interval between busy polls.
const READY_POLL_US: u32 = 100;
/// Longest wait for the controller to go idle before an operation.
const READY_TIMEOUT_US: u32 = 500_000;

/// Page staging area. The boot ROM only copies from word aligned RAM.
#[repr(C, align(4))]
struct Staging<const N: usize>([u8; N]);

/// Flash driver for an array of `FLASH_SIZE` bytes, programmed in
/// `PAGE_SIZE` pages and erased in `SECTOR_SIZE` sectors.
///
/// Owns the page staging buffer, so a bootloader keeps a single instance (in a
/// `static` if it must live in a fixed RAM location).
///
/// `write`, `erase`, `lock`, `unlock` and their page loop and busy wait are
/// linked into `.data.ramfunc` on bare-metal targets: the flash cannot be
/// fetched from while it is being programmed. The geometry helpers they call
/// are `#[inline(always)]`.
pub struct Flash<IAP, D, const PAGE_SIZE: usize, const SECTOR_SIZE: usize, const FLASH_SIZE: usize>
{
    iap: IAP,
    delay: D,
    clock: CoreClock,
    staging: Staging<PAGE_SIZE>,
}

/// LPC546xx internal flash: 256 byte pages, 32K sectors, 512K total.
pub type Lpc546xxFlash<IAP, D> = Flash<IAP, D, 0x100, 0x8000, 0x8_0000>;

impl<IAP, D, const PAGE_SIZE: usize, const SECTOR_SIZE: usize, const FLASH_SIZE: usize> Debug
    for Flash<IAP, D, PAGE_SIZE, SECTOR_SIZE, FLASH_SIZE>
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Flash")
            .field("page_size", &PAGE_SIZE)
            .field("sector_size", &SECTOR_SIZE)
            .field("flash_size", &FLASH_SIZE)
            .field("clock", &self.clock)
            .finish()
    }
}

impl<IAP, D, const PAGE_SIZE: usize, const SECTOR_SIZE: usize, const FLASH_SIZE: usize>
    Flash<IAP, D, PAGE_SIZE, SECTOR_SIZE, FLASH_SIZE>
where
    IAP: FlashIap,
    D: DelayNs,
{
    /// Geometry of this flash. Inconsistent sizes fail at compile time.
    pub const GEOMETRY: Geometry =
        Geometry::new(PAGE_SIZE as u32, SECTOR_SIZE as u32, FLASH_SIZE as u32);

    /// Creates the driver. `clock` is the core frequency from
    /// [`hal_init`](crate::hal_init), used for program and erase timing.
    pub fn new(iap: IAP, delay: D, clock: CoreClock) -> Self {
        let geometry = Self::GEOMETRY;
        debug!(
            "flash: {=u32} B pages, {=u32} B sectors, {=u32} B total",
            geometry.page_size(),
            geometry.sector_size(),
            geometry.flash_size()
        );
        Self {
            iap,
            delay,
            clock,
            staging: Staging([ERASED_BYTE; PAGE_SIZE]),
        }
    }

    /// Releases the IAP and delay providers.
    pub fn free(self) -> (IAP, D) {
        (self.iap, self.delay)
    }

    pub fn clock(&self) -> CoreClock {
        self.clock
    }

    /// The page staging buffer. Between calls it only ever holds FFh.
    pub fn staging(&self) -> &[u8] {
        &self.staging.0
    }

    /// Nothing to unprotect on this target.
    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    pub fn unlock(&mut self) {
        trace!("flash unlock");
    }

    /// Nothing to protect on this target.
    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    pub fn lock(&mut self) {
        trace!("flash lock");
    }

    /// Reads flash contents into `buf`, starting at `address`.
    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), Error<IAP::Error>> {
        if Self::GEOMETRY.check_range(address, buf.len()).is_none() {
            return Err(Error::OutOfBounds {
                address,
                len: buf.len(),
            });
        }
        self.iap.read(address, buf).map_err(|source| Error::Read {
            address,
            offset: 0,
            source,
        })
    }

    /// Writes `data` at `address`, leaving every other byte of the touched
    /// pages as it was.
    ///
    /// Each page is read into the staging buffer, patched, programmed and
    /// compared. The first failing page aborts the write; pages before it stay
    /// programmed. An empty `data` touches nothing.
    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), Error<IAP::Error>> {
        if data.is_empty() {
            return Ok(());
        }
        if Self::GEOMETRY.check_range(address, data.len()).is_none() {
            warn!(
                "write of {=usize} bytes at {=u32:#x} is out of bounds",
                data.len(),
                address
            );
            return Err(Error::OutOfBounds {
                address,
                len: data.len(),
            });
        }

        trace!("write {=usize} bytes at {=u32:#x}", data.len(), address);
        let result = self.program_pages(address, data);
        self.staging.0.fill(ERASED_BYTE);
        result
    }

    /// Erases every sector overlapping `[address, address + len)`.
    ///
    /// Erase is sector granular: bytes of those sectors outside the range are
    /// erased too. `len == 0` erases nothing.
    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    pub fn erase(&mut self, address: u32, len: u32) -> Result<(), Error<IAP::Error>> {
        if len == 0 {
            return Ok(());
        }
        let Some(sectors) = Self::GEOMETRY.sector_range(address, len) else {
            warn!(
                "erase of {=u32} bytes at {=u32:#x} is out of bounds",
                len,
                address
            );
            return Err(Error::OutOfBounds {
                address,
                len: len as usize,
            });
        };
        let (first, last) = (*sectors.start(), *sectors.end());
        let erase_err = |source| Error::Erase {
            first_sector: first,
            last_sector: last,
            source,
        };

        debug!("erase sectors {=u32}..={=u32}", first, last);
        self.wait_ready(Self::GEOMETRY.sector_base(first))?;
        self.iap.prepare_sectors(first, last).map_err(erase_err)?;
        self.iap
            .erase_sectors(first, last, self.clock)
            .map_err(erase_err)?;
        if !self.iap.blank_check(first, last).map_err(erase_err)? {
            warn!("sectors {=u32}..={=u32} not blank after erase", first, last);
            return Err(Error::NotBlank {
                first_sector: first,
                last_sector: last,
            });
        }
        Ok(())
    }

    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn program_pages(&mut self, address: u32, data: &[u8]) -> Result<(), Error<IAP::Error>> {
        let Some(chunks) = Self::GEOMETRY.page_chunks(address, data.len()) else {
            return Err(Error::OutOfBounds {
                address,
                len: data.len(),
            });
        };
        for chunk in chunks {
            let base = chunk.base;
            let offset = chunk.data.start;
            let program_err = |source| Error::Program {
                address: base,
                offset,
                source,
            };

            self.wait_ready(base)?;
            self.iap
                .read(base, &mut self.staging.0)
                .map_err(|source| Error::Read {
                    address: base,
                    offset,
                    source,
                })?;
            self.staging.0[chunk.offset..chunk.offset + chunk.len()]
                .copy_from_slice(&data[chunk.data.clone()]);

            let sector = Self::GEOMETRY.sector_index(base);
            self.iap
                .prepare_sectors(sector, sector)
                .map_err(program_err)?;
            self.iap
                .copy_ram_to_flash(base, &self.staging.0, self.clock)
                .map_err(program_err)?;

            if !self
                .iap
                .compare(base, &self.staging.0)
                .map_err(program_err)?
            {
                warn!("page {=u32:#x} does not read back as programmed", base);
                return Err(Error::Verify {
                    address: base,
                    offset,
                });
            }
            trace!(
                "programmed page {=u32:#x} [{=usize}..{=usize}]",
                base,
                chunk.offset,
                chunk.offset + chunk.len()
            );
        }
        Ok(())
    }

    /// Block until the controller is idle, or give up after
    /// `READY_TIMEOUT_US`.
    #[inline(never)]
    #[cfg_attr(target_os = "none", link_section = ".data.ramfunc")]
    fn wait_ready(&mut self, address: u32) -> Result<(), Error<IAP::Error>> {
        let mut waited_us: u32 = 0;
        while self
            .iap
            .is_busy()
            .map_err(|source| Error::Poll { address, source })?
        {
            if waited_us >= READY_TIMEOUT_US {
                warn!("flash still busy after {=u32} us", waited_us);
                return Err(Error::Timeout { address });
            }
            self.delay.delay_us(READY_POLL_US);
            waited_us += READY_POLL_US;
        }
        Ok(())
    }
}

impl<IAP, D, const PAGE_SIZE: usize, const SECTOR_SIZE: usize, const FLASH_SIZE: usize>
    HardwareFlashDevice for Flash<IAP, D, PAGE_SIZE, SECTOR_SIZE, FLASH_SIZE>
where
    IAP: FlashIap,
    D: DelayNs,
{
    type Error = Error<IAP::Error>;

    fn read(&mut self, addr: u32, data: &mut [u8]) -> Result<(), Self::Error> {
        Self::read(self, addr, data)
    }

    /// Erases the sector containing `addr`.
    fn sector_erase(&mut self, addr: u32) -> Result<(), Self::Error> {
        self.erase(addr, 1)
    }

    /// Merge-writes `data`; unlike a raw page program it may span pages and
    /// need not target erased memory.
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error> {
        self.write(addr, data)
    }

    fn chip_erase(&mut self) -> Result<(), Self::Error> {
        self.erase(0, FLASH_SIZE as u32)
    }
}
