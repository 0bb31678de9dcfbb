//! Flash geometry and the page/sector arithmetic derived from it.

use core::ops::{Range, RangeInclusive};

/// Value of every byte of an erased page.
pub const ERASED_BYTE: u8 = 0xFF;

/// Page, sector and device sizes of a flash array, in bytes.
///
/// The constructor is `const` and asserts that the sizes nest, so a geometry
/// built in a `const` item fails to compile instead of misbehaving at runtime.
///
/// # Example
///
/// ```
/// use lpc_iap_flash_rs::Geometry;
///
/// const GEOMETRY: Geometry = Geometry::new(256, 4096, 0x1_0000);
///
/// assert_eq!(GEOMETRY.page_base(0x1002), 0x1000);
/// assert_eq!(GEOMETRY.page_offset(0x1002), 2);
/// assert_eq!(GEOMETRY.sector_index(0x1002), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    page_size: u32,
    sector_size: u32,
    flash_size: u32,
}

impl Geometry {
    pub const fn new(page_size: u32, sector_size: u32, flash_size: u32) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        assert!(
            sector_size >= page_size && sector_size % page_size == 0,
            "sector size must be a multiple of the page size"
        );
        assert!(
            flash_size >= sector_size && flash_size % sector_size == 0,
            "flash size must be a multiple of the sector size"
        );
        Self {
            page_size,
            sector_size,
            flash_size,
        }
    }

    /// Smallest programmable unit.
    #[inline(always)]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Smallest erasable unit.
    #[inline(always)]
    pub const fn sector_size(&self) -> u32 {
        self.sector_size
    }

    #[inline(always)]
    pub const fn flash_size(&self) -> u32 {
        self.flash_size
    }

    #[inline(always)]
    pub const fn num_sectors(&self) -> u32 {
        self.flash_size / self.sector_size
    }

    #[inline(always)]
    pub const fn page_index(&self, addr: u32) -> u32 {
        addr / self.page_size
    }

    /// Address of the first byte of the page containing `addr`.
    #[inline(always)]
    pub const fn page_base(&self, addr: u32) -> u32 {
        self.page_index(addr) * self.page_size
    }

    #[inline(always)]
    pub const fn page_offset(&self, addr: u32) -> u32 {
        addr % self.page_size
    }

    #[inline(always)]
    pub const fn sector_index(&self, addr: u32) -> u32 {
        addr / self.sector_size
    }

    /// Address of the first byte of sector `index`.
    #[inline(always)]
    pub const fn sector_base(&self, index: u32) -> u32 {
        index * self.sector_size
    }

    /// Returns the address range `[address, address + len)` if it lies
    /// entirely within the device.
    #[inline(always)]
    pub fn check_range(&self, address: u32, len: usize) -> Option<Range<u32>> {
        let len = u32::try_from(len).ok()?;
        let end = address.checked_add(len)?;
        (end <= self.flash_size).then_some(address..end)
    }

    /// Inclusive range of sector indices overlapping `[address, address + len)`.
    ///
    /// Returns `None` for an empty range, or one that leaves the device.
    #[inline(always)]
    pub fn sector_range(&self, address: u32, len: u32) -> Option<RangeInclusive<u32>> {
        if len == 0 {
            return None;
        }
        let range = self.check_range(address, len as usize)?;
        Some(self.sector_index(range.start)..=self.sector_index(range.end - 1))
    }

    /// Splits `[address, address + len)` into one chunk per page it touches.
    ///
    /// Returns `None` if the range leaves the device.
    #[inline(always)]
    pub fn page_chunks(&self, address: u32, len: usize) -> Option<PageChunks> {
        self.check_range(address, len)?;
        Some(PageChunks {
            geometry: *self,
            address,
            idx: 0,
            len,
        })
    }
}

/// The part of a write request that falls inside one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    /// Flash address of the page.
    pub base: u32,
    /// Offset of the first requested byte inside the page.
    pub offset: usize,
    /// Indices into the caller's buffer that land in this page.
    pub data: Range<usize>,
}

impl PageChunk {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Iterator returned by [`Geometry::page_chunks`].
#[derive(Debug, Clone)]
pub struct PageChunks {
    geometry: Geometry,
    address: u32,
    idx: usize,
    len: usize,
}

impl Iterator for PageChunks {
    type Item = PageChunk;

    #[inline(always)]
    fn next(&mut self) -> Option<PageChunk> {
        if self.idx >= self.len {
            return None;
        }
        let addr = self.address + self.idx as u32;
        let offset = self.geometry.page_offset(addr) as usize;
        let size = (self.geometry.page_size() as usize - offset).min(self.len - self.idx);
        let chunk = PageChunk {
            base: self.geometry.page_base(addr),
            offset,
            data: self.idx..self.idx + size,
        };
        self.idx += size;
        Some(chunk)
    }
}
