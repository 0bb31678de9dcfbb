use core::fmt::{self, Debug};

/// The error type used by this library.
///
/// `E` is the error of the underlying [`FlashIap`](crate::FlashIap)
/// implementation; the engine adds where in the request things went wrong.
#[derive(Clone, PartialEq, Eq)]
pub enum Error<E> {
    /// The request reaches outside the flash array. Nothing was touched.
    OutOfBounds { address: u32, len: usize },
    /// Reading back a page before merging failed.
    Read { address: u32, offset: usize, source: E },
    /// Preparing or programming a page failed. Pages after it were skipped.
    ///
    /// `address` is the page, `offset` the index into the caller's data at
    /// which that page's bytes start.
    Program { address: u32, offset: usize, source: E },
    /// A programmed page does not read back as written.
    Verify { address: u32, offset: usize },
    /// Preparing or erasing a sector range failed.
    Erase {
        first_sector: u32,
        last_sector: u32,
        source: E,
    },
    /// Erase completed but the sectors are not blank.
    NotBlank { first_sector: u32, last_sector: u32 },
    /// Querying the controller's busy state failed.
    Poll { address: u32, source: E },
    /// The controller stayed busy past the wait limit.
    Timeout { address: u32 },
}

impl<E> Error<E> {
    /// Whether the same request may succeed if issued again.
    ///
    /// Only a busy timeout qualifies; everything else means the flash or the
    /// request is bad.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Flash address the failure is attributed to, when there is one.
    pub fn address(&self) -> Option<u32> {
        match self {
            Error::OutOfBounds { address, .. }
            | Error::Read { address, .. }
            | Error::Program { address, .. }
            | Error::Verify { address, .. }
            | Error::Poll { address, .. }
            | Error::Timeout { address } => Some(*address),
            Error::Erase { .. } | Error::NotBlank { .. } => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for Error<E>
where
    E: defmt::Format,
{
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::OutOfBounds { address, len } => {
                defmt::write!(fmt, "Error::OutOfBounds({=u32:#x}, {=usize})", address, len)
            }
            Error::Read {
                address,
                offset,
                source,
            } => defmt::write!(fmt, "Error::Read({=u32:#x}, {=usize}, {})", address, offset, source),
            Error::Program {
                address,
                offset,
                source,
            } => defmt::write!(
                fmt,
                "Error::Program({=u32:#x}, {=usize}, {})",
                address,
                offset,
                source
            ),
            Error::Verify { address, offset } => {
                defmt::write!(fmt, "Error::Verify({=u32:#x}, {=usize})", address, offset)
            }
            Error::Erase {
                first_sector,
                last_sector,
                source,
            } => defmt::write!(
                fmt,
                "Error::Erase({=u32}..={=u32}, {})",
                first_sector,
                last_sector,
                source
            ),
            Error::NotBlank {
                first_sector,
                last_sector,
            } => defmt::write!(fmt, "Error::NotBlank({=u32}..={=u32})", first_sector, last_sector),
            Error::Poll { address, source } => {
                defmt::write!(fmt, "Error::Poll({=u32:#x}, {})", address, source)
            }
            Error::Timeout { address } => defmt::write!(fmt, "Error::Timeout({=u32:#x})", address),
        }
    }
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfBounds { address, len } => {
                write!(f, "Error::OutOfBounds({:#x}, {})", address, len)
            }
            Error::Read {
                address,
                offset,
                source,
            } => write!(f, "Error::Read({:#x}, {}, {:?})", address, offset, source),
            Error::Program {
                address,
                offset,
                source,
            } => write!(f, "Error::Program({:#x}, {}, {:?})", address, offset, source),
            Error::Verify { address, offset } => {
                write!(f, "Error::Verify({:#x}, {})", address, offset)
            }
            Error::Erase {
                first_sector,
                last_sector,
                source,
            } => write!(
                f,
                "Error::Erase({}..={}, {:?})",
                first_sector, last_sector, source
            ),
            Error::NotBlank {
                first_sector,
                last_sector,
            } => write!(f, "Error::NotBlank({}..={})", first_sector, last_sector),
            Error::Poll { address, source } => {
                write!(f, "Error::Poll({:#x}, {:?})", address, source)
            }
            Error::Timeout { address } => write!(f, "Error::Timeout({:#x})", address),
        }
    }
}
