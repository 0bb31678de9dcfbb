use crate::board::CoreClock;

/// Flash controller primitives the engine is built on.
///
/// Every call is synchronous: it returns once the controller has finished the
/// operation. Sector arguments are indices, addresses are byte offsets into
/// the flash array.
pub trait FlashIap {
    type Error;

    /// Reads flash contents into `buf`, starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Whether the controller is still busy with a previous operation.
    fn is_busy(&mut self) -> Result<bool, Self::Error>;

    /// Unprotects sectors `first..=last` for the next program or erase.
    fn prepare_sectors(&mut self, first: u32, last: u32) -> Result<(), Self::Error>;

    /// Programs `src` to flash at `dst`. `dst` is page aligned and `src` is
    /// exactly one page long.
    fn copy_ram_to_flash(
        &mut self,
        dst: u32,
        src: &[u8],
        clock: CoreClock,
    ) -> Result<(), Self::Error>;

    /// Sets all bytes of sectors `first..=last` to the erased state (FFh).
    fn erase_sectors(&mut self, first: u32, last: u32, clock: CoreClock)
        -> Result<(), Self::Error>;

    /// Returns `true` if flash at `dst` holds exactly `src`.
    fn compare(&mut self, dst: u32, src: &[u8]) -> Result<bool, Self::Error>;

    /// Returns `true` if every byte of sectors `first..=last` is erased.
    fn blank_check(&mut self, first: u32, last: u32) -> Result<bool, Self::Error>;
}
