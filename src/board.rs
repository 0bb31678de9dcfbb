//! Board bring-up hooks around the flash engine.

/// Core clock of the PLL configuration the bootloader runs at.
pub const BOOT_CLOCK_PLL_180M_HZ: u32 = 180_000_000;

/// Core clock frequency used by the flash controller for program and erase
/// timing.
///
/// Only [`hal_init`] produces one, so holding a `CoreClock` proves the clock
/// tree has been configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoreClock(u32);

impl CoreClock {
    pub const fn hz(self) -> u32 {
        self.0
    }

    /// Frequency in kHz, the unit the boot ROM expects.
    pub const fn khz(self) -> u32 {
        self.0 / 1000
    }
}

/// Clock and power bring-up for the target.
///
/// Implemented by the board support code; the flash engine only needs the
/// resulting core frequency.
pub trait BootClock {
    /// Switches the core to its boot frequency and returns it in Hz.
    fn configure(self) -> u32;
}

/// Brings up the clock tree. Must run before any flash operation.
///
/// `clocks` is consumed, so the setup runs once per clock tree.
pub fn hal_init<C: BootClock>(clocks: C) -> CoreClock {
    let hz = clocks.configure();
    if hz == 0 {
        error!("clock setup reported a 0 Hz core clock");
        fatal();
    }
    info!("core clock {=u32} Hz", hz);
    CoreClock(hz)
}

/// Called once the update decision is final, before jumping to the image.
/// Nothing to tear down on this target.
pub fn hal_prepare_boot() {}

/// Halts the core for good.
///
/// Used when an internal invariant is broken. There is no reset and no
/// return.
pub fn fatal() -> ! {
    error!("fatal assertion, halting");
    loop {
        core::hint::spin_loop();
    }
}
