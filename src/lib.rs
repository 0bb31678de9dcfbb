//! Page-merge flash write/erase engine for the LPC546xx internal flash, as used
//! by a bootloader's update path.
//!
//! The flash can only be programmed a whole page at a time and erased a whole
//! sector at a time. [`Flash::write`] accepts any byte range and merges it into
//! the existing page contents; [`Flash::erase`] erases every sector the range
//! touches.
#![cfg_attr(not(test), no_std)]

mod fmt;

pub mod board;
pub mod error;
pub mod flash;
pub mod geometry;
pub mod iap;
pub mod traits;

pub use board::{fatal, hal_init, hal_prepare_boot, BootClock, CoreClock};
pub use error::Error;
pub use flash::{Flash, Lpc546xxFlash};
pub use geometry::{Geometry, PageChunk, ERASED_BYTE};
pub use iap::{IapStatus, RomIap};
pub use traits::FlashIap;
