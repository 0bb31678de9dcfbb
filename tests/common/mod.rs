#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use lpc_iap_flash_rs::board::BOOT_CLOCK_PLL_180M_HZ;
use lpc_iap_flash_rs::{hal_init, BootClock, CoreClock, Flash, FlashIap};

pub const PAGE_SIZE: usize = 256;
pub const SECTOR_SIZE: usize = 4096;
pub const FLASH_SIZE: usize = 0x1_0000;

pub type TestFlash = Flash<MockIap, MockDelay, PAGE_SIZE, SECTOR_SIZE, FLASH_SIZE>;

/// One primitive call seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Read { addr: u32, len: usize },
    Prepare { first: u32, last: u32 },
    Program { dst: u32, data: Vec<u8>, clock_hz: u32 },
    Erase { first: u32, last: u32, clock_hz: u32 },
    Compare { dst: u32, len: usize },
    BlankCheck { first: u32, last: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError(pub &'static str);

#[derive(Debug)]
pub struct State {
    pub memory: Vec<u8>,
    pub ops: Vec<Op>,
    prepared: Option<(u32, u32)>,
    /// Reading at this address fails.
    pub fail_read_at: Option<u32>,
    /// Programming this page address fails.
    pub fail_program_at: Option<u32>,
    /// Programming this page address silently flips a byte.
    pub corrupt_program_at: Option<u32>,
    pub fail_erase: bool,
    /// Erase leaves the first byte of the range programmed.
    pub erase_leaves_data: bool,
    /// Number of `is_busy` calls that report busy; `u32::MAX` never clears.
    pub busy_polls: u32,
    pub fail_poll: bool,
}

impl State {
    pub fn programs(&self) -> Vec<(u32, Vec<u8>)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Program { dst, data, .. } => Some((*dst, data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn erases(&self) -> Vec<(u32, u32)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Erase { first, last, .. } => Some((*first, *last)),
                _ => None,
            })
            .collect()
    }

    fn take_prepared(&mut self, first: u32, last: u32) -> Result<(), MockError> {
        match self.prepared.take() {
            Some((p_first, p_last)) if p_first <= first && last <= p_last => Ok(()),
            _ => Err(MockError("sector not prepared")),
        }
    }
}

/// In-memory flash that records every call.
#[derive(Debug, Clone)]
pub struct MockIap {
    pub state: Rc<RefCell<State>>,
}

impl MockIap {
    pub fn new() -> Self {
        Self::with_memory(vec![0xFF; FLASH_SIZE])
    }

    pub fn with_memory(memory: Vec<u8>) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                memory,
                ops: Vec::new(),
                prepared: None,
                fail_read_at: None,
                fail_program_at: None,
                corrupt_program_at: None,
                fail_erase: false,
                erase_leaves_data: false,
                busy_polls: 0,
                fail_poll: false,
            })),
        }
    }
}

impl FlashIap for MockIap {
    type Error = MockError;

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::Read {
            addr,
            len: buf.len(),
        });
        if state.fail_read_at == Some(addr) {
            return Err(MockError("read failed"));
        }
        let start = addr as usize;
        buf.copy_from_slice(&state.memory[start..start + buf.len()]);
        Ok(())
    }

    fn is_busy(&mut self) -> Result<bool, MockError> {
        let mut state = self.state.borrow_mut();
        if state.fail_poll {
            return Err(MockError("status read failed"));
        }
        if state.busy_polls == 0 {
            return Ok(false);
        }
        if state.busy_polls != u32::MAX {
            state.busy_polls -= 1;
        }
        Ok(true)
    }

    fn prepare_sectors(&mut self, first: u32, last: u32) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::Prepare { first, last });
        state.prepared = Some((first, last));
        Ok(())
    }

    fn copy_ram_to_flash(
        &mut self,
        dst: u32,
        src: &[u8],
        clock: CoreClock,
    ) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::Program {
            dst,
            data: src.to_vec(),
            clock_hz: clock.hz(),
        });
        let sector = dst / SECTOR_SIZE as u32;
        state.take_prepared(sector, sector)?;
        if dst as usize % PAGE_SIZE != 0 || src.len() != PAGE_SIZE {
            return Err(MockError("unaligned program"));
        }
        if state.fail_program_at == Some(dst) {
            return Err(MockError("program failed"));
        }
        let start = dst as usize;
        state.memory[start..start + src.len()].copy_from_slice(src);
        if state.corrupt_program_at == Some(dst) {
            state.memory[start] ^= 0x01;
        }
        Ok(())
    }

    fn erase_sectors(&mut self, first: u32, last: u32, clock: CoreClock) -> Result<(), MockError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::Erase {
            first,
            last,
            clock_hz: clock.hz(),
        });
        state.take_prepared(first, last)?;
        if state.fail_erase {
            return Err(MockError("erase failed"));
        }
        let start = first as usize * SECTOR_SIZE;
        let end = (last as usize + 1) * SECTOR_SIZE;
        state.memory[start..end].fill(0xFF);
        if state.erase_leaves_data {
            state.memory[start] = 0x00;
        }
        Ok(())
    }

    fn compare(&mut self, dst: u32, src: &[u8]) -> Result<bool, MockError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::Compare {
            dst,
            len: src.len(),
        });
        let start = dst as usize;
        Ok(state.memory[start..start + src.len()] == *src)
    }

    fn blank_check(&mut self, first: u32, last: u32) -> Result<bool, MockError> {
        let mut state = self.state.borrow_mut();
        state.ops.push(Op::BlankCheck { first, last });
        let start = first as usize * SECTOR_SIZE;
        let end = (last as usize + 1) * SECTOR_SIZE;
        Ok(state.memory[start..end].iter().all(|&b| b == 0xFF))
    }
}

/// Delay that only counts.
#[derive(Debug, Clone, Default)]
pub struct MockDelay {
    pub total_ns: Rc<RefCell<u64>>,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        *self.total_ns.borrow_mut() += u64::from(ns);
    }
}

pub struct TestClocks;

impl BootClock for TestClocks {
    fn configure(self) -> u32 {
        BOOT_CLOCK_PLL_180M_HZ
    }
}

/// Memory filled with a recognisable, position dependent pattern.
pub fn patterned_memory() -> Vec<u8> {
    (0..FLASH_SIZE).map(|i| (i % 251) as u8).collect()
}

pub fn flash(iap: MockIap) -> (TestFlash, Rc<RefCell<State>>, MockDelay) {
    let state = iap.state.clone();
    let delay = MockDelay::default();
    let flash = TestFlash::new(iap, delay.clone(), hal_init(TestClocks));
    (flash, state, delay)
}
