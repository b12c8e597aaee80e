//! Host-side stand-ins for the tick source, the UART and the flash.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::serial;
use embedded_storage::nor_flash::{ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
use groundhog::RollingTimer;

use crate::packet::{Packet, PACKET_FRAME_BYTES};

/// A tick counter the test moves by hand.
#[derive(Clone, Default)]
pub struct FakeClock(Rc<Cell<u32>>);

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ticks: u32) {
        self.0.set(ticks);
    }

    pub fn advance(&self, ticks: u32) {
        self.0.set(self.0.get().wrapping_add(ticks));
    }
}

impl RollingTimer for FakeClock {
    type Tick = u32;
    const TICKS_PER_SECOND: u32 = 1_000;

    fn get_ticks(&self) -> u32 {
        self.0.get()
    }
}

#[derive(Default)]
struct Wire {
    to_device: VecDeque<u8>,
    from_device: Vec<u8>,
}

/// Both ends of a UART. The device owns one clone, the test keeps another.
#[derive(Clone, Default)]
pub struct FakeSerial(Rc<RefCell<Wire>>);

impl FakeSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_write(&self, bytes: &[u8]) {
        self.0.borrow_mut().to_device.extend(bytes.iter().copied());
    }

    pub fn host_send(&self, packet: &Packet) {
        self.host_write(&packet.to_bytes());
    }

    pub fn pending_to_device(&self) -> usize {
        self.0.borrow().to_device.len()
    }

    /// Everything the device wrote since the last call, split into frames.
    pub fn take_frames(&self) -> Vec<Packet> {
        let bytes = core::mem::take(&mut self.0.borrow_mut().from_device);
        assert_eq!(bytes.len() % PACKET_FRAME_BYTES, 0, "partial frame on the wire");

        bytes
            .chunks_exact(PACKET_FRAME_BYTES)
            .map(|chunk| {
                let mut frame = [0u8; PACKET_FRAME_BYTES];
                frame.copy_from_slice(chunk);
                let packet = Packet::from_bytes(&frame);
                assert!(packet.verify(), "device sent a bad checksum");
                packet
            })
            .collect()
    }
}

impl serial::Read<u8> for FakeSerial {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        self.0
            .borrow_mut()
            .to_device
            .pop_front()
            .ok_or(nb::Error::WouldBlock)
    }
}

impl serial::Write<u8> for FakeSerial {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Infallible> {
        self.0.borrow_mut().from_device.push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Infallible> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Erase { from: u32, to: u32 },
    Write { offset: u32, len: usize },
}

struct Medium {
    mem: Vec<u8>,
    ops: Vec<FlashOp>,
    fail_erase: bool,
}

/// RAM-backed NOR flash. Programming a byte that isn't erased is an error,
/// like on real parts.
#[derive(Clone)]
pub struct FakeFlash<const WRITE: usize = 1>(Rc<RefCell<Medium>>);

pub const FAKE_ERASE_SIZE: usize = 2048;

/// Byte-programmable flash, the common case in tests.
pub type ByteFlash = FakeFlash<1>;

impl<const WRITE: usize> FakeFlash<WRITE> {
    /// A flash of `size` bytes that starts out fully programmed with zeroes.
    pub fn new(size: usize) -> Self {
        Self(Rc::new(RefCell::new(Medium {
            mem: vec![0u8; size],
            ops: Vec::new(),
            fail_erase: false,
        })))
    }

    pub fn ops(&self) -> Vec<FlashOp> {
        self.0.borrow().ops.clone()
    }

    pub fn contents(&self, offset: usize, len: usize) -> Vec<u8> {
        self.0.borrow().mem[offset..offset + len].to_vec()
    }

    /// Overwrite one byte behind the driver's back.
    pub fn corrupt(&self, offset: usize, value: u8) {
        self.0.borrow_mut().mem[offset] = value;
    }

    pub fn fail_next_erase(&self) {
        self.0.borrow_mut().fail_erase = true;
    }
}

impl<const WRITE: usize> ErrorType for FakeFlash<WRITE> {
    type Error = NorFlashErrorKind;
}

impl<const WRITE: usize> ReadNorFlash for FakeFlash<WRITE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let medium = self.0.borrow();
        let start = offset as usize;
        let end = start + bytes.len();
        if end > medium.mem.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&medium.mem[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.0.borrow().mem.len()
    }
}

impl<const WRITE: usize> NorFlash for FakeFlash<WRITE> {
    const WRITE_SIZE: usize = WRITE;
    const ERASE_SIZE: usize = FAKE_ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let mut medium = self.0.borrow_mut();
        if medium.fail_erase {
            medium.fail_erase = false;
            return Err(NorFlashErrorKind::Other);
        }
        let (start, end) = (from as usize, to as usize);
        if start % FAKE_ERASE_SIZE != 0 || end % FAKE_ERASE_SIZE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if end > medium.mem.len() || start > end {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        medium.mem[start..end].iter_mut().for_each(|b| *b = 0xFF);
        medium.ops.push(FlashOp::Erase { from, to });
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut medium = self.0.borrow_mut();
        let start = offset as usize;
        let end = start + bytes.len();
        if start % WRITE != 0 || bytes.len() % WRITE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        if end > medium.mem.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        if medium.mem[start..end].iter().any(|b| *b != 0xFF) {
            return Err(NorFlashErrorKind::Other);
        }
        medium.mem[start..end].copy_from_slice(bytes);
        medium.ops.push(FlashOp::Write { offset, len: bytes.len() });
        Ok(())
    }
}
