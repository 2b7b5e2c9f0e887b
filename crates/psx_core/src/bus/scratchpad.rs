use super::raw::RawMem;
use super::{BusDevice, Byte, HalfWord, Word};
use crate::addr::{AddrRange, Segment, Segments};
use crate::clock::Clock;

/// 1 KB of fast memory, which is really the data cache locked in place. It can't be reached from
/// uncached addresses.
pub struct ScratchPad {
    mem: RawMem,
}

impl ScratchPad {
    pub const SIZE: usize = 1024;

    pub const RANGE: AddrRange = AddrRange::new(
        0x1f80_0000,
        0x1f80_0400,
        Segments::USER.union(Segments::KERNEL0),
    );

    pub fn new() -> Self {
        Self { mem: RawMem::filled(Self::SIZE, 0x0) }
    }

    fn offset(offset: u32) -> u32 {
        offset & (Self::SIZE as u32 - 1)
    }
}

impl Default for ScratchPad {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for ScratchPad {
    fn read32(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u32 {
        self.mem.load::<Word>(Self::offset(offset))
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u16 {
        self.mem.load::<HalfWord>(Self::offset(offset)) as u16
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u8 {
        self.mem.load::<Byte>(Self::offset(offset)) as u8
    }

    fn write32(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u32) {
        self.mem.store::<Word>(Self::offset(offset), val)
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u16) {
        self.mem.store::<HalfWord>(Self::offset(offset), val.into())
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u8) {
        self.mem.store::<Byte>(Self::offset(offset), val.into())
    }

    fn peek32(&self, offset: u32) -> Option<u32> {
        Some(self.mem.load::<Word>(Self::offset(offset)))
    }
}
