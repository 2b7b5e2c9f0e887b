use psx_util::Bit;

use super::raw::RawMem;
use super::{AddrUnit, BusDevice, Byte, HalfWord, Word};
use crate::addr::{AddrRange, Segment, Segments};
use crate::clock::Clock;

/// 2 MB of main memory. It's mirrored four times over its 8 MB range.
pub struct Ram {
    mem: RawMem,
}

impl Ram {
    pub const SIZE: usize = 2 * 1024 * 1024;

    pub const RANGE: AddrRange = AddrRange::new(0x0, 0x80_0000, Segments::MAIN);

    pub fn new() -> Self {
        // Garbage left in memory at startup. Nothing should rely on it.
        Self { mem: RawMem::filled(Self::SIZE, 0xaa) }
    }

    #[inline]
    pub fn load<T: AddrUnit>(&self, offset: u32) -> u32 {
        self.mem.load::<T>(offset.bit_range(0, 20))
    }

    #[inline]
    pub fn store<T: AddrUnit>(&mut self, offset: u32, val: u32) {
        self.mem.store::<T>(offset.bit_range(0, 20), val)
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for Ram {
    fn read32(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u32 {
        self.load::<Word>(offset)
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u16 {
        self.load::<HalfWord>(offset) as u16
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u8 {
        self.load::<Byte>(offset) as u8
    }

    fn write32(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u32) {
        self.store::<Word>(offset, val)
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u16) {
        self.store::<HalfWord>(offset, val.into())
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u8) {
        self.store::<Byte>(offset, val.into())
    }

    fn peek32(&self, offset: u32) -> Option<u32> {
        Some(self.load::<Word>(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored() {
        let mut ram = Ram::new();
        ram.store::<Word>(0x10, 0xdead_beef);
        for mirror in 0..4 {
            assert_eq!(ram.load::<Word>(mirror * Ram::SIZE as u32 + 0x10), 0xdead_beef);
        }
    }

    #[test]
    fn little_endian() {
        let mut ram = Ram::new();
        ram.store::<Word>(0x0, 0x1122_3344);
        assert_eq!(ram.load::<Byte>(0x0), 0x44);
        assert_eq!(ram.load::<HalfWord>(0x2), 0x1122);

        ram.store::<Byte>(0x1, 0xff);
        assert_eq!(ram.load::<Word>(0x0), 0x1122_ff44);
    }

    #[test]
    fn startup_garbage() {
        let ram = Ram::new();
        assert_eq!(ram.load::<Word>(0x1000), 0xaaaa_aaaa);
    }
}
