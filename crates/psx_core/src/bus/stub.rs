//! Devices that aren't emulated. They are mapped so the BIOS can poke at them without causing
//! bus errors.

use super::BusDevice;
use crate::addr::{AddrRange, Segment, Segments};
use crate::clock::Clock;

/// A device which reads as a constant and ignores writes.
pub struct Stub {
    name: &'static str,
    value: u32,
}

impl Stub {
    pub fn new(name: &'static str, value: u32) -> Self {
        Self { name, value }
    }
}

impl BusDevice for Stub {
    fn read32(&mut self, _: &mut Clock, _: Segment, _: u32) -> u32 {
        self.value
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, _: u32) -> u16 {
        self.value as u16
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, _: u32) -> u8 {
        self.value as u8
    }

    fn write32(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u32) {
        trace!("{} write of {val:08x} at offset {offset:x}", self.name);
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u16) {
        trace!("{} write of {val:04x} at offset {offset:x}", self.name);
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u8) {
        trace!("{} write of {val:02x} at offset {offset:x}", self.name);
    }
}

macro_rules! stubs {
    ($($name:literal: $start:literal..$end:literal = $value:literal),* $(,)?) => {
        /// Every stub device with its range and the value it reads as.
        pub const STUBS: &[(&str, AddrRange, u32)] = &[
            $(($name, AddrRange::new($start, $end, Segments::MAIN), $value)),*
        ];
    };
}

stubs! {
    "expansion 1": 0x1f00_0000..0x1f08_0000 = 0xffff_ffff,
    "peripherals": 0x1f80_1040..0x1f80_1060 = 0x0,
    "ram size": 0x1f80_1060..0x1f80_1064 = 0x0000_0b88,
    "interrupt control": 0x1f80_1070..0x1f80_1078 = 0x0,
    "timers": 0x1f80_1100..0x1f80_1130 = 0x0,
    "cdrom": 0x1f80_1800..0x1f80_1804 = 0x0,
    "mdec": 0x1f80_1820..0x1f80_1828 = 0x0,
    "spu voices": 0x1f80_1c00..0x1f80_1d80 = 0x0,
    "spu control": 0x1f80_1d80..0x1f80_1dc0 = 0x0,
    "spu reverb": 0x1f80_1dc0..0x1f80_1e00 = 0x0,
    "spu misc": 0x1f80_1e00..0x1f80_2000 = 0x0,
    "expansion 2": 0x1f80_2000..0x1f80_2080 = 0x0,
}

/// Memory control. Sets the base addresses and delays of the expansion regions, which don't
/// matter here, but the values are kept so they can be read back.
pub struct MemCtrl {
    regs: [u32; 9],
}

impl MemCtrl {
    pub const RANGE: AddrRange = AddrRange::new(0x1f80_1000, 0x1f80_1024, Segments::MAIN);

    pub fn new() -> Self {
        Self { regs: [0x0; 9] }
    }

    fn reg(offset: u32) -> usize {
        (offset >> 2) as usize
    }
}

impl Default for MemCtrl {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for MemCtrl {
    fn read32(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u32 {
        self.regs[Self::reg(offset)]
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u16 {
        (self.regs[Self::reg(offset)] >> ((offset & 2) * 8)) as u16
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u8 {
        (self.regs[Self::reg(offset)] >> ((offset & 3) * 8)) as u8
    }

    fn write32(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u32) {
        match offset {
            0 if val != 0x1f00_0000 => warn!("expansion 1 base address set to {val:08x}"),
            4 if val != 0x1f80_2000 => warn!("expansion 2 base address set to {val:08x}"),
            _ => (),
        }
        self.regs[Self::reg(offset)] = val;
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, offset: u32, _: u16) {
        panic!("16-bit write to memory control at offset {offset:x}")
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, offset: u32, _: u8) {
        panic!("8-bit write to memory control at offset {offset:x}")
    }
}
