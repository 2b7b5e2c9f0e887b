//! The system bus. Every memory access made by the CPU or DMA goes through here and is routed to
//! the device mapped at the address.
//!
//! Devices are mapped by physical offset together with the segments they can be reached from.
//! The ranges are kept in a binary search tree keyed by the start offset. The tree is never
//! rebalanced, which doesn't matter since the memory map is built once at startup.

pub mod bios;
pub mod dma;
pub mod ram;
pub mod scratchpad;
pub mod stub;

mod raw;

use psx_util::Bit;
use thiserror::Error;

use crate::addr::{self, AddrRange, Segment, Segments};
use crate::clock::{Clock, ClockHandle};
use crate::cpu::{Exception, Fault};

use std::any::Any;

use dma::{Dma, DmaChan, Port, PortTarget};
use ram::Ram;

/// The number of ranges a bus can hold by default. The standard memory map leaves room for a
/// few more devices.
pub const DEFAULT_CAPACITY: usize = 29;

/// Lets the bus hand out typed references to boxed devices.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A device mapped on the bus.
///
/// `offset` is relative to the start of the range the device is mapped at, and `segment` is the
/// segment the address was in. Reads and writes never fail, since a misaligned or unmapped
/// access is caught by the bus before it reaches the device. A device that can't be accessed at
/// some width should panic, since only a broken program would do that.
pub trait BusDevice: AsAny {
    fn read32(&mut self, clock: &mut Clock, segment: Segment, offset: u32) -> u32;
    fn read16(&mut self, clock: &mut Clock, segment: Segment, offset: u32) -> u16;
    fn read8(&mut self, clock: &mut Clock, segment: Segment, offset: u32) -> u8;

    fn write32(&mut self, clock: &mut Clock, segment: Segment, offset: u32, val: u32);
    fn write16(&mut self, clock: &mut Clock, segment: Segment, offset: u32, val: u16);
    fn write8(&mut self, clock: &mut Clock, segment: Segment, offset: u32, val: u8);

    /// The amount of extra CPU cycles an access takes.
    fn cpu_cycles(&self) -> u32 {
        0
    }

    /// Called by the clock when the device is due. `cycles` is the amount of the device's own
    /// cycles since the last update.
    fn update(&mut self, _clock: &mut Clock, _cycles: u32) {}

    /// Read a word without any side effects. Used to look at memory without disturbing the
    /// system.
    fn peek32(&self, _offset: u32) -> Option<u32> {
        None
    }

    /// The device as a DMA channel, if it's connected to one.
    fn as_dma_chan(&mut self) -> Option<&mut dyn DmaChan> {
        None
    }
}

/// The width of a bus access.
pub trait AddrUnit {
    const WIDTH: usize;

    fn is_aligned(address: u32) -> bool;

    fn read(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32) -> u32;

    /// Write the low [`Self::WIDTH`] bytes of `val`.
    fn write(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32, val: u32);
}

pub struct Byte;

impl AddrUnit for Byte {
    const WIDTH: usize = 1;

    fn is_aligned(_: u32) -> bool {
        true
    }

    fn read(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32) -> u32 {
        dev.read8(clock, segment, offset) as u32
    }

    fn write(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32, val: u32) {
        dev.write8(clock, segment, offset, val as u8)
    }
}

pub struct HalfWord;

impl AddrUnit for HalfWord {
    const WIDTH: usize = 2;

    fn is_aligned(address: u32) -> bool {
        address & 1 == 0
    }

    fn read(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32) -> u32 {
        dev.read16(clock, segment, offset) as u32
    }

    fn write(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32, val: u32) {
        dev.write16(clock, segment, offset, val as u16)
    }
}

pub struct Word;

impl AddrUnit for Word {
    const WIDTH: usize = 4;

    fn is_aligned(address: u32) -> bool {
        address & 3 == 0
    }

    fn read(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32) -> u32 {
        dev.read32(clock, segment, offset)
    }

    fn write(dev: &mut dyn BusDevice, clock: &mut Clock, segment: Segment, offset: u32, val: u32) {
        dev.write32(clock, segment, offset, val)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BusError {
    #[error("range {new} starts at the same offset as registered range {existing}")]
    DuplicateRange { new: AddrRange, existing: AddrRange },

    #[error("range {new} overlaps registered range {existing}")]
    Overlap { new: AddrRange, existing: AddrRange },

    #[error("bus is full: can't map more than {0} ranges")]
    Full(usize),
}

/// Identifies a device added with [`Bus::register_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(usize);

/// What a range is mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Ram,
    Dma,
    CacheCtrl,
    Device(DeviceId),
}

struct Node {
    range: AddrRange,
    target: Target,
    /// The largest end offset of all ranges in the subtree, including this one.
    max_end: u32,
    left: Option<usize>,
    right: Option<usize>,
}

pub struct Bus {
    pub clock: Clock,
    pub cache_ctrl: CacheCtrl,
    pub(crate) ram: Ram,
    pub(crate) dma: Dma,
    devices: Vec<Box<dyn BusDevice>>,
    /// The device to update for each clock handle.
    clock_routes: Vec<Option<DeviceId>>,
    nodes: Vec<Node>,
    capacity: usize,
}

impl Bus {
    pub fn new(clock: Clock) -> Self {
        Self::with_capacity(clock, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(clock: Clock, capacity: usize) -> Self {
        Self {
            clock,
            cache_ctrl: CacheCtrl(0),
            ram: Ram::new(),
            dma: Dma::new(),
            devices: Vec::new(),
            clock_routes: Vec::new(),
            nodes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Map `range` to `target`.
    ///
    /// The same target may be mapped more than once. Fails if the bus is full, or if the range
    /// collides with one already mapped in any of the segments they share.
    pub fn map(&mut self, target: Target, range: AddrRange) -> Result<(), BusError> {
        if self.nodes.len() >= self.capacity {
            return Err(BusError::Full(self.capacity));
        }
        for node in &self.nodes {
            if !node.range.segments.intersects(range.segments) {
                continue;
            }
            let existing = node.range;
            if existing.start == range.start {
                return Err(BusError::DuplicateRange { new: range, existing });
            }
            if existing.overlaps(&range) {
                return Err(BusError::Overlap { new: range, existing });
            }
        }

        let idx = self.nodes.len();
        self.nodes.push(Node {
            range,
            target,
            max_end: range.end,
            left: None,
            right: None,
        });

        if idx == 0 {
            return Ok(());
        }

        let mut parent = 0;
        loop {
            let node = &mut self.nodes[parent];
            node.max_end = node.max_end.max(range.end);
            let child = if range.start < node.range.start {
                &mut node.left
            } else {
                &mut node.right
            };
            match *child {
                Some(next) => parent = next,
                None => {
                    *child = Some(idx);
                    break Ok(());
                }
            }
        }
    }

    /// Add a device to the bus and map it at `range`.
    pub fn register_device(
        &mut self,
        device: Box<dyn BusDevice>,
        range: AddrRange,
    ) -> Result<DeviceId, BusError> {
        let id = DeviceId(self.devices.len());
        self.map(Target::Device(id), range)?;
        self.devices.push(device);
        Ok(id)
    }

    /// Let the device `id` be updated by the clock through `handle`.
    pub fn route_clock(&mut self, handle: ClockHandle, id: DeviceId) {
        let idx = handle.index();
        if self.clock_routes.len() <= idx {
            self.clock_routes.resize(idx + 1, None);
        }
        self.clock_routes[idx] = Some(id);
    }

    /// Connect DMA channel `port` to the device `id`, which takes `clocks_per_word` cycles to
    /// transfer each word.
    ///
    /// # Panics
    ///
    /// If the device isn't a DMA channel.
    pub fn set_dma_port(&mut self, port: Port, id: DeviceId, clocks_per_word: u32) {
        if self.devices[id.0].as_dma_chan().is_none() {
            panic!("device connected to DMA port {port:?} isn't a DMA channel");
        }
        self.dma.set_port(port, PortTarget::Device(id), clocks_per_word);
    }

    /// Typed access to a device added with [`Bus::register_device`].
    pub fn device<T: BusDevice + Any>(&self, id: DeviceId) -> Option<&T> {
        let device: &dyn BusDevice = self.devices.get(id.0)?.as_ref();
        device.as_any().downcast_ref()
    }

    pub fn device_mut<T: BusDevice + Any>(&mut self, id: DeviceId) -> Option<&mut T> {
        let device: &mut dyn BusDevice = self.devices.get_mut(id.0)?.as_mut();
        device.as_any_mut().downcast_mut()
    }

    fn find(&self, idx: Option<usize>, segment: Segment, phys: u32) -> Option<&Node> {
        let node = &self.nodes[idx?];
        if node.range.contains(segment, phys) {
            return Some(node);
        }
        if phys < node.range.start {
            return self.find(node.left, segment, phys);
        }
        // A range starting before this one can still contain the offset if it's mapped in
        // other segments and overlaps this one physically.
        self.find(node.right, segment, phys).or_else(|| {
            node.left
                .filter(|&left| self.nodes[left].max_end > phys)
                .and_then(|left| self.find(Some(left), segment, phys))
        })
    }

    /// Find the target mapped at `addr`, the offset into the range and the segment.
    fn lookup(&self, addr: u32) -> Option<(Target, u32, Segment)> {
        if self.nodes.is_empty() {
            return None;
        }
        let segment = Segment::of(addr);
        let phys = addr::physical(addr);
        self.find(Some(0), segment, phys)
            .map(|node| (node.target, phys - node.range.start, segment))
    }

    /// Split out the device for `target` and the clock.
    fn target(&mut self, target: Target) -> (&mut dyn BusDevice, &mut Clock) {
        let Bus { clock, ram, dma, cache_ctrl, devices, .. } = self;
        let dev: &mut dyn BusDevice = match target {
            Target::Ram => ram,
            Target::Dma => dma,
            Target::CacheCtrl => cache_ctrl,
            Target::Device(id) => devices[id.0].as_mut(),
        };
        (dev, clock)
    }

    /// Read a value of width `T` at `addr`. Returns the value and the amount of extra cycles the
    /// access took.
    pub fn load<T: AddrUnit>(&mut self, addr: u32) -> Result<(u32, u32), Fault> {
        let Some((target, offset, segment)) = self.lookup(addr) else {
            debug!("bus error when loading at {addr:08x}");
            return Err(Fault::new(Exception::BusFetchError, addr));
        };
        if !T::is_aligned(addr) {
            return Err(Fault::new(Exception::AddressFetchError, addr));
        }
        let (dev, clock) = self.target(target);
        let val = T::read(dev, clock, segment, offset);
        Ok((val, dev.cpu_cycles()))
    }

    /// Write the low bytes of `val` at `addr`. Returns the amount of extra cycles the access took.
    pub fn store<T: AddrUnit>(&mut self, addr: u32, val: u32) -> Result<u32, Fault> {
        let Some((target, offset, segment)) = self.lookup(addr) else {
            debug!("bus error when storing at {addr:08x}");
            return Err(Fault::new(Exception::BusStoreError, addr));
        };
        if !T::is_aligned(addr) {
            return Err(Fault::new(Exception::AddressStoreError, addr));
        }
        let (dev, clock) = self.target(target);
        T::write(dev, clock, segment, offset, val);
        Ok(dev.cpu_cycles())
    }

    /// Read a value at `addr` without any side effects. Only memories support this.
    pub fn peek<T: AddrUnit>(&self, addr: u32) -> Option<u32> {
        if !T::is_aligned(addr) {
            return None;
        }
        let (target, offset, _) = self.lookup(addr)?;
        let word_offset = offset & !3;
        let word = match target {
            Target::Ram => self.ram.peek32(word_offset),
            Target::Device(id) => self.devices[id.0].peek32(word_offset),
            Target::Dma | Target::CacheCtrl => None,
        }?;
        let shift = (offset & 3) * 8;
        let mask = u32::MAX >> (32 - 8 * T::WIDTH as u32);
        Some((word >> shift) & mask)
    }

    /// Move the clock `cycles` CPU cycles forward and update every device that is due.
    pub fn tick(&mut self, cycles: u32) {
        let Bus { clock, devices, clock_routes, .. } = self;
        update_devices(clock, devices, clock_routes, cycles);
    }
}

fn update_devices(
    clock: &mut Clock,
    devices: &mut [Box<dyn BusDevice>],
    routes: &[Option<DeviceId>],
    cycles: u32,
) {
    clock.tick(cycles, |clock, handle, elapsed| {
        match routes.get(handle.index()).copied().flatten() {
            Some(id) => devices[id.0].update(clock, elapsed),
            None => trace!("clock handle {handle:?} isn't routed to a device"),
        }
    });
}

/// The cache control register.
pub struct CacheCtrl(u32);

impl CacheCtrl {
    pub const RANGE: AddrRange = AddrRange::new(0xfffe_0130, 0xfffe_0134, Segments::KERNEL2);

    pub fn icache_enabled(&self) -> bool {
        self.0.bit(11)
    }

    /// Isolated stores invalidate cache lines instead of writing data.
    pub fn tag_test_mode(&self) -> bool {
        self.0.bit(2)
    }
}

impl BusDevice for CacheCtrl {
    fn read32(&mut self, _: &mut Clock, _: Segment, _: u32) -> u32 {
        self.0
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, _: u32) -> u16 {
        panic!("16-bit read from cache control")
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, _: u32) -> u8 {
        panic!("8-bit read from cache control")
    }

    fn write32(&mut self, _: &mut Clock, _: Segment, _: u32, val: u32) {
        trace!("cache control set to {val:08x}");
        self.0 = val;
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, _: u32, _: u16) {
        panic!("16-bit write to cache control")
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, _: u32, _: u8) {
        panic!("8-bit write to cache control")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stub::Stub;

    fn range(start: u32, end: u32, segments: Segments) -> AddrRange {
        AddrRange::new(start, end, segments)
    }

    #[test]
    fn duplicate_start() {
        let mut bus = Bus::new(Clock::new());
        bus.map(Target::Ram, range(0x0, 0x100, Segments::MAIN)).unwrap();
        let err = bus.map(Target::Dma, range(0x0, 0x10, Segments::KERNEL1)).unwrap_err();
        assert!(matches!(err, BusError::DuplicateRange { .. }));
    }

    #[test]
    fn overlap() {
        let mut bus = Bus::new(Clock::new());
        bus.map(Target::Ram, range(0x100, 0x200, Segments::MAIN)).unwrap();
        let err = bus.map(Target::Dma, range(0x1fc, 0x204, Segments::USER)).unwrap_err();
        assert!(matches!(err, BusError::Overlap { .. }));
        let err = bus.map(Target::Dma, range(0x80, 0x104, Segments::USER)).unwrap_err();
        assert!(matches!(err, BusError::Overlap { .. }));

        // Fine as long as they don't share a segment.
        bus.map(Target::Dma, range(0x80, 0x104, Segments::KERNEL2)).unwrap();
    }

    #[test]
    fn full() {
        let mut bus = Bus::with_capacity(Clock::new(), 2);
        bus.map(Target::Ram, range(0x0, 0x10, Segments::MAIN)).unwrap();
        bus.map(Target::Dma, range(0x10, 0x20, Segments::MAIN)).unwrap();
        assert_eq!(
            bus.map(Target::CacheCtrl, range(0x20, 0x30, Segments::MAIN)),
            Err(BusError::Full(2)),
        );
    }

    #[test]
    fn lookup_many_ranges() {
        let mut bus = Bus::new(Clock::new());
        let starts = [0x800, 0x400, 0xc00, 0x200, 0x600, 0xa00, 0xe00];
        for (i, start) in starts.iter().enumerate() {
            let dev = Box::new(Stub::new("test", i as u32));
            bus.register_device(dev, range(*start, start + 0x100, Segments::MAIN)).unwrap();
        }
        for (i, start) in starts.iter().enumerate() {
            assert_eq!(bus.load::<Word>(start + 0x80).unwrap().0, i as u32);
            assert_eq!(bus.load::<Word>(0xa000_0000 + start).unwrap().0, i as u32);
            assert_eq!(
                bus.load::<Word>(start + 0x100).unwrap_err().exception,
                Exception::BusFetchError,
            );
        }
    }

    #[test]
    fn lookup_by_segment() {
        let mut bus = Bus::new(Clock::new());
        let a = Box::new(Stub::new("kernel", 1));
        let b = Box::new(Stub::new("main", 2));
        bus.register_device(a, range(0x1000, 0x2000, Segments::KERNEL2)).unwrap();
        bus.register_device(b, range(0x800, 0x1800, Segments::MAIN)).unwrap();

        assert_eq!(bus.load::<Word>(0x1400).unwrap().0, 2);
        assert_eq!(bus.load::<Word>(0xe000_1400).unwrap().0, 1);
        assert!(bus.load::<Word>(0xe000_0800).is_err());
    }

    #[test]
    fn lookup_before_alignment() {
        let mut bus = Bus::new(Clock::new());
        bus.map(Target::Ram, range(0x0, 0x1000, Segments::MAIN)).unwrap();

        let err = bus.load::<Word>(0x2001).unwrap_err();
        assert_eq!(err.exception, Exception::BusFetchError);
        let err = bus.store::<HalfWord>(0x2001, 0).unwrap_err();
        assert_eq!(err.exception, Exception::BusStoreError);

        let err = bus.load::<Word>(0x0001).unwrap_err();
        assert_eq!(err, Fault::new(Exception::AddressFetchError, 0x1));
        let err = bus.store::<HalfWord>(0x0001, 0).unwrap_err();
        assert_eq!(err, Fault::new(Exception::AddressStoreError, 0x1));

        assert!(bus.load::<Byte>(0x0001).is_ok());
    }

    #[test]
    fn store_then_peek() {
        let mut bus = Bus::new(Clock::new());
        bus.map(Target::Ram, range(0x0, 0x1000, Segments::MAIN)).unwrap();

        bus.store::<Word>(0x8000_0010, 0x1234_5678).unwrap();
        assert_eq!(bus.peek::<Word>(0xa000_0010), Some(0x1234_5678));
        assert_eq!(bus.peek::<HalfWord>(0x12), Some(0x1234));
        assert_eq!(bus.peek::<Byte>(0x11), Some(0x56));
    }
}
