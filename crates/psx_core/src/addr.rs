//! The MIPS address space split into segments.
//!
//! | Segment | Range                 | Notes                          |
//! |---------|-----------------------|--------------------------------|
//! | KUSEG   | 0x00000000-0x7fffffff | User, cached                   |
//! | KSEG0   | 0x80000000-0x9fffffff | Kernel, cached mirror of KUSEG |
//! | KSEG1   | 0xa0000000-0xbfffffff | Kernel, uncached mirror        |
//! | KSEG2   | 0xc0000000-0xffffffff | Kernel, control registers      |
//!
//! Devices are registered by physical offset, which is the address with the top three bits
//! masked off, together with the set of segments they can be reached from.

use bitflags::bitflags;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    User,
    Kernel0,
    Kernel1,
    Kernel2,
    /// The upper half of KUSEG. Nothing is mapped there.
    Invalid,
}

impl Segment {
    /// The segment an address belongs to. Only depends on the top three bits.
    pub fn of(addr: u32) -> Self {
        const SEGMENTS: [Segment; 8] = [
            Segment::User,
            Segment::Invalid,
            Segment::Invalid,
            Segment::Invalid,
            Segment::Kernel0,
            Segment::Kernel1,
            Segment::Invalid,
            Segment::Kernel2,
        ];
        SEGMENTS[(addr >> 29) as usize]
    }

    /// The bit representing the segment in [`Segments`]. [`Segment::Invalid`] has none, so it's
    /// never contained in any range.
    pub fn flag(self) -> Segments {
        match self {
            Segment::User => Segments::USER,
            Segment::Kernel0 => Segments::KERNEL0,
            Segment::Kernel1 => Segments::KERNEL1,
            Segment::Kernel2 => Segments::KERNEL2,
            Segment::Invalid => Segments::empty(),
        }
    }

    /// Instructions fetched from these segments go through the instruction cache.
    pub fn is_cached(self) -> bool {
        matches!(self, Segment::User | Segment::Kernel0)
    }
}

bitflags! {
    /// A set of segments an address range can be reached from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Segments: u8 {
        const USER = 1 << 0;
        const KERNEL0 = 1 << 1;
        const KERNEL1 = 1 << 2;
        const KERNEL2 = 1 << 3;
        /// The three mirrors of physical memory.
        const MAIN = Self::USER.bits() | Self::KERNEL0.bits() | Self::KERNEL1.bits();
    }
}

/// The physical offset of an address.
#[inline]
pub fn physical(addr: u32) -> u32 {
    addr & 0x1fff_ffff
}

/// A range of physical offsets, reachable from a set of segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrRange {
    /// First physical offset in the range.
    pub start: u32,
    /// One past the last physical offset in the range.
    pub end: u32,
    pub segments: Segments,
}

impl AddrRange {
    /// Create a range from `start` to `end` exclusive. Both may be given either as physical
    /// offsets or as addresses in any segment.
    pub const fn new(start: u32, end: u32, segments: Segments) -> Self {
        // The end may be exactly the start of the next segment, so it's only masked when the
        // range doesn't end on a segment boundary.
        let end = if end & 0x1fff_ffff == 0 && end != 0 {
            0x2000_0000
        } else {
            end & 0x1fff_ffff
        };
        Self { start: start & 0x1fff_ffff, end, segments }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// If the physical offset `phys` reached from `segment` lies inside the range.
    #[inline]
    pub fn contains(&self, segment: Segment, phys: u32) -> bool {
        self.segments.contains(segment.flag())
            && !segment.flag().is_empty()
            && (self.start..self.end).contains(&phys)
    }

    /// If the two ranges share at least one segment and one physical offset.
    pub fn overlaps(&self, other: &AddrRange) -> bool {
        self.segments.intersects(other.segments)
            && self.start < other.end
            && other.start < self.end
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x}..{:08x} ({:?})", self.start, self.end, self.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_of_address() {
        assert_eq!(Segment::of(0x0000_1000), Segment::User);
        assert_eq!(Segment::of(0x7fff_ffff), Segment::Invalid);
        assert_eq!(Segment::of(0x8000_0000), Segment::Kernel0);
        assert_eq!(Segment::of(0xa000_0000), Segment::Kernel1);
        assert_eq!(Segment::of(0xbfc0_0000), Segment::Kernel1);
        assert_eq!(Segment::of(0xc000_0000), Segment::Invalid);
        assert_eq!(Segment::of(0xfffe_0130), Segment::Kernel2);
    }

    #[test]
    fn physical_clears_top_bits() {
        for addr in [0x0, 0x8000_1234, 0xa000_1234, 0xbfc0_0000, 0xffff_ffff, 0x1fff_ffff] {
            assert_eq!(physical(addr), addr & 0x1fff_ffff);
            assert_eq!(physical(addr) >> 29, 0);
        }
        assert_eq!(physical(0x8000_1234), physical(0xa000_1234));
    }

    #[test]
    fn range_contains() {
        let range = AddrRange::new(0x1f80_0000, 0x1f80_0400, Segments::USER | Segments::KERNEL0);
        assert!(range.contains(Segment::User, 0x1f80_0000));
        assert!(range.contains(Segment::Kernel0, 0x1f80_03ff));
        assert!(!range.contains(Segment::Kernel0, 0x1f80_0400));
        assert!(!range.contains(Segment::Kernel1, 0x1f80_0000));
        assert!(!range.contains(Segment::Invalid, 0x1f80_0000));
    }

    #[test]
    fn range_from_raw_address() {
        let range = AddrRange::new(0xfffe_0130, 0xfffe_0134, Segments::KERNEL2);
        assert_eq!(range.start, 0x1ffe_0130);
        assert_eq!(range.end, 0x1ffe_0134);
        assert_eq!(range.len(), 4);
    }

    #[test]
    fn range_overlap() {
        let bios = AddrRange::new(0x1fc0_0000, 0x1fc8_0000, Segments::MAIN);
        let a = AddrRange::new(0x1fc7_fffc, 0x1fc8_0004, Segments::KERNEL1);
        let b = AddrRange::new(0x1fc7_fffc, 0x1fc8_0004, Segments::KERNEL2);
        let c = AddrRange::new(0x1fc8_0000, 0x1fc8_0004, Segments::MAIN);
        assert!(bios.overlaps(&a));
        assert!(!bios.overlaps(&b));
        assert!(!bios.overlaps(&c));
    }
}
