use thiserror::Error;

use super::raw::RawMem;
use super::{BusDevice, Byte, HalfWord, Word};
use crate::addr::{AddrRange, Segment, Segments};
use crate::clock::Clock;

use std::{fmt, fs, io};
use std::path::Path;

#[derive(Error, Debug)]
pub enum BiosError {
    #[error("failed to load BIOS: {0}")]
    IoError(#[from] io::Error),

    #[error("invalid BIOS file: must be 512 kb, is {0} bytes")]
    InvalidSize(usize),
}

/// The 512 KB BIOS ROM.
pub struct Bios {
    mem: RawMem,
    name: String,
}

impl Bios {
    pub const SIZE: usize = 1024 * 512;

    pub const RANGE: AddrRange = AddrRange::new(0x1fc0_0000, 0x1fc8_0000, Segments::MAIN);

    /// Extra cycles each access takes. The ROM is slow.
    const ACCESS_CYCLES: u32 = 6;

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn from_file(path: &Path) -> Result<Self, BiosError> {
        let data = fs::read(path)?;
        let name = path
            .file_name()
            .unwrap_or(path.as_os_str())
            .to_string_lossy()
            .to_string();
        Self::new(data.into_boxed_slice(), name)
    }

    pub fn new(data: Box<[u8]>, name: String) -> Result<Self, BiosError> {
        if data.len() != Self::SIZE {
            return Err(BiosError::InvalidSize(data.len()));
        }
        Ok(Self { mem: RawMem::from_bytes(data), name })
    }

    /// A BIOS with `code` placed at `offset`, and zeroes everywhere else.
    #[cfg(test)]
    pub fn from_code(offset: usize, code: &[u8]) -> Self {
        let mut data = vec![0x0; Self::SIZE];
        data[offset..offset + code.len()].copy_from_slice(code);
        Self {
            mem: RawMem::from_bytes(data.into_boxed_slice()),
            name: "test".to_string(),
        }
    }

    fn offset(&self, offset: u32) -> u32 {
        offset % self.mem.len() as u32
    }
}

impl fmt::Debug for Bios {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bios")
            .field("name", &self.name)
            .field("size", &self.mem.len())
            .finish()
    }
}

impl BusDevice for Bios {
    fn read32(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u32 {
        self.mem.load::<Word>(self.offset(offset))
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u16 {
        self.mem.load::<HalfWord>(self.offset(offset)) as u16
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u8 {
        self.mem.load::<Byte>(self.offset(offset)) as u8
    }

    fn write32(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u32) {
        warn!("write of {val:08x} to BIOS at offset {offset:x}");
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u16) {
        warn!("write of {val:04x} to BIOS at offset {offset:x}");
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u8) {
        warn!("write of {val:02x} to BIOS at offset {offset:x}");
    }

    fn cpu_cycles(&self) -> u32 {
        Self::ACCESS_CYCLES
    }

    fn peek32(&self, offset: u32) -> Option<u32> {
        Some(self.mem.load::<Word>(self.offset(offset)))
    }
}
