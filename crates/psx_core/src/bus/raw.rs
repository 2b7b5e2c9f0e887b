use super::AddrUnit;

/// Plain little-endian memory. Offsets must be in bounds.
pub struct RawMem {
    data: Box<[u8]>,
}

impl RawMem {
    pub fn filled(size: usize, byte: u8) -> Self {
        Self { data: vec![byte; size].into_boxed_slice() }
    }

    pub fn from_bytes(data: Box<[u8]>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn load<T: AddrUnit>(&self, offset: u32) -> u32 {
        let offset = offset as usize;
        (0..T::WIDTH).fold(0, |val, byte| {
            val | (self.data[offset + byte] as u32) << (8 * byte)
        })
    }

    #[inline]
    pub fn store<T: AddrUnit>(&mut self, offset: u32, val: u32) {
        let offset = offset as usize;
        for byte in 0..T::WIDTH {
            self.data[offset + byte] = (val >> (8 * byte)) as u8;
        }
    }
}
