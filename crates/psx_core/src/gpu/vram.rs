/// VRAM consists of 512 lines of 2048 bytes each, which equals 1 megabyte.
pub struct Vram {
    data: Box<[u16]>,
}

impl Vram {
    pub const WIDTH: u32 = 1024;
    pub const HEIGHT: u32 = 512;

    pub const SIZE: usize = (Self::WIDTH * Self::HEIGHT) as usize;

    pub fn new() -> Self {
        Self { data: vec![0x0; Self::SIZE].into_boxed_slice() }
    }

    pub fn load_16(&self, x: u32, y: u32) -> u16 {
        self.data[offset_16(x, y)]
    }

    pub fn store_16(&mut self, x: u32, y: u32, val: u16) {
        self.data[offset_16(x, y)] = val;
    }

    /// The raw 15-bit pixels as little-endian bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

impl Default for Vram {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinates wrap around at the edges.
fn offset_16(x: u32, y: u32) -> usize {
    ((x & (Vram::WIDTH - 1)) + (y & (Vram::HEIGHT - 1)) * Vram::WIDTH) as usize
}
