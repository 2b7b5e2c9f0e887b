//! The GPU as seen from the bus and DMA. Commands are decoded and change the GPU state, VRAM
//! transfers go to and from VRAM, but primitives are only counted and never rasterized.

mod fifo;
mod gp0;
mod gp1;
pub mod vram;

use psx_util::{Bit, BitSet};

use crate::addr::{AddrRange, Segment, Segments};
use crate::bus::dma::{ChanDir, DmaChan};
use crate::bus::BusDevice;
use crate::clock::{Clock, ClockHandle};

use fifo::Fifo;

use std::fmt;

pub use vram::Vram;

/// The frequency of the GPU clock.
pub const GPU_HZ: f64 = 53_690_000.0;

/// Video mode mainly determines the output framerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    /// ~60 Hz.
    Ntsc,
    /// ~50 Hz.
    Pal,
}

impl VideoMode {
    /// GPU cycles per scanline.
    pub fn cycles_per_scanline(self) -> u32 {
        match self {
            VideoMode::Ntsc => 3413,
            VideoMode::Pal => 3406,
        }
    }

    pub fn scanline_count(self) -> u32 {
        match self {
            VideoMode::Ntsc => 263,
            VideoMode::Pal => 314,
        }
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            VideoMode::Ntsc => "NTSC(60hz)",
            VideoMode::Pal => "PAL(50hz)",
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DmaDir {
    Off,
    Fifo,
    CpuToGp0,
    VramToCpu,
}

/// Status register of the GPU.
#[derive(Clone, Copy)]
pub struct Status(pub u32);

impl Status {
    const RESET: Self = Self(0x1480_2000);

    pub fn irq(self) -> bool {
        self.0.bit(24)
    }

    pub fn display_disabled(self) -> bool {
        self.0.bit(23)
    }

    pub fn vertical_interlace(self) -> bool {
        self.0.bit(22)
    }

    pub fn video_mode(self) -> VideoMode {
        match self.0.bit(20) {
            false => VideoMode::Ntsc,
            true => VideoMode::Pal,
        }
    }

    pub fn vertical_res(self) -> u32 {
        240 * (self.0.bit(19) as u32 + 1)
    }

    /// Ready to receive commands.
    pub fn cmd_ready(self) -> bool {
        self.0.bit(26)
    }

    /// Ready to send VRAM to the CPU.
    pub fn vram_to_cpu_ready(self) -> bool {
        self.0.bit(27)
    }

    /// Ready to receive a DMA block.
    pub fn dma_block_ready(self) -> bool {
        self.0.bit(28)
    }

    pub fn dma_direction(self) -> DmaDir {
        match self.0.bit_range(29, 30) {
            0 => DmaDir::Off,
            1 => DmaDir::Fifo,
            2 => DmaDir::CpuToGp0,
            _ => DmaDir::VramToCpu,
        }
    }

    /// If both fields of the frame are drawn to VRAM.
    fn interlaced480(self) -> bool {
        self.vertical_interlace() && self.vertical_res() == 480
    }
}

/// An ongoing transfer between the bus and a rectangle of VRAM.
#[derive(Debug, Clone, Copy)]
struct MemTransfer {
    x: u32,
    y: u32,
    x_start: u32,
    x_end: u32,
    y_end: u32,
}

impl MemTransfer {
    fn new(x_start: u32, y_start: u32, width: u32, height: u32) -> Self {
        Self {
            x: x_start,
            y: y_start,
            x_start,
            x_end: x_start + width,
            y_end: y_start + height,
        }
    }

    fn next(&mut self) {
        self.x += 1;
        if self.x == self.x_end {
            self.x = self.x_start;
            self.y += 1;
        }
    }

    fn is_done(&self) -> bool {
        self.y >= self.y_end
    }
}

/// The current state of the GPU.
#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    /// Busy with a command for a number of GPU cycles.
    Drawing { cycles_left: u32 },
    /// Receiving pixels from the CPU.
    VramStore(MemTransfer),
    /// Sending pixels to the CPU through GPUREAD.
    VramLoad(MemTransfer),
    /// Receiving vertices of a polyline until the terminator word.
    PolyLine { shaded: bool, words: u32 },
}

/// Display and scanline timing.
struct Timing {
    scanline: u32,
    /// GPU cycles into the current scanline.
    scanline_prog: u32,
    frame_count: u64,
}

/// Drawing state set through GP0, which is only read back through GP1(10).
#[derive(Default)]
struct DrawEnv {
    tex_window: u32,
    area_top_left: u32,
    area_bottom_right: u32,
    offset: u32,
}

/// Display settings set through GP1.
struct Display {
    vram_start: u32,
    horizontal_range: u32,
    vertical_range: u32,
}

impl Display {
    fn new() -> Self {
        Self {
            vram_start: 0x0,
            horizontal_range: 0xc00 << 12 | 0x200,
            vertical_range: 0x100 << 10 | 0x10,
        }
    }
}

pub struct Gpu {
    clock: ClockHandle,
    state: State,
    fifo: Fifo,
    vram: Vram,
    timing: Timing,
    status: Status,
    /// The GPUREAD register when no VRAM transfer is ongoing.
    gpu_read: u32,
    env: DrawEnv,
    display: Display,
    primitives: u64,
}

impl Gpu {
    pub const RANGE: AddrRange = AddrRange::new(0x1f80_1810, 0x1f80_1818, Segments::MAIN);

    /// GPU cycles a drawing command keeps the GPU busy.
    const DRAW_CYCLES: u32 = 32;

    /// Create a GPU updated through `clock`. The clock should update it at least once every
    /// scanline.
    pub fn new(clock: ClockHandle) -> Self {
        Self {
            clock,
            state: State::Idle,
            fifo: Fifo::new(),
            vram: Vram::new(),
            timing: Timing {
                scanline: 0,
                scanline_prog: 0,
                frame_count: 0,
            },
            status: Status::RESET,
            gpu_read: 0x0,
            env: DrawEnv::default(),
            display: Display::new(),
            primitives: 0,
        }
    }

    pub fn vram(&self) -> &Vram {
        &self.vram
    }

    pub fn frame_count(&self) -> u64 {
        self.timing.frame_count
    }

    pub fn scanline(&self) -> u32 {
        self.timing.scanline
    }

    /// The amount of drawing primitives received since startup.
    pub fn primitive_count(&self) -> u64 {
        self.primitives
    }

    pub fn status(&mut self) -> Status {
        Status(self.status_read())
    }

    fn gpu_read(&mut self) -> u32 {
        if let State::VramLoad(ref mut tran) = self.state {
            let mut val = 0;
            for shift in [0, 16] {
                val |= (self.vram.load_16(tran.x, tran.y) as u32) << shift;
                tran.next();
            }
            self.gpu_read = val;
            if tran.is_done() {
                self.state = State::Idle;
            }
        }
        self.gpu_read
    }

    fn dma_block_ready(&self) -> bool {
        let busy = matches!(self.state, State::Drawing { .. } | State::VramLoad(..));
        !busy && !self.fifo.is_full()
    }

    fn status_read(&mut self) -> u32 {
        let idle = matches!(self.state, State::Idle);
        self.status.0 = self.status.0
            .set_bit(26, idle && self.fifo.is_empty())
            .set_bit(27, matches!(self.state, State::VramLoad(..)))
            .set_bit(28, self.dma_block_ready());
        self.status.0 = self.status.0.set_bit(25, match self.status.dma_direction() {
            DmaDir::Off => false,
            DmaDir::Fifo => !self.fifo.is_full(),
            DmaDir::CpuToGp0 => self.status.dma_block_ready(),
            DmaDir::VramToCpu => self.status.vram_to_cpu_ready(),
        });
        self.status.0
    }

    /// Keep the GPU busy for `cycles` GPU cycles, and get updated when it's done.
    fn begin_drawing(&mut self, clock: &mut Clock, cycles: u32) {
        let cycles_left = match self.state {
            State::Drawing { cycles_left } => cycles_left + cycles,
            _ => cycles,
        };
        self.state = State::Drawing { cycles_left };
        clock.request_update(self.clock, cycles_left);
    }

    fn advance_drawing(&mut self, clock: &mut Clock, cycles: u32) {
        if let State::Drawing { cycles_left } = self.state {
            match cycles_left.checked_sub(cycles) {
                Some(left) if left > 0 => {
                    self.state = State::Drawing { cycles_left: left };
                    clock.request_update(self.clock, left);
                }
                _ => {
                    self.state = State::Idle;
                    self.try_run_cmd(clock);
                }
            }
        }
    }

    fn advance_timing(&mut self, cycles: u32) {
        let mode = self.status.video_mode();
        let per_line = mode.cycles_per_scanline();

        self.timing.scanline_prog += cycles;
        while self.timing.scanline_prog >= per_line {
            self.timing.scanline_prog -= per_line;
            self.timing.scanline += 1;

            if self.timing.scanline >= mode.scanline_count() {
                self.timing.scanline = 0;
                self.timing.frame_count += 1;
                if self.status.vertical_interlace() {
                    self.status.0 ^= 1 << 13;
                }
            }

            let odd = if self.status.interlaced480() {
                self.status.0.bit(13)
            } else {
                self.timing.scanline.bit(0)
            };
            self.status.0 = self.status.0.set_bit(31, odd);
        }
    }
}

impl BusDevice for Gpu {
    fn read32(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u32 {
        match offset {
            0 => self.gpu_read(),
            _ => self.status_read(),
        }
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u16 {
        panic!("16-bit read from GPU at offset {offset:x}")
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u8 {
        panic!("8-bit read from GPU at offset {offset:x}")
    }

    fn write32(&mut self, clock: &mut Clock, _: Segment, offset: u32, val: u32) {
        match offset {
            0 => self.gp0_store(clock, val),
            _ => self.gp1_store(val),
        }
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, offset: u32, _: u16) {
        panic!("16-bit write to GPU at offset {offset:x}")
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, offset: u32, _: u8) {
        panic!("8-bit write to GPU at offset {offset:x}")
    }

    fn update(&mut self, clock: &mut Clock, cycles: u32) {
        self.advance_drawing(clock, cycles);
        self.advance_timing(cycles);
    }

    fn as_dma_chan(&mut self) -> Option<&mut dyn DmaChan> {
        Some(self)
    }
}

impl DmaChan for Gpu {
    fn dma_load(&mut self, _: &mut Clock, _: u32, _: u32) -> u32 {
        self.gpu_read()
    }

    fn dma_store(&mut self, clock: &mut Clock, _: u32, val: u32) {
        self.gp0_store(clock, val);
    }

    fn dma_ready(&self, dir: ChanDir) -> bool {
        match dir {
            ChanDir::ToPort => self.dma_block_ready(),
            ChanDir::ToRam => matches!(self.state, State::VramLoad(..)),
        }
    }
}
