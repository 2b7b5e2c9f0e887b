use psx_util::{Bit, BitSet};

use super::{Display, DrawEnv, Gpu, State, Status};

impl Gpu {
    pub(super) fn gp1_store(&mut self, val: u32) {
        let cmd = val.bit_range(24, 29);
        trace!("GP1({cmd:02x})");
        match cmd {
            0x00 => self.gp1_reset(),
            0x01 => self.gp1_reset_fifo(),
            0x02 => self.gp1_ack_gpu_irq(),
            0x03 => self.gp1_display_enable(val),
            0x04 => self.gp1_dma_direction(val),
            0x05 => self.display.vram_start = val.bit_range(0, 18),
            0x06 => self.display.horizontal_range = val.bit_range(0, 23),
            0x07 => self.display.vertical_range = val.bit_range(0, 19),
            0x08 => self.gp1_display_mode(val),
            0x10..=0x1f => self.gp1_gpu_info(val),
            _ => warn!("unimplemented GP1 command {cmd:02x}"),
        }
    }

    // GP1(0) - Resets the state of the GPU.
    fn gp1_reset(&mut self) {
        self.fifo.clear();
        self.state = State::Idle;
        self.status = Status::RESET;
        self.env = DrawEnv::default();
        self.display = Display::new();
    }

    // GP1(1) - Reset command buffer.
    fn gp1_reset_fifo(&mut self) {
        self.fifo.clear();
        if matches!(self.state, State::VramStore(..) | State::PolyLine { .. }) {
            self.state = State::Idle;
        }
    }

    // GP1(2) - Acknowledge GPU Interrupt.
    fn gp1_ack_gpu_irq(&mut self) {
        self.status.0 = self.status.0.set_bit(24, false);
    }

    // GP1(3) - Display Enable.
    // - 0 - Display On/Off.
    fn gp1_display_enable(&mut self, val: u32) {
        self.status.0 = self.status.0.set_bit(23, val.bit(0));
    }

    // GP1(4) - Set DMA Direction.
    // - 0..1 - DMA direction.
    fn gp1_dma_direction(&mut self, val: u32) {
        self.status.0 = self.status.0.set_bit_range(29, 30, val.bit_range(0, 1));
    }

    // GP1(8) - Set display mode.
    // - 0..1 - Horizontal resolution 1.
    // - 2 - Vertical resolution.
    // - 3 - Display mode.
    // - 4 - Display area color depth.
    // - 5 - Vertical interlace.
    // - 6 - Horizontal resolution 2.
    // - 7 - Reverseflag.
    fn gp1_display_mode(&mut self, val: u32) {
        self.status.0 = self.status.0
            .set_bit_range(17, 22, val.bit_range(0, 5))
            .set_bit(16, val.bit(6))
            .set_bit(14, val.bit(7));
    }

    // GP1(10) - Get GPU info into GPUREAD.
    fn gp1_gpu_info(&mut self, val: u32) {
        self.gpu_read = match val.bit_range(0, 2) {
            2 => self.env.tex_window,
            3 => self.env.area_top_left,
            4 => self.env.area_bottom_right,
            5 => self.env.offset,
            // GPU version.
            7 => 2,
            _ => self.gpu_read,
        };
    }
}
