use psx_util::{Bit, BitSet};

use crate::clock::Clock;

use super::{Gpu, MemTransfer, State};

/// Convert a 24-bit command color to a 15-bit VRAM pixel.
fn color_to_pixel(color: u32) -> u16 {
    let r = color.bit_range(3, 7);
    let g = color.bit_range(11, 15);
    let b = color.bit_range(19, 23);
    (r | g << 5 | b << 10) as u16
}

/// Position and size of a VRAM transfer, wrapped to the VRAM bounds.
fn transfer_rect(pos: u32, dim: u32) -> (u32, u32, u32, u32) {
    let x = pos.bit_range(0, 15) & 0x3ff;
    let y = pos.bit_range(16, 31) & 0x1ff;
    let w = (dim.bit_range(0, 15).wrapping_sub(1) & 0x3ff) + 1;
    let h = (dim.bit_range(16, 31).wrapping_sub(1) & 0x1ff) + 1;
    (x, y, w, h)
}

impl Gpu {
    pub(super) fn gp0_store(&mut self, clock: &mut Clock, val: u32) {
        self.fifo.try_push(val);
        self.try_run_cmd(clock);
    }

    /// Run commands and stream data from the FIFO as far as the current state allows.
    pub(super) fn try_run_cmd(&mut self, clock: &mut Clock) {
        loop {
            match self.state {
                State::Idle if self.fifo.has_full_cmd() => self.gp0_exec(clock),
                State::VramStore(ref mut tran) if !self.fifo.is_empty() => {
                    let val = self.fifo.pop();
                    for (lo, hi) in [(0, 15), (16, 31)] {
                        self.vram.store_16(tran.x, tran.y, val.bit_range(lo, hi) as u16);
                        tran.next();
                        if tran.is_done() {
                            break;
                        }
                    }
                    if tran.is_done() {
                        self.state = State::Idle;
                    }
                }
                State::PolyLine { shaded, ref mut words } if !self.fifo.is_empty() => {
                    let val = self.fifo.pop();
                    if val & 0xf000_f000 == 0x5000_5000 {
                        self.state = State::Idle;
                        self.begin_drawing(clock, Self::DRAW_CYCLES);
                    } else {
                        *words += 1;
                        // Every vertex of a shaded line is preceded by a color.
                        if !shaded || *words % 2 == 0 {
                            self.primitives += 1;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn gp0_exec(&mut self, clock: &mut Clock) {
        let Some(cmd) = self.fifo.next_cmd() else {
            return;
        };
        trace!("GP0({cmd:02x})");
        match cmd {
            0x01 => self.gp0_clear_texture_cache(),
            0x02 => {
                self.gp0_fill_rect();
                self.begin_drawing(clock, Self::DRAW_CYCLES);
            }
            0x1f => self.gp0_irq(),
            0x20..=0x7f => {
                self.gp0_primitive(cmd);
                if !matches!(self.state, State::PolyLine { .. }) {
                    self.begin_drawing(clock, Self::DRAW_CYCLES);
                }
            }
            0x80..=0x9f => {
                self.gp0_copy_rect_vram_to_vram();
                self.begin_drawing(clock, Self::DRAW_CYCLES);
            }
            0xa0..=0xbf => self.gp0_copy_rect_cpu_to_vram(),
            0xc0..=0xdf => self.gp0_copy_rect_vram_to_cpu(),
            0xe1 => self.gp0_draw_mode(),
            0xe2 => self.env.tex_window = self.fifo.pop().bit_range(0, 19),
            0xe3 => self.env.area_top_left = self.fifo.pop().bit_range(0, 19),
            0xe4 => self.env.area_bottom_right = self.fifo.pop().bit_range(0, 19),
            0xe5 => self.env.offset = self.fifo.pop().bit_range(0, 21),
            0xe6 => self.gp0_mask_bit_setting(),
            _ => self.gp0_nop(),
        }
    }

    /// Represent multiple commands which do nothing.
    fn gp0_nop(&mut self) {
        self.fifo.pop();
    }

    // GP0(01) - Clear texture cache.
    fn gp0_clear_texture_cache(&mut self) {
        self.fifo.pop();
    }

    // GP0(02) - Fill rectangle in VRAM.
    fn gp0_fill_rect(&mut self) {
        let pixel = color_to_pixel(self.fifo.pop());
        let (pos, dim) = (self.fifo.pop(), self.fifo.pop());

        let x = pos.bit_range(0, 15) & 0x3f0;
        let y = pos.bit_range(16, 31) & 0x1ff;
        let w = (dim.bit_range(0, 15) & 0x3ff).wrapping_add(0xf) & !0xf;
        let h = dim.bit_range(16, 31) & 0x1ff;

        for y in y..y + h {
            for x in x..x + w {
                self.vram.store_16(x, y, pixel);
            }
        }
    }

    // GP0(1f) - Interrupt request.
    fn gp0_irq(&mut self) {
        self.fifo.pop();
        self.status.0 = self.status.0.set_bit(24, true);
    }

    /// Polygons, lines and rectangles. They are only counted.
    fn gp0_primitive(&mut self, cmd: u32) {
        let len = self.fifo.next_cmd_len().unwrap_or(1);
        for _ in 0..len {
            self.fifo.pop();
        }
        self.primitives += 1;

        let is_polyline = (0x48..=0x4f).contains(&cmd) || (0x58..=0x5f).contains(&cmd);
        if is_polyline {
            self.state = State::PolyLine { shaded: cmd.bit(4), words: 0 };
        }
    }

    // GP0(80) - Copy rectangle within VRAM.
    fn gp0_copy_rect_vram_to_vram(&mut self) {
        self.fifo.pop();
        let (src, dst, dim) = (self.fifo.pop(), self.fifo.pop(), self.fifo.pop());
        let (sx, sy, w, h) = transfer_rect(src, dim);
        let (dx, dy, _, _) = transfer_rect(dst, dim);
        for y in 0..h {
            for x in 0..w {
                let val = self.vram.load_16(sx + x, sy + y);
                self.vram.store_16(dx + x, dy + y, val);
            }
        }
    }

    // GP0(a0) - Copy rectangle from CPU to VRAM.
    fn gp0_copy_rect_cpu_to_vram(&mut self) {
        self.fifo.pop();
        let (pos, dim) = (self.fifo.pop(), self.fifo.pop());
        let (x, y, w, h) = transfer_rect(pos, dim);
        self.state = State::VramStore(MemTransfer::new(x, y, w, h));
    }

    // GP0(c0) - Copy rectangle from VRAM to CPU.
    fn gp0_copy_rect_vram_to_cpu(&mut self) {
        self.fifo.pop();
        let (pos, dim) = (self.fifo.pop(), self.fifo.pop());
        let (x, y, w, h) = transfer_rect(pos, dim);
        self.state = State::VramLoad(MemTransfer::new(x, y, w, h));
    }

    // GP0(e1) - Draw Mode Setting.
    // - 0..10 - Same as status register.
    // - 11 - Texture disabled.
    fn gp0_draw_mode(&mut self) {
        let val = self.fifo.pop();
        self.status.0 = self.status.0
            .set_bit_range(0, 10, val.bit_range(0, 10))
            .set_bit(15, val.bit(11));
    }

    // GP0(e6) - Mask bit setting.
    // - 0 - Set mask while drawing.
    // - 1 - Check mask before drawing.
    fn gp0_mask_bit_setting(&mut self) {
        let val = self.fifo.pop().bit_range(0, 1);
        self.status.0 = self.status.0.set_bit_range(11, 12, val);
    }
}

