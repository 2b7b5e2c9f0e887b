//! Emulating the Direct Memory Access chip. Used to transfer data between RAM and devices
//! without going through the CPU.
//!
//! A channel is started by writing its control register. The transfer itself runs when the host
//! loop calls [`Bus::run_dma`], which moves as many words as the port is ready for, ticking the
//! clock for the time each block takes. Only one transfer is active at a time; a channel started
//! while another is running waits until the active one is finished.

use psx_util::{Bit, BitSet};

use crate::addr::{AddrRange, Segment, Segments};
use crate::bus::{Bus, BusDevice, DeviceId, Word};
use crate::clock::Clock;

use std::ops::{Index, IndexMut};

/// Writable bits of a channel control register.
const CHAN_CTRL_MASK: u32 = 0x7177_0703;

/// Writable bits of the OTC channel control register. Step backward is always set.
const OTC_CTRL_MASK: u32 = 0x5100_0000;

const BASE_MASK: u32 = 0x00ff_ffff;

/// The word aligned range of RAM a transfer can reach.
const RAM_MASK: u32 = 0x001f_fffc;

/// Marks the end of a linked list.
const LIST_END: u32 = 0x00ff_ffff;

/// The amount of cycles to wait each time a linked list port isn't ready.
const LIST_WAIT_CYCLES: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    MdecIn = 0,
    MdecOut = 1,
    Gpu = 2,
    CdRom = 3,
    Spu = 4,
    Pio = 5,
    /// Depth ordering table. It's only used to initialize/reset it.
    Otc = 6,
}

impl Port {
    pub const ALL: [Port; 7] = [
        Port::MdecIn,
        Port::MdecOut,
        Port::Gpu,
        Port::CdRom,
        Port::Spu,
        Port::Pio,
        Port::Otc,
    ];
}

/// Register holding the size information for manual and request transfers.
#[derive(Debug, Clone, Copy)]
struct BlockCtrl {
    size: u16,
    count: u16,
}

impl BlockCtrl {
    fn new(val: u32) -> Self {
        Self {
            size: val.bit_range(0, 15) as u16,
            count: val.bit_range(16, 31) as u16,
        }
    }

    fn load(self) -> u32 {
        self.size as u32 | (self.count as u32) << 16
    }

    /// The amount of words in each block. A size of zero means the maximum.
    fn words(self) -> u32 {
        match self.size {
            0 => 0x1_0000,
            size => size as u32,
        }
    }
}

/// DMA can transfer either from or to RAM.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChanDir {
    ToRam,
    ToPort,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SyncMode {
    /// Start immediately and transfer all at once. Used to send textures to the VRAM and
    /// initializing the ordering table.
    Manual = 0,
    /// Transfer blocks when signaled by the device.
    Request = 1,
    /// A linked list of (generally) smaller blocks. It's only used to send commands to GP0.
    LinkedList = 2,
}

/// Which way to step from the base address. Either increment or decrement one word.
#[derive(Copy, Clone)]
pub enum Step {
    Inc,
    Dec,
}

impl Step {
    /// The amount to add to the address each word, wrapping around when decrementing.
    fn step_amount(self) -> u32 {
        match self {
            Step::Inc => 4,
            Step::Dec => (-4_i32) as u32,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChanCtrl(u32);

impl ChanCtrl {
    fn direction(self) -> ChanDir {
        match self.0.bit(0) {
            false => ChanDir::ToRam,
            true => ChanDir::ToPort,
        }
    }

    fn step(self) -> Step {
        match self.0.bit(1) {
            false => Step::Inc,
            true => Step::Dec,
        }
    }

    /// Chopping lets the CPU run at intervals while transferring. Not emulated.
    fn chopping_enabled(self) -> bool {
        self.0.bit(8)
    }

    /// The sync mode, or `None` for the reserved mode 3.
    fn sync_mode(self) -> Option<SyncMode> {
        match self.0.bit_range(9, 10) {
            0 => Some(SyncMode::Manual),
            1 => Some(SyncMode::Request),
            2 => Some(SyncMode::LinkedList),
            _ => None,
        }
    }

    /// Set while the channel is started or busy.
    fn busy(self) -> bool {
        self.0.bit(24)
    }

    /// Manual transfers only start if this is set.
    fn trigger(self) -> bool {
        self.0.bit(28)
    }

    fn clear_trigger(&mut self) {
        self.0 = self.0.set_bit(28, false);
    }

    fn mark_as_finished(&mut self) {
        self.0 = self.0
            .set_bit(24, false)
            .set_bit(28, false);
    }

    fn store(&mut self, port: Port, val: u32) {
        self.0 = if port == Port::Otc {
            (val & OTC_CTRL_MASK) | 2
        } else {
            val & CHAN_CTRL_MASK
        };
        if self.chopping_enabled() {
            warn!("chopping enabled for port {port:?}");
        }
    }
}

/// The registers of a DMA channel.
#[derive(Debug, Clone, Copy)]
pub struct ChanStat {
    port: Port,
    base: u32,
    block_ctrl: BlockCtrl,
    ctrl: ChanCtrl,
}

impl ChanStat {
    fn new(port: Port) -> Self {
        Self {
            port,
            base: 0x0,
            block_ctrl: BlockCtrl::new(0x0),
            ctrl: ChanCtrl(0x0),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn busy(&self) -> bool {
        self.ctrl.busy()
    }

    /// If the registers say the channel should start.
    fn wants_start(&self) -> bool {
        self.ctrl.busy() && (self.ctrl.trigger() || self.ctrl.sync_mode() != Some(SyncMode::Manual))
    }

    fn load(&self, offset: u32) -> u32 {
        match offset {
            0 => self.base,
            4 => self.block_ctrl.load(),
            8 => self.ctrl.0,
            _ => {
                warn!("read from unused register of DMA port {:?}", self.port);
                0x0
            }
        }
    }

    fn store(&mut self, offset: u32, val: u32) {
        match offset {
            0 => self.base = val & BASE_MASK,
            4 => self.block_ctrl = BlockCtrl::new(val),
            8 => self.ctrl.store(self.port, val),
            _ => warn!("write to unused register of DMA port {:?}", self.port),
        }
    }
}

/// The control register holds the priority and enable bit of each channel. Priorities aren't
/// emulated, since transfers run one at a time in the order they are started.
#[derive(Copy, Clone)]
struct CtrlReg(u32);

/// DMA Interrupt register.
#[derive(Copy, Clone)]
pub struct IrqReg(u32);

impl IrqReg {
    /// If this is set, an interrupt will always be triggered when a channel is done or this
    /// register is written to.
    fn force_irq(self) -> bool {
        self.0.bit(15)
    }

    fn channel_irq_enabled(self, port: Port) -> bool {
        self.0.bit(port as usize + 16)
    }

    /// Master flag to enable or disable interrupts. [`IrqReg::force_irq`] has higher precedence.
    fn master_irq_enabled(self) -> bool {
        self.0.bit(23)
    }

    pub fn channel_irq_flag(self, port: Port) -> bool {
        self.0.bit(port as usize + 24)
    }

    fn set_channel_irq_flag(&mut self, port: Port) {
        self.0 = self.0.set_bit(24 + port as usize, true);
    }

    /// Read only. Updated whenever the register changes.
    pub fn master_irq_flag(self) -> bool {
        self.0.bit(31)
    }

    fn update_master_irq_flag(&mut self) {
        let raised = self.force_irq()
            || self.master_irq_enabled()
            && self.0.bit_range(24, 30) != 0;

        if raised && !self.master_irq_flag() {
            debug!("DMA interrupt raised");
        }
        self.0 = self.0.set_bit(31, raised);
    }

    fn store(&mut self, val: u32) {
        let mask = 0x00ff_803f;
        self.0 &= !mask;
        self.0 |= val & mask;
        // Flags are acknowledged by writing 1.
        self.0 &= !(val & 0x7f00_0000);
        self.update_master_irq_flag();
    }
}

/// What a DMA port is connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PortTarget {
    Device(DeviceId),
    OrderingTable,
}

#[derive(Debug, Clone, Copy)]
struct PortInfo {
    target: PortTarget,
    clocks_per_word: u32,
}

#[derive(Debug, Clone, Copy)]
enum TransferKind {
    /// Manual and request transfers. Manual transfers are a single block which doesn't wait for
    /// the port to be ready.
    Blocks {
        words: u32,
        blocks_left: u32,
        wait_for_ready: bool,
    },
    LinkedList,
}

/// The state of the active transfer.
#[derive(Debug, Clone, Copy)]
struct Transfer {
    port: Port,
    /// The RAM address of the next word, or the next list node for linked list transfers.
    cursor: u32,
    kind: TransferKind,
}

/// The DMA chip. Mapped at `0x1f801080`, with four registers for each channel followed by the
/// shared control and interrupt registers.
pub struct Dma {
    ctrl: CtrlReg,
    pub irq: IrqReg,
    channels: [ChanStat; 7],
    ports: [Option<PortInfo>; 7],
    active: Option<Transfer>,
    otc: OrderingTable,
}

impl Dma {
    pub const RANGE: AddrRange = AddrRange::new(0x1f80_1080, 0x1f80_1100, Segments::MAIN);

    pub fn new() -> Self {
        let mut ports = [None; 7];
        ports[Port::Otc as usize] = Some(PortInfo {
            target: PortTarget::OrderingTable,
            clocks_per_word: 1,
        });
        Self {
            ctrl: CtrlReg(0x0765_4321),
            irq: IrqReg(0),
            channels: Port::ALL.map(ChanStat::new),
            ports,
            active: None,
            otc: OrderingTable,
        }
    }

    pub(crate) fn set_port(&mut self, port: Port, target: PortTarget, clocks_per_word: u32) {
        self.ports[port as usize] = Some(PortInfo { target, clocks_per_word });
    }

    /// The port of the active transfer.
    pub fn active_port(&self) -> Option<Port> {
        self.active.map(|tran| tran.port)
    }

    pub fn load(&self, offset: u32) -> u32 {
        let chan = offset.bit_range(4, 6);
        let reg = offset.bit_range(0, 3);

        match chan {
            0..=6 => self.channels[chan as usize].load(reg),
            _ => match reg {
                0 => self.ctrl.0,
                4 => self.irq.0,
                8 => 0x7ffa_c68b,
                _ => 0x00ff_fff7,
            },
        }
    }

    pub fn store(&mut self, offset: u32, val: u32) {
        let chan = offset.bit_range(4, 6);
        let reg = offset.bit_range(0, 3);

        match chan {
            0..=6 => {
                self.channels[chan as usize].store(reg, val);
                if reg == 8 {
                    self.try_start(Port::ALL[chan as usize]);
                }
            }
            _ => match reg {
                0 => self.ctrl.0 = val,
                4 => self.irq.store(val),
                _ => trace!("write to read only DMA register at offset {offset:x}"),
            },
        }
    }

    fn try_start(&mut self, port: Port) {
        let ctrl = self[port].ctrl;
        if !ctrl.busy() {
            return;
        }
        if ctrl.sync_mode().is_none() {
            panic!("DMA port {port:?} started with invalid sync mode 3");
        }
        if !self[port].wants_start() {
            return;
        }
        if let Some(active) = self.active {
            if active.port != port {
                debug!("DMA port {port:?} waits for port {:?}", active.port);
            }
            return;
        }
        self.start(port);
    }

    fn start(&mut self, port: Port) {
        let stat = &mut self[port];
        stat.ctrl.clear_trigger();

        let (cursor, kind) = match stat.ctrl.sync_mode() {
            Some(SyncMode::Manual) => (stat.base & RAM_MASK, TransferKind::Blocks {
                words: stat.block_ctrl.words(),
                blocks_left: 1,
                wait_for_ready: false,
            }),
            Some(SyncMode::Request) => (stat.base & RAM_MASK, TransferKind::Blocks {
                words: stat.block_ctrl.words(),
                blocks_left: stat.block_ctrl.count as u32,
                wait_for_ready: true,
            }),
            Some(SyncMode::LinkedList) => (stat.base & BASE_MASK, TransferKind::LinkedList),
            None => unreachable!("checked before starting"),
        };

        debug!("DMA port {port:?} started: {kind:?} from {cursor:08x}");
        self.active = Some(Transfer { port, cursor, kind });
    }

    /// Mark the active channel as done and start the next one waiting, if any.
    fn finish(&mut self, port: Port) {
        debug!("DMA port {port:?} finished");

        self.active = None;
        self[port].ctrl.mark_as_finished();

        if self.irq.channel_irq_enabled(port) {
            self.irq.set_channel_irq_flag(port);
        }
        self.irq.update_master_irq_flag();

        if let Some(next) = Port::ALL.into_iter().find(|port| self[*port].wants_start()) {
            self.start(next);
        }
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<Port> for Dma {
    type Output = ChanStat;

    fn index(&self, port: Port) -> &Self::Output {
        &self.channels[port as usize]
    }
}

impl IndexMut<Port> for Dma {
    fn index_mut(&mut self, port: Port) -> &mut Self::Output {
        &mut self.channels[port as usize]
    }
}

impl BusDevice for Dma {
    fn read32(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u32 {
        self.load(offset)
    }

    fn read16(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u16 {
        panic!("16-bit read from DMA register at offset {offset:x}")
    }

    fn read8(&mut self, _: &mut Clock, _: Segment, offset: u32) -> u8 {
        panic!("8-bit read from DMA register at offset {offset:x}")
    }

    fn write32(&mut self, _: &mut Clock, _: Segment, offset: u32, val: u32) {
        self.store(offset, val)
    }

    fn write16(&mut self, _: &mut Clock, _: Segment, offset: u32, _: u16) {
        panic!("16-bit write to DMA register at offset {offset:x}")
    }

    fn write8(&mut self, _: &mut Clock, _: Segment, offset: u32, _: u8) {
        panic!("8-bit write to DMA register at offset {offset:x}")
    }
}

/// A device connected to a DMA port.
pub trait DmaChan {
    /// Read a word for a transfer to RAM. `words_left` includes the word being read.
    fn dma_load(&mut self, clock: &mut Clock, words_left: u32, addr: u32) -> u32;

    fn dma_store(&mut self, clock: &mut Clock, addr: u32, val: u32);

    fn dma_ready(&self, dir: ChanDir) -> bool;
}

/// The ordering table, used to order draw calls since the GPU has no depth buffer. Each entry is
/// a 24-bit pointer to the next entry, with the draw calls for a given depth linked in between.
///
/// The DMA port only writes an empty table to RAM, where each entry points to the one before it
/// and the first entry holds the end marker. It's transferred backwards, so the last word written
/// is the end marker.
struct OrderingTable;

impl DmaChan for OrderingTable {
    fn dma_load(&mut self, _: &mut Clock, words_left: u32, addr: u32) -> u32 {
        if words_left == 1 {
            LIST_END
        } else {
            addr.wrapping_sub(4) & RAM_MASK
        }
    }

    fn dma_store(&mut self, _: &mut Clock, addr: u32, _: u32) {
        panic!("DMA write to the ordering table port at {addr:08x}")
    }

    fn dma_ready(&self, _: ChanDir) -> bool {
        true
    }
}

impl Bus {
    /// Split out the device connected to a DMA port and the clock.
    fn dma_chan(&mut self, target: PortTarget) -> (&mut dyn DmaChan, &mut Clock) {
        let Bus { clock, devices, dma, .. } = self;
        let chan: &mut dyn DmaChan = match target {
            PortTarget::OrderingTable => &mut dma.otc,
            PortTarget::Device(id) => match devices[id.0].as_dma_chan() {
                Some(chan) => chan,
                None => panic!("device {id:?} isn't a DMA channel"),
            },
        };
        (chan, clock)
    }

    fn dma_ready(&mut self, target: PortTarget, dir: ChanDir) -> bool {
        let (chan, _) = self.dma_chan(target);
        chan.dma_ready(dir)
    }

    /// Move a single word between RAM and the port.
    fn dma_word(&mut self, target: PortTarget, dir: ChanDir, words_left: u32, addr: u32) {
        let addr = addr & RAM_MASK;
        match dir {
            ChanDir::ToRam => {
                let (chan, clock) = self.dma_chan(target);
                let val = chan.dma_load(clock, words_left, addr);
                self.ram.store::<Word>(addr, val);
            }
            ChanDir::ToPort => {
                let val = self.ram.load::<Word>(addr);
                let (chan, clock) = self.dma_chan(target);
                chan.dma_store(clock, addr, val);
            }
        }
    }

    /// Run the active transfer as far as the port allows. Returns the amount of CPU cycles it
    /// took, which have already been ticked.
    pub fn run_dma(&mut self) -> u32 {
        let Some(mut tran) = self.dma.active else {
            return 0;
        };
        let Some(info) = self.dma.ports[tran.port as usize] else {
            warn!("DMA port {:?} started without a device connected", tran.port);
            self.dma.finish(tran.port);
            return 0;
        };

        let ctrl = self.dma[tran.port].ctrl;
        let dir = ctrl.direction();
        let step = ctrl.step().step_amount();
        let mut cycles = 0;

        let done = match tran.kind {
            TransferKind::Blocks { words, ref mut blocks_left, wait_for_ready } => loop {
                if *blocks_left == 0 {
                    break true;
                }
                if wait_for_ready && !self.dma_ready(info.target, dir) {
                    break false;
                }
                for words_left in (1..=words).rev() {
                    self.dma_word(info.target, dir, words_left, tran.cursor);
                    tran.cursor = tran.cursor.wrapping_add(step) & RAM_MASK;
                }
                *blocks_left -= 1;

                let block_cycles = info.clocks_per_word.saturating_mul(words);
                self.tick(block_cycles);
                cycles += block_cycles;
            },
            TransferKind::LinkedList => loop {
                if tran.cursor == LIST_END {
                    break true;
                }
                if !self.dma_ready(info.target, dir) {
                    break false;
                }
                let header = self.ram.load::<Word>(tran.cursor & RAM_MASK);
                let count = header.bit_range(24, 31);

                let mut addr = tran.cursor;
                for words_left in (1..=count).rev() {
                    while !self.dma_ready(info.target, dir) {
                        self.tick(LIST_WAIT_CYCLES);
                        cycles += LIST_WAIT_CYCLES;
                    }
                    addr = addr.wrapping_add(4) & RAM_MASK;
                    self.dma_word(info.target, dir, words_left, addr);
                }

                let node_cycles = info.clocks_per_word.saturating_mul(count);
                self.tick(node_cycles);
                cycles += node_cycles;

                tran.cursor = header & BASE_MASK;
            },
        };

        if done {
            // Manual transfers leave the base address alone.
            if !matches!(tran.kind, TransferKind::Blocks { wait_for_ready: false, .. }) {
                self.dma[tran.port].base = tran.cursor;
            }
            self.dma.finish(tran.port);
        } else {
            self.dma.active = Some(tran);
        }

        cycles
    }
}
