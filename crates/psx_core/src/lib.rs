#[macro_use]
extern crate log;

#[cfg(test)]
mod test;

pub mod addr;
pub mod bus;
pub mod clock;
pub mod cpu;
pub mod gpu;
pub mod time;

pub use bus::bios::{Bios, BiosError};
pub use bus::BusError;
pub use cpu::Cpu;
pub use gpu::Vram;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bus::dma::{Dma, Port};
use bus::ram::Ram;
use bus::scratchpad::ScratchPad;
use bus::stub::{MemCtrl, Stub, STUBS};
use bus::{Bus, CacheCtrl, DeviceId, Target};
use clock::{Clock, ClockDevice};
use gpu::{Gpu, VideoMode, GPU_HZ};

#[derive(Error, Debug)]
pub enum SystemError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Bios(#[from] BiosError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// CPU cycles run by each call to [`System::run`].
    pub cycles_per_run: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        // About one NTSC frame.
        Self { cycles_per_run: 571_240 }
    }
}

/// The whole system lives in [`Cpu`], which owns the bus and every device on it. This is what
/// the frontend controls it through.
pub struct System {
    pub cpu: Cpu,
    gpu: DeviceId,
    config: SystemConfig,
}

impl System {
    pub fn new(bios: Bios) -> Result<Self, SystemError> {
        Self::with_config(bios, SystemConfig::default())
    }

    pub fn with_config(bios: Bios, config: SystemConfig) -> Result<Self, SystemError> {
        let mut bus = Bus::new(Clock::new());

        bus.map(Target::Ram, Ram::RANGE)?;
        bus.register_device(Box::new(ScratchPad::new()), ScratchPad::RANGE)?;
        bus.register_device(Box::new(MemCtrl::new()), MemCtrl::RANGE)?;

        for &(name, range, value) in STUBS {
            debug!("mapping stub {name} at {range}");
            bus.register_device(Box::new(Stub::new(name, value)), range)?;
        }

        bus.map(Target::Dma, Dma::RANGE)?;

        let handle = bus.clock.add_device(ClockDevice::new(GPU_HZ));
        bus.clock.set_default_update_frequency(handle, VideoMode::Ntsc.cycles_per_scanline());

        let gpu = bus.register_device(Box::new(Gpu::new(handle)), Gpu::RANGE)?;
        bus.route_clock(handle, gpu);
        bus.set_dma_port(Port::Gpu, gpu, 1);

        bus.register_device(Box::new(bios), Bios::RANGE)?;
        bus.map(Target::CacheCtrl, CacheCtrl::RANGE)?;

        Ok(Self { cpu: Cpu::new(bus), gpu, config })
    }

    /// Run [`SystemConfig::cycles_per_run`] CPU cycles.
    pub fn run(&mut self) {
        self.cpu.run(self.config.cycles_per_run);
    }

    /// Run the active DMA transfer until it's done or the port isn't ready.
    pub fn run_dma(&mut self) {
        let cycles = self.cpu.bus.run_dma();
        if cycles != 0 {
            trace!("DMA ran for {cycles} cycles");
        }
    }

    /// Wait until real time has caught up with emulated time.
    pub fn sync(&mut self) {
        self.cpu.bus.clock.sync_to_realtime();
    }

    fn gpu(&self) -> &Gpu {
        match self.cpu.bus.device::<Gpu>(self.gpu) {
            Some(gpu) => gpu,
            None => unreachable!("device {:?} isn't the GPU", self.gpu),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.gpu().frame_count()
    }

    pub fn vram(&self) -> &Vram {
        self.gpu().vram()
    }
}
