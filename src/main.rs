#[macro_use]
extern crate log;

mod config;

use clap::Parser;
use psx_core::{Bios, System, SystemError};
use thiserror::Error;

use std::path::PathBuf;
use std::{fs, io, process};

use config::{Config, ConfigError};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// BIOS image to boot. Overrides the config file.
    #[arg(short, long)]
    bios: Option<PathBuf>,

    /// Exit after running this many frames.
    #[arg(short, long)]
    frames: Option<u64>,

    /// Run as fast as possible instead of in real time.
    #[arg(long)]
    no_sync: bool,

    /// Write the contents of VRAM to this file on exit.
    #[arg(long)]
    dump_vram: Option<PathBuf>,

    /// Save the resulting config as the default.
    #[arg(long)]
    save_config: bool,
}

#[derive(Error, Debug)]
enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error("no BIOS given, either pass --bios or set it in the config file")]
    NoBios,

    #[error("failed to dump VRAM: {0}")]
    Dump(io::Error),
}

fn run(args: Args) -> Result<(), Error> {
    let mut config = Config::load()?;

    if let Some(bios) = args.bios {
        config.bios = Some(bios);
    }
    if args.frames.is_some() {
        config.frames = args.frames;
    }
    if args.no_sync {
        config.realtime = false;
    }
    if args.save_config {
        config.store()?;
    }

    let path = config.bios.as_ref().ok_or(Error::NoBios)?;
    let bios = Bios::from_file(path).map_err(SystemError::from)?;
    info!("loaded BIOS {}", bios.name());

    let mut system = System::with_config(bios, config.system.clone())?;

    let mut runs = 0;
    while config.frames.map_or(true, |frames| runs < frames) {
        system.run();
        system.run_dma();
        if config.realtime {
            system.sync();
        }
        runs += 1;
    }

    info!("stopped after {runs} runs and {} frames", system.frame_count());
    debug!(
        "pc {:08x}, status {:08x}, cause {:08x}",
        system.cpu.pc(),
        system.cpu.cop0_reg(12),
        system.cpu.cop0_reg(13),
    );

    if let Some(path) = args.dump_vram {
        fs::write(&path, system.vram().as_bytes()).map_err(Error::Dump)?;
        info!("VRAM written to {}", path.display());
    }

    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(err) = run(Args::parse()) {
        error!("{err}");
        process::exit(1);
    }
}
