mod cpu;

use crate::bus::bios::Bios;
use crate::System;

/// Where exceptions go when the boot exception vector bit is set.
const HANDLER_OFFSET: usize = 0x180;

/// Give up if a test program hasn't reached a `break` after this many steps.
const MAX_STEPS: usize = 100_000;

fn to_bytes(code: &[u32]) -> Vec<u8> {
    code.iter().flat_map(|word| word.to_le_bytes()).collect()
}

/// A system running `code` from the start of the BIOS, with `handler` as the exception
/// handler.
pub fn build_with_handler(code: &[u32], handler: &[u32]) -> System {
    let mut data = to_bytes(code);
    assert!(data.len() <= HANDLER_OFFSET, "test program overlaps the exception handler");

    data.resize(HANDLER_OFFSET, 0x0);
    data.extend(to_bytes(handler));

    match System::new(Bios::from_code(0, &data)) {
        Ok(system) => system,
        Err(err) => panic!("{err}"),
    }
}

/// A system running `code`, with an exception handler that stops immediately.
pub fn build(code: &[u32]) -> System {
    build_with_handler(code, &[asm::brk()])
}

/// Run until the next instruction is `break`. DMA is run after every instruction.
pub fn run(system: &mut System) {
    for _ in 0..MAX_STEPS {
        if system.cpu.next_op().map_or(false, |op| op.is_break()) {
            return;
        }
        system.cpu.step();
        system.run_dma();
    }
    panic!("no break after {MAX_STEPS} steps, pc at {:08x}", system.cpu.pc());
}

pub fn run_code(code: &[u32]) -> System {
    let mut system = build(code);
    run(&mut system);
    system
}

pub fn run_with_handler(code: &[u32], handler: &[u32]) -> System {
    let mut system = build_with_handler(code, handler);
    run(&mut system);
    system
}
