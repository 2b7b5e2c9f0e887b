use super::asm::{self, R};
use super::{build, run_code, run_with_handler};
use crate::bus::Word;

/// Set the boot exception vector bit so exceptions go to the handler in the BIOS.
fn boot_vectors() -> [u32; 2] {
    [asm::lui(R::T0, 0x0040), asm::mtc0(R::T0, 12)]
}

fn exception_code(cause: u32) -> u32 {
    (cause >> 2) & 0x1f
}

#[test]
fn reset_state() {
    let system = build(&[asm::brk()]);
    assert_eq!(system.cpu.pc(), 0xbfc0_0000);
    assert_eq!(system.cpu.cop0_reg(15), 2);
}

#[test]
fn zero_reg() {
    let system = run_code(&[
        asm::addiu(R::ZERO, R::ZERO, 1),
        asm::lui(R::ZERO, 0xffff),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::ZERO), 0);
}

#[test]
fn load_delay() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, 42),
        asm::sw(R::T0, 0, R::ZERO),
        asm::addiu(R::T1, R::ZERO, 5),
        asm::lw(R::T1, 0, R::ZERO),
        asm::addu(R::T2, R::T1, R::T1),
        asm::addu(R::T3, R::T1, R::T1),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T2), 10);
    assert_eq!(system.cpu.read_reg(R::T3), 84);
}

#[test]
fn load_cancel() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, 42),
        asm::sw(R::T0, 0, R::ZERO),
        asm::addiu(R::T0, R::ZERO, 7),
        asm::sw(R::T0, 4, R::ZERO),
        asm::addiu(R::T1, R::ZERO, 5),
        asm::lw(R::T1, 0, R::ZERO),
        asm::lw(R::T1, 4, R::ZERO),
        asm::addu(R::T2, R::T1, R::ZERO),
        asm::addu(R::T3, R::T1, R::ZERO),
        asm::brk(),
    ]);
    // The first load is never seen.
    assert_eq!(system.cpu.read_reg(R::T2), 5);
    assert_eq!(system.cpu.read_reg(R::T3), 7);
}

#[test]
fn cop0_load_delay() {
    let system = run_code(&[
        asm::addiu(R::T1, R::ZERO, 5),
        asm::mfc0(R::T1, 15),
        asm::addu(R::T2, R::T1, R::ZERO),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T2), 5);
    assert_eq!(system.cpu.read_reg(R::T1), 2);
}

#[test]
fn sign_extension() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, 0x80),
        asm::sb(R::T0, 0x10, R::ZERO),
        asm::lb(R::T1, 0x10, R::ZERO),
        asm::lbu(R::T2, 0x10, R::ZERO),
        asm::nop(),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T1), 0xffff_ff80);
    assert_eq!(system.cpu.read_reg(R::T2), 0x80);
}

#[test]
fn unaligned_load() {
    let system = run_code(&[
        asm::lui(R::T0, 0x4433),
        asm::ori(R::T0, R::T0, 0x2211),
        asm::sw(R::T0, 0, R::ZERO),
        asm::lui(R::T0, 0x8877),
        asm::ori(R::T0, R::T0, 0x6655),
        asm::sw(R::T0, 4, R::ZERO),
        // LWL merges with the value LWR has in the delay slot.
        asm::lwr(R::T1, 1, R::ZERO),
        asm::lwl(R::T1, 4, R::ZERO),
        asm::nop(),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T1), 0x5544_3322);
}

#[test]
fn unaligned_store() {
    let system = run_code(&[
        asm::lui(R::T1, 0xaabb),
        asm::ori(R::T1, R::T1, 0xccdd),
        asm::sw(R::ZERO, 8, R::ZERO),
        asm::sw(R::ZERO, 12, R::ZERO),
        asm::swr(R::T1, 9, R::ZERO),
        asm::swl(R::T1, 12, R::ZERO),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.bus.peek::<Word>(8), Some(0xbbcc_dd00));
    assert_eq!(system.cpu.bus.peek::<Word>(12), Some(0x0000_00aa));
}

#[test]
fn branch_delay() {
    let system = run_code(&[
        asm::beq(R::ZERO, R::ZERO, 2),
        asm::addiu(R::V0, R::ZERO, 1),
        asm::addiu(R::V1, R::ZERO, 1),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::V0), 1);
    assert_eq!(system.cpu.read_reg(R::V1), 0);
}

#[test]
fn branch_not_taken() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, 1),
        asm::bne(R::T0, R::T0, 2),
        asm::nop(),
        asm::addiu(R::V0, R::ZERO, 1),
        asm::bgez(R::T0, 2),
        asm::nop(),
        asm::addiu(R::V1, R::ZERO, 1),
        asm::bltz(R::T0, 1),
        asm::nop(),
        asm::addiu(R::A0, R::ZERO, 1),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::V0), 1);
    assert_eq!(system.cpu.read_reg(R::V1), 0);
    assert_eq!(system.cpu.read_reg(R::A0), 1);
}

#[test]
fn jump_and_link() {
    let system = run_code(&[
        asm::jal(0xbfc0_0010),
        asm::addiu(R::V0, R::ZERO, 1),
        asm::addiu(R::V0, R::ZERO, 99),
        asm::nop(),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::V0), 1);
    assert_eq!(system.cpu.read_reg(R::RA), 0xbfc0_0008);
    assert_eq!(system.cpu.pc(), 0xbfc0_0010);
}

#[test]
fn jump_register() {
    let system = run_code(&[
        asm::lui(R::T0, 0xbfc0),
        asm::ori(R::T0, R::T0, 0x0014),
        asm::jalr(R::T1, R::T0),
        asm::nop(),
        asm::addiu(R::V0, R::ZERO, 99),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::V0), 0);
    assert_eq!(system.cpu.read_reg(R::T1), 0xbfc0_0010);
}

#[test]
fn link_when_not_taken() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, 1),
        asm::bltzal(R::T0, 5),
        asm::nop(),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::RA), 0xbfc0_000c);
    assert_eq!(system.cpu.pc(), 0xbfc0_000c);
}

#[test]
fn add_overflow() {
    let mut code = boot_vectors().to_vec();
    code.extend([
        asm::lui(R::T1, 0x7fff),
        asm::ori(R::T1, R::T1, 0xffff),
        asm::addiu(R::T2, R::ZERO, 3),
        asm::addiu(R::T3, R::ZERO, 1),
        asm::add(R::T2, R::T1, R::T3),
        asm::brk(),
    ]);
    let system = run_code(&code);

    assert_eq!(system.cpu.pc(), 0xbfc0_0180);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0xc);
    assert_eq!(system.cpu.cop0_reg(14), 0xbfc0_0018);
    assert_eq!(system.cpu.read_reg(R::T2), 3);
}

#[test]
fn addu_wraps() {
    let system = run_code(&[
        asm::lui(R::T1, 0x7fff),
        asm::ori(R::T1, R::T1, 0xffff),
        asm::addiu(R::T3, R::ZERO, 1),
        asm::addu(R::T2, R::T1, R::T3),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T2), 0x8000_0000);
    assert_eq!(system.cpu.pc(), 0xbfc0_0010);
}

#[test]
fn immediate_and_sub_overflow() {
    let mut code = boot_vectors().to_vec();
    code.extend([
        asm::lui(R::T1, 0x8000),
        asm::addiu(R::T2, R::ZERO, 3),
        asm::addi(R::T2, R::T1, -1),
        asm::brk(),
    ]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0xc);
    assert_eq!(system.cpu.read_reg(R::T2), 3);

    let mut code = boot_vectors().to_vec();
    code.extend([
        asm::lui(R::T1, 0x8000),
        asm::addiu(R::T3, R::ZERO, 1),
        asm::sub(R::T2, R::T1, R::T3),
        asm::brk(),
    ]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0xc);
    assert_eq!(system.cpu.read_reg(R::T2), 0);
}

#[test]
fn division() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, 5),
        asm::div(R::T0, R::ZERO),
        asm::mflo(R::T1),
        asm::mfhi(R::T2),
        asm::addiu(R::T0, R::ZERO, -5),
        asm::div(R::T0, R::ZERO),
        asm::mflo(R::T3),
        asm::lui(R::T4, 0x8000),
        asm::addiu(R::T5, R::ZERO, -1),
        asm::div(R::T4, R::T5),
        asm::mflo(R::T6),
        asm::mfhi(R::T7),
        asm::addiu(R::S0, R::ZERO, 7),
        asm::addiu(R::S1, R::ZERO, 2),
        asm::divu(R::S0, R::S1),
        asm::mflo(R::S2),
        asm::mfhi(R::S3),
        asm::divu(R::S0, R::ZERO),
        asm::mflo(R::S4),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T1), 0xffff_ffff);
    assert_eq!(system.cpu.read_reg(R::T2), 5);
    assert_eq!(system.cpu.read_reg(R::T3), 1);
    assert_eq!(system.cpu.read_reg(R::T6), 0x8000_0000);
    assert_eq!(system.cpu.read_reg(R::T7), 0);
    assert_eq!(system.cpu.read_reg(R::S2), 3);
    assert_eq!(system.cpu.read_reg(R::S3), 1);
    assert_eq!(system.cpu.read_reg(R::S4), 0xffff_ffff);
    assert_eq!(system.cpu.hi(), 7);
}

#[test]
fn multiplication() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, -2),
        asm::addiu(R::T1, R::ZERO, 3),
        asm::mult(R::T0, R::T1),
        asm::mflo(R::T2),
        asm::mfhi(R::T3),
        asm::multu(R::T0, R::T1),
        asm::mfhi(R::T4),
        asm::mthi(R::T1),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T2), 0xffff_fffa);
    assert_eq!(system.cpu.read_reg(R::T3), 0xffff_ffff);
    assert_eq!(system.cpu.read_reg(R::T4), 2);
    assert_eq!(system.cpu.hi(), 3);
    assert_eq!(system.cpu.lo(), 0xffff_fffa);
}

#[test]
fn shifts() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, -16),
        asm::sra(R::T1, R::T0, 2),
        asm::srl(R::T2, R::T0, 28),
        asm::sll(R::T3, R::T0, 4),
        asm::addiu(R::T4, R::ZERO, 36),
        asm::sllv(R::T5, R::T0, R::T4),
        asm::srav(R::T6, R::T0, R::T4),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T1), 0xffff_fffc);
    assert_eq!(system.cpu.read_reg(R::T2), 0xf);
    assert_eq!(system.cpu.read_reg(R::T3), 0xffff_ff00);
    assert_eq!(system.cpu.read_reg(R::T5), 0xffff_ff00);
    assert_eq!(system.cpu.read_reg(R::T6), 0xffff_ffff);
}

#[test]
fn set_less_than() {
    let system = run_code(&[
        asm::addiu(R::T0, R::ZERO, -1),
        asm::addiu(R::T1, R::ZERO, 1),
        asm::slt(R::T2, R::T0, R::T1),
        asm::sltu(R::T3, R::T0, R::T1),
        asm::sltiu(R::T4, R::T1, -1),
        asm::nor(R::T5, R::ZERO, R::ZERO),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T2), 1);
    assert_eq!(system.cpu.read_reg(R::T3), 0);
    assert_eq!(system.cpu.read_reg(R::T4), 1);
    assert_eq!(system.cpu.read_reg(R::T5), 0xffff_ffff);
}

#[test]
fn exception_in_delay_slot() {
    let mut code = boot_vectors().to_vec();
    code.extend([
        asm::beq(R::ZERO, R::ZERO, 1),
        asm::syscall(),
        asm::brk(),
        asm::brk(),
    ]);
    let system = run_code(&code);

    let cause = system.cpu.cop0_reg(13);
    assert_eq!(exception_code(cause), 0x8);
    assert_ne!(cause & (1 << 31), 0);
    assert_eq!(system.cpu.cop0_reg(14), 0xbfc0_0008);
}

#[test]
fn address_error() {
    let mut code = boot_vectors().to_vec();
    code.extend([
        asm::addiu(R::T0, R::ZERO, 1),
        asm::lw(R::T1, 0, R::T0),
        asm::brk(),
    ]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0x4);
    assert_eq!(system.cpu.cop0_reg(8), 1);
    assert_eq!(system.cpu.cop0_reg(14), 0xbfc0_000c);

    let mut code = boot_vectors().to_vec();
    code.extend([asm::sh(R::T1, 0x13, R::ZERO), asm::brk()]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0x5);
    assert_eq!(system.cpu.cop0_reg(8), 0x13);
}

#[test]
fn misaligned_fetch() {
    let mut code = boot_vectors().to_vec();
    code.extend([
        asm::lui(R::T1, 0xbfc0),
        asm::ori(R::T1, R::T1, 0x0022),
        asm::jr(R::T1),
        asm::nop(),
        asm::brk(),
    ]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0x4);
    assert_eq!(system.cpu.cop0_reg(8), 0xbfc0_0022);
    assert_eq!(system.cpu.cop0_reg(14), 0xbfc0_0022);
}

#[test]
fn bus_error() {
    let mut code = boot_vectors().to_vec();
    code.extend([
        asm::lui(R::T1, 0x1f90),
        asm::lw(R::T2, 0, R::T1),
        asm::brk(),
    ]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0x6);
    assert_eq!(system.cpu.cop0_reg(14), 0xbfc0_000c);
}

#[test]
fn software_interrupt() {
    let system = run_code(&[
        asm::lui(R::T0, 0x0040),
        asm::ori(R::T0, R::T0, 0x0101),
        asm::mtc0(R::T0, 12),
        asm::addiu(R::T1, R::ZERO, 0x100),
        asm::mtc0(R::T1, 13),
        asm::addiu(R::V0, R::ZERO, 1),
        asm::brk(),
    ]);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0x0);
    assert_eq!(system.cpu.cop0_reg(14), 0xbfc0_0014);
    assert_eq!(system.cpu.cop0_reg(12) & 0x3f, 0b00_01_00);
    assert_eq!(system.cpu.read_reg(R::V0), 0);
}

#[test]
fn return_from_exception() {
    let system = run_with_handler(
        &[
            asm::lui(R::T0, 0x0040),
            asm::ori(R::T0, R::T0, 0x0001),
            asm::mtc0(R::T0, 12),
            asm::syscall(),
            asm::addiu(R::V0, R::ZERO, 1),
            asm::brk(),
        ],
        &[
            asm::mfc0(R::K0, 14),
            asm::nop(),
            asm::addiu(R::K0, R::K0, 4),
            asm::jr(R::K0),
            asm::rfe(),
        ],
    );
    assert_eq!(system.cpu.read_reg(R::V0), 1);
    assert_eq!(system.cpu.cop0_reg(12) & 0x3f, 0b00_00_01);
    assert_eq!(system.cpu.cop0_reg(14), 0xbfc0_000c);
}

#[test]
fn coprocessors() {
    let mut code = boot_vectors().to_vec();
    code.extend([asm::mfc2(R::T1, 0), asm::brk()]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0xb);

    let mut code = boot_vectors().to_vec();
    code.extend([0xfc00_0000, asm::brk()]);
    let system = run_code(&code);
    assert_eq!(exception_code(system.cpu.cop0_reg(13)), 0xa);

    // COP2 enabled.
    let system = run_code(&[
        asm::lui(R::T0, 0x4040),
        asm::mtc0(R::T0, 12),
        asm::addiu(R::T1, R::ZERO, 5),
        asm::mfc2(R::T1, 0),
        asm::nop(),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::T1), 0);
    assert_eq!(system.cpu.pc(), 0xbfc0_0014);
}

#[test]
fn isolated_store() {
    let system = run_code(&[
        asm::lui(R::T0, 0x0001),
        asm::mtc0(R::T0, 12),
        asm::addiu(R::T1, R::ZERO, 5),
        asm::sw(R::T1, 0x40, R::ZERO),
        asm::mtc0(R::ZERO, 12),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.bus.peek::<Word>(0x40), Some(0xaaaa_aaaa));
}

#[test]
#[should_panic]
fn isolated_half_word_store() {
    run_code(&[
        asm::lui(R::T0, 0x0001),
        asm::mtc0(R::T0, 12),
        asm::sh(R::T1, 0x40, R::ZERO),
        asm::brk(),
    ]);
}

#[test]
fn cached_code() {
    let ins = asm::addiu(R::V0, R::ZERO, 7);
    let system = run_code(&[
        asm::lui(R::T0, (ins >> 16) as u16),
        asm::ori(R::T0, R::T0, ins as u16),
        asm::sw(R::T0, 0x100, R::ZERO),
        asm::addiu(R::T0, R::ZERO, asm::brk() as i16),
        asm::sw(R::T0, 0x104, R::ZERO),
        // Enable the instruction cache.
        asm::lui(R::T1, 0xfffe),
        asm::ori(R::T1, R::T1, 0x0130),
        asm::addiu(R::T2, R::ZERO, 0x800),
        asm::sw(R::T2, 0, R::T1),
        asm::lui(R::T3, 0x8000),
        asm::ori(R::T3, R::T3, 0x0100),
        asm::jr(R::T3),
        asm::nop(),
        asm::brk(),
    ]);
    assert_eq!(system.cpu.read_reg(R::V0), 7);
    assert_eq!(system.cpu.pc(), 0x8000_0104);
}
