//! Emulation of the MIPS R3000 used by the Playstation.
//!
//! Only the integer instruction set and COP0 are emulated. COP2 (the GTE) transfers are
//! accepted but do nothing.

mod cop0;

pub mod opcode;

use psx_util::Bit;

use crate::addr::Segment;
use crate::bus::{AddrUnit, Bus, Byte, HalfWord, Word};

use cop0::Cop0;

pub use cop0::{Exception, Fault};
pub use opcode::{Opcode, RegIdx};

/// Where the CPU starts executing after reset. The start of the BIOS.
const PC_START_ADDRESS: u32 = 0xbfc0_0000;

#[derive(Default, Clone, Copy)]
struct DelaySlot {
    reg: RegIdx,
    val: u32,
}

pub struct Cpu {
    /// The address of the instruction currently being executed.
    current_pc: u32,
    /// The address of the next instruction. During execution this points at the instruction
    /// right after the current one, which is the branch delay slot for branches.
    pc: u32,
    /// Always one step ahead of `pc`. Branches and jumps write here, which means the
    /// instruction after the branch is always executed.
    next_pc: u32,
    /// Set if the current instruction is in a branch delay slot. Used when entering an exception,
    /// since EPC then has to point to the branch.
    in_branch_delay: bool,
    /// Set by branch instructions, taken or not. Moved to `in_branch_delay` on the next
    /// instruction.
    branched: bool,
    hi: u32,
    lo: u32,
    /// # Registers
    ///
    /// | Number  | Name    | Usage                 |
    /// |---------|---------|-----------------------|
    /// | r0      | $zero   | Always 0              |
    /// | r1      | $at     | Reserved by assembler |
    /// | r2-r3   | $v0-$v1 | Results               |
    /// | r4-r7   | $a0-$a3 | Arguments             |
    /// | r8-r15  | $t0-$t7 | Temporaries           |
    /// | r16-r23 | $s0-$s7 | Storing               |
    /// | r24-r25 | $t8-$t9 | Temporaries           |
    /// | r26-r27 | $k0-$k1 | Reserved by kernel    |
    /// | r28     | $gp     | Global pointer        |
    /// | r29     | $sp     | Stack pointer         |
    /// | r30     | $fp     | Frame pointer         |
    /// | r31     | $ra     | Return address        |
    registers: [u32; 32],
    /// # Load delay slot
    ///
    /// A value loaded from memory (or COP0) isn't in the register until after the next
    /// instruction has read its registers. Every instruction calls `fetch_load_slot` after
    /// reading registers but before writing any. When nothing is pending the slot points at
    /// $zero, so flushing it does nothing.
    load_delay: DelaySlot,
    /// Instructions fetched from KUSEG and KSEG0 go through here when enabled.
    icache: Box<[ICacheLine; 0x100]>,
    pub bus: Bus,
    cop0: Cop0,
    /// Cycles used by the current instruction.
    cycles: u32,
}

impl Cpu {
    pub fn new(bus: Bus) -> Self {
        Self {
            current_pc: 0x0,
            pc: PC_START_ADDRESS,
            next_pc: PC_START_ADDRESS.wrapping_add(4),
            in_branch_delay: false,
            branched: false,
            hi: 0x0,
            lo: 0x0,
            registers: [0x0; 32],
            load_delay: DelaySlot::default(),
            icache: Box::new([ICacheLine::INVALID; 0x100]),
            bus,
            cop0: Cop0::default(),
            cycles: 0,
        }
    }

    pub fn read_reg(&self, idx: RegIdx) -> u32 {
        self.registers[idx.idx()]
    }

    fn set_reg(&mut self, idx: RegIdx, val: u32) {
        self.registers[idx.idx()] = val;
        self.registers[0] = 0;
    }

    pub fn hi(&self) -> u32 {
        self.hi
    }

    pub fn lo(&self) -> u32 {
        self.lo
    }

    pub fn cop0_reg(&self, reg: u32) -> u32 {
        self.cop0.read_reg(reg)
    }

    /// The address of the next instruction to be executed.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// The next instruction to be executed, if it can be read without side effects.
    pub fn next_op(&self) -> Option<Opcode> {
        self.bus.peek::<Word>(self.pc).map(Opcode::new)
    }

    /// Run instructions until at least `cycles` CPU cycles have passed.
    pub fn run(&mut self, cycles: u64) {
        let mut ran = 0;
        while ran < cycles {
            ran += self.step() as u64;
        }
    }

    /// Execute a single instruction, or take a pending interrupt. Returns the amount of cycles
    /// it took.
    pub fn step(&mut self) -> u32 {
        self.cycles = 1;

        if self.cop0.irq_pending() {
            self.current_pc = self.pc;
            self.in_branch_delay = self.branched;
            self.branched = false;
            self.throw_exception(Exception::Interrupt);
        } else {
            let addr = self.next_pc();
            match self.fetch(addr) {
                Ok(op) => self.exec(op),
                Err(fault) => self.throw_fault(fault),
            }
        }

        let cycles = self.cycles;
        self.bus.tick(cycles);
        cycles
    }

    /// Move on to the next instruction. Returns its address.
    fn next_pc(&mut self) -> u32 {
        self.current_pc = self.pc;
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);
        self.in_branch_delay = self.branched;
        self.branched = false;
        self.current_pc
    }

    fn fetch(&mut self, addr: u32) -> Result<Opcode, Fault> {
        if !Segment::of(addr).is_cached() || !self.bus.cache_ctrl.icache_enabled() {
            let (val, cycles) = self.bus.load::<Word>(addr)?;
            self.cycles += cycles;
            return Ok(Opcode::new(val));
        }

        if !Word::is_aligned(addr) {
            return Err(Fault::new(Exception::AddressFetchError, addr));
        }

        let word_idx = addr.bit_range(2, 3) as usize;
        let line_idx = addr.bit_range(4, 11) as usize;
        let mut line = self.icache[line_idx];

        if line.tag() != addr.bit_range(12, 30) || line.valid_word_idx() > word_idx {
            // Fill from the missing word to the end of the line.
            let base = addr & !0xf;
            for idx in word_idx..4 {
                let (val, cycles) = self.bus.load::<Word>(base | (idx as u32) << 2)?;
                self.cycles += cycles;
                line.data[idx] = val;
            }
            line.set_tag(addr);
            self.icache[line_idx] = line;
        }

        Ok(Opcode::new(line.data[word_idx]))
    }

    fn load<T: AddrUnit>(&mut self, addr: u32) -> Result<u32, Fault> {
        let (val, cycles) = self.bus.load::<T>(addr)?;
        self.cycles += cycles;
        Ok(val)
    }

    /// Store the low bytes of `val`. With the cache isolated, 32-bit stores go to the
    /// instruction cache instead of the bus.
    ///
    /// # Panics
    ///
    /// On 8 or 16 bit stores while the cache is isolated.
    fn store<T: AddrUnit>(&mut self, addr: u32, val: u32) -> Result<(), Fault> {
        if !self.cop0.cache_isolated() {
            self.cycles += self.bus.store::<T>(addr, val)?;
            return Ok(());
        }

        if T::WIDTH != 4 {
            panic!("{}-bit store at {addr:08x} with the cache isolated", T::WIDTH * 8);
        }

        let line = &mut self.icache[addr.bit_range(4, 11) as usize];
        if self.bus.cache_ctrl.tag_test_mode() {
            line.invalidate();
        } else {
            line.data[addr.bit_range(2, 3) as usize] = val;
        }

        Ok(())
    }

    /// Flush the pending load, unless it's to the same register as the new one, and put the new
    /// load in the slot.
    fn pipeline_load(&mut self, reg: RegIdx, val: u32) {
        if self.load_delay.reg != reg {
            self.set_reg(self.load_delay.reg, self.load_delay.val);
        }
        self.load_delay = DelaySlot { reg, val };
    }

    /// Write the pending load to its register.
    fn fetch_load_slot(&mut self) {
        self.set_reg(self.load_delay.reg, self.load_delay.val);
        self.load_delay = DelaySlot::default();
    }

    /// The value of `reg` including any pending load to it. Used by LWL and LWR, which merge
    /// with a load in progress.
    fn reg_with_pending(&self, reg: RegIdx) -> u32 {
        if self.load_delay.reg == reg {
            self.load_delay.val
        } else {
            self.read_reg(reg)
        }
    }

    /// Branch relative to the delay slot if `cond` holds.
    fn branch_if(&mut self, cond: bool, op: Opcode) {
        self.branched = true;
        if cond {
            self.next_pc = self.pc.wrapping_add(op.signed_imm() << 2);
        }
    }

    fn jump(&mut self, addr: u32) {
        self.branched = true;
        self.next_pc = addr;
    }

    fn throw_exception(&mut self, ex: Exception) {
        trace!("exception {:?} at {:08x}", ex, self.current_pc);
        self.fetch_load_slot();
        let vector = self.cop0.enter_exception(self.current_pc, self.in_branch_delay, ex);
        self.enter_vector(vector);
    }

    fn throw_fault(&mut self, fault: Fault) {
        trace!("exception {} at {:08x}", fault, self.current_pc);
        self.fetch_load_slot();
        let vector = self.cop0.enter_fault(self.current_pc, self.in_branch_delay, fault);
        self.enter_vector(vector);
    }

    fn enter_vector(&mut self, vector: u32) {
        self.pc = vector;
        self.next_pc = vector.wrapping_add(4);
        self.branched = false;
    }

    fn exec(&mut self, op: Opcode) {
        match op.op() {
            0x00 => match op.special() {
                0x00 => self.op_sll(op),
                0x02 => self.op_srl(op),
                0x03 => self.op_sra(op),
                0x04 => self.op_sllv(op),
                0x06 => self.op_srlv(op),
                0x07 => self.op_srav(op),
                0x08 => self.op_jr(op),
                0x09 => self.op_jalr(op),
                0x0c => self.op_syscall(),
                0x0d => self.op_break(),
                0x10 => self.op_mfhi(op),
                0x11 => self.op_mthi(op),
                0x12 => self.op_mflo(op),
                0x13 => self.op_mtlo(op),
                0x18 => self.op_mult(op),
                0x19 => self.op_multu(op),
                0x1a => self.op_div(op),
                0x1b => self.op_divu(op),
                0x20 => self.op_add(op),
                0x21 => self.op_addu(op),
                0x22 => self.op_sub(op),
                0x23 => self.op_subu(op),
                0x24 => self.op_and(op),
                0x25 => self.op_or(op),
                0x26 => self.op_xor(op),
                0x27 => self.op_nor(op),
                0x2a => self.op_slt(op),
                0x2b => self.op_sltu(op),
                _ => self.op_illegal(op),
            },
            0x01 => self.op_bcondz(op),
            0x02 => self.op_j(op),
            0x03 => self.op_jal(op),
            0x04 => self.op_beq(op),
            0x05 => self.op_bne(op),
            0x06 => self.op_blez(op),
            0x07 => self.op_bgtz(op),
            0x08 => self.op_addi(op),
            0x09 => self.op_addiu(op),
            0x0a => self.op_slti(op),
            0x0b => self.op_sltiu(op),
            0x0c => self.op_andi(op),
            0x0d => self.op_ori(op),
            0x0e => self.op_xori(op),
            0x0f => self.op_lui(op),
            0x10 => self.op_cop0(op),
            0x12 => self.op_cop2(op),
            0x11 | 0x13 => self.op_cop_unusable(),
            0x20 => self.op_lb(op),
            0x21 => self.op_lh(op),
            0x22 => self.op_lwl(op),
            0x23 => self.op_lw(op),
            0x24 => self.op_lbu(op),
            0x25 => self.op_lhu(op),
            0x26 => self.op_lwr(op),
            0x28 => self.op_sb(op),
            0x29 => self.op_sh(op),
            0x2a => self.op_swl(op),
            0x2b => self.op_sw(op),
            0x2e => self.op_swr(op),
            0x32 => self.op_lwc2(op),
            0x3a => self.op_swc2(op),
            0x30 | 0x31 | 0x33 | 0x38 | 0x39 | 0x3b => self.op_cop_unusable(),
            _ => self.op_illegal(op),
        }
    }
}

/// CPU opcode implementation.
impl Cpu {
    /// SLL - Shift left logical.
    fn op_sll(&mut self, op: Opcode) {
        let val = self.read_reg(op.rt()) << op.shift();
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// SRL - Shift right logical.
    fn op_srl(&mut self, op: Opcode) {
        let val = self.read_reg(op.rt()) >> op.shift();
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// SRA - Shift right arithmetic.
    fn op_sra(&mut self, op: Opcode) {
        let val = (self.read_reg(op.rt()) as i32) >> op.shift();
        self.fetch_load_slot();
        self.set_reg(op.rd(), val as u32);
    }

    /// SLLV - Shift left logical variable.
    fn op_sllv(&mut self, op: Opcode) {
        let val = self.read_reg(op.rt()) << self.read_reg(op.rs()).bit_range(0, 4);
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// SRLV - Shift right logical variable.
    fn op_srlv(&mut self, op: Opcode) {
        let val = self.read_reg(op.rt()) >> self.read_reg(op.rs()).bit_range(0, 4);
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// SRAV - Shift right arithmetic variable.
    fn op_srav(&mut self, op: Opcode) {
        let val = (self.read_reg(op.rt()) as i32) >> self.read_reg(op.rs()).bit_range(0, 4);
        self.fetch_load_slot();
        self.set_reg(op.rd(), val as u32);
    }

    /// JR - Jump register.
    fn op_jr(&mut self, op: Opcode) {
        self.jump(self.read_reg(op.rs()));
        self.fetch_load_slot();
    }

    /// JALR - Jump and link register.
    fn op_jalr(&mut self, op: Opcode) {
        let ret = self.next_pc;
        self.jump(self.read_reg(op.rs()));
        self.fetch_load_slot();
        self.set_reg(op.rd(), ret);
    }

    /// SYSCALL - Throw a syscall exception.
    fn op_syscall(&mut self) {
        trace!("syscall {:x}", self.read_reg(RegIdx::A0));
        self.throw_exception(Exception::Syscall);
    }

    /// BREAK - Throw a breakpoint exception.
    fn op_break(&mut self) {
        self.throw_exception(Exception::Breakpoint);
    }

    /// MFHI - Move from high.
    fn op_mfhi(&mut self, op: Opcode) {
        self.fetch_load_slot();
        self.set_reg(op.rd(), self.hi);
    }

    /// MTHI - Move to high.
    fn op_mthi(&mut self, op: Opcode) {
        self.hi = self.read_reg(op.rs());
        self.fetch_load_slot();
    }

    /// MFLO - Move from low.
    fn op_mflo(&mut self, op: Opcode) {
        self.fetch_load_slot();
        self.set_reg(op.rd(), self.lo);
    }

    /// MTLO - Move to low.
    fn op_mtlo(&mut self, op: Opcode) {
        self.lo = self.read_reg(op.rs());
        self.fetch_load_slot();
    }

    /// MULT - Signed multiplication.
    fn op_mult(&mut self, op: Opcode) {
        let lhs = self.read_reg(op.rs()) as i32;
        let rhs = self.read_reg(op.rt()) as i32;
        let val = (i64::from(lhs) * i64::from(rhs)) as u64;
        self.fetch_load_slot();
        self.hi = (val >> 32) as u32;
        self.lo = val as u32;
    }

    /// MULTU - Unsigned multiplication.
    fn op_multu(&mut self, op: Opcode) {
        let val = u64::from(self.read_reg(op.rs())) * u64::from(self.read_reg(op.rt()));
        self.fetch_load_slot();
        self.hi = (val >> 32) as u32;
        self.lo = val as u32;
    }

    /// # DIV - Signed division
    ///
    /// Dividing by zero doesn't throw an exception, but gives garbage values instead.
    fn op_div(&mut self, op: Opcode) {
        let lhs = self.read_reg(op.rs()) as i32;
        let rhs = self.read_reg(op.rt()) as i32;
        self.fetch_load_slot();
        let (hi, lo) = if rhs == 0 {
            (lhs as u32, if lhs < 0 { 1 } else { 0xffff_ffff })
        } else if rhs == -1 && lhs == i32::MIN {
            (0, 0x8000_0000)
        } else {
            ((lhs % rhs) as u32, (lhs / rhs) as u32)
        };
        self.hi = hi;
        self.lo = lo;
    }

    /// DIVU - Unsigned division.
    fn op_divu(&mut self, op: Opcode) {
        let lhs = self.read_reg(op.rs());
        let rhs = self.read_reg(op.rt());
        self.fetch_load_slot();
        if rhs == 0 {
            self.hi = lhs;
            self.lo = 0xffff_ffff;
        } else {
            self.hi = lhs % rhs;
            self.lo = lhs / rhs;
        }
    }

    /// ADD - Add signed. Throws an exception on overflow, without writing the result.
    fn op_add(&mut self, op: Opcode) {
        let lhs = self.read_reg(op.rs()) as i32;
        let rhs = self.read_reg(op.rt()) as i32;
        match lhs.checked_add(rhs) {
            Some(val) => {
                self.fetch_load_slot();
                self.set_reg(op.rd(), val as u32);
            }
            None => self.throw_exception(Exception::ArithmeticOverflow),
        }
    }

    /// ADDU - Add unsigned.
    fn op_addu(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()).wrapping_add(self.read_reg(op.rt()));
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// SUB - Subtract signed.
    fn op_sub(&mut self, op: Opcode) {
        let lhs = self.read_reg(op.rs()) as i32;
        let rhs = self.read_reg(op.rt()) as i32;
        match lhs.checked_sub(rhs) {
            Some(val) => {
                self.fetch_load_slot();
                self.set_reg(op.rd(), val as u32);
            }
            None => self.throw_exception(Exception::ArithmeticOverflow),
        }
    }

    /// SUBU - Subtract unsigned.
    fn op_subu(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()).wrapping_sub(self.read_reg(op.rt()));
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// AND - Bitwise and.
    fn op_and(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) & self.read_reg(op.rt());
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// OR - Bitwise or.
    fn op_or(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) | self.read_reg(op.rt());
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// XOR - Bitwise exclusive or.
    fn op_xor(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) ^ self.read_reg(op.rt());
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// NOR - Bitwise not or.
    fn op_nor(&mut self, op: Opcode) {
        let val = !(self.read_reg(op.rs()) | self.read_reg(op.rt()));
        self.fetch_load_slot();
        self.set_reg(op.rd(), val);
    }

    /// SLT - Set if less than, signed.
    fn op_slt(&mut self, op: Opcode) {
        let val = (self.read_reg(op.rs()) as i32) < (self.read_reg(op.rt()) as i32);
        self.fetch_load_slot();
        self.set_reg(op.rd(), val as u32);
    }

    /// SLTU - Set if less than, unsigned.
    fn op_sltu(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) < self.read_reg(op.rt());
        self.fetch_load_slot();
        self.set_reg(op.rd(), val as u32);
    }

    /// # BCONDZ - Branch on condition against zero
    ///
    /// Covers BLTZ, BGEZ, BLTZAL and BGEZAL. Bit 16 selects BGEZ. The link variants are
    /// selected by bits 17 to 20 being 0x8, and write the return address whether or not the
    /// branch is taken.
    fn op_bcondz(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) as i32;
        let cond = (val < 0) ^ op.bgez();
        let ret = self.next_pc;
        self.branch_if(cond, op);
        self.fetch_load_slot();
        if op.links() {
            self.set_reg(RegIdx::RA, ret);
        }
    }

    /// J - Jump within the current 256 MB region.
    fn op_j(&mut self, op: Opcode) {
        self.jump((self.pc & 0xf000_0000) | (op.target() << 2));
        self.fetch_load_slot();
    }

    /// JAL - Jump and link.
    fn op_jal(&mut self, op: Opcode) {
        let ret = self.next_pc;
        self.op_j(op);
        self.set_reg(RegIdx::RA, ret);
    }

    /// BEQ - Branch if equal.
    fn op_beq(&mut self, op: Opcode) {
        let cond = self.read_reg(op.rs()) == self.read_reg(op.rt());
        self.branch_if(cond, op);
        self.fetch_load_slot();
    }

    /// BNE - Branch if not equal.
    fn op_bne(&mut self, op: Opcode) {
        let cond = self.read_reg(op.rs()) != self.read_reg(op.rt());
        self.branch_if(cond, op);
        self.fetch_load_slot();
    }

    /// BLEZ - Branch if less than or equal to zero.
    fn op_blez(&mut self, op: Opcode) {
        let cond = self.read_reg(op.rs()) as i32 <= 0;
        self.branch_if(cond, op);
        self.fetch_load_slot();
    }

    /// BGTZ - Branch if greater than zero.
    fn op_bgtz(&mut self, op: Opcode) {
        let cond = self.read_reg(op.rs()) as i32 > 0;
        self.branch_if(cond, op);
        self.fetch_load_slot();
    }

    /// ADDI - Add immediate signed. Throws an exception on overflow.
    fn op_addi(&mut self, op: Opcode) {
        let lhs = self.read_reg(op.rs()) as i32;
        let rhs = op.signed_imm() as i32;
        match lhs.checked_add(rhs) {
            Some(val) => {
                self.fetch_load_slot();
                self.set_reg(op.rt(), val as u32);
            }
            None => self.throw_exception(Exception::ArithmeticOverflow),
        }
    }

    /// ADDIU - Add immediate unsigned.
    fn op_addiu(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        self.fetch_load_slot();
        self.set_reg(op.rt(), val);
    }

    /// SLTI - Set if less than immediate, signed.
    fn op_slti(&mut self, op: Opcode) {
        let val = (self.read_reg(op.rs()) as i32) < (op.signed_imm() as i32);
        self.fetch_load_slot();
        self.set_reg(op.rt(), val as u32);
    }

    /// SLTIU - Set if less than immediate, unsigned. The immediate is still sign extended.
    fn op_sltiu(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) < op.signed_imm();
        self.fetch_load_slot();
        self.set_reg(op.rt(), val as u32);
    }

    /// ANDI - Bitwise and immediate.
    fn op_andi(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) & op.imm();
        self.fetch_load_slot();
        self.set_reg(op.rt(), val);
    }

    /// ORI - Bitwise or immediate.
    fn op_ori(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) | op.imm();
        self.fetch_load_slot();
        self.set_reg(op.rt(), val);
    }

    /// XORI - Bitwise exclusive or immediate.
    fn op_xori(&mut self, op: Opcode) {
        let val = self.read_reg(op.rs()) ^ op.imm();
        self.fetch_load_slot();
        self.set_reg(op.rt(), val);
    }

    /// LUI - Load upper immediate.
    fn op_lui(&mut self, op: Opcode) {
        self.fetch_load_slot();
        self.set_reg(op.rt(), op.imm() << 16);
    }

    /// COP0 - Coprocessor 0 instruction.
    fn op_cop0(&mut self, op: Opcode) {
        match op.cop_op() {
            // MFC0 - Move from coprocessor 0. Goes through the load delay slot.
            0x0 => {
                let val = self.cop0.read_reg(op.rd().0.into());
                self.pipeline_load(op.rt(), val);
            }
            // MTC0 - Move to coprocessor 0.
            0x4 => {
                let val = self.read_reg(op.rt());
                self.fetch_load_slot();
                self.cop0.set_reg(op.rd().0.into(), val);
            }
            // RFE - Restore from exception.
            0x10 if op.special() == 0x10 => {
                self.fetch_load_slot();
                self.cop0.exit_exception();
            }
            _ => self.op_illegal(op),
        }
    }

    /// # COP2 - GTE instruction
    ///
    /// Commands and register writes are ignored and register reads give zero.
    fn op_cop2(&mut self, op: Opcode) {
        if !self.cop0.cop2_enabled() {
            return self.op_cop_unusable();
        }
        match op.cop_op() {
            // MFC2 and CFC2.
            0x0 | 0x2 => self.pipeline_load(op.rt(), 0),
            _ => self.fetch_load_slot(),
        }
    }

    /// Opcodes for coprocessors that aren't there or can't be used that way.
    fn op_cop_unusable(&mut self) {
        self.throw_exception(Exception::CopUnusable);
    }

    /// LB - Load byte, sign extended.
    fn op_lb(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        match self.load::<Byte>(addr) {
            Ok(val) => self.pipeline_load(op.rt(), val as i8 as u32),
            Err(fault) => self.throw_fault(fault),
        }
    }

    /// LH - Load half word, sign extended.
    fn op_lh(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        match self.load::<HalfWord>(addr) {
            Ok(val) => self.pipeline_load(op.rt(), val as i16 as u32),
            Err(fault) => self.throw_fault(fault),
        }
    }

    /// # LWL - Load word left
    ///
    /// Loads the upper bytes of an unaligned word. The word containing the address is loaded and
    /// merged with the current value of the target register, including any load to it still in
    /// the delay slot. Used together with LWR.
    fn op_lwl(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        let val = self.reg_with_pending(op.rt());
        match self.load::<Word>(addr & !3) {
            Ok(word) => {
                let val = match addr & 3 {
                    0 => (val & 0x00ff_ffff) | (word << 24),
                    1 => (val & 0x0000_ffff) | (word << 16),
                    2 => (val & 0x0000_00ff) | (word << 8),
                    _ => word,
                };
                self.pipeline_load(op.rt(), val);
            }
            Err(fault) => self.throw_fault(fault),
        }
    }

    /// LW - Load word.
    fn op_lw(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        match self.load::<Word>(addr) {
            Ok(val) => self.pipeline_load(op.rt(), val),
            Err(fault) => self.throw_fault(fault),
        }
    }

    /// LBU - Load byte unsigned.
    fn op_lbu(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        match self.load::<Byte>(addr) {
            Ok(val) => self.pipeline_load(op.rt(), val),
            Err(fault) => self.throw_fault(fault),
        }
    }

    /// LHU - Load half word unsigned.
    fn op_lhu(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        match self.load::<HalfWord>(addr) {
            Ok(val) => self.pipeline_load(op.rt(), val),
            Err(fault) => self.throw_fault(fault),
        }
    }

    /// # LWR - Load word right
    ///
    /// See `op_lwl`.
    fn op_lwr(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        let val = self.reg_with_pending(op.rt());
        match self.load::<Word>(addr & !3) {
            Ok(word) => {
                let val = match addr & 3 {
                    0 => word,
                    1 => (val & 0xff00_0000) | (word >> 8),
                    2 => (val & 0xffff_0000) | (word >> 16),
                    _ => (val & 0xffff_ff00) | (word >> 24),
                };
                self.pipeline_load(op.rt(), val);
            }
            Err(fault) => self.throw_fault(fault),
        }
    }

    /// SB - Store byte.
    fn op_sb(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        let val = self.read_reg(op.rt());
        self.fetch_load_slot();
        if let Err(fault) = self.store::<Byte>(addr, val) {
            self.throw_fault(fault);
        }
    }

    /// SH - Store half word.
    fn op_sh(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        let val = self.read_reg(op.rt());
        self.fetch_load_slot();
        if let Err(fault) = self.store::<HalfWord>(addr, val) {
            self.throw_fault(fault);
        }
    }

    /// # SWL - Store word left
    ///
    /// Stores the upper bytes of a register to an unaligned address. Same idea as `op_lwl`.
    fn op_swl(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        let val = self.read_reg(op.rt());
        let aligned = addr & !3;
        self.fetch_load_slot();
        let result = self.load::<Word>(aligned).and_then(|word| {
            let val = match addr & 3 {
                0 => (word & 0xffff_ff00) | (val >> 24),
                1 => (word & 0xffff_0000) | (val >> 16),
                2 => (word & 0xff00_0000) | (val >> 8),
                _ => val,
            };
            self.store::<Word>(aligned, val)
        });
        if let Err(fault) = result {
            self.throw_fault(fault);
        }
    }

    /// SW - Store word.
    fn op_sw(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        let val = self.read_reg(op.rt());
        self.fetch_load_slot();
        if let Err(fault) = self.store::<Word>(addr, val) {
            self.throw_fault(fault);
        }
    }

    /// # SWR - Store word right
    ///
    /// See `op_swl`.
    fn op_swr(&mut self, op: Opcode) {
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        let val = self.read_reg(op.rt());
        let aligned = addr & !3;
        self.fetch_load_slot();
        let result = self.load::<Word>(aligned).and_then(|word| {
            let val = match addr & 3 {
                0 => val,
                1 => (word & 0x0000_00ff) | (val << 8),
                2 => (word & 0x0000_ffff) | (val << 16),
                _ => (word & 0x00ff_ffff) | (val << 24),
            };
            self.store::<Word>(aligned, val)
        });
        if let Err(fault) = result {
            self.throw_fault(fault);
        }
    }

    /// LWC2 - Load word to COP2. The load happens, but the value is dropped.
    fn op_lwc2(&mut self, op: Opcode) {
        if !self.cop0.cop2_enabled() {
            return self.op_cop_unusable();
        }
        let addr = self.read_reg(op.rs()).wrapping_add(op.signed_imm());
        self.fetch_load_slot();
        if let Err(fault) = self.load::<Word>(addr) {
            self.throw_fault(fault);
        }
    }

    /// SWC2 - Store word from COP2. Nothing is stored.
    fn op_swc2(&mut self, _: Opcode) {
        if !self.cop0.cop2_enabled() {
            return self.op_cop_unusable();
        }
        self.fetch_load_slot();
    }

    /// Illegal or undefined opcode.
    fn op_illegal(&mut self, op: Opcode) {
        debug!("reserved instruction {:08x} at {:08x}", op.0, self.current_pc);
        self.throw_exception(Exception::ReservedInstruction);
    }
}

/// A line of 4 instructions in the instruction cache.
#[derive(Clone, Copy)]
struct ICacheLine {
    /// Bits 12 to 30 are the tag, and bits 2 to 4 the index of the first valid word. Bit 4
    /// being set means no word is valid.
    tag: u32,
    data: [u32; 4],
}

impl ICacheLine {
    const INVALID: Self = Self {
        tag: 0x10,
        data: [0x0; 4],
    };

    fn tag(&self) -> u32 {
        self.tag.bit_range(12, 30)
    }

    fn valid_word_idx(&self) -> usize {
        self.tag.bit_range(2, 4) as usize
    }

    fn set_tag(&mut self, pc: u32) {
        self.tag = pc & 0x7fff_f00c;
    }

    fn invalidate(&mut self) {
        self.tag |= 0x10;
    }
}
