//! Decoding of MIPS R3000 opcodes.
//!
//! All opcodes are 32 bits, in one of three layouts:
//!
//! | Layout    | Fields                                              |
//! |-----------|-----------------------------------------------------|
//! | Immediate | op(6) rs(5) rt(5) imm(16)                           |
//! | Jump      | op(6) target(26)                                    |
//! | Register  | op(6) rs(5) rt(5) rd(5) shift(5) function(6)        |

use psx_util::Bit;

use std::fmt;

/// Index of a general purpose register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegIdx(pub u8);

impl RegIdx {
    pub const ZERO: Self = Self(0);
    pub const AT: Self = Self(1);
    pub const V0: Self = Self(2);
    pub const V1: Self = Self(3);
    pub const A0: Self = Self(4);
    pub const A1: Self = Self(5);
    pub const A2: Self = Self(6);
    pub const A3: Self = Self(7);
    pub const T0: Self = Self(8);
    pub const T1: Self = Self(9);
    pub const T2: Self = Self(10);
    pub const T3: Self = Self(11);
    pub const T4: Self = Self(12);
    pub const T5: Self = Self(13);
    pub const T6: Self = Self(14);
    pub const T7: Self = Self(15);
    pub const S0: Self = Self(16);
    pub const S1: Self = Self(17);
    pub const S2: Self = Self(18);
    pub const S3: Self = Self(19);
    pub const S4: Self = Self(20);
    pub const S5: Self = Self(21);
    pub const S6: Self = Self(22);
    pub const S7: Self = Self(23);
    pub const T8: Self = Self(24);
    pub const T9: Self = Self(25);
    pub const K0: Self = Self(26);
    pub const K1: Self = Self(27);
    pub const GP: Self = Self(28);
    pub const SP: Self = Self(29);
    pub const FP: Self = Self(30);
    pub const RA: Self = Self(31);

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

const REGISTER_NAMES: [&str; 32] = [
    "$zero", "$at", "$v0", "$v1", "$a0", "$a1", "$a2", "$a3",
    "$t0", "$t1", "$t2", "$t3", "$t4", "$t5", "$t6", "$t7",
    "$s0", "$s1", "$s2", "$s3", "$s4", "$s5", "$s6", "$s7",
    "$t8", "$t9", "$k0", "$k1", "$gp", "$sp", "$fp", "$ra",
];

impl fmt::Display for RegIdx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(REGISTER_NAMES[self.idx() & 31])
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Opcode(pub u32);

impl Opcode {
    pub fn new(opcode: u32) -> Self {
        Opcode(opcode)
    }

    /// Operation.
    pub fn op(self) -> u32 {
        self.0.bit_range(26, 31)
    }

    /// Sub operation / function.
    pub fn special(self) -> u32 {
        self.0.bit_range(0, 5)
    }

    /// COP operation.
    pub fn cop_op(self) -> u32 {
        self.0.bit_range(21, 25)
    }

    pub fn imm(self) -> u32 {
        self.0.bit_range(0, 15)
    }

    /// Sign extended immediate value.
    pub fn signed_imm(self) -> u32 {
        self.0.bit_range(0, 15) as i16 as u32
    }

    /// Target address of jump instructions.
    pub fn target(self) -> u32 {
        self.0.bit_range(0, 25)
    }

    pub fn shift(self) -> u32 {
        self.0.bit_range(6, 10)
    }

    /// Destination register.
    pub fn rd(self) -> RegIdx {
        RegIdx(self.0.bit_range(11, 15) as u8)
    }

    /// Target register.
    pub fn rt(self) -> RegIdx {
        RegIdx(self.0.bit_range(16, 20) as u8)
    }

    /// Source register.
    pub fn rs(self) -> RegIdx {
        RegIdx(self.0.bit_range(21, 25) as u8)
    }

    /// Used by BCONDZ. Branch if greater or equal to zero rather than less than zero.
    pub fn bgez(self) -> bool {
        self.0.bit(16)
    }

    /// Used by BCONDZ. Save the return address when branching.
    pub fn links(self) -> bool {
        self.0.bit_range(17, 20) == 0x8
    }

    /// If the instruction is `break`.
    pub fn is_break(self) -> bool {
        self.op() == 0x0 && self.special() == 0xd
    }

    pub fn mnemonic(self) -> &'static str {
        match self.op() {
            0x0 => match self.special() {
                0x00 => "sll",
                0x02 => "srl",
                0x03 => "sra",
                0x04 => "sllv",
                0x06 => "srlv",
                0x07 => "srav",
                0x08 => "jr",
                0x09 => "jalr",
                0x0c => "syscall",
                0x0d => "break",
                0x10 => "mfhi",
                0x11 => "mthi",
                0x12 => "mflo",
                0x13 => "mtlo",
                0x18 => "mult",
                0x19 => "multu",
                0x1a => "div",
                0x1b => "divu",
                0x20 => "add",
                0x21 => "addu",
                0x22 => "sub",
                0x23 => "subu",
                0x24 => "and",
                0x25 => "or",
                0x26 => "xor",
                0x27 => "nor",
                0x2a => "slt",
                0x2b => "sltu",
                _ => "illegal",
            },
            0x1 => match (self.links(), self.bgez()) {
                (true, true) => "bgezal",
                (true, false) => "bltzal",
                (false, true) => "bgez",
                (false, false) => "bltz",
            },
            0x2 => "j",
            0x3 => "jal",
            0x4 => "beq",
            0x5 => "bne",
            0x6 => "blez",
            0x7 => "bgtz",
            0x8 => "addi",
            0x9 => "addiu",
            0xa => "slti",
            0xb => "sltiu",
            0xc => "andi",
            0xd => "ori",
            0xe => "xori",
            0xf => "lui",
            0x10 => match self.cop_op() {
                0x0 => "mfc0",
                0x4 => "mtc0",
                0x10 => "rfe",
                _ => "cop0",
            },
            0x11 => "cop1",
            0x12 => "cop2",
            0x13 => "cop3",
            0x20 => "lb",
            0x21 => "lh",
            0x22 => "lwl",
            0x23 => "lw",
            0x24 => "lbu",
            0x25 => "lhu",
            0x26 => "lwr",
            0x28 => "sb",
            0x29 => "sh",
            0x2a => "swl",
            0x2b => "sw",
            0x2e => "swr",
            0x30 => "lwc0",
            0x31 => "lwc1",
            0x32 => "lwc2",
            0x33 => "lwc3",
            0x38 => "swc0",
            0x39 => "swc1",
            0x3a => "swc2",
            0x3b => "swc3",
            _ => "illegal",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = self.mnemonic();
        let (rs, rt, rd) = (self.rs(), self.rt(), self.rd());
        match self.op() {
            0x0 => match self.special() {
                0x00..=0x03 => write!(f, "{name} {rd} {rt} {}", self.shift()),
                0x04..=0x07 => write!(f, "{name} {rd} {rt} {rs}"),
                0x08 | 0x11 | 0x13 => write!(f, "{name} {rs}"),
                0x09 => write!(f, "{name} {rd} {rs}"),
                0x10 | 0x12 => write!(f, "{name} {rd}"),
                0x18..=0x1b => write!(f, "{name} {rs} {rt}"),
                0x20..=0x2b => write!(f, "{name} {rd} {rs} {rt}"),
                _ => f.write_str(name),
            },
            0x1 | 0x6 | 0x7 => write!(f, "{name} {rs} {}", self.signed_imm() as i32),
            0x2 | 0x3 => write!(f, "{name} {:08x}", self.target() << 2),
            0x4 | 0x5 => write!(f, "{name} {rs} {rt} {}", self.signed_imm() as i32),
            0x8..=0xb => write!(f, "{name} {rt} {rs} {}", self.signed_imm() as i32),
            0xc..=0xe => write!(f, "{name} {rt} {rs} {:04x}", self.imm()),
            0xf => write!(f, "{name} {rt} {:04x}", self.imm()),
            0x10 => match self.cop_op() {
                0x0 | 0x4 => write!(f, "{name} {rt} {}", rd.0),
                _ => f.write_str(name),
            },
            0x20..=0x3b => write!(f, "{name} {rt} {}({rs})", self.signed_imm() as i32),
            _ => f.write_str(name),
        }
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x} ({self})", self.0)
    }
}
