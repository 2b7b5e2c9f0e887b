//! # Coprocessor 0.
//!
//! Handles exceptions and interrupts. It can also handle virtual memory, but that isn't used by
//! the Playstation.

use psx_util::{Bit, BitSet};

use std::fmt;

/// Exception cause codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Interrupt = 0x0,
    /// Fetching an instruction or loading data at an unaligned address.
    AddressFetchError = 0x4,
    /// Storing data at an unaligned address.
    AddressStoreError = 0x5,
    /// Reading from an address where nothing is mapped.
    BusFetchError = 0x6,
    /// Writing to an address where nothing is mapped.
    BusStoreError = 0x7,
    /// Thrown via `syscall`.
    Syscall = 0x8,
    /// Thrown via `break`.
    Breakpoint = 0x9,
    /// Thrown when executing an illegal instruction.
    ReservedInstruction = 0xa,
    /// Thrown when calling an instruction for an unavailable coprocessor.
    CopUnusable = 0xb,
    /// Thrown by signed arithmetic if the result overflows.
    ArithmeticOverflow = 0xc,
}

impl Exception {
    /// If the exception records the faulting address in BadVAddr.
    fn is_address_error(self) -> bool {
        matches!(self, Exception::AddressFetchError | Exception::AddressStoreError)
    }
}

/// An exception caused by a memory access, with the address that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub exception: Exception,
    pub addr: u32,
}

impl Fault {
    pub fn new(exception: Exception, addr: u32) -> Self {
        Self { exception, addr }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} at {:08x}", self.exception, self.addr)
    }
}

/// The breakpoint registers. They aren't emulated and may only be cleared.
const BREAKPOINT_REGS: [u32; 6] = [3, 5, 6, 7, 9, 11];

/// # COP0 registers
///
/// | Number | Name     | Usage                       |
/// |--------|----------|-----------------------------|
/// | 3      | bpc      | Breakpoint on execution     |
/// | 5      | bda      | Breakpoint on data access   |
/// | 6      | jumpdest | Memorized jump address      |
/// | 7      | dcic     | Breakpoint control          |
/// | 8      | badvaddr | Bad virtual address         |
/// | 9      | bdam     | Data access breakpoint mask |
/// | 11     | bpcm     | Execute breakpoint mask     |
/// | 12     | sr       | Status register             |
/// | 13     | cause    | Exception type              |
/// | 14     | epc      | Return address from trap    |
/// | 15     | prid     | Processor ID                |
#[derive(Default)]
pub struct Cop0 {
    sr: u32,
    cause: u32,
    epc: u32,
    bad_vaddr: u32,
}

impl Cop0 {
    const PRID: u32 = 0x2;

    /// Stores only go to the instruction cache.
    #[inline]
    pub fn cache_isolated(&self) -> bool {
        self.sr.bit(16)
    }

    /// Exceptions go to the vector in ROM rather than RAM.
    #[inline]
    fn boot_exception_vectors(&self) -> bool {
        self.sr.bit(22)
    }

    #[inline]
    pub fn cop2_enabled(&self) -> bool {
        self.sr.bit(30)
    }

    /// If an interrupt should be taken before the next instruction.
    pub fn irq_pending(&self) -> bool {
        let mask = self.sr.bit_range(8, 15);
        let pending = self.cause.bit_range(8, 15);
        self.sr.bit(0) && mask & pending != 0
    }

    /// Write a register through MTC0.
    ///
    /// # Panics
    ///
    /// If a breakpoint register is set to anything but zero.
    pub fn set_reg(&mut self, reg: u32, val: u32) {
        match reg {
            12 => self.sr = val,
            // Only the software interrupt bits are writable.
            13 => self.cause = self.cause.set_bit_range(8, 9, val.bit_range(8, 9)),
            _ if BREAKPOINT_REGS.contains(&reg) => {
                if val != 0 {
                    panic!("write of {val:08x} to COP0 breakpoint register {reg}");
                }
            }
            _ => warn!("write of {val:08x} to COP0 register {reg}"),
        }
    }

    /// Read a register through MFC0.
    pub fn read_reg(&self, reg: u32) -> u32 {
        match reg {
            8 => self.bad_vaddr,
            12 => self.sr,
            13 => self.cause,
            14 => self.epc,
            15 => Self::PRID,
            _ if BREAKPOINT_REGS.contains(&reg) => 0,
            _ => {
                warn!("read from unknown COP0 register {reg}");
                0
            }
        }
    }

    /// Start handling an exception. Interrupts are disabled and the CPU enters kernel mode. The
    /// cause register is set to the exception type and EPC to the address of the current
    /// instruction, or the branch before it if the CPU is in a branch delay slot.
    ///
    /// # Returns
    ///
    /// The address of the exception handler.
    pub fn enter_exception(&mut self, current_pc: u32, in_delay: bool, ex: Exception) -> u32 {
        // Bits 0..5 of the status register keep track of the interrupt enable and user mode
        // flags, as a stack of three. Entering pushes two zeroes.
        let flags = self.sr.bit_range(0, 5);
        self.sr = self.sr.set_bit_range(0, 5, flags << 2);

        self.cause = self.cause
            .set_bit_range(2, 6, ex as u32)
            .set_bit(31, in_delay);

        self.epc = if in_delay { current_pc.wrapping_sub(4) } else { current_pc };

        if self.boot_exception_vectors() {
            0xbfc0_0180
        } else {
            0x8000_0080
        }
    }

    /// Like [`Cop0::enter_exception`], but records the faulting address for address errors.
    pub fn enter_fault(&mut self, current_pc: u32, in_delay: bool, fault: Fault) -> u32 {
        if fault.exception.is_address_error() {
            self.bad_vaddr = fault.addr;
        }
        self.enter_exception(current_pc, in_delay, fault.exception)
    }

    /// Pop the mode stack. Called by RFE.
    pub fn exit_exception(&mut self) {
        let flags = self.sr.bit_range(0, 5);
        self.sr = self.sr.set_bit_range(0, 3, flags >> 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_stack() {
        let mut cop0 = Cop0::default();
        cop0.set_reg(12, 0b00_01_01);

        cop0.enter_exception(0x1000, false, Exception::Syscall);
        assert_eq!(cop0.read_reg(12) & 0x3f, 0b01_01_00);

        cop0.exit_exception();
        assert_eq!(cop0.read_reg(12) & 0x3f, 0b01_01_01);
    }

    #[test]
    fn cause_and_epc() {
        let mut cop0 = Cop0::default();
        let vector = cop0.enter_exception(0x8000_1004, true, Exception::ArithmeticOverflow);
        assert_eq!(vector, 0x8000_0080);
        assert_eq!(cop0.read_reg(13).bit_range(2, 6), 0xc);
        assert!(cop0.read_reg(13).bit(31));
        assert_eq!(cop0.read_reg(14), 0x8000_1000);

        cop0.set_reg(12, 1 << 22);
        let vector = cop0.enter_fault(
            0x8000_2000,
            false,
            Fault::new(Exception::AddressStoreError, 0x1235),
        );
        assert_eq!(vector, 0xbfc0_0180);
        assert_eq!(cop0.read_reg(8), 0x1235);
        assert!(!cop0.read_reg(13).bit(31));
    }

    #[test]
    fn software_interrupt() {
        let mut cop0 = Cop0::default();
        cop0.set_reg(13, 1 << 8);
        assert!(!cop0.irq_pending());

        cop0.set_reg(12, 1 << 8 | 1);
        assert!(cop0.irq_pending());
    }

    #[test]
    fn prid() {
        assert_eq!(Cop0::default().read_reg(15), 2);
    }

    #[test]
    #[should_panic]
    fn breakpoint_register() {
        Cop0::default().set_reg(7, 1);
    }
}
