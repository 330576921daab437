/// A general-purpose register index, named after the MIPS o32 ABI.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Register(u8);

impl Register {
    pub const ZERO: Register = Register(0);
    pub const V0: Register = Register(2); // return value
    pub const V1: Register = Register(3); // syscall number
    pub const A0: Register = Register(4);
    pub const A1: Register = Register(5);
    pub const A2: Register = Register(6);
    pub const A3: Register = Register(7);
    pub const T0: Register = Register(8); // fifth syscall argument
    pub const GP: Register = Register(28);
    pub const SP: Register = Register(29);
    pub const FP: Register = Register(30);
    pub const RA: Register = Register(31);

    pub fn new(num: u8) -> Result<Self, crate::error::DecodeError> {
        if num < 32 {
            Ok(Register(num))
        } else {
            Err(crate::error::DecodeError::InvalidRegister(num))
        }
    }

    pub fn val(&self) -> usize {
        self.0 as usize
    }
}

/// The live register file of the single EE core.
///
/// Only the state a context switch has to carry is modelled; instruction
/// execution belongs to the external CPU emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cpu {
    pub pc: u32,
    pub regs: [u32; 32],
    pub hi: u32,
    pub lo: u32,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Cpu {
    pub fn new(entry_point: u32) -> Self {
        Self {
            pc: entry_point,
            regs: [0; 32],
            hi: 0,
            lo: 0,
        }
    }

    pub fn read_reg(&self, reg: Register) -> u32 {
        if reg == Register::ZERO {
            0
        } else {
            self.regs[reg.val()]
        }
    }

    pub fn write_reg(&mut self, reg: Register, val: u32) {
        if reg != Register::ZERO {
            self.regs[reg.val()] = val;
        }
    }

    /// Arguments of a kernel call in ABI order (`a0..a3`, then `t0`).
    pub fn syscall_args(&self) -> [u32; 5] {
        [
            self.read_reg(Register::A0),
            self.read_reg(Register::A1),
            self.read_reg(Register::A2),
            self.read_reg(Register::A3),
            self.read_reg(Register::T0),
        ]
    }
}
