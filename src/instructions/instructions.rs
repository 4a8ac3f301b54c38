use std::fmt;

use serde::Serialize;

use crate::backend::reservation_station::{RSKind, StationTag};

pub type RegisterType = u8;
pub type WordType = i64;
pub type MemoryType = u64;

// The number of architectural registers (R0-R7).
pub const REG_COUNT: u8 = 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
pub enum Opcode {
    ADD,
    SUB,
    MUL,
    DIV,
    LOAD,
    STORE,
}

impl Opcode {
    pub const ALL: [Opcode; 6] = [Opcode::ADD, Opcode::SUB, Opcode::MUL, Opcode::DIV, Opcode::LOAD, Opcode::STORE];

    /// The reservation station pool that executes this opcode.
    pub fn rs_kind(self) -> RSKind {
        match self {
            Opcode::ADD | Opcode::SUB => RSKind::AddSub,
            Opcode::MUL | Opcode::DIV => RSKind::MulDiv,
            Opcode::LOAD | Opcode::STORE => RSKind::LoadStore,
        }
    }

    /// True if the opcode writes an architectural register.
    pub fn has_dest(self) -> bool {
        self != Opcode::STORE
    }

    pub fn is_arithmetic(self) -> bool {
        self.rs_kind() != RSKind::LoadStore
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", mnemonic(*self))
    }
}

pub fn mnemonic(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::ADD => "ADD",
        Opcode::SUB => "SUB",
        Opcode::MUL => "MUL",
        Opcode::DIV => "DIV",
        Opcode::LOAD => "LOAD",
        Opcode::STORE => "STORE",
    }
}

pub fn get_opcode(mnemonic: &str) -> Option<Opcode> {
    let string = mnemonic.trim().to_uppercase();

    match string.as_str() {
        "ADD" => Some(Opcode::ADD),
        "SUB" => Some(Opcode::SUB),
        "MUL" => Some(Opcode::MUL),
        "DIV" => Some(Opcode::DIV),
        "LOAD" => Some(Opcode::LOAD),
        "STORE" => Some(Opcode::STORE),
        _ => None,
    }
}

pub fn register_name(reg: RegisterType) -> String {
    format!("R{}", reg)
}

/// An issue command as it arrives from the outside world. Nothing in here has
/// been checked against the engine yet; see [`IssueRequest::validate`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct IssueRequest {
    pub opcode: Opcode,
    pub dest: Option<RegisterType>,
    pub src1: Option<RegisterType>,
    pub src2: Option<RegisterType>,
    pub address: Option<MemoryType>,
    pub immediate: Option<WordType>,
}

impl IssueRequest {
    pub fn arith(opcode: Opcode, dest: RegisterType, src1: RegisterType, src2: RegisterType) -> Self {
        Self { opcode, dest: Some(dest), src1: Some(src1), src2: Some(src2), address: None, immediate: None }
    }

    pub fn arith_imm(opcode: Opcode, dest: RegisterType, src1: RegisterType, immediate: WordType) -> Self {
        Self { opcode, dest: Some(dest), src1: Some(src1), src2: None, address: None, immediate: Some(immediate) }
    }

    pub fn load(dest: RegisterType, address: MemoryType) -> Self {
        Self { opcode: Opcode::LOAD, dest: Some(dest), src1: None, src2: None, address: Some(address), immediate: None }
    }

    pub fn store(src: RegisterType, address: MemoryType) -> Self {
        Self { opcode: Opcode::STORE, dest: None, src1: Some(src), src2: None, address: Some(address), immediate: None }
    }

    /// Checks the operand shape for the opcode. Returns a description of the
    /// first problem found.
    pub fn validate(&self, memory_size: usize) -> Result<(), String> {
        for reg in [self.dest, self.src1, self.src2].into_iter().flatten() {
            if reg >= REG_COUNT {
                return Err(format!("{} is not a valid register, expected R0-R{}", register_name(reg), REG_COUNT - 1));
            }
        }

        match self.opcode {
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV => {
                if self.dest.is_none() {
                    return Err(format!("{} expects a destination register", self.opcode));
                }
                if self.src1.is_none() {
                    return Err(format!("{} expects a first source register", self.opcode));
                }
                if self.src2.is_none() && self.immediate.is_none() {
                    return Err(format!("{} expects a second source register or an immediate", self.opcode));
                }
            }
            Opcode::LOAD => {
                if self.dest.is_none() {
                    return Err("LOAD expects a destination register".to_string());
                }
            }
            Opcode::STORE => {
                if self.src1.is_none() {
                    return Err("STORE expects a source register".to_string());
                }
            }
        }

        if !self.opcode.is_arithmetic() {
            match self.address {
                None => return Err(format!("{} expects a memory address", self.opcode)),
                Some(addr) if addr >= memory_size as MemoryType => {
                    return Err(format!("memory address {} is out of range 0..{}", addr, memory_size));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum InstrStatus {
    WAITING,
    ISSUED,
    EXECUTING,
    WRITEBACK,
    COMPLETED,
}

impl fmt::Display for InstrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstrStatus::WAITING => "waiting",
            InstrStatus::ISSUED => "issued",
            InstrStatus::EXECUTING => "executing",
            InstrStatus::WRITEBACK => "write-back",
            InstrStatus::COMPLETED => "completed",
        };
        write!(f, "{}", s)
    }
}

/// An issued instruction together with its timeline.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct Instr {
    pub pc: u64,
    pub opcode: Opcode,
    pub dest: Option<RegisterType>,
    pub src1: Option<RegisterType>,
    pub src2: Option<RegisterType>,
    pub address: Option<MemoryType>,
    pub immediate: Option<WordType>,
    pub issue_cycle: Option<u64>,
    pub execute_start_cycle: Option<u64>,
    pub execute_end_cycle: Option<u64>,
    pub writeback_cycle: Option<u64>,
    pub status: InstrStatus,
    pub rs_tag: Option<StationTag>,
}

impl Instr {
    pub(crate) fn new(pc: u64, request: &IssueRequest) -> Self {
        Self {
            pc,
            opcode: request.opcode,
            dest: if request.opcode.has_dest() { request.dest } else { None },
            src1: if request.opcode == Opcode::LOAD { None } else { request.src1 },
            src2: if request.opcode.is_arithmetic() { request.src2 } else { None },
            address: if request.opcode.is_arithmetic() { None } else { request.address },
            immediate: request.immediate,
            issue_cycle: None,
            execute_start_cycle: None,
            execute_end_cycle: None,
            writeback_cycle: None,
            status: InstrStatus::WAITING,
            rs_tag: None,
        }
    }

    /// The registers this instruction reads.
    pub fn sources(&self) -> impl Iterator<Item=RegisterType> {
        [self.src1, self.src2].into_iter().flatten()
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", mnemonic(self.opcode))?;

        let reg = |r: Option<RegisterType>| r.map(register_name).unwrap_or_else(|| "?".to_string());

        match self.opcode {
            Opcode::ADD |
            Opcode::SUB |
            Opcode::MUL |
            Opcode::DIV => {
                write!(f, "{}, {}, ", reg(self.dest), reg(self.src1))?;
                match (self.src2, self.immediate) {
                    (Some(src2), _) => write!(f, "{}", register_name(src2))?,
                    (None, Some(imm)) => write!(f, "#{}", imm)?,
                    (None, None) => write!(f, "?")?,
                }
            }
            Opcode::LOAD => write!(f, "{}, [{}]", reg(self.dest), self.address.unwrap_or_default())?,
            Opcode::STORE => write!(f, "{}, [{}]", reg(self.src1), self.address.unwrap_or_default())?,
        }

        Ok(())
    }
}
