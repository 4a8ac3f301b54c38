use std::fmt;
use std::fmt::Display;

use serde::{Serialize, Serializer};

use crate::instructions::instructions::{mnemonic, MemoryType, Opcode, RegisterType, WordType};

/// The class of reservation station pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
pub enum RSKind {
    AddSub,
    MulDiv,
    LoadStore,
}

impl RSKind {
    pub const ALL: [RSKind; 3] = [RSKind::AddSub, RSKind::MulDiv, RSKind::LoadStore];

    fn tag_prefix(self) -> &'static str {
        match self {
            RSKind::AddSub => "Add",
            RSKind::MulDiv => "Mul",
            RSKind::LoadStore => "Load",
        }
    }
}

impl Display for RSKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RSKind::AddSub => "add/sub",
            RSKind::MulDiv => "mul/div",
            RSKind::LoadStore => "load/store",
        };
        write!(f, "{}", s)
    }
}

/// Identifies one reservation station. It doubles as the renaming token in the
/// register alias table and in waiting operand slots.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StationTag {
    pub kind: RSKind,
    pub index: u8,
}

impl Display for StationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.tag_prefix(), self.index as u16 + 1)
    }
}

impl Serialize for StationTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An operand slot: either the value is known or the station producing it is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RSOperand {
    Value(WordType),
    Pending(StationTag),
    Unused,
}

impl RSOperand {
    pub fn value(&self) -> Option<WordType> {
        match self {
            RSOperand::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<StationTag> {
        match self {
            RSOperand::Pending(tag) => Some(*tag),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RSOperand::Pending(_))
    }
}

impl Display for RSOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RSOperand::Value(v) => write!(f, "{}", v),
            RSOperand::Pending(tag) => write!(f, "{}", tag),
            RSOperand::Unused => write!(f, "-"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RSState {
    IDLE,
    BUSY,
}

// A single reservation station.
//
// Arithmetic stations use source[0]/source[1] as (vj,qj)/(vk,qk). Load/store
// stations keep the address separately and, for STORE, the value to store in
// source[0].
#[derive(Clone, Debug)]
pub struct RS {
    pub tag: StationTag,
    pub state: RSState,
    pub opcode: Option<Opcode>,
    pub source: [RSOperand; 2],
    pub address: Option<MemoryType>,
    pub dest: Option<RegisterType>,
    pub instr_pc: Option<u64>,
    pub executing: bool,
    pub cycles_remaining: u8,
}

impl RS {
    fn new(tag: StationTag) -> Self {
        Self {
            tag,
            state: RSState::IDLE,
            opcode: None,
            source: [RSOperand::Unused, RSOperand::Unused],
            address: None,
            dest: None,
            instr_pc: None,
            executing: false,
            cycles_remaining: 0,
        }
    }

    fn reset(&mut self) {
        *self = RS::new(self.tag);
    }

    pub fn is_busy(&self) -> bool {
        self.state == RSState::BUSY
    }

    /// Replaces every operand waiting on `tag` by `value`. Returns the number
    /// of operands that were filled in.
    pub(crate) fn capture(&mut self, tag: StationTag, value: WordType) -> usize {
        let mut captured = 0;
        for source in self.source.iter_mut() {
            if *source == RSOperand::Pending(tag) {
                *source = RSOperand::Value(value);
                captured += 1;
            }
        }
        captured
    }
}

impl Display for RS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RS {}", self.tag)?;

        if let Some(opcode) = self.opcode {
            write!(f, " {}", mnemonic(opcode))?;
        }

        for source in &self.source {
            if *source != RSOperand::Unused {
                write!(f, " {}", source)?;
            }
        }

        if let Some(addr) = self.address {
            write!(f, " [{}]", addr)?;
        }

        Ok(())
    }
}

/// A fixed size pool of reservation stations of one kind.
#[derive(Clone, Debug)]
pub struct RSTable {
    pub kind: RSKind,
    pub capacity: u8,
    array: Vec<RS>,
}

impl RSTable {
    pub fn new(kind: RSKind, capacity: u8) -> Self {
        let array = (0..capacity)
            .map(|index| RS::new(StationTag { kind, index }))
            .collect();

        RSTable { kind, capacity, array }
    }

    pub fn get(&self, index: u8) -> &RS {
        &self.array[index as usize]
    }

    pub fn get_mut(&mut self, index: u8) -> &mut RS {
        &mut self.array[index as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item=&RS> {
        self.array.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item=&mut RS> {
        self.array.iter_mut()
    }

    pub fn has_free(&self) -> bool {
        self.array.iter().any(|rs| !rs.is_busy())
    }

    pub fn busy_count(&self) -> usize {
        self.array.iter().filter(|rs| rs.is_busy()).count()
    }

    /// Allocates the lowest indexed idle station.
    pub fn allocate(&mut self) -> Option<u8> {
        let rs = self.array.iter_mut().find(|rs| !rs.is_busy())?;
        rs.state = RSState::BUSY;
        Some(rs.tag.index)
    }

    pub fn deallocate(&mut self, index: u8) {
        let rs = &mut self.array[index as usize];
        debug_assert!(rs.is_busy(), "RS {} is not busy", rs.tag);
        rs.reset();
    }
}
