use crate::backend::reservation_station::StationTag;
use crate::instructions::instructions::{RegisterType, WordType, REG_COUNT};

pub struct RATEntry {
    pub(crate) value: WordType,
    // The station that will produce the next value; while set, `value` is stale.
    pub(crate) producer: Option<StationTag>,
}

/// Outcome of reading a register at issue time.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegRead {
    Ready(WordType),
    Pending(StationTag),
}

/// The architectural register file merged with the Register Alias Table. The
/// RAT entry for a register names the in-flight station that will produce its
/// next value. As long as such a producer exists, readers must wait for its
/// broadcast instead of using the committed value.
pub struct RAT {
    pub(crate) table: Vec<RATEntry>,
}

impl RAT {
    pub fn new() -> Self {
        let table = (0..REG_COUNT)
            .map(|reg| RATEntry { value: Self::initial_value(reg), producer: None })
            .collect();
        Self { table }
    }

    // R0=0, R1=10, ..., R7=70
    pub fn initial_value(reg: RegisterType) -> WordType {
        reg as WordType * 10
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn read(&self, reg: RegisterType) -> RegRead {
        let entry = &self.table[reg as usize];
        match entry.producer {
            Some(tag) => RegRead::Pending(tag),
            None => RegRead::Ready(entry.value),
        }
    }

    pub fn value(&self, reg: RegisterType) -> WordType {
        self.table[reg as usize].value
    }

    pub fn producer(&self, reg: RegisterType) -> Option<StationTag> {
        self.table[reg as usize].producer
    }

    /// Renames `reg` to `tag`. Returns true if a different producer was
    /// superseded (a WAW hazard removed by renaming).
    pub fn mark_pending(&mut self, reg: RegisterType, tag: StationTag) -> bool {
        let entry = &mut self.table[reg as usize];
        let superseded = matches!(entry.producer, Some(old) if old != tag);
        entry.producer = Some(tag);
        superseded
    }

    /// Commits a broadcast value. Only the current producer may write; a
    /// broadcast from a superseded producer leaves the register untouched.
    pub fn resolve(&mut self, reg: RegisterType, tag: StationTag, value: WordType) -> bool {
        let entry = &mut self.table[reg as usize];
        if entry.producer != Some(tag) {
            return false;
        }

        entry.value = value;
        entry.producer = None;
        true
    }
}

impl Default for RAT {
    fn default() -> Self {
        Self::new()
    }
}
