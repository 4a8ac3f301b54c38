use std::collections::VecDeque;

use serde::Serialize;

use crate::backend::reservation_station::StationTag;
use crate::instructions::instructions::WordType;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct CDBEntry {
    pub cycle: u64,
    pub tag: StationTag,
    pub value: WordType,
}

/// Log of Common Data Bus broadcasts, most recent first. Only the last
/// `capacity` broadcasts are retained.
pub struct CDB {
    capacity: usize,
    log: VecDeque<CDBEntry>,
}

impl CDB {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, log: VecDeque::with_capacity(capacity + 1) }
    }

    pub fn record(&mut self, entry: CDBEntry) {
        self.log.push_front(entry);
        self.log.truncate(self.capacity);
    }

    pub fn head(&self) -> Option<&CDBEntry> {
        self.log.front()
    }

    pub fn entries(&self) -> impl Iterator<Item=&CDBEntry> {
        self.log.iter()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}
