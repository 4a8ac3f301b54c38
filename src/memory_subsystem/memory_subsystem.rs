use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cpu::CPUConfig;
use crate::instructions::instructions::{MemoryType, WordType};

// Memory cells are filled with values in 0..MEMORY_VALUE_BOUND.
const MEMORY_VALUE_BOUND: WordType = 100;

/// Word addressed data memory. Only STORE writeback mutates it.
pub struct MemorySubsystem {
    pub(crate) memory: Vec<WordType>,
    seed: Option<u64>,
}

impl MemorySubsystem {
    pub fn new(cpu_config: &CPUConfig) -> MemorySubsystem {
        let mut memory_subsystem = MemorySubsystem {
            memory: vec![0; cpu_config.memory_size],
            seed: cpu_config.memory_seed,
        };
        memory_subsystem.init();
        memory_subsystem
    }

    /// Fills the memory with fresh pseudo random content. With a configured
    /// seed the content is the same every time.
    pub(crate) fn init(&mut self) {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        for cell in self.memory.iter_mut() {
            *cell = rng.gen_range(0..MEMORY_VALUE_BOUND);
        }
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    pub fn load(&self, addr: MemoryType) -> WordType {
        self.memory.get(addr as usize).copied().unwrap_or(0)
    }

    pub(crate) fn store(&mut self, addr: MemoryType, value: WordType) {
        match self.memory.get_mut(addr as usize) {
            Some(cell) => *cell = value,
            None => warn!("Dropping store of {} to out of range address {}", value, addr),
        }
    }

    pub fn cells(&self) -> &[WordType] {
        &self.memory
    }
}
