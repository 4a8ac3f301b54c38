use std::error::Error;
use std::fs::File;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::backend::backend::Backend;
use crate::backend::register_alias_table::RegRead;
use crate::error::SimError;
use crate::instructions::instructions::{Instr, IssueRequest, Opcode, RegisterType};
use crate::memory_subsystem::memory_subsystem::MemorySubsystem;
use crate::snapshot::Snapshot;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PerfCounters {
    pub structural_hazards: u64,
    pub raw_stalls: u64,
    pub war_eliminated: u64,
    pub waw_eliminated: u64,
    // the simulation clock; advanced by a successful issue and by every step.
    pub cycle_cnt: u64,
    pub issue_cnt: u64,
    pub retired_cnt: u64,
}

impl PerfCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ipc(&self) -> f64 {
        if self.cycle_cnt == 0 {
            return 0.0;
        }
        self.retired_cnt as f64 / self.cycle_cnt as f64
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Trace {
    pub issue: bool,
    pub execute: bool,
    pub broadcast: bool,
    pub retire: bool,
    pub cycle: bool,
}

/// Execution latency in cycles per opcode, read when a station starts
/// executing.
#[derive(Clone, Deserialize, Serialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Latencies {
    pub add: u8,
    pub sub: u8,
    pub mul: u8,
    pub div: u8,
    pub load: u8,
    pub store: u8,
}

impl Default for Latencies {
    fn default() -> Self {
        Self { add: 2, sub: 2, mul: 10, div: 20, load: 3, store: 3 }
    }
}

impl Latencies {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;

    pub fn get(&self, opcode: Opcode) -> u8 {
        match opcode {
            Opcode::ADD => self.add,
            Opcode::SUB => self.sub,
            Opcode::MUL => self.mul,
            Opcode::DIV => self.div,
            Opcode::LOAD => self.load,
            Opcode::STORE => self.store,
        }
    }

    pub fn set(&mut self, opcode: Opcode, cycles: u32) -> Result<(), SimError> {
        Self::check(opcode, cycles)?;

        let slot = match opcode {
            Opcode::ADD => &mut self.add,
            Opcode::SUB => &mut self.sub,
            Opcode::MUL => &mut self.mul,
            Opcode::DIV => &mut self.div,
            Opcode::LOAD => &mut self.load,
            Opcode::STORE => &mut self.store,
        };
        *slot = cycles as u8;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SimError> {
        for opcode in Opcode::ALL {
            Self::check(opcode, self.get(opcode) as u32)?;
        }
        Ok(())
    }

    fn check(opcode: Opcode, cycles: u32) -> Result<(), SimError> {
        if !(Self::MIN..=Self::MAX).contains(&cycles) {
            return Err(SimError::InvalidOperand(format!(
                "{} latency must be between {} and {} cycles, got {}", opcode, Self::MIN, Self::MAX, cycles)));
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct CPUConfig {
    // the number of add/sub reservation stations
    pub add_sub_rs_count: u8,
    // the number of mul/div reservation stations
    pub mul_div_rs_count: u8,
    // the number of load/store reservation stations
    pub load_store_rs_count: u8,
    // the size of the memory in words
    pub memory_size: usize,
    // seed for the initial memory content; None picks a fresh one every time
    pub memory_seed: Option<u64>,
    // the number of CDB broadcasts retained in the log
    pub cdb_log_capacity: usize,
    // the auto-run clock frequency in Hz
    pub frequency_hz: u64,
    pub latencies: Latencies,
    // which events should be traced (logged)
    pub trace: Trace,
}

impl Default for CPUConfig {
    fn default() -> Self {
        Self {
            add_sub_rs_count: 3,
            mul_div_rs_count: 2,
            load_store_rs_count: 2,
            memory_size: 1000,
            memory_seed: None,
            cdb_log_capacity: 10,
            frequency_hz: 1,
            latencies: Latencies::default(),
            trace: Trace::default(),
        }
    }
}

impl CPUConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.frequency_hz.max(1))
    }

    pub fn validate(&self) -> Result<(), SimError> {
        if self.add_sub_rs_count == 0 || self.mul_div_rs_count == 0 || self.load_store_rs_count == 0 {
            return Err(SimError::InvalidOperand("every reservation station pool needs at least one station".to_string()));
        }
        if self.memory_size == 0 {
            return Err(SimError::InvalidOperand("memory_size must be positive".to_string()));
        }
        if self.frequency_hz == 0 {
            return Err(SimError::InvalidOperand("frequency_hz must be positive".to_string()));
        }
        self.latencies.validate()
    }
}

pub fn load_cpu_config(file_path: &str) -> Result<CPUConfig, Box<dyn Error>> {
    let file = File::open(file_path)?;
    let config: CPUConfig = serde_yaml::from_reader(file)?;
    config.validate()?;
    Ok(config)
}

/// The Tomasulo engine. All state lives in this value and only changes through
/// [`CPU::issue`], [`CPU::do_cycle`], [`CPU::set_latency`] and [`CPU::reset`].
pub struct CPU {
    cpu_config: CPUConfig,
    latencies: Latencies,
    pub(crate) backend: Backend,
    pub(crate) memory_subsystem: MemorySubsystem,
    pub(crate) perf_counters: PerfCounters,
    trace: Trace,
}

impl CPU {
    /// Builds an engine from a config, rejecting pool sizes or latencies out
    /// of range.
    pub fn new(cpu_config: &CPUConfig) -> Result<CPU, SimError> {
        cpu_config.validate()?;
        Ok(CPU::build(cpu_config))
    }

    fn build(cpu_config: &CPUConfig) -> CPU {
        CPU {
            cpu_config: cpu_config.clone(),
            latencies: cpu_config.latencies.clone(),
            backend: Backend::new(cpu_config),
            memory_subsystem: MemorySubsystem::new(cpu_config),
            perf_counters: PerfCounters::new(),
            trace: cpu_config.trace.clone(),
        }
    }

    pub fn cycle(&self) -> u64 {
        self.perf_counters.cycle_cnt
    }

    pub fn config(&self) -> &CPUConfig {
        &self.cpu_config
    }

    pub fn latencies(&self) -> &Latencies {
        &self.latencies
    }

    pub fn perf_counters(&self) -> &PerfCounters {
        &self.perf_counters
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn memory_subsystem(&self) -> &MemorySubsystem {
        &self.memory_subsystem
    }

    pub fn read_register(&self, reg: RegisterType) -> RegRead {
        self.backend.rat.read(reg)
    }

    pub fn is_drained(&self) -> bool {
        self.backend.is_drained()
    }

    /// Issues one instruction. Invalid requests are rejected before any state
    /// changes; a structural hazard only bumps its counter.
    pub fn issue(&mut self, request: IssueRequest) -> Result<Instr, SimError> {
        request
            .validate(self.memory_subsystem.size())
            .map_err(SimError::InvalidOperand)?;

        self.backend.issue(&request, &mut self.perf_counters)
    }

    /// Advances the clock by one cycle: execution, then writeback.
    pub fn do_cycle(&mut self) {
        self.perf_counters.cycle_cnt += 1;
        let cycle = self.perf_counters.cycle_cnt;

        self.backend.do_cycle(cycle, &self.latencies, &mut self.memory_subsystem, &mut self.perf_counters);

        if self.trace.cycle {
            let perf_counters = &self.perf_counters;
            info!("[Cycles:{}][Issued={}][Retired={}][InFlight={}][IPC={:.2}]",
                  perf_counters.cycle_cnt,
                  perf_counters.issue_cnt,
                  perf_counters.retired_cnt,
                  self.backend.in_flight().len(),
                  perf_counters.ipc()
            );
        }
    }

    /// Changes a latency. Only stations that start executing afterwards see
    /// the new value.
    pub fn set_latency(&mut self, opcode: Opcode, cycles: u32) -> Result<(), SimError> {
        self.latencies.set(opcode, cycles)
    }

    /// Reinitializes everything to its construction time state.
    pub fn reset(&mut self) {
        *self = CPU::build(&self.cpu_config);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }
}
