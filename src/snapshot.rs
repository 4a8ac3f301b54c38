//! Read-only views of the engine state.
//!
//! A [`Snapshot`] owns copies of everything it shows, so whatever renders it
//! can't reach back into the engine.

use std::fmt;

use serde::Serialize;

use crate::backend::cdb::CDBEntry;
use crate::backend::reservation_station::{RSKind, RSTable, StationTag, RS};
use crate::cpu::{PerfCounters, CPU};
use crate::instructions::instructions::{register_name, Instr, MemoryType, Opcode, RegisterType, WordType};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StationView {
    pub tag: StationTag,
    pub busy: bool,
    pub op: Option<Opcode>,
    pub vj: Option<WordType>,
    pub vk: Option<WordType>,
    pub qj: Option<StationTag>,
    pub qk: Option<StationTag>,
    pub address: Option<MemoryType>,
    pub dest: Option<RegisterType>,
    pub cycles_remaining: u8,
    pub instr_pc: Option<u64>,
}

impl StationView {
    fn new(rs: &RS) -> Self {
        Self {
            tag: rs.tag,
            busy: rs.is_busy(),
            op: rs.opcode,
            vj: rs.source[0].value(),
            vk: rs.source[1].value(),
            qj: rs.source[0].tag(),
            qk: rs.source[1].tag(),
            address: rs.address,
            dest: rs.dest,
            cycles_remaining: rs.cycles_remaining,
            instr_pc: rs.instr_pc,
        }
    }

    // Load/store stations show their single data operand as (value, q).
    pub fn value(&self) -> Option<WordType> {
        self.vj
    }

    pub fn q(&self) -> Option<StationTag> {
        self.qj
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PoolView {
    pub kind: RSKind,
    pub stations: Vec<StationView>,
    // percentage of busy stations
    pub utilization: f64,
}

impl PoolView {
    fn new(table: &RSTable) -> Self {
        let utilization = if table.capacity == 0 {
            0.0
        } else {
            table.busy_count() as f64 * 100.0 / table.capacity as f64
        };

        Self {
            kind: table.kind,
            stations: table.iter().map(StationView::new).collect(),
            utilization,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegisterView {
    pub name: String,
    pub value: WordType,
    pub producer: Option<StationTag>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub cycle: u64,
    pub instructions_issued: u64,
    pub instructions_completed: u64,
    pub ipc: f64,
    pub pools: Vec<PoolView>,
    pub registers: Vec<RegisterView>,
    pub cdb: Vec<CDBEntry>,
    pub in_flight: Vec<Instr>,
    pub completed: Vec<Instr>,
    pub perf_counters: PerfCounters,
}

impl Snapshot {
    pub(crate) fn capture(cpu: &CPU) -> Self {
        let backend = cpu.backend();
        let perf_counters = cpu.perf_counters().clone();

        let registers = (0..backend.rat.len() as RegisterType)
            .map(|reg| RegisterView {
                name: register_name(reg),
                value: backend.rat.value(reg),
                producer: backend.rat.producer(reg),
            })
            .collect();

        Self {
            cycle: perf_counters.cycle_cnt,
            instructions_issued: perf_counters.issue_cnt,
            instructions_completed: perf_counters.retired_cnt,
            ipc: perf_counters.ipc(),
            pools: backend.rs_tables().map(PoolView::new).collect(),
            registers,
            cdb: backend.cdb.entries().copied().collect(),
            in_flight: backend.in_flight().to_vec(),
            completed: backend.completed().to_vec(),
            perf_counters,
        }
    }

    pub fn pool(&self, kind: RSKind) -> Option<&PoolView> {
        self.pools.iter().find(|pool| pool.kind == kind)
    }

    pub fn station(&self, tag: StationTag) -> Option<&StationView> {
        self.pool(tag.kind)?.stations.get(tag.index as usize)
    }

    pub fn register(&self, reg: RegisterType) -> Option<&RegisterView> {
        self.registers.get(reg as usize)
    }

    pub fn instruction(&self, pc: u64) -> Option<&Instr> {
        self.in_flight.iter().chain(self.completed.iter()).find(|instr| instr.pc == pc)
    }

    /// All instructions ordered by program counter.
    pub fn timeline(&self) -> Vec<&Instr> {
        let mut timeline: Vec<&Instr> = self.in_flight.iter().chain(self.completed.iter()).collect();
        timeline.sort_by_key(|instr| instr.pc);
        timeline
    }
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cycle {} | issued {} | completed {} | IPC {:.2}",
                 self.cycle, self.instructions_issued, self.instructions_completed, self.ipc)?;

        for pool in &self.pools {
            writeln!(f, "{} stations ({:.0}% busy)", pool.kind, pool.utilization)?;
            for station in &pool.stations {
                if !station.busy {
                    writeln!(f, "  {:<6} free", station.tag.to_string())?;
                    continue;
                }

                let op = opt(&station.op);
                match pool.kind {
                    RSKind::LoadStore => writeln!(f, "  {:<6} {:<5} addr={} value={} q={} left={}",
                                                  station.tag.to_string(), op, opt(&station.address),
                                                  opt(&station.value()), opt(&station.q()), station.cycles_remaining)?,
                    _ => writeln!(f, "  {:<6} {:<5} vj={} vk={} qj={} qk={} left={}",
                                  station.tag.to_string(), op, opt(&station.vj), opt(&station.vk),
                                  opt(&station.qj), opt(&station.qk), station.cycles_remaining)?,
                }
            }
        }

        write!(f, "Registers:")?;
        for reg in &self.registers {
            match reg.producer {
                Some(tag) => write!(f, " {}={}({})", reg.name, reg.value, tag)?,
                None => write!(f, " {}={}", reg.name, reg.value)?,
            }
        }
        writeln!(f)?;

        if let Some(head) = self.cdb.first() {
            writeln!(f, "CDB: cycle {} {} broadcasts {}", head.cycle, head.tag, head.value)?;
        }

        for instr in self.timeline() {
            writeln!(f, "  #{:<3} {:<20} issue={} start={} end={} wb={} {}",
                     instr.pc, instr.to_string(), opt(&instr.issue_cycle), opt(&instr.execute_start_cycle),
                     opt(&instr.execute_end_cycle), opt(&instr.writeback_cycle), instr.status)?;
        }

        let perf = &self.perf_counters;
        write!(f, "Hazards: structural={} raw={} war_eliminated={} waw_eliminated={}",
               perf.structural_hazards, perf.raw_stalls, perf.war_eliminated, perf.waw_eliminated)
    }
}

