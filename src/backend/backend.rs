use log::{debug, info, warn};

use crate::backend::cdb::{CDBEntry, CDB};
use crate::backend::execution_unit::{execute, is_ready, Completion};
use crate::backend::register_alias_table::{RegRead, RAT};
use crate::backend::reservation_station::{RSKind, RSOperand, RSTable, StationTag};
use crate::cpu::{CPUConfig, Latencies, PerfCounters, Trace};
use crate::error::SimError;
use crate::instructions::instructions::{Instr, InstrStatus, IssueRequest, Opcode, RegisterType, WordType};
use crate::memory_subsystem::memory_subsystem::MemorySubsystem;

fn table_index(kind: RSKind) -> usize {
    match kind {
        RSKind::AddSub => 0,
        RSKind::MulDiv => 1,
        RSKind::LoadStore => 2,
    }
}

fn find_instr(in_flight: &mut [Instr], pc: Option<u64>) -> Option<&mut Instr> {
    let pc = pc?;
    in_flight.iter_mut().find(|instr| instr.pc == pc)
}

// Reads a source register through the RAT. A pending register is a RAW
// dependency: the station waits for the producer's broadcast.
fn rename_source(rat: &RAT, reg: RegisterType, perf_counters: &mut PerfCounters) -> RSOperand {
    match rat.read(reg) {
        RegRead::Ready(value) => RSOperand::Value(value),
        RegRead::Pending(tag) => {
            perf_counters.raw_stalls += 1;
            RSOperand::Pending(tag)
        }
    }
}

/// The scheduling core: reservation station pools, the RAT and the CDB, plus
/// the in-flight and completed instruction lists.
pub struct Backend {
    rs_tables: [RSTable; 3],
    pub(crate) rat: RAT,
    pub(crate) cdb: CDB,
    in_flight: Vec<Instr>,
    completed: Vec<Instr>,
    next_pc: u64,
    trace: Trace,
}

impl Backend {
    pub(crate) fn new(cpu_config: &CPUConfig) -> Backend {
        Backend {
            rs_tables: [
                RSTable::new(RSKind::AddSub, cpu_config.add_sub_rs_count),
                RSTable::new(RSKind::MulDiv, cpu_config.mul_div_rs_count),
                RSTable::new(RSKind::LoadStore, cpu_config.load_store_rs_count),
            ],
            rat: RAT::new(),
            cdb: CDB::new(cpu_config.cdb_log_capacity),
            in_flight: Vec::new(),
            completed: Vec::new(),
            next_pc: 0,
            trace: cpu_config.trace.clone(),
        }
    }

    pub fn rs_table(&self, kind: RSKind) -> &RSTable {
        &self.rs_tables[table_index(kind)]
    }

    pub fn rs_tables(&self) -> impl Iterator<Item=&RSTable> {
        self.rs_tables.iter()
    }

    pub fn in_flight(&self) -> &[Instr] {
        &self.in_flight
    }

    pub fn completed(&self) -> &[Instr] {
        &self.completed
    }

    pub fn is_drained(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Issues a request into a free reservation station of its class.
    ///
    /// The request must already be validated. On success the clock advances by
    /// one cycle, the source operands are read through the RAT and the
    /// destination register is renamed to the station. Without a free station
    /// nothing changes except the structural hazard counter.
    pub(crate) fn issue(&mut self, request: &IssueRequest, perf_counters: &mut PerfCounters) -> Result<Instr, SimError> {
        let kind = request.opcode.rs_kind();
        let table = &mut self.rs_tables[table_index(kind)];
        let rs_index = match table.allocate() {
            Some(rs_index) => rs_index,
            None => {
                perf_counters.structural_hazards += 1;
                warn!("Structural hazard: no free {} reservation station for {}", kind, request.opcode);
                return Err(SimError::StructuralHazard(kind));
            }
        };
        let tag = StationTag { kind, index: rs_index };

        perf_counters.cycle_cnt += 1;
        let cycle = perf_counters.cycle_cnt;

        let mut instr = Instr::new(self.next_pc, request);
        self.next_pc += 1;
        instr.issue_cycle = Some(cycle);
        instr.status = InstrStatus::ISSUED;
        instr.rs_tag = Some(tag);

        // Overwriting a register an earlier in-flight instruction still reads
        // is a WAR hazard; the reader already holds its operand so no stall.
        if let Some(dest) = instr.dest {
            if self.in_flight.iter().any(|other| other.sources().any(|src| src == dest)) {
                perf_counters.war_eliminated += 1;
            }
        }

        let rs = table.get_mut(rs_index);
        rs.opcode = Some(instr.opcode);
        rs.dest = instr.dest;
        rs.instr_pc = Some(instr.pc);

        match instr.opcode {
            Opcode::LOAD => {
                rs.address = instr.address;
            }
            Opcode::STORE => {
                rs.address = instr.address;
                if let Some(src) = instr.src1 {
                    rs.source[0] = rename_source(&self.rat, src, perf_counters);
                }
            }
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV => {
                if let Some(src1) = instr.src1 {
                    rs.source[0] = rename_source(&self.rat, src1, perf_counters);
                }
                rs.source[1] = match instr.src2 {
                    Some(src2) => rename_source(&self.rat, src2, perf_counters),
                    None => RSOperand::Value(instr.immediate.unwrap_or_default()),
                };
            }
        }

        // Register renaming of the sink.
        if let Some(dest) = instr.dest {
            if self.rat.mark_pending(dest, tag) {
                perf_counters.waw_eliminated += 1;
            }
        }

        if self.trace.issue {
            info!("[Cycle {}] Issued [{}] into {}", cycle, instr, tag);
        }

        perf_counters.issue_cnt += 1;
        self.in_flight.push(instr.clone());
        Ok(instr)
    }

    /// Advances every busy station by one cycle. The caller has already moved
    /// the clock to `cycle`.
    pub(crate) fn do_cycle(&mut self,
                           cycle: u64,
                           latencies: &Latencies,
                           memory_subsystem: &mut MemorySubsystem,
                           perf_counters: &mut PerfCounters) {
        self.cycle_execute_start(cycle, latencies);
        self.cycle_countdown(cycle, memory_subsystem, perf_counters);
    }

    // Stations whose operands were resolved before this cycle began start
    // executing. Operands captured from a broadcast later in this cycle only
    // become usable next cycle.
    fn cycle_execute_start(&mut self, cycle: u64, latencies: &Latencies) {
        for table in self.rs_tables.iter_mut() {
            for rs in table.iter_mut() {
                if !rs.is_busy() || rs.executing || !is_ready(rs) {
                    continue;
                }

                let opcode = match rs.opcode {
                    Some(opcode) => opcode,
                    None => continue,
                };

                rs.executing = true;
                rs.cycles_remaining = latencies.get(opcode);

                if let Some(instr) = find_instr(&mut self.in_flight, rs.instr_pc) {
                    instr.execute_start_cycle = Some(cycle);
                    instr.status = InstrStatus::EXECUTING;

                    if self.trace.execute {
                        info!("[Cycle {}] Executing [{}] on {} for {} cycles", cycle, instr, rs.tag, rs.cycles_remaining);
                    }
                }
            }
        }
    }

    fn cycle_countdown(&mut self,
                       cycle: u64,
                       memory_subsystem: &mut MemorySubsystem,
                       perf_counters: &mut PerfCounters) {
        for kind in RSKind::ALL {
            let capacity = self.rs_table(kind).capacity;
            for rs_index in 0..capacity {
                let rs = self.rs_tables[table_index(kind)].get_mut(rs_index);
                if !rs.is_busy() || !rs.executing {
                    continue;
                }

                debug_assert!(rs.cycles_remaining > 0);
                rs.cycles_remaining -= 1;
                if rs.cycles_remaining > 0 {
                    // the station isn't finished with its work
                    continue;
                }

                let completion = execute(rs, memory_subsystem);
                self.write_back(StationTag { kind, index: rs_index }, cycle, completion, perf_counters);
            }
        }
    }

    fn write_back(&mut self, tag: StationTag, cycle: u64, completion: Completion, perf_counters: &mut PerfCounters) {
        let rs = self.rs_tables[table_index(tag.kind)].get(tag.index);
        let dest = rs.dest;
        let instr_pc = rs.instr_pc;

        if let Some(instr) = find_instr(&mut self.in_flight, instr_pc) {
            instr.execute_end_cycle = Some(cycle);
            instr.status = InstrStatus::WRITEBACK;
        }

        match completion {
            Completion::Broadcast(value) => self.cdb_broadcast(cycle, tag, dest, value),
            Completion::Stored(value) => {
                if self.trace.broadcast {
                    info!("[Cycle {}] {} stored value {}", cycle, tag, value);
                }
            }
        }

        self.retire(tag, cycle, perf_counters);
    }

    // Puts the result on the CDB: every station waiting on `tag` captures the
    // value, and the destination register is written only if `tag` is still
    // its designated producer.
    fn cdb_broadcast(&mut self, cycle: u64, tag: StationTag, dest: Option<RegisterType>, value: WordType) {
        self.cdb.record(CDBEntry { cycle, tag, value });

        if self.trace.broadcast {
            info!("[Cycle {}] {} broadcasts value {}", cycle, tag, value);
        }

        for table in self.rs_tables.iter_mut() {
            for rs in table.iter_mut() {
                if !rs.is_busy() {
                    continue;
                }

                let captured = rs.capture(tag, value);
                if captured > 0 {
                    debug!("{} captured {} from {}", rs.tag, value, tag);
                }
            }
        }

        if let Some(dest) = dest {
            if !self.rat.resolve(dest, tag, value) {
                debug!("{} no longer produces R{}, register write suppressed", tag, dest);
            }
        }
    }

    fn retire(&mut self, tag: StationTag, cycle: u64, perf_counters: &mut PerfCounters) {
        let table = &mut self.rs_tables[table_index(tag.kind)];
        let instr_pc = table.get(tag.index).instr_pc;
        table.deallocate(tag.index);

        let position = match instr_pc.and_then(|pc| self.in_flight.iter().position(|instr| instr.pc == pc)) {
            Some(position) => position,
            None => return,
        };

        let mut instr = self.in_flight.remove(position);
        instr.writeback_cycle = Some(cycle);
        instr.status = InstrStatus::COMPLETED;

        if self.trace.retire {
            info!("[Cycle {}] Retiring [{}]", cycle, instr);
        }

        perf_counters.retired_cnt += 1;
        self.completed.push(instr);
    }
}
