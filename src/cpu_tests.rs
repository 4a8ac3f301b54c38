use crate::backend::reservation_station::{RSKind, StationTag};
use crate::cpu::{CPUConfig, CPU};
use crate::error::SimError;
use crate::instructions::instructions::{Instr, InstrStatus, IssueRequest, Opcode, RegisterType, WordType};
use crate::snapshot::Snapshot;

#[cfg(test)]
mod tests {
    use super::*;

    const ADD1: StationTag = StationTag { kind: RSKind::AddSub, index: 0 };
    const ADD2: StationTag = StationTag { kind: RSKind::AddSub, index: 1 };
    const MUL1: StationTag = StationTag { kind: RSKind::MulDiv, index: 0 };

    #[test]
    fn test_raw_dependency_waits_for_broadcast() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::SUB, 4, 1, 5));
        assert_eq!(harness.perf().raw_stalls, 1);

        let sub = harness.snapshot().station(ADD2).cloned().unwrap();
        assert_eq!(sub.qj, Some(ADD1));
        assert_eq!(sub.vj, None);
        assert_eq!(sub.vk, Some(50));

        // cycle 3: ADD starts, SUB still waits
        harness.step();
        assert_eq!(harness.snapshot().station(ADD2).unwrap().qj, Some(ADD1));

        // cycle 4: ADD writes back and SUB captures the value
        harness.step();
        let snapshot = harness.snapshot();
        let sub = snapshot.station(ADD2).unwrap();
        assert_eq!(sub.qj, None);
        assert_eq!(sub.vj, Some(50));
        assert_eq!(snapshot.instruction(0).unwrap().writeback_cycle, Some(4));
        assert_eq!(snapshot.instruction(1).unwrap().execute_start_cycle, None);

        harness.run();
        let add = harness.instr(0);
        let sub = harness.instr(1);
        assert_eq!((add.issue_cycle, add.execute_start_cycle, add.execute_end_cycle, add.writeback_cycle),
                   (Some(1), Some(3), Some(4), Some(4)));
        assert!(sub.execute_start_cycle.unwrap() > add.writeback_cycle.unwrap());
        assert_eq!(sub.execute_start_cycle, Some(5));
        assert_eq!(sub.writeback_cycle, Some(6));
        harness.assert_reg_value(1, 50);
        harness.assert_reg_value(4, 0);
    }

    #[test]
    fn test_same_producer_for_both_operands() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::ADD, 4, 1, 1));
        assert_eq!(harness.perf().raw_stalls, 2);

        harness.run();
        harness.assert_reg_value(4, 100);
    }

    #[test]
    fn test_structural_hazard_on_fourth_add() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::ADD, 4, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::SUB, 5, 2, 3));
        let before = harness.snapshot();

        let result = harness.cpu.issue(IssueRequest::arith(Opcode::ADD, 6, 2, 3));
        assert_eq!(result, Err(SimError::StructuralHazard(RSKind::AddSub)));

        let mut after = harness.snapshot();
        assert_eq!(after.perf_counters.structural_hazards, 1);
        after.perf_counters.structural_hazards = 0;
        assert_eq!(after, before);
    }

    #[test]
    fn test_pools_fill_to_capacity_without_hazard() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::SUB, 1, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::MUL, 2, 3, 4));
        harness.issue(IssueRequest::arith(Opcode::DIV, 2, 3, 4));
        harness.issue(IssueRequest::load(5, 1));
        harness.issue(IssueRequest::store(6, 2));
        assert_eq!(harness.perf().structural_hazards, 0);

        let snapshot = harness.snapshot();
        for kind in RSKind::ALL {
            assert_eq!(snapshot.pool(kind).unwrap().utilization, 100.0);
        }

        assert_eq!(harness.cpu.issue(IssueRequest::arith(Opcode::MUL, 2, 3, 4)),
                   Err(SimError::StructuralHazard(RSKind::MulDiv)));
        assert_eq!(harness.cpu.issue(IssueRequest::load(5, 1)),
                   Err(SimError::StructuralHazard(RSKind::LoadStore)));
        assert_eq!(harness.perf().structural_hazards, 2);
    }

    #[test]
    fn test_waw_superseded_producer_does_not_write_register() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::MUL, 1, 2, 3));
        harness.issue(IssueRequest::arith(Opcode::SUB, 6, 1, 0));
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 4, 5));

        let perf = harness.perf();
        assert_eq!(perf.waw_eliminated, 1);
        assert_eq!(perf.raw_stalls, 1);
        assert_eq!(harness.snapshot().register(1).unwrap().producer, Some(ADD2));

        harness.run();

        // the MUL still reaches its consumer over the CDB
        harness.assert_reg_value(6, 600);
        harness.assert_reg_value(1, 90);
        let snapshot = harness.snapshot();
        assert!(snapshot.cdb.iter().any(|entry| entry.tag == MUL1 && entry.value == 600));
        assert_eq!(snapshot.register(1).unwrap().producer, None);
    }

    #[test]
    fn test_war_is_eliminated_by_renaming() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::DIV, 4, 1, 2));
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 6, 7));
        assert_eq!(harness.perf().war_eliminated, 1);
        assert_eq!(harness.perf().waw_eliminated, 0);

        harness.run();
        // DIV read R1 before the ADD overwrote it
        harness.assert_reg_value(4, 0);
        harness.assert_reg_value(1, 130);
    }

    #[test]
    fn test_load_address_register_is_not_a_source() {
        let mut harness = TestHarness::default();
        let mut load = IssueRequest::load(3, 12);
        load.src1 = Some(1);
        harness.issue(load);
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 6, 7));

        assert_eq!(harness.perf().war_eliminated, 0);
        assert_eq!(harness.instr(0).sources().count(), 0);
    }

    #[test]
    fn test_div_by_zero_yields_zero() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::DIV, 1, 2, 0));
        harness.run();

        harness.assert_reg_value(1, 0);
        let snapshot = harness.snapshot();
        assert_eq!(snapshot.instructions_completed, 1);
        let head = snapshot.cdb.first().unwrap();
        assert_eq!((head.tag, head.value), (MUL1, 0));
        assert_eq!(harness.instr(0).status, InstrStatus::COMPLETED);
    }

    #[test]
    fn test_immediate_operand() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith_imm(Opcode::ADD, 1, 2, 5));
        harness.issue(IssueRequest::arith_imm(Opcode::MUL, 3, 1, -2));
        harness.run();

        harness.assert_reg_value(1, 25);
        harness.assert_reg_value(3, -50);
    }

    #[test]
    fn test_load_reads_memory() {
        let mut harness = TestHarness::default();
        let expected = harness.cpu.memory_subsystem().load(5);
        harness.issue(IssueRequest::load(1, 5));
        harness.run();

        harness.assert_reg_value(1, expected);
        assert_eq!(harness.instr(0).execute_end_cycle, Some(4));
    }

    #[test]
    fn test_store_waits_for_value_and_does_not_broadcast() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::ADD, 3, 1, 2));
        harness.issue(IssueRequest::store(3, 8));

        let store = harness.snapshot().pool(RSKind::LoadStore).unwrap().stations[0].clone();
        assert_eq!(store.q(), Some(ADD1));
        assert_eq!(store.address, Some(8));

        harness.run();
        assert_eq!(harness.cpu.memory_subsystem().load(8), 30);

        let snapshot = harness.snapshot();
        assert_eq!(snapshot.cdb.len(), 1);
        assert_eq!(snapshot.cdb[0].tag, ADD1);
        assert_eq!(snapshot.instructions_completed, 2);
    }

    #[test]
    fn test_latency_of_one_completes_in_start_cycle() {
        let mut cpu_config = TestHarness::new_test_cpu_config();
        cpu_config.latencies.add = 1;
        let mut harness = TestHarness::with_config(cpu_config);

        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        harness.step();
        let add = harness.instr(0);
        assert_eq!((add.execute_start_cycle, add.execute_end_cycle, add.writeback_cycle),
                   (Some(2), Some(2), Some(2)));
    }

    #[test]
    fn test_latency_change_only_affects_unstarted_instructions() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        harness.step();

        harness.cpu.set_latency(Opcode::ADD, 5).unwrap();
        harness.issue(IssueRequest::arith(Opcode::ADD, 4, 2, 3));
        harness.run();

        let first = harness.instr(0);
        assert_eq!((first.execute_start_cycle, first.execute_end_cycle), (Some(2), Some(4)));
        let second = harness.instr(1);
        assert_eq!((second.execute_start_cycle, second.execute_end_cycle), (Some(4), Some(8)));
    }

    #[test]
    fn test_invalid_config_latency_is_rejected() {
        let mut cpu_config = TestHarness::new_test_cpu_config();
        cpu_config.latencies.add = 0;
        assert!(matches!(CPU::new(&cpu_config), Err(SimError::InvalidOperand(_))));

        cpu_config.latencies.add = 2;
        cpu_config.mul_div_rs_count = 0;
        assert!(matches!(CPU::new(&cpu_config), Err(SimError::InvalidOperand(_))));
    }

    #[test]
    fn test_invalid_latency_is_rejected() {
        let mut harness = TestHarness::default();
        assert!(matches!(harness.cpu.set_latency(Opcode::MUL, 0), Err(SimError::InvalidOperand(_))));
        assert!(matches!(harness.cpu.set_latency(Opcode::MUL, 101), Err(SimError::InvalidOperand(_))));
        assert_eq!(harness.cpu.latencies().mul, 10);
    }

    #[test]
    fn test_invalid_operands_leave_state_unchanged() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::ADD, 1, 2, 3));
        let before = harness.snapshot();

        assert!(matches!(harness.cpu.issue(IssueRequest::arith(Opcode::ADD, 9, 2, 3)), Err(SimError::InvalidOperand(_))));
        assert!(matches!(harness.cpu.issue(IssueRequest::load(1, 1000)), Err(SimError::InvalidOperand(_))));
        let mut no_operand = IssueRequest::arith(Opcode::SUB, 1, 2, 3);
        no_operand.src2 = None;
        assert!(matches!(harness.cpu.issue(no_operand), Err(SimError::InvalidOperand(_))));

        assert_eq!(harness.snapshot(), before);
    }

    #[test]
    fn test_cdb_log_keeps_last_ten() {
        let mut harness = TestHarness::default();
        for round in 0..4 {
            for k in 0..3 {
                harness.issue(IssueRequest::arith_imm(Opcode::ADD, k + 1, 0, (round * 3 + k) as WordType));
            }
            harness.run();
        }

        let snapshot = harness.snapshot();
        assert_eq!(snapshot.cdb.len(), 10);
        assert_eq!(snapshot.cdb[0].value, 11);
        assert!(snapshot.cdb.windows(2).all(|w| w[0].cycle >= w[1].cycle));
    }

    #[test]
    fn test_conservation_holds_every_step() {
        let mut harness = TestHarness::default();
        let program = [
            IssueRequest::arith(Opcode::ADD, 1, 2, 3),
            IssueRequest::arith(Opcode::SUB, 4, 1, 5),
            IssueRequest::arith(Opcode::MUL, 6, 4, 7),
            IssueRequest::arith(Opcode::ADD, 2, 6, 1),
            IssueRequest::store(2, 40),
            IssueRequest::load(3, 12),
        ];

        for request in program {
            while let Err(SimError::StructuralHazard(_)) = harness.cpu.issue(request) {
                harness.step();
            }
            harness.assert_conservation();
        }
        harness.run();

        // 50, 0, 0 * 70, 0 + 50
        harness.assert_reg_value(1, 50);
        harness.assert_reg_value(4, 0);
        harness.assert_reg_value(6, 0);
        harness.assert_reg_value(2, 50);
        assert_eq!(harness.cpu.memory_subsystem().load(40), 50);
    }

    #[test]
    fn test_cycle_stamps_are_deterministic() {
        let timeline = |seed: u64| {
            let mut cpu_config = TestHarness::new_test_cpu_config();
            cpu_config.memory_seed = Some(seed);
            let mut harness = TestHarness::with_config(cpu_config);
            harness.issue(IssueRequest::arith(Opcode::MUL, 1, 2, 3));
            harness.issue(IssueRequest::arith(Opcode::ADD, 4, 1, 5));
            harness.step();
            harness.issue(IssueRequest::arith(Opcode::DIV, 5, 4, 2));
            harness.issue(IssueRequest::arith(Opcode::SUB, 1, 7, 6));
            harness.run();
            harness.snapshot().timeline().into_iter().cloned().collect::<Vec<Instr>>()
        };

        assert_eq!(timeline(1), timeline(99));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut harness = TestHarness::default();
        harness.issue(IssueRequest::arith(Opcode::MUL, 1, 2, 3));
        harness.issue(IssueRequest::store(1, 3));
        harness.step();
        let _ = harness.cpu.issue(IssueRequest::store(1, 4));
        let _ = harness.cpu.issue(IssueRequest::store(1, 5));

        harness.cpu.reset();
        let first = harness.snapshot();
        harness.cpu.reset();
        let second = harness.snapshot();

        assert_eq!(first, second);
        assert_eq!(first, CPU::new(&harness.cpu_config).unwrap().snapshot());
        assert_eq!(first.cycle, 0);
        assert!(first.in_flight.is_empty() && first.completed.is_empty());
        assert_eq!(harness.cpu.memory_subsystem().cells(), CPU::new(&harness.cpu_config).unwrap().memory_subsystem().cells());
    }

    struct TestHarness {
        cpu: CPU,
        cpu_config: CPUConfig,
    }

    impl TestHarness {
        fn default() -> TestHarness {
            Self::with_config(Self::new_test_cpu_config())
        }

        fn with_config(cpu_config: CPUConfig) -> TestHarness {
            TestHarness {
                cpu: CPU::new(&cpu_config).unwrap(),
                cpu_config,
            }
        }

        fn new_test_cpu_config() -> CPUConfig {
            let mut cpu_config = CPUConfig::default();
            cpu_config.memory_seed = Some(2024);
            cpu_config
        }

        fn issue(&mut self, request: IssueRequest) -> Instr {
            match self.cpu.issue(request) {
                Ok(instr) => instr,
                Err(err) => panic!("issue of {:?} failed: {}", request, err),
            }
        }

        fn step(&mut self) {
            self.cpu.do_cycle();
            self.assert_conservation();
        }

        fn run(&mut self) {
            let mut steps = 0;
            while !self.cpu.is_drained() {
                self.step();
                steps += 1;
                assert!(steps < 10_000, "simulation did not drain");
            }
        }

        fn snapshot(&self) -> Snapshot {
            self.cpu.snapshot()
        }

        fn perf(&self) -> crate::cpu::PerfCounters {
            self.cpu.perf_counters().clone()
        }

        fn instr(&self, pc: u64) -> Instr {
            match self.snapshot().instruction(pc) {
                Some(instr) => instr.clone(),
                None => panic!("no instruction with pc {}", pc),
            }
        }

        fn assert_conservation(&self) {
            let backend = self.cpu.backend();
            let perf = self.cpu.perf_counters();
            assert_eq!(perf.issue_cnt, perf.retired_cnt + backend.in_flight().len() as u64);
            assert_eq!(backend.completed().len() as u64, perf.retired_cnt);
        }

        fn assert_reg_value(&self, reg: RegisterType, value: WordType) {
            let snapshot = self.snapshot();
            let register = snapshot.register(reg).unwrap();
            assert_eq!(register.producer, None, "R{} is still pending", reg);
            assert_eq!(register.value, value);
        }
    }
}
