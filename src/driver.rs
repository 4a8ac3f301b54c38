use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;

use crate::cpu::{CPUConfig, CPU};
use crate::error::SimError;
use crate::instructions::instructions::{Instr, IssueRequest, Opcode};
use crate::snapshot::Snapshot;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum RunState {
    Idle,
    SingleStepping,
    AutoRunning,
}

/// Background clock for auto-run. Every period it sends its generation over
/// the channel until cancelled.
struct Ticker {
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    fn spawn(period: Duration, generation: u64, tick_tx: Sender<u64>) -> Ticker {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let handle = thread::spawn(move || {
            loop {
                let deadline = Instant::now() + period;
                loop {
                    if flag.load(Ordering::Acquire) {
                        return;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    thread::park_timeout(deadline - now);
                }

                if tick_tx.send(generation).is_err() {
                    return;
                }
            }
        });

        Ticker { cancelled, handle: Some(handle) }
    }

    // Returns once the ticker thread has exited.
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owns the engine and paces it, either one step at a time on request or from
/// the auto-run ticker.
///
/// Ticks carry the generation they were started under. `stop` and `reset`
/// cancel the ticker and bump the generation, so a tick that was already
/// queued can never touch the stopped or freshly reset engine.
pub struct Driver {
    cpu: CPU,
    state: RunState,
    ticker: Option<Ticker>,
    generation: u64,
    tick_tx: Sender<u64>,
    tick_rx: Receiver<u64>,
    cycle_period: Duration,
}

impl Driver {
    pub fn new(cpu_config: &CPUConfig) -> Result<Driver, SimError> {
        let cpu = CPU::new(cpu_config)?;
        let (tick_tx, tick_rx) = channel();
        Ok(Driver {
            cpu,
            state: RunState::Idle,
            ticker: None,
            generation: 0,
            tick_tx,
            tick_rx,
            cycle_period: cpu_config.cycle_period(),
        })
    }

    pub fn cpu(&self) -> &CPU {
        &self.cpu
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::AutoRunning
    }

    pub fn is_drained(&self) -> bool {
        self.cpu.is_drained()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.cpu.snapshot()
    }

    pub fn issue(&mut self, request: IssueRequest) -> Result<Instr, SimError> {
        self.cpu.issue(request)
    }

    /// Latencies may only change before anything has been issued.
    pub fn set_latency(&mut self, opcode: Opcode, cycles: u32) -> Result<(), SimError> {
        if self.cpu.perf_counters().issue_cnt > 0 {
            return Err(SimError::ConfigLocked);
        }
        self.cpu.set_latency(opcode, cycles)
    }

    /// Advances exactly one cycle, whatever the run state. An auto-run stops
    /// by itself once nothing is in flight.
    pub fn step(&mut self) -> Snapshot {
        if self.state == RunState::Idle {
            self.state = RunState::SingleStepping;
        }

        self.cpu.do_cycle();

        if self.state == RunState::AutoRunning && self.cpu.is_drained() {
            info!("No instructions in flight, stopping auto-run at cycle {}", self.cpu.cycle());
            self.stop();
        }

        self.cpu.snapshot()
    }

    /// Starts auto-running. Returns false if it was already running; there is
    /// never more than one ticker.
    pub fn start(&mut self) -> bool {
        if self.state == RunState::AutoRunning {
            return false;
        }

        self.ticker = Some(Ticker::spawn(self.cycle_period, self.generation, self.tick_tx.clone()));
        self.state = RunState::AutoRunning;
        debug!("Auto-run started, generation {}", self.generation);
        true
    }

    pub fn stop(&mut self) {
        self.cancel_ticker();
        if self.state == RunState::AutoRunning {
            self.state = RunState::Idle;
        }
    }

    pub fn toggle_run(&mut self) -> RunState {
        if self.is_running() {
            self.stop();
        } else {
            self.start();
        }
        self.state
    }

    /// Cancels any auto-run and reinitializes the engine.
    pub fn reset(&mut self) -> Snapshot {
        self.cancel_ticker();
        self.cpu.reset();
        self.state = RunState::Idle;
        self.cpu.snapshot()
    }

    /// Waits up to `timeout` for the auto-run clock and performs at most one
    /// step. Ticks that piled up are coalesced and stale ticks are dropped.
    pub fn wait_tick(&mut self, timeout: Duration) -> Option<Snapshot> {
        if self.state != RunState::AutoRunning {
            return None;
        }

        let first = match self.tick_rx.recv_timeout(timeout) {
            Ok(generation) => generation,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
        };

        let mut current = first == self.generation;
        while let Ok(generation) = self.tick_rx.try_recv() {
            current |= generation == self.generation;
        }

        if !current {
            debug!("Dropping stale tick");
            return None;
        }

        Some(self.step())
    }

    /// Auto-runs until nothing is in flight and returns the final snapshot.
    pub fn run_to_completion(&mut self) -> Snapshot {
        self.start();
        let timeout = self.cycle_period * 2 + Duration::from_millis(100);
        while self.is_running() {
            if let Some(snapshot) = self.wait_tick(timeout) {
                debug!("Auto-run tick, cycle {}", snapshot.cycle);
            }
        }
        self.cpu.snapshot()
    }

    fn cancel_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
            self.generation += 1;
        }
    }
}
