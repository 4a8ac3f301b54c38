//! A cycle level model of Tomasulo's dynamic scheduling algorithm.
//!
//! Instructions are issued one at a time into reservation stations, their
//! destination registers are renamed through the register alias table, and
//! results reach waiting stations and registers over the common data bus.
//! [`cpu::CPU`] is the engine; [`driver::Driver`] paces it by single steps or
//! by an auto-run clock.

pub mod backend;
pub mod cpu;
pub mod driver;
pub mod error;
pub mod instructions;
pub mod loader;
pub mod memory_subsystem;
pub mod snapshot;

#[cfg(test)]
mod cpu_tests;
