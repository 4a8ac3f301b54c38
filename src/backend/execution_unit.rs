use crate::backend::reservation_station::{RSOperand, RS};
use crate::instructions::instructions::{Opcode, WordType};
use crate::memory_subsystem::memory_subsystem::MemorySubsystem;

/// The result of a station finishing its countdown.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Completion {
    // Value to broadcast on the CDB.
    Broadcast(WordType),
    // A store that has been written to memory; nothing is broadcast.
    Stored(WordType),
}

/// Can the station begin executing?
///
/// Arithmetic needs both operands, a STORE needs the value to store and a LOAD
/// only has an immediate address so it is always ready.
pub(crate) fn is_ready(rs: &RS) -> bool {
    match rs.opcode {
        None => false,
        Some(Opcode::LOAD) => true,
        Some(Opcode::STORE) => !rs.source[0].is_pending(),
        Some(_) => !rs.source[0].is_pending() && !rs.source[1].is_pending(),
    }
}

/// Performs the operation of a station whose countdown has expired.
pub(crate) fn execute(rs: &RS, memory_subsystem: &mut MemorySubsystem) -> Completion {
    let opcode = match rs.opcode {
        Some(opcode) => opcode,
        None => unreachable!("RS {} is executing without an opcode", rs.tag),
    };

    match opcode {
        Opcode::ADD => Completion::Broadcast(execute_add(operand(&rs.source[0]), operand(&rs.source[1]))),
        Opcode::SUB => Completion::Broadcast(execute_sub(operand(&rs.source[0]), operand(&rs.source[1]))),
        Opcode::MUL => Completion::Broadcast(execute_mul(operand(&rs.source[0]), operand(&rs.source[1]))),
        Opcode::DIV => Completion::Broadcast(execute_div(operand(&rs.source[0]), operand(&rs.source[1]))),
        Opcode::LOAD => {
            let addr = rs.address.unwrap_or_default();
            Completion::Broadcast(memory_subsystem.load(addr))
        }
        Opcode::STORE => {
            let addr = rs.address.unwrap_or_default();
            let value = operand(&rs.source[0]);
            memory_subsystem.store(addr, value);
            Completion::Stored(value)
        }
    }
}

fn operand(op: &RSOperand) -> WordType {
    debug_assert!(!op.is_pending(), "operand {} is still pending", op);
    op.value().unwrap_or_default()
}

pub(crate) fn execute_add(lhs: WordType, rhs: WordType) -> WordType {
    lhs.wrapping_add(rhs)
}

pub(crate) fn execute_sub(lhs: WordType, rhs: WordType) -> WordType {
    lhs.wrapping_sub(rhs)
}

pub(crate) fn execute_mul(lhs: WordType, rhs: WordType) -> WordType {
    lhs.wrapping_mul(rhs)
}

// Floor division. A zero divisor yields 0 instead of trapping.
pub(crate) fn execute_div(lhs: WordType, rhs: WordType) -> WordType {
    if rhs == 0 {
        return 0;
    }

    let quotient = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) != (rhs < 0)) {
        quotient - 1
    } else {
        quotient
    }
}
