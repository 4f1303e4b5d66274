//! # Executor
//!
//! `step` executes exactly one instruction and returns a `StepOutcome`. It
//! is a pure function of `VmState` (plus the memory it owns), so the
//! interactive REPL and the DAP run loop can share it without either one
//! knowing about the other.

use super::decoder::{self, Decoded};
use super::state::{VmState, FLAG_MINUS, FLAG_OVERFLOW, FLAG_ZERO};
use crate::isa::DecodedShape;
use thiserror::Error;

pub const SVC_IN: u16 = 0xFFF0;
pub const SVC_OUT: u16 = 0xFFF2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The outermost `RET` unwound past `STACK_TOP`: a clean program exit.
    Ret,
    Svc(SvcTermination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvcTermination {
    User,
    Overflow,
    DivZero,
    RangeOver,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Continue,
    /// `SVC 0xFFF0` was executed; the caller must supply a line of input
    /// via [`apply_input`] before stepping again.
    AwaitInput,
    /// `SVC 0xFFF2` produced output text for the session's output sink.
    Output(String),
    Finished(FinishReason),
    StackOverflow { pc: u16, sp: u16 },
    StackUnderflow { pc: u16, sp: u16 },
    IllegalInstruction { pc: u16, opcode: u8 },
}

/// The subset of [`StepOutcome`] that halts the VM for a reason other than a
/// clean program finish, with a human-readable message for the DAP session's
/// `stopped{reason:"exception"}` event.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    #[error("stack overflow at pc={pc:#06X} sp={sp:#06X}")]
    StackOverflow { pc: u16, sp: u16 },
    #[error("stack underflow at pc={pc:#06X} sp={sp:#06X}")]
    StackUnderflow { pc: u16, sp: u16 },
    #[error("illegal instruction {opcode:#04X} at pc={pc:#06X}")]
    IllegalInstruction { pc: u16, opcode: u8 },
}

impl StepOutcome {
    /// `Some` for the fault outcomes a DAP session reports as
    /// `stopped{reason:"exception"}`; `None` for `Continue`, `AwaitInput`,
    /// `Output`, and a clean `Finished`.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match *self {
            StepOutcome::StackOverflow { pc, sp } => Some(TerminationReason::StackOverflow { pc, sp }),
            StepOutcome::StackUnderflow { pc, sp } => Some(TerminationReason::StackUnderflow { pc, sp }),
            StepOutcome::IllegalInstruction { pc, opcode } => {
                Some(TerminationReason::IllegalInstruction { pc, opcode })
            }
            _ => None,
        }
    }
}

fn flags_for(result: u16) -> u8 {
    if result == 0 {
        FLAG_ZERO
    } else if result & 0x8000 != 0 {
        FLAG_MINUS
    } else {
        0
    }
}

pub fn step(state: &mut VmState) -> StepOutcome {
    let pc = state.pc;
    let word = state.read(pc);
    let Some(decoded) = decoder::decode(word) else {
        return StepOutcome::IllegalInstruction { pc, opcode: (word >> 8) as u8 };
    };

    match decoded.shape {
        DecodedShape::RegAddr | DecodedShape::Addr => execute_two_word(state, pc, &decoded),
        DecodedShape::RegReg => execute_regreg(state, pc, &decoded),
        DecodedShape::Reg => execute_reg(state, pc, &decoded),
        DecodedShape::None => execute_none(state, pc, &decoded),
    }
}

fn execute_two_word(state: &mut VmState, pc: u16, d: &Decoded) -> StepOutcome {
    let adr = state.read(pc.wrapping_add(1));
    let eadr = decoder::effective_address(adr, d.r2_or_index, &state.gr);
    let next_pc = pc.wrapping_add(2);

    match d.mnemonic {
        "LD" => {
            let value = state.read(eadr);
            state.gr[d.r1 as usize] = value;
            state.fr = flags_for(value);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "ST" => {
            state.write(eadr, state.gr[d.r1 as usize]);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "LAD" => {
            state.gr[d.r1 as usize] = eadr;
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "ADDA" | "SUBA" => {
            let a = state.gr[d.r1 as usize] as i16 as i32;
            let b = state.read(eadr) as i16 as i32;
            let raw = if d.mnemonic == "ADDA" { a + b } else { a - b };
            let overflow = !(-32768..=32767).contains(&raw);
            let result = raw as u32 as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "ADDL" | "SUBL" => {
            let a = state.gr[d.r1 as usize] as i64;
            let b = state.read(eadr) as i64;
            let raw = if d.mnemonic == "ADDL" { a + b } else { a - b };
            let overflow = !(0..=0xFFFF).contains(&raw);
            let result = raw as u32 as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "MULA" => {
            let a = state.gr[d.r1 as usize] as i16 as i64;
            let b = state.read(eadr) as i16 as i64;
            let product = a * b;
            let overflow = !(-32768..=32767).contains(&product);
            let result = product as u32 as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "MULL" => {
            let a = state.gr[d.r1 as usize] as u64;
            let b = state.read(eadr) as u64;
            let product = a * b;
            let overflow = product > 0xFFFF;
            let result = product as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "DIVA" => {
            let divisor = state.read(eadr) as i16;
            if divisor == 0 {
                state.fr = FLAG_OVERFLOW | FLAG_ZERO;
                log::info!("DIVA by zero at {:#06X}: GR{} unchanged", pc, d.r1);
            } else {
                let a = state.gr[d.r1 as usize] as i16 as i32;
                let quotient = a / divisor as i32;
                let overflow = !(-32768..=32767).contains(&quotient);
                let result = quotient as u32 as u16;
                state.gr[d.r1 as usize] = result;
                state.fr = flags_for(result);
                state.set_overflow(overflow);
            }
            state.pc = next_pc;
            StepOutcome::Continue
        }
        // checked_div doesn't fit: the zero branch sets flags and logs, not just skips the division.
        #[allow(clippy::manual_checked_ops)]
        "DIVL" => {
            let divisor = state.read(eadr);
            if divisor == 0 {
                state.fr = FLAG_OVERFLOW | FLAG_ZERO;
                log::info!("DIVL by zero at {:#06X}: GR{} unchanged", pc, d.r1);
            } else {
                let a = state.gr[d.r1 as usize];
                let result = a / divisor;
                state.gr[d.r1 as usize] = result;
                state.fr = flags_for(result);
                state.set_overflow(false);
            }
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "AND" | "OR" | "XOR" => {
            let a = state.gr[d.r1 as usize];
            let b = state.read(eadr);
            let result = match d.mnemonic {
                "AND" => a & b,
                "OR" => a | b,
                _ => a ^ b,
            };
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "CPA" => {
            let a = state.gr[d.r1 as usize] as i16 as i32;
            let b = state.read(eadr) as i16 as i32;
            let clamped = (a - b).clamp(-32768, 32767);
            state.fr = flags_for(clamped as u32 as u16);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "CPL" => {
            let a = state.gr[d.r1 as usize] as i32;
            let b = state.read(eadr) as i32;
            let clamped = (a - b).clamp(-32768, 32767);
            state.fr = flags_for(clamped as u32 as u16);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "SLA" | "SRA" | "SLL" | "SRL" => {
            let count = eadr & 0xF;
            let (result, overflow) = shift(d.mnemonic, state.gr[d.r1 as usize], count);
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "JMI" => jump(state, state.flag(FLAG_MINUS), eadr, next_pc),
        "JNZ" => jump(state, !state.flag(FLAG_ZERO), eadr, next_pc),
        "JZE" => jump(state, state.flag(FLAG_ZERO), eadr, next_pc),
        "JUMP" => jump(state, true, eadr, next_pc),
        "JPL" => jump(state, !state.flag(FLAG_MINUS) && !state.flag(FLAG_ZERO), eadr, next_pc),
        "JOV" => jump(state, state.flag(FLAG_OVERFLOW), eadr, next_pc),
        "PUSH" => {
            let sp = state.sp.wrapping_sub(1);
            if sp <= state.address_max {
                return StepOutcome::StackOverflow { pc, sp };
            }
            state.sp = sp;
            state.write(sp, eadr);
            state.pc = next_pc;
            StepOutcome::Continue
        }
        "CALL" => {
            let sp = state.sp.wrapping_sub(1);
            if sp <= state.address_max {
                return StepOutcome::StackOverflow { pc, sp };
            }
            state.sp = sp;
            state.write(sp, next_pc);
            state.pc = eadr;
            StepOutcome::Continue
        }
        _ if d.mnemonic == "SVC" => execute_svc(state, eadr, next_pc),
        mnemonic => unreachable!("unhandled two-word mnemonic {mnemonic}"),
    }
}

fn jump(state: &mut VmState, taken: bool, eadr: u16, next_pc: u16) -> StepOutcome {
    state.pc = if taken { eadr } else { next_pc };
    StepOutcome::Continue
}

fn execute_svc(state: &mut VmState, eadr: u16, next_pc: u16) -> StepOutcome {
    state.pc = next_pc;
    match eadr {
        SVC_IN => StepOutcome::AwaitInput,
        SVC_OUT => {
            let buffer = state.gr[1];
            let length = state.read(state.gr[2]) as usize;
            let mut text = String::with_capacity(length);
            for i in 0..length {
                let byte = (state.read(buffer.wrapping_add(i as u16)) & 0xFF) as u8;
                text.push(byte as char);
            }
            if !text.ends_with('\n') {
                text.push('\n');
            }
            StepOutcome::Output(text)
        }
        0 => StepOutcome::Finished(FinishReason::Svc(SvcTermination::User)),
        1 => StepOutcome::Finished(FinishReason::Svc(SvcTermination::Overflow)),
        2 => StepOutcome::Finished(FinishReason::Svc(SvcTermination::DivZero)),
        3 => StepOutcome::Finished(FinishReason::Svc(SvcTermination::RangeOver)),
        other => StepOutcome::IllegalInstruction { pc: state.pc.wrapping_sub(2), opcode: (other >> 8) as u8 },
    }
}

/// Apply a line of input after `step` returned `AwaitInput`, following the
/// IN convention: truncate to 256 characters after trimming, write the
/// count to `*GR2` and the characters to `*GR1..`.
pub fn apply_input(state: &mut VmState, line: &str) {
    let trimmed = line.trim();
    let truncated: &str = if trimmed.len() > 256 { &trimmed[..256] } else { trimmed };
    let buffer = state.gr[1];
    let length_addr = state.gr[2];
    state.write(length_addr, truncated.chars().count() as u16);
    for (i, ch) in truncated.chars().enumerate() {
        state.write(buffer.wrapping_add(i as u16), ch as u16);
    }
}

fn shift(mnemonic: &str, value: u16, count: u16) -> (u16, bool) {
    let mut v = value;
    let mut overflow_bit = false;
    for _ in 0..count {
        overflow_bit = match mnemonic {
            "SLA" => {
                let sign = v & 0x8000;
                let bit14 = (v >> 14) & 1 != 0;
                v = sign | ((v << 1) & 0x7FFF);
                bit14
            }
            "SRA" => {
                let bit0 = v & 1 != 0;
                v = ((v as i16) >> 1) as u16;
                bit0
            }
            "SLL" => {
                let bit15 = (v >> 15) & 1 != 0;
                v <<= 1;
                bit15
            }
            "SRL" => {
                let bit0 = v & 1 != 0;
                v >>= 1;
                bit0
            }
            _ => unreachable!("shift called with non-shift mnemonic"),
        };
    }
    (v, overflow_bit)
}

fn execute_regreg(state: &mut VmState, pc: u16, d: &Decoded) -> StepOutcome {
    let next_pc = pc.wrapping_add(1);
    let b = state.gr[d.r2_or_index as usize];

    match d.mnemonic {
        "LD" => {
            state.gr[d.r1 as usize] = b;
            state.fr = flags_for(b);
        }
        "ADDA" | "SUBA" => {
            let a = state.gr[d.r1 as usize] as i16 as i32;
            let b = b as i16 as i32;
            let raw = if d.mnemonic == "ADDA" { a + b } else { a - b };
            let overflow = !(-32768..=32767).contains(&raw);
            let result = raw as u32 as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
        }
        "ADDL" | "SUBL" => {
            let a = state.gr[d.r1 as usize] as i64;
            let b = b as i64;
            let raw = if d.mnemonic == "ADDL" { a + b } else { a - b };
            let overflow = !(0..=0xFFFF).contains(&raw);
            let result = raw as u32 as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
        }
        "MULA" => {
            let a = state.gr[d.r1 as usize] as i16 as i64;
            let bb = b as i16 as i64;
            let product = a * bb;
            let overflow = !(-32768..=32767).contains(&product);
            let result = product as u32 as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
        }
        "MULL" => {
            let a = state.gr[d.r1 as usize] as u64;
            let bb = b as u64;
            let product = a * bb;
            let overflow = product > 0xFFFF;
            let result = product as u16;
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
            state.set_overflow(overflow);
        }
        "DIVA" => {
            let divisor = b as i16;
            if divisor == 0 {
                state.fr = FLAG_OVERFLOW | FLAG_ZERO;
                log::info!("DIVA by zero at {:#06X}: GR{} unchanged", pc, d.r1);
            } else {
                let a = state.gr[d.r1 as usize] as i16 as i32;
                let quotient = a / divisor as i32;
                let overflow = !(-32768..=32767).contains(&quotient);
                let result = quotient as u32 as u16;
                state.gr[d.r1 as usize] = result;
                state.fr = flags_for(result);
                state.set_overflow(overflow);
            }
        }
        // checked_div doesn't fit: the zero branch sets flags and logs, not just skips the division.
        #[allow(clippy::manual_checked_ops)]
        "DIVL" => {
            if b == 0 {
                state.fr = FLAG_OVERFLOW | FLAG_ZERO;
                log::info!("DIVL by zero at {:#06X}: GR{} unchanged", pc, d.r1);
            } else {
                let a = state.gr[d.r1 as usize];
                let result = a / b;
                state.gr[d.r1 as usize] = result;
                state.fr = flags_for(result);
                state.set_overflow(false);
            }
        }
        "AND" | "OR" | "XOR" => {
            let a = state.gr[d.r1 as usize];
            let result = match d.mnemonic {
                "AND" => a & b,
                "OR" => a | b,
                _ => a ^ b,
            };
            state.gr[d.r1 as usize] = result;
            state.fr = flags_for(result);
        }
        "CPA" => {
            let a = state.gr[d.r1 as usize] as i16 as i32;
            let bb = b as i16 as i32;
            let clamped = (a - bb).clamp(-32768, 32767);
            state.fr = flags_for(clamped as u32 as u16);
        }
        "CPL" => {
            let a = state.gr[d.r1 as usize] as i32;
            let bb = b as i32;
            let clamped = (a - bb).clamp(-32768, 32767);
            state.fr = flags_for(clamped as u32 as u16);
        }
        mnemonic => unreachable!("unhandled regReg mnemonic {mnemonic}"),
    }

    state.pc = next_pc;
    StepOutcome::Continue
}

fn execute_reg(state: &mut VmState, pc: u16, d: &Decoded) -> StepOutcome {
    match d.mnemonic {
        "POP" => {
            let value = state.read(state.sp);
            let sp = state.sp.wrapping_add(1);
            if sp > super::state::STACK_TOP {
                return StepOutcome::StackUnderflow { pc, sp };
            }
            state.gr[d.r1 as usize] = value;
            state.sp = sp;
            state.pc = pc.wrapping_add(1);
            StepOutcome::Continue
        }
        mnemonic => unreachable!("unhandled reg mnemonic {mnemonic}"),
    }
}

fn execute_none(state: &mut VmState, pc: u16, d: &Decoded) -> StepOutcome {
    match d.mnemonic {
        "RET" => {
            let target = state.read(state.sp);
            let sp = state.sp.wrapping_add(1);
            if sp > super::state::STACK_TOP {
                return StepOutcome::Finished(FinishReason::Ret);
            }
            state.sp = sp;
            state.pc = target;
            StepOutcome::Continue
        }
        "NOP" => {
            state.pc = pc.wrapping_add(1);
            StepOutcome::Continue
        }
        mnemonic => unreachable!("unhandled none-shape mnemonic {mnemonic}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::vm::state::VmState;

    fn run_to_completion(source: &str) -> (VmState, StepOutcome) {
        let result = assemble(source);
        assert!(result.errors.is_empty(), "assembly errors: {:?}", result.errors);
        let mut state = VmState::new(&result.image, result.entry_address.unwrap());
        loop {
            match step(&mut state) {
                StepOutcome::Continue => continue,
                outcome => return (state, outcome),
            }
        }
    }

    #[test]
    fn s1_simple_add() {
        let (state, outcome) = run_to_completion(
            "MAIN START\n     LD    GR0,=10\n     LD    GR1,=20\n     ADDA  GR0,GR1\n     RET\n     END\n",
        );
        assert_eq!(state.gr[0], 30);
        assert_eq!(state.gr[1], 20);
        assert_eq!(state.fr, 0);
        assert_eq!(outcome, StepOutcome::Finished(FinishReason::Ret));
    }

    #[test]
    fn s2_signed_overflow() {
        let (state, _) = run_to_completion(
            "MAIN START\n     LD   GR0,=32767\n     LD   GR1,=1\n     ADDA GR0,GR1\n     RET\n     END\n",
        );
        assert_eq!(state.gr[0], 0x8000);
        assert_eq!(state.fr, FLAG_MINUS | FLAG_OVERFLOW);
    }

    #[test]
    fn s3_division_by_zero_continues() {
        let (state, _) = run_to_completion(
            "MAIN START\n     LD   GR0,=10\n     LD   GR1,=0\n     DIVA GR0,GR1\n     NOP\n     RET\n     END\n",
        );
        assert_eq!(state.gr[0], 10);
        assert_eq!(state.fr, FLAG_OVERFLOW | FLAG_ZERO);
    }

    #[test]
    fn stack_discipline_push_then_pop_round_trips() {
        let result = assemble("MAIN START\n     LAD  GR1,7\n     PUSH 0,GR1\n     POP  GR2\n     RET\n     END\n");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let mut state = VmState::new(&result.image, result.entry_address.unwrap());
        let sp_before = state.sp;
        while let StepOutcome::Continue = step(&mut state) {}
        assert_eq!(state.gr[2], 7);
        assert_eq!(state.sp, sp_before);
    }

    #[test]
    fn illegal_opcode_is_reported() {
        let mut state = VmState::new(&[0x9900], 0);
        assert_eq!(step(&mut state), StepOutcome::IllegalInstruction { pc: 0, opcode: 0x99 });
    }
}
