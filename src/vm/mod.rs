//! # COMET II Virtual Machine
//!
//! State, decoding, and instruction execution for the target machine the
//! assembler produces code for. `executor::step` is the single entry point
//! both an interactive driver and the DAP session's run loop call.

pub mod decoder;
pub mod executor;
pub mod state;

pub use executor::{apply_input, step, FinishReason, StepOutcome, SvcTermination, TerminationReason};
pub use state::VmState;
