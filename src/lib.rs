//! # CASL II / COMET II
//!
//! A two-pass assembler and a 16-bit virtual machine for the CASL II /
//! COMET II teaching architecture.
//!
//! ## Pipeline
//!
//! ```text
//! source text -> lexer -> parser -> assembler pass 1 -> assembler pass 2 -> VM
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use casl2::assembler::assemble;
//! use casl2::vm::{step, StepOutcome, VmState};
//!
//! let source = std::fs::read_to_string("program.casl").unwrap();
//! let result = assemble(&source);
//! if !result.errors.is_empty() {
//!     for err in &result.errors {
//!         eprintln!("{err}");
//!     }
//!     return;
//! }
//!
//! let mut state = VmState::new(&result.image, result.entry_address.unwrap());
//! loop {
//!     match step(&mut state) {
//!         StepOutcome::Continue => continue,
//!         _ => break,
//!     }
//! }
//! ```

pub mod assembler;
pub mod error;
pub mod isa;
pub mod lexer;
pub mod parser;
pub mod source_map;
pub mod vm;
