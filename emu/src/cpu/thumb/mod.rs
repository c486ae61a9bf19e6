//! # Thumb Instruction Set (16-bit)
//!
//! Compressed encoding of a subset of the ARM instruction set. Only branches
//! are conditional and most formats reach R0-R7 only.
//!
//! - [`instruction`] - Decoding (`From<u16>`)
//! - [`operations`] - Execution
//! - [`alu_instructions`] - Opcode fields

pub mod alu_instructions;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
pub mod instruction;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
pub mod operations;
