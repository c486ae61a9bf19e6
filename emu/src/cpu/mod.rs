mod arm;

#[allow(clippy::cast_possible_truncation)]
mod barrel_shifter;

#[allow(clippy::cast_lossless)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::large_stack_frames)]
#[allow(clippy::module_name_repetitions)]
pub mod arm7tdmi;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
pub mod bios;
mod condition;
mod cpu_modes;

#[allow(clippy::cast_possible_truncation)]
mod flags;

#[allow(clippy::cast_possible_truncation)]
pub mod hardware;
mod psr;
mod register_bank;
mod registers;
mod thumb;
