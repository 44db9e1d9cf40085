//! Memory-Mapped IO Devices.
//!
//! This target is bare-metal and single-purpose (see `soc::builder`): the
//! only device beyond DRAM is the timer/software-interrupt controller.

/// Core Local Interruptor (timer and software interrupt controller).
pub mod clint;

pub use clint::Clint;

pub use crate::soc::traits::Device;
