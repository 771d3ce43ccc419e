#![forbid(unsafe_code)]

//! Ties the network session and the snapshot decoder together and hands the machine over to
//! the loaded image.

mod boot;
mod config;
mod error;
pub mod machine;
mod scratch;
pub mod spectrum;
mod staging;
mod switch;

pub use boot::{BootLoader, BootStatus, SnapshotSink};
pub use config::BootConfig;
pub use machine::{AlternateRegisters, Machine, PagingFlags};
pub use scratch::RegisterScratch;
pub use spectrum::{CpuState, RunState, Spectrum};
pub use staging::NicStaging;
pub use switch::{switch_context, Handoff};
