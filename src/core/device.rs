//! Compute device placement tags.
//!
//! All arithmetic in this crate runs on the host. `Device` records where a
//! buffer is meant to live so that placement bookkeeping (parameters moved by
//! the training loop, derived masks following them) behaves the same way it
//! would with an accelerator backend.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Gpu(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(ordinal) => write!(f, "gpu:{ordinal}"),
        }
    }
}
