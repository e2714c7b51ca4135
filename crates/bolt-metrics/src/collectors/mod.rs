//! Collectors shipped with the client.

mod cpu;
mod memory;

pub use cpu::CpuCollector;
pub use memory::MemoryCollector;
