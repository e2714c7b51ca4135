//! Process-level helpers shared by the bolt binaries.

pub mod logging;
pub mod version;
