//! CLI subcommand implementations.

pub mod codec;
pub mod handoff;
pub mod sign;
