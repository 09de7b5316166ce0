//! Shared utilities: external commands, paths, persistence helpers.

pub mod exec;
pub mod path;
pub mod write;
