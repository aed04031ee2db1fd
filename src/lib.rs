// src/lib.rs — Library root for ouroboros

pub mod arbiter;
pub mod cli;
pub mod core;
pub mod infra;
pub mod memory;
pub mod provider;
