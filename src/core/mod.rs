// src/core/mod.rs — Cycle engine

pub mod attempt;
pub mod budget;
pub mod consolidate;
pub mod cost;
pub mod curriculum;
pub mod orchestrator;
pub mod prompts;
pub mod reflexion;
pub mod sanitize;
pub mod types;
