//! Core domain types and logic.

pub mod bar;
pub mod blocker;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod journal;
pub mod overrides;
pub mod query;
pub mod replay;
pub mod segment;
pub mod signal;
pub mod trader;
