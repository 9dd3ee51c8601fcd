//! Turns IBGE-style population projection workbooks into per-year CSV
//! tables keyed by variable code.

pub mod aggregate;
pub mod config;
pub mod emit;
pub mod key;
pub mod load;
pub mod mapping;
pub mod pipeline;
pub mod types;
