//! Row models and DTOs for the ledger and generation tables.

pub mod credit;
pub mod generation;
