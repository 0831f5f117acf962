//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod credit_repo;
pub mod generation_repo;

pub use credit_repo::CreditRepo;
pub use generation_repo::GenerationRepo;
