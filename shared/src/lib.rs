//! Domain types and pure ledger logic for the material stock ledger
//!
//! Everything here is free of I/O: the backend loads ledger rows and catalog
//! entries from the database and hands them to these folds and builders.

pub mod models;
pub mod report;
pub mod types;
pub mod validation;
pub mod valuation;

pub use models::*;
pub use report::*;
pub use types::*;
pub use validation::*;
pub use valuation::*;
