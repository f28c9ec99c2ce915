//! Domain models for the material stock ledger

mod ledger;
mod material;
mod purchase;
mod usage;
mod user;

pub use ledger::*;
pub use material::*;
pub use purchase::*;
pub use usage::*;
pub use user::*;
