//! Business logic services for the material stock ledger

pub mod catalog;
pub mod ledger;
pub mod purchase;
pub mod reporting;
pub mod task_access;
pub mod usage;
pub mod valuation;

pub use catalog::CatalogService;
pub use ledger::LedgerService;
pub use purchase::PurchaseService;
pub use reporting::ReportingService;
pub use task_access::TaskAccessService;
pub use usage::UsageService;
pub use valuation::ValuationService;
