//! Monthly material statement
//!
//! Loads the ledger once up to the month end and folds it in memory; the
//! supplier table is a separate document-level rollup of purchase batches.

use shared::{build_monthly_report, Month, MonthlyReport};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::services::{catalog, LedgerService, PurchaseService};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Opening, purchased, used and closing figures for every catalog item
    pub async fn monthly_report(&self, month: Month) -> AppResult<MonthlyReport> {
        let materials = catalog::all_refs(&self.db).await?;
        let entries = LedgerService::new(self.db.clone())
            .entries_before(month.end())
            .await?;
        let batches = PurchaseService::new(self.db.clone())
            .batches_for_month(month)
            .await?;

        let report = build_monthly_report(month, &materials, &entries, &batches);

        tracing::debug!(
            month = %month,
            materials = report.summary.material_item_count,
            entries = entries.len(),
            batches = report.summary.purchase_batch_count,
            "Monthly report built"
        );

        Ok(report)
    }
}
