use std::sync::Arc;

use chrono::NaiveDate;

use dropmart_core::SupplierId;
use dropmart_finance::{DateWindow, FinancialReport, LedgerEntry, ReportConfig, build_report};

use crate::clock::Clock;
use crate::command_dispatcher::DispatchError;
use crate::projections::ProjectionSet;

/// Read-side financial queries.
///
/// Never blocks writers and takes no locks beyond the read models' own:
/// whatever slice of history the projections hold when the query runs is
/// what gets aggregated (eventual consistency by design).
pub struct FinancialsService {
    projections: Arc<ProjectionSet>,
    clock: Arc<dyn Clock>,
    config: ReportConfig,
}

impl FinancialsService {
    pub fn new(projections: Arc<ProjectionSet>, clock: Arc<dyn Clock>, config: ReportConfig) -> Self {
        Self {
            projections,
            clock,
            config,
        }
    }

    /// Windowed metrics for one supplier. Missing bounds default to today.
    pub fn get_financials(
        &self,
        supplier_id: SupplierId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<FinancialReport, DispatchError> {
        let today = self.clock.today();
        let window = DateWindow::new(start.unwrap_or(today), end.unwrap_or(today))?;

        let entries: Vec<LedgerEntry> = self
            .projections
            .sub_orders
            .list(supplier_id)
            .into_iter()
            .map(|model| LedgerEntry {
                sub_order_id: model.sub_order_id,
                order_id: model.order_id,
                status: model.status,
                total: model.total,
                profit: model.profit,
                delivery_fee: model.delivery_fee,
                created_at: model.created_at,
            })
            .collect();

        let pickups_in_window = self
            .projections
            .pickup_log
            .list(supplier_id)
            .into_iter()
            .filter(|p| window.contains(p.created_at.date_naive()))
            .count() as u64;

        Ok(build_report(
            supplier_id,
            window,
            &entries,
            pickups_in_window,
            &self.config,
        ))
    }
}
