use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use dropmart_core::SupplierId;
use dropmart_orders::{OrderId, SubOrderId, SubOrderStatus};

use crate::window::DateWindow;

/// The logical unit the aggregator operates over: one row per sub-order,
/// tagged with its current status and money facts. Derived from the
/// sub-order ledger read model, never stored as a mutable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sub_order_id: SubOrderId,
    pub order_id: OrderId,
    pub status: SubOrderStatus,
    pub total: Decimal,
    pub profit: Decimal,
    pub delivery_fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn created_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

/// What a returned sub-order costs its supplier.
///
/// The business rule wavered between "the delivery fee" and "a fixed
/// penalty" in different dashboards; the delivery fee is the default and the
/// fixed variant stays available behind configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum ReturnPenaltyRule {
    DeliveryFee,
    Fixed(Decimal),
}

impl ReturnPenaltyRule {
    fn penalty_for(&self, entry: &LedgerEntry) -> Decimal {
        match self {
            ReturnPenaltyRule::DeliveryFee => entry.delivery_fee,
            ReturnPenaltyRule::Fixed(amount) => *amount,
        }
    }
}

/// Aggregation knobs. Defaults match the platform dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub penalty_rule: ReturnPenaltyRule,
    /// Decimal places of the return-rate percentage.
    pub rate_scale: u32,
    /// Length of the daily chart series, ending at the window end.
    pub daily_days: u32,
    /// Length of the monthly chart series, ending at the window end's month.
    pub monthly_months: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            penalty_rule: ReturnPenaltyRule::DeliveryFee,
            rate_scale: 2,
            daily_days: 7,
            monthly_months: 6,
        }
    }
}

/// Windowed revenue partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueBreakdown {
    /// Σ total for delivered sub-orders (all paid variants included).
    #[serde(rename = "ca_reel")]
    pub realized_revenue: Decimal,
    /// Σ total for sub-orders still moving (en_cours, pret_pour_enlevement).
    #[serde(rename = "ca_en_cours")]
    pub pipeline_revenue: Decimal,
    /// Σ total for unconfirmed sub-orders.
    #[serde(rename = "ca_potentiel")]
    pub potential_revenue: Decimal,
    /// Σ line profit over the sub-orders counted in `ca_reel`.
    pub profit: Decimal,
    /// Cost borne by the supplier for failed round trips.
    #[serde(rename = "penalites_retour")]
    pub return_penalties: Decimal,
}

impl RevenueBreakdown {
    fn zero() -> Self {
        Self {
            realized_revenue: Decimal::ZERO,
            pipeline_revenue: Decimal::ZERO,
            potential_revenue: Decimal::ZERO,
            profit: Decimal::ZERO,
            return_penalties: Decimal::ZERO,
        }
    }
}

/// Supporting counts for the dashboard tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// All sub-orders in the window except cancelled ones.
    pub total: u64,
    pub delivered: u64,
    pub in_progress: u64,
    pub cancelled: u64,
    pub unconfirmed: u64,
    pub paid_delivered: u64,
    pub unpaid_delivered: u64,
    pub returned: u64,
    pub pickups: u64,
}

/// One bucket of a chart series (a day or a month), using the same
/// partitioning as the headline metrics restricted to the sub-window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// "YYYY-MM-DD" for daily buckets, "YYYY-MM" for monthly ones.
    pub period: String,
    #[serde(rename = "ca_reel")]
    pub realized_revenue: Decimal,
    #[serde(rename = "ca_en_cours")]
    pub pipeline_revenue: Decimal,
    #[serde(rename = "ca_potentiel")]
    pub potential_revenue: Decimal,
    pub delivered: u64,
    pub returned: u64,
}

/// The full windowed financial report for one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub supplier_id: SupplierId,
    pub window: DateWindow,
    pub revenue: RevenueBreakdown,
    /// `retournees / (livrees + retournees) × 100`, 0 when the denominator is 0.
    #[serde(rename = "taux_retour")]
    pub return_rate: Decimal,
    pub counts: StatusCounts,
    pub daily: Vec<SeriesPoint>,
    pub monthly: Vec<SeriesPoint>,
}

/// Compute the report for `supplier_id` over `window`.
///
/// `entries` may span any range; only rows created inside the window count
/// toward the headline metrics. `pickups_in_window` comes from the pickup
/// log, already window-filtered by the caller. Pure and deterministic: same
/// inputs, bit-identical output.
pub fn build_report(
    supplier_id: SupplierId,
    window: DateWindow,
    entries: &[LedgerEntry],
    pickups_in_window: u64,
    config: &ReportConfig,
) -> FinancialReport {
    let in_window: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|e| window.contains(e.created_on()))
        .collect();

    let (revenue, mut counts) = summarize(in_window.iter().copied(), config);
    counts.pickups = pickups_in_window;

    let return_rate = return_rate(counts.delivered, counts.returned, config.rate_scale);

    FinancialReport {
        supplier_id,
        window,
        revenue,
        return_rate,
        counts,
        daily: daily_series(entries, window.end(), config),
        monthly: monthly_series(entries, window.end(), config),
    }
}

/// Partition a set of entries by status. Order-insensitive.
fn summarize<'a>(
    entries: impl Iterator<Item = &'a LedgerEntry>,
    config: &ReportConfig,
) -> (RevenueBreakdown, StatusCounts) {
    let mut revenue = RevenueBreakdown::zero();
    let mut counts = StatusCounts::default();

    for entry in entries {
        match entry.status {
            SubOrderStatus::Delivered
            | SubOrderStatus::DeliveredPaid
            | SubOrderStatus::DeliveredUnpaid => {
                revenue.realized_revenue += entry.total;
                revenue.profit += entry.profit;
                counts.delivered += 1;
                match entry.status {
                    SubOrderStatus::DeliveredPaid => counts.paid_delivered += 1,
                    SubOrderStatus::DeliveredUnpaid => counts.unpaid_delivered += 1,
                    _ => {}
                }
            }
            SubOrderStatus::InProgress | SubOrderStatus::ReadyForPickup => {
                revenue.pipeline_revenue += entry.total;
                counts.in_progress += 1;
            }
            SubOrderStatus::Unconfirmed => {
                revenue.potential_revenue += entry.total;
                counts.unconfirmed += 1;
            }
            SubOrderStatus::Returned => {
                revenue.return_penalties += config.penalty_rule.penalty_for(entry);
                counts.returned += 1;
            }
            SubOrderStatus::Cancelled => {
                counts.cancelled += 1;
            }
        }

        if entry.status != SubOrderStatus::Cancelled {
            counts.total += 1;
        }
    }

    (revenue, counts)
}

fn return_rate(delivered: u64, returned: u64, scale: u32) -> Decimal {
    let denominator = delivered + returned;
    if denominator == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(returned) / Decimal::from(denominator) * Decimal::from(100)).round_dp(scale)
}

fn daily_series(entries: &[LedgerEntry], end: NaiveDate, config: &ReportConfig) -> Vec<SeriesPoint> {
    let mut points = Vec::with_capacity(config.daily_days as usize);
    for back in (0..config.daily_days).rev() {
        let Some(day) = end.checked_sub_days(Days::new(back as u64)) else {
            continue;
        };
        let bucket = entries.iter().filter(|e| e.created_on() == day);
        points.push(series_point(day.format("%Y-%m-%d").to_string(), bucket, config));
    }
    points
}

fn monthly_series(
    entries: &[LedgerEntry],
    end: NaiveDate,
    config: &ReportConfig,
) -> Vec<SeriesPoint> {
    let mut points = Vec::with_capacity(config.monthly_months as usize);
    for back in (0..config.monthly_months).rev() {
        let Some(anchor) = end.checked_sub_months(Months::new(back)) else {
            continue;
        };
        let bucket = entries.iter().filter(|e| {
            let d = e.created_on();
            d.year() == anchor.year() && d.month() == anchor.month()
        });
        points.push(series_point(anchor.format("%Y-%m").to_string(), bucket, config));
    }
    points
}

fn series_point<'a>(
    period: String,
    entries: impl Iterator<Item = &'a LedgerEntry>,
    config: &ReportConfig,
) -> SeriesPoint {
    let (revenue, counts) = summarize(entries, config);
    SeriesPoint {
        period,
        realized_revenue: revenue.realized_revenue,
        pipeline_revenue: revenue.pipeline_revenue,
        potential_revenue: revenue.potential_revenue,
        delivered: counts.delivered,
        returned: counts.returned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dropmart_core::AggregateId;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn price(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn entry(status: SubOrderStatus, total: &str, profit: &str, fee: &str, day: &str) -> LedgerEntry {
        let day: NaiveDate = day.parse().unwrap();
        LedgerEntry {
            sub_order_id: SubOrderId::new(AggregateId::new()),
            order_id: OrderId::new(AggregateId::new()),
            status,
            total: price(total),
            profit: price(profit),
            delivery_fee: price(fee),
            created_at: Utc
                .from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap()),
        }
    }

    fn window(start: &str, end: &str) -> DateWindow {
        DateWindow::new(d(start), d(end)).unwrap()
    }

    #[test]
    fn statuses_partition_into_revenue_buckets() {
        let supplier_id = SupplierId::new();
        let entries = vec![
            entry(SubOrderStatus::DeliveredPaid, "100.00", "30.00", "8.00", "2025-03-10"),
            entry(SubOrderStatus::Delivered, "50.00", "10.00", "8.00", "2025-03-11"),
            entry(SubOrderStatus::InProgress, "70.00", "20.00", "8.00", "2025-03-12"),
            entry(SubOrderStatus::ReadyForPickup, "30.00", "5.00", "8.00", "2025-03-12"),
            entry(SubOrderStatus::Unconfirmed, "40.00", "12.00", "8.00", "2025-03-13"),
            entry(SubOrderStatus::Returned, "60.00", "15.00", "10.00", "2025-03-13"),
            entry(SubOrderStatus::Cancelled, "25.00", "5.00", "8.00", "2025-03-14"),
        ];

        let report = build_report(
            supplier_id,
            window("2025-03-01", "2025-03-31"),
            &entries,
            3,
            &ReportConfig::default(),
        );

        assert_eq!(report.revenue.realized_revenue, price("150.00"));
        assert_eq!(report.revenue.pipeline_revenue, price("100.00"));
        assert_eq!(report.revenue.potential_revenue, price("40.00"));
        assert_eq!(report.revenue.profit, price("40.00"));
        assert_eq!(report.revenue.return_penalties, price("10.00"));

        assert_eq!(report.counts.total, 6); // cancelled excluded
        assert_eq!(report.counts.delivered, 2);
        assert_eq!(report.counts.paid_delivered, 1);
        assert_eq!(report.counts.unpaid_delivered, 0);
        assert_eq!(report.counts.in_progress, 2);
        assert_eq!(report.counts.unconfirmed, 1);
        assert_eq!(report.counts.returned, 1);
        assert_eq!(report.counts.cancelled, 1);
        assert_eq!(report.counts.pickups, 3);

        // 1 returned / (2 delivered + 1 returned) = 33.33%
        assert_eq!(report.return_rate, price("33.33"));
    }

    #[test]
    fn returned_sub_order_is_excluded_from_realized_revenue() {
        // The SO1 scenario: total 120.00, delivery fee 10.00, ends returned.
        let supplier_id = SupplierId::new();
        let entries = vec![entry(
            SubOrderStatus::Returned,
            "120.00",
            "30.00",
            "10.00",
            "2025-03-10",
        )];

        let report = build_report(
            supplier_id,
            window("2025-03-01", "2025-03-31"),
            &entries,
            0,
            &ReportConfig::default(),
        );

        assert_eq!(report.revenue.realized_revenue, Decimal::ZERO);
        assert_eq!(report.revenue.profit, Decimal::ZERO);
        assert_eq!(report.revenue.return_penalties, price("10.00"));
        assert_eq!(report.return_rate, price("100.00"));
    }

    #[test]
    fn fixed_penalty_rule_overrides_delivery_fee() {
        let supplier_id = SupplierId::new();
        let entries = vec![
            entry(SubOrderStatus::Returned, "60.00", "15.00", "10.00", "2025-03-13"),
            entry(SubOrderStatus::Returned, "80.00", "25.00", "12.00", "2025-03-14"),
        ];
        let config = ReportConfig {
            penalty_rule: ReturnPenaltyRule::Fixed(price("15.00")),
            ..ReportConfig::default()
        };

        let report = build_report(
            supplier_id,
            window("2025-03-01", "2025-03-31"),
            &entries,
            0,
            &config,
        );
        assert_eq!(report.revenue.return_penalties, price("30.00"));
    }

    #[test]
    fn empty_window_yields_zeroed_metrics_and_zero_rate() {
        let supplier_id = SupplierId::new();
        let report = build_report(
            supplier_id,
            window("2025-03-01", "2025-03-31"),
            &[],
            0,
            &ReportConfig::default(),
        );

        assert_eq!(report.revenue.realized_revenue, Decimal::ZERO);
        assert_eq!(report.revenue.return_penalties, Decimal::ZERO);
        assert_eq!(report.return_rate, Decimal::ZERO);
        assert_eq!(report.counts.total, 0);
    }

    #[test]
    fn window_filters_by_creation_date() {
        let supplier_id = SupplierId::new();
        let entries = vec![
            entry(SubOrderStatus::Delivered, "100.00", "20.00", "8.00", "2025-02-28"),
            entry(SubOrderStatus::Delivered, "50.00", "10.00", "8.00", "2025-03-01"),
        ];

        let report = build_report(
            supplier_id,
            window("2025-03-01", "2025-03-31"),
            &entries,
            0,
            &ReportConfig::default(),
        );
        assert_eq!(report.revenue.realized_revenue, price("50.00"));
        assert_eq!(report.counts.delivered, 1);
    }

    #[test]
    fn daily_series_buckets_by_day() {
        let supplier_id = SupplierId::new();
        let entries = vec![
            entry(SubOrderStatus::Delivered, "100.00", "20.00", "8.00", "2025-03-30"),
            entry(SubOrderStatus::Unconfirmed, "40.00", "10.00", "8.00", "2025-03-31"),
            entry(SubOrderStatus::Returned, "60.00", "15.00", "10.00", "2025-03-31"),
        ];

        let report = build_report(
            supplier_id,
            window("2025-03-01", "2025-03-31"),
            &entries,
            0,
            &ReportConfig::default(),
        );

        assert_eq!(report.daily.len(), 7);
        let last = report.daily.last().unwrap();
        assert_eq!(last.period, "2025-03-31");
        assert_eq!(last.potential_revenue, price("40.00"));
        assert_eq!(last.returned, 1);

        let day_before = &report.daily[report.daily.len() - 2];
        assert_eq!(day_before.period, "2025-03-30");
        assert_eq!(day_before.realized_revenue, price("100.00"));
        assert_eq!(day_before.delivered, 1);
    }

    #[test]
    fn monthly_series_buckets_by_month() {
        let supplier_id = SupplierId::new();
        let entries = vec![
            entry(SubOrderStatus::Delivered, "100.00", "20.00", "8.00", "2025-01-15"),
            entry(SubOrderStatus::Delivered, "70.00", "15.00", "8.00", "2025-03-02"),
        ];

        let report = build_report(
            supplier_id,
            window("2025-03-01", "2025-03-31"),
            &entries,
            0,
            &ReportConfig::default(),
        );

        assert_eq!(report.monthly.len(), 6);
        let jan = report.monthly.iter().find(|p| p.period == "2025-01").unwrap();
        assert_eq!(jan.realized_revenue, price("100.00"));
        let mar = report.monthly.iter().find(|p| p.period == "2025-03").unwrap();
        assert_eq!(mar.realized_revenue, price("70.00"));
    }

    #[test]
    fn report_is_deterministic() {
        let supplier_id = SupplierId::new();
        let entries = vec![
            entry(SubOrderStatus::DeliveredPaid, "100.00", "30.00", "8.00", "2025-03-10"),
            entry(SubOrderStatus::Returned, "60.00", "15.00", "10.00", "2025-03-13"),
            entry(SubOrderStatus::InProgress, "70.00", "20.00", "8.00", "2025-03-12"),
        ];
        let w = window("2025-03-01", "2025-03-31");
        let config = ReportConfig::default();

        let first = build_report(supplier_id, w, &entries, 1, &config);
        let second = build_report(supplier_id, w, &entries, 1, &config);
        assert_eq!(first, second);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the three revenue buckets always partition the totals of
        /// non-returned, non-cancelled entries, and the return rate stays in
        /// [0, 100].
        #[test]
        fn buckets_partition_totals(
            rows in prop::collection::vec((0u8..8, 1i64..10_000i64), 0..40)
        ) {
            let supplier_id = SupplierId::new();
            let statuses = SubOrderStatus::ALL;

            let entries: Vec<LedgerEntry> = rows
                .iter()
                .map(|(status_idx, cents)| {
                    let total = Decimal::new(*cents, 2);
                    LedgerEntry {
                        sub_order_id: SubOrderId::new(AggregateId::new()),
                        order_id: OrderId::new(AggregateId::new()),
                        status: statuses[*status_idx as usize],
                        total,
                        profit: total / Decimal::from(4),
                        delivery_fee: Decimal::new(800, 2),
                        created_at: Utc
                            .from_utc_datetime(&d("2025-03-15").and_hms_opt(9, 0, 0).unwrap()),
                    }
                })
                .collect();

            let report = build_report(
                supplier_id,
                window("2025-03-01", "2025-03-31"),
                &entries,
                0,
                &ReportConfig::default(),
            );

            let expected: Decimal = entries
                .iter()
                .filter(|e| {
                    e.status != SubOrderStatus::Returned && e.status != SubOrderStatus::Cancelled
                })
                .map(|e| e.total)
                .sum();
            let bucketed = report.revenue.realized_revenue
                + report.revenue.pipeline_revenue
                + report.revenue.potential_revenue;
            prop_assert_eq!(bucketed, expected);

            prop_assert!(report.return_rate >= Decimal::ZERO);
            prop_assert!(report.return_rate <= Decimal::from(100));
        }
    }
}
