// Statistics aggregator: derived dashboard metrics over the mirrored
// record set.
//
// Responsibilities
// - Totals, status counts, and the average hourly rate (0 at zero hours,
//   never NaN).
// - Calendar month-over-month growth with a +/-5% deadband on the trend.
// - A rolling moving average and a trailing-6-month growth forecast. The
//   forecast confidence is a coefficient-of-variation heuristic, not a
//   statistical guarantee.
//
// Snapshots are cached against the mirrors' change epochs; any applied
// change notification (a payment turning paid included) invalidates them.

use crate::application::reconcile::Mirror;
use crate::core::payment::{PaymentRecord, PaymentStatus};
use crate::core::ports::{Clock, DataStore};
use crate::core::time_entry::{EntryStatus, TimeEntry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Months folded into the forecast's growth average.
const FORECAST_LOOKBACK_MONTHS: usize = 6;
/// Growth beyond +/- this many percent counts as a real trend change.
const TREND_DEADBAND_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: PaymentStatus,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_earned: i64,
    pub pending_amount: i64,
    pub total_minutes: i64,
    pub total_hours: f64,
    pub scope_count: u64,
    pub average_hourly_rate: f64,
    pub by_status: Vec<StatusCount>,
    pub current_month_earned: i64,
    pub previous_month_earned: i64,
    pub growth_pct: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyEarnings {
    pub year: i32,
    pub month: u32,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MovingAveragePoint {
    pub year: i32,
    pub month: u32,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayerEarnings {
    pub payer_id: String,
    pub amount: i64,
    pub payments: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub months: Vec<MonthlyEarnings>,
    pub avg_growth_pct: f64,
    /// 0 to 100; higher when the trailing months vary less.
    pub confidence: f64,
}

/// Month-over-month growth in percent. A zero baseline reads as +100% when
/// anything was earned, 0% otherwise.
pub fn growth_pct(previous: i64, current: i64) -> f64 {
    if previous == 0 {
        if current > 0 { 100.0 } else { 0.0 }
    } else {
        (current - previous) as f64 * 100.0 / previous as f64
    }
}

pub fn trend_for(growth: f64) -> Trend {
    if growth > TREND_DEADBAND_PCT {
        Trend::Up
    } else if growth < -TREND_DEADBAND_PCT {
        Trend::Down
    } else {
        Trend::Stable
    }
}

fn month_key(ms: i64) -> MonthKey {
    use chrono::Datelike;
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(dt) => MonthKey {
            year: dt.year(),
            month: dt.month(),
        },
        None => MonthKey {
            year: 1970,
            month: 1,
        },
    }
}

fn previous_month(key: MonthKey) -> MonthKey {
    if key.month == 1 {
        MonthKey {
            year: key.year - 1,
            month: 12,
        }
    } else {
        MonthKey {
            year: key.year,
            month: key.month - 1,
        }
    }
}

fn next_month(key: MonthKey) -> MonthKey {
    if key.month == 12 {
        MonthKey {
            year: key.year + 1,
            month: 1,
        }
    } else {
        MonthKey {
            year: key.year,
            month: key.month + 1,
        }
    }
}

/// Continuous per-month paid earnings for the `months` calendar months
/// ending at `now_ms`, zero-filled. Paid records bucket by period end.
pub fn monthly_earnings(
    payments: &[PaymentRecord],
    months: usize,
    now_ms: i64,
) -> Vec<MonthlyEarnings> {
    let mut keys = Vec::with_capacity(months);
    let mut cursor = month_key(now_ms);
    for _ in 0..months {
        keys.push(cursor);
        cursor = previous_month(cursor);
    }
    keys.reverse();

    let mut buckets: BTreeMap<(i32, u32), i64> = BTreeMap::new();
    for payment in payments {
        if payment.status != PaymentStatus::Paid {
            continue;
        }
        let key = month_key(payment.period_end);
        *buckets.entry((key.year, key.month)).or_insert(0) += payment.amount;
    }

    keys.into_iter()
        .map(|key| MonthlyEarnings {
            year: key.year,
            month: key.month,
            amount: buckets.get(&(key.year, key.month)).copied().unwrap_or(0),
        })
        .collect()
}

/// Counterparties ranked by paid earnings, ties broken by id for a stable
/// listing.
pub fn top_payers(payments: &[PaymentRecord], limit: usize) -> Vec<PayerEarnings> {
    let mut buckets: HashMap<&str, (i64, u64)> = HashMap::new();
    for payment in payments {
        if payment.status != PaymentStatus::Paid {
            continue;
        }
        let bucket = buckets.entry(payment.payer_id.as_str()).or_insert((0, 0));
        bucket.0 += payment.amount;
        bucket.1 += 1;
    }
    let mut ranked: Vec<PayerEarnings> = buckets
        .into_iter()
        .map(|(payer_id, (amount, payments))| PayerEarnings {
            payer_id: payer_id.to_string(),
            amount,
            payments,
        })
        .collect();
    ranked.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.payer_id.cmp(&b.payer_id)));
    ranked.truncate(limit);
    ranked
}

/// Rolling moving average over a monthly series; leading points average the
/// months available so far.
pub fn moving_average_series(
    series: &[MonthlyEarnings],
    periods: usize,
) -> Vec<MovingAveragePoint> {
    if periods == 0 {
        return Vec::new();
    }
    series
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let from = index.saturating_sub(periods - 1);
            let window = &series[from..=index];
            let sum: i64 = window.iter().map(|month| month.amount).sum();
            MovingAveragePoint {
                year: point.year,
                month: point.month,
                average: sum as f64 / window.len() as f64,
            }
        })
        .collect()
}

/// Extrapolate `months_ahead` months with the average month-over-month
/// growth of the trailing series, plus a variance-based confidence score.
pub fn forecast_from(series: &[MonthlyEarnings], months_ahead: usize) -> Forecast {
    let growth_rates: Vec<f64> = series
        .windows(2)
        .map(|pair| growth_pct(pair[0].amount, pair[1].amount) / 100.0)
        .collect();
    let avg_growth = if growth_rates.is_empty() {
        0.0
    } else {
        growth_rates.iter().sum::<f64>() / growth_rates.len() as f64
    };

    let mut months = Vec::with_capacity(months_ahead);
    let mut cursor = series.last().map_or(
        MonthKey {
            year: 1970,
            month: 1,
        },
        |last| MonthKey {
            year: last.year,
            month: last.month,
        },
    );
    let mut projected = series.last().map_or(0.0, |last| last.amount as f64);
    for _ in 0..months_ahead {
        cursor = next_month(cursor);
        projected *= 1.0 + avg_growth;
        months.push(MonthlyEarnings {
            year: cursor.year,
            month: cursor.month,
            amount: projected.round().max(0.0) as i64,
        });
    }

    Forecast {
        months,
        avg_growth_pct: avg_growth * 100.0,
        confidence: confidence_from(series),
    }
}

/// (1 - coefficient of variation) scaled to [0, 100]. Steadier trailing
/// months score higher; an all-zero series scores zero.
fn confidence_from(series: &[MonthlyEarnings]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let amounts: Vec<f64> = series.iter().map(|month| month.amount as f64).collect();
    let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance =
        amounts.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / amounts.len() as f64;
    let cv = variance.sqrt() / mean;
    ((1.0 - cv) * 100.0).clamp(0.0, 100.0)
}

pub struct StatsAggregator<TStore: DataStore + 'static, TClock: Clock + 'static> {
    entries: Arc<Mirror<TStore>>,
    payments: Arc<Mirror<TStore>>,
    clock: Arc<TClock>,
    cache: Mutex<Option<((u64, u64), DashboardStats)>>,
}

impl<TStore: DataStore + 'static, TClock: Clock + 'static> StatsAggregator<TStore, TClock> {
    pub fn new(
        entries: Arc<Mirror<TStore>>,
        payments: Arc<Mirror<TStore>>,
        clock: Arc<TClock>,
    ) -> Self {
        Self {
            entries,
            payments,
            clock,
            cache: Mutex::new(None),
        }
    }

    pub async fn stats(&self) -> DashboardStats {
        let key = (self.entries.epoch(), self.payments.epoch());
        let mut cache = self.cache.lock().await;
        if let Some((cached_key, cached)) = cache.as_ref() {
            if *cached_key == key {
                return cached.clone();
            }
        }
        let computed = self.compute().await;
        *cache = Some((key, computed.clone()));
        computed
    }

    /// Drop the cached snapshot and recompute.
    pub async fn refresh(&self) -> DashboardStats {
        self.cache.lock().await.take();
        self.stats().await
    }

    pub async fn monthly_series(&self, months: usize) -> Vec<MonthlyEarnings> {
        let payments = self.payments.snapshot::<PaymentRecord>().await;
        monthly_earnings(&payments, months, self.clock.now_ms())
    }

    pub async fn moving_average(&self, periods: usize) -> Vec<MovingAveragePoint> {
        let span = periods.max(FORECAST_LOOKBACK_MONTHS);
        let series = self.monthly_series(span).await;
        moving_average_series(&series, periods)
    }

    pub async fn forecast(&self, months_ahead: usize) -> Forecast {
        let series = self.monthly_series(FORECAST_LOOKBACK_MONTHS).await;
        forecast_from(&series, months_ahead)
    }

    pub async fn top_payers(&self, limit: usize) -> Vec<PayerEarnings> {
        let payments = self.payments.snapshot::<PaymentRecord>().await;
        top_payers(&payments, limit)
    }

    async fn compute(&self) -> DashboardStats {
        let entries = self.entries.snapshot::<TimeEntry>().await;
        let payments = self.payments.snapshot::<PaymentRecord>().await;
        let now = self.clock.now_ms();

        let total_earned: i64 = payments
            .iter()
            .filter(|payment| payment.status == PaymentStatus::Paid)
            .map(|payment| payment.amount)
            .sum();
        let pending_amount: i64 = payments
            .iter()
            .filter(|payment| {
                matches!(
                    payment.status,
                    PaymentStatus::Pending | PaymentStatus::Validated | PaymentStatus::Processing
                )
            })
            .map(|payment| payment.amount)
            .sum();

        let total_minutes: i64 = entries
            .iter()
            .filter(|entry| entry.status != EntryStatus::Cancelled)
            .map(|entry| entry.duration_minutes)
            .sum();
        let total_hours = total_minutes as f64 / 60.0;
        let scope_count = entries
            .iter()
            .map(|entry| entry.scope_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;
        let average_hourly_rate = if total_hours > 0.0 {
            total_earned as f64 / total_hours
        } else {
            0.0
        };

        let by_status = PaymentStatus::ALL
            .iter()
            .filter_map(|status| {
                let count = payments
                    .iter()
                    .filter(|payment| payment.status == *status)
                    .count() as u64;
                (count > 0).then_some(StatusCount {
                    status: *status,
                    count,
                })
            })
            .collect();

        let months = monthly_earnings(&payments, 2, now);
        let previous_month_earned = months.first().map_or(0, |month| month.amount);
        let current_month_earned = months.last().map_or(0, |month| month.amount);
        let growth = growth_pct(previous_month_earned, current_month_earned);

        DashboardStats {
            total_earned,
            pending_amount,
            total_minutes,
            total_hours,
            scope_count,
            average_hourly_rate,
            by_status,
            current_month_earned,
            previous_month_earned,
            growth_pct: growth,
            trend: trend_for(growth),
        }
    }
}
