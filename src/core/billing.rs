// Pure payment calculator: a set of entries into a monetary breakdown.
//
// Purpose
// - Derive subtotal, tax, total, and the per-category split from entry
//   durations and their snapshotted rates.
//
// Boundaries
// - Deterministic, no input or output. Every entry handed in contributes to
//   the derivation; nothing is dropped silently.

use crate::core::time_entry::{TaskCategory, TimeEntry};
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_TAX_RATE: f64 = 0.20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryBreakdown {
    pub category: TaskCategory,
    pub minutes: i64,
    pub amount: i64,
    /// Share of the subtotal, in percent.
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentBreakdown {
    pub total_minutes: i64,
    pub subtotal: i64,
    pub tax: i64,
    pub total: i64,
    pub by_category: Vec<CategoryBreakdown>,
}

pub fn calculate(entries: &[TimeEntry], tax_rate: f64) -> PaymentBreakdown {
    let mut total_minutes = 0i64;
    let mut subtotal = 0i64;
    let mut per_category: HashMap<TaskCategory, (i64, i64)> = HashMap::new();

    for entry in entries {
        let amount = entry.duration_minutes * entry.rate_per_minute;
        total_minutes += entry.duration_minutes;
        subtotal += amount;
        let bucket = per_category.entry(entry.category).or_insert((0, 0));
        bucket.0 += entry.duration_minutes;
        bucket.1 += amount;
    }

    let mut by_category: Vec<CategoryBreakdown> = per_category
        .into_iter()
        .map(|(category, (minutes, amount))| CategoryBreakdown {
            category,
            minutes,
            amount,
            share_pct: if subtotal > 0 {
                amount as f64 * 100.0 / subtotal as f64
            } else {
                0.0
            },
        })
        .collect();
    by_category.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.minutes.cmp(&b.minutes)));

    let tax = (subtotal as f64 * tax_rate).round() as i64;
    PaymentBreakdown {
        total_minutes,
        subtotal,
        tax,
        total: subtotal + tax,
        by_category,
    }
}
