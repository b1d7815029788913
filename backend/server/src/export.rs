//! CSV export of a business's pools.

use chrono::{DateTime, Utc};
use onepool_core::Pool;

const HEADERS: [&str; 8] = [
    "Pool ID",
    "Created At",
    "Name",
    "Total Amount",
    "Status",
    "Contributors",
    "Verified",
    "Paid",
];

/// Quote a field when it would otherwise break the row.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row(pool: &Pool) -> String {
    let verified = pool.contributors.iter().filter(|c| c.has_verified).count();
    let paid = pool.contributors.iter().filter(|c| c.has_paid).count();
    [
        escape(&pool.id),
        pool.created_at.format("%Y-%m-%d").to_string(),
        escape(&pool.subscription_name),
        format!("{:.2}", pool.total_amount),
        pool.status.as_str().to_string(),
        pool.contributors.len().to_string(),
        verified.to_string(),
        paid.to_string(),
    ]
    .join(",")
}

/// One header line plus one line per pool, in the order given.
pub fn pools_to_csv(pools: &[Pool]) -> String {
    std::iter::once(HEADERS.join(","))
        .chain(pools.iter().map(row))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("onepool_export_{}.csv", now.format("%Y-%m-%d"))
}
