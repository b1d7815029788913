//! Built-in subscription templates a pool can be started from.

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub amount: Decimal,
}

const TEMPLATES: [(&str, &str, i64); 4] = [
    ("netflix", "Netflix", 1999),
    ("spotify", "Spotify", 999),
    ("amazon", "Amazon Prime", 1499),
    ("disney", "Disney+", 899),
];

pub fn builtin_templates() -> Vec<SubscriptionTemplate> {
    TEMPLATES
        .iter()
        .map(|&(key, name, cents)| SubscriptionTemplate {
            key,
            name,
            amount: Decimal::new(cents, 2),
        })
        .collect()
}

pub fn find_template(key: &str) -> Option<SubscriptionTemplate> {
    builtin_templates().into_iter().find(|t| t.key == key)
}
