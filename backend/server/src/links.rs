//! Shareable web-app links for a pool.

use reqwest::Url;
use rust_decimal::Decimal;

use crate::errors::{Result, ServerError};

fn app_url(base_url: &str, section: &str, pool_id: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ServerError::Config(format!("Invalid PUBLIC_BASE_URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| ServerError::Config("PUBLIC_BASE_URL cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(["app", section, pool_id]);
    Ok(url)
}

/// Link a contributor opens to verify and pay their share.
pub fn payment_link(base_url: &str, pool_id: &str, contributor_name: Option<&str>) -> Result<String> {
    let mut url = app_url(base_url, "pay", pool_id)?;
    if let Some(name) = contributor_name.filter(|n| !n.is_empty()) {
        url.query_pairs_mut().append_pair("name", name);
    }
    Ok(url.into())
}

/// Link the collector uses to manage the pool.
pub fn collector_link(base_url: &str, pool_id: &str, amount: Option<Decimal>) -> Result<String> {
    let mut url = app_url(base_url, "collect", pool_id)?;
    if let Some(amount) = amount.filter(|a| !a.is_zero()) {
        url.query_pairs_mut()
            .append_pair("amount", &format!("{:.2}", amount));
    }
    Ok(url.into())
}
