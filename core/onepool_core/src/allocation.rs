//! # Allocation
//!
//! Pure functions that split a pool's total across its contributors.
//!
//! All currency values are rounded to the minor unit (two decimal places)
//! with half-up rounding. An even split rounds every share independently, so
//! the shares can miss the total by a few cents; [`assign_residual`] moves
//! those cents onto contributors from the front of the list, one cent each,
//! until the allocation is exact.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::errors::{Error, Result};
use crate::types::Contributor;

/// Decimal places of the currency's minor unit.
pub const MINOR_UNIT_SCALE: u32 = 2;

/// One cent.
pub const MINOR_UNIT: Decimal = Decimal::from_parts(1, 0, 0, false, MINOR_UNIT_SCALE);

/// Largest total or share a pool accepts.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Round half-up to the minor unit.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MINOR_UNIT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a user-supplied amount.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|_| Error::InvalidAmount(format!("'{raw}' is not a number")))
}

/// Reject amounts that are negative, above [`MAX_AMOUNT`] or finer than one
/// cent. `what` names the amount in the error message.
pub fn check_amount(value: Decimal, what: &str) -> Result<Decimal> {
    if value < Decimal::ZERO {
        return Err(Error::InvalidAmount(format!("{what} is negative ({value})")));
    }
    if value > MAX_AMOUNT {
        return Err(Error::InvalidAmount(format!(
            "{what} exceeds {MAX_AMOUNT} ({value})"
        )));
    }
    if value.normalize().scale() > MINOR_UNIT_SCALE {
        return Err(Error::InvalidAmount(format!(
            "{what} has more than {MINOR_UNIT_SCALE} decimal places ({value})"
        )));
    }
    Ok(value)
}

/// `total − Σ amount`, rounded. An empty list leaves the whole total.
///
/// Saturates instead of overflowing, so out-of-range inputs produce a
/// non-zero residual rather than a panic.
pub fn remaining(contributors: &[Contributor], total_amount: Decimal) -> Decimal {
    let allocated = contributors
        .iter()
        .fold(Decimal::ZERO, |acc, c| acc.saturating_add(c.amount));
    round_currency(total_amount.saturating_sub(allocated))
}

/// Give every contributor `total / n`, rounded. Residual cents stay visible
/// through [`remaining`].
pub fn distribute_evenly(
    contributors: &[Contributor],
    total_amount: Decimal,
) -> Result<Vec<Contributor>> {
    if contributors.is_empty() {
        return Err(Error::InvalidOperation(
            "cannot split an amount across zero contributors".to_string(),
        ));
    }

    let share = total_amount
        .checked_div(Decimal::from(contributors.len()))
        .map(round_currency)
        .ok_or_else(|| Error::InvalidAmount(format!("cannot split {total_amount}")))?;

    Ok(contributors
        .iter()
        .cloned()
        .map(|mut c| {
            c.amount = share;
            c
        })
        .collect())
}

/// True when the allocation adds up exactly and every contributor has a
/// name and a positive share.
pub fn can_finalize(contributors: &[Contributor], total_amount: Decimal) -> bool {
    remaining(contributors, total_amount).is_zero()
        && contributors
            .iter()
            .all(|c| !c.name.trim().is_empty() && c.amount > Decimal::ZERO)
}

/// Spread the residual reported by [`remaining`] over the contributors, one
/// cent per contributor starting from the first, so the allocation sums to
/// `total_amount` exactly. Cents are only taken from contributors that still
/// have some; an empty list is returned unchanged.
pub fn assign_residual(
    contributors: &[Contributor],
    total_amount: Decimal,
) -> Result<Vec<Contributor>> {
    let mut out: Vec<Contributor> = contributors
        .iter()
        .cloned()
        .map(|mut c| {
            c.amount = round_currency(c.amount);
            c
        })
        .collect();
    if out.is_empty() {
        return Ok(out);
    }

    let mut cents = out
        .iter()
        .map(|c| to_cents(c.amount))
        .collect::<Result<Vec<i64>>>()?;
    let residual = to_cents(remaining(&out, total_amount))?;
    let sign = residual.signum();
    let mut pending = residual.saturating_abs();

    while pending > 0 {
        let eligible: Vec<usize> = (0..cents.len())
            .filter(|&i| sign > 0 || cents[i] > 0)
            .collect();
        if eligible.is_empty() {
            break;
        }
        let share = (pending / eligible.len() as i64).max(1);
        for i in eligible {
            if pending == 0 {
                break;
            }
            let step = if sign > 0 {
                share.min(pending)
            } else {
                share.min(pending).min(cents[i])
            };
            cents[i] = cents[i].saturating_add(sign * step);
            pending -= step;
        }
    }

    for (c, value) in out.iter_mut().zip(cents) {
        c.amount = Decimal::new(value, MINOR_UNIT_SCALE);
    }
    Ok(out)
}

/// Even split with the residual assigned, so the result always finalizes
/// (given names).
pub fn split_evenly(
    contributors: &[Contributor],
    total_amount: Decimal,
) -> Result<Vec<Contributor>> {
    let shared = distribute_evenly(contributors, total_amount)?;
    assign_residual(&shared, total_amount)
}

fn to_cents(value: Decimal) -> Result<i64> {
    round_currency(value)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| Error::InvalidAmount(format!("{value} is out of range")))
}

/// Allocation figures for a pool, as shown to the collector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationSummary {
    pub total_amount: Decimal,
    pub allocated: Decimal,
    pub remaining: Decimal,
    pub can_finalize: bool,
}

pub fn summarize(contributors: &[Contributor], total_amount: Decimal) -> AllocationSummary {
    let remaining = remaining(contributors, total_amount);
    AllocationSummary {
        total_amount,
        allocated: round_currency(total_amount.saturating_sub(remaining)),
        remaining,
        can_finalize: can_finalize(contributors, total_amount),
    }
}
