//! Per-contributor settlement lifecycle.
//!
//! ```text
//! Unverified ──verify──► Verified ──charge──► Paid
//! ```
//!
//! Nothing ever moves a contributor backwards. Charging an unverified
//! contributor is rejected; repeating a verification (or a charge on a paid
//! contributor) is a no-op.

use serde::Serialize;

use crate::errors::{Error, Result};
use crate::types::Contributor;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributorState {
    Unverified,
    Verified,
    Paid,
}

impl ContributorState {
    pub fn of(contributor: &Contributor) -> Self {
        if contributor.has_paid {
            Self::Paid
        } else if contributor.has_verified {
            Self::Verified
        } else {
            Self::Unverified
        }
    }
}

/// Results reported by the payment gateway.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContributorEvent {
    /// Payment method verified without charging.
    Verify,
    /// Allocated amount charged.
    Charge,
}

/// A state change actually applied to a contributor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub contributor_id: String,
    pub from: ContributorState,
    pub to: ContributorState,
}

/// The transition table. `Ok(None)` is an idempotent no-op.
pub fn next_state(
    state: ContributorState,
    event: ContributorEvent,
) -> std::result::Result<Option<ContributorState>, ContributorState> {
    use ContributorEvent::*;
    use ContributorState::*;

    match (state, event) {
        (Unverified, Verify) => Ok(Some(Verified)),
        (Verified, Charge) => Ok(Some(Paid)),
        (Verified | Paid, Verify) | (Paid, Charge) => Ok(None),
        (Unverified, Charge) => Err(Unverified),
    }
}

impl Contributor {
    pub fn state(&self) -> ContributorState {
        ContributorState::of(self)
    }

    /// Apply `event`, returning the transition taken or `None` for a no-op.
    pub fn apply(&mut self, event: ContributorEvent) -> Result<Option<Transition>> {
        let from = self.state();
        let to = match next_state(from, event) {
            Ok(Some(to)) => to,
            Ok(None) => return Ok(None),
            Err(_) => return Err(Error::NotVerified(self.id.clone())),
        };

        match to {
            ContributorState::Verified => self.has_verified = true,
            ContributorState::Paid => {
                self.has_verified = true;
                self.has_paid = true;
            }
            ContributorState::Unverified => {}
        }

        Ok(Some(Transition {
            contributor_id: self.id.clone(),
            from,
            to,
        }))
    }
}
