//! Business registration and the payment-processor connect handshake.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::errors::{Error, Result};
use crate::payment::PaymentGateway;
use crate::storage::{BusinessStore, StoreError};
use crate::types::Business;

#[derive(Clone)]
pub struct BusinessDirectory {
    businesses: Arc<dyn BusinessStore>,
    payments: Arc<dyn PaymentGateway>,
}

impl BusinessDirectory {
    pub fn new(businesses: Arc<dyn BusinessStore>, payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            businesses,
            payments,
        }
    }

    pub async fn register(&self, name: &str, email: &str) -> Result<Business> {
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() || email.is_empty() {
            return Err(Error::InvalidOperation(
                "a business needs a name and an email".to_string(),
            ));
        }

        let mut business = Business {
            id: String::new(),
            name: name.to_string(),
            email: email.to_string(),
            stripe_account_id: None,
            stripe_connected: false,
            created_at: Utc::now(),
        };
        business.id = self.businesses.create_business(business.clone()).await?;
        info!(business_id = %business.id, "Business registered");
        Ok(business)
    }

    pub async fn get(&self, business_id: &str) -> Result<Business> {
        self.businesses
            .get_business(business_id)
            .await?
            .ok_or_else(|| Error::BusinessNotFound(business_id.to_string()))
    }

    pub async fn connect_url(&self, business_id: &str, redirect_uri: &str) -> Result<String> {
        let business = self.get(business_id).await?;
        Ok(self
            .payments
            .generate_connect_url(&business.id, redirect_uri)
            .await?)
    }

    /// Finish the OAuth handshake. `state` carries the business id that was
    /// embedded in the connect URL.
    pub async fn complete_connect(&self, code: &str, state: &str) -> Result<Business> {
        if code.trim().is_empty() {
            return Err(Error::InvalidOperation(
                "missing authorization code".to_string(),
            ));
        }
        let business = self.get(state).await?;
        let account_id = self.payments.exchange_auth_code(code).await?;

        match self
            .businesses
            .set_stripe_account(&business.id, &account_id)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(Error::BusinessNotFound(business.id)),
            Err(e) => return Err(e.into()),
        }
        info!(business_id = %business.id, %account_id, "Payment account connected");

        Ok(Business {
            stripe_account_id: Some(account_id),
            stripe_connected: true,
            ..business
        })
    }

    pub async fn login_link(&self, business_id: &str) -> Result<String> {
        let business = self.get(business_id).await?;
        let account_id = match (&business.stripe_account_id, business.stripe_connected) {
            (Some(account_id), true) => account_id,
            _ => return Err(Error::NotConnected(business.id.clone())),
        };
        Ok(self.payments.create_login_link(account_id).await?)
    }
}
