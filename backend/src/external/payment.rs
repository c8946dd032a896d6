//! Payment gateway client.
//!
//! The gateway is opaque to this core: order placement never calls it; the
//! checkout-payment step creates an intent for an already-placed order.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};

/// Payment gateway client
#[derive(Clone)]
pub struct PaymentClient {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateIntentRequest<'a> {
    amount: Decimal,
    currency: &'a str,
    order_ref: &'a str,
}

/// A created payment intent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
}

impl PaymentClient {
    /// Create a new PaymentClient instance
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_endpoint.clone(),
        }
    }

    /// Create a payment intent for an order's frozen total.
    pub async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
        order_ref: &str,
    ) -> AppResult<PaymentIntent> {
        let url = format!("{}/v1/payment_intents", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&CreateIntentRequest {
                amount,
                currency,
                order_ref,
            })
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::PaymentGateway(format!(
                "Gateway returned {} for order {}",
                response.status(),
                order_ref
            )));
        }

        response
            .json::<PaymentIntent>()
            .await
            .map_err(|e| AppError::PaymentGateway(e.to_string()))
    }
}
