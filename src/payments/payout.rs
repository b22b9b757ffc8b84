//! Token payout dispatch to the external payment API

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;

/// Payout service for round rewards
#[derive(Clone)]
pub struct PayoutService {
    client: Client,
    api_url: String,
    api_key: String,
}

/// Payout request body
#[derive(Debug, Serialize)]
struct PayoutRequest<'a> {
    round_number: u64,
    amount: u64,
    recipients: &'a [String],
}

/// Payout API acknowledgement
#[derive(Debug, Deserialize)]
struct PayoutResponse {
    batch_id: String,
}

impl PayoutService {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            api_url: config.payout_api_url.clone(),
            api_key: config.payout_api_key.clone(),
        }
    }

    /// Send one round's reward to every winner wallet. Winners without a
    /// linked wallet were already filtered out by the caller.
    pub async fn distribute_to_winners(
        &self,
        round_number: u64,
        wallets: &[String],
        amount_per_player: u64,
    ) -> Result<(), PayoutError> {
        if wallets.is_empty() {
            return Ok(());
        }

        let body = PayoutRequest {
            round_number,
            amount: amount_per_player,
            recipients: wallets,
        };

        let response = self
            .client
            .post(format!("{}/payouts", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(PayoutError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PayoutError::Api { status: status.as_u16(), body });
        }

        let ack: PayoutResponse = response.json().await.map_err(PayoutError::Request)?;
        info!(
            round = round_number,
            recipients = wallets.len(),
            batch_id = %ack.batch_id,
            "Payout dispatched"
        );
        Ok(())
    }
}

/// Payout-related errors
#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Payout API error (status {status}): {body}")]
    Api { status: u16, body: String },
}
