//! Stripe implementation of [`PaymentProcessor`].
//!
//! Talks to the PaymentIntents REST API directly with form-encoded requests.
//! The booking's confirmation reference travels as intent metadata so that a
//! later confirmation can be checked against the booking it claims to pay.

use std::{collections::HashMap, time::Duration};

use drivebook_core::payment::{PaymentIntent, PaymentProcessor, PaymentRequest, PaymentStatus};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;

const REFERENCE_KEY: &str = "booking_reference";

#[derive(Debug, Deserialize, Clone)]
pub struct StripeConfig {
  pub secret_key: String,
  #[serde(default = "default_api_base")]
  pub api_base:   String,
}

fn default_api_base() -> String { "https://api.stripe.com".into() }

#[derive(Debug, Error)]
pub enum StripeError {
  #[error("stripe request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("stripe returned {status}: {message}")]
  Api { status: StatusCode, message: String },
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct StripeClient {
  client: Client,
  config: StripeConfig,
}

impl StripeClient {
  pub fn new(config: StripeConfig) -> Result<Self, StripeError> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/v1{}", self.config.api_base.trim_end_matches('/'), path)
  }

  async fn read_intent(resp: Response) -> Result<PaymentIntent, StripeError> {
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(StripeError::Api { status, message: error_message(&body) });
    }
    let raw: RawIntent = resp.json().await?;
    Ok(raw.into())
  }
}

impl PaymentProcessor for StripeClient {
  type Error = StripeError;

  async fn create_payment_intent(
    &self,
    request: PaymentRequest,
  ) -> Result<PaymentIntent, Self::Error> {
    let metadata_key = format!("metadata[{REFERENCE_KEY}]");
    let form: [(&str, String); 4] = [
      ("amount", request.amount.to_string()),
      ("currency", request.currency.to_lowercase()),
      ("automatic_payment_methods[enabled]", "true".to_string()),
      (metadata_key.as_str(), request.reference.clone()),
    ];
    let resp = self
      .client
      .post(self.url("/payment_intents"))
      .bearer_auth(&self.config.secret_key)
      .form(&form)
      .send()
      .await?;

    let intent = Self::read_intent(resp).await?;
    tracing::info!(intent_id = %intent.id, reference = %request.reference, "payment intent created");
    Ok(intent)
  }

  async fn retrieve_payment_intent<'a>(
    &'a self,
    intent_id: &'a str,
  ) -> Result<PaymentIntent, Self::Error> {
    let resp = self
      .client
      .get(self.url(&format!("/payment_intents/{intent_id}")))
      .bearer_auth(&self.config.secret_key)
      .send()
      .await?;
    Self::read_intent(resp).await
  }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawIntent {
  id:            String,
  client_secret: Option<String>,
  status:        PaymentStatus,
  amount:        i64,
  currency:      String,
  #[serde(default)]
  metadata:      HashMap<String, String>,
}

impl From<RawIntent> for PaymentIntent {
  fn from(mut raw: RawIntent) -> Self {
    PaymentIntent {
      reference:     raw.metadata.remove(REFERENCE_KEY),
      id:            raw.id,
      client_secret: raw.client_secret,
      status:        raw.status,
      amount:        raw.amount,
      currency:      raw.currency,
    }
  }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
  message: Option<String>,
}

/// Pull `error.message` out of a Stripe error body, falling back to the raw
/// text.
fn error_message(body: &str) -> String {
  serde_json::from_str::<ErrorEnvelope>(body)
    .ok()
    .and_then(|e| e.error.message)
    .unwrap_or_else(|| body.trim().to_owned())
}
