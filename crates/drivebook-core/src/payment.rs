//! The payment processor seam.
//!
//! The service never touches card data: it asks the processor for a payment
//! intent, hands the client secret to the customer's browser, and later asks
//! the processor whether that intent succeeded.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// Processor-side state of a payment intent. Only `Succeeded` confirms a
/// booking; everything else is passed through for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  RequiresPaymentMethod,
  RequiresConfirmation,
  RequiresAction,
  Processing,
  Succeeded,
  Canceled,
  #[serde(other)]
  Unknown,
}

/// A payment intent as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
  pub id:            String,
  pub client_secret: Option<String>,
  pub status:        PaymentStatus,
  /// Amount in minor currency units.
  pub amount:        i64,
  pub currency:      String,
  /// The booking confirmation reference attached at creation.
  pub reference:     Option<String>,
}

/// Input to [`PaymentProcessor::create_payment_intent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
  /// Amount in minor currency units (cents).
  pub amount:    i64,
  pub currency:  String,
  pub reference: String,
}

/// Abstraction over a hosted payment processor.
pub trait PaymentProcessor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn create_payment_intent(
    &self,
    request: PaymentRequest,
  ) -> impl Future<Output = Result<PaymentIntent, Self::Error>> + Send + '_;

  fn retrieve_payment_intent<'a>(
    &'a self,
    intent_id: &'a str,
  ) -> impl Future<Output = Result<PaymentIntent, Self::Error>> + Send + 'a;
}
