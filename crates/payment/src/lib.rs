//! Payment gateway adapter.
//!
//! Stands in for a real payment processor: creating an intent returns a
//! redirect URL the client must follow, and the later status callback is
//! what moves the order to PAID. The adapter is stateless.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the payment gateway.
///
/// A failure here must abort the enclosing order-creation transaction:
/// no order may be left waiting for a payment that cannot be made.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// A created payment intent with the redirect target for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    pub confirmation_url: String,
}

/// Gateway contract consumed by the order lifecycle engine.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent for `amount` tied to `order_id`.
    async fn create_payment(
        &self,
        amount: i64,
        order_id: &str,
    ) -> Result<PaymentIntent, PaymentError>;
}

/// Simulated gateway: issues a fresh payment id and points the client at
/// the payment-simulator page of the frontend.
pub struct SimulatedGateway {
    base_url: String,
}

impl SimulatedGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_payment(
        &self,
        amount: i64,
        order_id: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let payment_id = Uuid::new_v4().to_string();
        let confirmation_url = format!(
            "{}/payment-simulator?orderId={}&amount={}",
            self.base_url.trim_end_matches('/'),
            order_id,
            amount
        );

        Ok(PaymentIntent {
            id: payment_id,
            status: "pending".to_string(),
            confirmation_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_payment_redirect_url() {
        let gateway = SimulatedGateway::new("http://127.0.0.1:5173/");
        let intent = gateway.create_payment(400, "order-1").await.unwrap();

        assert_eq!(intent.status, "pending");
        assert_eq!(
            intent.confirmation_url,
            "http://127.0.0.1:5173/payment-simulator?orderId=order-1&amount=400"
        );
        assert!(!intent.id.is_empty());
    }

    #[tokio::test]
    async fn test_payment_ids_are_unique() {
        let gateway = SimulatedGateway::new("http://localhost");
        let a = gateway.create_payment(100, "o1").await.unwrap();
        let b = gateway.create_payment(100, "o1").await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
