//! Hosted payment gateway boundary.
//!
//! The gateway is redirect-based: `create_session` yields a hosted-checkout
//! URL the customer is sent to, and the gateway later redirects back to our
//! callback endpoint carrying a signed token. The callback token is an HS256
//! JWT over the transaction id and outcome, verified with the shared
//! gateway secret before any outcome is trusted.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Money, SessionOutcome};

#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub redirect_url: String,
    pub gateway_session_id: String,
}

#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub transaction_id: String,
    pub customer_id: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        amount: Money,
        currency: &str,
        metadata: &SessionMetadata,
    ) -> Result<GatewaySession, AppError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckoutClaims {
    sub: String,
    merchant: String,
    amount: String,
    currency: String,
    exp: usize,
    iat: usize,
}

/// Redirect-style hosted checkout provider.
#[derive(Clone)]
pub struct HostedCheckoutGateway {
    base_url: String,
    merchant_id: String,
    secret: String,
}

impl HostedCheckoutGateway {
    pub fn new(base_url: impl Into<String>, merchant_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            merchant_id: merchant_id.into(),
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    async fn create_session(
        &self,
        amount: Money,
        currency: &str,
        metadata: &SessionMetadata,
    ) -> Result<GatewaySession, AppError> {
        let now = Utc::now();
        let claims = CheckoutClaims {
            sub: metadata.transaction_id.clone(),
            merchant: self.merchant_id.clone(),
            amount: amount.to_string(),
            currency: currency.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + Duration::minutes(30)).timestamp() as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::external(format!("Gateway session signing failed: {e}")))?;

        let gateway_session_id = Uuid::new_v4().to_string();
        Ok(GatewaySession {
            redirect_url: format!(
                "{}/checkout?session={}&order={}",
                self.base_url, gateway_session_id, token
            ),
            gateway_session_id,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallbackClaims {
    pub sub: String,
    pub outcome: String,
    pub exp: usize,
    pub iat: usize,
}

/// Verifies the signed callback token and returns the outcome it attests
/// for the given transaction. The unauthenticated query parameters are
/// never trusted on their own.
pub fn verify_callback_token(
    token: &str,
    secret: &str,
    transaction_id: &str,
) -> Result<SessionOutcome, AppError> {
    let data = decode::<CallbackClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::unauthorized(format!("Invalid gateway callback signature: {e}")))?;

    if data.claims.sub != transaction_id {
        return Err(AppError::unauthorized(
            "Gateway callback signature does not match this transaction",
        ));
    }
    SessionOutcome::parse(&data.claims.outcome)
        .filter(SessionOutcome::is_terminal)
        .ok_or_else(|| AppError::validation(format!("Unknown gateway outcome '{}'", data.claims.outcome)))
}

/// Signs a callback token the way the gateway does. Used by tests and
/// sandbox tooling.
pub fn sign_callback_token(
    secret: &str,
    transaction_id: &str,
    outcome: SessionOutcome,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = CallbackClaims {
        sub: transaction_id.to_string(),
        outcome: outcome.as_str().to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(30)).timestamp() as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("Callback token signing failed: {e}")))
}

/// Scripted gateway double for workflow tests.
#[cfg(test)]
pub struct MockGateway {
    fail: std::sync::atomic::AtomicBool,
    created: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockGateway {
    pub fn new() -> Self {
        Self {
            fail: std::sync::atomic::AtomicBool::new(false),
            created: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sessions_created(&self) -> usize {
        self.created.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_session(
        &self,
        _amount: Money,
        _currency: &str,
        metadata: &SessionMetadata,
    ) -> Result<GatewaySession, AppError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::external("Gateway unreachable"));
        }
        self.created.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(GatewaySession {
            redirect_url: format!("https://gateway.test/checkout?txn={}", metadata.transaction_id),
            gateway_session_id: format!("GW-{}", metadata.transaction_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_token_round_trips() {
        let token = sign_callback_token("s3cret", "txn-1", SessionOutcome::Success).unwrap();
        let outcome = verify_callback_token(&token, "s3cret", "txn-1").unwrap();
        assert_eq!(outcome, SessionOutcome::Success);
    }

    #[test]
    fn callback_token_rejects_wrong_secret_or_transaction() {
        let token = sign_callback_token("s3cret", "txn-1", SessionOutcome::Success).unwrap();
        assert!(verify_callback_token(&token, "other", "txn-1").is_err());
        assert!(verify_callback_token(&token, "s3cret", "txn-2").is_err());
    }

    #[tokio::test]
    async fn hosted_gateway_embeds_session_and_signed_order() {
        let gateway = HostedCheckoutGateway::new("https://pay.example", "M100", "s3cret");
        let meta = SessionMetadata { transaction_id: "txn-9".into(), customer_id: 4 };
        let session = gateway
            .create_session(Money::from_cents(15_511), "LKR", &meta)
            .await
            .unwrap();
        assert!(session.redirect_url.starts_with("https://pay.example/checkout?session="));
        assert!(session.redirect_url.contains(&session.gateway_session_id));
    }
}
