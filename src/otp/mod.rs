use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::otp::OneTimeCode;
use crate::store::OtpIssuer;

/// Issues 4-digit ride start codes and keeps them until process exit.
pub struct InMemoryOtpIssuer {
    codes: DashMap<Uuid, OneTimeCode>,
    ttl: chrono::Duration,
}

impl InMemoryOtpIssuer {
    pub fn new(ttl: Duration) -> Self {
        Self::with_ttl(chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1)))
    }

    /// A negative `ttl` issues codes that are already expired.
    pub fn with_ttl(ttl: chrono::Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl,
        }
    }
}

#[async_trait]
impl OtpIssuer for InMemoryOtpIssuer {
    async fn issue(&self, contact: &str) -> Result<OneTimeCode, AppError> {
        if contact.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "a contact number is required to issue a ride start code".to_string(),
            ));
        }

        let code = rand::thread_rng().gen_range(1000..10000).to_string();
        let otp = OneTimeCode {
            id: Uuid::new_v4(),
            code,
            sent_to: contact.to_string(),
            expires_at: Utc::now() + self.ttl,
        };

        debug!(otp_id = %otp.id, sent_to = %otp.sent_to, "ride start code issued");
        self.codes.insert(otp.id, otp.clone());
        Ok(otp)
    }

    async fn validate(&self, id: Uuid, code: &str) -> bool {
        match self.codes.get(&id) {
            Some(otp) => otp.code == code && !otp.is_expired_at(Utc::now()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::InMemoryOtpIssuer;
    use crate::store::OtpIssuer;

    #[tokio::test]
    async fn issued_code_validates() {
        let issuer = InMemoryOtpIssuer::new(Duration::from_secs(60));
        let otp = issuer.issue("+15550100").await.unwrap();

        assert_eq!(otp.code.len(), 4);
        assert!(otp.code.chars().all(|c| c.is_ascii_digit()));
        assert!(issuer.validate(otp.id, &otp.code).await);
    }

    #[tokio::test]
    async fn mismatched_or_unknown_code_is_rejected() {
        let issuer = InMemoryOtpIssuer::new(Duration::from_secs(60));
        let otp = issuer.issue("+15550100").await.unwrap();

        assert!(!issuer.validate(otp.id, "0000").await);
        assert!(!issuer.validate(Uuid::new_v4(), &otp.code).await);
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let issuer = InMemoryOtpIssuer::with_ttl(chrono::Duration::minutes(-1));
        let otp = issuer.issue("+15550100").await.unwrap();

        assert!(!issuer.validate(otp.id, &otp.code).await);
    }
}
