use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;

use crate::core::errors::ApiError;
use crate::store::doctors::{Doctor, DoctorStore, QuotaReceipt};

/// Minutes an OTP stays valid after registration.
const OTP_TTL_MINUTES: i64 = 10;

/// Quota state as observed by a read-only check.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaView {
    pub daily_count: i64,
    pub total_queries: i64,
    pub limit: i64,
}

/// Per-doctor access gate: registration, OTP verification and the daily
/// query quota, all backed by the doctors table.
#[derive(Clone)]
pub struct AccessGate {
    store: DoctorStore,
}

impl AccessGate {
    pub fn new(store: DoctorStore) -> Self {
        Self { store }
    }

    /// Register a new doctor. Stores the record unverified with a fresh
    /// 6-digit OTP expiring ten minutes out, and returns the OTP for
    /// out-of-band delivery.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        mobile: &str,
        reg_number: &str,
    ) -> Result<String, ApiError> {
        let otp = generate_otp();
        let expiry = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);

        let doctor = Doctor {
            email: email.to_string(),
            name: name.to_string(),
            mobile: mobile.to_string(),
            reg_number: reg_number.to_string(),
            is_verified: false,
            otp: Some(otp.clone()),
            otp_expiry: Some(expiry.to_rfc3339()),
            last_query_date: None,
            daily_query_count: 0,
            total_queries: 0,
        };

        self.store.insert(&doctor).await?;
        Ok(otp)
    }

    /// Decide an OTP attempt. NotFound for an unknown doctor; otherwise
    /// true only when the code matches and the expiry has not passed.
    /// A doctor who is already verified gets false (nothing left to flip).
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<bool, ApiError> {
        let doctor = self
            .store
            .get(email)
            .await?
            .ok_or_else(|| ApiError::NotFound("Doctor not found".to_string()))?;

        let Some(stored) = doctor.otp.as_deref() else {
            return Ok(false);
        };
        if stored != code {
            return Ok(false);
        }

        let Some(expiry) = doctor.otp_expiry.as_deref().and_then(parse_expiry) else {
            return Ok(false);
        };
        if Utc::now() > expiry {
            return Ok(false);
        }

        self.store.mark_verified(email).await
    }

    /// Read-only quota check against today's UTC date. Nothing is written:
    /// a stale last-query-date only makes the observed daily count zero.
    pub async fn check_quota(&self, email: &str) -> Result<QuotaView, ApiError> {
        let doctor = self
            .store
            .get(email)
            .await?
            .ok_or_else(|| ApiError::NotFound("Doctor not found".to_string()))?;

        let today = today_utc();
        let daily_count = doctor.effective_daily_count(&today);
        let limit = doctor.daily_limit();

        if daily_count >= limit {
            return Err(ApiError::QuotaExceeded(limit));
        }

        Ok(QuotaView {
            daily_count,
            total_queries: doctor.total_queries,
            limit,
        })
    }

    /// Raw passthrough write of the quota columns. The caller supplies the
    /// already-computed values; nothing here counts or validates.
    pub async fn record_query(
        &self,
        email: &str,
        daily_count: i64,
        total_queries: i64,
        date: &str,
    ) -> Result<(), ApiError> {
        self.store
            .overwrite_quota(email, daily_count, total_queries, date)
            .await
    }

    /// Atomically spend one query from today's quota.
    pub async fn consume(&self, email: &str) -> Result<QuotaReceipt, ApiError> {
        self.store.consume_quota(email, &today_utc()).await
    }
}

fn generate_otp() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000))
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn today_utc() -> String {
    Utc::now().date_naive().to_string()
}
