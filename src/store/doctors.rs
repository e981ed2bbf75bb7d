use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::ApiError;

pub const DAILY_LIMIT_VERIFIED: i64 = 50;
pub const DAILY_LIMIT_UNVERIFIED: i64 = 5;

fn limit_for(is_verified: bool) -> i64 {
    if is_verified {
        DAILY_LIMIT_VERIFIED
    } else {
        DAILY_LIMIT_UNVERIFIED
    }
}

/// One row of the doctors table. Field order is the canonical schema;
/// every access goes through the named fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub email: String,
    pub name: String,
    pub mobile: String,
    pub reg_number: String,
    pub is_verified: bool,
    pub otp: Option<String>,
    pub otp_expiry: Option<String>,
    pub last_query_date: Option<String>,
    pub daily_query_count: i64,
    pub total_queries: i64,
}

impl Doctor {
    pub fn daily_limit(&self) -> i64 {
        limit_for(self.is_verified)
    }

    /// Daily count as observed on `today`: the stored value counts only
    /// while the stored last-query-date matches, otherwise zero.
    pub fn effective_daily_count(&self, today: &str) -> i64 {
        if self.last_query_date.as_deref() == Some(today) {
            self.daily_query_count
        } else {
            0
        }
    }
}

/// Outcome of an atomic quota consumption.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaReceipt {
    pub daily_count: i64,
    pub total_queries: i64,
    pub limit: i64,
}

impl QuotaReceipt {
    pub fn remaining(&self) -> i64 {
        self.limit - self.daily_count
    }
}

#[derive(Clone)]
pub struct DoctorStore {
    pool: SqlitePool,
}

impl DoctorStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to doctors db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS doctors (
                email TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                mobile TEXT NOT NULL,
                reg_number TEXT NOT NULL,
                is_verified INTEGER NOT NULL DEFAULT 0,
                otp TEXT,
                otp_expiry TEXT,
                last_query_date TEXT,
                daily_query_count INTEGER NOT NULL DEFAULT 0,
                total_queries INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init doctors table: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn insert(&self, doctor: &Doctor) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO doctors (email, name, mobile, reg_number, is_verified, otp, otp_expiry)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&doctor.email)
        .bind(&doctor.name)
        .bind(&doctor.mobile)
        .bind(&doctor.reg_number)
        .bind(doctor.is_verified as i64)
        .bind(&doctor.otp)
        .bind(&doctor.otp_expiry)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::BadRequest("Email already registered".to_string())
            }
            _ => ApiError::internal(e),
        })?;

        Ok(())
    }

    pub async fn get(&self, email: &str) -> Result<Option<Doctor>, ApiError> {
        let row = sqlx::query("SELECT * FROM doctors WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_doctor))
    }

    /// Flip the verification flag. Returns false when there was no
    /// unverified row to flip, so re-verification after success is a no-op.
    pub async fn mark_verified(&self, email: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("UPDATE doctors SET is_verified = 1 WHERE email = ? AND is_verified = 0")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    /// Raw overwrite of the quota columns. No arithmetic, no validation;
    /// an unknown email touches zero rows.
    pub async fn overwrite_quota(
        &self,
        email: &str,
        daily_count: i64,
        total_queries: i64,
        date: &str,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE doctors SET last_query_date = ?, daily_query_count = ?, total_queries = ?
             WHERE email = ?",
        )
        .bind(date)
        .bind(daily_count)
        .bind(total_queries)
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Atomic read-increment-write of the quota counters: one conditional
    /// UPDATE applies the date-reset rule, enforces the limit and writes
    /// the incremented counts with today's date. Concurrent consumes
    /// serialize on the statement's write lock.
    pub async fn consume_quota(&self, email: &str, today: &str) -> Result<QuotaReceipt, ApiError> {
        let row = sqlx::query(
            "UPDATE doctors SET
                daily_query_count = CASE WHEN last_query_date = ?1 THEN daily_query_count + 1 ELSE 1 END,
                total_queries = total_queries + 1,
                last_query_date = ?1
             WHERE email = ?2
               AND (CASE WHEN last_query_date = ?1 THEN daily_query_count ELSE 0 END)
                 < (CASE WHEN is_verified = 0 THEN ?3 ELSE ?4 END)
             RETURNING daily_query_count, total_queries, is_verified",
        )
        .bind(today)
        .bind(email)
        .bind(DAILY_LIMIT_UNVERIFIED)
        .bind(DAILY_LIMIT_VERIFIED)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if let Some(row) = row {
            return Ok(QuotaReceipt {
                daily_count: row.get("daily_query_count"),
                total_queries: row.get("total_queries"),
                limit: limit_for(row.get::<i64, _>("is_verified") != 0),
            });
        }

        // Zero rows updated: either no such doctor, or the day's limit is
        // already spent.
        match self.get(email).await? {
            None => Err(ApiError::NotFound("Doctor not found".to_string())),
            Some(doctor) => Err(ApiError::QuotaExceeded(doctor.daily_limit())),
        }
    }

    fn row_to_doctor(row: &sqlx::sqlite::SqliteRow) -> Doctor {
        Doctor {
            email: row.get("email"),
            name: row.get("name"),
            mobile: row.get("mobile"),
            reg_number: row.get("reg_number"),
            is_verified: row.get::<i64, _>("is_verified") != 0,
            otp: row.try_get::<Option<String>, _>("otp").unwrap_or(None),
            otp_expiry: row.try_get::<Option<String>, _>("otp_expiry").unwrap_or(None),
            last_query_date: row
                .try_get::<Option<String>, _>("last_query_date")
                .unwrap_or(None),
            daily_query_count: row.get("daily_query_count"),
            total_queries: row.get("total_queries"),
        }
    }
}
