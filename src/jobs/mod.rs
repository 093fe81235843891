//! Scheduled Jobs
//!
//! Periodic maintenance for the OTP table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::config::Config;

// =========================================================================
// Expired OTP purge
// =========================================================================

/// Delete OTPs that expired more than `retention` ago and were never used.
///
/// Used OTPs are kept as the signup audit trail.
pub async fn purge_expired_otps(pool: &PgPool, retention: chrono::Duration) -> Result<u64, JobError> {
    let cutoff = purge_cutoff(Utc::now(), retention);

    let result = sqlx::query(
        r#"
        DELETE FROM otps
        WHERE expires_at < $1
          AND status <> 'used'
        "#,
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    let rows_deleted = result.rows_affected();

    if rows_deleted > 0 {
        tracing::info!(
            rows_deleted = rows_deleted,
            cutoff = %cutoff,
            "Purged expired OTPs"
        );
    }

    Ok(rows_deleted)
}

/// Anything that expired before this instant is eligible for purge
fn purge_cutoff(now: DateTime<Utc>, retention: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(retention.max(chrono::Duration::zero()))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between OTP purges (default: 5 minutes)
    pub otp_cleanup_interval: Duration,
    /// How long expired OTPs are kept (default: 1 day)
    pub otp_retention: chrono::Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            otp_cleanup_interval: Duration::from_secs(300),
            otp_retention: chrono::Duration::days(1),
        }
    }
}

impl From<&Config> for JobSchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            otp_cleanup_interval: config.otp_cleanup_interval,
            otp_retention: config.otp_retention,
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    pool: PgPool,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn with_config(pool: PgPool, config: JobSchedulerConfig) -> Self {
        Self { pool, config }
    }

    /// Start the job scheduler in the background.
    /// Abort the returned handle to stop it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.otp_cleanup_interval.as_secs(),
            "Job scheduler started"
        );

        let mut cleanup_interval = interval(self.config.otp_cleanup_interval);

        loop {
            cleanup_interval.tick().await;
            if let Err(e) = purge_expired_otps(&self.pool, self.config.otp_retention).await {
                tracing::error!(error = %e, "Expired OTP purge failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match purge_expired_otps(&self.pool, self.config.otp_retention).await {
            Ok(count) => report.otps_purged = count,
            Err(e) => report.errors.push(format!("OTP purge: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub otps_purged: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_purge_cutoff_subtracts_retention() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();

        let cutoff = purge_cutoff(now, chrono::Duration::days(1));

        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_negative_retention_never_reaches_future() {
        let now = Utc::now();
        assert_eq!(purge_cutoff(now, chrono::Duration::seconds(-30)), now);
    }

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.otp_cleanup_interval, Duration::from_secs(300));
        assert_eq!(config.otp_retention, chrono::Duration::hours(24));
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.otps_purged, 0);
        assert!(report.errors.is_empty());
    }
}
