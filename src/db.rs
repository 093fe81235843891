//! Database module
//!
//! Connectivity and schema checks. Table definitions live with the
//! deployment, not in this crate.

use sqlx::PgPool;

/// Tables the Postgres unit of work reads and writes
pub const REQUIRED_TABLES: [&str; 2] = ["users", "otps"];

/// Round-trip a trivial query
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check that every required table exists
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        if !table_exists(pool, table).await? {
            tracing::error!(table = %table, "Required table does not exist");
            return Ok(false);
        }
    }

    tracing::info!(tables = ?REQUIRED_TABLES, "Database schema verified");
    Ok(true)
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = 'public' AND table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
}
