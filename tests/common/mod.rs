//! Common test utilities
#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;

use phone_signup::config::OtpSettings;
use phone_signup::services::{
    Argon2Hasher, CapturingSmsService, HmacHasher, IdGenerator, SmsService, SnowflakeIdGenerator,
};
use phone_signup::uow::{InMemoryStore, UnitOfWorkFactory};
use phone_signup::{bootstrap, Dependencies, MessageBus};

pub const TEST_HMAC_KEY: &[u8] = b"integration-test-hmac-key";

/// One generator per test process so parallel tests never collide on ids
pub fn id_generator() -> Arc<SnowflakeIdGenerator> {
    static IDS: OnceLock<Arc<SnowflakeIdGenerator>> = OnceLock::new();
    IDS.get_or_init(|| {
        Arc::new(SnowflakeIdGenerator::new(Default::default()).expect("valid snowflake settings"))
    })
    .clone()
}

pub fn next_id() -> u64 {
    id_generator().next_id()
}

/// Capabilities over an arbitrary unit-of-work backend
pub fn dependencies(
    settings: OtpSettings,
    uow: Arc<dyn UnitOfWorkFactory>,
    sms: Arc<dyn SmsService>,
) -> Dependencies {
    Dependencies {
        config: Arc::new(settings),
        uow,
        idgen: id_generator(),
        hmac_hasher: Arc::new(HmacHasher::new(TEST_HMAC_KEY.to_vec())),
        pwd_hasher: Arc::new(Argon2Hasher::new()),
        sms_service: sms,
        publisher: None,
    }
}

/// A fully wired bus over the in-memory backend
pub struct InMemoryApp {
    pub bus: MessageBus,
    pub store: InMemoryStore,
    pub sms: Arc<CapturingSmsService>,
}

pub fn in_memory_app(settings: OtpSettings) -> InMemoryApp {
    let store = InMemoryStore::new();
    let sms = Arc::new(CapturingSmsService::new());
    let bus = bootstrap(dependencies(settings, Arc::new(store.clone()), sms.clone()))
        .expect("wiring must succeed");

    InMemoryApp { bus, store, sms }
}

/// A phone number no other test uses
pub fn unique_phone() -> String {
    let n: u64 = rand::thread_rng().gen_range(0..10_000_000_000);
    format!("+1999{:010}", n)
}

// =========================================================================
// Postgres
// =========================================================================

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGINT PRIMARY KEY,
        phone TEXT NOT NULL,
        pwdhash TEXT NOT NULL,
        first_name TEXT,
        last_name TEXT,
        sex TEXT NOT NULL,
        status TEXT NOT NULL,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS users_phone_active_key
        ON users (phone) WHERE deleted_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS otps (
        id BIGINT PRIMARY KEY,
        phone TEXT NOT NULL,
        intent TEXT NOT NULL,
        status TEXT NOT NULL,
        otp_hash TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        ipaddr TEXT NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        consumed_at TIMESTAMPTZ
    )
    "#,
];

static SCHEMA_READY: OnceCell<()> = OnceCell::const_new();

/// Connect and create the tables, or `None` when `DATABASE_URL` is unset
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    SCHEMA_READY
        .get_or_init(|| async {
            for statement in SCHEMA {
                sqlx::query(statement)
                    .execute(&pool)
                    .await
                    .expect("Failed to create test schema");
            }
        })
        .await;

    Some(pool)
}
