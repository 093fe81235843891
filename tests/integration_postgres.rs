//! Postgres unit of work and signup flow
//!
//! Skipped unless `DATABASE_URL` points at a scratch database.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use phone_signup::config::OtpSettings;
use phone_signup::domain::{Otp, OtpIntent, User, UserSex};
use phone_signup::jobs::{JobScheduler, JobSchedulerConfig};
use phone_signup::services::CapturingSmsService;
use phone_signup::uow::{OtpLock, OtpRepo, PgUnitOfWorkFactory, UnitOfWork, UnitOfWorkFactory, UserRepo};
use phone_signup::{bootstrap, DomainError, IssueSignupOtp, OtpStatus, Signup, VerifyOtp};

use common::{dependencies, next_id, setup_test_db, unique_phone};

const IP: &str = "198.51.100.20";

// Repeated runs share the origin address
fn unlimited() -> OtpSettings {
    OtpSettings {
        rate_limit_max_requests: u32::MAX,
        ..OtpSettings::default()
    }
}

#[tokio::test]
async fn test_pg_signup_flow() {
    let Some(pool) = setup_test_db().await else { return };

    let sms = Arc::new(CapturingSmsService::new());
    let factory = Arc::new(PgUnitOfWorkFactory::new(pool.clone()));
    let bus = bootstrap(dependencies(unlimited(), factory, sms.clone())).unwrap();
    let phone = unique_phone();

    let otp = bus.handle(IssueSignupOtp::new(phone.as_str(), IP)).await.unwrap();
    let code = sms.last_code_for(&phone).unwrap();

    let consumed = bus.handle(VerifyOtp::new(otp.id, code, IP)).await.unwrap();
    assert_eq!(consumed.status, OtpStatus::Consumed);

    let user = bus
        .handle(Signup::new(otp.id, IP, "pg-password", UserSex::Female))
        .await
        .unwrap();
    assert_eq!(user.phone, phone);

    let status: String = sqlx::query_scalar("SELECT status FROM otps WHERE id = $1")
        .bind(otp.id as i64)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "used");

    let err = bus.handle(Signup::new(otp.id, IP, "pg-password", UserSex::Female)).await.unwrap_err();
    assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));
}

#[tokio::test]
async fn test_pg_concurrent_verify_consumes_once() {
    let Some(pool) = setup_test_db().await else { return };

    let sms = Arc::new(CapturingSmsService::new());
    let factory = Arc::new(PgUnitOfWorkFactory::new(pool.clone()));
    let bus = Arc::new(bootstrap(dependencies(unlimited(), factory, sms.clone())).unwrap());
    let phone = unique_phone();

    let otp_id = bus.handle(IssueSignupOtp::new(phone.as_str(), IP)).await.unwrap().id;
    let code = sms.last_code_for(&phone).unwrap();

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let bus = bus.clone();
            let code = code.clone();
            tokio::spawn(async move { bus.handle(VerifyOtp::new(otp_id, code, IP)).await })
        })
        .collect();

    let mut ok = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => ok += 1,
            Err(err) => assert_eq!(err.as_domain(), Some(&DomainError::AccessDenied)),
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test]
async fn test_pg_uncommitted_unit_leaves_no_rows() {
    let Some(pool) = setup_test_db().await else { return };
    let factory = PgUnitOfWorkFactory::new(pool.clone());
    let now = Utc::now();
    let id = next_id();

    {
        let mut uow = factory.create();
        uow.begin().await.unwrap();
        let otp = Otp::issue(id, unique_phone(), OtpIntent::SignUp, "h".into(), IP.into(), now, now + Duration::minutes(5));
        uow.otps().unwrap().add(&otp).await.unwrap();
    }

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    assert!(uow.otps().unwrap().get(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pg_locking_read_filters_status_and_origin() {
    let Some(pool) = setup_test_db().await else { return };
    let factory = PgUnitOfWorkFactory::new(pool.clone());
    let now = Utc::now();
    let id = next_id();

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    let otp = Otp::issue(id, unique_phone(), OtpIntent::SignUp, "h".into(), IP.into(), now, now + Duration::minutes(5));
    uow.otps().unwrap().add(&otp).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    let repo = uow.otps().unwrap();
    let hit = repo.get_for_update(OtpLock { id, status: OtpStatus::Issued, ipaddr: IP }).await.unwrap();
    let wrong_status = repo.get_for_update(OtpLock { id, status: OtpStatus::Sent, ipaddr: IP }).await.unwrap();
    let wrong_origin = repo
        .get_for_update(OtpLock { id, status: OtpStatus::Issued, ipaddr: "10.0.0.1" })
        .await
        .unwrap();

    assert_eq!(hit.map(|o| o.id), Some(id));
    assert!(wrong_status.is_none());
    assert!(wrong_origin.is_none());
}

#[tokio::test]
async fn test_pg_duplicate_active_phone_is_conflict() {
    let Some(pool) = setup_test_db().await else { return };
    let factory = PgUnitOfWorkFactory::new(pool.clone());
    let phone = unique_phone();
    let now = Utc::now();

    let first_id = next_id();

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    uow.users()
        .unwrap()
        .add(&User::register(first_id, phone.clone(), "x".into(), UserSex::Male, None, None, now))
        .await
        .unwrap();
    uow.commit().await.unwrap();

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    let stored = uow.users().unwrap().get(first_id).await.unwrap().unwrap();
    assert_eq!(stored.phone, phone);
    assert!(stored.is_active());
    uow.rollback().await;

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    let result = uow
        .users()
        .unwrap()
        .add(&User::register(next_id(), phone.clone(), "y".into(), UserSex::Male, None, None, now))
        .await;

    assert!(matches!(
        result,
        Err(phone_signup::uow::PersistenceError::UniqueViolation(ref c)) if c == "users_phone_active_key"
    ));
}

#[tokio::test]
async fn test_pg_purge_keeps_used_and_recent_otps() {
    let Some(pool) = setup_test_db().await else { return };
    let factory = PgUnitOfWorkFactory::new(pool.clone());
    let long_ago = Utc::now() - Duration::days(3);

    let stale = Otp::issue(next_id(), unique_phone(), OtpIntent::SignUp, "h".into(), IP.into(), long_ago, long_ago + Duration::minutes(5));
    let mut used = Otp::issue(next_id(), unique_phone(), OtpIntent::SignUp, "h".into(), IP.into(), long_ago, long_ago + Duration::minutes(5));
    used.mark_sent("m", long_ago).unwrap();
    used.consume(long_ago).unwrap();
    used.mark_used(IP).unwrap();
    let fresh = Otp::issue(next_id(), unique_phone(), OtpIntent::SignUp, "h".into(), IP.into(), Utc::now(), Utc::now() + Duration::minutes(5));

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    for otp in [&stale, &used, &fresh] {
        uow.otps().unwrap().add(otp).await.unwrap();
    }
    uow.commit().await.unwrap();

    let scheduler = JobScheduler::with_config(
        pool.clone(),
        JobSchedulerConfig {
            otp_retention: Duration::days(1),
            ..JobSchedulerConfig::default()
        },
    );
    let report = scheduler.run_all_once().await;
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert!(report.otps_purged >= 1);

    let mut uow = factory.create();
    uow.begin().await.unwrap();
    let repo = uow.otps().unwrap();
    assert!(repo.get(stale.id).await.unwrap().is_none());
    assert!(repo.get(used.id).await.unwrap().is_some());
    assert!(repo.get(fresh.id).await.unwrap().is_some());
}
