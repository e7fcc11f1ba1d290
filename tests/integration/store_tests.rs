//! PostgreSQL store tests for the conditional writes
//!
//! Each test works on its own random calendar day in the past, so runs do not
//! see each other's visits.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::Rng;
use sqlx::postgres::PgPoolOptions;

use kiosk_server::{
    models::{
        action_token::{HostMutation, Redemption},
        notification::{DeliveryStatus, NewNotification, NotificationKind},
        visit::{CheckoutMethod, DayWindow, NewVisit, Visit, VisitStatus},
    },
    repository::{Repository, VisitStore},
    services::tokens,
};

async fn repository() -> Repository {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    Repository::new(pool)
}

/// A random day between 2000 and 2027
fn random_day() -> DayWindow {
    let offset = rand::thread_rng().gen_range(0..10_000);
    let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset);
    DayWindow {
        start,
        end: start + Duration::days(1),
    }
}

async fn seed(repo: &Repository, arrival: DateTime<Utc>) -> Visit {
    repo.insert_visit(NewVisit {
        first_name: "Ana".to_string(),
        last_name: "Smith".to_string(),
        company: "Acme Corp".to_string(),
        reason: "Audit".to_string(),
        host_email: "host@example.com".to_string(),
        host_name: None,
        visitor_email: None,
        arrival_time: arrival,
        expected_duration: 180,
        qr_token: tokens::generate_qr_token(32),
    })
    .await
    .expect("Failed to insert visit")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_concurrent_checkout_has_one_winner() {
    let repo = repository().await;
    let day = random_day();
    let visit = seed(&repo, day.start + Duration::hours(9)).await;
    let leave = day.start + Duration::hours(11);

    let (a, b) = tokio::join!(
        repo.check_out(visit.id, &[VisitStatus::CheckedIn], CheckoutMethod::QrRescan, leave),
        repo.check_out(
            visit.id,
            &[VisitStatus::CheckedIn],
            CheckoutMethod::ManualLookup,
            leave + Duration::minutes(5)
        ),
    );
    let winners: Vec<Visit> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(winners.len(), 1);

    let stored = repo.get_visit(visit.id).await.unwrap().unwrap();
    assert_eq!(stored.status, VisitStatus::CheckedOut);
    assert_eq!(stored.departure_time, winners[0].departure_time);

    let again = repo
        .check_out(visit.id, &[VisitStatus::CheckedIn], CheckoutMethod::QrRescan, leave)
        .await
        .unwrap();
    assert!(again.is_none());
}

#[tokio::test]
#[ignore]
async fn test_second_escalation_is_empty() {
    let repo = repository().await;
    let day = random_day();
    let open = seed(&repo, day.start + Duration::hours(9)).await;
    let left = seed(&repo, day.start + Duration::hours(10)).await;
    repo.check_out(
        left.id,
        &[VisitStatus::CheckedIn],
        CheckoutMethod::QrRescan,
        day.start + Duration::hours(11),
    )
    .await
    .unwrap();

    let evening = day.start + Duration::hours(18);
    let escalated = repo.escalate_day(day, evening).await.unwrap();
    assert_eq!(escalated.iter().map(|v| v.id).collect::<Vec<_>>(), vec![open.id]);
    assert_eq!(escalated[0].status, VisitStatus::Unconfirmed);

    assert!(repo.escalate_day(day, evening).await.unwrap().is_empty());

    // Unconfirmed visits only close through the admin path
    let by_qr = repo
        .check_out(open.id, &[VisitStatus::CheckedIn], CheckoutMethod::QrRescan, evening)
        .await
        .unwrap();
    assert!(by_qr.is_none());
    let by_admin = repo
        .check_out(
            open.id,
            &[VisitStatus::CheckedIn, VisitStatus::Unconfirmed],
            CheckoutMethod::ManualAdmin,
            evening,
        )
        .await
        .unwrap();
    assert_eq!(by_admin.unwrap().status, VisitStatus::CheckedOut);
}

#[tokio::test]
#[ignore]
async fn test_token_redeems_once() {
    let repo = repository().await;
    let day = random_day();
    let visit = seed(&repo, day.start + Duration::hours(9)).await;
    let now = day.start + Duration::hours(12);

    let raw = tokens::generate_action_token(32);
    let token = repo
        .insert_action_token(visit.id, &tokens::hash_token(&raw), now + Duration::days(1), now)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        repo.redeem_action_token(&token, HostMutation::CheckOut, now),
        repo.redeem_action_token(
            &token,
            HostMutation::ExtendDuration { minutes: 60, cap: 480 },
            now
        ),
    );
    let results = [a.unwrap(), b.unwrap()];
    let applied = results
        .iter()
        .filter(|r| matches!(r, Redemption::Applied(_)))
        .count();
    let lost = results
        .iter()
        .filter(|r| matches!(r, Redemption::TokenAlreadyUsed))
        .count();
    assert_eq!((applied, lost), (1, 1));

    let stored = repo.find_action_token(&token.token_hash).await.unwrap().unwrap();
    assert!(stored.used_at.is_some());
    assert!(matches!(
        repo.redeem_action_token(&token, HostMutation::CheckOut, now).await.unwrap(),
        Redemption::TokenAlreadyUsed
    ));
}

#[tokio::test]
#[ignore]
async fn test_reminder_claim_is_exclusive() {
    let repo = repository().await;
    let day = random_day();
    let visit = seed(&repo, day.start + Duration::hours(9)).await;
    let now = day.start + Duration::hours(11);
    let claim = |at: DateTime<Utc>| NewNotification {
        visit_id: visit.id,
        kind: NotificationKind::Reminder,
        recipient: visit.host_email.clone(),
        status: DeliveryStatus::Pending,
        sent_at: at,
    };
    let since = now - Duration::minutes(15);

    let (a, b) = tokio::join!(
        repo.claim_notification(claim(now), since),
        repo.claim_notification(claim(now + Duration::seconds(30)), since),
    );
    let won: Vec<i64> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
    assert_eq!(won.len(), 1);

    repo.complete_notification(won[0], DeliveryStatus::Sent)
        .await
        .unwrap();
    let reminded = repo
        .visits_notified_since(NotificationKind::Reminder, since)
        .await
        .unwrap();
    assert!(reminded.contains(&visit.id));
}
