mod common;

use std::sync::Arc;
use std::time::Duration;

use agora_db::models::pending_email::NewPendingEmail;
use agora_db::store::EmailOutbox;
use agora_db::MemoryStore;
use agora_events::bus::EventBus;
use agora_events::delivery::compose;
use agora_events::dlq::memory::MemoryDlq;
use agora_events::email_queue::{EmailQueue, EmailQueueConfig, ProcessOutcome, MAX_PRIOR_FAILURES};
use agora_events::event::{BusMessage, MessageKind};
use assert_matches::assert_matches;
use common::RecordingProvider;
use tokio_util::sync::CancellationToken;

struct Fixture {
    store: Arc<MemoryStore>,
    provider: Arc<RecordingProvider>,
    dlq: Arc<MemoryDlq>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            provider: Arc::new(RecordingProvider::default()),
            dlq: Arc::new(MemoryDlq::default()),
        }
    }

    fn queue(&self, config: EmailQueueConfig) -> EmailQueue {
        EmailQueue::new(
            self.store.clone(),
            Some(self.provider.clone()),
            self.dlq.clone(),
            config,
        )
    }

    async fn enqueue(&self, to_user_id: Option<i64>, to: &str, direct_email: bool) -> i64 {
        let body = compose("noreply@agora.local", to, "Hello", "body text", "").unwrap();
        self.store
            .enqueue_email(&NewPendingEmail {
                to_user_id,
                body,
                direct_email,
            })
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn sends_to_the_users_verified_address() {
    let f = Fixture::new();
    f.store.add_user(2, "bob", Some("bob@example.com"));
    // The header is stale; the account address wins.
    let id = f.enqueue(Some(2), "old@example.com", false).await;

    let outcome = f.queue(EmailQueueConfig::default()).process_next().await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Sent { id });
    let sent = f.provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "bob@example.com");
    assert!(f.store.pending_emails()[0].sent_at.is_some());
    assert_eq!(
        f.queue(EmailQueueConfig::default()).process_next().await.unwrap(),
        ProcessOutcome::Idle
    );
}

#[tokio::test]
async fn fifth_failure_moves_email_to_dead_letters() {
    let f = Fixture::new();
    f.store.add_user(2, "bob", Some("bob@example.com"));
    let id = f.enqueue(Some(2), "bob@example.com", false).await;
    f.provider.fail_always();
    let queue = f.queue(EmailQueueConfig::default());

    for attempt in 1..=MAX_PRIOR_FAILURES {
        assert_eq!(
            queue.process_next().await.unwrap(),
            ProcessOutcome::Failed {
                id,
                error_count: attempt
            }
        );
        assert!(f.dlq.messages().is_empty());
    }

    assert_eq!(
        queue.process_next().await.unwrap(),
        ProcessOutcome::DeadLettered { id }
    );
    assert!(f.store.pending_emails().is_empty());
    let recorded = f.dlq.messages();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0]
        .error
        .starts_with(&format!("email {id} to bob@example.com failed: ")));
    assert!(recorded[0].error.contains("Subject: Hello"));
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let f = Fixture::new();
    f.store.add_user(2, "bob", Some("bob@example.com"));
    let id = f.enqueue(Some(2), "bob@example.com", false).await;
    f.provider.fail_next(1);
    let queue = f.queue(EmailQueueConfig::default());

    assert_matches!(
        queue.process_next().await.unwrap(),
        ProcessOutcome::Failed { error_count: 1, .. }
    );
    assert_eq!(queue.process_next().await.unwrap(), ProcessOutcome::Sent { id });
    assert_eq!(f.store.pending_emails()[0].error_count, 1);
}

#[tokio::test]
async fn header_address_accepted_for_administrators() {
    let f = Fixture::new();
    let id = f.enqueue(None, "ops@example.com", false).await;
    let queue = f.queue(EmailQueueConfig {
        admin_emails: vec!["OPS@example.com".into()],
        ..EmailQueueConfig::default()
    });

    assert_eq!(queue.process_next().await.unwrap(), ProcessOutcome::Sent { id });
    assert_eq!(f.provider.sent()[0].0, "ops@example.com");
}

#[tokio::test]
async fn header_address_of_store_admin_is_accepted() {
    let f = Fixture::new();
    f.store.add_user(10, "root", Some("root@example.com"));
    f.store.set_admin(10);
    let id = f.enqueue(None, "root@example.com", false).await;

    let outcome = f.queue(EmailQueueConfig::default()).process_next().await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Sent { id });
}

#[tokio::test]
async fn unknown_header_recipient_counts_as_failure() {
    let f = Fixture::new();
    let id = f.enqueue(None, "stranger@example.com", false).await;

    let outcome = f.queue(EmailQueueConfig::default()).process_next().await.unwrap();

    assert_eq!(outcome, ProcessOutcome::Failed { id, error_count: 1 });
    assert!(f.provider.sent().is_empty());
}

#[tokio::test]
async fn user_without_verified_address_is_not_mailed() {
    let f = Fixture::new();
    f.store.add_user(3, "carol", None);
    f.store.add_unverified_email(3, "carol@example.com");
    let id = f.enqueue(Some(3), "carol@example.com", false).await;
    let queue = f.queue(EmailQueueConfig::default());

    for _ in 0..MAX_PRIOR_FAILURES {
        queue.process_next().await.unwrap();
    }
    assert_eq!(queue.process_next().await.unwrap(), ProcessOutcome::DeadLettered { id });
    assert!(f.provider.sent().is_empty());
    assert!(f.dlq.messages()[0]
        .error
        .contains("invalid email for user 3"));
}

#[tokio::test]
async fn direct_email_needs_a_verified_address() {
    let f = Fixture::new();
    f.store.add_user(3, "carol", Some("carol@example.com"));
    f.store.add_unverified_email(3, "carol.alt@example.com");
    let verified = f.enqueue(None, "carol@example.com", true).await;
    let unverified = f.enqueue(None, "carol.alt@example.com", true).await;
    let queue = f.queue(EmailQueueConfig::default());

    assert_eq!(
        queue.process_next().await.unwrap(),
        ProcessOutcome::Sent { id: verified }
    );
    assert_eq!(
        queue.process_next().await.unwrap(),
        ProcessOutcome::Failed {
            id: unverified,
            error_count: 1
        }
    );
}

#[tokio::test]
async fn disabled_queue_or_missing_provider_is_idle() {
    let f = Fixture::new();
    f.store.add_user(2, "bob", Some("bob@example.com"));
    f.enqueue(Some(2), "bob@example.com", false).await;

    let disabled = f.queue(EmailQueueConfig {
        enabled: false,
        ..EmailQueueConfig::default()
    });
    assert_eq!(disabled.process_next().await.unwrap(), ProcessOutcome::Idle);

    let no_provider = EmailQueue::new(
        f.store.clone(),
        None,
        f.dlq.clone(),
        EmailQueueConfig::default(),
    );
    assert_eq!(no_provider.process_next().await.unwrap(), ProcessOutcome::Idle);

    assert!(f.store.pending_emails()[0].sent_at.is_none());
    assert_eq!(f.store.pending_emails()[0].error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn run_sends_on_wake_and_stops_on_cancel() {
    let f = Fixture::new();
    f.store.add_user(2, "bob", Some("bob@example.com"));
    let bus = EventBus::new(8);
    let wake = bus.subscribe(MessageKind::EmailQueued, "email-queue");
    let cancel = CancellationToken::new();
    let queue = f.queue(EmailQueueConfig {
        poll_interval: Duration::from_secs(3600),
        min_send_delay: Duration::from_millis(10),
        ..EmailQueueConfig::default()
    });
    let handle = tokio::spawn(queue.run(Some(wake), cancel.clone()));

    f.enqueue(Some(2), "bob@example.com", false).await;
    f.enqueue(Some(2), "bob@example.com", false).await;
    bus.publish(BusMessage::EmailQueued).unwrap();

    for _ in 0..100 {
        if f.provider.sent().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(f.provider.sent().len(), 2);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("queue stops after cancel")
        .unwrap();
}
