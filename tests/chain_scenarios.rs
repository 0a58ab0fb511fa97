//! End-to-end scenarios: parse a raw message, walk the chains, autorespond.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use list_chains::autorespond::{Autoresponder, ResponseDecision, SuppressReason};
use list_chains::chains::dispatcher::{RULE_HITS_HEADER, RULE_MISSES_HEADER};
use list_chains::chains::{Chain, Disposition, Dispatcher, LinkAction, StaticChain};
use list_chains::config::ChainConfig;
use list_chains::delivery::{Notification, Notifier};
use list_chains::error::{ChainError, DeliveryError};
use list_chains::list::MailingList;
use list_chains::message::{Message, MessageData};
use list_chains::rules::RuleRegistry;
use list_chains::store::{Database, LibSqlBackend};

const T0: i64 = 1_700_000_000;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Harness {
    registry: Arc<RuleRegistry>,
    store: Arc<dyn Database>,
    dispatcher: Dispatcher,
}

async fn harness(header_checks: &str) -> Harness {
    let registry = Arc::new(RuleRegistry::with_builtin());
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let config = ChainConfig {
        header_checks: header_checks.to_string(),
        ..Default::default()
    };
    let dispatcher =
        Dispatcher::builtin(Arc::clone(&registry), Arc::clone(&store), &config).unwrap();
    Harness {
        registry,
        store,
        dispatcher,
    }
}

fn mlist() -> MailingList {
    let mut mlist = MailingList::new("test@example.com", "Test");
    mlist.autorespond_postings = true;
    mlist.autoresponse_grace_period = 1;
    mlist.autoresponse_postings_text = "Your message to $list_name was received.".into();
    mlist
}

fn parse(raw: &str) -> Message {
    Message::parse(raw.as_bytes()).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

const SPAM: &str = "From: Anne Person <a@example.com>\r\n\
To: test@example.com\r\n\
Subject: Buy now\r\n\
X-Spam-Flag: yes\r\n\
\r\n\
Cheap stuff.\r\n";

const CLEAN: &str = "From: Anne Person <a@example.com>\r\n\
To: test@example.com\r\n\
Subject: Hello\r\n\
\r\n\
Hi all.\r\n";

#[tokio::test]
async fn spam_flag_is_held() {
    let h = harness("X-Spam-Flag: YES").await;
    let mut msg = parse(SPAM);
    let mut msgdata = MessageData::default();

    let outcome = h
        .dispatcher
        .process(&mlist(), &mut msg, &mut msgdata, "header-match")
        .await
        .unwrap();

    assert_eq!(outcome.final_chain, "hold");
    assert_eq!(outcome.disposition, Some(Disposition::Hold));
    assert_eq!(outcome.visited, vec!["header-match", "hold"]);
    assert_eq!(msgdata.rule_hits.len(), 1);
    assert!(msg.get(RULE_HITS_HEADER).is_some());
    assert!(msg.get(RULE_MISSES_HEADER).is_none());
}

#[tokio::test]
async fn clean_message_falls_off_the_chain() {
    let h = harness("X-Spam-Flag: YES").await;
    let mut msg = parse(CLEAN);
    let mut msgdata = MessageData::default();

    let outcome = h
        .dispatcher
        .process(&mlist(), &mut msg, &mut msgdata, "header-match")
        .await
        .unwrap();

    assert_eq!(outcome.final_chain, "header-match");
    assert_eq!(outcome.disposition, None);
    assert!(msgdata.rule_hits.is_empty());
    assert_eq!(msgdata.rule_misses.len(), 1);
}

#[tokio::test]
async fn persisted_match_with_explicit_chain() {
    let h = harness("").await;
    let mlist = mlist();
    h.store
        .append_header_match(mlist.list_id(), "Subject", "^buy", Some("discard"))
        .await
        .unwrap();

    let mut msg = parse(SPAM);
    let mut msgdata = MessageData::default();
    let outcome = h
        .dispatcher
        .process(&mlist, &mut msg, &mut msgdata, "header-match")
        .await
        .unwrap();
    assert_eq!(outcome.disposition, Some(Disposition::Discard));
}

#[tokio::test]
async fn site_checks_take_precedence_over_list_checks() {
    let h = harness("X-Spam-Flag: yes").await;
    let mlist = mlist();
    h.store
        .append_header_match(mlist.list_id(), "Subject", "buy", Some("accept"))
        .await
        .unwrap();

    let mut msg = parse(SPAM);
    let outcome = h
        .dispatcher
        .process(&mlist, &mut msg, &mut MessageData::default(), "header-match")
        .await
        .unwrap();
    assert_eq!(outcome.disposition, Some(Disposition::Hold));
}

#[tokio::test]
async fn deferring_list_record_only_records_hit() {
    // A deferring persisted match records a hit; nothing after it acts on
    // the hit, so the walk ends with no disposition.
    let h = harness("").await;
    let mlist = mlist();
    h.store
        .append_header_match(mlist.list_id(), "X-Spam-Flag", "yes", None)
        .await
        .unwrap();

    let mut msgdata = MessageData::default();
    let outcome = h
        .dispatcher
        .process(&mlist, &mut parse(SPAM), &mut msgdata, "header-match")
        .await
        .unwrap();
    assert_eq!(outcome.disposition, None);
    assert_eq!(msgdata.rule_hits.len(), 1);
}

#[tokio::test]
async fn extend_then_flush() {
    let h = harness("").await;
    let header_match = h.dispatcher.header_match().unwrap();
    header_match.extend("X-Spam-Flag", "yes").unwrap();

    let mut msg = parse(SPAM);
    let outcome = h
        .dispatcher
        .process(&mlist(), &mut msg, &mut MessageData::default(), "header-match")
        .await
        .unwrap();
    assert_eq!(outcome.disposition, Some(Disposition::Hold));

    header_match.flush();
    assert!(
        h.registry
            .list()
            .iter()
            .all(|name| !name.starts_with("header-match-"))
    );

    let mut msg = parse(SPAM);
    let outcome = h
        .dispatcher
        .process(&mlist(), &mut msg, &mut MessageData::default(), "header-match")
        .await
        .unwrap();
    assert_eq!(outcome.disposition, None);
}

#[tokio::test]
async fn repeated_walks_keep_rule_names_unique() {
    let h = harness("X-Spam-Flag: yes\nX-Other: x").await;
    let mlist = mlist();
    h.store
        .append_header_match(mlist.list_id(), "Subject", "zzz", None)
        .await
        .unwrap();
    let chain = h.dispatcher.get("header-match").unwrap();

    let first = chain
        .links(&mlist, &parse(CLEAN), &MessageData::default())
        .await
        .unwrap();
    let second = chain
        .links(&mlist, &parse(CLEAN), &MessageData::default())
        .await
        .unwrap();
    assert_eq!(first.len(), second.len());
    let mut names: Vec<_> = first
        .iter()
        .chain(second.iter())
        .filter(|l| l.action != LinkAction::Jump || l.chain.as_deref() != Some("hold"))
        .map(|l| l.rule.name().to_string())
        .collect();
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total);
}

#[tokio::test]
async fn misconfigured_cycle_fails_fast() {
    let mut h = harness("").await;
    h.dispatcher
        .register(Arc::new(
            StaticChain::new("moderation", "", Arc::clone(&h.registry)).with_link(
                "truth",
                LinkAction::Jump,
                Some("header-match"),
            ),
        ))
        .unwrap();
    h.store
        .append_header_match("test@example.com", "Subject", ".", Some("moderation"))
        .await
        .unwrap();

    let result = h
        .dispatcher
        .process(&mlist(), &mut parse(CLEAN), &mut MessageData::default(), "moderation")
        .await;
    assert!(matches!(result, Err(ChainError::Cycle { .. })));
}

#[tokio::test]
async fn autoresponse_throttle_scenario() {
    let h = harness("").await;
    let mlist = mlist();
    let notifier = Arc::new(RecordingNotifier::default());
    let responder = Autoresponder::new(Arc::clone(&h.store), notifier.clone());
    let msgdata = MessageData::default();

    let first = responder
        .process_at(&mlist, &parse(CLEAN), &msgdata, at(T0))
        .await
        .unwrap();
    assert!(first.is_sent());
    assert_eq!(
        h.store
            .quiet_until(mlist.list_id(), "postings", "a@example.com")
            .await
            .unwrap(),
        Some(T0 + 86_400)
    );

    let second = responder
        .process_at(&mlist, &parse(CLEAN), &msgdata, at(T0 + 3600))
        .await
        .unwrap();
    assert!(matches!(
        second,
        ResponseDecision::Suppressed(SuppressReason::Throttled { .. })
    ));
    assert_eq!(notifier.count(), 1);

    let third = responder
        .process_at(&mlist, &parse(CLEAN), &msgdata, at(T0 + 90_000))
        .await
        .unwrap();
    assert!(third.is_sent());
    assert_eq!(notifier.count(), 2);
    assert_eq!(
        h.store
            .quiet_until(mlist.list_id(), "postings", "a@example.com")
            .await
            .unwrap(),
        Some(T0 + 90_000 + 86_400)
    );
}

#[tokio::test]
async fn opt_out_header_blocks_reply_and_record() {
    let h = harness("").await;
    let mlist = mlist();
    let notifier = Arc::new(RecordingNotifier::default());
    let responder = Autoresponder::new(Arc::clone(&h.store), notifier.clone());

    let raw = format!("X-Ack: NO\r\n{CLEAN}");
    let decision = responder
        .process_at(&mlist, &parse(&raw), &MessageData::default(), at(T0))
        .await
        .unwrap();
    assert!(matches!(
        decision,
        ResponseDecision::Suppressed(SuppressReason::OptOut)
    ));
    assert_eq!(notifier.count(), 0);
    assert_eq!(
        h.store
            .quiet_until(mlist.list_id(), "postings", "a@example.com")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn concurrent_replies_to_one_sender_send_once() {
    let h = harness("").await;
    let mlist = Arc::new(mlist());
    let notifier = Arc::new(RecordingNotifier::default());
    let responder = Arc::new(Autoresponder::new(Arc::clone(&h.store), notifier.clone()));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let responder = Arc::clone(&responder);
        let mlist = Arc::clone(&mlist);
        tasks.push(tokio::spawn(async move {
            responder
                .process_at(&mlist, &parse(CLEAN), &MessageData::default(), at(T0 + i))
                .await
                .unwrap()
        }));
    }
    let mut sent = 0;
    for task in tasks {
        if task.await.unwrap().is_sent() {
            sent += 1;
        }
    }
    assert_eq!(sent, 1);
    assert_eq!(notifier.count(), 1);
}
