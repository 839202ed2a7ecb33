//! End-to-end scenarios driven through the router.
//!
//! Each test wires the real services over an in-memory database and a
//! temporary knowledge document, and observes replies through the
//! recording transport.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use kbgate::bot::{Inbound, Router, Sender};
use kbgate::knowledge::document;
use kbgate::models::{CallbackAction, UserId, UserStatus};
use kbgate::services::{AccessControl, NotificationFanout, SearchHistoryLog};
use kbgate::storage::{HistoryStore, SqliteStore, UserStore};
use kbgate::transport::RecordingTransport;
use kbgate::KnowledgeBase;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ADMIN: UserId = UserId::new(1);
const U1: UserId = UserId::new(100);
const U2: UserId = UserId::new(200);
const U3: UserId = UserId::new(300);

struct World {
    router: Router,
    store: Arc<SqliteStore>,
    transport: Arc<RecordingTransport>,
    dir: TempDir,
}

impl World {
    fn with_document(text: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("data.kb");
        std::fs::write(&path, text).expect("write document");

        let store = Arc::new(SqliteStore::in_memory().expect("store"));
        let transport = Arc::new(RecordingTransport::new());
        let router = Router::new(
            AccessControl::new(store.clone(), ADMIN),
            Arc::new(KnowledgeBase::open(path)),
            SearchHistoryLog::new(store.clone()),
            NotificationFanout::new(transport.clone(), Duration::ZERO, Duration::from_secs(1)),
        );
        Self {
            router,
            store,
            transport,
            dir,
        }
    }

    fn apple() -> Self {
        Self::with_document("Keyword: apple\nDescription: A fruit.\n")
    }

    async fn say(&self, sender: Sender, text: &str) {
        self.router.handle(Inbound::message(sender, text)).await;
    }

    async fn press(&self, sender: Sender, data: &str) {
        self.router.handle(Inbound::callback(sender, data)).await;
    }

    fn last(&self, chat: UserId) -> String {
        self.transport.last_text(chat).expect("a reply")
    }

    fn document(&self) -> document::DecodedDocument {
        let text = std::fs::read_to_string(self.dir.path().join("data.kb")).expect("read");
        document::decode(&text)
    }

    fn history_count(&self) -> u64 {
        self.store.count_since(i64::MIN).expect("count")
    }
}

fn admin() -> Sender {
    Sender::new(ADMIN, "Admin")
}

fn u1() -> Sender {
    Sender::new(U1, "Ulla Example").with_username("ulla")
}

async fn approved_world() -> World {
    let world = World::apple();
    world.say(u1(), "/start").await;
    world.press(admin(), &CallbackAction::Approve(U1).encode()).await;
    world.transport.clear();
    world
}

#[tokio::test]
async fn new_user_start_creates_pending_record_and_notifies_admin() {
    let world = World::apple();

    world.say(u1(), "/start").await;

    let record = world.store.get(U1).expect("get").expect("record");
    assert_eq!(record.status, UserStatus::Pending);
    assert_eq!(
        world.last(U1),
        "📨 Your request has been sent to the administrator."
    );

    let requests = world.transport.sent_to(ADMIN);
    assert_eq!(requests.len(), 1);
    assert!(requests[0].text.contains("Ulla Example"));
    assert!(requests[0].text.contains("@ulla"));
    assert_eq!(requests[0].buttons[0][0].action, CallbackAction::Approve(U1));
}

#[tokio::test]
async fn repeated_start_while_pending_does_not_renotify_admin() {
    let world = World::apple();

    world.say(u1(), "/start").await;
    world.say(u1(), "/start").await;

    assert_eq!(world.transport.sent_to(ADMIN).len(), 1);
    assert_eq!(world.transport.sent_to(U1).len(), 2);
}

#[tokio::test]
async fn admin_approval_unlocks_welcome() {
    let world = World::apple();
    world.say(u1(), "/start").await;

    world.press(admin(), &CallbackAction::Approve(U1).encode()).await;

    let record = world.store.get(U1).expect("get").expect("record");
    assert_eq!(record.status, UserStatus::Approved);
    assert_eq!(
        world.last(U1),
        "✅ Your request has been approved! Send /start to begin."
    );

    world.say(u1(), "/start").await;
    assert!(world.last(U1).starts_with("✅ Welcome!"));
}

#[tokio::test]
async fn query_matching_part_of_a_key_finds_it() {
    let world = approved_world().await;

    world.say(u1(), "app").await;

    assert_eq!(world.last(U1), "<b>Apple</b>\nA fruit.");
    assert_eq!(world.history_count(), 1);
}

#[tokio::test]
async fn add_flow_persists_and_announces() {
    let world = approved_world().await;

    world.say(admin(), "/add").await;
    world.say(admin(), "Banana").await;
    world.say(admin(), "A yellow fruit.").await;

    let doc = world.document();
    let keys: Vec<&str> = doc.entries.keys().map(String::as_str).collect();
    assert_eq!(keys, ["apple", "banana"]);
    assert_eq!(doc.entries["banana"], "A yellow fruit.");

    assert_eq!(world.last(U1), "🆕 New entry: <b>Banana</b>");
    assert_eq!(world.last(ADMIN), "✅ Added \"banana\". Notified 1 users.");
}

#[tokio::test]
async fn edit_is_announced_to_approved_users_only() {
    let world = approved_world().await;
    world.say(Sender::new(U2, "Pending Person"), "/start").await;
    world.say(admin(), "/addusers 300").await;
    world.press(admin(), &CallbackAction::Toggle(U3).encode()).await;
    assert_eq!(
        world.store.get(U2).expect("get").expect("record").status,
        UserStatus::Pending
    );
    assert_eq!(
        world.store.get(U3).expect("get").expect("record").status,
        UserStatus::Blocked
    );
    world.transport.clear();

    world.say(admin(), "/edit").await;
    world.say(admin(), "apple").await;
    world.say(admin(), "A crunchy fruit.").await;

    assert_eq!(world.document().entries["apple"], "A crunchy fruit.");
    assert_eq!(world.last(U1), "✏️ Entry updated: <b>Apple</b>");
    assert!(world.transport.sent_to(U2).is_empty());
    assert!(world.transport.sent_to(U3).is_empty());
    assert_eq!(world.last(ADMIN), "✅ Updated \"apple\". Notified 1 users.");
}

#[tokio::test]
async fn delete_flow_removes_entry_and_announces() {
    let world = approved_world().await;

    world.say(admin(), "/del").await;
    world.say(admin(), "apple").await;

    assert_eq!(world.last(U1), "🗑 Entry removed: <b>Apple</b>");
    assert!(world.document().entries.is_empty());

    world.say(u1(), "app").await;
    assert_eq!(world.last(U1), "🔍 Nothing found.");
}

#[tokio::test]
async fn blocked_user_is_denied_without_history() {
    let world = approved_world().await;
    world.press(admin(), &CallbackAction::Toggle(U1).encode()).await;
    assert_eq!(
        world.store.get(U1).expect("get").expect("record").status,
        UserStatus::Blocked
    );
    let before = world.history_count();

    world.say(u1(), "apple").await;

    assert_eq!(world.last(U1), "❌ You do not have access.");
    assert_eq!(world.history_count(), before);
}

#[tokio::test]
async fn blocked_user_start_is_denied() {
    let world = approved_world().await;
    world.press(admin(), &CallbackAction::Toggle(U1).encode()).await;

    world.say(u1(), "/start").await;

    assert_eq!(world.last(U1), "❌ Access denied.");
}

#[tokio::test]
async fn reload_announces_entries_added_out_of_band() {
    let world = approved_world().await;
    std::fs::write(
        world.dir.path().join("data.kb"),
        "Keyword: apple\nDescription: A fruit.\nKeyword: cherry\nDescription: Small and red.\n",
    )
    .expect("rewrite");

    world.say(admin(), "/reload").await;

    assert_eq!(world.last(U1), "🆕 New entries: <b>Cherry</b>");
    assert!(world.last(ADMIN).contains("cherry"));

    world.say(u1(), "cherry").await;
    assert_eq!(world.last(U1), "<b>Cherry</b>\nSmall and red.");
}

#[tokio::test]
async fn feedback_reaches_admin() {
    let world = approved_world().await;

    world.say(u1(), "/feedback").await;
    world.say(u1(), "Please add pears").await;

    assert!(world.last(ADMIN).ends_with("Please add pears"));
    assert_eq!(
        world.last(U1),
        "✅ Your message has been sent to the administrator."
    );
}

#[tokio::test]
async fn broadcast_counts_failed_recipients() {
    let world = approved_world().await;
    world.say(admin(), "/addusers 200 300").await;
    world.transport.fail_for(UserId::new(300));

    world.say(admin(), "/broadcast").await;
    world.say(admin(), "Maintenance tonight").await;

    assert_eq!(world.last(U1), "📢 Maintenance tonight");
    assert_eq!(world.last(ADMIN), "📢 Delivered to 2 of 3 users.");
}
