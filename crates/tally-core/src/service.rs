//! Assistant service
//!
//! The entry point a transport layer talks to. Owns the database, the
//! provider cascade, the media-group aggregator, and one async lock per
//! thread so turns against the same thread never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::aggregator::TurnAggregator;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{AssistantType, Thread};
use crate::provider::FallbackCascade;
use crate::turn::{TurnRunner, UserPart};

/// Fixed reply the transport sends when a turn fails fatally
///
/// The real error goes to the error reporter; the user never sees it.
pub const FAILED_TURN_REPLY: &str =
    "Sorry, something went wrong on my side. Please try again in a moment.";

/// Thread creation options
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadOptions {
    pub assistant_type: AssistantType,
    pub web_search: bool,
}

/// Conversational assistant over the ledger
pub struct AssistantService {
    db: Database,
    cascade: FallbackCascade,
    aggregator: TurnAggregator,
    thread_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssistantService {
    pub fn new(db: Database, cascade: FallbackCascade) -> Self {
        Self {
            db,
            cascade,
            aggregator: TurnAggregator::default(),
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_aggregator(mut self, aggregator: TurnAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Create a new conversation thread
    pub fn create_thread(&self, user_id: i64, options: ThreadOptions) -> Result<Thread> {
        let thread = self
            .db
            .create_thread(user_id, options.assistant_type, options.web_search)?;
        info!(
            thread_id = thread.id,
            user_id,
            assistant_type = %thread.assistant_type,
            "Created thread"
        );
        Ok(thread)
    }

    /// Run one user turn and return the assistant's reply text
    ///
    /// Turns on the same thread are serialized; a second caller waits
    /// until the first turn finishes.
    pub async fn submit_user_turn(&self, thread_id: i64, parts: Vec<UserPart>) -> Result<String> {
        let thread = self
            .db
            .find_thread(thread_id)?
            .ok_or_else(|| Error::NotFound(format!("thread {}", thread_id)))?;

        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock().await;

        TurnRunner::new(&self.db, &self.cascade)
            .run(&thread, parts)
            .await
    }

    /// Run a turn for one message of a media group
    ///
    /// The first message of a group waits out the quiet period, absorbs
    /// the rest, and runs the merged turn. Followers return `Ok(None)`;
    /// the transport sends no reply for them.
    pub async fn submit_media_group_turn(
        &self,
        thread_id: i64,
        group_id: &str,
        parts: Vec<UserPart>,
    ) -> Result<Option<String>> {
        match self.aggregator.submit(group_id, parts).await {
            Some(merged) => self.submit_user_turn(thread_id, merged).await.map(Some),
            None => Ok(None),
        }
    }

    fn thread_lock(&self, thread_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        locks.entry(thread_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::{AccountType, NewAccount, Role};
    use crate::provider::{ChatClient, MockProvider, ModelTarget};
    use crate::reporter::CapturingReporter;

    fn service() -> (Arc<AssistantService>, MockProvider) {
        let db = Database::in_memory().unwrap();
        db.create_account(&NewAccount {
            user_id: 1,
            name: "Wallet".to_string(),
            currency: "USD".to_string(),
            account_type: AccountType::Cash,
            balance: 100.0,
            is_default: true,
        })
        .unwrap();

        let mock = MockProvider::new();
        let cascade = FallbackCascade::new(
            ModelTarget::new(ChatClient::Mock(mock.clone()), "mock-model"),
            Arc::new(CapturingReporter::new()),
        );
        (Arc::new(AssistantService::new(db, cascade)), mock)
    }

    #[tokio::test]
    async fn test_turn_on_missing_thread_is_not_found() {
        let (svc, _mock) = service();
        let err = svc
            .submit_user_turn(42, vec![UserPart::Text("hi".to_string())])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_thread_and_run_turn() {
        let (svc, mock) = service();
        let thread = svc
            .create_thread(
                1,
                ThreadOptions {
                    assistant_type: AssistantType::Finance,
                    web_search: false,
                },
            )
            .unwrap();
        mock.push_text("Hello!");

        let reply = svc
            .submit_user_turn(thread.id, vec![UserPart::Text("hi".to_string())])
            .await
            .unwrap();
        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn test_concurrent_turns_on_one_thread_serialize() {
        let (svc, mock) = service();
        let thread = svc.create_thread(1, ThreadOptions::default()).unwrap();
        mock.push_text("first");
        mock.push_text("second");

        let a = {
            let svc = Arc::clone(&svc);
            let id = thread.id;
            tokio::spawn(
                async move { svc.submit_user_turn(id, vec![UserPart::Text("a".to_string())]).await },
            )
        };
        let b = {
            let svc = Arc::clone(&svc);
            let id = thread.id;
            tokio::spawn(
                async move { svc.submit_user_turn(id, vec![UserPart::Text("b".to_string())]).await },
            )
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Serialized turns leave a strict user/assistant alternation.
        let stored = svc.db().thread_messages(thread.id).unwrap();
        let roles: Vec<Role> = stored.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_group_runs_one_merged_turn() {
        let (svc, mock) = service();
        let thread = svc.create_thread(1, ThreadOptions::default()).unwrap();
        mock.push_text("got the album");

        let first = {
            let svc = Arc::clone(&svc);
            let id = thread.id;
            tokio::spawn(async move {
                svc.submit_media_group_turn(id, "album-1", vec![UserPart::Text("caption".to_string())])
                    .await
            })
        };
        tokio::task::yield_now().await;

        let follower = svc
            .submit_media_group_turn(
                thread.id,
                "album-1",
                vec![UserPart::Image {
                    media_type: "image/jpeg".to_string(),
                    data: vec![1, 2, 3],
                }],
            )
            .await
            .unwrap();
        assert!(follower.is_none());

        let reply = first.await.unwrap().unwrap();
        assert_eq!(reply.as_deref(), Some("got the album"));

        // One merged user message with both parts, one assistant reply.
        let stored = svc.db().thread_messages(thread.id).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content.len(), 2);
    }

    #[tokio::test]
    async fn test_aggregator_quiet_period_configurable() {
        let db = Database::in_memory().unwrap();
        let mock = MockProvider::new();
        let cascade = FallbackCascade::new(
            ModelTarget::new(ChatClient::Mock(mock.clone()), "mock-model"),
            Arc::new(CapturingReporter::new()),
        );
        let svc = AssistantService::new(db, cascade)
            .with_aggregator(TurnAggregator::new(Duration::from_millis(1)));
        let thread = svc.create_thread(1, ThreadOptions::default()).unwrap();
        mock.push_text("quick flush");

        let reply = svc
            .submit_media_group_turn(thread.id, "g", vec![UserPart::Text("hi".to_string())])
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("quick flush"));
    }
}
