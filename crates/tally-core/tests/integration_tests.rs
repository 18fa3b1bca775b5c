//! Integration tests for tally-core
//!
//! These tests exercise whole conversation turns through the service:
//! scripted provider responses drive the tool loop against a real
//! in-memory ledger.

use std::sync::Arc;

use serde_json::json;

use tally_core::models::{AccountType, AssistantType, NewAccount, UsageKind};
use tally_core::provider::{ChatClient, MockProvider, ModelTarget};
use tally_core::reporter::CapturingReporter;
use tally_core::{
    AssistantService, Database, FallbackCascade, ThreadOptions, UserPart,
};

fn seeded_db() -> Database {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    db.create_account(&NewAccount {
        user_id: 1,
        name: "Main".to_string(),
        currency: "USD".to_string(),
        account_type: AccountType::Bank,
        balance: 500.0,
        is_default: true,
    })
    .unwrap();
    db
}

fn service_with(db: Database, mock: &MockProvider) -> AssistantService {
    let cascade = FallbackCascade::new(
        ModelTarget::new(ChatClient::Mock(mock.clone()), "primary-model"),
        Arc::new(CapturingReporter::new()),
    );
    AssistantService::new(db, cascade)
}

fn finance_options() -> ThreadOptions {
    ThreadOptions {
        assistant_type: AssistantType::Finance,
        web_search: false,
    }
}

fn text(s: &str) -> Vec<UserPart> {
    vec![UserPart::Text(s.to_string())]
}

#[tokio::test]
async fn test_onboarding_creates_account_through_tools() {
    let db = Database::in_memory().unwrap();
    let mock = MockProvider::new();
    let svc = service_with(db, &mock);
    let thread = svc.create_thread(1, finance_options()).unwrap();

    // First attempt to record fails (no account), the model recovers by
    // creating an account and retrying.
    mock.push_tool_round(vec![(
        "tu_1",
        "track_expense",
        json!({"amount": 9.0, "currency": "USD", "description": "lunch"}),
    )]);
    mock.push_tool_round(vec![(
        "tu_2",
        "create_account",
        json!({"name": "Wallet", "account_type": "cash", "currency": "USD"}),
    )]);
    mock.push_tool_round(vec![(
        "tu_3",
        "track_expense",
        json!({"amount": 9.0, "currency": "USD", "description": "lunch"}),
    )]);
    mock.push_text("Created a cash account and recorded your lunch.");

    let reply = svc
        .submit_user_turn(thread.id, text("I spent 9 dollars on lunch"))
        .await
        .unwrap();
    assert!(reply.contains("recorded your lunch"));

    let accounts = svc.db().list_accounts(1).unwrap();
    assert_eq!(accounts.len(), 1);
    assert!(accounts[0].is_default);
    // Lunch recorded once, against the new account.
    let txns = svc.db().recent_transactions(1, 10).unwrap();
    assert_eq!(txns.len(), 1);
    assert_eq!(txns[0].amount, 9.0);
    assert_eq!(accounts[0].balance, -9.0);
}

#[tokio::test]
async fn test_multi_expense_turn_with_budget() {
    let db = seeded_db();
    let mock = MockProvider::new();
    let svc = service_with(db, &mock);
    let thread = svc.create_thread(1, finance_options()).unwrap();

    let today = chrono::Utc::now().date_naive();
    let end = today + chrono::Duration::days(6);
    mock.push_tool_round(vec![(
        "tu_1",
        "create_budget",
        json!({
            "total_amount": 100.0,
            "currency": "USD",
            "start_date": today.to_string(),
            "end_date": end.to_string()
        }),
    )]);
    mock.push_text("Budget set up.");
    svc.submit_user_turn(thread.id, text("budget 100 USD for a week"))
        .await
        .unwrap();

    mock.push_tool_round(vec![
        (
            "tu_2",
            "track_expense",
            json!({"amount": 4.5, "currency": "USD", "description": "coffee"}),
        ),
        (
            "tu_3",
            "track_expense",
            json!({"amount": 23.0, "currency": "USD", "description": "groceries"}),
        ),
    ]);
    mock.push_text("Both recorded. You have budget left for today.");

    let reply = svc
        .submit_user_turn(thread.id, text("coffee 4.50 and groceries 23"))
        .await
        .unwrap();

    assert!(reply.contains("Recorded 2 expenses"));
    assert!(reply.contains("Total: 27.50 USD"));
    assert!(reply.contains("Both recorded"));

    // The account balance reflects both expenses.
    let account = svc.db().find_account(1, 1).unwrap().unwrap();
    assert_eq!(account.balance, 472.5);
}

#[tokio::test]
async fn test_budget_status_reflects_spending() {
    let db = seeded_db();
    let mock = MockProvider::new();
    let svc = service_with(db, &mock);
    let thread = svc.create_thread(1, finance_options()).unwrap();

    let today = chrono::Utc::now().date_naive();
    let end = today + chrono::Duration::days(6);
    mock.push_tool_round(vec![
        (
            "tu_1",
            "create_budget",
            json!({
                "total_amount": 70.0,
                "currency": "USD",
                "start_date": today.to_string(),
                "end_date": end.to_string()
            }),
        ),
        (
            "tu_2",
            "track_expense",
            json!({"amount": 4.0, "currency": "USD", "description": "bus"}),
        ),
    ]);
    mock.push_tool_round(vec![("tu_3", "get_budget_status", json!({}))]);
    mock.push_text("You have 6.00 left today.");

    svc.submit_user_turn(thread.id, text("set up a budget and note the bus fare"))
        .await
        .unwrap();

    // The status tool saw allocation 10.00 with 4.00 already spent.
    let requests = mock.requests();
    let status_round = &requests[2].messages;
    let status_result = status_round
        .last()
        .unwrap()
        .content
        .iter()
        .find_map(|b| match b {
            tally_core::ContentBlock::ToolResult { content, .. } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    assert!(status_result.contains("allocation: 10.00"));
    assert!(status_result.contains("spent today: 4.00"));
    assert!(status_result.contains("remaining today: 6.00"));
}

#[tokio::test]
async fn test_backup_answers_and_usage_names_backup_model() {
    let db = seeded_db();
    let primary = MockProvider::new();
    let backup = MockProvider::new();
    primary.push_timeout();
    backup.push_text("Backup here, all good.");

    let reporter = Arc::new(CapturingReporter::new());
    let cascade = FallbackCascade::new(
        ModelTarget::new(ChatClient::Mock(primary.clone()), "primary-model"),
        reporter.clone(),
    )
    .with_backup(ModelTarget::new(
        ChatClient::Mock(backup.clone()),
        "backup-model",
    ));
    let svc = AssistantService::new(db, cascade);
    let thread = svc.create_thread(1, finance_options()).unwrap();

    let reply = svc
        .submit_user_turn(thread.id, text("hello"))
        .await
        .unwrap();
    assert_eq!(reply, "Backup here, all good.");

    // Exactly one usage record, attributed to the backup model.
    let events = svc.db().usage_events(1).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, UsageKind::Completion);
    assert_eq!(events[0].model.as_deref(), Some("backup-model"));

    // The primary failure reached the reporter.
    assert_eq!(reporter.reports().len(), 1);
}

#[tokio::test]
async fn test_edit_and_delete_across_turns() {
    let db = seeded_db();
    let mock = MockProvider::new();
    let svc = service_with(db, &mock);
    let thread = svc.create_thread(1, finance_options()).unwrap();

    mock.push_tool_round(vec![(
        "tu_1",
        "track_expense",
        json!({"amount": 50.0, "currency": "USD", "description": "concert ticket"}),
    )]);
    mock.push_text("Recorded.");
    svc.submit_user_turn(thread.id, text("ticket for 50"))
        .await
        .unwrap();

    mock.push_tool_round(vec![(
        "tu_2",
        "edit_transaction",
        json!({"transaction_id": 1, "amount": 45.0}),
    )]);
    mock.push_text("Fixed, it was 45.");
    svc.submit_user_turn(thread.id, text("actually it was 45"))
        .await
        .unwrap();

    let txn = svc.db().find_transaction(1, 1).unwrap().unwrap();
    assert_eq!(txn.amount, 45.0);
    let account = svc.db().find_account(1, 1).unwrap().unwrap();
    assert_eq!(account.balance, 455.0);

    mock.push_tool_round(vec![(
        "tu_3",
        "delete_transaction",
        json!({"transaction_id": 1}),
    )]);
    mock.push_text("Removed it.");
    svc.submit_user_turn(thread.id, text("scratch that, refunded"))
        .await
        .unwrap();

    assert!(svc.db().find_transaction(1, 1).unwrap().is_none());
    let account = svc.db().find_account(1, 1).unwrap().unwrap();
    assert_eq!(account.balance, 500.0);
}

#[tokio::test]
async fn test_history_carries_across_turns() {
    let db = seeded_db();
    let mock = MockProvider::new();
    let svc = service_with(db, &mock);
    let thread = svc.create_thread(1, finance_options()).unwrap();

    mock.push_text("Hi!");
    svc.submit_user_turn(thread.id, text("hello")).await.unwrap();

    mock.push_text("Still here.");
    svc.submit_user_turn(thread.id, text("are you there?"))
        .await
        .unwrap();

    // The second request replays the first exchange.
    let requests = mock.requests();
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[0].role, "user");
    assert_eq!(requests[1].messages[1].role, "assistant");
    assert_eq!(requests[1].messages[2].role, "user");
}
