use std::sync::Arc;

use serde_json::json;
use stageflow::session::{
    AgentFlowRecord, ConversationEntry, FlowMetrics, HealthStatus, RecoveryAction,
};
use stageflow::{
    FileSessionStore, HealthThresholds, MemorySessionStore, Registry, Session, SessionManager,
    SessionSettings, SessionStore, Stage, StageFlowError, StageMapping,
};

fn completed_record(agent: &str, stage: Stage) -> AgentFlowRecord {
    AgentFlowRecord::running(agent, stage, chrono::Utc::now(), json!({ "message": "hi" }))
        .complete(Some(json!({ "ok": true })), FlowMetrics::default())
}

#[tokio::test]
async fn file_store_round_trips_related_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileSessionStore::new(dir.path());

    let mut session = Session::new("round-trip").with_user("u-1");
    session.push_message(ConversationEntry::user("hello"));
    session.push_message(ConversationEntry::assistant("welcome", "hi there"));
    session.record_flow(completed_record("welcome", Stage::Welcome)).unwrap();
    session.advance_to(Stage::InfoCollection, 40).unwrap();
    session.collected_data.personal.name = Some("Octo".into());
    store.save_session(&session).await.unwrap();

    let loaded = store.load_session("round-trip").await.unwrap().unwrap();
    assert_eq!(loaded, session);
    assert_eq!(loaded.conversation_history().len(), 2);
    assert_eq!(loaded.agent_flow().len(), 1);
    assert_eq!(loaded.current_stage(), Stage::InfoCollection);

    // 另一个实例指向同一目录，模拟重启
    let reopened = FileSessionStore::new(dir.path());
    let all = reopened.load_all_sessions().await.unwrap();
    assert_eq!(all.len(), 1);

    reopened.delete_session("round-trip").await.unwrap();
    assert!(store.load_session("round-trip").await.unwrap().is_none());
}

#[tokio::test]
async fn manager_reloads_from_store_after_restart() {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let first = SessionManager::new(Arc::clone(&store));
    let mut session = first.create_session(Some("user-7".into())).await.unwrap();
    session.record_interaction();
    first.save_session(&session).await.unwrap();

    let restarted = SessionManager::new(Arc::clone(&store));
    assert!(!restarted.is_cached(&session.id));
    let loaded = restarted.require_session(&session.id).await.unwrap();
    assert_eq!(loaded.user_id.as_deref(), Some("user-7"));
    assert_eq!(loaded.metadata.metrics.interactions, 1);
    assert!(restarted.is_cached(&session.id));

    let warmed = SessionManager::new(store);
    assert_eq!(warmed.warm_cache().await.unwrap(), 1);
    assert_eq!(warmed.cached_count(), 1);
}

#[tokio::test]
async fn missing_sessions_are_reported() {
    let manager = SessionManager::new(Arc::new(MemorySessionStore::new()));
    let err = manager.require_session("ghost").await.unwrap_err();
    assert!(matches!(err, StageFlowError::SessionNotFound(id) if id == "ghost"));

    let fresh = manager.get_or_create("ghost").await.unwrap();
    assert_eq!(fresh.current_stage(), Stage::Welcome);
}

#[test]
fn completed_stages_only_shrink_on_reset() {
    let mapping = StageMapping::standard();
    let mut session = Session::new("mono");
    let mut previous = 0;
    for stage in mapping.sequence().into_iter().skip(1) {
        session.advance_to(stage, mapping.progress_for(stage)).unwrap();
        assert!(session.completed_stages().len() > previous);
        previous = session.completed_stages().len();
    }
    assert!(session
        .advance_to(Stage::InfoCollection, 40)
        .is_err());
    assert_eq!(session.completed_stages().len(), 3);

    session.reset_to_stage(Stage::InfoCollection, 40);
    assert_eq!(session.completed_stages(), &[Stage::Welcome]);
    assert_eq!(session.current_stage(), Stage::InfoCollection);
}

#[tokio::test]
async fn reset_session_persists_truncated_progress() {
    let manager = SessionManager::new(Arc::new(MemorySessionStore::new()));
    let mut session = manager.create_session(None).await.unwrap();
    session.advance_to(Stage::InfoCollection, 40).unwrap();
    session.advance_to(Stage::PageDesign, 70).unwrap();
    manager.save_session(&session).await.unwrap();

    let reset = manager.reset_session(&session.id, Stage::Welcome, 10).await.unwrap();
    assert!(reset.completed_stages().is_empty());
    let stored = manager.store().load_session(&session.id).await.unwrap().unwrap();
    assert_eq!(stored.current_stage(), Stage::Welcome);
    assert_eq!(stored.progress(), 10);
}

#[test]
fn six_errors_make_a_session_critical() {
    let manager = SessionManager::new(Arc::new(MemorySessionStore::new()));
    let mut session = Session::new("sick");
    for _ in 0..6 {
        session.record_error();
    }

    let health = manager.session_health(&session);
    assert_eq!(health.status, HealthStatus::Critical);
    assert!(!health.issues.is_empty());
    assert!(!health.suggestions.is_empty());

    let advice = manager.recovery_recommendation(
        &session,
        &StageFlowError::Config("bad template".into()),
    );
    assert_eq!(advice.action, RecoveryAction::Restart);
    assert_eq!(advice.target_stage, Some(Stage::Welcome));
}

#[test]
fn timeouts_are_retried_regardless_of_health() {
    let manager = SessionManager::with_settings(
        Arc::new(MemorySessionStore::new()),
        SessionSettings::default(),
        HealthThresholds::default(),
    );
    let mut session = Session::new("slow");
    for _ in 0..10 {
        session.record_error();
    }
    let advice = manager.recovery_recommendation(
        &session,
        &StageFlowError::ToolTimeout {
            tool: "analyze_github".into(),
            timeout_ms: 15_000,
        },
    );
    assert_eq!(advice.action, RecoveryAction::Retry);
}

#[test]
fn legacy_start_label_resolves_to_first_agent() {
    let mapping = StageMapping::standard();
    assert_eq!(mapping.get_agent_from_stage("start"), Some("welcome"));
    assert_eq!(mapping.get_agent_from_stage("no-such-stage"), Some("welcome"));

    for stage in mapping.sequence() {
        let agent = mapping.agent_for(stage).unwrap();
        assert_eq!(mapping.get_stage_from_agent(agent), Some(stage));
        assert_eq!(mapping.get(&stage).map(|binding| binding.stage), Some(stage));
    }
    assert_eq!(mapping.get_next_agent("coding"), None);
    assert!(!mapping.should_continue_to_next_agent("coding"));
}
