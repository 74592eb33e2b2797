use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::health::{self, RecoveryRecommendation, SessionHealth};
use super::model::Session;
use super::store::{chrono_threshold, SessionStore};
use crate::config::{HealthThresholds, SessionSettings};
use crate::error::{Result, StageFlowError};
use crate::flow::Stage;

/// 会话仓库：进程内缓存 + 持久化存储
///
/// 读取时缓存未命中则回源加载（read-through），写入时先更新缓存再写存储
/// （write-through）。同一会话的并发修改由调用方避免。
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: RwLock<HashMap<String, Session>>,
    settings: SessionSettings,
    thresholds: HealthThresholds,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_settings(store, SessionSettings::default(), HealthThresholds::default())
    }

    pub fn with_settings(
        store: Arc<dyn SessionStore>,
        settings: SessionSettings,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            settings,
            thresholds,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.cache.read().contains_key(id)
    }

    /// 启动时预热缓存
    pub async fn warm_cache(&self) -> Result<usize> {
        let sessions = self.store.load_all_sessions().await?;
        let count = sessions.len();
        let mut cache = self.cache.write();
        for session in sessions {
            cache.insert(session.id.clone(), session);
        }
        info!(count, "session cache warmed");
        Ok(count)
    }

    pub async fn create_session(&self, user_id: Option<String>) -> Result<Session> {
        let mut session = Session::new(Uuid::new_v4().to_string());
        session.user_id = user_id;
        self.save_session(&session).await?;
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        if let Some(session) = self.cache.read().get(id) {
            return Ok(Some(session.clone()));
        }

        debug!(session_id = %id, "session cache miss, loading from store");
        let loaded = self.store.load_session(id).await?;
        if let Some(session) = &loaded {
            self.cache.write().insert(id.to_string(), session.clone());
        }
        Ok(loaded)
    }

    pub async fn require_session(&self, id: &str) -> Result<Session> {
        self.get_session(id)
            .await?
            .ok_or_else(|| StageFlowError::SessionNotFound(id.to_string()))
    }

    /// 读取会话，不存在时以该 id 新建；存储读取失败直接返回错误，
    /// 不能用空会话覆盖存储里已有的记录
    pub async fn get_or_create(&self, id: &str) -> Result<Session> {
        match self.get_session(id).await? {
            Some(session) => Ok(session),
            None => {
                info!(session_id = %id, "creating session");
                Ok(Session::new(id))
            }
        }
    }

    /// 缓存总是更新；存储失败作为错误返回，由调用方决定是否吞掉
    pub async fn save_session(&self, session: &Session) -> Result<()> {
        self.cache.write().insert(session.id.clone(), session.clone());
        self.store.save_session(session).await
    }

    pub async fn delete_session(&self, id: &str) -> Result<()> {
        self.cache.write().remove(id);
        self.store.delete_session(id).await
    }

    /// 管理操作：把会话重置到指定阶段
    pub async fn reset_session(&self, id: &str, stage: Stage, progress: u8) -> Result<Session> {
        let mut session = self.require_session(id).await?;
        info!(session_id = %id, %stage, "resetting session");
        session.reset_to_stage(stage, progress);
        self.save_session(&session).await?;
        Ok(session)
    }

    pub async fn cleanup_expired(&self) -> Result<usize> {
        let expiry = self.settings.expiry();
        let threshold = chrono_threshold(expiry)?;
        let now = Utc::now();
        let evicted = {
            let mut cache = self.cache.write();
            let before = cache.len();
            cache.retain(|_, session| !session.is_expired(now, threshold));
            before - cache.len()
        };
        let removed = self.store.cleanup_expired(expiry).await?;
        info!(evicted, removed, "expired sessions cleaned up");
        Ok(removed.max(evicted))
    }

    /// 后台定期清理；返回的句柄被 abort 时停止
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.settings.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = manager.cleanup_expired().await {
                    warn!(error = %err, "session cleanup failed");
                }
            }
        })
    }

    pub fn session_health(&self, session: &Session) -> SessionHealth {
        health::assess(session, &self.thresholds)
    }

    pub fn recovery_recommendation(
        &self,
        session: &Session,
        error: &StageFlowError,
    ) -> RecoveryRecommendation {
        health::recommend(session, error, &self.thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::MemorySessionStore;

    #[tokio::test]
    async fn cache_miss_reads_through_to_store() {
        let store = Arc::new(MemorySessionStore::new());
        store.save_session(&Session::new("persisted")).await.unwrap();

        let manager = SessionManager::new(store.clone());
        assert!(!manager.is_cached("persisted"));
        let session = manager.get_session("persisted").await.unwrap();
        assert!(session.is_some());
        assert!(manager.is_cached("persisted"));
    }

    #[tokio::test]
    async fn reset_requires_existing_session() {
        let manager = SessionManager::new(Arc::new(MemorySessionStore::new()));
        let err = manager.reset_session("missing", Stage::Welcome, 10).await.unwrap_err();
        assert!(matches!(err, StageFlowError::SessionNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn background_cleanup_evicts_stale_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let settings = SessionSettings {
            expiry_ms: 1_000,
            cleanup_interval_ms: 60_000,
        };
        let manager = Arc::new(SessionManager::with_settings(
            store.clone(),
            settings,
            HealthThresholds::default(),
        ));
        let mut stale = Session::new("stale");
        stale.metadata.last_activity = Utc::now() - chrono::Duration::hours(1);
        manager.save_session(&stale).await.unwrap();

        let handle = manager.spawn_cleanup();
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        handle.abort();

        assert!(!manager.is_cached("stale"));
        assert!(store.is_empty());
    }
}
