use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::model::Session;
use crate::error::{Result, StageFlowError};

/// 会话持久化协作者
///
/// 快照、对话日志和 agent 审计日志按会话 id 关联存储。
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_all_sessions(&self) -> Result<Vec<Session>>;
    async fn load_session(&self, id: &str) -> Result<Option<Session>>;
    async fn save_session(&self, session: &Session) -> Result<()>;
    async fn delete_session(&self, id: &str) -> Result<()>;
    /// 删除超过 `threshold` 未活动的会话，返回删除数量
    async fn cleanup_expired(&self, threshold: Duration) -> Result<usize>;
}

pub(crate) fn chrono_threshold(threshold: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(threshold)
        .map_err(|err| StageFlowError::Config(format!("invalid expiry threshold: {err}")))
}

/// 内存存储实现
#[derive(Default)]
pub struct MemorySessionStore {
    inner: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_all_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.inner.read().values().cloned().collect())
    }

    async fn load_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.inner.read().get(id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        self.inner.write().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        self.inner.write().remove(id);
        Ok(())
    }

    async fn cleanup_expired(&self, threshold: Duration) -> Result<usize> {
        let threshold = chrono_threshold(threshold)?;
        let now = Utc::now();
        let mut sessions = self.inner.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, threshold));
        Ok(before - sessions.len())
    }
}

#[cfg(feature = "redis-store")]
pub mod redis {
    use super::*;
    use ::redis::AsyncCommands;
    use tracing::debug;

    use crate::session::model::{AgentFlowRecord, ConversationEntry};

    const INDEX_KEY: &str = "stageflow:sessions";

    fn store_error(err: impl std::fmt::Display) -> StageFlowError {
        StageFlowError::Store(err.to_string())
    }

    /// Redis 存储：每个会话三个键，快照为字符串，两类日志为只追加的列表
    pub struct RedisSessionStore {
        client: ::redis::Client,
        prefix: String,
    }

    impl RedisSessionStore {
        pub fn new(client: ::redis::Client) -> Self {
            Self {
                client,
                prefix: "stageflow:session".to_string(),
            }
        }

        pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
            self.prefix = prefix.into();
            self
        }

        fn snapshot_key(&self, id: &str) -> String {
            format!("{}:{id}", self.prefix)
        }

        fn conversation_key(&self, id: &str) -> String {
            format!("{}:{id}:conversation", self.prefix)
        }

        fn flow_key(&self, id: &str) -> String {
            format!("{}:{id}:flow", self.prefix)
        }

        async fn connection(&self) -> Result<::redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(store_error)
        }

        /// 只追加列表中尚未写入的尾部
        async fn append_tail<T: serde::Serialize>(
            conn: &mut ::redis::aio::MultiplexedConnection,
            key: &str,
            entries: &[T],
        ) -> Result<()> {
            let mut stored: usize = conn.llen(key).await.map_err(store_error)?;
            if stored > entries.len() {
                // 会话被重建过，整体重写
                let _: () = conn.del(key).await.map_err(store_error)?;
                stored = 0;
            }
            let tail = entries[stored..]
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if !tail.is_empty() {
                let _: () = conn.rpush(key, tail).await.map_err(store_error)?;
            }
            Ok(())
        }

        async fn read_list<T: serde::de::DeserializeOwned>(
            conn: &mut ::redis::aio::MultiplexedConnection,
            key: &str,
        ) -> Result<Vec<T>> {
            let raw: Vec<String> = conn.lrange(key, 0, -1).await.map_err(store_error)?;
            raw.iter()
                .map(|entry| serde_json::from_str(entry).map_err(StageFlowError::from))
                .collect()
        }
    }

    #[async_trait]
    impl SessionStore for RedisSessionStore {
        async fn load_all_sessions(&self) -> Result<Vec<Session>> {
            let mut conn = self.connection().await?;
            let ids: Vec<String> = conn.smembers(INDEX_KEY).await.map_err(store_error)?;
            let mut sessions = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(session) = self.load_session(&id).await? {
                    sessions.push(session);
                }
            }
            Ok(sessions)
        }

        async fn load_session(&self, id: &str) -> Result<Option<Session>> {
            let mut conn = self.connection().await?;
            let snapshot: Option<String> = conn.get(self.snapshot_key(id)).await.map_err(store_error)?;
            let Some(snapshot) = snapshot else {
                return Ok(None);
            };
            let snapshot: Session = serde_json::from_str(&snapshot)?;
            let conversation: Vec<ConversationEntry> =
                Self::read_list(&mut conn, &self.conversation_key(id)).await?;
            let flow: Vec<AgentFlowRecord> = Self::read_list(&mut conn, &self.flow_key(id)).await?;
            Ok(Some(Session::from_parts(snapshot, conversation, flow)))
        }

        async fn save_session(&self, session: &Session) -> Result<()> {
            let mut conn = self.connection().await?;
            let (snapshot, conversation, flow) = session.clone().into_parts();
            let payload = serde_json::to_string(&snapshot)?;
            let _: () = conn
                .set(self.snapshot_key(&session.id), payload)
                .await
                .map_err(store_error)?;
            Self::append_tail(&mut conn, &self.conversation_key(&session.id), &conversation).await?;
            Self::append_tail(&mut conn, &self.flow_key(&session.id), &flow).await?;
            let _: () = conn
                .sadd(INDEX_KEY, &session.id)
                .await
                .map_err(store_error)?;
            debug!(session_id = %session.id, "session saved to redis");
            Ok(())
        }

        async fn delete_session(&self, id: &str) -> Result<()> {
            let mut conn = self.connection().await?;
            let keys = vec![self.snapshot_key(id), self.conversation_key(id), self.flow_key(id)];
            let _: () = conn.del(keys).await.map_err(store_error)?;
            let _: () = conn.srem(INDEX_KEY, id).await.map_err(store_error)?;
            Ok(())
        }

        async fn cleanup_expired(&self, threshold: Duration) -> Result<usize> {
            let threshold = chrono_threshold(threshold)?;
            let now = Utc::now();
            let mut removed = 0;
            for session in self.load_all_sessions().await? {
                if session.is_expired(now, threshold) {
                    self.delete_session(&session.id).await?;
                    removed += 1;
                }
            }
            Ok(removed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_and_expires() {
        let store = MemorySessionStore::new();
        let mut stale = Session::new("stale");
        stale.metadata.last_activity = Utc::now() - chrono::Duration::hours(30);
        store.save_session(&stale).await.unwrap();
        store.save_session(&Session::new("fresh")).await.unwrap();

        assert_eq!(store.load_all_sessions().await.unwrap().len(), 2);
        let removed = store
            .cleanup_expired(Duration::from_secs(24 * 60 * 60))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.load_session("stale").await.unwrap().is_none());
        assert!(store.load_session("fresh").await.unwrap().is_some());

        store.delete_session("fresh").await.unwrap();
        assert!(store.is_empty());
    }
}
