use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use super::model::{AgentFlowRecord, ConversationEntry, Session};
use super::store::{chrono_threshold, SessionStore};
use crate::error::{Result, StageFlowError};
use crate::utils::ConfigValidator;

const SNAPSHOT_FILE: &str = "session.json";
const CONVERSATION_FILE: &str = "conversation.json";
const FLOW_FILE: &str = "agent_flow.json";

fn io_error(path: &Path, err: std::io::Error) -> StageFlowError {
    StageFlowError::Store(format!("{}: {err}", path.display()))
}

/// JSON 文件存储：每个会话一个目录，快照与两类日志分文件保存
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, id: &str) -> Result<PathBuf> {
        ConfigValidator::validate_session_id(id)?;
        Ok(self.root.join(id))
    }

    async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
        let payload = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload)
            .await
            .map_err(|err| io_error(&tmp, err))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|err| io_error(path, err))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(path, err)),
        }
    }

    async fn load_dir(dir: &Path) -> Result<Option<Session>> {
        let Some(snapshot) = Self::read_json::<Session>(&dir.join(SNAPSHOT_FILE)).await? else {
            return Ok(None);
        };
        let conversation: Vec<ConversationEntry> = Self::read_json(&dir.join(CONVERSATION_FILE))
            .await?
            .unwrap_or_default();
        let flow: Vec<AgentFlowRecord> = Self::read_json(&dir.join(FLOW_FILE))
            .await?
            .unwrap_or_default();
        Ok(Some(Session::from_parts(snapshot, conversation, flow)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load_all_sessions(&self) -> Result<Vec<Session>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&self.root, err)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error(&self.root, err))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|kind| kind.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let path = entry.path();
            // 单个损坏的会话不影响其它会话加载
            match Self::load_dir(&path).await {
                Ok(Some(session)) => sessions.push(session),
                Ok(None) => {}
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable session"),
            }
        }
        Ok(sessions)
    }

    async fn load_session(&self, id: &str) -> Result<Option<Session>> {
        Self::load_dir(&self.session_dir(id)?).await
    }

    async fn save_session(&self, session: &Session) -> Result<()> {
        let dir = self.session_dir(&session.id)?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| io_error(&dir, err))?;

        let (snapshot, conversation, flow) = session.clone().into_parts();
        Self::write_json(&dir.join(CONVERSATION_FILE), &conversation).await?;
        Self::write_json(&dir.join(FLOW_FILE), &flow).await?;
        // 快照最后写入，作为该会话已完整落盘的标志
        Self::write_json(&dir.join(SNAPSHOT_FILE), &snapshot).await?;
        debug!(session_id = %session.id, path = %dir.display(), "session saved");
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        let dir = self.session_dir(id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&dir, err)),
        }
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
