//! In-memory status store and memory stream, with a JSON snapshot file.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::services::{CognitionHook, MemoryStream, StatusStore};
use crate::types::{now_rfc3339, VisionError, VisionResult};

/// Topic used for thoughts pushed through the cognition hook.
pub const THOUGHT_TOPIC: &str = "thought";

/// Status map held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    values: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            values: RwLock::new(values),
        }
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.read().await.clone()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn get(&self, key: &str) -> VisionResult<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Value) -> VisionResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// One record of the memory stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    pub topic: String,
    pub description: String,
    pub timestamp: String,
}

#[derive(Debug)]
struct StreamState {
    nodes: Vec<MemoryNode>,
    next_id: u64,
}

/// Append-only memory stream held in memory. Node ids are `"1"`, `"2"`, ...
#[derive(Debug)]
pub struct InMemoryMemoryStream {
    state: Mutex<StreamState>,
}

impl Default for InMemoryMemoryStream {
    fn default() -> Self {
        Self::from_nodes(Vec::new(), 1)
    }
}

impl InMemoryMemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: Vec<MemoryNode>, next_id: u64) -> Self {
        Self {
            state: Mutex::new(StreamState { nodes, next_id }),
        }
    }

    pub async fn nodes(&self) -> Vec<MemoryNode> {
        self.state.lock().await.nodes.clone()
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    /// The most recent `limit` nodes, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<MemoryNode> {
        let state = self.state.lock().await;
        state.nodes.iter().rev().take(limit).cloned().collect()
    }

    pub async fn by_topic(&self, topic: &str) -> Vec<MemoryNode> {
        let state = self.state.lock().await;
        state.nodes.iter().filter(|n| n.topic == topic).cloned().collect()
    }

    async fn next_id(&self) -> u64 {
        self.state.lock().await.next_id
    }
}

#[async_trait]
impl MemoryStream for InMemoryMemoryStream {
    async fn add(&self, topic: &str, description: &str) -> VisionResult<String> {
        let mut state = self.state.lock().await;
        let id = state.next_id.to_string();
        state.next_id += 1;
        state.nodes.push(MemoryNode {
            id: id.clone(),
            topic: topic.to_string(),
            description: description.to_string(),
            timestamp: now_rfc3339(),
        });
        Ok(id)
    }
}

#[async_trait]
impl CognitionHook for InMemoryMemoryStream {
    async fn save_thought(&self, thought: &str) -> VisionResult<()> {
        self.add(THOUGHT_TOPIC, thought).await.map(|_| ())
    }
}

/// Serializable snapshot of an agent's status and memory stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub status: BTreeMap<String, Value>,
    #[serde(default)]
    pub memories: Vec<MemoryNode>,
    #[serde(default = "first_node_id")]
    pub next_node_id: u64,
}

fn first_node_id() -> u64 {
    1
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: BTreeMap::new(),
            memories: Vec::new(),
            next_node_id: first_node_id(),
        }
    }
}

impl AgentState {
    /// Snapshot live stores.
    pub async fn capture(status: &InMemoryStatusStore, stream: &InMemoryMemoryStream) -> Self {
        Self {
            status: status.snapshot().await,
            memories: stream.nodes().await,
            next_node_id: stream.next_id().await,
        }
    }

    /// Build live stores from this snapshot.
    pub fn into_stores(self) -> (InMemoryStatusStore, InMemoryMemoryStream) {
        let next_id = self
            .memories
            .iter()
            .filter_map(|n| n.id.parse::<u64>().ok())
            .max()
            .map_or(self.next_node_id, |max| self.next_node_id.max(max + 1));
        (
            InMemoryStatusStore::from_values(self.status),
            InMemoryMemoryStream::from_nodes(self.memories, next_id),
        )
    }

    /// Read a snapshot. A missing file yields an empty state.
    pub fn read_from_file(path: &Path) -> VisionResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| VisionError::Storage(format!("Invalid agent state {}: {e}", path.display())))
    }

    /// Write a snapshot, creating parent directories as needed.
    pub fn write_to_file(&self, path: &Path) -> VisionResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_ids_are_sequential() {
        tokio_test::block_on(async {
            let stream = InMemoryMemoryStream::new();
            assert_eq!(stream.add("geo_vision", "first").await.unwrap(), "1");
            assert_eq!(stream.add("geo_vision", "second").await.unwrap(), "2");
            stream.save_thought("a thought").await.unwrap();

            assert_eq!(stream.count().await, 3);
            assert_eq!(stream.recent(1).await[0].topic, THOUGHT_TOPIC);
            assert_eq!(stream.by_topic("geo_vision").await.len(), 2);
        });
    }

    #[test]
    fn test_status_roundtrip() {
        tokio_test::block_on(async {
            let status = InMemoryStatusStore::new();
            assert!(status.get("missing").await.unwrap().is_none());
            status.update("mood", serde_json::json!("calm")).await.unwrap();
            assert_eq!(status.get("mood").await.unwrap(), Some(serde_json::json!("calm")));
        });
    }

    #[test]
    fn test_state_file_roundtrip() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("agent.json");

            let status = InMemoryStatusStore::new();
            let stream = InMemoryMemoryStream::new();
            status.update("current_image_path", serde_json::json!("/a.jpg")).await.unwrap();
            stream.add("geo_vision", "seen").await.unwrap();

            AgentState::capture(&status, &stream).await.write_to_file(&path).unwrap();
            let (status, stream) = AgentState::read_from_file(&path).unwrap().into_stores();

            assert_eq!(
                status.get("current_image_path").await.unwrap(),
                Some(serde_json::json!("/a.jpg"))
            );
            assert_eq!(stream.add("geo_vision", "again").await.unwrap(), "2");
        });
    }

    #[test]
    fn test_missing_state_file_is_empty() {
        let state = AgentState::read_from_file(Path::new("/nonexistent/agent.json")).unwrap();
        assert!(state.status.is_empty());
        assert_eq!(state.next_node_id, 1);
    }

    #[test]
    fn test_corrupt_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(&path, "[not an object").unwrap();
        assert!(matches!(AgentState::read_from_file(&path), Err(VisionError::Storage(_))));
    }
}
