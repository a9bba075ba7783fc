//! Durable per-user conversation storage.
//!
//! One JSON file per user id under the storage directory. The store is
//! the sole source of truth for conversation state; there is no cache
//! in front of it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::warn;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::chat::message::Message;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct HistoryStore {
    storage_dir: PathBuf,
}

impl HistoryStore {
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        if !storage_dir.exists() {
            fs::create_dir_all(&storage_dir)?;
        }
        Ok(Self { storage_dir })
    }

    /// Load the conversation stored for `user_id`.
    ///
    /// A missing file is an empty conversation. An unreadable or
    /// structurally invalid file is logged and also treated as empty:
    /// the user starts over rather than every request failing on the
    /// same bad record.
    pub fn load(&self, user_id: &str) -> Vec<Message> {
        let path = self.conversation_path(user_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read history for {}: {}", user_id, e);
                return Vec::new();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Discarding corrupt history for {}: {}", user_id, e);
                Vec::new()
            }
        }
    }

    /// Replace the stored conversation for `user_id` with `messages`.
    ///
    /// The write lands in a temp file in the same directory, is synced,
    /// then renamed over the target, so a concurrent `load` observes
    /// either the old or the new contents, never a partial file.
    pub fn save(&self, user_id: &str, messages: &[Message]) -> Result<(), HistoryError> {
        let json = serde_json::to_vec_pretty(messages)?;

        let mut tmp = NamedTempFile::new_in(&self.storage_dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.conversation_path(user_id))
            .map_err(|e| HistoryError::Io(e.error))?;

        Ok(())
    }

    /// Remove the stored conversation for `user_id`, if any.
    pub fn delete(&self, user_id: &str) -> Result<(), HistoryError> {
        match fs::remove_file(self.conversation_path(user_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HistoryError::Io(e)),
        }
    }

    fn conversation_path(&self, user_id: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", escape_key(user_id)))
    }
}

/// Map an arbitrary user id onto a filesystem-safe file stem.
///
/// Alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`, so distinct ids never collide on disk.
fn escape_key(user_id: &str) -> String {
    let mut out = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        let messages = vec![Message::user("Hello"), Message::agent("Hi")];
        store.save("u1", &messages).unwrap();

        assert_eq!(store.load("u1"), messages);
    }

    #[test]
    fn missing_user_loads_empty() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        assert!(store.load("nobody").is_empty());
    }

    #[test]
    fn corrupt_record_loads_empty() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        store.save("u1", &[Message::user("Hello")]).unwrap();
        fs::write(dir.path().join("u1.json"), b"\xff\xfenot json at all").unwrap();

        assert!(store.load("u1").is_empty());
    }

    #[test]
    fn wrong_shape_loads_empty() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        fs::write(dir.path().join("u1.json"), br#"{"role": "user"}"#).unwrap();

        assert!(store.load("u1").is_empty());
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        store.save("u1", &[Message::user("first")]).unwrap();
        let replacement = vec![Message::user("second"), Message::agent("reply")];
        store.save("u1", &replacement).unwrap();

        assert_eq!(store.load("u1"), replacement);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        store.save("u1", &[Message::user("Hello")]).unwrap();
        store.delete("u1").unwrap();
        store.delete("u1").unwrap();

        assert!(store.load("u1").is_empty());
    }

    #[test]
    fn unusual_user_ids_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();

        store.save("a/b", &[Message::user("slash")]).unwrap();
        store.save("a%2Fb", &[Message::user("encoded")]).unwrap();

        assert_eq!(store.load("a/b"), vec![Message::user("slash")]);
        assert_eq!(store.load("a%2Fb"), vec![Message::user("encoded")]);
    }
}
