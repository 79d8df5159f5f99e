//! Session lifecycle: vector collection and asset directory per session.
//!
//! A session is created implicitly on first use. [`SessionStore::teardown`]
//! removes its collection and assets but keeps the in-process record, so
//! every writer for an id, before or after a teardown, queues on the same
//! write lock. The registry is a map guarded by an async `RwLock` with
//! insert-if-absent semantics.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use walkdir::WalkDir;

use qa_harness_core::store::VectorStore;
use qa_harness_core::{RagError, SessionId, Upstream};

/// One caller's isolated resources.
pub struct Session {
    pub id: SessionId,
    /// Vector collection name, `session_{id}`.
    pub collection: String,
    /// Directory holding raw uploaded assets.
    pub asset_dir: PathBuf,
    /// Serialises writes (ingestion, teardown) within this session.
    pub(crate) write_lock: Mutex<()>,
}

/// What [`SessionStore::teardown`] found and removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownOutcome {
    pub collection_existed: bool,
    pub assets_existed: bool,
}

impl TeardownOutcome {
    pub fn found_anything(&self) -> bool {
        self.collection_existed || self.assets_existed
    }
}

pub struct SessionStore {
    root: PathBuf,
    vectors: Arc<dyn VectorStore>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>, vectors: Arc<dyn VectorStore>) -> Self {
        Self {
            root: root.into(),
            vectors,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    /// Look up or register the session record. No storage is touched; the
    /// collection and directory are created on first write.
    pub async fn get_or_create(&self, id: &SessionId) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::debug!(session = %id, "registering session");
                Arc::new(Session {
                    id: id.clone(),
                    collection: id.collection_name(),
                    asset_dir: self.root.join(id.as_str()),
                    write_lock: Mutex::new(()),
                })
            })
            .clone()
    }

    /// Write `bytes` to the session asset directory under the final path
    /// component of `filename`. An existing file of the same name is replaced.
    pub async fn persist_asset(
        &self,
        session: &Session,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, RagError> {
        let name = asset_name(filename)?;
        tokio::fs::create_dir_all(&session.asset_dir).await?;
        let path = session.asset_dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(session = %session.id, path = %path.display(), "persisted asset");
        Ok(path)
    }

    /// Collect matching asset paths on the blocking pool.
    pub async fn collect_assets(&self, id: &SessionId, suffix: &str) -> Result<Vec<PathBuf>, RagError> {
        let dir = self.root.join(id.as_str());
        let suffix = suffix.to_string();
        tokio::task::spawn_blocking(move || scan_assets(dir, &suffix).collect())
            .await
            .map_err(|e| RagError::Internal(format!("asset listing task failed: {}", e)))
    }

    /// Lazily enumerate asset files whose name ends with `suffix` (case-insensitive),
    /// in file-name order. A missing directory yields nothing.
    /// Iterating touches the filesystem; async callers use [`Self::collect_assets`].
    pub fn list_assets(&self, id: &SessionId, suffix: &str) -> impl Iterator<Item = PathBuf> {
        scan_assets(self.root.join(id.as_str()), suffix)
    }

    /// Drop the session's collection and delete its asset directory.
    ///
    /// Idempotent: an unknown or already torn-down session succeeds with an
    /// outcome reporting that nothing existed. The session record stays
    /// registered so later writers share the same lock.
    pub async fn teardown(&self, id: &SessionId) -> Result<TeardownOutcome, RagError> {
        let session = self.get_or_create(id).await;
        let _guard = session.write_lock.lock().await;

        let collection_existed = self
            .vectors
            .drop_collection(&session.collection)
            .await
            .map_err(|e| RagError::upstream(Upstream::VectorStore, e))?;

        let assets_existed = match tokio::fs::remove_dir_all(&session.asset_dir).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        let outcome = TeardownOutcome {
            collection_existed,
            assets_existed,
        };
        if outcome.found_anything() {
            tracing::info!(
                session = %id,
                collection_existed,
                assets_existed,
                "session torn down"
            );
        } else {
            tracing::warn!(session = %id, "teardown found no collection or assets");
        }

        Ok(outcome)
    }
}

fn scan_assets(dir: PathBuf, suffix: &str) -> impl Iterator<Item = PathBuf> {
    let suffix = suffix.to_ascii_lowercase();
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.to_ascii_lowercase().ends_with(&suffix))
        })
        .map(|entry| entry.into_path())
}

/// Reduce an uploaded filename to a bare file name.
pub(crate) fn asset_name(filename: &str) -> Result<&str, RagError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty());
    name.ok_or_else(|| RagError::Conversion {
        filename: filename.to_string(),
        reason: "not a usable asset file name".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_harness_core::store::memory::InMemoryVectorStore;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> SessionStore {
        SessionStore::new(tmp.path().join("sessions"), Arc::new(InMemoryVectorStore::new()))
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = SessionId::parse("abc").unwrap();
        let a = store.get_or_create(&id).await;
        let b = store.get_or_create(&id).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.collection, "session_abc");
        assert!(!a.asset_dir.exists());
    }

    #[tokio::test]
    async fn test_persist_and_list_assets() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = SessionId::parse("abc").unwrap();
        let session = store.get_or_create(&id).await;

        store.persist_asset(&session, "b.html", b"<b>1</b>").await.unwrap();
        store.persist_asset(&session, "A.HTML", b"<a/>").await.unwrap();
        store.persist_asset(&session, "notes.txt", b"x").await.unwrap();
        store
            .persist_asset(&session, "../../escape/b.html", b"<b>2</b>")
            .await
            .unwrap();

        let names: Vec<String> = store
            .list_assets(&id, ".html")
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.HTML", "b.html"]);
        assert_eq!(
            store.collect_assets(&id, ".HTML").await.unwrap(),
            store.list_assets(&id, ".html").collect::<Vec<_>>()
        );
        assert_eq!(
            std::fs::read(session.asset_dir.join("b.html")).unwrap(),
            b"<b>2</b>"
        );
        assert!(!tmp.path().join("escape").exists());
    }

    #[tokio::test]
    async fn test_list_assets_of_unknown_session_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = SessionId::parse("ghost").unwrap();
        assert_eq!(store.list_assets(&id, ".html").count(), 0);
        assert!(store.collect_assets(&id, ".html").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let id = SessionId::parse("gone").unwrap();

        let session = store.get_or_create(&id).await;
        store.persist_asset(&session, "page.html", b"<p/>").await.unwrap();
        store
            .vectors()
            .create_collection(&session.collection, 4)
            .await
            .unwrap();

        let first = store.teardown(&id).await.unwrap();
        assert!(first.collection_existed && first.assets_existed);
        assert!(!session.asset_dir.exists());
        assert!(Arc::ptr_eq(&session, &store.get_or_create(&id).await));

        let second = store.teardown(&id).await.unwrap();
        assert!(!second.found_anything());

        let never = store
            .teardown(&SessionId::parse("never-created").unwrap())
            .await
            .unwrap();
        assert!(!never.found_anything());
    }
}
