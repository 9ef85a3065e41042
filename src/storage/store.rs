use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::error::StorageError;
use crate::cache::PieceCache;
use crate::metainfo::File;

const PIECES_DIR: &str = "pieces";
const PIECE_SUFFIX: &str = ".piece";
const CACHE_CAPACITY: usize = 30;
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Outcome of one asynchronous piece write.
#[derive(Debug)]
pub struct StoreResult {
    pub index: u32,
    pub error: Option<StorageError>,
}

/// Outcome of one piece retrieval.
///
/// Clonable so a single result can fan out to every waiter of a
/// coalesced read; `data` is `None` exactly when `error` is set.
#[derive(Debug, Clone)]
pub struct RetrieveResult {
    pub index: u32,
    pub data: Option<Bytes>,
    pub error: Option<Arc<StorageError>>,
}

/// Piece persistence for one download directory.
///
/// Pieces land in a `pieces/` subdirectory as `<index>.piece` files.
/// Reads go through a bounded cache, and concurrent retrievals of the
/// same uncached piece share one disk read. The store is cheap to clone
/// and all clones see the same state.
#[derive(Clone)]
pub struct PieceStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    root: PathBuf,
    pieces_dir: PathBuf,
    cache: PieceCache,
    pending_reads: Mutex<HashMap<u32, Vec<mpsc::Sender<RetrieveResult>>>>,
}

impl PieceStore {
    /// Opens a store rooted at an existing directory.
    ///
    /// The root must be owner readable/writable/executable; the
    /// `pieces/` subdirectory is created if absent.
    ///
    /// # Errors
    ///
    /// Fails when the root is missing, has insufficient permissions, or
    /// the pieces directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        check_owner_permissions(&root)?;

        let pieces_dir = root.join(PIECES_DIR);
        if !pieces_dir.is_dir() {
            create_dir_with_mode(&pieces_dir)?;
        }

        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                pieces_dir,
                cache: PieceCache::new(CACHE_CAPACITY),
                pending_reads: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Writes a piece to disk in the background.
    ///
    /// The outcome is reported on `results`. When the write fails, the
    /// data is kept in the cache so readers of this index still succeed,
    /// and the error is reported regardless.
    pub fn store(&self, index: u32, data: Bytes, results: mpsc::Sender<StoreResult>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let error = match tokio::fs::write(inner.piece_path(index), &data).await {
                Ok(()) => None,
                Err(e) => {
                    inner.cache.put(index, data);
                    Some(StorageError::Io(e))
                }
            };

            let _ = results.send(StoreResult { index, error }).await;
        });
    }

    /// Retrieves a piece, delivering the result on `sink`.
    ///
    /// Cache hits are delivered immediately. On a miss, concurrent
    /// retrievals of the same index are coalesced: the first installs a
    /// background read and later callers just join its waiter list;
    /// every waiter receives the same result.
    pub async fn retrieve(&self, index: u32, sink: mpsc::Sender<RetrieveResult>) {
        if let Some(data) = self.inner.cache.get(index) {
            let result = RetrieveResult {
                index,
                data: Some(data),
                error: None,
            };
            let _ = sink.send(result).await;
            return;
        }

        let launch_read = {
            let mut pending = self.inner.pending_reads.lock();
            match pending.entry(index) {
                Entry::Occupied(mut waiters) => {
                    waiters.get_mut().push(sink);
                    false
                }
                Entry::Vacant(slot) => {
                    slot.insert(vec![sink]);
                    true
                }
            }
        };

        if launch_read {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.read_and_fan_out(index).await;
            });
        }
    }

    /// Assembles the user-visible files out of the stored pieces.
    ///
    /// A blocking one-shot operation, intended to run once per download
    /// after every piece has been stored. The stored indices must form
    /// a run starting at 0; otherwise the operation is rejected without
    /// touching anything. A failure while writing the files triggers a
    /// cleanup pass that removes everything at the destination root
    /// except the pieces directory.
    pub async fn compose_files(&self, files: &[File]) -> Result<(), StorageError> {
        let indexes = self.inner.list_piece_indexes().await?;

        let consecutive = indexes
            .iter()
            .enumerate()
            .all(|(position, &index)| index == position as u32);
        let total_length: u64 = files.iter().map(|f| f.length).sum();
        if !consecutive || (indexes.is_empty() && total_length > 0) {
            return Err(StorageError::MissingPieces);
        }

        if let Err(e) = self.inner.populate_files(files, indexes.len()).await {
            self.inner.cleanup_destination().await;
            return Err(StorageError::ComposeFailed(Box::new(e)));
        }

        Ok(())
    }
}

impl StoreInner {
    async fn read_and_fan_out(&self, index: u32) {
        let result = match tokio::fs::read(self.piece_path(index)).await {
            Ok(data) => {
                let data = Bytes::from(data);
                self.cache.put(index, data.clone());
                RetrieveResult {
                    index,
                    data: Some(data),
                    error: None,
                }
            }
            Err(e) => {
                error!(index, error = %e, "failed to retrieve piece");
                RetrieveResult {
                    index,
                    data: None,
                    error: Some(Arc::new(StorageError::Io(e))),
                }
            }
        };

        let waiters = {
            let mut pending = self.pending_reads.lock();
            pending.remove(&index).unwrap_or_default()
        };

        for sink in waiters {
            let _ = sink.send(result.clone()).await;
        }
    }

    async fn populate_files(&self, files: &[File], piece_count: usize) -> Result<(), StorageError> {
        let mut piece_index: usize = 0;
        let mut piece_offset: usize = 0;

        for file in files {
            let full_path = self.root.join(&file.path);
            if let Some(parent) = full_path.parent() {
                create_dir_with_mode(parent)?;
            }

            let mut output = tokio::fs::File::create(&full_path).await?;
            let mut to_write = file.length as usize;

            while to_write > 0 {
                if piece_index >= piece_count {
                    return Err(StorageError::MissingPieces);
                }

                let piece = tokio::fs::read(self.piece_path(piece_index as u32)).await?;
                let available = piece.get(piece_offset..).unwrap_or(&[]);

                if available.len() <= to_write {
                    output.write_all(available).await?;
                    to_write -= available.len();
                    piece_index += 1;
                    piece_offset = 0;
                } else {
                    output.write_all(&available[..to_write]).await?;
                    piece_offset += to_write;
                    to_write = 0;
                }
            }

            output.flush().await?;
            info!(path = %full_path.display(), "composed file");
        }

        Ok(())
    }

    async fn list_piece_indexes(&self) -> Result<Vec<u32>, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.pieces_dir).await?;
        let mut indexes = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if let Some(stem) = name.strip_suffix(PIECE_SUFFIX) {
                if let Ok(index) = stem.parse::<u32>() {
                    indexes.push(index);
                }
            }
        }

        indexes.sort_unstable();
        Ok(indexes)
    }

    /// Best-effort removal of everything at the root except the pieces
    /// directory. Failures are logged, not surfaced.
    async fn cleanup_destination(&self) {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(root = %self.root.display(), error = %e, "failed to list destination for cleanup");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => return,
                Err(e) => {
                    error!(root = %self.root.display(), error = %e, "failed to walk destination for cleanup");
                    return;
                }
            };

            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);

            let removal = if is_dir {
                if entry.file_name() == PIECES_DIR {
                    continue;
                }
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };

            if let Err(e) = removal {
                error!(path = %path.display(), error = %e, "failed to delete during cleanup");
            }
        }
    }

    fn piece_path(&self, index: u32) -> PathBuf {
        self.pieces_dir.join(format!("{}{}", index, PIECE_SUFFIX))
    }
}

fn check_owner_permissions(path: &Path) -> Result<(), StorageError> {
    let metadata = std::fs::metadata(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o700 != 0o700 {
            return Err(StorageError::InsufficientPermissions(format!(
                "{:o}",
                mode & 0o777
            )));
        }
    }

    #[cfg(not(unix))]
    {
        if metadata.permissions().readonly() {
            return Err(StorageError::InsufficientPermissions("read-only".into()));
        }
    }

    Ok(())
}

fn create_dir_with_mode(path: &Path) -> Result<(), StorageError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }

    builder.create(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // White-box check of read coalescing: a retrieval that finds a
    // pending entry must only join the waiter list, and the fan-out must
    // deliver one shared result to every waiter.
    #[tokio::test]
    async fn concurrent_retrieves_share_one_read() {
        let temp = TempDir::new().unwrap();
        let store = PieceStore::new(temp.path()).unwrap();
        tokio::fs::write(store.inner.piece_path(5), b"piece five")
            .await
            .unwrap();

        let (first_tx, mut first_rx) = mpsc::channel(1);
        let (second_tx, mut second_rx) = mpsc::channel(1);

        store.inner.pending_reads.lock().insert(5, vec![first_tx]);
        store.retrieve(5, second_tx).await;

        // The second retrieve joined the in-flight read instead of
        // launching its own; nothing has been delivered yet.
        assert_eq!(
            store.inner.pending_reads.lock().get(&5).map(Vec::len),
            Some(2)
        );
        assert!(second_rx.try_recv().is_err());

        store.inner.read_and_fan_out(5).await;

        let first = first_rx.recv().await.unwrap();
        let second = second_rx.recv().await.unwrap();
        assert_eq!(first.data.as_deref(), Some(b"piece five".as_slice()));
        assert_eq!(second.data.as_deref(), Some(b"piece five".as_slice()));
        assert!(store.inner.pending_reads.lock().is_empty());
    }
}
