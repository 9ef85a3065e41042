use std::path::PathBuf;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::mpsc;

use super::*;
use crate::metainfo::File;

fn file(path: &str, length: u64) -> File {
    File {
        path: PathBuf::from(path),
        length,
    }
}

#[tokio::test]
async fn store_writes_piece_file() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    let (results_tx, mut results_rx) = mpsc::channel(1);
    store.store(1, Bytes::from_static(b"test_data"), results_tx);

    let result = results_rx.recv().await.unwrap();
    assert_eq!(result.index, 1);
    assert!(result.error.is_none());

    let written = tokio::fs::read(temp.path().join("pieces/1.piece"))
        .await
        .unwrap();
    assert_eq!(written, b"test_data");
}

#[tokio::test]
async fn store_failure_reports_error_and_caches_data() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    // With the pieces directory gone, the write cannot succeed.
    tokio::fs::remove_dir_all(temp.path().join("pieces"))
        .await
        .unwrap();

    let (results_tx, mut results_rx) = mpsc::channel(1);
    store.store(2, Bytes::from_static(b"kept in memory"), results_tx);

    let result = results_rx.recv().await.unwrap();
    assert_eq!(result.index, 2);
    assert!(result.error.is_some());

    // The cached fallback still serves readers.
    let (sink_tx, mut sink_rx) = mpsc::channel(1);
    store.retrieve(2, sink_tx).await;
    let retrieved = sink_rx.recv().await.unwrap();
    assert_eq!(
        retrieved.data.as_deref(),
        Some(b"kept in memory".as_slice())
    );
    assert!(retrieved.error.is_none());
}

#[tokio::test]
async fn retrieve_reads_piece_from_disk() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    tokio::fs::write(temp.path().join("pieces/1.piece"), b"test_data")
        .await
        .unwrap();

    let (sink_tx, mut sink_rx) = mpsc::channel(1);
    store.retrieve(1, sink_tx).await;

    let result = sink_rx.recv().await.unwrap();
    assert_eq!(result.index, 1);
    assert!(result.error.is_none());
    assert_eq!(result.data.as_deref(), Some(b"test_data".as_slice()));
}

#[tokio::test]
async fn retrieve_missing_piece_reports_error() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    let (sink_tx, mut sink_rx) = mpsc::channel(1);
    store.retrieve(9, sink_tx).await;

    let result = sink_rx.recv().await.unwrap();
    assert_eq!(result.index, 9);
    assert!(result.data.is_none());
    assert!(result.error.is_some());
}

#[tokio::test]
async fn repeated_retrieve_is_served_from_cache() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    tokio::fs::write(temp.path().join("pieces/3.piece"), b"cached")
        .await
        .unwrap();

    let (sink_tx, mut sink_rx) = mpsc::channel(1);
    store.retrieve(3, sink_tx).await;
    assert!(sink_rx.recv().await.unwrap().data.is_some());

    // Remove the backing file; a cache hit must still answer.
    tokio::fs::remove_file(temp.path().join("pieces/3.piece"))
        .await
        .unwrap();

    let (sink_tx, mut sink_rx) = mpsc::channel(1);
    store.retrieve(3, sink_tx).await;
    let result = sink_rx.recv().await.unwrap();
    assert_eq!(result.data.as_deref(), Some(b"cached".as_slice()));
}

#[tokio::test]
async fn new_fails_for_missing_root() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");
    assert!(PieceStore::new(missing).is_err());
}

async fn write_pieces(temp: &TempDir, pieces: &[&[u8]]) {
    for (index, data) in pieces.iter().enumerate() {
        tokio::fs::write(
            temp.path().join(format!("pieces/{}.piece", index)),
            data,
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn compose_splits_piece_stream_across_files() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    let pieces: [&[u8]; 6] = [&[0; 10], &[1; 10], &[2; 10], &[3; 10], &[4; 10], &[5; 6]];
    write_pieces(&temp, &pieces).await;

    let files = [
        file("dir0/file0.txt", 7),
        file("dir0/file1.txt", 5),
        file("file2.txt", 28),
        file("file3.txt", 10),
        file("file4.txt", 1),
        file("dir1/file5.txt", 5),
    ];

    store.compose_files(&files).await.unwrap();

    let read = |path: &str| {
        let full = temp.path().join(path);
        async move { tokio::fs::read(full).await.unwrap() }
    };

    assert_eq!(read("dir0/file0.txt").await, [0; 7]);
    assert_eq!(read("dir0/file1.txt").await, [0, 0, 0, 1, 1]);

    let mut expected_file2 = Vec::new();
    expected_file2.extend_from_slice(&[1; 8]);
    expected_file2.extend_from_slice(&[2; 10]);
    expected_file2.extend_from_slice(&[3; 10]);
    assert_eq!(read("file2.txt").await, expected_file2);

    assert_eq!(read("file3.txt").await, [4; 10]);
    assert_eq!(read("file4.txt").await, [5; 1]);
    assert_eq!(read("dir1/file5.txt").await, [5; 5]);
}

#[tokio::test]
async fn compose_rejects_gap_in_piece_indexes() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    tokio::fs::write(temp.path().join("pieces/0.piece"), [0u8; 10])
        .await
        .unwrap();
    tokio::fs::write(temp.path().join("pieces/2.piece"), [2u8; 10])
        .await
        .unwrap();

    let result = store.compose_files(&[file("out.txt", 20)]).await;
    assert!(matches!(result, Err(StorageError::MissingPieces)));

    // Rejection happens before composition; nothing was cleaned up.
    assert!(temp.path().join("pieces/0.piece").exists());
}

#[tokio::test]
async fn compose_rejects_pieces_not_starting_at_zero() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    tokio::fs::write(temp.path().join("pieces/1.piece"), [1u8; 10])
        .await
        .unwrap();
    tokio::fs::write(temp.path().join("pieces/2.piece"), [2u8; 10])
        .await
        .unwrap();

    let result = store.compose_files(&[file("out.txt", 20)]).await;
    assert!(matches!(result, Err(StorageError::MissingPieces)));
}

#[tokio::test]
async fn compose_failure_cleans_destination_but_keeps_pieces() {
    let temp = TempDir::new().unwrap();
    let store = PieceStore::new(temp.path()).unwrap();

    let pieces: [&[u8]; 1] = [&[0; 10]];
    write_pieces(&temp, &pieces).await;
    tokio::fs::write(temp.path().join("stray.txt"), b"stray")
        .await
        .unwrap();

    // The file table demands more data than the pieces provide.
    let result = store
        .compose_files(&[file("dir/big.txt", 100)])
        .await;
    assert!(matches!(result, Err(StorageError::ComposeFailed(_))));

    assert!(!temp.path().join("stray.txt").exists());
    assert!(!temp.path().join("dir").exists());
    assert!(temp.path().join("pieces/0.piece").exists());
}
