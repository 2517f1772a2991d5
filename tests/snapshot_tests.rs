use std::fs;

use lanxfer::{path_info, Error, TransferEngine, TransferStats, TransferStatus, Config};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn stats_snapshot_uses_camel_case_keys() {
    let stats = TransferStats {
        total_files: 3,
        completed_files: 1,
        total_bytes: 2048,
        transferred_bytes: 1024,
        current_speed: 1.5,
        estimated_time: "<1s".into(),
        current_file: "album/a.txt".into(),
        progress: 50.0,
        status: TransferStatus::Transferring,
    };

    let value = serde_json::to_value(&stats).unwrap();
    assert_eq!(
        value,
        json!({
            "totalFiles": 3,
            "completedFiles": 1,
            "totalBytes": 2048,
            "transferredBytes": 1024,
            "currentSpeed": 1.5,
            "estimatedTime": "<1s",
            "currentFile": "album/a.txt",
            "progress": 50.0,
            "status": "transferring"
        })
    );

    let back: TransferStats = serde_json::from_value(value).unwrap();
    assert_eq!(back, stats);
}

#[test]
fn path_info_describes_folder() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("docs");
    fs::create_dir_all(root.join("inner")).unwrap();
    fs::write(root.join("a.txt"), vec![0u8; 1024]).unwrap();
    fs::write(root.join("inner").join("b.txt"), vec![0u8; 512]).unwrap();

    let info = path_info(&root.to_string_lossy()).unwrap();
    assert_eq!(info.name, "docs");
    assert!(info.is_directory);
    assert_eq!(info.total_files, 2);
    assert_eq!(info.total_bytes, 1536);
    assert_eq!(info.size_display, "folder (2 files, 1.5 KB)");

    let value = serde_json::to_value(&info).unwrap();
    assert_eq!(value["isDirectory"], json!(true));
    assert_eq!(value["sizeDisplay"], json!("folder (2 files, 1.5 KB)"));
}

#[test]
fn path_info_rejects_blank_and_missing() {
    assert!(matches!(path_info("   "), Err(Error::EmptyPath)));
    assert!(matches!(
        path_info("/no/such/lanxfer/path"),
        Err(Error::SourceNotFound { .. })
    ));
}

#[tokio::test]
async fn fresh_engine_is_idle() {
    let (engine, _rx) = TransferEngine::new(Config::default());
    assert!(!engine.is_running());
    assert_eq!(engine.stats(), TransferStats::default());
    assert_eq!(engine.stats().status, TransferStatus::Ready);
}
