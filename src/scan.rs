//! 파일 트리 스캔
//!
//! 전송 전에 파일 수와 총 바이트를 알아야 양쪽에서 진행률을 계산할 수 있다.
//! 스캔 결과(`ScanPlan`)는 전송 순서(깊이 우선, 이름순) 그대로의 파일 목록이다.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, warn};

use crate::message::EntryKind;
use crate::{Error, Result};

/// 전송할 파일 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// 로컬 경로
    pub path: PathBuf,

    /// 기준 디렉토리로부터의 상대 경로 (`/` 구분)
    pub relative: String,

    /// 스캔 시점 크기
    pub size: u64,
}

/// 스캔 결과
#[derive(Debug, Clone)]
pub struct ScanPlan {
    /// 전송 루트
    pub root: PathBuf,

    /// 루트 이름 (수신측 최상위 이름)
    pub root_name: String,

    /// 루트 종류
    pub kind: EntryKind,

    /// 상대 경로 계산 기준 (루트의 부모)
    pub base_dir: PathBuf,

    /// 전송 순서대로의 파일 목록
    pub files: Vec<FileEntry>,

    /// 총 바이트
    pub total_bytes: u64,
}

impl ScanPlan {
    pub fn total_files(&self) -> u64 {
        self.files.len() as u64
    }
}

/// 메타데이터 조회 에러를 원본 경로 에러로 변환
fn stat_error(path: &Path, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound => Error::SourceNotFound {
            path: path.to_path_buf(),
            source: err,
        },
        io::ErrorKind::PermissionDenied => Error::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Error::Io(err),
    }
}

/// 경로 존재 확인
pub fn validate_source(path: &Path) -> Result<fs::Metadata> {
    fs::metadata(path).map_err(|e| stat_error(path, e))
}

/// 루트 경로를 스캔하여 전송 계획 생성
///
/// 단일 파일은 자기 크기의 파일 하나로 센다.
pub fn scan(path: &Path) -> Result<ScanPlan> {
    let metadata = validate_source(path)?;
    let root = path.canonicalize().map_err(|e| stat_error(path, e))?;

    let root_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::UnsafePath(root.display().to_string()))?;

    let base_dir = root
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.clone());

    let mut files = Vec::new();
    let kind = if metadata.is_dir() {
        walk(&root, &base_dir, &mut files)?;
        EntryKind::Dir
    } else {
        files.push(FileEntry {
            path: root.clone(),
            relative: root_name.clone(),
            size: metadata.len(),
        });
        EntryKind::File
    };

    let total_bytes = files.iter().map(|f| f.size).sum();

    debug!(
        "스캔 완료: {:?} ({} files, {} bytes)",
        root,
        files.len(),
        total_bytes
    );

    Ok(ScanPlan {
        root,
        root_name,
        kind,
        base_dir,
        files,
        total_bytes,
    })
}

/// 깊이 우선 탐색 (이름순)
fn walk(dir: &Path, base_dir: &Path, files: &mut Vec<FileEntry>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk(&path, base_dir, files)?;
            continue;
        }

        let metadata = if file_type.is_symlink() {
            // 디렉토리 심볼릭 링크는 순환 위험이 있어 따라가지 않음
            match fs::metadata(&path) {
                Ok(m) if m.is_file() => m,
                Ok(_) => {
                    warn!("심볼릭 링크 디렉토리 건너뜀: {:?}", path);
                    continue;
                }
                Err(e) => {
                    warn!("깨진 심볼릭 링크 건너뜀: {:?}: {}", path, e);
                    continue;
                }
            }
        } else if file_type.is_file() {
            entry.metadata()?
        } else {
            debug!("일반 파일 아님, 건너뜀: {:?}", path);
            continue;
        };

        files.push(FileEntry {
            relative: relative_slash_path(base_dir, &path)?,
            path,
            size: metadata.len(),
        });
    }

    Ok(())
}

/// `base`에 대한 `/` 구분 상대 경로
pub fn relative_slash_path(base: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(base)
        .map_err(|_| Error::UnsafePath(path.display().to_string()))?;

    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if parts.is_empty() {
        return Err(Error::UnsafePath(path.display().to_string()));
    }

    Ok(parts.join("/"))
}

/// 파일/폴더 정보 (선택 화면 표시용)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathInfo {
    pub name: String,
    pub path: PathBuf,
    pub is_directory: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub total_files: u64,
    pub total_bytes: u64,
    pub size_display: String,
}

/// 경로 정보 조회
pub fn path_info(path: &str) -> Result<PathInfo> {
    let clean = path.trim();
    if clean.is_empty() {
        return Err(Error::EmptyPath);
    }

    let path = Path::new(clean);
    let metadata = validate_source(path)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| clean.to_string());

    let (total_files, total_bytes, size_display) = if metadata.is_dir() {
        match scan(path) {
            Ok(plan) => (
                plan.total_files(),
                plan.total_bytes,
                format!(
                    "folder ({} files, {})",
                    plan.total_files(),
                    format_file_size(plan.total_bytes)
                ),
            ),
            Err(e) => {
                warn!("폴더 스캔 실패: {:?}: {}", path, e);
                (0, 0, "folder".to_string())
            }
        }
    } else {
        (1, metadata.len(), format_file_size(metadata.len()))
    };

    Ok(PathInfo {
        name,
        path: path.to_path_buf(),
        is_directory: metadata.is_dir(),
        size: metadata.len(),
        modified: metadata.modified().ok(),
        total_files,
        total_bytes,
        size_display,
    })
}

/// 파일 크기 표시 (1024 단위)
pub fn format_file_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![7u8; len]).unwrap();
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_scan_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        write(&file, 100);

        let plan = scan(&file).unwrap();
        assert_eq!(plan.kind, EntryKind::File);
        assert_eq!(plan.root_name, "data.bin");
        assert_eq!(plan.total_files(), 1);
        assert_eq!(plan.total_bytes, 100);
        assert_eq!(plan.files[0].relative, "data.bin");
    }

    #[test]
    fn test_scan_directory_depth_first() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("photos");
        write(&root.join("b.jpg"), 10);
        write(&root.join("a/z.jpg"), 20);
        write(&root.join("a/deep/y.jpg"), 30);
        write(&root.join("c.txt"), 0);

        let plan = scan(&root).unwrap();
        let rels: Vec<&str> = plan.files.iter().map(|f| f.relative.as_str()).collect();

        assert_eq!(plan.kind, EntryKind::Dir);
        assert_eq!(plan.root_name, "photos");
        assert_eq!(
            rels,
            vec!["photos/a/deep/y.jpg", "photos/a/z.jpg", "photos/b.jpg", "photos/c.txt"]
        );
        assert_eq!(plan.total_files(), 4);
        assert_eq!(plan.total_bytes, 60);
    }

    #[test]
    fn test_scan_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[test]
    fn test_path_info() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("docs");
        write(&root.join("a.txt"), 1024);
        write(&root.join("sub/b.txt"), 512);

        let info = path_info(&format!("  {}  ", root.display())).unwrap();
        assert_eq!(info.name, "docs");
        assert!(info.is_directory);
        assert_eq!(info.total_files, 2);
        assert_eq!(info.total_bytes, 1536);
        assert_eq!(info.size_display, "folder (2 files, 1.5 KB)");

        let file_info = path_info(root.join("a.txt").to_str().unwrap()).unwrap();
        assert!(!file_info.is_directory);
        assert_eq!(file_info.size_display, "1.0 KB");

        assert!(matches!(path_info("   "), Err(Error::EmptyPath)));
        assert!(matches!(
            path_info(root.join("missing").to_str().unwrap()),
            Err(Error::SourceNotFound { .. })
        ));
    }
}
