//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// lanxfer 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("원본 경로 없음: {path}: {source}")]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("접근 권한 없음: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("빈 경로")]
    EmptyPath,

    #[error("로컬 IP 확인 실패: {0}")]
    LocalIpUnavailable(String),

    #[error("수신자를 찾지 못함: {0}")]
    PeerNotFound(String),

    #[error("유효하지 않은 디스커버리 응답: {0:?}")]
    InvalidDiscoveryResponse(String),

    #[error("타임아웃: {op}")]
    Timeout { op: &'static str },

    #[error("헤더 형식 오류: {reason}: {line:?}")]
    MalformedHeader { line: String, reason: &'static str },

    #[error("예상하지 못한 라인: {0:?}")]
    UnexpectedLine(String),

    #[error("헤더 라인이 너무 김: 최대 {max_len} 바이트")]
    HeaderTooLong { max_len: usize },

    #[error("안전하지 않은 경로: {0:?}")]
    UnsafePath(String),

    #[error("파일 수신 중단: {path}, {received}/{expected} 바이트")]
    TruncatedFile {
        path: String,
        received: u64,
        expected: u64,
    },

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("이미 다른 전송이 진행 중")]
    Busy,
}

/// 에러 분류 (상태 메시지 및 로그용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 네트워크 활동 이전의 준비 단계 실패
    Setup,
    /// 디스커버리 실패
    Discovery,
    /// 스트림 형식 위반
    Protocol,
    /// 전송 중 IO 실패
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceNotFound { .. }
            | Error::PermissionDenied { .. }
            | Error::EmptyPath
            | Error::LocalIpUnavailable(_)
            | Error::Busy => ErrorKind::Setup,
            Error::PeerNotFound(_) | Error::InvalidDiscoveryResponse(_) => ErrorKind::Discovery,
            Error::MalformedHeader { .. }
            | Error::UnexpectedLine(_)
            | Error::HeaderTooLong { .. }
            | Error::UnsafePath(_) => ErrorKind::Protocol,
            Error::Io(_)
            | Error::Timeout { .. }
            | Error::TruncatedFile { .. }
            | Error::ConnectionClosed => ErrorKind::Io,
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
