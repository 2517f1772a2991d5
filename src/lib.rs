//! # lanxfer
//!
//! 설정 없이 같은 LAN 안에서 파일/폴더를 주고받는 전송 도구
//!
//! ## 핵심 특징
//! - **UDP 브로드캐스트 디스커버리**: IP를 몰라도 수신자를 찾음
//! - **단일 TCP 스트림**: 라인 헤더 + 원본 바이트, 재전송/청크 조립 없음
//! - **사전 스캔**: 양쪽 모두 시작부터 정확한 진행률 계산
//! - **속도/ETA 추정**: 최근 샘플 가중 평균, 최소 200ms 간격 갱신
//! - **세션 독점**: 프로세스당 송신 또는 수신 하나만 실행
//!
//! ## 사용 예
//!
//! ```no_run
//! use lanxfer::{Config, TransferEngine};
//!
//! # async fn run() -> lanxfer::Result<()> {
//! let (engine, mut events) = TransferEngine::new(Config::default());
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//! });
//! engine.send("photos").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod message;
pub mod receiver;
pub mod scan;
pub mod sender;
pub mod session;
pub mod stats;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use events::{EventReceiver, EventSink, TransferEvent};
pub use message::EntryKind;
pub use receiver::Receiver;
pub use scan::{format_file_size, path_info, PathInfo};
pub use sender::Sender;
pub use session::{Role, TransferEngine};
pub use stats::{StatsEstimator, TransferStats, TransferStatus};

/// 기본 TCP 전송 포트
pub const DEFAULT_TRANSFER_PORT: u16 = 60001;

/// 기본 디스커버리 요청 포트 (수신자 측 UDP)
pub const DEFAULT_DISCOVERY_PORT: u16 = 60002;

/// 기본 디스커버리 응답 포트 (송신자 측 UDP)
pub const DEFAULT_RESPONSE_PORT: u16 = 60003;

/// 기본 스트리밍 버퍼 크기 (바이트)
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// 기본 타임아웃 (밀리초)
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
