//! 전송 설정

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    DEFAULT_BUFFER_SIZE, DEFAULT_DISCOVERY_PORT, DEFAULT_RESPONSE_PORT, DEFAULT_TIMEOUT_MS,
    DEFAULT_TRANSFER_PORT,
};

/// lanxfer 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP 전송 포트
    pub transfer_port: u16,

    /// 디스커버리 요청 수신 포트 (수신자 측 UDP)
    pub discovery_port: u16,

    /// 디스커버리 응답 수신 포트 (송신자 측 UDP)
    /// 0이면 OS가 할당한 포트를 요청에 실어 보냄
    pub response_port: u16,

    /// 디스커버리 요청을 보낼 브로드캐스트 주소
    pub broadcast_addr: Ipv4Addr,

    /// 로컬 IP 고정 (None이면 자동 확인)
    pub local_ip: Option<IpAddr>,

    /// 파일 스트리밍 버퍼 크기 (바이트)
    pub buffer_size: usize,

    /// 기본 타임아웃 (밀리초)
    /// 디스커버리 대기, TCP 연결, 메타데이터 읽기에 사용
    pub timeout_ms: u64,

    /// 청크 단위 읽기/쓰기 타임아웃 (밀리초)
    pub io_timeout_ms: u64,

    /// 수신자 accept 대기 타임아웃 (밀리초)
    pub accept_timeout_ms: u64,

    /// 디스커버리 브로드캐스트 횟수
    pub broadcast_attempts: u32,

    /// 브로드캐스트 간격 (밀리초)
    pub broadcast_interval_ms: u64,

    /// 통계 갱신 최소 간격 (밀리초)
    pub stats_interval_ms: u64,

    /// 속도 샘플 윈도우 크기
    pub speed_window: usize,

    /// 수신 파일 저장 디렉토리
    pub output_dir: PathBuf,

    /// 이벤트 채널 용량
    pub event_capacity: usize,

    /// 헤더 라인 최대 길이 (바이트)
    pub max_header_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transfer_port: DEFAULT_TRANSFER_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            response_port: DEFAULT_RESPONSE_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            local_ip: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            io_timeout_ms: 30_000,                // 30초
            accept_timeout_ms: DEFAULT_TIMEOUT_MS * 5, // 5분
            broadcast_attempts: 3,
            broadcast_interval_ms: 1000,
            stats_interval_ms: 200,
            speed_window: 10,
            output_dir: PathBuf::from("."),
            event_capacity: 64,
            max_header_len: 64 * 1024,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 같은 호스트 안에서 송수신할 때의 설정
    ///
    /// 브로드캐스트 대신 127.0.0.1로 디스커버리 요청을 보낸다.
    pub fn loopback() -> Self {
        Self {
            local_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            broadcast_addr: Ipv4Addr::LOCALHOST,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// 기본 타임아웃을 바꾸고 accept 타임아웃도 5배로 맞춘다
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self.accept_timeout_ms = self.timeout_ms * 5;
        self
    }
}
