#![allow(dead_code)]

use std::net::{TcpListener, UdpSocket};
use std::path::Path;
use std::time::Duration;

use lanxfer::{Config, EventReceiver, TransferEvent};
use tokio::task::JoinHandle;

/// OS가 고른 빈 TCP 포트
pub fn free_tcp_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("bind ephemeral tcp port")
}

/// OS가 고른 빈 UDP 포트
pub fn free_udp_port() -> u16 {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| s.local_addr())
        .map(|a| a.port())
        .expect("bind ephemeral udp port")
}

/// 같은 호스트 안에서 송수신하는 설정 한 쌍 (송신, 수신)
pub fn loopback_pair(output_dir: &Path, timeout: Duration) -> (Config, Config) {
    let base = Config {
        transfer_port: free_tcp_port(),
        discovery_port: free_udp_port(),
        response_port: 0,
        broadcast_attempts: 5,
        broadcast_interval_ms: 50,
        buffer_size: 64 * 1024,
        event_capacity: 4096,
        ..Config::loopback().with_timeout(timeout)
    };

    let receiver = Config {
        output_dir: output_dir.to_path_buf(),
        ..base.clone()
    };

    (base, receiver)
}

/// 완료 알림까지 모든 알림 수집
pub fn collect_events(mut rx: EventReceiver) -> JoinHandle<Vec<TransferEvent>> {
    tokio::spawn(async move {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event, TransferEvent::OperationCompleted { .. });
            events.push(event);
            if done {
                break;
            }
        }
        events
    })
}

/// 재현 가능한 테스트 데이터
pub fn test_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64 * 31 + seed as u64) % 251) as u8)
        .collect()
}

pub fn status_messages(events: &[TransferEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Status(message) => Some(message.as_str()),
            _ => None,
        })
        .collect()
}
