//! UDP 브로드캐스트 디스커버리
//!
//! - 요청자(송신측): 응답 포트를 열고 요청을 N번 브로드캐스트한 뒤 응답 하나를 기다림
//! - 응답자(수신측): 디스커버리 포트에서 요청을 받아 요청자에게 응답 키워드를 유니캐스트
//!
//! 최선 노력 방식이며 처음 도착한 유효 응답이 이긴다.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::DiscoveryMessage;
use crate::{Config, Error, Result};

/// 디스커버리 데이터그램 최대 크기
const DATAGRAM_BUF_SIZE: usize = 1024;

/// 로컬 IP 확인용 외부 주소 (실제로 패킷은 보내지 않음)
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// 로컬 IP 확인
///
/// 설정에 고정된 값이 있으면 그대로 사용하고, 없으면 기본 경로의 출발 주소를 쓴다.
pub async fn local_ip(config: &Config) -> Result<IpAddr> {
    if let Some(ip) = config.local_ip {
        return Ok(ip);
    }

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|e| Error::LocalIpUnavailable(e.to_string()))?;
    socket
        .connect(ROUTE_PROBE_ADDR)
        .await
        .map_err(|e| Error::LocalIpUnavailable(e.to_string()))?;

    let ip = socket
        .local_addr()
        .map_err(|e| Error::LocalIpUnavailable(e.to_string()))?
        .ip();

    if ip.is_unspecified() || ip.is_loopback() {
        return Err(Error::LocalIpUnavailable(format!("사용할 수 없는 주소: {}", ip)));
    }

    Ok(ip)
}

/// 수신자 찾기
///
/// 응답 데이터그램의 출발지 IP를 돌려준다. 타임아웃이나 잘못된 응답은 재시도하지 않는다.
pub async fn find_peer(config: &Config) -> Result<IpAddr> {
    let ip = local_ip(config).await?;

    let socket = UdpSocket::bind(SocketAddr::new(ip, config.response_port)).await?;
    socket.set_broadcast(true)?;

    let response_port = socket.local_addr()?.port();
    let deadline = Instant::now() + config.timeout();

    let request = DiscoveryMessage::request(ip, response_port).to_bytes();
    let target = SocketAddr::new(IpAddr::V4(config.broadcast_addr), config.discovery_port);

    info!(
        "디스커버리 시작: {} -> {} (응답 포트 {})",
        ip, target, response_port
    );

    // UDP 브로드캐스트 손실 대비 여러 번 전송
    for attempt in 1..=config.broadcast_attempts {
        if let Err(e) = socket.send_to(&request, target).await {
            warn!("디스커버리 요청 전송 실패 ({}회): {}", attempt, e);
        }
        if attempt < config.broadcast_attempts {
            time::sleep(config.broadcast_interval()).await;
        }
    }

    let mut buf = [0u8; DATAGRAM_BUF_SIZE];
    let (len, from) = match time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
        Ok(Ok(received)) => received,
        Ok(Err(e)) => return Err(Error::PeerNotFound(e.to_string())),
        Err(_) => return Err(Error::PeerNotFound("응답 없음 (타임아웃)".into())),
    };

    match DiscoveryMessage::from_bytes(&buf[..len]) {
        Some(DiscoveryMessage::Response) => {
            info!("수신자 발견: {}", from.ip());
            Ok(from.ip())
        }
        _ => Err(Error::InvalidDiscoveryResponse(
            String::from_utf8_lossy(&buf[..len]).into_owned(),
        )),
    }
}

/// 디스커버리 응답자
pub struct DiscoveryResponder {
    socket: UdpSocket,
}

impl DiscoveryResponder {
    /// 디스커버리 포트 바인딩
    ///
    /// 브로드캐스트를 받으려면 특정 IP가 아닌 와일드카드 주소에 바인딩해야 한다.
    pub async fn bind(config: &Config) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.discovery_port)).await?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 취소될 때까지 요청에 응답
    ///
    /// 응답한 요청 수를 돌려준다. 형식이 맞지 않는 데이터그램은 조용히 무시한다.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut buf = [0u8; DATAGRAM_BUF_SIZE];
        let mut answered = 0u64;

        debug!("디스커버리 응답자 시작: {:?}", self.socket.local_addr());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => {
                            if self.handle_datagram(&buf[..len], from).await {
                                answered += 1;
                            }
                        }
                        Err(e) => {
                            // Windows에서는 ICMP unreachable이 recv 에러로 올라옴
                            debug!("디스커버리 수신 에러: {}", e);
                        }
                    }
                }
            }
        }

        debug!("디스커버리 응답자 종료: {}건 응답", answered);
        answered
    }

    /// 백그라운드 태스크로 실행
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(cancel))
    }

    async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> bool {
        let reply_addr = match DiscoveryMessage::from_bytes(data).and_then(|m| m.reply_addr()) {
            Some(addr) => addr,
            None => {
                debug!("디스커버리 잡음 무시: {} ({} bytes)", from, data.len());
                return false;
            }
        };

        let response = DiscoveryMessage::Response.to_bytes();
        match self.socket.send_to(&response, reply_addr).await {
            Ok(_) => {
                info!("디스커버리 요청 응답: {} -> {}", from, reply_addr);
                true
            }
            Err(e) => {
                warn!("디스커버리 응답 전송 실패 {}: {}", reply_addr, e);
                false
            }
        }
    }
}
