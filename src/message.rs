//! 프로토콜 메시지 정의
//!
//! 모든 메시지는 `|`로 구분된 텍스트다.
//! - 디스커버리: UDP 데이터그램 하나에 메시지 하나
//! - 전송 스트림: `\n`으로 끝나는 헤더 라인 뒤에 파일 바이트가 구분자 없이 이어짐
//!
//! ```text
//! <rootName>|<FILE|DIR>\n
//! STATS_INFO|<totalFiles>|<totalBytes>\n
//! FILE_START|<relativePath>|<size>\n<size bytes>
//! ...
//! TRANSFER_END\n
//! ```

use std::net::{IpAddr, SocketAddr};

use crate::{Error, Result};

/// 디스커버리 요청 태그
pub const DISCOVERY_REQUEST: &str = "GO_FILE_TRANSFER_DISCOVERY_REQUEST";

/// 디스커버리 응답 키워드
pub const DISCOVERY_RESPONSE: &str = "GO_FILE_TRANSFER_DISCOVERY_RESPONSE";

/// 파일 헤더 마커
pub const FILE_HEADER_PREFIX: &str = "FILE_START";

/// 전송 종료 마커
pub const END_MARKER: &str = "TRANSFER_END";

/// 통계 헤더 마커
pub const STATS_MARKER: &str = "STATS_INFO";

const SEP: char = '|';

/// 라인 끝의 `\n`, `\r\n` 제거
fn strip_line_end(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn malformed(line: &str, reason: &'static str) -> Error {
    Error::MalformedHeader {
        line: strip_line_end(line).to_string(),
        reason,
    }
}

/// 디스커버리 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMessage {
    /// 요청자 IP와 응답 받을 포트를 담은 브로드캐스트 요청
    Request { ip: IpAddr, port: u16 },

    /// 응답 키워드
    Response,
}

impl DiscoveryMessage {
    pub fn request(ip: IpAddr, port: u16) -> Self {
        DiscoveryMessage::Request { ip, port }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            DiscoveryMessage::Request { ip, port } => {
                format!("{DISCOVERY_REQUEST}{SEP}{ip}{SEP}{port}").into_bytes()
            }
            DiscoveryMessage::Response => DISCOVERY_RESPONSE.as_bytes().to_vec(),
        }
    }

    /// 데이터그램 파싱
    ///
    /// 같은 서브넷의 다른 브로드캐스트 트래픽일 수 있으므로 형식이 맞지 않으면 `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?.trim();

        if text == DISCOVERY_RESPONSE {
            return Some(DiscoveryMessage::Response);
        }

        let parts: Vec<&str> = text.split(SEP).collect();
        if parts.len() != 3 || parts[0] != DISCOVERY_REQUEST {
            return None;
        }

        let ip = parts[1].parse().ok()?;
        let port = parts[2].parse().ok()?;
        Some(DiscoveryMessage::Request { ip, port })
    }

    /// 요청이면 응답을 보낼 주소
    pub fn reply_addr(&self) -> Option<SocketAddr> {
        match self {
            DiscoveryMessage::Request { ip, port } => Some(SocketAddr::new(*ip, *port)),
            DiscoveryMessage::Response => None,
        }
    }
}

/// 루트 항목 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "FILE",
            EntryKind::Dir => "DIR",
        }
    }
}

/// 루트 메타데이터 라인
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootMeta {
    pub name: String,
    pub kind: EntryKind,
}

impl RootMeta {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn encode(&self) -> Result<String> {
        ensure_single_line(&self.name)?;
        Ok(format!("{}{SEP}{}\n", self.name, self.kind.as_str()))
    }

    pub fn decode(line: &str) -> Result<Self> {
        let body = strip_line_end(line);
        let (name, flag) = body
            .rsplit_once(SEP)
            .ok_or_else(|| malformed(line, "루트 메타데이터 필드 수 불일치"))?;

        let kind = match flag {
            "FILE" => EntryKind::File,
            "DIR" => EntryKind::Dir,
            _ => return Err(malformed(line, "알 수 없는 루트 종류")),
        };

        if name.is_empty() {
            return Err(malformed(line, "빈 루트 이름"));
        }

        Ok(Self::new(name, kind))
    }
}

/// 통계 헤더 (루트 메타데이터 직후 한 번)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsHeader {
    pub total_files: u64,
    pub total_bytes: u64,
}

impl StatsHeader {
    pub fn new(total_files: u64, total_bytes: u64) -> Self {
        Self {
            total_files,
            total_bytes,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{STATS_MARKER}{SEP}{}{SEP}{}\n",
            self.total_files, self.total_bytes
        )
    }

    pub fn decode(line: &str) -> Result<Self> {
        let parts: Vec<&str> = strip_line_end(line).split(SEP).collect();
        if parts.len() != 3 {
            return Err(malformed(line, "통계 헤더 필드 수 불일치"));
        }
        if parts[0] != STATS_MARKER {
            return Err(malformed(line, "통계 마커 아님"));
        }

        let total_files = parts[1]
            .parse()
            .map_err(|_| malformed(line, "파일 수 파싱 실패"))?;
        let total_bytes = parts[2]
            .parse()
            .map_err(|_| malformed(line, "바이트 수 파싱 실패"))?;

        Ok(Self::new(total_files, total_bytes))
    }
}

/// 파일 헤더
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// `/` 구분 상대 경로
    pub path: String,

    /// 뒤따르는 바이트 수
    pub size: u64,
}

impl FileHeader {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    pub fn encode(&self) -> Result<String> {
        ensure_single_line(&self.path)?;
        Ok(format!(
            "{FILE_HEADER_PREFIX}{SEP}{}{SEP}{}\n",
            self.path, self.size
        ))
    }

    /// 경로에 `|`가 있어도 되도록 크기는 마지막 필드에서 읽는다
    pub fn decode(line: &str) -> Result<Self> {
        let body = strip_line_end(line);
        let rest = body
            .strip_prefix(FILE_HEADER_PREFIX)
            .and_then(|r| r.strip_prefix(SEP))
            .ok_or_else(|| Error::UnexpectedLine(body.to_string()))?;

        let (path, size) = rest
            .rsplit_once(SEP)
            .ok_or_else(|| malformed(line, "파일 헤더 필드 수 불일치"))?;

        if path.is_empty() {
            return Err(malformed(line, "빈 파일 경로"));
        }

        let size = size
            .parse()
            .map_err(|_| malformed(line, "파일 크기 파싱 실패"))?;

        Ok(Self::new(path, size))
    }
}

/// 루트/통계 헤더 이후 스트림에 올 수 있는 라인
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    File(FileHeader),
    End,
}

impl StreamLine {
    pub fn parse(line: &str) -> Result<Self> {
        let body = strip_line_end(line);
        if body == END_MARKER {
            return Ok(StreamLine::End);
        }
        FileHeader::decode(body).map(StreamLine::File)
    }
}

/// 종료 라인
pub fn end_marker() -> String {
    format!("{END_MARKER}\n")
}

fn ensure_single_line(value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(Error::UnsafePath(value.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_discovery_request_wire_format() {
        let msg = DiscoveryMessage::request(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)), 60003);
        assert_eq!(
            msg.to_bytes(),
            b"GO_FILE_TRANSFER_DISCOVERY_REQUEST|192.168.1.7|60003".to_vec()
        );
        assert_eq!(DiscoveryMessage::from_bytes(&msg.to_bytes()), Some(msg.clone()));
        assert_eq!(
            msg.reply_addr(),
            Some("192.168.1.7:60003".parse().unwrap())
        );
    }

    #[test]
    fn test_discovery_response_trimmed() {
        assert_eq!(
            DiscoveryMessage::from_bytes(b"  GO_FILE_TRANSFER_DISCOVERY_RESPONSE\n"),
            Some(DiscoveryMessage::Response)
        );
    }

    #[test]
    fn test_discovery_noise_ignored() {
        let noise: [&[u8]; 6] = [
            b"",
            b"hello",
            b"GO_FILE_TRANSFER_DISCOVERY_REQUEST|10.0.0.1",
            b"GO_FILE_TRANSFER_DISCOVERY_REQUEST|10.0.0.1|70000",
            b"GO_FILE_TRANSFER_DISCOVERY_REQUEST|not-an-ip|60003",
            &[0xff, 0xfe, 0x00],
        ];
        for datagram in noise {
            assert_eq!(DiscoveryMessage::from_bytes(datagram), None);
        }
    }

    #[test]
    fn test_root_meta() {
        let meta = RootMeta::new("photos", EntryKind::Dir);
        assert_eq!(meta.encode().unwrap(), "photos|DIR\n");
        assert_eq!(RootMeta::decode("photos|DIR\n").unwrap(), meta);
        assert_eq!(
            RootMeta::decode("a|b.txt|FILE\r\n").unwrap(),
            RootMeta::new("a|b.txt", EntryKind::File)
        );
        assert!(RootMeta::decode("photos\n").is_err());
        assert!(RootMeta::decode("photos|LINK\n").is_err());
    }

    #[test]
    fn test_stats_header() {
        let header = StatsHeader::new(3, 4096);
        assert_eq!(header.encode(), "STATS_INFO|3|4096\n");
        assert_eq!(StatsHeader::decode("STATS_INFO|3|4096\n").unwrap(), header);
        assert!(StatsHeader::decode("STATS_INFO|3\n").is_err());
        assert!(StatsHeader::decode("FILE_START|a|3\n").is_err());
        assert!(StatsHeader::decode("STATS_INFO|x|3\n").is_err());
    }

    #[test]
    fn test_file_header() {
        let header = FileHeader::new("photos/2024/a.jpg", 1234);
        assert_eq!(
            header.encode().unwrap(),
            "FILE_START|photos/2024/a.jpg|1234\n"
        );
        assert_eq!(
            FileHeader::decode("FILE_START|photos/2024/a.jpg|1234\n").unwrap(),
            header
        );
        assert_eq!(
            FileHeader::decode("FILE_START|a|b|0\n").unwrap(),
            FileHeader::new("a|b", 0)
        );
        assert!(FileHeader::decode("FILE_START|a.jpg\n").is_err());
        assert!(FileHeader::decode("FILE_START|a.jpg|-1\n").is_err());
        assert!(FileHeader::new("bad\nname", 1).encode().is_err());
    }

    #[test]
    fn test_stream_line() {
        assert_eq!(StreamLine::parse("TRANSFER_END\n").unwrap(), StreamLine::End);
        assert_eq!(
            StreamLine::parse("FILE_START|x|1\n").unwrap(),
            StreamLine::File(FileHeader::new("x", 1))
        );
        assert!(matches!(
            StreamLine::parse("garbage\n"),
            Err(Error::UnexpectedLine(_))
        ));
        assert!(matches!(
            StreamLine::parse("FILE_START|x\n"),
            Err(Error::MalformedHeader { .. })
        ));
        assert_eq!(end_marker(), "TRANSFER_END\n");
    }
}
