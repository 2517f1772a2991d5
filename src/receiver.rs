//! 수신자
//!
//! - 백그라운드 디스커버리 응답자 + TCP 리스너
//! - 연결 하나만 받아서 헤더/파일 바이트를 순서대로 복원
//! - 쓰기 실패 등으로 중단된 파일은 삭제

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::{self, File};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{self, DiscoveryResponder};
use crate::message::{EntryKind, FileHeader, RootMeta, StatsHeader, StreamLine};
use crate::session::Session;
use crate::stats::{progress_percent, TransferStatus, PLACEHOLDER_PROGRESS};
use crate::{Config, Error, Result};

/// 헤더 라인 하나 읽기
///
/// 페이로드 바이트를 넘겨 읽지 않도록 `\n`까지만 소비한다.
/// 스트림이 끝났으면 `None`.
pub async fn read_header_line<R>(
    reader: &mut R,
    max_len: usize,
    limit: Duration,
) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = time::timeout(
        limit,
        (&mut *reader)
            .take(max_len as u64 + 1)
            .read_until(b'\n', &mut buf),
    )
    .await
    .map_err(|_| Error::Timeout { op: "read header" })??;

    if n == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() > max_len {
            return Err(Error::HeaderTooLong { max_len });
        }
        return Err(Error::ConnectionClosed);
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| Error::MalformedHeader {
            line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            reason: "UTF-8 아님",
        })
}

/// 경로 조각 하나가 일반 이름인지 확인
fn is_plain_component(part: &str) -> bool {
    if part.is_empty() || part.contains('\0') {
        return false;
    }
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// `/` 구분 상대 경로를 OS 경로로 변환
///
/// 절대 경로, `..`, 빈 조각은 거부한다.
pub fn safe_relative_path(rel: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();
    for part in rel.split('/') {
        if !is_plain_component(part) {
            return Err(Error::UnsafePath(rel.to_string()));
        }
        path.push(part);
    }
    if path.as_os_str().is_empty() {
        return Err(Error::UnsafePath(rel.to_string()));
    }
    Ok(path)
}

/// 수신자
pub struct Receiver {
    config: Arc<Config>,
}

impl Receiver {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// 연결 하나를 받아 전체 트리를 수신
    ///
    /// 저장된 루트 경로를 돌려준다.
    pub async fn receive(&self, session: &mut Session) -> Result<PathBuf> {
        let ip = discovery::local_ip(&self.config).await?;

        session.progress.modify(|s| s.status = TransferStatus::Waiting);
        session.progress.status("waiting for connection...");

        // 응답을 받은 송신자가 바로 연결할 수 있도록 리스너 먼저
        let listener = TcpListener::bind((ip, self.config.transfer_port)).await?;
        info!("수신 대기: {}", listener.local_addr()?);

        let responder = DiscoveryResponder::bind(&self.config).await?;
        let cancel = CancellationToken::new();
        let responder_task = responder.spawn(cancel.clone());
        // 어떤 경로로 나가든 응답자를 멈춤
        let stop_responder = cancel.drop_guard();

        let accepted = time::timeout(self.config.accept_timeout(), listener.accept()).await;

        // 연결이 맺어지면 디스커버리는 더 필요 없음
        drop(stop_responder);
        match responder_task.await {
            Ok(answered) => debug!("디스커버리 응답 {}건", answered),
            Err(e) => warn!("디스커버리 응답자 종료 에러: {}", e),
        }

        let (stream, peer) = accepted.map_err(|_| Error::Timeout { op: "accept" })??;
        drop(listener);

        info!("송신자 연결: {}", peer);
        session
            .progress
            .status(format!("connected to sender {}, receiving...", peer));

        let mut reader = BufReader::new(stream);
        self.receive_stream(&mut reader, session).await
    }

    /// 스트림 디코딩 및 파일 복원
    pub async fn receive_stream<R>(&self, reader: &mut R, session: &mut Session) -> Result<PathBuf>
    where
        R: AsyncBufRead + Unpin,
    {
        let max_len = self.config.max_header_len;
        let timeout = self.config.timeout();
        let output_dir = self.config.output_dir.clone();

        let meta_line = read_header_line(reader, max_len, timeout)
            .await?
            .ok_or(Error::ConnectionClosed)?;
        let meta = RootMeta::decode(&meta_line)?;
        if !is_plain_component(&meta.name) {
            return Err(Error::UnsafePath(meta.name));
        }

        let root_path = output_dir.join(&meta.name);
        if meta.kind == EntryKind::Dir {
            fs::create_dir_all(&root_path).await?;
        }
        session.root = Some(root_path.clone());
        session.base_dir = Some(output_dir.clone());

        let stats_line = read_header_line(reader, max_len, timeout)
            .await?
            .ok_or(Error::ConnectionClosed)?;
        let mut pending = None;
        let (total_files, total_bytes) = match StatsHeader::decode(&stats_line) {
            Ok(header) => (header.total_files, header.total_bytes),
            Err(e) => {
                // 통계 헤더가 없는 송신자: 0으로 나누지 않도록 최소값 사용
                warn!("통계 헤더 없음, 기본값 사용: {}", e);
                pending = Some(stats_line);
                (1, 1)
            }
        };

        session.progress.modify(|s| {
            s.total_files = total_files;
            s.total_bytes = total_bytes;
            s.progress = PLACEHOLDER_PROGRESS;
            s.status = TransferStatus::Transferring;
        });

        info!(
            "수신 시작: {} ({:?}), {} files, {} bytes",
            meta.name, meta.kind, total_files, total_bytes
        );

        let start = Instant::now();
        let mut received = 0u64;
        let mut completed = 0u64;
        let mut buf = vec![0u8; self.config.buffer_size.max(1)];

        loop {
            let next = match pending.take() {
                Some(line) => Some(line),
                None => read_header_line(reader, max_len, timeout).await?,
            };
            let line = match next {
                Some(line) => line,
                None => {
                    debug!("종료 마커 없이 스트림 종료");
                    break;
                }
            };

            let header = match StreamLine::parse(&line)? {
                StreamLine::End => break,
                StreamLine::File(header) => header,
            };

            let target = self.target_path(&meta, &header.path)?;
            self.receive_file(reader, session, &header, &target, &mut buf, &mut received, start)
                .await?;

            completed += 1;
            // 파일마다 한 번은 알림
            session.progress.modify(|s| {
                s.completed_files = completed;
                s.transferred_bytes = received;
                // 송신자가 알린 총계는 참고값: 실제가 더 크면 늘림
                s.total_files = s.total_files.max(completed);
                s.total_bytes = s.total_bytes.max(received);
                s.progress = progress_percent(received, s.total_bytes);
            });
        }

        session.progress.modify(|s| {
            s.status = TransferStatus::Completed;
            s.progress = 100.0;
            s.completed_files = completed;
            s.transferred_bytes = received;
            s.total_files = completed;
            s.total_bytes = received;
        });
        session.progress.status("receive complete");

        info!(
            "수신 완료: {:?}, {} files, {} bytes",
            root_path, completed, received
        );

        Ok(root_path)
    }

    /// 헤더 경로를 저장 경로로 변환
    fn target_path(&self, meta: &RootMeta, rel: &str) -> Result<PathBuf> {
        let rel_path = safe_relative_path(rel)?;

        let inside_root = match meta.kind {
            EntryKind::Dir => rel.split('/').next() == Some(meta.name.as_str()),
            EntryKind::File => rel == meta.name,
        };
        if !inside_root {
            return Err(Error::UnsafePath(rel.to_string()));
        }

        Ok(self.config.output_dir.join(rel_path))
    }

    /// 파일 하나 수신. 실패하면 만들던 파일을 지운다.
    #[allow(clippy::too_many_arguments)]
    async fn receive_file<R>(
        &self,
        reader: &mut R,
        session: &mut Session,
        header: &FileHeader,
        target: &Path,
        buf: &mut [u8],
        received: &mut u64,
        start: Instant,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        session.progress.update(&header.path, header.size, *received, start);

        let mut file = File::create(target).await?;
        let result = self
            .copy_payload(reader, &mut file, session, header, buf, received, start)
            .await;
        drop(file);

        if let Err(e) = result {
            if let Err(remove_err) = fs::remove_file(target).await {
                warn!("불완전 파일 삭제 실패 {:?}: {}", target, remove_err);
            }
            return Err(e);
        }

        debug!("파일 수신 완료: {} ({} bytes)", header.path, header.size);
        Ok(())
    }

    /// 정확히 `header.size` 바이트를 청크 단위로 읽어 디스크에 기록
    #[allow(clippy::too_many_arguments)]
    async fn copy_payload<R>(
        &self,
        reader: &mut R,
        file: &mut File,
        session: &mut Session,
        header: &FileHeader,
        buf: &mut [u8],
        received: &mut u64,
        start: Instant,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let limit = self.config.io_timeout();
        let mut remaining = header.size;

        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = time::timeout(limit, reader.read(&mut buf[..want]))
                .await
                .map_err(|_| Error::Timeout { op: "read payload" })??;

            if n == 0 {
                return Err(Error::TruncatedFile {
                    path: header.path.clone(),
                    received: header.size - remaining,
                    expected: header.size,
                });
            }

            file.write_all(&buf[..n]).await?;

            remaining -= n as u64;
            *received += n as u64;
            session.progress.update(&header.path, header.size, *received, start);
        }

        // tokio File은 쓰기를 백그라운드로 넘기므로 에러는 flush에서 드러날 수 있음
        file.flush().await?;
        Ok(())
    }
}
