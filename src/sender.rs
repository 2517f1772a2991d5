//! 송신자
//!
//! - 디스커버리로 수신자 찾기
//! - 사전 스캔으로 총 파일 수/바이트 확보
//! - TCP 연결 하나로 헤더 + 파일 바이트를 순서대로 스트리밍

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, info};

use crate::discovery;
use crate::message::{end_marker, FileHeader, RootMeta, StatsHeader};
use crate::scan::{self, FileEntry, ScanPlan};
use crate::session::Session;
use crate::stats::{progress_percent, TransferStatus};
use crate::{Config, Error, Result};

/// 쓰기 하나에 타임아웃 적용
///
/// 죽은 상대에서 멈추는 시간만 제한하고, 큰 전송 전체에는 제한을 두지 않는다.
async fn write_timed<W>(writer: &mut W, bytes: &[u8], limit: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    time::timeout(limit, writer.write_all(bytes))
        .await
        .map_err(|_| Error::Timeout { op: "write" })??;
    Ok(())
}

/// 송신자
pub struct Sender {
    config: Arc<Config>,
}

impl Sender {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// 파일 또는 폴더 전송
    ///
    /// 중간에 실패하면 이미 보낸 스트림은 정리하지 않는다 (수신측이 버림).
    pub async fn send(&self, session: &mut Session, source: &Path) -> Result<()> {
        session.progress.status("scanning files...");
        scan::validate_source(source)?;

        let peer = discovery::find_peer(&self.config).await?;
        session.progress.status(format!("found receiver: {}", peer));

        session.progress.modify(|s| s.status = TransferStatus::Scanning);
        let plan = self.scan(source).await?;

        session.root = Some(plan.root.clone());
        session.base_dir = Some(plan.base_dir.clone());
        session.progress.modify(|s| {
            s.total_files = plan.total_files();
            s.total_bytes = plan.total_bytes;
            s.status = TransferStatus::Transferring;
        });

        let addr = SocketAddr::new(peer, self.config.transfer_port);
        let mut stream = time::timeout(self.config.timeout(), TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Timeout { op: "connect" })??;

        info!(
            "전송 시작: {:?} -> {} ({} files, {} bytes)",
            plan.root,
            addr,
            plan.total_files(),
            plan.total_bytes
        );
        session.progress.status("transferring files...");

        self.stream_plan(&mut stream, session, &plan).await?;
        stream.shutdown().await?;

        session.progress.modify(|s| s.mark_completed());
        session.progress.status("transfer complete");

        info!(
            "전송 완료: {} files, {} bytes, {:.2}s",
            plan.total_files(),
            plan.total_bytes,
            session.elapsed().as_secs_f64()
        );

        Ok(())
    }

    async fn scan(&self, source: &Path) -> Result<ScanPlan> {
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || scan::scan(&source))
            .await
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?
    }

    /// 루트 메타데이터, 통계 헤더, 파일들, 종료 마커 순서로 기록
    pub async fn stream_plan<W>(
        &self,
        writer: &mut W,
        session: &mut Session,
        plan: &ScanPlan,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let limit = self.config.io_timeout();

        let meta = RootMeta::new(plan.root_name.clone(), plan.kind).encode()?;
        write_timed(writer, meta.as_bytes(), limit).await?;

        let stats = StatsHeader::new(plan.total_files(), plan.total_bytes).encode();
        write_timed(writer, stats.as_bytes(), limit).await?;

        let start = Instant::now();
        let mut transferred = 0u64;
        let mut buf = vec![0u8; self.config.buffer_size.max(1)];

        for entry in &plan.files {
            let mut file = File::open(&entry.path).await?;
            let size = file.metadata().await?.len();

            self.send_file(writer, session, entry, &mut file, size, &mut buf, &mut transferred, start)
                .await?;

            session.progress.modify(|s| {
                s.completed_files += 1;
                s.transferred_bytes = transferred;
                s.progress = progress_percent(transferred, s.total_bytes);
            });
        }

        write_timed(writer, end_marker().as_bytes(), limit).await?;
        writer.flush().await?;
        Ok(())
    }

    /// 파일 하나: 헤더 후 정확히 `size` 바이트
    #[allow(clippy::too_many_arguments)]
    async fn send_file<W, R>(
        &self,
        writer: &mut W,
        session: &mut Session,
        entry: &FileEntry,
        file: &mut R,
        size: u64,
        buf: &mut [u8],
        transferred: &mut u64,
        start: Instant,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        R: AsyncRead + Unpin,
    {
        let limit = self.config.io_timeout();

        session.progress.update(&entry.relative, size, *transferred, start);

        let header = FileHeader::new(entry.relative.clone(), size).encode()?;
        write_timed(writer, header.as_bytes(), limit).await?;

        let mut remaining = size;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                // 헤더에 적은 크기보다 파일이 줄어듦
                return Err(Error::TruncatedFile {
                    path: entry.relative.clone(),
                    received: size - remaining,
                    expected: size,
                });
            }

            write_timed(writer, &buf[..n], limit).await?;

            remaining -= n as u64;
            *transferred += n as u64;
            session.progress.update(&entry.relative, size, *transferred, start);
        }

        debug!("파일 전송 완료: {} ({} bytes)", entry.relative, size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TransferEvent;
    use crate::session::{test_session, Role};

    fn sender() -> Sender {
        let config = Config {
            buffer_size: 3,
            ..Config::loopback()
        };
        Sender::new(Arc::new(config))
    }

    #[tokio::test]
    async fn test_stream_plan_dir_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("docs");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("b.txt"), b"bye").unwrap();
        std::fs::write(root.join("sub").join("a.txt"), b"hello").unwrap();

        let plan = scan::scan(&root).unwrap();
        let (mut session, stats, mut rx) = test_session(Role::Sender);
        let mut out = Vec::new();

        sender()
            .stream_plan(&mut out, &mut session, &plan)
            .await
            .unwrap();

        let expected = b"docs|DIR\n\
STATS_INFO|2|8\n\
FILE_START|docs/b.txt|3\nbye\
FILE_START|docs/sub/a.txt|5\nhello\
TRANSFER_END\n";
        assert_eq!(out, expected.to_vec());

        let stats = stats.lock().clone();
        assert_eq!(stats.completed_files, 2);
        assert_eq!(stats.transferred_bytes, 8);

        // 두 파일이 200ms 안에 끝나도 완료마다 스냅샷이 나감
        let mut completed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransferEvent::StatsUpdated(s) = event {
                completed.push((s.completed_files, s.transferred_bytes));
            }
        }
        assert!(completed.contains(&(1, 3)));
        assert!(completed.contains(&(2, 8)));
    }

    #[tokio::test]
    async fn test_stream_plan_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, b"").unwrap();

        let plan = scan::scan(&path).unwrap();
        let (mut session, _stats, _rx) = test_session(Role::Sender);
        let mut out = Vec::new();

        sender()
            .stream_plan(&mut out, &mut session, &plan)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "empty.log|FILE\nSTATS_INFO|1|0\nFILE_START|empty.log|0\nTRANSFER_END\n"
        );
    }

    #[tokio::test]
    async fn test_send_missing_source_fails_before_discovery() {
        let (mut session, stats, _rx) = test_session(Role::Sender);

        let err = sender()
            .send(&mut session, Path::new("/definitely/not/here"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SourceNotFound { .. }));
        assert_eq!(stats.lock().status, TransferStatus::Ready);
    }
}
