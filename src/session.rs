//! 전송 세션과 외부 진입점
//!
//! - `TransferEngine`: 송신/수신 시작, 통계 조회 (UI 등 외부 호출자용)
//! - `Session`: 송신 또는 수신 한 번. 실행 태스크가 소유하며 끝나면 사라짐
//! - `SessionGuard`: 프로세스 전체에서 세션 하나만 실행되도록 하는 CAS 플래그

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{EventReceiver, EventSink};
use crate::receiver::Receiver;
use crate::scan::{self, PathInfo};
use crate::sender::Sender;
use crate::stats::{StatsEstimator, TransferStats, TransferStatus};
use crate::{Config, Error, Result};

/// 세션 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Sender,
    Receiver,
}

/// 실행 중 플래그 점유
///
/// 생성 시 false -> true CAS에 성공해야 하며, 어떤 경로로든 drop되면 해제된다.
#[derive(Debug)]
pub struct SessionGuard {
    running: Arc<AtomicBool>,
}

impl SessionGuard {
    pub fn acquire(running: &Arc<AtomicBool>) -> Result<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;

        Ok(Self {
            running: running.clone(),
        })
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// 진행 상황 기록 및 알림
pub struct Progress {
    stats: Arc<Mutex<TransferStats>>,
    estimator: StatsEstimator,
    events: EventSink,
}

impl Progress {
    pub fn new(stats: Arc<Mutex<TransferStats>>, estimator: StatsEstimator, events: EventSink) -> Self {
        Self {
            stats,
            estimator,
            events,
        }
    }

    /// 현재 스냅샷
    pub fn snapshot(&self) -> TransferStats {
        self.stats.lock().clone()
    }

    /// 통계 수정 후 알림
    pub fn modify(&self, f: impl FnOnce(&mut TransferStats)) {
        let snapshot = {
            let mut stats = self.stats.lock();
            f(&mut stats);
            stats.clone()
        };
        self.events.stats(snapshot);
    }

    /// 추정기를 거친 갱신 (최소 간격 제한)
    ///
    /// 간격이 지나지 않았으면 잠금 없이 바로 돌아간다.
    pub fn update(&mut self, current_file: &str, file_size: u64, transferred: u64, start: Instant) {
        let now = Instant::now();
        if !self.estimator.is_due(now) {
            return;
        }

        let snapshot = {
            let mut stats = self.stats.lock();
            self.estimator
                .update_at(&mut stats, current_file, file_size, transferred, start, now);
            stats.clone()
        };
        self.events.stats(snapshot);
    }

    /// 사람이 읽는 상태 메시지
    pub fn status(&self, message: impl Into<String>) {
        self.events.status(message);
    }
}

/// 송신 또는 수신 한 번
pub struct Session {
    /// 역할
    pub role: Role,

    /// 전송 루트 (송신: 원본 경로, 수신: 저장 경로)
    pub root: Option<PathBuf>,

    /// 상대 경로 기준 디렉토리
    pub base_dir: Option<PathBuf>,

    /// 시작 시각
    pub started_at: Instant,

    /// 진행 상황
    pub progress: Progress,

    _guard: SessionGuard,
}

impl Session {
    pub(crate) fn new(role: Role, progress: Progress, guard: SessionGuard) -> Self {
        Self {
            role,
            root: None,
            base_dir: None,
            started_at: Instant::now(),
            progress,
            _guard: guard,
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// 외부 호출자용 진입점
///
/// 복제해도 같은 실행 플래그와 통계를 공유한다.
#[derive(Clone)]
pub struct TransferEngine {
    config: Arc<Config>,
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<TransferStats>>,
    events: EventSink,
}

impl TransferEngine {
    /// 새 엔진과 알림 수신기 생성
    pub fn new(config: Config) -> (Self, EventReceiver) {
        let (events, rx) = EventSink::channel(config.event_capacity);
        let engine = Self {
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(Mutex::new(TransferStats::default())),
            events,
        };
        (engine, rx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 통계 스냅샷 (항상 복사본)
    pub fn stats(&self) -> TransferStats {
        self.stats.lock().clone()
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 파일/폴더 정보
    pub fn path_info(&self, path: &str) -> Result<PathInfo> {
        scan::path_info(path)
    }

    /// 송신 (현재 태스크에서 끝까지 실행)
    pub async fn send(&self, source: impl AsRef<Path>) -> Result<()> {
        let session = self.begin(Role::Sender)?;
        self.run_send(session, source.as_ref()).await
    }

    /// 수신 (현재 태스크에서 끝까지 실행). 저장된 루트 경로를 돌려준다.
    pub async fn receive(&self) -> Result<PathBuf> {
        let session = self.begin(Role::Receiver)?;
        self.run_receive(session).await
    }

    /// 백그라운드 송신 시작
    ///
    /// 다른 세션이 실행 중이면 대기하지 않고 즉시 `Error::Busy`.
    pub fn start_send(&self, source: impl Into<PathBuf>) -> Result<JoinHandle<Result<()>>> {
        let session = self.begin(Role::Sender)?;
        let source = source.into();
        let engine = self.clone();
        Ok(tokio::spawn(async move {
            engine.run_send(session, &source).await
        }))
    }

    /// 백그라운드 수신 시작
    pub fn start_receive(&self) -> Result<JoinHandle<Result<PathBuf>>> {
        let session = self.begin(Role::Receiver)?;
        let engine = self.clone();
        Ok(tokio::spawn(async move { engine.run_receive(session).await }))
    }

    fn begin(&self, role: Role) -> Result<Session> {
        let guard = SessionGuard::acquire(&self.running)?;

        self.stats.lock().reset();
        debug!("세션 시작: {:?}", role);

        let progress = Progress::new(
            self.stats.clone(),
            StatsEstimator::from_config(&self.config),
            self.events.clone(),
        );
        Ok(Session::new(role, progress, guard))
    }

    async fn run_send(&self, mut session: Session, source: &Path) -> Result<()> {
        let sender = Sender::new(self.config.clone());
        let result = sender.send(&mut session, source).await;
        self.finish(session, result).await
    }

    async fn run_receive(&self, mut session: Session) -> Result<PathBuf> {
        let receiver = Receiver::new(self.config.clone());
        let result = receiver.receive(&mut session).await;
        self.finish(session, result).await
    }

    async fn finish<T>(&self, session: Session, result: Result<T>) -> Result<T> {
        let role = session.role;

        if let Err(e) = &result {
            warn!("{:?} 세션 실패 ({:?}): {}", role, e.kind(), e);
            session.progress.modify(|s| s.status = TransferStatus::Failed);
            session.progress.status(format!("failed: {}", e));
        }

        debug!("세션 종료: {:?}, {:.2}s", role, session.elapsed().as_secs_f64());

        // 완료 알림을 받은 쪽이 바로 다음 세션을 시작할 수 있도록 먼저 해제
        drop(session);
        self.events
            .completed(role, result.is_ok(), self.config.timeout())
            .await;
        result
    }
}

/// 단위 테스트용 세션 (실행 플래그는 세션마다 따로)
#[cfg(test)]
pub(crate) fn test_session(role: Role) -> (Session, Arc<Mutex<TransferStats>>, EventReceiver) {
    let running = Arc::new(AtomicBool::new(false));
    let guard = SessionGuard::acquire(&running).unwrap();
    let stats = Arc::new(Mutex::new(TransferStats::default()));
    let (events, rx) = EventSink::channel(1024);
    let progress = Progress::new(stats.clone(), StatsEstimator::default(), events);
    (Session::new(role, progress, guard), stats, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_is_exclusive() {
        let running = Arc::new(AtomicBool::new(false));

        let guard = SessionGuard::acquire(&running).unwrap();
        assert!(matches!(SessionGuard::acquire(&running), Err(Error::Busy)));

        drop(guard);
        assert!(!running.load(Ordering::SeqCst));
        assert!(SessionGuard::acquire(&running).is_ok());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let running = Arc::new(AtomicBool::new(false));
        let flag = running.clone();

        let result = std::panic::catch_unwind(move || {
            let _guard = SessionGuard::acquire(&flag).unwrap();
            panic!("session panicked");
        });

        assert!(result.is_err());
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_progress_throttles_events() {
        let stats = Arc::new(Mutex::new(TransferStats {
            total_bytes: 100,
            ..Default::default()
        }));
        let (events, mut rx) = EventSink::channel(16);
        let mut progress = Progress::new(
            stats.clone(),
            StatsEstimator::new(std::time::Duration::from_secs(60), 10),
            events,
        );

        let start = Instant::now();
        progress.update("a", 100, 10, start);
        progress.update("a", 100, 50, start);

        assert_eq!(stats.lock().transferred_bytes, 10);
        assert!(matches!(
            rx.try_recv(),
            Ok(crate::events::TransferEvent::StatsUpdated(s)) if s.transferred_bytes == 10
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_throttled_update_skips_lock() {
        let stats = Arc::new(Mutex::new(TransferStats::default()));
        let (events, _rx) = EventSink::channel(16);
        let mut progress = Progress::new(
            stats.clone(),
            StatsEstimator::new(std::time::Duration::from_secs(60), 10),
            events,
        );
        let start = Instant::now();
        progress.update("a", 100, 10, start);

        // 다른 쪽이 잠금을 쥔 동안에도 간격 안의 갱신은 막히지 않아야 함
        let held = stats.lock();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            progress.update("a", 100, 20, start);
            let _ = done_tx.send(());
        });

        let finished = done_rx.recv_timeout(std::time::Duration::from_secs(5));
        drop(held);
        assert!(finished.is_ok());
        assert_eq!(stats.lock().transferred_bytes, 10);
    }
}
