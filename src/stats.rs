//! 전송 통계
//!
//! - `TransferStats`: 외부에 복사본으로 전달되는 진행 스냅샷
//! - `StatsEstimator`: 갱신 빈도 제한 + 가중 이동 평균 속도 + ETA

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::Config;

const MIB: f64 = 1024.0 * 1024.0;

/// 총 바이트를 모를 때 표시하는 진행률 ("시작 안 함"과 구분)
pub const PLACEHOLDER_PROGRESS: f64 = 0.1;

/// 속도를 아직 알 수 없을 때의 ETA 문자열
pub const ETA_COMPUTING: &str = "computing...";

/// 이 시간 이전의 속도는 노이즈가 커서 윈도우에 넣지 않음
const MIN_SAMPLE_ELAPSED_SECS: f64 = 0.1;

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    #[default]
    Ready,
    Scanning,
    Waiting,
    Transferring,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

/// 세션 진행 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    /// 총 파일 수
    pub total_files: u64,

    /// 완료된 파일 수
    pub completed_files: u64,

    /// 총 바이트
    pub total_bytes: u64,

    /// 전송된 바이트
    pub transferred_bytes: u64,

    /// 현재 속도 (MiB/s, 가중 평균)
    pub current_speed: f64,

    /// 예상 남은 시간
    pub estimated_time: String,

    /// 현재 파일
    pub current_file: String,

    /// 진행률 (0 ~ 100)
    pub progress: f64,

    /// 상태
    pub status: TransferStatus,
}

impl TransferStats {
    /// 세션 시작 시 초기화
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 정상 종료 처리
    ///
    /// 부동소수점 오차로 99.9%에 머무는 것을 막기 위해 카운터를 총계에 맞춘다.
    pub fn mark_completed(&mut self) {
        self.status = TransferStatus::Completed;
        self.progress = 100.0;
        self.completed_files = self.total_files;
        self.transferred_bytes = self.total_bytes;
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Files: {}/{} | Bytes: {}/{} | {:.1}% | {:.2} MiB/s | ETA: {} | {:?}",
            self.completed_files,
            self.total_files,
            self.transferred_bytes,
            self.total_bytes,
            self.progress,
            self.current_speed,
            self.estimated_time,
            self.status,
        )
    }
}

/// 진행률 계산 (0 ~ 100으로 제한)
pub fn progress_percent(transferred: u64, total: u64) -> f64 {
    if total == 0 {
        return PLACEHOLDER_PROGRESS;
    }
    (transferred as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// 남은 시간 표시
pub fn format_eta(remaining_secs: f64) -> String {
    if remaining_secs < 1.0 {
        "<1s".to_string()
    } else if remaining_secs < 60.0 {
        format!("{:.0}s", remaining_secs)
    } else if remaining_secs < 3600.0 {
        format!("{:.1} min", remaining_secs / 60.0)
    } else {
        format!("{:.1} h", remaining_secs / 3600.0)
    }
}

/// 최근 속도 샘플 윈도우
///
/// 용량을 넘으면 가장 오래된 샘플부터 버린다.
#[derive(Debug, Clone)]
pub struct SpeedWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl SpeedWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// 최신 샘플일수록 가중치가 큰 선형 가중 평균 (1, 2, ..., n)
    pub fn weighted_average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let (weighted, weights) = self
            .samples
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(sum, total), (i, speed)| {
                let weight = (i + 1) as f64;
                (sum + speed * weight, total + weight)
            });

        Some(weighted / weights)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// 추정기 내부 상태
#[derive(Debug)]
struct PerformanceStats {
    /// 마지막으로 받아들인 갱신 시각
    last_update: Option<Instant>,

    /// 최소 갱신 간격
    min_interval: Duration,

    /// 속도 샘플
    window: SpeedWindow,

    /// 직전 두 갱신 사이 간격
    last_interval: Duration,
}

/// 속도/ETA/진행률 추정기
///
/// 세션을 실행하는 태스크가 소유하며, 공유 `TransferStats`에 결과를 기록한다.
#[derive(Debug)]
pub struct StatsEstimator {
    perf: PerformanceStats,
}

impl StatsEstimator {
    pub fn new(min_interval: Duration, window_size: usize) -> Self {
        Self {
            perf: PerformanceStats {
                last_update: None,
                min_interval,
                window: SpeedWindow::new(window_size),
                last_interval: Duration::ZERO,
            },
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.stats_interval(), config.speed_window)
    }

    /// `now`에 갱신하면 받아들여지는지 (최소 간격 경과 여부)
    pub fn is_due(&self, now: Instant) -> bool {
        match self.perf.last_update {
            Some(last) => now.saturating_duration_since(last) >= self.perf.min_interval,
            None => true,
        }
    }

    /// 통계 갱신
    ///
    /// 최소 간격이 지나지 않았으면 아무것도 하지 않고 `false`를 돌려준다.
    pub fn update(
        &mut self,
        stats: &mut TransferStats,
        current_file: &str,
        file_size: u64,
        transferred: u64,
        start_time: Instant,
    ) -> bool {
        self.update_at(stats, current_file, file_size, transferred, start_time, Instant::now())
    }

    /// 시각을 지정한 갱신
    pub fn update_at(
        &mut self,
        stats: &mut TransferStats,
        current_file: &str,
        file_size: u64,
        transferred: u64,
        start_time: Instant,
        now: Instant,
    ) -> bool {
        if !self.is_due(now) {
            return false;
        }
        if let Some(last) = self.perf.last_update {
            self.perf.last_interval = now.saturating_duration_since(last);
        }

        if !current_file.is_empty() {
            stats.current_file = current_file.to_string();
        }

        stats.transferred_bytes = transferred;
        stats.progress = progress_percent(transferred, stats.total_bytes);

        let elapsed = now.saturating_duration_since(start_time).as_secs_f64();
        let instant_speed = if elapsed > 0.0 {
            transferred as f64 / MIB / elapsed
        } else {
            0.0
        };

        stats.current_speed = if elapsed > MIN_SAMPLE_ELAPSED_SECS {
            self.perf.window.push(instant_speed);
            self.perf.window.weighted_average().unwrap_or(instant_speed)
        } else {
            instant_speed
        };

        stats.estimated_time = if stats.current_speed > 0.0 && stats.total_bytes > 0 {
            let remaining = stats.total_bytes.saturating_sub(transferred) as f64;
            format_eta(remaining / (stats.current_speed * MIB))
        } else {
            ETA_COMPUTING.to_string()
        };

        trace!(
            "stats: file={} size={} {}",
            current_file,
            file_size,
            stats.summary()
        );

        self.perf.last_update = Some(now);
        true
    }

    /// 직전 갱신 간격
    pub fn last_interval(&self) -> Duration {
        self.perf.last_interval
    }

    /// 현재 속도 윈도우
    pub fn window(&self) -> &SpeedWindow {
        &self.perf.window
    }
}

impl Default for StatsEstimator {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), 10)
    }
}
