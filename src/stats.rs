//! 전송 통계

use std::time::{Duration, Instant};

/// 송신측 통계
#[derive(Debug, Clone)]
pub struct SenderStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 전송한 Data 세그먼트 수 (재전송 포함, Meta 제외)
    pub segments_sent: u64,

    /// 재전송 수
    pub retransmissions: u64,

    /// 수신한 ACK 중 시퀀스가 맞지 않은 것
    pub stale_acks: u64,

    /// 타임아웃 발생 수
    pub timeouts: u64,

    /// 건너뛴 입력 레코드 수
    pub skipped_records: u64,

    /// 전송한 총 바이트 (프레임 기준)
    pub bytes_sent: u64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            segments_sent: 0,
            retransmissions: 0,
            stale_acks: 0,
            timeouts: 0,
            skipped_records: 0,
            bytes_sent: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Segments: {} | Retransmissions: {} | Timeouts: {} | Stale ACKs: {} | Bytes: {}",
            self.elapsed().as_secs_f64(),
            self.segments_sent,
            self.retransmissions,
            self.timeouts,
            self.stale_acks,
            self.bytes_sent,
        )
    }
}

impl Default for SenderStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 수신측 통계
#[derive(Debug, Clone)]
pub struct ReceiverStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 수신한 Data 세그먼트 총 바이트 (선언된 크기, 중복/재전송 포함)
    pub total_bytes: u64,

    /// 처음 수락된 세그먼트의 바이트
    pub useful_bytes: u64,

    /// 수락된 세그먼트 수
    pub accepted_segments: u64,

    /// 중복 세그먼트 수
    pub duplicate_segments: u64,

    /// 체크섬 불일치 세그먼트 수
    pub corrupt_segments: u64,

    /// 디코딩 실패 데이터그램 수
    pub malformed_datagrams: u64,

    /// 전송한 ACK 수
    pub acks_sent: u64,

    /// 시뮬레이션으로 폐기한 ACK 수
    pub acks_dropped: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_bytes: 0,
            useful_bytes: 0,
            accepted_segments: 0,
            duplicate_segments: 0,
            corrupt_segments: 0,
            malformed_datagrams: 0,
            acks_sent: 0,
            acks_dropped: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전송 효율 (useful / total)
    pub fn efficiency(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.useful_bytes as f64 / self.total_bytes as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Accepted: {} | Duplicates: {} | Corrupt: {} | ACKs: {} sent, {} dropped | Efficiency: {:.2}%",
            self.elapsed().as_secs_f64(),
            self.accepted_segments,
            self.duplicate_segments,
            self.corrupt_segments,
            self.acks_sent,
            self.acks_dropped,
            self.efficiency() * 100.0,
        )
    }
}

impl Default for ReceiverStats {
    fn default() -> Self {
        Self::new()
    }
}
