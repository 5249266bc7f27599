//! 프로토콜 설정

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result, MAX_SEGMENT_SIZE};

/// 기본 ACK 대기 타임아웃 (밀리초)
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// 세그먼트당 기본 연속 재전송 허용 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 4;

/// Data 세그먼트당 기본 reading 수
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// 수신측 유휴 타임아웃 (밀리초)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 2000;

/// 전송 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 일반 전송: ACK을 블로킹으로 대기 ("nm")
    Normal,

    /// 타임아웃 + 재전송 ("wt")
    Timeout,

    /// 타임아웃 + 재전송, 수신측 ACK 손실 시뮬레이션 ("wl")
    AckLoss,
}

impl Mode {
    /// 송신측이 타임아웃 재전송 루프를 사용하는지 여부
    pub fn retransmits(self) -> bool {
        matches!(self, Mode::Timeout | Mode::AckLoss)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Normal => "nm",
            Mode::Timeout => "wt",
            Mode::AckLoss => "wl",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "nm" => Ok(Mode::Normal),
            "wt" => Ok(Mode::Timeout),
            "wl" => Ok(Mode::AckLoss),
            other => Err(Error::InvalidConfig(format!(
                "알 수 없는 모드: {other} (nm | wt | wl)"
            ))),
        }
    }
}

/// 잘못된 입력 레코드 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// 조용히 건너뜀
    Skip,

    /// 경고 로그 후 건너뜀
    Warn,
}

/// SARQ 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 전송 모드
    pub mode: Mode,

    /// ACK 대기 타임아웃 (밀리초)
    pub timeout_ms: u64,

    /// 세그먼트당 최대 연속 재전송 횟수
    pub max_retries: u32,

    /// ACK 손실 확률 (0.0 ~ 1.0)
    /// `Mode::AckLoss`에서만 적용됨
    pub ack_loss_probability: f64,

    /// Data 세그먼트당 최대 reading 수
    pub batch_size: usize,

    /// 수신 버퍼 크기 (= 최대 세그먼트 크기)
    pub max_segment_size: usize,

    /// 수신측 유휴 타임아웃 (밀리초)
    /// 이 시간 동안 패킷이 없으면 송신측이 포기한 것으로 간주
    pub idle_timeout_ms: u64,

    /// 잘못된 입력 레코드 처리 방식
    pub malformed_policy: MalformedPolicy,

    /// ACK 손실 시뮬레이션용 RNG 시드 (None이면 엔트로피 사용)
    pub rng_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            ack_loss_probability: 0.0,
            batch_size: DEFAULT_BATCH_SIZE,
            max_segment_size: MAX_SEGMENT_SIZE,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            malformed_policy: MalformedPolicy::Warn,
            rng_seed: None,
        }
    }
}

impl Config {
    /// 타임아웃 재전송 모드 설정
    pub fn timeout_mode() -> Self {
        Self {
            mode: Mode::Timeout,
            ..Self::default()
        }
    }

    /// ACK 손실 시뮬레이션 설정
    pub fn lossy_acks(probability: f64) -> Self {
        Self {
            mode: Mode::AckLoss,
            ack_loss_probability: probability,
            ..Self::default()
        }
    }

    /// ACK 대기 타임아웃
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 수신측 유휴 타임아웃
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// 실제로 적용되는 ACK 손실 확률
    pub fn effective_loss_probability(&self) -> f64 {
        match self.mode {
            Mode::AckLoss => self.ack_loss_probability,
            _ => 0.0,
        }
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size는 1 이상이어야 함".into()));
        }
        if !(0.0..=1.0).contains(&self.ack_loss_probability) {
            return Err(Error::InvalidConfig(format!(
                "ack_loss_probability 범위 초과: {}",
                self.ack_loss_probability
            )));
        }
        if self.mode.retransmits() && self.timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "재전송 모드에서는 timeout_ms가 0일 수 없음".into(),
            ));
        }
        if self.max_segment_size == 0 {
            return Err(Error::InvalidConfig("max_segment_size는 0일 수 없음".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode, Mode::Normal);
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.max_segment_size, 4096);
        assert_eq!(config.idle_timeout(), Duration::from_millis(2000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_codes() {
        for mode in [Mode::Normal, Mode::Timeout, Mode::AckLoss] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        assert!("xx".parse::<Mode>().is_err());
        assert!(!Mode::Normal.retransmits());
        assert!(Mode::AckLoss.retransmits());
    }

    #[test]
    fn test_loss_only_in_loss_mode() {
        let mut config = Config::lossy_acks(0.3);
        assert_eq!(config.effective_loss_probability(), 0.3);

        config.mode = Mode::Timeout;
        assert_eq!(config.effective_loss_probability(), 0.0);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        assert!(Config::lossy_acks(1.5).validate().is_err());
        assert!(Config::lossy_acks(1.0).validate().is_ok());

        let config = Config {
            timeout_ms: 0,
            ..Config::timeout_mode()
        };
        assert!(config.validate().is_err());
    }
}
