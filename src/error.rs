//! 에러 타입 정의

use std::path::PathBuf;

use thiserror::Error;

/// SARQ 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("직렬화 에러: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("유효하지 않은 매직 넘버: expected {expected:08X}, got {got:08X}")]
    InvalidMagicNumber { expected: u32, got: u32 },

    #[error("유효하지 않은 프로토콜 버전: expected {expected}, got {got}")]
    InvalidVersion { expected: u8, got: u8 },

    #[error("세그먼트 디코딩 실패: {0}")]
    MalformedSegment(String),

    #[error("체크섬 불일치: expected {expected:08X}, got {got:08X}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("입력 파일 읽기 실패 ({path}): {source}")]
    InputSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("전송 실패: {0}")]
    Transmit(#[source] std::io::Error),

    #[error("유효하지 않은 메타데이터: {0}")]
    InvalidMetadata(String),

    #[error("유효하지 않은 출력 파일 이름: {0:?}")]
    InvalidOutputName(String),

    #[error("세그먼트 크기 초과: {size} bytes (최대 {max_size})")]
    SegmentTooLarge { size: usize, max_size: usize },

    #[error("ACK 대기 중인 세그먼트가 있음: seq={sequence}")]
    SegmentInFlight { sequence: u8 },

    #[error("최대 재전송 횟수 초과: seq={sequence}, retries={retries}")]
    RetriesExhausted { sequence: u8, retries: u32 },

    #[error("입력 레코드 소진: {acked}/{total} readings 전송됨")]
    InputExhausted { acked: usize, total: usize },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
