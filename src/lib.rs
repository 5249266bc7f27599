//! # SARQ (Stop-and-wait ARQ)
//!
//! UDP 기반 stop-and-wait 센서 reading 전송 프로토콜
//!
//! ## 핵심 특징
//! - **교대 비트 시퀀스**: 윈도우 크기 1, 전송 중인 세그먼트는 항상 하나
//! - **CRC32 체크섬**: 손상된 세그먼트는 ACK 없이 폐기
//! - **타임아웃 재전송**: 세그먼트당 연속 재전송 횟수 제한
//! - **중복 감지**: 이미 받은 세그먼트는 다시 저장하지 않고 이전 ACK 재전송
//! - **ACK 손실 시뮬레이션**: 수신측에서 확률적으로 ACK 폐기

pub mod config;
pub mod error;
pub mod reading;
pub mod receiver;
pub mod segment;
pub mod sender;
pub mod stats;
pub mod store;
pub mod transport;

pub use config::{Config, MalformedPolicy, Mode};
pub use error::{Error, Result};
pub use reading::{Reading, RecordError};
pub use receiver::{DataOutcome, ReceiverReport, ReceiverSession};
pub use segment::{Metadata, Segment, SegmentKind};
pub use sender::{AckOutcome, SenderReport, SenderSession};
pub use stats::{ReceiverStats, SenderStats};
pub use store::{CsvFile, OutputDir, OutputSink, RecordSource};
pub use transport::{Transport, UdpTransport};

/// 프로토콜 버전
pub const PROTOCOL_VERSION: u8 = 1;

/// 최대 세그먼트 크기 (수신 버퍼 크기, 바이트)
pub const MAX_SEGMENT_SIZE: usize = 4096;

/// 매직 넘버 (패킷 식별용)
pub const MAGIC_NUMBER: u32 = 0x53415251; // "SARQ"

/// Meta 세그먼트 전용 시퀀스 값
pub const META_SEQUENCE: u8 = 0;

/// 첫 번째 Data 세그먼트의 시퀀스 비트
pub const FIRST_DATA_SEQUENCE: u8 = 1;
