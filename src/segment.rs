//! 프로토콜 세그먼트 정의
//!
//! Stop-and-wait 프로토콜이므로 세그먼트 종류는 셋뿐
//! - Meta: 전송 시작 시 한 번 (총 reading 수, 출력 파일 이름, 배치 크기)
//! - Data: `;`로 구분된 reading 목록
//! - Ack: payload 없음, 시퀀스 비트만 의미 있음

use serde::{Deserialize, Serialize};

use crate::{Error, Result, MAGIC_NUMBER, META_SEQUENCE, PROTOCOL_VERSION};

/// 세그먼트 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SegmentKind {
    /// 전송 메타데이터
    Meta = 1,

    /// reading 데이터
    Data = 2,

    /// 수신 확인
    Ack = 3,
}

/// 프레임 헤더 (모든 세그먼트 앞에 붙음)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameHeader {
    /// 매직 넘버
    pub magic: u32,

    /// 프로토콜 버전
    pub version: u8,
}

impl FrameHeader {
    pub fn new() -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: PROTOCOL_VERSION,
        }
    }
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// 세그먼트 (전송 단위)
///
/// 체크섬은 생성 시 한 번 계산되어 세그먼트와 함께 이동한다.
/// 수신측은 다시 계산해서 같은지만 비교한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 세그먼트 타입
    pub kind: SegmentKind,

    /// 시퀀스 비트 (Data/Ack: 0 또는 1, Meta: 예약값 0)
    pub sequence: u8,

    /// UTF-8 payload
    pub payload: String,

    /// 송신측이 선언한 payload 크기 (바이트)
    pub size: u32,

    /// CRC32 체크섬
    pub checksum: u32,
}

/// 세그먼트 필드에 대한 체크섬 계산
pub fn checksum(kind: SegmentKind, sequence: u8, payload: &str, size: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[sequence, kind as u8]);
    hasher.update(&size.to_le_bytes());
    hasher.update(payload.as_bytes());
    hasher.finalize()
}

impl Segment {
    /// 새 세그먼트 생성 (체크섬 계산 포함)
    pub fn new(kind: SegmentKind, sequence: u8, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let size = payload.len() as u32;
        let checksum = checksum(kind, sequence, &payload, size);

        Self {
            kind,
            sequence,
            payload,
            size,
            checksum,
        }
    }

    /// Meta 세그먼트
    pub fn meta(metadata: &Metadata) -> Self {
        Self::new(SegmentKind::Meta, META_SEQUENCE, metadata.to_payload())
    }

    /// Data 세그먼트
    pub fn data(sequence: u8, payload: impl Into<String>) -> Self {
        Self::new(SegmentKind::Data, sequence, payload)
    }

    /// Ack 세그먼트
    pub fn ack(sequence: u8) -> Self {
        Self::new(SegmentKind::Ack, sequence, String::new())
    }

    /// 현재 필드로 체크섬 재계산
    pub fn calculate_checksum(&self) -> u32 {
        checksum(self.kind, self.sequence, &self.payload, self.size)
    }

    /// 체크섬 검증
    pub fn verify_checksum(&self) -> Result<()> {
        let got = self.calculate_checksum();
        if got != self.checksum {
            return Err(Error::ChecksumMismatch {
                expected: self.checksum,
                got,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.verify_checksum().is_ok()
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header_bytes = bincode::serialize(&FrameHeader::new())?;
        let body = bincode::serialize(self)?;

        let mut buf = Vec::with_capacity(header_bytes.len() + body.len());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// 바이트에서 역직렬화
    ///
    /// 구조적으로 잘못된 바이트는 에러, 체크섬 불일치는 여기서 검사하지 않음
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header: FrameHeader = bincode::deserialize(bytes)
            .map_err(|e| Error::MalformedSegment(format!("헤더: {e}")))?;

        if header.magic != MAGIC_NUMBER {
            return Err(Error::InvalidMagicNumber {
                expected: MAGIC_NUMBER,
                got: header.magic,
            });
        }
        if header.version != PROTOCOL_VERSION {
            return Err(Error::InvalidVersion {
                expected: PROTOCOL_VERSION,
                got: header.version,
            });
        }

        let header_size = bincode::serialized_size(&header)? as usize;
        bincode::deserialize(&bytes[header_size..])
            .map_err(|e| Error::MalformedSegment(format!("본문: {e}")))
    }

    /// payload에 담긴 reading 수 (Data 세그먼트)
    pub fn reading_count(&self) -> usize {
        crate::reading::split_payload(&self.payload).len()
    }
}

/// 전송 메타데이터 (Meta 세그먼트 payload)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// 전송할 총 reading 수
    pub total_readings: usize,

    /// 수신측에 생성할 출력 파일 이름
    pub output_name: String,

    /// Data 세그먼트당 reading 수
    pub batch_size: usize,
}

impl Metadata {
    pub fn new(total_readings: usize, output_name: impl Into<String>, batch_size: usize) -> Self {
        Self {
            total_readings,
            output_name: output_name.into(),
            batch_size,
        }
    }

    /// `<total>,<output_name>,<batch_size>`
    pub fn to_payload(&self) -> String {
        format!(
            "{},{},{}",
            self.total_readings, self.output_name, self.batch_size
        )
    }

    /// payload 파싱
    ///
    /// 양 끝에서 숫자를 떼어내므로 파일 이름에 `,`가 있어도 됨
    pub fn from_payload(payload: &str) -> Result<Self> {
        let invalid = || Error::InvalidMetadata(payload.to_string());

        let (total, rest) = payload.split_once(',').ok_or_else(invalid)?;
        let (output_name, batch) = rest.rsplit_once(',').ok_or_else(invalid)?;

        let total_readings = total.trim().parse().map_err(|_| invalid())?;
        let batch_size = batch.trim().parse().map_err(|_| invalid())?;
        let output_name = output_name.trim();
        if output_name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            total_readings,
            output_name: output_name.to_string(),
            batch_size,
        })
    }
}
