//! 센서 reading 정의
//!
//! - Reading: 입력 레코드 한 줄 = 센서 샘플 하나
//! - Data 세그먼트 payload는 `;`로 구분된 reading 목록

use std::fmt;

use thiserror::Error;

/// 레코드 필드 구분자
pub const FIELD_DELIMITER: char = ',';

/// payload 내 reading 구분자
pub const READING_DELIMITER: char = ';';

/// reading당 최소 필드 수 (id, timestamp, 측정값 3개)
pub const MIN_FIELDS: usize = 5;

/// 레코드 파싱 에러
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("필드 수 부족: expected >= 5, got {0}")]
    TooFewFields(usize),

    #[error("유효하지 않은 timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("유효하지 않은 측정값 #{index}: {value:?}")]
    InvalidValue { index: usize, value: String },

    #[error("센서 ID에 reading 구분자 ';' 포함: {0:?}")]
    DelimiterInSensorId(String),
}

/// 센서 reading (생성 후 불변)
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// 센서 ID
    pub sensor_id: String,

    /// 타임스탬프 (epoch millis)
    pub timestamp: i64,

    /// 측정 채널 3개
    pub values: [f32; 3],
}

impl Reading {
    pub fn new(sensor_id: impl Into<String>, timestamp: i64, values: [f32; 3]) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            values,
        }
    }

    /// 구분자로 나뉜 레코드 한 줄 파싱
    ///
    /// 다섯 번째 이후 필드는 무시된다. 센서 ID에 reading 구분자 `;`는 올 수 없다.
    pub fn parse_record(line: &str) -> Result<Self, RecordError> {
        let fields: Vec<&str> = line.split(FIELD_DELIMITER).map(str::trim).collect();
        if fields.len() < MIN_FIELDS {
            return Err(RecordError::TooFewFields(fields.len()));
        }
        if fields[0].contains(READING_DELIMITER) {
            return Err(RecordError::DelimiterInSensorId(fields[0].to_string()));
        }

        let timestamp = fields[1]
            .parse::<i64>()
            .map_err(|_| RecordError::InvalidTimestamp(fields[1].to_string()))?;

        let mut values = [0f32; 3];
        for (index, slot) in values.iter_mut().enumerate() {
            let raw = fields[2 + index];
            *slot = raw.parse::<f32>().map_err(|_| RecordError::InvalidValue {
                index,
                value: raw.to_string(),
            })?;
        }

        Ok(Self {
            sensor_id: fields[0].to_string(),
            timestamp,
            values,
        })
    }

    /// 전송용 한 줄 텍스트
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}{d}{}",
            self.sensor_id,
            self.timestamp,
            self.values[0],
            self.values[1],
            self.values[2],
            d = FIELD_DELIMITER
        )
    }
}

/// reading 목록을 하나의 payload로 결합
pub fn join_payload(readings: &[Reading]) -> String {
    let mut payload = String::new();
    for reading in readings {
        if !payload.is_empty() {
            payload.push(READING_DELIMITER);
        }
        payload.push_str(&reading.render());
    }
    payload
}

/// payload를 reading 줄 단위로 분리 (빈 payload는 0개)
pub fn split_payload(payload: &str) -> Vec<&str> {
    if payload.is_empty() {
        return Vec::new();
    }
    payload.split(READING_DELIMITER).collect()
}
