//! 수신자 (서버측)
//!
//! - Meta 세그먼트로 총 reading 수와 출력 파일 이름 수신
//! - 체크섬/시퀀스 비트 검증, 중복 세그먼트는 이전 ACK 재전송
//! - 확률적 ACK 손실 시뮬레이션
//! - 유휴 타임아웃이면 송신측이 포기한 것으로 보고 종료

use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::reading::split_payload;
use crate::segment::{Metadata, Segment, SegmentKind};
use crate::stats::ReceiverStats;
use crate::store::OutputSink;
use crate::transport::Transport;
use crate::{Config, Result, FIRST_DATA_SEQUENCE};

/// Data 세그먼트 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutcome {
    /// 처음 받은 세그먼트, 결과에 추가됨
    Accepted { sequence: u8, readings: usize },

    /// 이미 받은 세그먼트, `ack`은 다시 보낼 이전 시퀀스 (아직 없으면 None)
    Duplicate { ack: Option<u8> },

    /// 체크섬 불일치, ACK 없음
    Corrupt { expected: u32, got: u32 },

    /// Data가 아닌 세그먼트
    Ignored,
}

impl DataOutcome {
    /// 응답으로 보낼 ACK 시퀀스
    pub fn ack_sequence(&self) -> Option<u8> {
        match self {
            DataOutcome::Accepted { sequence, .. } => Some(*sequence),
            DataOutcome::Duplicate { ack } => *ack,
            DataOutcome::Corrupt { .. } | DataOutcome::Ignored => None,
        }
    }
}

/// 수신 결과
#[derive(Debug, Clone)]
pub struct ReceiverReport {
    /// 모든 reading을 받아 출력까지 기록했는지
    pub completed: bool,
    pub metadata: Option<Metadata>,
    pub readings: usize,
    pub stats: ReceiverStats,
}

/// 수신 세션
pub struct ReceiverSession<T, O> {
    config: Config,
    transport: T,
    sink: O,

    metadata: Option<Metadata>,
    expected_sequence: u8,
    last_accepted: Option<u8>,

    /// 출력 파일에 기록할 누적 결과
    lines: Vec<String>,
    reading_count: usize,
    completed: bool,

    stats: ReceiverStats,
    rng: StdRng,
    recv_buf: Vec<u8>,
}

impl<T: Transport, O: OutputSink> ReceiverSession<T, O> {
    /// 새 수신 세션 생성
    pub fn new(config: Config, transport: T, sink: O) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let recv_buf = vec![0u8; config.max_segment_size];

        Self {
            config,
            transport,
            sink,
            metadata: None,
            expected_sequence: FIRST_DATA_SEQUENCE,
            last_accepted: None,
            lines: Vec::new(),
            reading_count: 0,
            completed: false,
            stats: ReceiverStats::new(),
            rng,
            recv_buf,
        }
    }

    /// Meta 수신 후 Data 루프 실행
    pub async fn run(&mut self) -> Result<ReceiverReport> {
        self.config.validate()?;
        self.receive_meta().await?;

        if self.check_complete()? {
            return Ok(self.report());
        }
        self.receive_data().await
    }

    /// Meta 세그먼트가 올 때까지 블로킹 대기
    ///
    /// Meta는 ACK하지 않고 시퀀스 교대에도 참여하지 않는다.
    pub async fn receive_meta(&mut self) -> Result<Metadata> {
        info!("SERVER: Waiting For Metadata");

        loop {
            let Some((len, from)) = self.transport.recv_from(&mut self.recv_buf, None).await? else {
                continue;
            };

            let segment = match Segment::decode(&self.recv_buf[..len]) {
                Ok(segment) => segment,
                Err(e) => {
                    self.stats.malformed_datagrams += 1;
                    warn!("SERVER: 디코딩 실패한 데이터그램 무시 ({}): {}", from, e);
                    continue;
                }
            };

            if segment.kind != SegmentKind::Meta {
                debug!("SERVER: Meta 이전의 {:?} 세그먼트 무시", segment.kind);
                continue;
            }
            if let Err(e) = segment.verify_checksum() {
                warn!("SERVER: Meta 체크섬 불일치: {}", e);
                continue;
            }

            let metadata = Metadata::from_payload(&segment.payload)?;
            // 전송을 다 받고 나서 쓰기에 실패하지 않도록 미리 확인
            self.sink.validate_name(&metadata.output_name)?;
            info!(
                "SERVER: META [SEQ#{}] (Number Of Readings: {}, File Name: {}, Batch Size: {})",
                segment.sequence, metadata.total_readings, metadata.output_name, metadata.batch_size
            );
            self.metadata = Some(metadata.clone());
            return Ok(metadata);
        }
    }

    /// Data 수신 루프
    ///
    /// 모든 reading을 받거나 유휴 타임아웃이 지나면 종료한다.
    pub async fn receive_data(&mut self) -> Result<ReceiverReport> {
        let idle_timeout = self.config.idle_timeout();
        info!(
            "SERVER: Waiting For Data (ack loss probability {:.2})",
            self.config.effective_loss_probability()
        );

        loop {
            let Some((len, from)) = self
                .transport
                .recv_from(&mut self.recv_buf, Some(idle_timeout))
                .await?
            else {
                info!(
                    "SERVER: No Packets Received For {}ms. Exiting.",
                    idle_timeout.as_millis()
                );
                break;
            };

            let segment = match Segment::decode(&self.recv_buf[..len]) {
                Ok(segment) => segment,
                Err(e) => {
                    self.stats.malformed_datagrams += 1;
                    warn!("SERVER: 디코딩 실패, ACK 없음 ({}): {}", from, e);
                    continue;
                }
            };

            let outcome = self.handle_segment(&segment);
            if let Some(sequence) = outcome.ack_sequence() {
                self.send_ack(sequence, from).await?;
            }

            if self.check_complete()? {
                break;
            }
        }

        self.log_efficiency();
        Ok(self.report())
    }

    /// 세그먼트 하나에 대한 상태 전이 (I/O 없음)
    pub fn handle_segment(&mut self, segment: &Segment) -> DataOutcome {
        if segment.kind != SegmentKind::Data {
            debug!("SERVER: {:?} 세그먼트 무시", segment.kind);
            return DataOutcome::Ignored;
        }

        info!(
            "SERVER: Receive: DATA [SEQ#{}] (Size: {}, Crc: {})",
            segment.sequence, segment.size, segment.checksum
        );
        self.stats.total_bytes += segment.size as u64;

        let got = segment.calculate_checksum();
        if got != segment.checksum {
            self.stats.corrupt_segments += 1;
            warn!("SERVER: Calculated Checksum Is {} INVALID, Not Sending Any ACK", got);
            return DataOutcome::Corrupt {
                expected: segment.checksum,
                got,
            };
        }
        debug!("SERVER: Calculated Checksum Is {} VALID", got);

        if segment.sequence != self.expected_sequence {
            self.stats.duplicate_segments += 1;
            info!(
                "SERVER: Duplicate DATA Detected [SEQ#{}], re-acking previous segment",
                segment.sequence
            );
            return DataOutcome::Duplicate {
                ack: self.last_accepted,
            };
        }

        let readings = split_payload(&segment.payload);
        let count = readings.len();
        self.lines
            .push(format!("Segment [{}] has {} Readings", segment.sequence, count));
        self.lines.extend(readings.into_iter().map(str::to_string));
        self.lines.push(String::new());

        self.reading_count += count;
        self.stats.useful_bytes += segment.size as u64;
        self.stats.accepted_segments += 1;
        self.last_accepted = Some(segment.sequence);
        self.expected_sequence ^= 1;

        DataOutcome::Accepted {
            sequence: segment.sequence,
            readings: count,
        }
    }

    /// ACK 전송 (손실 시뮬레이션 적용)
    ///
    /// 실제로 보냈으면 true
    pub async fn send_ack(&mut self, sequence: u8, dest: SocketAddr) -> Result<bool> {
        if self.ack_lost() {
            self.stats.acks_dropped += 1;
            info!("SERVER: Simulating ACK Loss. ACK [SEQ#{}] Is Lost.", sequence);
            return Ok(false);
        }

        let frame = Segment::ack(sequence).encode()?;
        self.transport.send_to(&frame, dest).await?;
        self.stats.acks_sent += 1;
        info!("SERVER: Send: ACK [SEQ#{}]", sequence);
        Ok(true)
    }

    fn ack_lost(&mut self) -> bool {
        let probability = self.config.effective_loss_probability();
        probability > 0.0 && self.rng.gen::<f64>() < probability
    }

    /// 모든 reading을 받았으면 출력 기록 (한 번만)
    fn check_complete(&mut self) -> Result<bool> {
        if self.completed {
            return Ok(true);
        }
        let Some(metadata) = &self.metadata else {
            return Ok(false);
        };
        if self.reading_count < metadata.total_readings {
            return Ok(false);
        }

        self.sink.write_lines(&metadata.output_name, &self.lines)?;
        info!(
            "SERVER: {} readings written to {}",
            self.reading_count, metadata.output_name
        );
        self.completed = true;
        Ok(true)
    }

    fn log_efficiency(&self) {
        if self.stats.total_bytes == 0 {
            return;
        }
        info!("Total Bytes: {}", self.stats.total_bytes);
        info!("Useful Bytes: {}", self.stats.useful_bytes);
        info!("Efficiency: {:.2} %", self.stats.efficiency() * 100.0);
    }

    pub fn expected_sequence(&self) -> u8 {
        self.expected_sequence
    }

    pub fn last_accepted_sequence(&self) -> Option<u8> {
        self.last_accepted
    }

    pub fn reading_count(&self) -> usize {
        self.reading_count
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    /// 현재까지의 수신 결과
    pub fn report(&self) -> ReceiverReport {
        ReceiverReport {
            completed: self.completed,
            metadata: self.metadata.clone(),
            readings: self.reading_count,
            stats: self.stats.clone(),
        }
    }
}
