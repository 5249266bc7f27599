//! 송신자 (클라이언트측)
//!
//! - Meta 세그먼트로 전송 정보 알림
//! - 배치 단위로 reading을 읽어 Data 세그먼트 생성
//! - 전송 중인 세그먼트는 항상 하나 (stop-and-wait)
//! - 타임아웃 모드에서는 같은 바이트를 그대로 재전송

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::reading::{join_payload, Reading};
use crate::segment::{Metadata, Segment, SegmentKind};
use crate::stats::SenderStats;
use crate::store::RecordSource;
use crate::transport::Transport;
use crate::{Config, Error, MalformedPolicy, Result, FIRST_DATA_SEQUENCE};

/// ACK 대기 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// 전송 중인 세그먼트의 ACK 수신
    Matched,

    /// 시퀀스가 맞지 않는 ACK (중복/지연) 또는 전송 중인 세그먼트 없음
    Stale,

    /// 타임아웃까지 아무 패킷도 없음
    TimedOut,
}

/// ACK 대기 중인 세그먼트
#[derive(Debug)]
struct InFlight {
    segment: Segment,

    /// 재전송 시 그대로 다시 보낼 프레임
    frame: Bytes,

    /// 이 세그먼트를 만들면서 소비한 입력 레코드 수 (건너뛴 것 포함)
    records: usize,
}

/// 전송 결과
#[derive(Debug, Clone)]
pub struct SenderReport {
    pub total_readings: usize,
    pub acked_readings: usize,
    pub segments_sent: u64,
    pub retransmissions: u64,
    pub stats: SenderStats,
}

/// 송신 세션
///
/// 한 번에 하나의 전송만 담당한다. 소켓은 세션이 소유하므로
/// 세션이 사라지면 어떤 경로든 소켓도 닫힌다.
pub struct SenderSession<T, S> {
    config: Config,
    transport: T,
    source: S,
    peer: SocketAddr,
    output_name: String,

    total_readings: usize,
    acked_readings: usize,

    /// ACK된 세그먼트들이 소비한 입력 레코드 수 (다음 읽기 위치)
    consumed_records: usize,

    /// 다음 새 Data 세그먼트의 시퀀스 비트
    next_sequence: u8,

    in_flight: Option<InFlight>,
    consecutive_retries: u32,

    /// 수신 타임아웃 (None이면 블로킹)
    recv_timeout: Option<Duration>,

    stats: SenderStats,
    recv_buf: Vec<u8>,
}

impl<T: Transport, S: RecordSource> SenderSession<T, S> {
    /// 새 송신 세션 생성
    pub fn new(
        config: Config,
        transport: T,
        source: S,
        peer: SocketAddr,
        output_name: impl Into<String>,
    ) -> Self {
        let recv_buf = vec![0u8; config.max_segment_size];

        Self {
            config,
            transport,
            source,
            peer,
            output_name: output_name.into(),
            total_readings: 0,
            acked_readings: 0,
            consumed_records: 0,
            next_sequence: FIRST_DATA_SEQUENCE,
            in_flight: None,
            consecutive_retries: 0,
            recv_timeout: None,
            stats: SenderStats::new(),
            recv_buf,
        }
    }

    /// 전체 전송 실행
    ///
    /// Meta 전송 후 모든 reading이 ACK될 때까지 Data 세그먼트를 하나씩 보낸다.
    pub async fn run(&mut self) -> Result<SenderReport> {
        self.config.validate()?;
        self.announce().await?;

        while !self.is_complete() {
            if self.build_and_send_next().await?.is_none() {
                return Err(Error::InputExhausted {
                    acked: self.acked_readings,
                    total: self.total_readings,
                });
            }

            if self.config.mode.retransmits() {
                self.retransmit_loop().await?;
            } else {
                self.wait_for_ack().await?;
            }
        }

        info!("Total Segments: {}", self.stats.segments_sent);
        info!("{}", self.stats.summary());
        Ok(self.report())
    }

    /// Meta 세그먼트 전송
    ///
    /// 총 reading 수는 여기서 한 번만 센다. 파싱되지 않는 레코드는 세지 않는다.
    pub async fn announce(&mut self) -> Result<Metadata> {
        let count = self.source.count_records()?;
        let records = self.source.read_records(0, count)?;
        self.total_readings = records
            .iter()
            .filter(|record| Reading::parse_record(record).is_ok())
            .count();

        let metadata = Metadata::new(
            self.total_readings,
            self.output_name.clone(),
            self.config.batch_size,
        );
        let segment = Segment::meta(&metadata);
        let frame = self.encode_checked(&segment)?;

        info!(
            "CLIENT: META [SEQ#{}] (Number Of Readings: {}, File Name: {}, Batch Size: {})",
            segment.sequence, metadata.total_readings, metadata.output_name, metadata.batch_size
        );

        self.transport.send_to(&frame, self.peer).await?;
        Ok(metadata)
    }

    /// 다음 Data 세그먼트 생성 및 전송
    ///
    /// 전송했으면 시퀀스 비트, 보낼 것이 없으면 `None`.
    pub async fn build_and_send_next(&mut self) -> Result<Option<u8>> {
        if let Some(in_flight) = &self.in_flight {
            return Err(Error::SegmentInFlight {
                sequence: in_flight.segment.sequence,
            });
        }

        if self.is_complete() {
            return Ok(None);
        }

        let (readings, records) = self.read_batch()?;
        if readings.is_empty() {
            debug!("읽을 수 있는 reading 없음 (offset={})", self.consumed_records);
            return Ok(None);
        }

        let sequence = self.next_sequence;
        let segment = Segment::data(sequence, join_payload(&readings));
        let frame = Bytes::from(self.encode_checked(&segment)?);

        info!(
            "CLIENT: Send: DATA [SEQ#{}] (Size: {}, Crc: {}, Readings: {})",
            segment.sequence,
            segment.size,
            segment.checksum,
            readings.len()
        );
        debug!("CLIENT: Content: {}", segment.payload);

        self.transport.send_to(&frame, self.peer).await?;

        self.stats.segments_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        self.next_sequence ^= 1;
        self.in_flight = Some(InFlight {
            segment,
            frame,
            records,
        });

        Ok(Some(sequence))
    }

    /// 현재 설정된 수신 타임아웃으로 ACK 하나 대기
    pub async fn await_ack(&mut self) -> Result<AckOutcome> {
        let deadline = self.recv_timeout.map(|timeout| Instant::now() + timeout);
        self.await_ack_until(deadline).await
    }

    async fn await_ack_until(&mut self, deadline: Option<Instant>) -> Result<AckOutcome> {
        let timeout = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    self.stats.timeouts += 1;
                    return Ok(AckOutcome::TimedOut);
                }
                Some(remaining)
            }
            None => None,
        };

        let Some((len, _from)) = self.transport.recv_from(&mut self.recv_buf, timeout).await? else {
            self.stats.timeouts += 1;
            return Ok(AckOutcome::TimedOut);
        };

        let ack = Segment::decode(&self.recv_buf[..len])?;
        info!("CLIENT: Receive: ACK [SEQ#{}]", ack.sequence);

        if ack.kind != SegmentKind::Ack || !ack.is_valid() {
            warn!("CLIENT: ACK이 아니거나 손상된 세그먼트 무시 ({:?})", ack.kind);
            self.stats.stale_acks += 1;
            return Ok(AckOutcome::Stale);
        }

        let matched = matches!(&self.in_flight, Some(f) if f.segment.sequence == ack.sequence);
        if !matched {
            debug!("CLIENT: 시퀀스 불일치 ACK 무시: SEQ#{}", ack.sequence);
            self.stats.stale_acks += 1;
            return Ok(AckOutcome::Stale);
        }

        if let Some(acked) = self.in_flight.take() {
            // 부분 손실 없음: ACK은 세그먼트 전체를 확인한다
            self.acked_readings += acked.segment.reading_count();
            self.consumed_records += acked.records;
        }

        debug!(
            "CLIENT: {}/{} readings acknowledged",
            self.acked_readings, self.total_readings
        );
        if self.is_complete() {
            info!(
                "CLIENT: 전송 완료, Total Segments: {}",
                self.stats.segments_sent
            );
        }

        Ok(AckOutcome::Matched)
    }

    /// 타임아웃 + 재전송 루프
    ///
    /// 시퀀스가 맞지 않는 ACK은 재전송 횟수에 포함하지 않는다.
    /// 같은 deadline 안에서 계속 기다린다.
    pub async fn retransmit_loop(&mut self) -> Result<()> {
        let Some(sequence) = self.in_flight_sequence() else {
            return Ok(());
        };

        let timeout = self.config.ack_timeout();
        self.set_timeout(Some(timeout));
        let mut deadline = Instant::now() + timeout;

        loop {
            match self.await_ack_until(Some(deadline)).await? {
                AckOutcome::Matched => {
                    self.consecutive_retries = 0;
                    self.set_timeout(None);
                    return Ok(());
                }
                AckOutcome::Stale => continue,
                AckOutcome::TimedOut => {
                    self.consecutive_retries += 1;
                    if self.consecutive_retries > self.config.max_retries {
                        error!(
                            "CLIENT: Maximum Retries Exceeded (SEQ#{}, {} retries)",
                            sequence, self.config.max_retries
                        );
                        return Err(Error::RetriesExhausted {
                            sequence,
                            retries: self.config.max_retries,
                        });
                    }

                    warn!(
                        "CLIENT: TIMEOUT ALERT, re-sending SEQ#{} (retry {}/{})",
                        sequence, self.consecutive_retries, self.config.max_retries
                    );
                    self.retransmit().await?;
                    deadline = Instant::now() + timeout;
                }
            }
        }
    }

    /// 일반 모드: 맞는 ACK이 올 때까지 블로킹 대기
    async fn wait_for_ack(&mut self) -> Result<()> {
        loop {
            if self.await_ack().await? == AckOutcome::Matched {
                return Ok(());
            }
        }
    }

    /// 전송 중인 세그먼트의 프레임을 그대로 재전송
    async fn retransmit(&mut self) -> Result<()> {
        let Some(in_flight) = &self.in_flight else {
            return Ok(());
        };
        let frame = in_flight.frame.clone();

        self.transport.send_to(&frame, self.peer).await?;

        self.stats.segments_sent += 1;
        self.stats.retransmissions += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    /// 아직 ACK되지 않은 레코드부터 최대 batch_size개 reading 읽기
    ///
    /// 잘못된 레코드는 건너뛰지만 소비한 레코드 수에는 포함된다.
    fn read_batch(&mut self) -> Result<(Vec<Reading>, usize)> {
        let batch_size = self.config.batch_size;
        let mut readings = Vec::with_capacity(batch_size);
        let mut consumed = 0;

        while readings.len() < batch_size {
            let wanted = batch_size - readings.len();
            let records = self
                .source
                .read_records(self.consumed_records + consumed, wanted)?;
            if records.is_empty() {
                break;
            }

            for record in &records {
                consumed += 1;
                match Reading::parse_record(record) {
                    Ok(reading) => readings.push(reading),
                    Err(e) => {
                        self.stats.skipped_records += 1;
                        if self.config.malformed_policy == MalformedPolicy::Warn {
                            warn!(
                                "CLIENT: 잘못된 레코드 건너뜀 (#{}): {}",
                                self.consumed_records + consumed,
                                e
                            );
                        }
                    }
                }
            }
        }

        Ok((readings, consumed))
    }

    fn encode_checked(&self, segment: &Segment) -> Result<Vec<u8>> {
        let frame = segment.encode()?;
        if frame.len() > self.config.max_segment_size {
            return Err(Error::SegmentTooLarge {
                size: frame.len(),
                max_size: self.config.max_segment_size,
            });
        }
        Ok(frame)
    }

    /// 수신 타임아웃 설정 (None이면 블로킹)
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    /// 모든 reading이 ACK되었는지
    pub fn is_complete(&self) -> bool {
        self.acked_readings >= self.total_readings
    }

    pub fn in_flight_sequence(&self) -> Option<u8> {
        self.in_flight.as_ref().map(|f| f.segment.sequence)
    }

    pub fn total_readings(&self) -> usize {
        self.total_readings
    }

    pub fn acked_readings(&self) -> usize {
        self.acked_readings
    }

    pub fn consecutive_retries(&self) -> u32 {
        self.consecutive_retries
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 현재까지의 전송 결과
    pub fn report(&self) -> SenderReport {
        SenderReport {
            total_readings: self.total_readings,
            acked_readings: self.acked_readings,
            segments_sent: self.stats.segments_sent,
            retransmissions: self.stats.retransmissions,
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::Mode;

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    /// 스크립트된 전송: inbox가 비어 있으면 타임아웃
    #[derive(Default)]
    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        inbox: VecDeque<Vec<u8>>,
        auto_ack: bool,
        /// auto_ack일 때 삼킬 ACK 수 (ACK 손실)
        swallow: usize,
    }

    impl ScriptedTransport {
        fn auto_ack() -> Self {
            Self {
                auto_ack: true,
                ..Self::default()
            }
        }

        fn push_ack(&mut self, sequence: u8) {
            self.inbox.push_back(Segment::ack(sequence).encode().unwrap());
        }

        fn sent_segments(&self) -> Vec<Segment> {
            self.sent
                .iter()
                .map(|bytes| Segment::decode(bytes).unwrap())
                .collect()
        }

        fn data_sequences(&self) -> Vec<u8> {
            self.sent_segments()
                .iter()
                .filter(|s| s.kind == SegmentKind::Data)
                .map(|s| s.sequence)
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send_to(&mut self, bytes: &[u8], _dest: SocketAddr) -> Result<()> {
            self.sent.push(bytes.to_vec());
            if self.auto_ack {
                let segment = Segment::decode(bytes)?;
                if segment.kind == SegmentKind::Data {
                    if self.swallow > 0 {
                        self.swallow -= 1;
                    } else {
                        self.push_ack(segment.sequence);
                    }
                }
            }
            Ok(())
        }

        async fn recv_from(
            &mut self,
            buf: &mut [u8],
            _timeout: Option<Duration>,
        ) -> Result<Option<(usize, SocketAddr)>> {
            match self.inbox.pop_front() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(Some((bytes.len(), peer())))
                }
                None => Ok(None),
            }
        }

        fn local_addr(&self) -> Result<SocketAddr> {
            Ok("127.0.0.1:9001".parse().unwrap())
        }
    }

    fn records(n: usize) -> Vec<String> {
        (0..n)
            .map(|i| format!("sensor-{i},{},{}.5,{},-{}", 1_700_000_000_000i64 + i as i64, i, i * 2, i))
            .collect()
    }

    fn session(
        config: Config,
        transport: ScriptedTransport,
        input: Vec<String>,
    ) -> SenderSession<ScriptedTransport, Vec<String>> {
        SenderSession::new(config, transport, input, peer(), "out.csv")
    }

    fn fast_timeout(max_retries: u32) -> Config {
        Config {
            timeout_ms: 10,
            max_retries,
            ..Config::timeout_mode()
        }
    }

    #[tokio::test]
    async fn test_sequence_alternation_without_loss() {
        let config = Config {
            batch_size: 4,
            ..Config::default()
        };
        let mut sender = session(config, ScriptedTransport::auto_ack(), records(10));

        let report = sender.run().await.unwrap();

        assert_eq!(report.total_readings, 10);
        assert_eq!(report.acked_readings, 10);
        assert_eq!(report.segments_sent, 3);
        assert_eq!(report.retransmissions, 0);

        let segments = sender.transport().sent_segments();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].kind, SegmentKind::Meta);
        assert_eq!(segments[0].payload, "10,out.csv,4");
        assert_eq!(sender.transport().data_sequences(), vec![1, 0, 1]);

        let counts: Vec<usize> = segments[1..].iter().map(|s| s.reading_count()).collect();
        assert_eq!(counts, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_retry_bound_sends_identical_copies() {
        let mut sender = session(fast_timeout(3), ScriptedTransport::default(), records(2));

        let err = sender.run().await.unwrap_err();
        assert!(matches!(
            err,
            Error::RetriesExhausted {
                sequence: 1,
                retries: 3
            }
        ));

        let sent = &sender.transport().sent;
        // Meta 1개 + 원본 1개 + 재전송 3개
        assert_eq!(sent.len(), 5);
        assert!(sent[1..].iter().all(|frame| frame == &sent[1]));
        assert_eq!(sender.stats().segments_sent, 4);
        assert_eq!(sender.stats().retransmissions, 3);
        assert_eq!(sender.acked_readings(), 0);
    }

    #[tokio::test]
    async fn test_stale_ack_does_not_consume_retry_budget() {
        let mut transport = ScriptedTransport::default();
        transport.push_ack(0);
        transport.push_ack(0);
        transport.push_ack(1);
        let mut sender = session(fast_timeout(0), transport, records(3));

        let report = sender.run().await.unwrap();

        assert_eq!(report.acked_readings, 3);
        assert_eq!(report.segments_sent, 1);
        assert_eq!(report.stats.stale_acks, 2);
        assert_eq!(sender.consecutive_retries(), 0);
    }

    #[tokio::test]
    async fn test_retransmission_keeps_alternation() {
        let config = Config {
            batch_size: 1,
            ..fast_timeout(2)
        };
        let transport = ScriptedTransport {
            swallow: 1,
            ..ScriptedTransport::auto_ack()
        };
        let mut sender = session(config, transport, records(2));

        let report = sender.run().await.unwrap();

        assert_eq!(report.segments_sent, 3);
        assert_eq!(report.retransmissions, 1);
        assert_eq!(sender.transport().data_sequences(), vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn test_build_rejected_while_ack_outstanding() {
        let mut sender = session(Config::default(), ScriptedTransport::default(), records(6));
        sender.announce().await.unwrap();

        assert_eq!(sender.build_and_send_next().await.unwrap(), Some(1));
        assert!(matches!(
            sender.build_and_send_next().await,
            Err(Error::SegmentInFlight { sequence: 1 })
        ));
        assert_eq!(sender.stats().segments_sent, 1);
    }

    #[tokio::test]
    async fn test_await_ack_outcomes() {
        let mut sender = session(Config::default(), ScriptedTransport::default(), records(2));
        sender.announce().await.unwrap();
        sender.set_timeout(Some(Duration::from_millis(5)));

        // 전송 중인 세그먼트가 없으면 어떤 ACK이든 Stale
        sender.transport.push_ack(1);
        assert_eq!(sender.await_ack().await.unwrap(), AckOutcome::Stale);

        sender.build_and_send_next().await.unwrap();
        assert_eq!(sender.await_ack().await.unwrap(), AckOutcome::TimedOut);

        sender.transport.push_ack(0);
        assert_eq!(sender.await_ack().await.unwrap(), AckOutcome::Stale);
        assert_eq!(sender.acked_readings(), 0);

        sender.transport.push_ack(1);
        assert_eq!(sender.await_ack().await.unwrap(), AckOutcome::Matched);
        assert_eq!(sender.acked_readings(), 2);
        assert!(sender.is_complete());
        assert_eq!(sender.in_flight_sequence(), None);
    }

    #[tokio::test]
    async fn test_malformed_ack_is_fatal() {
        let mut sender = session(Config::default(), ScriptedTransport::default(), records(1));
        sender.announce().await.unwrap();
        sender.build_and_send_next().await.unwrap();

        sender.transport.inbox.push_back(vec![0xde, 0xad]);
        assert!(matches!(
            sender.await_ack().await,
            Err(Error::MalformedSegment(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let input = vec![
            "a,1,1,1,1".to_string(),
            "garbage".to_string(),
            "b,2,2,2,2".to_string(),
            "c,3".to_string(),
            "d,4,4,4,4".to_string(),
        ];
        let config = Config {
            batch_size: 2,
            malformed_policy: MalformedPolicy::Skip,
            ..Config::default()
        };
        let mut sender = session(config, ScriptedTransport::auto_ack(), input);

        let report = sender.run().await.unwrap();

        assert_eq!(report.total_readings, 3);
        assert_eq!(report.segments_sent, 2);
        assert_eq!(report.stats.skipped_records, 2);

        let payloads: Vec<String> = sender
            .transport()
            .sent_segments()
            .into_iter()
            .filter(|s| s.kind == SegmentKind::Data)
            .map(|s| s.payload)
            .collect();
        assert_eq!(payloads, vec!["a,1,1,1,1;b,2,2,2,2", "d,4,4,4,4"]);
    }

    #[tokio::test]
    async fn test_empty_input_completes_after_meta() {
        let mut sender = session(
            Config {
                mode: Mode::Timeout,
                ..Config::default()
            },
            ScriptedTransport::default(),
            Vec::new(),
        );

        let report = sender.run().await.unwrap();

        assert_eq!(report.total_readings, 0);
        assert_eq!(report.segments_sent, 0);
        assert_eq!(sender.transport().sent.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_segment_rejected() {
        let config = Config {
            batch_size: 100,
            max_segment_size: 256,
            ..Config::default()
        };
        let mut sender = session(config, ScriptedTransport::default(), records(50));
        sender.announce().await.unwrap();

        assert!(matches!(
            sender.build_and_send_next().await,
            Err(Error::SegmentTooLarge { max_size: 256, .. })
        ));
    }

    #[tokio::test]
    async fn test_sensor_id_with_reading_delimiter_is_skipped() {
        let input = vec!["a;b,1,1,1,1".to_string(), "c,2,2,2,2".to_string()];
        let config = Config {
            batch_size: 1,
            malformed_policy: MalformedPolicy::Skip,
            ..Config::default()
        };
        let mut sender = session(config, ScriptedTransport::auto_ack(), input);

        let report = sender.run().await.unwrap();

        assert_eq!(report.total_readings, 1);
        assert_eq!(report.acked_readings, 1);
        assert_eq!(report.stats.skipped_records, 1);

        let payloads: Vec<String> = sender
            .transport()
            .sent_segments()
            .into_iter()
            .filter(|s| s.kind == SegmentKind::Data)
            .map(|s| s.payload)
            .collect();
        assert_eq!(payloads, vec!["c,2,2,2,2"]);
    }
}
