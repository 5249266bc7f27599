//! SARQ 서버 (수신자)
//!
//! Stop-and-wait 세그먼트를 받아 출력 디렉터리에 reading 파일 기록
//!
//! 사용법:
//!   cargo run --release --bin sarq-server -- [OPTIONS]
//!
//! 예시:
//!   # 기본 수신
//!   cargo run --release --bin sarq-server -- --bind 0.0.0.0:9000 --out-dir ./received
//!
//!   # ACK 30% 손실 시뮬레이션
//!   cargo run --release --bin sarq-server -- --mode wl --loss 0.3

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sarq::{Config, OutputDir, ReceiverSession, UdpTransport};

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    out_dir: PathBuf,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            out_dir: PathBuf::from("."),
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"SARQ Server - Stop-and-wait ARQ 수신자

Data 세그먼트를 검증하고 ACK 응답, 완료 시 출력 파일 기록
- 체크섬 불일치 세그먼트는 ACK 없이 폐기
- 중복 세그먼트는 이전 ACK 재전송
- wl 모드에서 확률적 ACK 손실 시뮬레이션

사용법:
  cargo run --release --bin sarq-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       바인드 주소 (기본: 0.0.0.0:9000)
  -d, --out-dir <PATH>    출력 디렉터리 (기본: .)
  -m, --mode <MODE>       nm | wt | wl (기본: nm)
  -l, --loss <P>          ACK 손실 확률 0.0~1.0 (wl 모드, 기본: 0.0)
  --idle-timeout <MS>     유휴 타임아웃 밀리초 (기본: 2000)
  --seed <N>              손실 시뮬레이션 RNG 시드
  -h, --help              이 도움말 출력
"#;

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} 값 필요"))
}

fn parse<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse().map_err(|_| format!("{flag}: 유효하지 않은 값 {raw:?}"))
}

fn parse_args() -> Result<ServerConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--bind" | "-b" => {
                config.bind_addr = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--out-dir" | "-d" => {
                config.out_dir = PathBuf::from(value(&args, i, flag)?);
                i += 1;
            }
            "--mode" | "-m" => {
                config.config.mode = value(&args, i, flag)?
                    .parse()
                    .map_err(|e| format!("{e}"))?;
                i += 1;
            }
            "--loss" | "-l" => {
                config.config.ack_loss_probability = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--idle-timeout" => {
                config.config.idle_timeout_ms = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--seed" => {
                config.config.rng_seed = Some(parse(value(&args, i, flag)?, flag)?);
                i += 1;
            }
            "--help" | "-h" => {
                println!("{HELP}");
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {other}")),
        }
        i += 1;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server_config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}\n\n{HELP}");
            return ExitCode::from(2);
        }
    };

    info!("SARQ Server starting...");
    info!("Bind address: {}", server_config.bind_addr);
    info!("Output directory: {}", server_config.out_dir.display());
    info!("Mode: {}", server_config.config.mode);

    let transport = match UdpTransport::bind(server_config.bind_addr).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("SERVER: 소켓 바인딩 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut session = ReceiverSession::new(
        server_config.config,
        transport,
        OutputDir::new(server_config.out_dir),
    );

    let result = session.run().await;
    drop(session);

    match result {
        Ok(report) if report.completed => {
            info!("Transfer complete: {} readings", report.readings);
            info!("{}", report.stats.summary());
            ExitCode::SUCCESS
        }
        Ok(report) => {
            info!(
                "SERVER: 전송 미완료로 종료 ({} readings 수신)",
                report.readings
            );
            info!("{}", report.stats.summary());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("SERVER: 수신 실패: {}", e);
            ExitCode::FAILURE
        }
    }
}
