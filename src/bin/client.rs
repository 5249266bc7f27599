//! SARQ 클라이언트 (송신자)
//!
//! CSV 파일의 센서 reading을 stop-and-wait 방식으로 서버에 전송
//!
//! 사용법:
//!   cargo run --release --bin sarq-client -- [OPTIONS]
//!
//! 예시:
//!   # 일반 전송
//!   cargo run --release --bin sarq-client -- -s 127.0.0.1:9000 -f readings.csv -o out.txt
//!
//!   # 타임아웃 + 재전송
//!   cargo run --release --bin sarq-client -- -f readings.csv -o out.txt --mode wt --timeout 500

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sarq::{Config, CsvFile, SenderSession, UdpTransport};

/// 클라이언트 설정
struct ClientConfig {
    bind_addr: SocketAddr,
    server_addr: SocketAddr,
    file_path: Option<PathBuf>,
    output_name: Option<String>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            server_addr: SocketAddr::from(([127, 0, 0, 1], 9000)),
            file_path: None,
            output_name: None,
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"SARQ Client - Stop-and-wait ARQ 송신자

CSV 파일의 센서 reading을 배치 단위 Data 세그먼트로 전송
- 교대 비트 시퀀스 (윈도우 크기 1)
- 타임아웃 모드에서 세그먼트당 재전송 횟수 제한

사용법:
  cargo run --release --bin sarq-client -- [OPTIONS]

옵션:
  -b, --bind <ADDR>       로컬 바인드 주소 (기본: 0.0.0.0:0 = 자동 할당)
  -s, --server <ADDR>     서버 주소 (기본: 127.0.0.1:9000)
  -f, --file <PATH>       전송할 CSV 파일 (필수)
  -o, --output <NAME>     서버에 생성할 출력 파일 이름 (필수)
  -n, --batch <N>         Data 세그먼트당 reading 수 (기본: 5)
  -m, --mode <MODE>       nm | wt | wl (기본: nm)
  --timeout <MS>          ACK 타임아웃 밀리초 (기본: 1000)
  --retries <N>           세그먼트당 최대 연속 재전송 (기본: 4)
  --quiet-skip            잘못된 레코드를 경고 없이 건너뜀
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

fn parse_args() -> Result<ClientConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--bind" | "-b" => {
                config.bind_addr = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--server" | "-s" => {
                config.server_addr = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--file" | "-f" => {
                config.file_path = Some(PathBuf::from(value(&args, i, flag)?));
                i += 1;
            }
            "--output" | "-o" => {
                config.output_name = Some(value(&args, i, flag)?.to_string());
                i += 1;
            }
            "--batch" | "-n" => {
                config.config.batch_size = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--mode" | "-m" => {
                config.config.mode = value(&args, i, flag)?
                    .parse()
                    .map_err(|e| format!("{e}"))?;
                i += 1;
            }
            "--timeout" => {
                config.config.timeout_ms = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--retries" => {
                config.config.max_retries = parse(value(&args, i, flag)?, flag)?;
                i += 1;
            }
            "--quiet-skip" => {
                config.config.malformed_policy = sarq::MalformedPolicy::Skip;
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

    let client_config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}\n\n{HELP}");
            return ExitCode::from(2);
        }
    };

    let (Some(file_path), Some(output_name)) =
        (client_config.file_path.clone(), client_config.output_name.clone())
    else {
        eprintln!("--file 과 --output 은 필수\n\n{HELP}");
        return ExitCode::from(2);
    };

    if !file_path.exists() {
        error!("CLIENT: File Does Not Exist: {}", file_path.display());
        return ExitCode::FAILURE;
    }

    info!("SARQ Client starting...");
    info!("Server address: {}", client_config.server_addr);
    info!("Mode: {}", client_config.config.mode);
    info!("Batch size: {}", client_config.config.batch_size);

    let transport = match UdpTransport::bind(client_config.bind_addr).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("CLIENT: 소켓 바인딩 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut session = SenderSession::new(
        client_config.config,
        transport,
        CsvFile::new(file_path),
        client_config.server_addr,
        output_name,
    );

    let result = session.run().await;
    // 어떤 경로든 종료 전에 소켓을 닫는다
    drop(session);

    match result {
        Ok(report) => {
            info!(
                "Transfer complete: {}/{} readings, {} segments ({} retransmissions)",
                report.acked_readings,
                report.total_readings,
                report.segments_sent,
                report.retransmissions
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("CLIENT: 전송 실패: {}", e);
            ExitCode::FAILURE
        }
    }
}
