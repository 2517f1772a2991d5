//! lanxfer 송신자
//!
//! 브로드캐스트로 수신자를 찾은 뒤 파일 또는 폴더를 전송한다.
//!
//! 사용법:
//!   cargo run --release --bin lanxfer-send -- [OPTIONS] <PATH>
//!
//! 예시:
//!   # 폴더 전송
//!   cargo run --release --bin lanxfer-send -- ./photos
//!
//!   # 같은 호스트의 수신자에게 전송
//!   cargo run --release --bin lanxfer-send -- --loopback data.bin

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use lanxfer::{Config, TransferEngine, TransferEvent};

/// 송신자 설정
struct SendArgs {
    source: Option<PathBuf>,
    config: Config,
}

/// 옵션 값 파싱. 실패하면 종료
fn value<T: FromStr>(args: &[String], i: usize, what: &str) -> T {
    match args.get(i + 1).map(|v| v.parse()) {
        Some(Ok(v)) => v,
        _ => {
            eprintln!("{} 옵션에 유효한 {} 필요", args[i], what);
            process::exit(2);
        }
    }
}

fn parse_args() -> SendArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = SendArgs {
        source: None,
        config: Config::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--loopback" => {
                parsed.config.local_ip = Some(IpAddr::from(Ipv4Addr::LOCALHOST));
                parsed.config.broadcast_addr = Ipv4Addr::LOCALHOST;
            }
            "--port" | "-p" => {
                parsed.config.transfer_port = value(&args, i, "포트");
                i += 1;
            }
            "--discovery-port" => {
                parsed.config.discovery_port = value(&args, i, "포트");
                i += 1;
            }
            "--response-port" => {
                parsed.config.response_port = value(&args, i, "포트");
                i += 1;
            }
            "--broadcast" | "-b" => {
                parsed.config.broadcast_addr = value(&args, i, "IPv4 주소");
                i += 1;
            }
            "--bind-ip" => {
                parsed.config.local_ip = Some(value::<IpAddr>(&args, i, "IP 주소"));
                i += 1;
            }
            "--timeout" | "-t" => {
                let secs: u64 = value(&args, i, "초");
                parsed.config = parsed.config.clone().with_timeout(Duration::from_secs(secs));
                i += 1;
            }
            "--buffer-size" => {
                parsed.config.buffer_size = value(&args, i, "바이트 수");
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"lanxfer-send - LAN 파일/폴더 송신

같은 네트워크의 수신자를 UDP 브로드캐스트로 찾아 TCP로 전송

사용법:
  cargo run --release --bin lanxfer-send -- [OPTIONS] <PATH>

옵션:
  -p, --port <PORT>         TCP 전송 포트 (기본: 60001)
  --discovery-port <PORT>   디스커버리 요청 포트 (기본: 60002)
  --response-port <PORT>    디스커버리 응답 포트 (기본: 60003)
  -b, --broadcast <IP>      브로드캐스트 주소 (기본: 255.255.255.255)
  --bind-ip <IP>            로컬 IP 고정 (기본: 자동)
  -t, --timeout <SECS>      기본 타임아웃 초 (기본: 60)
  --buffer-size <BYTES>     스트리밍 버퍼 크기 (기본: 16MB)
  --loopback                같은 호스트 안에서 전송
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG 환경 변수로 조정 (기본: info)
"#
                );
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("알 수 없는 옵션: {}", other);
                process::exit(2);
            }
            other => parsed.source = Some(PathBuf::from(other)),
        }
        i += 1;
    }

    parsed
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();
    let Some(source) = args.source else {
        eprintln!("전송할 경로 필요 (--help 참고)");
        process::exit(2);
    };

    let (engine, mut events) = TransferEngine::new(args.config);

    let info = engine.path_info(&source.to_string_lossy())?;
    info!("전송 대상: {:?} ({})", info.path, info.size_display);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::Status(message) => println!("{}", message),
                TransferEvent::StatsUpdated(stats) => println!("{}", stats.summary()),
                TransferEvent::OperationCompleted { .. } => break,
            }
        }
    });

    let result = engine.send(&source).await;
    let _ = printer.await;

    let stats = engine.stats();
    match result {
        Ok(()) => {
            println!(
                "전송 완료: {} files, {}",
                stats.completed_files,
                lanxfer::format_file_size(stats.transferred_bytes)
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("전송 실패 ({:?}): {}", e.kind(), e);
            process::exit(1);
        }
    }
}
