//! lanxfer 수신자
//!
//! 디스커버리 요청에 응답하면서 송신자 연결 하나를 기다려 받는다.
//!
//! 사용법:
//!   cargo run --release --bin lanxfer-recv -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin lanxfer-recv -- --output ./inbox

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use lanxfer::{Config, TransferEngine, TransferEvent};

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

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--output" | "-o" => {
                config.output_dir = value::<PathBuf>(&args, i, "경로");
                i += 1;
            }
            "--port" | "-p" => {
                config.transfer_port = value(&args, i, "포트");
                i += 1;
            }
            "--discovery-port" => {
                config.discovery_port = value(&args, i, "포트");
                i += 1;
            }
            "--bind-ip" => {
                config.local_ip = Some(value::<IpAddr>(&args, i, "IP 주소"));
                i += 1;
            }
            "--loopback" => {
                config.local_ip = Some(IpAddr::from([127, 0, 0, 1]));
            }
            "--timeout" | "-t" => {
                let secs: u64 = value(&args, i, "초");
                config = config.with_timeout(Duration::from_secs(secs));
                i += 1;
            }
            "--buffer-size" => {
                config.buffer_size = value(&args, i, "바이트 수");
                i += 1;
            }
            "--help" | "-h" => {
                println!(
                    r#"lanxfer-recv - LAN 파일/폴더 수신

디스커버리 요청에 응답하고 송신자 연결 하나를 받아 저장

사용법:
  cargo run --release --bin lanxfer-recv -- [OPTIONS]

옵션:
  -o, --output <DIR>        저장 디렉토리 (기본: 현재 디렉토리)
  -p, --port <PORT>         TCP 전송 포트 (기본: 60001)
  --discovery-port <PORT>   디스커버리 요청 포트 (기본: 60002)
  --bind-ip <IP>            로컬 IP 고정 (기본: 자동)
  -t, --timeout <SECS>      기본 타임아웃 초, 연결 대기는 5배 (기본: 60)
  --buffer-size <BYTES>     스트리밍 버퍼 크기 (기본: 16MB)
  --loopback                127.0.0.1에서 대기
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG 환경 변수로 조정 (기본: info)
"#
                );
                process::exit(0);
            }
            other => {
                eprintln!("알 수 없는 옵션: {}", other);
                process::exit(2);
            }
        }
        i += 1;
    }

    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();
    std::fs::create_dir_all(&config.output_dir)?;
    info!("저장 디렉토리: {:?}", config.output_dir);

    let (engine, mut events) = TransferEngine::new(config);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TransferEvent::Status(message) => println!("{}", message),
                TransferEvent::StatsUpdated(stats) => println!("{}", stats.summary()),
                TransferEvent::OperationCompleted { .. } => break,
            }
        }
    });

    let result = engine.receive().await;
    let _ = printer.await;

    match result {
        Ok(root) => {
            let stats = engine.stats();
            println!(
                "수신 완료: {:?} ({} files, {})",
                root,
                stats.completed_files,
                lanxfer::format_file_size(stats.transferred_bytes)
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("수신 실패 ({:?}): {}", e.kind(), e);
            process::exit(1);
        }
    }
}
