//! 환율 수집기 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 어제 하루치 수집 (설정 기본값)
//! fx-collector run
//!
//! # 기간과 통화 지정, 스테이징 병합
//! fx-collector run --start-date 2024-01-30 --end-date 2024-02-01 --currencies EUR,GBP --strategy merge
//!
//! # HTTP 트리거 서버
//! fx-collector --config config/default.toml serve --port 8080
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fx_collector::{create_router, IngestRequest, Orchestrator};
use fx_core::config::DEFAULT_CONFIG_PATH;
use fx_core::logging::{init_logging, LogConfig};
use fx_core::{parse_currency_list, DateToken, FxConfig, LoadStrategy};
use fx_data::{EcbRateSource, PgRateStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fx-collector")]
#[command(about = "일별 환율 수집기 (ECB 이력 → PostgreSQL)", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 한 번 수집 후 종료
    Run {
        /// 시작일 (YYYY-MM-DD 또는 yesterday)
        #[arg(long)]
        start_date: Option<DateToken>,

        /// 종료일 (YYYY-MM-DD 또는 yesterday)
        #[arg(long)]
        end_date: Option<DateToken>,

        /// 수집 통화 (쉼표로 구분, 예: "EUR,GBP")
        #[arg(long)]
        currencies: Option<String>,

        /// 적재 전략 (delete_insert, merge)
        #[arg(long)]
        strategy: Option<LoadStrategy>,
    },

    /// HTTP 트리거 서버 실행
    Serve {
        /// 바인딩할 호스트 (기본: 설정 파일)
        #[arg(long)]
        host: Option<String>,

        /// 포트 (기본: 설정 파일)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 로깅 초기화
    let filter = ["fx_collector", "fx_data", "fx_core", "tower_http"]
        .iter()
        .map(|module| format!("{}={}", module, cli.log_level))
        .collect::<Vec<_>>()
        .join(",");
    init_logging(LogConfig::new(filter).with_env_format())
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    info!("FX Collector 시작");

    // 설정 로드
    let config = FxConfig::load(&cli.config)
        .with_context(|| format!("설정 로드 실패: {}", cli.config.display()))?;
    info!(
        target_table = %config.target,
        source = %config.source.url,
        base = %config.ingest.base_currency,
        "설정 로드 완료"
    );

    // DB 연결
    let store = PgRateStore::connect(&config.database)
        .await
        .context("데이터베이스 연결 실패")?;

    let source = EcbRateSource::new(&config.source)?
        .with_required_column(config.ingest.base_currency.clone());
    let orchestrator = Orchestrator::from_config(
        &config,
        Arc::new(source),
        Arc::new(store.clone()),
    );

    let result = match cli.command {
        Commands::Run {
            start_date,
            end_date,
            currencies,
            strategy,
        } => {
            let currencies = currencies
                .as_deref()
                .map(parse_currency_list)
                .transpose()?;
            let request = IngestRequest {
                start: start_date,
                end: end_date,
                currencies,
                strategy,
            };
            run_once(&orchestrator, request).await
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(Arc::new(orchestrator), &host, port).await
        }
    };

    store.close().await;
    info!("FX Collector 종료");

    result
}

/// 한 번 수집.
async fn run_once(orchestrator: &Orchestrator, request: IngestRequest) -> Result<()> {
    match orchestrator.run(request).await {
        Ok(summary) => {
            summary.log_summary("환율 수집");
            Ok(())
        }
        Err(err) => {
            err.summary.log_summary("환율 수집");
            Err(err.error).context("환율 수집 실패")
        }
    }
}

/// HTTP 트리거 서버.
async fn serve(orchestrator: Arc<Orchestrator>, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("잘못된 바인딩 주소: {}:{}", host, port))?;

    let app = create_router(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("포트 바인딩 실패: {}", addr))?;
    info!(addr = %addr, "HTTP 트리거 대기 중");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("서버 실행 실패")?;

    info!("서버 종료");
    Ok(())
}

/// Ctrl+C 또는 SIGTERM 대기.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C 핸들러 설치 실패");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM 핸들러 설치 실패");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Ctrl+C 수신, 종료 중..."),
        _ = terminate => warn!("SIGTERM 수신, 종료 중..."),
    }
}
