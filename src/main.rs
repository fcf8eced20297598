use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use std::path::PathBuf;
use shot_detection::{
    config::{ConfigLoader, ConfigOverrides, ServiceConfig},
    handler::{self, AppState},
    ApiError, ContentShotDetector, DetectShotsResponse, ShotDetector,
};

/// 镜头检测服务 - 基于内容变化检测视频中的镜头边界
#[derive(Parser, Debug)]
#[command(name = "shot-detection")]
#[command(about = "镜头检测服务：检测视频镜头边界并以 JSON 返回", long_about = None)]
struct Args {
    /// 不指定子命令时启动 Web 服务
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Web 服务模式：启动 HTTP 服务器
    Serve {
        /// 监听地址（默认 0.0.0.0:$PORT，PORT 未设置时为 5000）
        #[arg(short, long)]
        bind: Option<String>,

        /// 配置文件路径（.ini 格式）
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// CLI 模式：检测本地视频文件并输出 JSON
    Detect {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: String,

        /// 配置文件路径（.ini 格式）
        /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
        #[arg(long)]
        config: Option<PathBuf>,

        /// 内容变化阈值，越低越敏感
        /// 可通过环境变量 SHOT_DETECTION_THRESHOLD 或配置文件设置
        #[arg(long)]
        threshold: Option<f64>,

        /// 最小镜头长度（帧）
        /// 可通过环境变量 SHOT_DETECTION_MIN_SCENE_LEN 或配置文件设置
        #[arg(long)]
        min_scene_len: Option<u64>,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 输出路径
        #[arg(default_value = "shot-detection.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command.unwrap_or(Commands::Serve { bind: None, config: None }) {
        Commands::Serve { bind, config } => {
            let config = ConfigLoader::load(config.as_deref(), ConfigOverrides::default())
                .context("failed to load configuration")?;
            init_logging(&config);

            // 优先使用命令行参数，其次使用 PORT 环境变量 / 配置文件，最后使用默认端口
            let bind_addr = bind.unwrap_or_else(|| config.bind_addr());
            start_web_server(&bind_addr, config).await?;
        }
        Commands::Detect {
            input,
            config: config_file,
            threshold,
            min_scene_len,
        } => {
            let overrides = ConfigOverrides {
                threshold,
                min_scene_len,
                ..Default::default()
            };
            let config = ConfigLoader::load(config_file.as_deref(), overrides)
                .context("failed to load configuration")?;
            init_logging(&config);

            run_detect(&input, config).await?;
        }
        Commands::InitConfig { path } => {
            ConfigLoader::create_default_config(&path)?;
            println!("已生成默认配置文件: {}", path.display());
        }
    }

    Ok(())
}

/// 初始化日志，RUST_LOG 优先于配置中的日志级别；日志写到 stderr，stdout 只输出结果
fn init_logging(config: &ServiceConfig) {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn start_web_server(bind: &str, config: ServiceConfig) -> Result<()> {
    let detector = ContentShotDetector::new(config.detection.clone());
    let app = handler::create_app(AppState::new(detector));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("failed to bind address: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 镜头检测: POST http://{}/detect-shots", bind);
    tracing::info!("  • 检测参数: threshold={:.1}, min_scene_len={}",
        config.detection.threshold, config.detection.min_scene_len);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭服务...");
}

/// 检测本地文件，与 HTTP 接口使用相同的校验和错误分类
async fn run_detect(input: &str, config: ServiceConfig) -> Result<()> {
    let result = async move {
        let video_path = handler::check_video_path(input)?;
        let detector = ContentShotDetector::new(config.detection);
        let scenes = tokio::task::spawn_blocking(move || detector.detect(&video_path))
            .await
            .map_err(|e| ApiError::Internal(format!("detection task failed: {}", e)))??;
        Ok::<_, ApiError>(DetectShotsResponse::from_scenes(&scenes))
    }
    .await;

    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_response())?);
            Err(anyhow::anyhow!("detection failed ({}): {}", e.status_code(), e))
        }
    }
}
