use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geocad_config::{AppConfig, ConfigError};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod cli;
mod error;
mod request;
mod routes;
mod server;

#[derive(Debug, Parser)]
#[command(name = "geocad-app", version, about = "把 OSM 要素转换为 DXF 图纸")]
struct Cli {
    /// 配置文件路径，缺省时查找 GEOCAD_CONFIG 与 ./config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 启动 HTTP 任务服务
    Serve {
        /// 覆盖配置中的监听地址
        #[arg(long)]
        bind: Option<String>,
    },
    /// 把 JSON 请求文件转换为 DXF
    Convert {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// 查看 DXF 文件概览
    Inspect { path: PathBuf },
}

fn main() {
    let args = Cli::parse();
    let (mut config, config_error) = load_configuration(args.config.as_deref());
    init_logging(&config);
    if let Some(err) = &config_error {
        report_configuration_error(err);
    }

    let result = match args.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            info!(bind = %config.server.bind, "以服务模式启动");
            run_server(config)
        }
        Command::Convert { input, output } => cli::run_convert(&input, &output),
        Command::Inspect { path } => cli::run_inspect(&path),
    };

    if let Err(err) = result {
        error!(error = %format!("{err:#}"), "执行失败");
        std::process::exit(1);
    }
}

fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(config))
}

/// 配置加载失败时退回默认值；错误一并返回，待日志初始化后再记录。
fn load_configuration(explicit: Option<&std::path::Path>) -> (AppConfig, Option<ConfigError>) {
    match AppConfig::discover(explicit) {
        Ok(cfg) => (cfg, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn report_configuration_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载配置失败，使用内建默认值");
        }
        ConfigError::Invalid { .. } | ConfigError::Context { .. } => {
            warn!(error = %err, "加载配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
