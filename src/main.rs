use anyhow::{Context, Result};
use clap::{Arg, Command};
use tokio::signal;
use tracing::{error, info};

use cluster_core::AppConfig;

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("cluster-scheduler")
        .version("0.1.0")
        .about("集群协调与分布式任务调度平台")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["dispatcher", "worker", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("node-id")
                .long("node-id")
                .value_name("ID")
                .help("节点标识，缺省时由主机名派生"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mode_str = matches.get_one::<String>("mode").unwrap();
    let node_id = matches.get_one::<String>("node-id");

    // 加载配置，命令行参数覆盖文件取值
    let mut config = AppConfig::load(config_path.map(|s| s.as_str()))
        .with_context(|| format!("加载配置失败: {config_path:?}"))?;
    if let Some(id) = node_id {
        config.worker.node_id = id.clone();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.clone();
    }

    cluster_core::logging::init_logging(&config.logging)?;

    info!("启动集群协调与任务调度平台");
    info!("运行模式: {mode_str}");

    let mode = match mode_str.as_str() {
        "dispatcher" => AppMode::Dispatcher,
        "worker" => AppMode::Worker,
        _ => AppMode::All,
    };

    let application = Application::new(config, mode).await?;
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;

    // ctrl-c触发优雅关闭
    let ctrl_c_manager = std::sync::Arc::new(shutdown_manager);
    {
        let manager = std::sync::Arc::clone(&ctrl_c_manager);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("收到ctrl-c信号");
                manager.shutdown().await;
            }
        });
    }

    if let Err(e) = application.run(shutdown_rx).await {
        error!("应用程序异常退出: {e}");
        return Err(e);
    }
    Ok(())
}
