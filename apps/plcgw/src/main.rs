//! PLC 网关守护进程：装配配置存储、连接监管器、触发引擎与发布下游。

use plcgw::{Gateway, assembly};
use plcgw_config::AppConfig;
use plcgw_store::InMemoryConfigStore;
use plcgw_supervisor::Supervisor;
use plcgw_telemetry::{GatewayMetrics, MemoryEventLog, init_tracing};
use plcgw_trigger::TriggerEngine;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    // 配置存储：指定文件时每次编辑写回该文件
    let store = Arc::new(match &config.config_path {
        Some(path) => InMemoryConfigStore::load_file(path)?,
        None => InMemoryConfigStore::new(),
    });
    let log = Arc::new(MemoryEventLog::new(config.log_buffer));
    let metrics = Arc::new(GatewayMetrics::new());

    let supervisor = Supervisor::new(
        assembly::driver_registry(config.simulate),
        assembly::supervisor_settings(&config),
        log.clone(),
        metrics.clone(),
    );
    let (hub, transports) = assembly::sink_hub(store.as_ref())?;
    let engine = TriggerEngine::new(
        Arc::new(supervisor.clone()),
        Arc::new(hub),
        assembly::engine_settings(&config),
        log,
        metrics,
    );

    let gateway = Gateway::new(store, supervisor, engine);
    gateway.bootstrap().await?;

    // 周期性状态汇总
    let reporter = config.status_interval().map(|every| {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                gateway.log_status();
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    info!(target: "plcgw.app", "shutdown_requested");
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    gateway.shutdown().await;
    for transport in transports {
        transport.abort();
    }
    Ok(())
}
