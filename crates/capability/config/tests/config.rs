use plcgw_config::{AppConfig, ConfigError};
use std::time::Duration;

// 环境变量是进程级状态，所有断言放在同一个测试里顺序执行。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("PLCGW_CONFIG_PATH", "/etc/plcgw/gateway.json");
        std::env::set_var("PLCGW_SIMULATE", "on");
        std::env::set_var("PLCGW_FAILURE_THRESHOLD", "5");
        std::env::set_var("PLCGW_RECONNECT_INTERVAL_MS", "2000");
        std::env::set_var("PLCGW_RECONNECT_MAX_INTERVAL_MS", "1000");
        std::env::set_var("PLCGW_STATUS_INTERVAL_SECS", "0");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.config_path.as_deref(), Some("/etc/plcgw/gateway.json"));
    assert!(config.simulate);
    assert_eq!(config.failure_threshold, 5);
    assert_eq!(config.reconnect_interval(), Duration::from_millis(2000));
    // 上限不低于初始间隔
    assert_eq!(config.reconnect_max_interval(), Duration::from_millis(2000));
    assert_eq!(config.dispatch_timeout(), Duration::from_millis(5000));
    assert_eq!(config.event_capacity, 1024);
    assert!(config.status_interval().is_none());

    unsafe {
        std::env::set_var("PLCGW_FAILURE_THRESHOLD", "many");
    }
    let err = AppConfig::from_env().expect_err("invalid threshold");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "PLCGW_FAILURE_THRESHOLD"));
}
