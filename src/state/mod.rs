//! 运行时状态模块
//!
//! 管理应用状态、周期锁和最近一次部署报告

pub mod app_state;

pub use app_state::{get_shutdown_token, trigger_shutdown, AppState};
