//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod deploy;
pub mod service;
pub mod webhook;

// Re-exports for convenience
pub use deploy::{
    DeployStage, DeployStatus, DeploymentReport, ServiceOutcome, ServiceState, StageStatus,
};
pub use service::{SecretBundle, SecretProvision, ServiceDefinition};
pub use webhook::PushEvent;
