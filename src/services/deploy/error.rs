//! 部署周期错误
//!
//! 这里的每个变体都会终止整个周期；拉取失败不属于错误，记录在服务结果中

use std::path::PathBuf;
use thiserror::Error;

use crate::infra::{ChannelError, CommandError};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to prepare workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// `repo` 与 `message` 均已脱敏
    #[error("failed to clone {repo}: {message}")]
    Clone { repo: String, message: String },

    /// 运行时命令以非零码退出
    #[error("{step} failed for {service}: {detail}")]
    Command {
        service: String,
        step: &'static str,
        detail: String,
    },

    #[error("{step} failed for {service}: {source}")]
    Channel {
        service: String,
        step: &'static str,
        #[source]
        source: CommandError,
    },

    #[error("staging failed for {service}: {source}")]
    Staging {
        service: String,
        #[source]
        source: ChannelError,
    },

    #[error("deployment cycle aborted: {0}")]
    Aborted(String),
}

impl DeployError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
