//! 服务定义与密钥

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::env::constants::{MANIFEST_FILE, SECRET_FILE};

/// 一个可部署服务（定义目录下含 compose 清单的子目录）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// 目录名
    pub name: String,
    /// 本地定义目录
    pub definition_path: PathBuf,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, definition_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            definition_path: definition_path.into(),
        }
    }

    /// compose 清单路径
    pub fn manifest_path(&self) -> PathBuf {
        self.definition_path.join(MANIFEST_FILE)
    }

    /// 定义目录是否直接包含 compose 清单
    pub fn has_manifest(&self) -> bool {
        self.manifest_path().is_file()
    }
}

/// `.env` 下发结果
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecretProvision {
    /// 目标已存在，未改动
    AlreadyPresent,
    /// 从密钥仓库复制
    Copied,
    /// 两边都没有，服务无密钥运行
    Missing,
}

/// 服务的 `.env` 密钥
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretBundle {
    pub service_name: String,
    /// 同步下来的密钥仓库中的位置
    pub source_path: PathBuf,
    /// 运行时期望的位置
    pub destination_path: PathBuf,
}

impl SecretBundle {
    /// `<deploy>/secrets/<name>/.env` -> `<deploy>/compose/<name>/.env`
    pub fn for_service(service: &ServiceDefinition, secrets_root: &Path) -> Self {
        Self {
            service_name: service.name.clone(),
            source_path: secrets_root.join(&service.name).join(SECRET_FILE),
            destination_path: service.definition_path.join(SECRET_FILE),
        }
    }
}
