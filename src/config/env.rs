//! 环境变量配置加载
//!
//! 启动时读取一次，之后以 `EnvConfig` 显式传递，组件不再读取进程环境

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// Webhook 共享密钥（为空表示未配置）
    pub webhook_secret: SecretString,
    /// 运行环境（production 才强制校验签名）
    pub environment: String,
    /// 跟踪的分支
    pub tracked_branch: String,
    /// 部署定义仓库（公开）
    pub compose_repo: RepoSource,
    /// 密钥仓库（带凭据）
    pub secrets_repo: RepoSource,
    /// 临时工作区根目录，每个周期开始时清空
    pub workspace_root: PathBuf,
    /// 最终部署根目录（compose/ 与 secrets/ 的镜像）
    pub deploy_base: PathBuf,
    /// 执行位置
    pub execution: ExecutionMode,
    /// 容器运行时配置
    pub docker: DockerConfig,
    /// 重启策略
    pub restart_policy: RestartPolicy,
    /// git clone 超时
    pub clone_timeout: Duration,
    /// 单条运行时命令超时
    pub command_timeout: Duration,
}

/// 执行模式
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionMode {
    /// 在本机直接执行
    Local,
    /// 通过 ssh 在远程主机执行
    Remote(RemoteTarget),
}

impl ExecutionMode {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionMode::Local => "local",
            ExecutionMode::Remote(_) => "remote",
        }
    }
}

/// 远程主机
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
    /// 远程主机上存放各服务 compose 目录的根路径
    pub compose_root: String,
    /// ssh 私钥路径
    pub identity_file: PathBuf,
}

impl RemoteTarget {
    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// 容器运行时配置
#[derive(Clone, Debug, PartialEq)]
pub struct DockerConfig {
    /// docker 可执行文件路径（在执行目标上）
    pub program: String,
    /// 可选的独立凭据配置目录（`docker --config`）
    pub config_dir: Option<String>,
}

/// 启动前是否先执行 `down`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// `down` 然后 `up -d`
    DownUp,
    /// 只执行 `up -d`，由 compose 重建有变化的容器
    Recreate,
}

impl RestartPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "down-up" | "down_up" | "downup" => Some(RestartPolicy::DownUp),
            "recreate" | "up" => Some(RestartPolicy::Recreate),
            _ => None,
        }
    }
}

/// 不会出现在日志中的字符串
#[derive(Clone, Default, PartialEq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("SecretString(<empty>)")
        } else {
            f.write_str("SecretString(***)")
        }
    }
}

/// 仓库来源
///
/// 包含凭据时，`Debug`/`Display` 只输出脱敏后的地址
#[derive(Clone, PartialEq)]
pub struct RepoSource {
    url: Url,
}

impl RepoSource {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// 构造带 `username:token` 的地址
    pub fn with_credentials(mut url: Url, username: &str, token: &str) -> Result<Self, ConfigError> {
        let invalid = |_| ConfigError::Invalid {
            name: "SECRETS_REPO",
            reason: "URL cannot carry credentials".to_string(),
        };
        url.set_username(username).map_err(invalid)?;
        url.set_password(Some(token)).map_err(invalid)?;
        Ok(Self { url })
    }

    /// 实际传给 git 的地址（可能含凭据，禁止记录日志）
    pub fn expose_url(&self) -> &str {
        self.url.as_str()
    }

    /// 去掉密码后的地址
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            let _ = url.set_password(None);
        }
        url.to_string()
    }

    /// 从任意文本中抹去凭据
    pub fn scrub(&self, text: &str) -> String {
        match self.url.password() {
            Some(password) if !password.is_empty() => text
                .replace(self.url.as_str(), &self.redacted())
                .replace(password, "***"),
            _ => text.to_string(),
        }
    }
}

impl fmt::Debug for RepoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RepoSource").field(&self.redacted()).finish()
    }
}

impl fmt::Display for RepoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意键值来源加载配置
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let port = parse_or(&get, "PORT", 5005)?;
        let webhook_secret = SecretString::new(get("GITHUB_SECRET").unwrap_or_default());
        let environment = get("ENV").unwrap_or_else(|| "production".to_string());
        let tracked_branch = get("TRACKED_BRANCH").unwrap_or_else(|| "main".to_string());

        // Repositories
        let username = require("GITHUB_USERNAME")?;
        let compose_repo = RepoSource::new(repo_url(
            "COMPOSE_REPO",
            &username,
            &require("COMPOSE_REPO")?,
        )?);
        let secrets_url = repo_url("SECRETS_REPO", &username, &require("SECRETS_REPO")?)?;
        let secrets_repo = match get("GITHUB_PAT") {
            Some(token) => RepoSource::with_credentials(secrets_url, &username, &token)?,
            None => RepoSource::new(secrets_url),
        };

        // Paths
        let workspace_root = get("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_WORKSPACE_ROOT));
        let deploy_base = PathBuf::from(require("DEPLOY_BASE")?);
        // 工作区每次周期都会被清空，不能与部署目录互相包含
        if workspace_root.starts_with(&deploy_base) || deploy_base.starts_with(&workspace_root) {
            return Err(ConfigError::Invalid {
                name: "WORKSPACE_ROOT",
                reason: "must not overlap DEPLOY_BASE".to_string(),
            });
        }

        // Execution target
        let execution = match get("EXECUTION_MODE").map(|v| v.to_lowercase()) {
            Some(mode) if mode == "local" => ExecutionMode::Local,
            Some(mode) if mode == "remote" => ExecutionMode::Remote(remote_target(&get)?),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "EXECUTION_MODE",
                    reason: format!("expected local or remote, got {}", other),
                })
            }
            None if get("SSH_TARGET").is_some() => ExecutionMode::Remote(remote_target(&get)?),
            None => ExecutionMode::Local,
        };

        let docker = DockerConfig {
            program: get("HOST_DOCKER_PATH").unwrap_or_else(|| "docker".to_string()),
            config_dir: get("DOCKER_CONFIG_DIR"),
        };

        let restart_policy = match get("RESTART_POLICY") {
            Some(v) => RestartPolicy::parse(&v).ok_or(ConfigError::Invalid {
                name: "RESTART_POLICY",
                reason: format!("expected down-up or recreate, got {}", v),
            })?,
            None => RestartPolicy::DownUp,
        };

        let clone_timeout = Duration::from_secs(parse_or(
            &get,
            "CLONE_TIMEOUT_SECS",
            constants::CLONE_TIMEOUT_SECS,
        )?);
        let command_timeout = Duration::from_secs(parse_or(
            &get,
            "COMMAND_TIMEOUT_SECS",
            constants::COMMAND_TIMEOUT_SECS,
        )?);

        Ok(Self {
            port,
            webhook_secret,
            environment,
            tracked_branch,
            compose_repo,
            secrets_repo,
            workspace_root,
            deploy_base,
            execution,
            docker,
            restart_policy,
            clone_timeout,
            command_timeout,
        })
    }

    /// 是否为生产模式
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// 被跟踪的完整 ref，如 `refs/heads/main`
    pub fn tracked_ref(&self) -> String {
        format!("refs/heads/{}", self.tracked_branch)
    }
}

fn remote_target<G>(get: &G) -> Result<RemoteTarget, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    Ok(RemoteTarget {
        user: get("SSH_USER").ok_or(ConfigError::Missing("SSH_USER"))?,
        host: get("SSH_TARGET").ok_or(ConfigError::Missing("SSH_TARGET"))?,
        compose_root: get("SSH_COMPOSE_ROOT").ok_or(ConfigError::Missing("SSH_COMPOSE_ROOT"))?,
        identity_file: get("SSH_IDENTITY_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_IDENTITY_FILE)),
    })
}

/// 仓库名或完整地址 -> URL
fn repo_url(name: &'static str, username: &str, value: &str) -> Result<Url, ConfigError> {
    let raw = if value.contains("://") {
        value.to_string()
    } else {
        format!("https://github.com/{}/{}.git", username, value)
    };
    Url::parse(&raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_or<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match get(name) {
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// 常量
pub mod constants {
    /// compose 清单文件名
    pub const MANIFEST_FILE: &str = "docker-compose.yml";

    /// 服务密钥文件名
    pub const SECRET_FILE: &str = ".env";

    /// 默认工作区
    pub const DEFAULT_WORKSPACE_ROOT: &str = "/tmp/webhook-deployer";

    /// 默认 ssh 私钥
    pub const DEFAULT_IDENTITY_FILE: &str = "/root/.ssh/id_ed25519";

    /// git clone 超时（秒）
    pub const CLONE_TIMEOUT_SECS: u64 = 300;

    /// 单条运行时命令超时（秒）
    pub const COMMAND_TIMEOUT_SECS: u64 = 600;

    /// webhook 请求体上限（GitHub push 事件最大 25 MB）
    pub const MAX_PAYLOAD_BYTES: usize = 25 * 1024 * 1024;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    /// 指向临时目录、本地执行的配置
    pub(crate) fn test_config(root: &Path) -> EnvConfig {
        EnvConfig {
            port: 0,
            webhook_secret: SecretString::new("topsecret"),
            environment: "production".to_string(),
            tracked_branch: "main".to_string(),
            compose_repo: RepoSource::new(
                Url::parse("https://github.com/octo/compose.git").unwrap(),
            ),
            secrets_repo: RepoSource::with_credentials(
                Url::parse("https://github.com/octo/secrets.git").unwrap(),
                "octo",
                "ghp_token",
            )
            .unwrap(),
            workspace_root: root.join("workspace"),
            deploy_base: root.join("deploy"),
            execution: ExecutionMode::Local,
            docker: DockerConfig {
                program: "docker".to_string(),
                config_dir: None,
            },
            restart_policy: RestartPolicy::DownUp,
            clone_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
        }
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("GITHUB_USERNAME", "octo"),
            ("GITHUB_PAT", "ghp_secret123"),
            ("COMPOSE_REPO", "compose"),
            ("SECRETS_REPO", "secrets"),
            ("DEPLOY_BASE", "/srv/deploy"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = EnvConfig::from_lookup(lookup(&base())).unwrap();
        assert_eq!(config.port, 5005);
        assert!(config.is_production());
        assert_eq!(config.tracked_ref(), "refs/heads/main");
        assert_eq!(config.execution, ExecutionMode::Local);
        assert_eq!(config.restart_policy, RestartPolicy::DownUp);
        assert_eq!(config.docker.program, "docker");
        assert_eq!(
            config.compose_repo.expose_url(),
            "https://github.com/octo/compose.git"
        );
    }

    #[test]
    fn test_secrets_repo_carries_credentials_but_never_displays_them() {
        let config = EnvConfig::from_lookup(lookup(&base())).unwrap();
        assert!(config.secrets_repo.expose_url().contains("octo:ghp_secret123@"));
        assert!(!config.secrets_repo.redacted().contains("ghp_secret123"));
        assert!(!format!("{:?}", config).contains("ghp_secret123"));
    }

    #[test]
    fn test_webhook_secret_is_redacted_in_debug() {
        let mut pairs = base();
        pairs.push(("GITHUB_SECRET", "hook-secret"));
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.webhook_secret.expose(), "hook-secret");
        assert!(!format!("{:?}", config).contains("hook-secret"));
        assert!(!config.secrets_repo.to_string().contains("ghp_secret123"));
    }

    #[test]
    fn test_scrub_removes_token() {
        let config = EnvConfig::from_lookup(lookup(&base())).unwrap();
        let message = format!(
            "fatal: could not read from {}: token ghp_secret123",
            config.secrets_repo.expose_url()
        );
        let scrubbed = config.secrets_repo.scrub(&message);
        assert!(!scrubbed.contains("ghp_secret123"));
        assert!(scrubbed.contains("github.com/octo/secrets.git"));
    }

    #[test]
    fn test_ssh_target_implies_remote() {
        let mut pairs = base();
        pairs.extend([
            ("SSH_USER", "deploy"),
            ("SSH_TARGET", "10.0.0.2"),
            ("SSH_COMPOSE_ROOT", "/opt/compose"),
        ]);
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();
        match config.execution {
            ExecutionMode::Remote(target) => {
                assert_eq!(target.destination(), "deploy@10.0.0.2");
                assert_eq!(target.identity_file, PathBuf::from("/root/.ssh/id_ed25519"));
            }
            other => panic!("expected remote, got {:?}", other),
        }
    }

    #[test]
    fn test_remote_mode_requires_ssh_settings() {
        let mut pairs = base();
        pairs.push(("EXECUTION_MODE", "remote"));
        let err = EnvConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SSH_USER")));
    }

    #[test]
    fn test_missing_deploy_base() {
        let pairs: Vec<_> = base()
            .into_iter()
            .filter(|(k, _)| *k != "DEPLOY_BASE")
            .collect();
        let err = EnvConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DEPLOY_BASE")));
    }

    #[test]
    fn test_overlapping_workspace_is_rejected() {
        for root in ["/srv/deploy", "/srv/deploy/compose/.ws", "/srv", "/"] {
            let mut pairs = base();
            pairs.push(("WORKSPACE_ROOT", root));
            let err = EnvConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { name: "WORKSPACE_ROOT", .. }),
                "{} should overlap /srv/deploy",
                root
            );
        }

        let mut pairs = base();
        pairs.push(("WORKSPACE_ROOT", "/srv/deploy-ws"));
        assert!(EnvConfig::from_lookup(lookup(&pairs)).is_ok());
    }

    #[test]
    fn test_full_repo_url_and_overrides() {
        let mut pairs = base();
        pairs.retain(|(k, _)| *k != "COMPOSE_REPO");
        pairs.extend([
            ("COMPOSE_REPO", "https://git.example.com/ops/compose.git"),
            ("RESTART_POLICY", "recreate"),
            ("PORT", "8080"),
            ("ENV", "development"),
        ]);
        let config = EnvConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.compose_repo.expose_url(),
            "https://git.example.com/ops/compose.git"
        );
        assert_eq!(config.restart_policy, RestartPolicy::Recreate);
        assert_eq!(config.port, 8080);
        assert!(!config.is_production());
    }

    #[test]
    fn test_invalid_port() {
        let mut pairs = base();
        pairs.push(("PORT", "not-a-port"));
        let err = EnvConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
