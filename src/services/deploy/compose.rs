//! Docker Compose command construction
//!
//! Every command is scoped to a single manifest via `-f` and built as a list
//! of discrete tokens.

use crate::config::DockerConfig;

/// compose 子命令
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComposeAction {
    Pull,
    Down,
    Up,
}

impl ComposeAction {
    /// 用于日志和错误信息
    pub fn step(self) -> &'static str {
        match self {
            ComposeAction::Pull => "compose pull",
            ComposeAction::Down => "compose down",
            ComposeAction::Up => "compose up",
        }
    }

    fn args(self) -> &'static [&'static str] {
        match self {
            ComposeAction::Pull => &["pull"],
            ComposeAction::Down => &["down"],
            ComposeAction::Up => &["up", "-d"],
        }
    }
}

/// `docker [--config DIR] compose -f <manifest> <action>`
#[derive(Clone, Debug)]
pub struct ComposeCommand {
    docker: DockerConfig,
}

impl ComposeCommand {
    pub fn new(docker: DockerConfig) -> Self {
        Self { docker }
    }

    pub fn program(&self) -> &str {
        &self.docker.program
    }

    pub fn args(&self, manifest: &str, action: ComposeAction) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref dir) = self.docker.config_dir {
            args.push("--config".to_string());
            args.push(dir.clone());
        }
        args.extend(["compose", "-f", manifest].map(String::from));
        args.extend(action.args().iter().map(|a| a.to_string()));
        args
    }
}
