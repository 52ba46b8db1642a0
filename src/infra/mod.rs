//! 基础设施模块
//!
//! 封装外部依赖（子进程、git、ssh/scp、文件系统）

pub mod channel;
pub mod command;
pub mod fs;
pub mod git;

pub use channel::{ChannelError, ExecutionChannel, LocalChannel, SshChannel};
pub use command::{CommandError, CommandOutput, CommandRunner};
pub use git::{FetchError, GitCli, RepoFetcher};
