//! Webhook Deployer
//!
//! Usage:
//! - Normal mode: `webhook-deployer`
//! - With custom port: `webhook-deployer --port 8080`

use webhook_deployer::RuntimeConfig;

/// 解析命令行参数
fn parse_args() -> RuntimeConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RuntimeConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                config.port_override = args[i + 1].parse().ok();
                if config.port_override.is_none() {
                    eprintln!("Ignoring invalid --port value: {}", args[i + 1]);
                }
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    config
}

fn print_help() {
    println!("Webhook Deployer - push-triggered compose deployments");
    println!();
    println!("USAGE:");
    println!("    webhook-deployer [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>    Override the listening port (PORT, default 5005)");
    println!("    -h, --help       Print help information");
    println!();
    println!("Configuration is read from environment variables (COMPOSE_REPO, DEPLOY_BASE, ...).");
}

fn main() -> anyhow::Result<()> {
    let config = parse_args();
    webhook_deployer::init_tracing();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(webhook_deployer::run(config))
}
