//! 分布式仿真 worker
//!
//! 连接 manager、加入 worker 池，然后按 manager 的命令创建实体、恢复进程，
//! 直到收到 stopSimulation 或连接断开。

use std::process::ExitCode;

use clap::Parser;
use dsim_rs::dist::Worker;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "worker", about = "分布式离散事件网络仿真：worker")]
struct Args {
    /// manager 地址（host:port）
    #[arg(long, default_value = "127.0.0.1:7070")]
    manager: String,
    /// 加入池时的描述
    #[arg(long, default_value = "worker")]
    name: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let worker = match Worker::connect(args.manager.as_str(), &args.name) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, manager = %args.manager, "❌ 无法加入 manager");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let stats = worker.serve();
    println!(
        "worker {} done @ {:?}, delivered_pkts={}, dropped_pkts={}",
        worker.id(),
        worker.now(),
        stats.delivered_pkts,
        stats.dropped_pkts()
    );
    ExitCode::SUCCESS
}
