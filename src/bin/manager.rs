//! 分布式仿真 manager
//!
//! 监听 worker 连接，部署场景文件并驱动仿真时间。`--local` 时不等待 worker，
//! 所有实体都建在本地。

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use dsim_rs::config::ScenarioSpec;
use dsim_rs::dist::{DistError, Manager, deploy};
use dsim_rs::sim::SimTime;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "manager", about = "分布式离散事件网络仿真：manager")]
struct Args {
    /// 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
    #[arg(long, default_value_t = 7070)]
    port: u16,
    /// 等待多少个 worker 加入
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// 场景 JSON 文件
    #[arg(long)]
    scenario: PathBuf,
    /// 仿真运行到多少毫秒；缺省为运行到时间线耗尽
    #[arg(long)]
    until_ms: Option<u64>,
    /// 不使用 worker，所有实体放在 manager 本地
    #[arg(long)]
    local: bool,
    /// 等待 worker 握手的超时（秒）
    #[arg(long, default_value_t = 30)]
    join_timeout_s: u64,
    /// 额外打印本地统计 JSON
    #[arg(long)]
    stats_json: bool,
}

fn run(args: &Args) -> Result<(), DistError> {
    let spec = ScenarioSpec::from_path(&args.scenario)?;

    let manager = if args.local || args.workers == 0 {
        Manager::local()
    } else {
        let manager = Manager::bind((args.bind.as_str(), args.port))?;
        let joined = manager.accept_workers(args.workers, Duration::from_secs(args.join_timeout_s))?;
        info!(workers = ?joined, "所有 worker 已就绪");
        manager
    };

    let deployed = deploy(&manager, &spec)?;
    manager.start()?;
    let summary = manager.run(args.until_ms.map(SimTime::from_millis))?;
    let delivered = manager.delivered_total()?;
    let stats = manager.stats();

    println!(
        "done @ {:?}, resumed={}, nodes={}, delivered_pkts={}, local_dropped_pkts={}",
        summary.final_time,
        summary.resumed,
        deployed.nodes.len(),
        delivered,
        stats.dropped_pkts()
    );
    if args.stats_json {
        if let Ok(json) = serde_json::to_string(&stats) {
            println!("stats {json}");
        }
    }

    manager.stop();
    Ok(())
}

fn main() -> ExitCode {
    // 初始化 tracing
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
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "❌ manager 失败");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
