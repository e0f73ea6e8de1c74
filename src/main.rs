use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use nodemeter::config::NodeConfig;
use nodemeter::speedtest::{
    NullReporter, Orchestrator, ResultRegistry, TestKind, TestRequest, TestStatus,
};

#[derive(Parser)]
#[command(
    name = "nodemeter",
    about = "Node agent for distributed network speed measurement",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent (API server + speed-test engine + heartbeat)
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<String>,
    },

    /// Run a one-shot speed test against a target node
    SpeedTest {
        /// Base URL of the target node
        #[arg(long)]
        target: String,

        /// Test kind: download, upload, ping, or full
        #[arg(long, default_value = "full")]
        kind: String,

        /// Deadline in seconds (0 = default 120)
        #[arg(long, default_value = "0")]
        timeout: u64,

        /// Parallel workers (0 = per-kind default)
        #[arg(long, default_value = "0")]
        workers: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config } => {
            let mut cfg = match config {
                Some(path) => NodeConfig::load(std::path::Path::new(&path))?,
                None => NodeConfig::load_or_default(),
            };
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            tracing::info!(bind = %cfg.server.bind, "Starting nodemeter agent");
            nodemeter::serve(cfg).await?;
        }
        Commands::SpeedTest {
            target,
            kind,
            timeout,
            workers,
        } => {
            let kind: TestKind = kind.parse()?;
            let record = run_one_shot(target, kind, timeout, workers).await?;

            println!("\nSpeed test {} ({})", record.id, record.kind);
            println!("  status:   {:?}", record.status);
            match record.kind {
                TestKind::Download => println!("  download: {:.2} Mbps", record.download_speed),
                TestKind::Upload => println!("  upload:   {:.2} Mbps", record.upload_speed),
                TestKind::Ping => print_ping(&record),
                TestKind::Full => {
                    print_ping(&record);
                    println!("  download: {:.2} Mbps", record.download_speed);
                    println!("  upload:   {:.2} Mbps", record.upload_speed);
                }
            }
            println!("  duration: {} ms", record.duration);
            if let Some(err) = &record.error {
                println!("  error:    {}", err);
            }
        }
    }

    Ok(())
}

fn print_ping(record: &nodemeter::speedtest::TestRecord) {
    println!("  ping:     {:.2} ms", record.ping);
    println!("  jitter:   {:.2} ms", record.jitter);
    println!("  loss:     {:.1} %", record.packet_loss);
}

/// Drive the engine directly (no server, no panel) and poll to a terminal
/// state.
async fn run_one_shot(
    target: String,
    kind: TestKind,
    timeout: u64,
    workers: u32,
) -> Result<nodemeter::speedtest::TestRecord> {
    let config = NodeConfig::load_or_default();
    let orchestrator = Orchestrator::new(
        Arc::new(ResultRegistry::new()),
        Arc::new(NullReporter),
        config.speedtest,
    );

    let record = orchestrator
        .start_test(TestRequest {
            id: String::new(),
            source_node_id: config.node.id,
            target_node_id: String::new(),
            target_url: target,
            kind,
            timeout,
            threads: workers,
        })
        .await?;

    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        if let Some(current) = orchestrator.get_result(&record.id).await {
            if current.status.is_terminal() {
                if current.status != TestStatus::Completed {
                    tracing::warn!(status = ?current.status, "test did not complete cleanly");
                }
                return Ok(current);
            }
        } else {
            anyhow::bail!("test record disappeared before finishing");
        }
    }
}
