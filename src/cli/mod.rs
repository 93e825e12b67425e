//! CLI argument parsing and command dispatch

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pubsub_bench_broker::LoopbackBroker;
use pubsub_bench_core::{
    AckMode, ConnectConfig, OrchestratorBuilder, Qos, RunConfig, RunEvent, RunMode, RunResult,
    StopCondition, SubscriptionOptions, DEFAULT_PING_TOPIC, DEFAULT_TOPIC,
};

#[derive(Parser, Debug)]
#[command(name = "pubsub-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the run result as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish bursts of messages and measure send throughput
    Pub(PubArgs),
    /// Subscribe and measure delivery latency
    Sub(SubArgs),
    /// Measure round-trip latency on a single topic
    Ping(PingArgs),
}

/// Broker connection options shared by every command
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Broker address as primary[:secondary]
    #[arg(long)]
    pub tmx: String,

    /// Login user name
    #[arg(long)]
    pub user: Option<String>,

    /// Login password
    #[arg(long)]
    pub pass: Option<String>,

    /// Client name used for guaranteed delivery
    #[arg(long)]
    pub gdname: Option<String>,
}

impl ConnectArgs {
    fn to_config(&self) -> ConnectConfig {
        let mut config = ConnectConfig::from_pair(&self.tmx);
        config.username = self.user.clone();
        config.password = self.pass.clone();
        config.client_name = self.gdname.clone();
        config
    }
}

/// Topic selection shared by `pub` and `sub`
#[derive(Args, Debug)]
pub struct TopicArgs {
    /// Topic patterns separated by ':'
    #[arg(long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Number of sub-topics substituted for the '*' marker (0 = verbatim)
    #[arg(long, default_value_t = 1)]
    pub tcount: usize,

    /// First sub-topic index
    #[arg(long, default_value_t = 0)]
    pub tstart: usize,

    /// Test duration in seconds (0 = until interrupted)
    #[arg(long, default_value_t = 30)]
    pub duration: u64,
}

impl TopicArgs {
    fn topics(&self) -> Vec<String> {
        split_topics(&self.topic)
    }

    fn stop_condition(&self) -> StopCondition {
        if self.duration == 0 {
            StopCondition::Indefinite
        } else {
            StopCondition::Duration(Duration::from_secs(self.duration))
        }
    }
}

#[derive(Args, Debug)]
pub struct PubArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    #[command(flatten)]
    pub topics: TopicArgs,

    /// Messages per burst
    #[arg(long, default_value_t = 10)]
    pub burst: usize,

    /// Delay between bursts in milliseconds
    #[arg(long, default_value_t = 10)]
    pub delay: u64,

    /// Stop after this many bursts per publication instead of a duration
    #[arg(long)]
    pub cycles: Option<usize>,

    /// Maximum sends per second per publication
    #[arg(long)]
    pub rate: Option<f64>,

    /// Maximum sends in flight across the run
    #[arg(long)]
    pub max_outstanding: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SubArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    #[command(flatten)]
    pub topics: TopicArgs,

    /// Quality of service: BE, GC or GD
    #[arg(long, default_value = "BE")]
    pub qos: Qos,

    /// Durable subscription name (required for GD)
    #[arg(long)]
    pub subname: Option<String>,

    /// Acknowledgment mode: auto or manual
    #[arg(long, default_value = "auto")]
    pub ackmode: AckMode,

    /// Stop each subscription after this many messages
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Topic to ping on
    #[arg(long, default_value = DEFAULT_PING_TOPIC)]
    pub topic: String,

    /// Number of pings
    #[arg(long, default_value_t = 100)]
    pub count: usize,

    /// Delay between pings in milliseconds
    #[arg(long, default_value_t = 10)]
    pub delay: u64,
}

impl Commands {
    /// Build and validate the run configuration for this command
    pub fn to_run_config(&self) -> Result<RunConfig> {
        let config = match self {
            Commands::Pub(args) => {
                let stop = match args.cycles {
                    Some(n) => StopCondition::Cycles(n),
                    None => args.topics.stop_condition(),
                };
                let mut config = RunConfig::new(RunMode::Publish)
                    .with_connect(args.connect.to_config())
                    .with_topics(args.topics.topics())
                    .with_wildcard(args.topics.tcount, args.topics.tstart)
                    .with_burst(args.burst, Duration::from_millis(args.delay))
                    .with_stop_condition(stop);
                if let Some(rps) = args.rate {
                    config = config.with_rate_limit(rps);
                }
                if let Some(limit) = args.max_outstanding {
                    config = config.with_max_outstanding(limit);
                }
                config
            }
            Commands::Sub(args) => {
                let stop = match args.count {
                    Some(n) => StopCondition::Cycles(n),
                    None => args.topics.stop_condition(),
                };
                RunConfig::new(RunMode::Subscribe)
                    .with_connect(args.connect.to_config())
                    .with_topics(args.topics.topics())
                    .with_wildcard(args.topics.tcount, args.topics.tstart)
                    .with_stop_condition(stop)
                    .with_subscription(SubscriptionOptions {
                        qos: args.qos,
                        name: args.subname.clone(),
                        ack_mode: args.ackmode,
                    })
            }
            Commands::Ping(args) => RunConfig::new(RunMode::Ping)
                .with_connect(args.connect.to_config())
                .with_topics([args.topic.as_str()])
                .with_wildcard(0, 0)
                .with_ping(args.count, Duration::from_millis(args.delay)),
        };

        config.validate().context("invalid options")?;
        Ok(config)
    }
}

/// Run the parsed command against the loopback broker
pub async fn run(cli: Cli) -> Result<RunResult> {
    let config = cli.command.to_run_config()?;
    tracing::info!(
        mode = ?config.mode,
        primary = %config.connect.primary,
        topics = ?config.topics,
        "Running with options"
    );

    let mut broker = LoopbackBroker::new();
    if let (Some(user), Some(pass)) = (&config.connect.username, &config.connect.password) {
        broker = broker.with_credentials(user.clone(), pass.clone());
    }

    let (orchestrator, mut events) = OrchestratorBuilder::new()
        .config(config)
        .broker(Arc::new(broker))
        .build()?;

    let log_events = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let result = orchestrator.run_with_signal_handling().await;
    drop(orchestrator);
    if let Err(e) = log_events.await {
        tracing::warn!(error = %e, "Event logger task failed");
    }

    Ok(result?)
}

fn log_event(event: &RunEvent) {
    match event {
        RunEvent::ResourceFailed { .. }
        | RunEvent::TeardownFailed { .. }
        | RunEvent::SendFailed { .. }
        | RunEvent::SessionCloseFailed { .. } => tracing::warn!(?event, "Run event"),
        _ => tracing::debug!(?event, "Run event"),
    }
}

/// Print a result as text or JSON
pub fn print_result(result: &RunResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let tally = &result.tally;
    println!("Results:");
    println!(
        "  resources    : {} created, {} failed",
        tally.resources_created, tally.resource_failures
    );
    if tally.messages_issued > 0 {
        println!(
            "  sent         : {} ({} failed, {:.2}%)",
            tally.messages_sent,
            tally.send_failures,
            result.send_error_rate() * 100.0
        );
    }
    if tally.messages_received > 0 {
        println!("  received     : {}", tally.messages_received);
    }
    println!("  duration     : {:.0} ms", result.total_duration_ms);
    println!("  throughput   : {:.1} msg/s", result.messages_per_second);
    if result.count > 0 {
        println!(
            "  latency (ms) : min {:.3} / mean {:.3} / max {:.3}",
            result.min, result.mean, result.max
        );
        println!(
            "  percentiles  : p50 {:.3} / p95 {:.3} / p99 {:.3}",
            result.p50, result.p95, result.p99
        );
    }
    Ok(())
}

fn split_topics(list: &str) -> Vec<String> {
    list.split(':')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
