mod reader;
mod send;

use anyhow::Context;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use clap::{Args, Parser, Subcommand};
use sqsdr::{Dump, FilterChooser, QueueRef, QueueService, Redrive, SqsQueueService};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.loquacious);

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(loquacious: bool) {
    let level = if loquacious { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

#[derive(Debug, Parser)]
#[command(name = "sqsdr", version)]
#[command(
    about = "AWS SQS doctor: redrive, filter, and dump the messages in your queues",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Log loquaciously (read: verbosely, loudly, a lot)
    #[arg(short, long, global = true)]
    loquacious: bool,

    /// AWS region of the queues; falls back to the AWS environment, then us-east-1
    #[arg(long, global = true, env = "SQSDR_REGION")]
    region: Option<String>,

    /// Custom SQS endpoint, e.g. a LocalStack instance
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Use static test credentials, for local queue emulators
    #[arg(long, global = true)]
    local: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Redrive messages from a source queue to a destination queue
    #[command(alias = "r")]
    Redrive {
        /// Source queue name
        #[arg(short, long)]
        source: String,

        /// Destination queue name
        #[arg(short, long)]
        destination: String,

        /// Only message bodies matching this regular expression are redriven
        #[arg(short = 'x', long)]
        regex: Option<String>,

        /// JMESPath expression applied to JSON bodies; its output is matched
        /// against the regular expression
        #[arg(short, long)]
        jmespath: Option<String>,
    },

    /// Dump every message of a queue as JSON lines, leaving the queue intact
    #[command(alias = "d")]
    Dump {
        /// Source queue name
        #[arg(short, long)]
        source: String,

        /// File to write to instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Send each line of stdin (or a file) to a queue as a message
    #[command(alias = "s")]
    Send {
        /// Destination queue name
        #[arg(short, long)]
        destination: String,

        /// File to read instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl GlobalArgs {
    async fn service(&self) -> Arc<dyn QueueService> {
        let region = RegionProviderChain::first_try(self.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::from_static("us-east-1"));

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if self.local {
            loader = loader.credentials_provider(aws_sdk_sqs::config::Credentials::new(
                "test", "test", None, None, "static",
            ));
        }

        Arc::new(SqsQueueService::from_config(loader.load().await))
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

        match self.command {
            Commands::Redrive {
                source,
                destination,
                regex,
                jmespath,
            } => {
                log::info!("command: redrive {} -> {}", source, destination);
                // an absent regex matches everything, so a lone jmespath still
                // filters out bodies it cannot evaluate
                let filter = match (regex.as_deref(), jmespath.as_deref()) {
                    (None, None) => None,
                    (regex, jmespath) => Some(
                        FilterChooser::new(jmespath, regex.unwrap_or(""))
                            .context("invalid filter")?,
                    ),
                };

                let service = self.global.service().await;
                let source = resolve(&source, &service).await?;
                let destination = resolve(&destination, &service).await?;

                let mut redrive = Redrive::new(source, destination);
                if let Some(filter) = filter {
                    redrive = redrive.with_filter(filter);
                }
                redrive.redrive(&cancel).await.context("redrive failed")
            }
            Commands::Dump { source, output } => {
                log::info!("command: dump {}", source);
                let out: Box<dyn Write + Send> = match &output {
                    Some(path) => Box::new(std::io::BufWriter::new(
                        std::fs::File::create(path)
                            .with_context(|| format!("could not create {}", path.display()))?,
                    )),
                    None => Box::new(std::io::stdout()),
                };

                let service = self.global.service().await;
                let source = resolve(&source, &service).await?;

                Dump::new(source, out)
                    .dump(&cancel)
                    .await
                    .context("dump failed")
            }
            Commands::Send { destination, file } => {
                log::info!("command: send {}", destination);
                let service = self.global.service().await;
                let destination = resolve(&destination, &service).await?;

                let sent = match &file {
                    Some(path) => {
                        let input = tokio::fs::File::open(path)
                            .await
                            .with_context(|| format!("could not open {}", path.display()))?;
                        send::send_lines(service.as_ref(), &destination.url, input).await?
                    }
                    None => {
                        send::send_lines(service.as_ref(), &destination.url, tokio::io::stdin())
                            .await?
                    }
                };
                log::info!("sent {} messages to {}", sent, destination.url);
                Ok(())
            }
        }
    }
}

async fn resolve(name: &str, service: &Arc<dyn QueueService>) -> anyhow::Result<QueueRef> {
    QueueRef::resolve(name, service.clone())
        .await
        .with_context(|| format!("could not resolve queue {}", name))
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        log::warn!("interrupted, undeleted messages stay in their queues");
        cancel.cancel();
    }
}
