use clap::Parser;
use pg_apply::{Config, Error, Replicator, Result};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "pg-apply")]
#[command(about = "Applies replicated row changes to PostgreSQL in checkpointed batches", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, value_name = "FILE", help = "JSON-lines change events (default: stdin)")]
    input: Option<PathBuf>,

    #[arg(long, help = "Discard the existing checkpoint and start from the beginning")]
    reset_checkpoint: bool,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting pg-apply");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(Error::Config(e.to_string()));
        }
    };

    info!(
        target_host = %config.target.host,
        target_port = %config.target.port,
        target_database = %config.target.database,
        batch_size = config.writer.batch_size,
        write_retries = config.writer.write_retries,
        database_rewrites = ?config.writer.database_rewrites,
        table_rewrites = ?config.writer.table_rewrites,
        checkpoint_file = ?config.checkpoint.file,
        "Configuration summary"
    );

    let result = Replicator::new(config)
        .with_input(args.input)
        .with_reset_checkpoint(args.reset_checkpoint)
        .run()
        .await;

    if let Err(e) = &result {
        error!("Replication failed: {}", e);
    }
    result
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("pg_apply=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pg_apply=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
