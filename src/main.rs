use anyhow::Context;
use clap::Parser;
use ddpg_trader::cli::{Cli, Commands};
use ddpg_trader::config::{AppConfig, LoggingConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod main_commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("failed to load config from {:?}", cli.config_dir))?;
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Train {
            data,
            epochs,
            steps_per_epoch,
            checkpoint_dir,
            resume,
            seed,
        } => {
            let overrides = main_commands::TrainOverrides {
                data,
                epochs,
                steps_per_epoch,
                checkpoint_dir,
                resume,
                seed,
            };
            main_commands::run_train(config, overrides).await?;
        }
        Commands::Evaluate {
            model,
            data,
            start,
            end,
            steps,
            seed,
        } => {
            main_commands::run_evaluate(config, &model, data, start..end, steps, seed).await?;
        }
        Commands::Info { model } => {
            main_commands::run_info(&model)?;
        }
    }

    Ok(())
}

/// Console logging, plus an optional file layer. The returned guard must be
/// held until exit so buffered file output is flushed.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,ddpg_trader={}", logging.level)));

    let console = if logging.json {
        fmt::layer().with_target(true).json().boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {:?}", dir))?;
            let file_name = path
                .file_name()
                .with_context(|| format!("log path {:?} has no file name", path))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to initialise logging")?;

    Ok(guard)
}
