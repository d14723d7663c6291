//! Multi-Model Stock Forecast Engine
//!
//! Two-day-ahead ensemble forecasts from OHLCV price history.

use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vnforecast::{config::Config, data, forecast::Forecaster};

#[derive(Parser)]
#[command(name = "vnforecast")]
#[command(about = "Multi-model ensemble stock price forecaster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the next two trading days for a symbol
    Forecast {
        /// CSV price history (date,open,high,low,close,volume)
        data: String,
        /// Ticker symbol for the report
        #[arg(short, long, default_value = "UNKNOWN")]
        symbol: String,
    },
    /// Show the engineered feature table summary
    Features {
        /// CSV price history
        data: String,
        #[arg(short, long, default_value = "UNKNOWN")]
        symbol: String,
    },
    /// Train the ensemble and show model scores and weights
    Weights {
        /// CSV price history
        data: String,
        #[arg(short, long, default_value = "UNKNOWN")]
        symbol: String,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration; a missing file means defaults throughout.
    let config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Forecast { data, symbol } => run_forecast(config, &data, &symbol),
        Commands::Features { data, symbol } => show_features(config, &data, &symbol),
        Commands::Weights { data, symbol } => show_weights(config, &data, &symbol),
    }
}

fn run_forecast(config: Config, data_path: &str, symbol: &str) -> anyhow::Result<()> {
    let series = data::load_csv(data_path, symbol)?;
    let mut forecaster = Forecaster::new(config);
    let result = forecaster.predict_next_two_days(&series)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn show_features(config: Config, data_path: &str, symbol: &str) -> anyhow::Result<()> {
    let series = data::load_csv(data_path, symbol)?;
    let forecaster = Forecaster::new(config);
    let table = forecaster.build_features(&series)?;
    println!(
        "{} rows x {} features ({} .. {})",
        table.n_rows(),
        table.n_cols(),
        table.dates().first().map(|d| d.to_string()).unwrap_or_default(),
        table.last_date()
    );
    let last = table.n_rows() - 1;
    for (name, value) in table.names().iter().zip(table.row(last)) {
        println!("{:<28} {:>14.6}", name, value);
    }
    Ok(())
}

fn show_weights(config: Config, data_path: &str, symbol: &str) -> anyhow::Result<()> {
    let series = data::load_csv(data_path, symbol)?;
    let mut forecaster = Forecaster::new(config);
    // A full forecast trains lazily and surfaces the derived weights.
    let result = forecaster.predict_next_two_days(&series)?;
    println!("model scores and weights for {}", symbol);
    for (name, weight) in &result.ensemble.weights {
        let score = result.ensemble.scores.get(name).copied().unwrap_or(0.0);
        println!("{:<16} score {:>7.4}  weight {:>7.4}", name, score, weight);
    }
    Ok(())
}
