use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use tracing::{error, info, instrument};

use portfolio_optimizer::config::{Config, PriceSourceKind};
use portfolio_optimizer::logging;
use portfolio_optimizer::market_data::{LocalPriceSource, PriceSource, YahooPriceSource};
use portfolio_optimizer::pipeline::{PortfolioRequest, run_pipeline};
use portfolio_optimizer::report::{ConsoleRenderer, JsonFileRenderer, Renderer};
use portfolio_optimizer::strategy::Objective;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ObjectiveArg {
    TargetVolatility,
    TargetReturn,
    MinVolatility,
    MaxSharpe,
}

/// Optimise a long-only stock portfolio and turn it into a whole-share buy list
#[derive(Parser, Debug)]
struct Args {
    /// Comma-separated tickers, e.g. "AAPL,MSFT,GOOG"
    #[arg(long)]
    tickers: String,
    /// Cash available to invest
    #[arg(long)]
    budget: Decimal,
    #[arg(long, value_enum, default_value = "target-volatility")]
    objective: ObjectiveArg,
    /// Annual return target in percent
    #[arg(long, default_value_t = 10.0)]
    target_return: f64,
    /// Annual volatility target in percent
    #[arg(long, default_value_t = 20.0)]
    target_volatility: f64,
    #[arg(long, default_value = "2016-01-01")]
    start: NaiveDate,
    #[arg(long, default_value = "2021-12-31")]
    end: NaiveDate,
    /// Also write the full report as JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Args {
    fn objective(&self) -> Objective {
        match self.objective {
            ObjectiveArg::TargetVolatility => Objective::TargetVolatility(self.target_volatility / 100.0),
            ObjectiveArg::TargetReturn => Objective::TargetReturn(self.target_return / 100.0),
            ObjectiveArg::MinVolatility => Objective::MinVolatility,
            ObjectiveArg::MaxSharpe => Objective::MaxSharpe,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    let args = Args::parse();

    let cfg = Config::load()?;
    if let Err(e) = logging::init_logging(env!("CARGO_BIN_NAME")) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e);
    }
    info!(price_source = ?cfg.price_source, "Configuration loaded and logging initialized");

    let request = PortfolioRequest {
        tickers: PortfolioRequest::parse_tickers(&args.tickers),
        start: args.start,
        end: args.end,
        objective: args.objective(),
        budget: args.budget,
        risk_free_rate: cfg.risk_free_rate,
        frequency: cfg.trading_days_per_year,
    };

    let succeeded = match &cfg.price_source {
        PriceSourceKind::Yahoo => {
            let source = YahooPriceSource::new(&cfg.yahoo)?;
            run(&source, &request, args.output.as_ref()).await?
        }
        PriceSourceKind::File(path) => {
            let source = LocalPriceSource::from_file(path)?;
            run(&source, &request, args.output.as_ref()).await?
        }
    };

    Ok(if succeeded { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Run one request and render it. Pipeline failures are reported, not propagated.
#[instrument(name = "optimize_portfolio", skip_all, fields(source = source.name()))]
async fn run<S: PriceSource>(
    source: &S,
    request: &PortfolioRequest,
    output: Option<&PathBuf>,
) -> eyre::Result<bool> {
    let report = match run_pipeline(source, request).await {
        Ok(report) => report,
        Err(e) => {
            error!(stage = %e.stage(), error = %e, "Portfolio request failed");
            eprintln!("{e}");
            return Ok(false);
        }
    };

    ConsoleRenderer::default().render(&report)?;
    if let Some(path) = output {
        JsonFileRenderer::new(path).render(&report)?;
    }
    Ok(true)
}
