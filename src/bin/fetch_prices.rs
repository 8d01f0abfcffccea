use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;
use eyre::eyre;
use tracing::info;

use portfolio_optimizer::config::Config;
use portfolio_optimizer::logging;
use portfolio_optimizer::market_data::{PriceSource, YahooPriceSource, write_price_file};
use portfolio_optimizer::pipeline::PortfolioRequest;

/// Download adjusted close prices from Yahoo into a price file usable with PRICE_SOURCE=file
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    tickers: String,
    #[arg(long, default_value = "2016-01-01")]
    start: NaiveDate,
    #[arg(long, default_value = "2021-12-31")]
    end: NaiveDate,
    #[arg(long, default_value = "prices.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();

    let cfg = Config::load()?;
    logging::init_logging(env!("CARGO_BIN_NAME"))?;

    let tickers = PortfolioRequest::parse_tickers(&args.tickers);
    if tickers.is_empty() {
        return Err(eyre!("No tickers given"));
    }

    let source = YahooPriceSource::new(&cfg.yahoo)?;
    let table = source.fetch_prices(&tickers, args.start, args.end).await?;
    info!(symbols = ?table.symbols(), rows = table.len(), "Downloaded price history");

    write_price_file(&args.output, &table)?;
    Ok(())
}
