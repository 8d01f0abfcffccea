use std::fmt;
use std::fs;
use std::path::PathBuf;

use eyre::{Result, WrapErr};
use rust_decimal::Decimal;
use tracing::info;

use crate::pipeline::PortfolioReport;
use crate::strategy::performance::CumulativePoint;

const DEFAULT_SERIES_POINTS: usize = 12;

/// Presents a finished report somewhere
pub trait Renderer {
    fn render(&self, report: &PortfolioReport) -> Result<()>;
}

/// Prints a summary table and a thinned-out cumulative return series to stdout
pub struct ConsoleRenderer {
    pub max_points: usize,
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_SERIES_POINTS,
        }
    }
}

impl Renderer for ConsoleRenderer {
    fn render(&self, report: &PortfolioReport) -> Result<()> {
        println!("{}", format_report(report, self.max_points));
        Ok(())
    }
}

/// Writes the whole report as pretty JSON
pub struct JsonFileRenderer {
    pub path: PathBuf,
}

impl JsonFileRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Renderer for JsonFileRenderer {
    fn render(&self, report: &PortfolioReport) -> Result<()> {
        let body = serde_json::to_string_pretty(report).wrap_err("Failed to serialize report")?;
        fs::write(&self.path, body)
            .wrap_err_with(|| format!("Failed to write report to {}", self.path.display()))?;
        info!(path = %self.path.display(), "Report written");
        Ok(())
    }
}

pub fn format_report(report: &PortfolioReport, max_points: usize) -> String {
    ReportSummary { report, max_points }.to_string()
}

/// Plain-text view of a report: header, buy list, sampled growth series
struct ReportSummary<'a> {
    report: &'a PortfolioReport,
    max_points: usize,
}

impl fmt::Display for ReportSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let request = &self.report.request;
        let plan = &self.report.plan;

        writeln!(f, "Objective: {}", request.objective)?;
        writeln!(f, "Period:    {} .. {}", request.start, request.end)?;
        writeln!(f, "Budget:    {}", plan.budget)?;

        if let Some(perf) = &self.report.performance {
            writeln!(
                f,
                "Expected annual return {:.2}%, volatility {:.2}%, Sharpe {:.3}",
                perf.expected_return * 100.0,
                perf.volatility * 100.0,
                perf.sharpe_ratio
            )?;
        }

        writeln!(f)?;
        writeln!(
            f,
            "{:<10} {:>9} {:>8} {:>12} {:>14}",
            "Symbol", "Weight", "Shares", "Price", "Cost"
        )?;
        for position in &plan.positions {
            writeln!(
                f,
                "{:<10} {:>8.2}% {:>8} {:>12.2} {:>14.2}",
                position.symbol,
                position.target_weight * Decimal::ONE_HUNDRED,
                position.shares,
                position.price,
                position.cost()
            )?;
        }
        writeln!(f, "Spent {:.2}, leftover cash {:.2}", plan.spent(), plan.leftover_cash)?;

        let points = sample_points(&self.report.cumulative_returns, self.max_points);
        if !points.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:<12} {:>10} {:>10}", "Date", "Portfolio", "Benchmark")?;
            for point in points {
                writeln!(
                    f,
                    "{:<12} {:>10.4} {:>10.4}",
                    point.date.to_string(),
                    point.portfolio,
                    point.benchmark
                )?;
            }
        }

        Ok(())
    }
}

/// At most `max_points` evenly spaced points, always ending on the last one
fn sample_points(points: &[CumulativePoint], max_points: usize) -> Vec<&CumulativePoint> {
    if points.is_empty() || max_points == 0 {
        return Vec::new();
    }
    if points.len() <= max_points {
        return points.iter().collect();
    }

    let step = points.len().div_ceil(max_points);
    let mut sampled: Vec<&CumulativePoint> = points.iter().step_by(step).collect();
    if let Some(last) = points.last() {
        if sampled.last().map(|p| p.date) != Some(last.date) {
            if sampled.len() == max_points {
                sampled.pop();
            }
            sampled.push(last);
        }
    }
    sampled
}
