use super::ui;
use crate::chart;
use crate::core::config::{AppConfig, ChartConfig};
use crate::core::ingest::parse_date;
use crate::core::store::RateStore;
use crate::store;
use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use comfy_table::Cell;
use std::path::Path;

fn since(chart: &ChartConfig, from: Option<&str>) -> Result<NaiveDate> {
    match from {
        Some(from) => Ok(parse_date(from)?),
        None => chart.default_since(Utc::now().date_naive()),
    }
}

/// Renders a rate series as a table with day-over-day change.
pub fn display_series(base_currency: &str, currency: &str, series: &[(NaiveDate, f64)]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell(&format!("{base_currency} → {currency}")),
        ui::header_cell("Change"),
    ]);

    let mut previous: Option<f64> = None;
    for (date, rate) in series {
        let change = match previous {
            Some(prev) if prev != 0.0 => ui::change_cell((rate - prev) / prev * 100.0),
            _ => ui::na_cell(),
        };
        table.add_row(vec![
            Cell::new(date.to_string()),
            ui::number_cell(format!("{rate:.6}")),
            change,
        ]);
        previous = Some(*rate);
    }

    format!(
        "{}\n\n{}",
        ui::style_text(&chart::caption(base_currency, currency, series), ui::StyleType::Title),
        table
    )
}

pub async fn run(store: &dyn RateStore, chart: &ChartConfig, currency: &str, from: Option<&str>) -> Result<()> {
    let currency = currency.to_uppercase();
    let since = since(chart, from)?;
    let series = store.query_series(&currency, since).await?;
    if series.is_empty() {
        bail!("No rates stored for {currency} since {since}");
    }
    println!("{}", display_series(&chart.base_currency, &currency, &series));
    Ok(())
}

pub async fn run_with_config(config: &AppConfig, currency: &str, from: Option<&str>) -> Result<()> {
    let db = store::open(config).await?;
    run(&db, &config.chart, currency, from).await
}

/// Writes the chart for `currency` to `out` as PNG.
pub async fn plot(
    store: &dyn RateStore,
    chart_config: &ChartConfig,
    currency: &str,
    from: Option<&str>,
    out: &Path,
) -> Result<()> {
    let currency = currency.to_uppercase();
    let since = since(chart_config, from)?;
    let series = store.query_series(&currency, since).await?;
    if series.is_empty() {
        bail!("No rates stored for {currency} since {since}");
    }

    let png = chart::render_png(&series, chart_config.width, chart_config.height)?;
    std::fs::write(out, png)
        .with_context(|| format!("Failed to write chart to {}", out.display()))?;
    println!(
        "{} {}",
        ui::style_text(&chart::caption(&chart_config.base_currency, &currency, &series), ui::StyleType::Success),
        ui::style_text(&format!("-> {}", out.display()), ui::StyleType::Subtle)
    );
    Ok(())
}

pub async fn plot_with_config(
    config: &AppConfig,
    currency: &str,
    from: Option<&str>,
    out: &Path,
) -> Result<()> {
    let db = store::open(config).await?;
    plot(&db, &config.chart, currency, from, out).await
}
