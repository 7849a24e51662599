//! PNG line charts of a currency's rate history.
//!
//! Plotters is built without a font stack, so the image carries no text;
//! axis range and currency go into the caption sent alongside it.

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use plotters::prelude::*;

const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

/// Caption describing what the chart shows.
pub fn caption(base_currency: &str, currency: &str, series: &[(NaiveDate, f64)]) -> String {
    let (Some((first, _)), Some((last, _))) = (series.first(), series.last()) else {
        return format!("{base_currency} → {currency}: no data");
    };
    let (min, max) = bounds(series);
    format!("{base_currency} → {currency} exchange rate, {first} — {last} (min {min:.4}, max {max:.4})")
}

fn bounds(series: &[(NaiveDate, f64)]) -> (f64, f64) {
    series.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, rate)| {
        (lo.min(*rate), hi.max(*rate))
    })
}

/// Draws `series` (ascending by date) as a line with point markers.
pub fn render_png(series: &[(NaiveDate, f64)], width: u32, height: u32) -> Result<Vec<u8>> {
    let Some((first, _)) = series.first() else {
        bail!("Cannot plot an empty series");
    };

    let points: Vec<(f64, f64)> = series
        .iter()
        .map(|(date, rate)| ((*date - *first).num_days() as f64, *rate))
        .collect();

    let span = points.last().map_or(0.0, |(x, _)| *x);
    let x_range = if span > 0.0 { 0.0..span } else { -1.0..1.0 };
    let (lo, hi) = bounds(series);
    let pad = ((hi - lo) * 0.05).max(hi.abs() * 0.01).max(1e-6);
    let y_range = (lo - pad)..(hi + pad);

    let file = tempfile::Builder::new()
        .prefix("ratebot-chart-")
        .suffix(".png")
        .tempfile()
        .context("Failed to create chart file")?;

    {
        let root = BitMapBackend::new(file.path(), (width, height)).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| anyhow!("Chart rendering failed: {e}"))?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_2d(x_range, y_range)
            .map_err(|e| anyhow!("Chart rendering failed: {e}"))?;

        chart
            .draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))
            .map_err(|e| anyhow!("Chart rendering failed: {e}"))?;
        chart
            .draw_series(
                points
                    .iter()
                    .map(|point| Circle::new(*point, 4, BLUE.filled())),
            )
            .map_err(|e| anyhow!("Chart rendering failed: {e}"))?;

        root.present()
            .map_err(|e| anyhow!("Chart rendering failed: {e}"))?;
    }

    let png = std::fs::read(file.path()).context("Failed to read rendered chart")?;
    if !png.starts_with(&PNG_MAGIC) {
        bail!("Rendered chart is not a PNG image");
    }
    Ok(png)
}
