//! Plot export to PNG (plotters bitmap backend).

use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::Path;

use crate::plot::{format_x_label, series_bounds, PlotSeries};

/// Image size and axis captions for an exported plot.
#[derive(Debug, Clone)]
pub struct PlotExportOptions {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub x_label: String,
    pub show_legend: bool,
}

impl Default for PlotExportOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 600,
            title: String::new(),
            x_label: String::new(),
            show_legend: true,
        }
    }
}

const PALETTE: [plotters::style::RGBColor; 6] = [
    plotters::style::RGBColor(0, 178, 230),
    plotters::style::RGBColor(230, 0, 128),
    plotters::style::RGBColor(0, 178, 0),
    plotters::style::RGBColor(230, 204, 0),
    plotters::style::RGBColor(0, 0, 230),
    plotters::style::RGBColor(230, 0, 0),
];

/// Ensure there is something to draw; returns the padded axis bounds.
fn export_bounds(series: &[PlotSeries]) -> Result<([f64; 2], [f64; 2])> {
    series_bounds(series).ok_or_else(|| eyre!("No data to export"))
}

/// Write the plotted series to `path` as PNG. `series` keeps the on-screen
/// order; `color_index` maps each series to its palette slot.
pub fn write_plot_png(
    path: &Path,
    series: &[PlotSeries],
    color_index: &[usize],
    options: &PlotExportOptions,
) -> Result<()> {
    use plotters::prelude::*;

    let (x, y) = export_bounds(series)?;
    let y_pad = (y[1] - y[0]) * 0.05;

    let root = BitMapBackend::new(path, (options.width.max(200), options.height.max(150)))
        .into_drawing_area();
    root.fill(&WHITE)?;

    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(60);
    if !options.title.is_empty() {
        builder.caption(options.title.as_str(), ("sans-serif", 20));
    }
    let mut chart = builder.build_cartesian_2d(x[0]..x[1], (y[0] - y_pad)..(y[1] + y_pad))?;

    chart
        .configure_mesh()
        .x_desc(options.x_label.as_str())
        .x_labels(5)
        .x_label_formatter(&|v| format_x_label(*v))
        .draw()?;

    for (idx, s) in series.iter().enumerate() {
        if s.points.is_empty() {
            continue;
        }
        let slot = color_index.get(idx).copied().unwrap_or(idx);
        let color = PALETTE[slot % PALETTE.len()];
        chart
            .draw_series(LineSeries::new(s.points.iter().copied(), color))?
            .label(s.name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if options.show_legend {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    tracing::info!(path = %path.display(), series = series.len(), "exported plot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_series_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let empty = vec![PlotSeries {
            name: "a".to_string(),
            points: vec![],
        }];
        let err = write_plot_png(&path, &empty, &[0], &PlotExportOptions::default()).unwrap_err();
        assert!(err.to_string().contains("No data"));
        assert!(!path.exists());
    }

    #[test]
    fn test_export_bounds_cover_all_series() {
        let series = vec![
            PlotSeries {
                name: "a".to_string(),
                points: vec![(0.0, 1.0), (60_000.0, 3.0)],
            },
            PlotSeries {
                name: "b".to_string(),
                points: vec![(30_000.0, -2.0)],
            },
        ];
        let (x, y) = export_bounds(&series).unwrap();
        assert_eq!(x, [0.0, 60_000.0]);
        assert_eq!(y, [-2.0, 3.0]);
    }
}
