//! Mean ± std chart of a time-series batch.

use std::fs;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::info;

use crate::aggregate::{BatchSummary, SeriesCurve};
use crate::error::AnalysisError;

const CHART_SIZE: (u32, u32) = (1024, 768);
const ALIVE_COLOR: RGBColor = RGBColor(0, 128, 0);
const INFECTED_COLOR: RGBColor = RED;

/// Draws the alive/infected curves of a series summary into `path`.
///
/// `.svg` paths are written as SVG, anything else as a bitmap whose format is
/// picked from the extension.
pub fn render_series_chart(
    summary: &BatchSummary,
    title: &str,
    path: &Path,
) -> Result<(), AnalysisError> {
    let BatchSummary::Series {
        step,
        alive,
        infected,
        ..
    } = summary
    else {
        return Err(AnalysisError::NotSeries);
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }

    let xs: Vec<f64> = step.iter().map(|&s| s as f64).collect();
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("svg"))
        .unwrap_or(false);
    let drawn = if is_svg {
        let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
        draw_chart(root, title, &xs, alive, infected).map_err(|e| e.to_string())
    } else {
        let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
        draw_chart(root, title, &xs, alive, infected).map_err(|e| e.to_string())
    };
    drawn.map_err(AnalysisError::Plot)?;
    info!(path = %path.display(), samples = xs.len(), "chart written");
    Ok(())
}

fn draw_chart<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    title: &str,
    xs: &[f64],
    alive: &SeriesCurve,
    infected: &SeriesCurve,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let (x_min, x_max) = padded_range(xs.iter().copied(), 0.0);
    let bands = [alive, infected].into_iter().flat_map(|curve| {
        curve
            .mean
            .iter()
            .zip(&curve.std)
            .flat_map(|(m, s)| [m - s, m + s])
    });
    let (y_min, y_max) = padded_range(bands, 5.0);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(16)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc("simulation step")
        .y_desc("number of agents")
        .draw()?;

    for (label, curve, color) in [
        ("alive", alive, ALIVE_COLOR),
        ("infected", infected, INFECTED_COLOR),
    ] {
        chart
            .draw_series(LineSeries::new(
                xs.iter().copied().zip(curve.mean.iter().copied()),
                color.stroke_width(2),
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        chart.draw_series(xs.iter().zip(curve.mean.iter().zip(&curve.std)).map(
            |(&x, (&m, &s))| ErrorBar::new_vertical(x, m - s, m, m + s, color.filled(), 4),
        ))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// Bounds of `values` widened by `pad`, never an empty interval.
fn padded_range(values: impl Iterator<Item = f64>, pad: f64) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < f64::EPSILON && pad == 0.0 {
        return (lo - 1.0, hi + 1.0);
    }
    (lo - pad, hi + pad)
}
