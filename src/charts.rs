use rand::{rngs::StdRng, SeedableRng};
use plotters::prelude::*;
use std::fs;
use crate::experiments::{
    compare_models, kth_bidder_by_position, revenue_by_reserve, win_probability_by_position, winners_curse,
    ExperimentSetup, Placement,
};
use crate::logger::Logger;
use crate::utils::linspace;

const PALETTE: [RGBColor; 5] = [BLUE, RED, GREEN, MAGENTA, BLACK];

/// Simulations behind every point of a chart
const CHART_SIMS: usize = 200;

/// One named line of a chart
struct Line {
    label: String,
    points: Vec<(f64, f64)>,
}

/// Main function to generate all charts
pub fn generate_all_charts() -> Result<(), Box<dyn std::error::Error>> {
    // Create charts directory if it doesn't exist
    fs::create_dir_all("charts")?;

    // Sweeps log into a silent logger; the charts are the output
    let mut logger = Logger::new();
    let setup = ExperimentSetup { sims: CHART_SIMS, ..ExperimentSetup::default() };

    generate_revenue_by_reserve_chart(&setup, &mut logger)?;
    generate_model_comparison_charts(&setup, &mut logger)?;
    generate_position_chart(&setup, &mut logger)?;
    generate_kth_bidder_chart(&setup, &mut logger)?;
    generate_winners_curse_chart(&setup, &mut logger)?;

    Ok(())
}

fn generate_revenue_by_reserve_chart(setup: &ExperimentSetup, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut master = StdRng::seed_from_u64(42);
    let reserves = linspace(0.0, 0.8, 17);
    let points = revenue_by_reserve(setup, &reserves, 0.01, &mut master, logger)?;

    create_line_chart(
        &[Line {
            label: setup.valuation_model.name().to_string(),
            points: points.iter().map(|p| (p.x, p.mean_price)).collect(),
        }],
        "Mean Price of Sold Objects vs Reserve Price",
        "charts/revenue_by_reserve.png",
        "Reserve price",
        "Mean final price",
    )
}

fn generate_model_comparison_charts(setup: &ExperimentSetup, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut master = StdRng::seed_from_u64(43);
    let increments = linspace(0.005, 0.2, 14);
    let curves = compare_models(setup, &increments, &mut master, logger)?;

    let prices: Vec<Line> = curves
        .iter()
        .map(|c| Line {
            label: c.model.name().to_string(),
            points: c.points.iter().map(|p| (p.x, p.mean_price)).collect(),
        })
        .collect();
    create_line_chart(
        &prices,
        "Mean Price of Sold Objects vs Minimum Increment",
        "charts/revenue_by_increment.png",
        "Minimum increment",
        "Mean final price",
    )?;

    let bids: Vec<Line> = curves
        .iter()
        .map(|c| Line {
            label: c.model.name().to_string(),
            points: c.points.iter().map(|p| (p.x, p.mean_bids)).collect(),
        })
        .collect();
    create_line_chart(
        &bids,
        "Accepted Bids per Sold Object vs Minimum Increment",
        "charts/bids_by_increment.png",
        "Minimum increment",
        "Mean accepted bids",
    )
}

fn generate_position_chart(setup: &ExperimentSetup, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut master = StdRng::seed_from_u64(44);
    let curves = win_probability_by_position(setup, &[0.001, 0.05, 0.15], &mut master, logger)?;

    let lines: Vec<Line> = curves
        .iter()
        .map(|c| Line {
            label: format!("increment {:.3}", c.increment),
            points: c.win_probability.iter().enumerate().map(|(k, &p)| ((k + 1) as f64, p)).collect(),
        })
        .collect();
    create_line_chart(
        &lines,
        "Win Probability by Arrival Position",
        "charts/win_probability_by_position.png",
        "Arrival position",
        "Win probability",
    )
}

fn generate_kth_bidder_chart(setup: &ExperimentSetup, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut master = StdRng::seed_from_u64(45);
    let increments = linspace(0.005, 0.2, 10);
    let points = kth_bidder_by_position(setup, 1, &increments, &mut master, logger)?;

    let lines: Vec<Line> = Placement::ALL
        .iter()
        .map(|&placement| Line {
            label: format!("placed {}", placement.name()),
            points: points.iter().map(|p| (p.increment, p.get(placement).win_probability)).collect(),
        })
        .collect();
    create_line_chart(
        &lines,
        "Top Bidder Win Probability by Placement",
        "charts/top_bidder_by_placement.png",
        "Minimum increment",
        "Win probability",
    )
}

fn generate_winners_curse_chart(setup: &ExperimentSetup, logger: &mut Logger) -> Result<(), Box<dyn std::error::Error>> {
    let mut master = StdRng::seed_from_u64(46);
    let increments = linspace(0.005, 0.2, 10);
    let points = winners_curse(setup, &increments, &mut master, logger)?;

    create_line_chart(
        &[
            Line {
                label: "independent".to_string(),
                points: points.iter().map(|p| (p.increment, p.profit_independent)).collect(),
            },
            Line {
                label: "common_value".to_string(),
                points: points.iter().map(|p| (p.increment, p.profit_common_value)).collect(),
            },
            Line {
                label: "overpayment".to_string(),
                points: points.iter().map(|p| (p.increment, p.overpayment)).collect(),
            },
        ],
        "Top Bidder Profit and Winner's Curse",
        "charts/winners_curse.png",
        "Minimum increment",
        "Mean profit",
    )
}

/// Bounds of all points, padded so flat lines stay visible
fn bounds(lines: &[Line]) -> ((f64, f64), (f64, f64)) {
    let all = lines.iter().flat_map(|l| l.points.iter());
    let (mut x_min, mut x_max, mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for &(x, y) in all {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    if !x_min.is_finite() {
        return ((0.0, 1.0), (0.0, 1.0));
    }
    if x_max - x_min < 1e-9 {
        x_max = x_min + 1.0;
    }
    let pad = ((y_max - y_min) * 0.1).max(0.05);
    ((x_min, x_max), (y_min - pad, y_max + pad))
}

fn create_line_chart(
    lines: &[Line],
    title: &str,
    filepath: &str,
    x_label: &str,
    y_label: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(filepath, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let ((x_min, x_max), (y_min, y_max)) = bounds(lines);
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart.configure_mesh()
        .x_desc(x_label)
        .y_desc(y_label)
        .draw()?;

    for (i, line) in lines.iter().enumerate() {
        let color = &PALETTE[i % PALETTE.len()];
        chart.draw_series(LineSeries::new(line.points.iter().copied(), color))?
            .label(line.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    println!("Generated: {}", filepath);
    Ok(())
}
