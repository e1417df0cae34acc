//! Diagnostic SVG: lab value boxplots per day since onset, one facet per lab,
//! split by survivor flag.

use std::collections::BTreeMap;
use std::fmt::Write;

use cohort_core::{LabPanel, LabRecord};

const FACET_WIDTH: f64 = 460.0;
const FACET_HEIGHT: f64 = 300.0;
const COLUMNS: usize = 2;
const MARGIN_LEFT: f64 = 56.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 34.0;
const MARGIN_BOTTOM: f64 = 40.0;
const LEGEND_HEIGHT: f64 = 36.0;
/// Every n-th day category gets a tick label.
const TICK_EVERY: usize = 4;

/// Non-survivors first, matching the legend order.
const PALETTE: [(&str, &str); 2] = [("False", "#ff7f0e"), ("True", "#1f77b4")];

/// Tukey box summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
}

impl BoxStats {
    /// Quartiles by linear interpolation; whiskers reach the most extreme
    /// values within 1.5 IQR of the box.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let reach = 1.5 * (q3 - q1);

        let whisker_low = sorted
            .iter()
            .copied()
            .find(|v| *v >= q1 - reach)
            .unwrap_or(q1);
        let whisker_high = sorted
            .iter()
            .rev()
            .copied()
            .find(|v| *v <= q3 + reach)
            .unwrap_or(q3);

        Some(Self {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let weight = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Values of one facet grouped by day, then by survivor flag.
type FacetData = BTreeMap<i64, [Vec<f64>; 2]>;

fn facet_data(labs: &[LabRecord], code: &str) -> FacetData {
    let mut data = FacetData::new();
    for record in labs.iter().filter(|r| r.code == code) {
        let Some(value) = record.value else {
            continue;
        };
        data.entry(record.day).or_default()[usize::from(record.survivor)].push(value);
    }
    data
}

/// Render the full figure as a standalone SVG document.
pub fn render_lab_boxplots(labs: &[LabRecord], panel: &LabPanel) -> String {
    let facets: Vec<(&str, FacetData)> = panel
        .iter()
        .map(|lab| (lab.name.as_str(), facet_data(labs, &lab.code)))
        .filter(|(_, data)| !data.is_empty())
        .collect();

    let rows = facets.len().div_ceil(COLUMNS).max(1);
    let width = FACET_WIDTH * COLUMNS as f64;
    let height = FACET_HEIGHT * rows as f64 + LEGEND_HEIGHT;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}" font-family="sans-serif" font-size="11">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    render_legend(&mut svg);

    if facets.is_empty() {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">No numeric lab values</text>"#,
            width / 2.0,
            LEGEND_HEIGHT + FACET_HEIGHT / 2.0
        );
    }

    for (index, (title, data)) in facets.iter().enumerate() {
        let x = (index % COLUMNS) as f64 * FACET_WIDTH;
        let y = LEGEND_HEIGHT + (index / COLUMNS) as f64 * FACET_HEIGHT;
        render_facet(&mut svg, x, y, title, data);
    }

    svg.push_str("</svg>\n");
    svg
}

fn render_legend(svg: &mut String) {
    let _ = writeln!(svg, r#"<text x="12" y="22" font-weight="bold">survivor</text>"#);
    for (index, (label, color)) in PALETTE.iter().enumerate() {
        let x = 80.0 + index as f64 * 70.0;
        let _ = writeln!(
            svg,
            r#"<rect x="{x}" y="12" width="12" height="12" fill="{color}"/><text x="{}" y="22">{label}</text>"#,
            x + 16.0
        );
    }
}

fn render_facet(svg: &mut String, x: f64, y: f64, title: &str, data: &FacetData) {
    let plot_left = x + MARGIN_LEFT;
    let plot_right = x + FACET_WIDTH - MARGIN_RIGHT;
    let plot_top = y + MARGIN_TOP;
    let plot_bottom = y + FACET_HEIGHT - MARGIN_BOTTOM;

    let (min, max) = value_range(data);
    let scale_y = |value: f64| plot_bottom - (value - min) / (max - min) * (plot_bottom - plot_top);

    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="13">{}</text>"#,
        (plot_left + plot_right) / 2.0,
        y + 20.0,
        escape(title)
    );
    let _ = writeln!(
        svg,
        r##"<rect x="{plot_left}" y="{plot_top}" width="{}" height="{}" fill="none" stroke="#444"/>"##,
        plot_right - plot_left,
        plot_bottom - plot_top
    );

    for step in 0..=4 {
        let value = min + (max - min) * step as f64 / 4.0;
        let ty = scale_y(value);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end">{}</text>"#,
            plot_left - 4.0,
            ty + 4.0,
            tick_label(value)
        );
    }

    let slot = (plot_right - plot_left) / data.len() as f64;
    let box_width = (slot * 0.4).min(18.0);

    for (position, (day, groups)) in data.iter().enumerate() {
        let center = plot_left + slot * (position as f64 + 0.5);
        if position % TICK_EVERY == 0 {
            let _ = writeln!(
                svg,
                r#"<text x="{center}" y="{}" text-anchor="middle">{day}</text>"#,
                plot_bottom + 14.0
            );
        }

        for (group, values) in groups.iter().enumerate() {
            let Some(stats) = BoxStats::from_values(values) else {
                continue;
            };
            let offset = if group == 0 { -0.55 } else { 0.55 };
            let bx = center + offset * box_width - box_width / 2.0;
            render_box(svg, bx, box_width, &stats, PALETTE[group].1, &scale_y);
        }
    }

    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle">days</text>"#,
        (plot_left + plot_right) / 2.0,
        plot_bottom + 30.0
    );
}

fn render_box(
    svg: &mut String,
    x: f64,
    width: f64,
    stats: &BoxStats,
    color: &str,
    scale_y: &dyn Fn(f64) -> f64,
) {
    let mid = x + width / 2.0;
    let top = scale_y(stats.q3);
    let bottom = scale_y(stats.q1);
    let _ = writeln!(
        svg,
        r#"<line x1="{mid}" y1="{}" x2="{mid}" y2="{}" stroke="{color}"/>"#,
        scale_y(stats.whisker_high),
        scale_y(stats.whisker_low)
    );
    let _ = writeln!(
        svg,
        r#"<rect x="{x}" y="{top}" width="{width}" height="{}" fill="{color}" fill-opacity="0.6" stroke="{color}"/>"#,
        (bottom - top).max(1.0)
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{x}" y1="{}" x2="{}" y2="{}" stroke="black"/>"#,
        scale_y(stats.median),
        x + width,
        scale_y(stats.median)
    );
}

fn value_range(data: &FacetData) -> (f64, f64) {
    let mut values = data.values().flat_map(|groups| groups.iter().flatten());
    let Some(first) = values.next().copied() else {
        return (0.0, 1.0);
    };
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    if (max - min).abs() < f64::EPSILON {
        (min - 1.0, max + 1.0)
    } else {
        let pad = (max - min) * 0.05;
        (min - pad, max + pad)
    }
}

fn tick_label(value: f64) -> String {
    if value.abs() >= 100.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::parse_timestamp;

    fn lab(code: &str, day: i64, value: Option<f64>, survivor: bool) -> LabRecord {
        let onset = parse_timestamp("2020-03-01").unwrap();
        LabRecord {
            patient_id: "p".to_string(),
            survivor,
            onset,
            recorded_at: onset,
            code: code.to_string(),
            description: None,
            value,
            unit: None,
            kind: None,
            day,
        }
    }

    #[test]
    fn box_stats_interpolate_quartiles() {
        let stats = BoxStats::from_values(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q3, 4.0);
        assert_eq!(stats.whisker_low, 1.0);
        // 100 lies beyond 1.5 IQR.
        assert_eq!(stats.whisker_high, 4.0);
        assert!(BoxStats::from_values(&[]).is_none());
    }

    #[test]
    fn facets_skip_labs_without_numeric_values() {
        let labs = vec![
            lab("48065-7", 0, Some(0.3), true),
            lab("48065-7", 1, Some(0.6), false),
            lab("2276-4", 0, None, true),
        ];

        let svg = render_lab_boxplots(&labs, &LabPanel::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("D-dimer"));
        assert!(!svg.contains("Serum Ferritin"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn facet_data_splits_by_survivor() {
        let labs = vec![
            lab("8867-4", 2, Some(80.0), true),
            lab("8867-4", 2, Some(120.0), false),
            lab("8867-4", 2, Some(90.0), true),
        ];
        let data = facet_data(&labs, "8867-4");
        let groups = &data[&2];
        assert_eq!(groups[0], vec![120.0]);
        assert_eq!(groups[1], vec![80.0, 90.0]);
    }
}
