// src/charts/mod.rs

pub mod map;

use serde::Serialize;

use crate::incidents::{CategoryCount, MonthlyCount};

pub use map::{build_heatmap, MapDocument};

/// A Plotly figure, serialized straight into `Plotly.react(el, data, layout)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: Vec<String>,
    pub y: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub title: Title,
    pub xaxis: Axis,
    pub yaxis: Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: Title,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl Layout {
    fn new(title: &str, x_label: &str, y_label: &str) -> Self {
        Self {
            title: Title {
                text: title.to_string(),
            },
            xaxis: Axis {
                title: Title {
                    text: x_label.to_string(),
                },
                kind: None,
            },
            yaxis: Axis {
                title: Title {
                    text: y_label.to_string(),
                },
                kind: None,
            },
        }
    }
}

/// One bar per category, in the aggregate's order.
pub fn category_bar_chart(counts: &[CategoryCount]) -> Figure {
    let mut layout = Layout::new("Incident Distribution by Category", "Category", "Count");
    // keep Plotly from re-sorting numeric-looking categories
    layout.xaxis.kind = Some("category");
    Figure {
        data: vec![Trace {
            kind: "bar",
            x: counts.iter().map(|c| c.category.clone()).collect(),
            y: counts.iter().map(|c| c.count).collect(),
            mode: None,
        }],
        layout,
    }
}

/// One marked point per populated month, joined chronologically.
pub fn monthly_trend_chart(counts: &[MonthlyCount]) -> Figure {
    let mut layout = Layout::new("Incident Trends Over Time", "Date_Created", "Count");
    layout.xaxis.kind = Some("date");
    Figure {
        data: vec![Trace {
            kind: "scatter",
            x: counts
                .iter()
                .map(|m| m.month.format("%Y-%m-%d").to_string())
                .collect(),
            y: counts.iter().map(|m| m.count).collect(),
            mode: Some("lines+markers"),
        }],
        layout,
    }
}
