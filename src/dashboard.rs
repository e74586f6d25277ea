// src/dashboard.rs

use anyhow::{Context, Result};
use serde::Serialize;
use std::{sync::Arc, time::Instant};
use tracing::info;

use crate::{
    charts::{build_heatmap, category_bar_chart, monthly_trend_chart, Figure},
    config::{MapConfig, TableRef},
    incidents::{
        count_by_category, count_by_month, IncidentTable, Selection, CATEGORY, SERVICE_TYPE,
    },
    warehouse::TableSink,
};

/// Values offered by the two dropdowns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropdownOptions {
    pub categories: Vec<String>,
    pub service_types: Vec<String>,
}

/// Everything one interaction replaces on the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub bar_chart: Figure,
    pub trend_chart: Figure,
    pub map_html: String,
}

/// Filter → aggregate → build. Pure: reads `table`, touches nothing else.
pub fn render(
    table: &IncidentTable,
    selection: &Selection,
    map: &MapConfig,
) -> Result<DashboardView> {
    let view = table.filter(selection)?;
    let by_category = count_by_category(&view)?;
    let by_month = count_by_month(&view)?;
    let heatmap = build_heatmap(table, map)?;

    Ok(DashboardView {
        bar_chart: category_bar_chart(&by_category),
        trend_chart: monthly_trend_chart(&by_month),
        map_html: heatmap.html,
    })
}

/// Where the full table is copied after every interaction.
pub struct WriteBack {
    pub sink: Arc<dyn TableSink>,
    pub destination: TableRef,
}

/// The loaded table plus everything needed to answer an interaction.
pub struct Dashboard {
    table: Arc<IncidentTable>,
    options: DropdownOptions,
    map: MapConfig,
    write_back: Option<WriteBack>,
}

impl Dashboard {
    pub fn new(
        table: Arc<IncidentTable>,
        map: MapConfig,
        write_back: Option<WriteBack>,
    ) -> Result<Self> {
        let options = DropdownOptions {
            categories: table.distinct_values(CATEGORY)?,
            service_types: table.distinct_values(SERVICE_TYPE)?,
        };
        Ok(Self {
            table,
            options,
            map,
            write_back,
        })
    }

    pub fn options(&self) -> &DropdownOptions {
        &self.options
    }

    pub fn table(&self) -> &IncidentTable {
        &self.table
    }

    /// One full interaction: render, then write back. A write-back failure
    /// fails the whole update.
    pub async fn update(&self, selection: Selection) -> Result<DashboardView> {
        let start = Instant::now();
        let selection = selection.normalized();
        let view = render(&self.table, &selection, &self.map)?;
        let written = self.write_back().await?;

        info!(
            category = ?selection.category,
            service_type = ?selection.service_type,
            written = ?written,
            elapsed = ?start.elapsed(),
            "dashboard updated"
        );
        Ok(view)
    }

    /// Replace the destination with the whole, unfiltered table. `None` when
    /// write-back is switched off.
    pub async fn write_back(&self) -> Result<Option<u64>> {
        let Some(wb) = &self.write_back else {
            return Ok(None);
        };
        let rows = wb
            .sink
            .replace_table(&wb.destination, self.table.batch())
            .await
            .with_context(|| format!("writing back to {}", wb.destination))?;
        Ok(Some(rows))
    }
}
