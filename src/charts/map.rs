// src/charts/map.rs

use anyhow::{Context, Result};
use arrow::array::Array;
use serde::Serialize;

use crate::{config::MapConfig, incidents::IncidentTable};

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const LEAFLET_HEAT_JS: &str = "https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js";

/// A rendered heatmap plus the numbers it was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapDocument {
    pub center: [f64; 2],
    pub points: usize,
    pub html: String,
}

/// Mean latitude and mean longitude, each over its non-null finite values.
/// `None` when either column has no such values at all.
pub fn centroid(table: &IncidentTable) -> Result<Option<[f64; 2]>> {
    let lat = mean(table.latitudes()?.iter().flatten().filter(|v| v.is_finite()));
    let lon = mean(table.longitudes()?.iter().flatten().filter(|v| v.is_finite()));
    Ok(lat.zip(lon).map(|(lat, lon)| [lat, lon]))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// `[lat, lon]` for every row with both coordinates; incomplete rows are
/// dropped.
pub fn heat_points(table: &IncidentTable) -> Result<Vec<[f64; 2]>> {
    let lat = table.latitudes()?;
    let lon = table.longitudes()?;
    Ok((0..table.num_rows())
        .filter(|&i| lat.is_valid(i) && lon.is_valid(i))
        .map(|i| [lat.value(i), lon.value(i)])
        .filter(|[a, b]| a.is_finite() && b.is_finite())
        .collect())
}

/// Base map centered on the full table's centroid with a density layer of
/// every incident. Always built from the whole table, never a filtered view.
pub fn build_heatmap(table: &IncidentTable, cfg: &MapConfig) -> Result<MapDocument> {
    let center = centroid(table)?.unwrap_or(cfg.default_center);
    let points = heat_points(table)?;
    let html = render_html(center, cfg.zoom_start, &points)?;
    Ok(MapDocument {
        center,
        points: points.len(),
        html,
    })
}

fn render_html(center: [f64; 2], zoom: u8, points: &[[f64; 2]]) -> Result<String> {
    let center_js = serde_json::to_string(&center).context("encoding map center")?;
    let points_js = serde_json::to_string(points).context("encoding heat points")?;
    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<link rel="stylesheet" href="{css}">
<script src="{leaflet}"></script>
<script src="{heat}"></script>
<style>html, body, #map {{ width: 100%; height: 100%; margin: 0; padding: 0; }}</style>
</head>
<body>
<div id="map"></div>
<script>
var map = L.map("map").setView({center}, {zoom});
L.tileLayer("https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png", {{
  maxZoom: 18,
  attribution: "&copy; OpenStreetMap contributors"
}}).addTo(map);
L.heatLayer({points}, {{ radius: 25, blur: 15, minOpacity: 0.5 }}).addTo(map);
</script>
</body>
</html>
"#,
        css = LEAFLET_CSS,
        leaflet = LEAFLET_JS,
        heat = LEAFLET_HEAT_JS,
        center = center_js,
        zoom = zoom,
        points = points_js,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incidents::test_support::{sample_table, table};

    #[test]
    fn test_centroid_is_full_table_mean() {
        let table = sample_table();
        let [lat, lon] = centroid(&table).unwrap().unwrap();
        assert!((lat - 37.34).abs() < 1e-9);
        assert!((lon - (-121.88)).abs() < 1e-9);
    }

    #[test]
    fn test_incomplete_coordinates_are_excluded() {
        let table = table(&[
            (Some("A"), None, None, Some(37.0), Some(-121.0)),
            (Some("A"), None, None, Some(38.0), None),
            (Some("A"), None, None, None, Some(-122.0)),
        ]);
        assert_eq!(heat_points(&table).unwrap(), vec![[37.0, -121.0]]);
        // each mean skips its own nulls
        assert_eq!(centroid(&table).unwrap(), Some([37.5, -121.5]));
    }

    #[test]
    fn test_nan_coordinates_are_treated_as_missing() {
        let table = table(&[
            (Some("A"), None, None, Some(37.0), Some(-121.0)),
            (Some("A"), None, None, Some(f64::NAN), Some(-122.0)),
        ]);
        assert_eq!(centroid(&table).unwrap(), Some([37.0, -121.5]));
        assert_eq!(heat_points(&table).unwrap(), vec![[37.0, -121.0]]);

        let doc = build_heatmap(&table, &MapConfig::default()).unwrap();
        assert!(doc.center.iter().all(|v| v.is_finite()));
        assert!(doc.html.contains("setView([37.0,-121.5]"), "{}", doc.html);
        assert!(!doc.html.contains("null"));
    }

    #[test]
    fn test_all_nan_falls_back_to_default_center() {
        let table = table(&[(Some("A"), None, None, Some(f64::NAN), Some(f64::INFINITY))]);
        let cfg = MapConfig::default();
        assert_eq!(centroid(&table).unwrap(), None);
        assert_eq!(build_heatmap(&table, &cfg).unwrap().center, cfg.default_center);
    }

    #[test]
    fn test_no_coordinates_uses_default_center() {
        let table = table(&[(Some("A"), None, None, None, None)]);
        let cfg = MapConfig::default();
        let doc = build_heatmap(&table, &cfg).unwrap();
        assert_eq!(doc.center, cfg.default_center);
        assert_eq!(doc.points, 0);
        assert!(doc.html.contains("L.heatLayer([]"));
    }

    #[test]
    fn test_document_is_self_contained() {
        let doc = build_heatmap(&sample_table(), &MapConfig::default()).unwrap();
        assert!(doc.html.starts_with("<!DOCTYPE html>"));
        assert!(doc.html.contains("leaflet-heat.js"));
        assert!(doc.html.contains("setView([37.3"));
        assert!(doc.html.contains(", 12);"));
        assert!(doc.html.contains("[37.3,-121.9]"));
    }
}
