/// The single dashboard page. Dropdown options come from `/options`; every
/// change posts the current selection to `/update` and swaps in all three
/// outputs.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>BeautifySJ Incident Dashboard</title>
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<style>
  body { font-family: sans-serif; margin: 1.5em; }
  label { display: block; margin-top: 1em; }
  select { width: 100%; padding: 0.3em; }
  #update-error { color: #b00020; white-space: pre-wrap; }
</style>
</head>
<body>
<h1 style="text-align: center">BeautifySJ Incident Dashboard</h1>

<label for="category-dropdown">Select Category:</label>
<select id="category-dropdown"><option value="">All Categories</option></select>

<label for="service-dropdown">Select Service Type:</label>
<select id="service-dropdown"><option value="">All Service Types</option></select>

<div id="update-error"></div>
<div id="category-bar-chart"></div>
<div id="incident-trend-chart"></div>
<div id="incident-heatmap"></div>

<script>
const categorySel = document.getElementById("category-dropdown");
const serviceSel = document.getElementById("service-dropdown");
const errorBox = document.getElementById("update-error");

function fill(select, values) {
  for (const v of values) {
    const opt = document.createElement("option");
    opt.value = v;
    opt.textContent = v;
    select.appendChild(opt);
  }
}

let latest = 0;

async function refresh() {
  const seq = ++latest;
  const selection = {
    category: categorySel.value || null,
    service_type: serviceSel.value || null,
  };
  let resp, body;
  try {
    resp = await fetch("/update", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify(selection),
    });
    body = await resp.json().catch(() => null);
  } catch (err) {
    if (seq === latest) errorBox.textContent = "Update failed: " + err;
    return;
  }
  // a newer selection was posted while this one was in flight
  if (seq !== latest) return;

  if (!resp.ok || body === null) {
    errorBox.textContent = body && body.error
      ? body.error + (body.details ? ": " + body.details : "")
      : "Update failed: HTTP " + resp.status;
    return;
  }
  errorBox.textContent = "";
  Plotly.react("category-bar-chart", body.bar_chart.data, body.bar_chart.layout);
  Plotly.react("incident-trend-chart", body.trend_chart.data, body.trend_chart.layout);

  const frame = document.createElement("iframe");
  frame.srcdoc = body.map_html;
  frame.width = "100%";
  frame.height = "600";
  frame.style.border = "0";
  document.getElementById("incident-heatmap").replaceChildren(frame);
}

async function init() {
  const resp = await fetch("/options");
  const options = await resp.json();
  fill(categorySel, options.categories);
  fill(serviceSel, options.service_types);
  categorySel.addEventListener("change", refresh);
  serviceSel.addEventListener("change", refresh);
  await refresh();
}

init();
</script>
</body>
</html>
"#;
