//! Standalone HTML rendering of a [`CompositionReport`].

use std::fmt::Write as _;

use crate::report::composition::{ChunkComposition, CompositionReport, format_share};

const PALETTE_SIZE: usize = 8;

const STYLES: &str = r#"      body { font-family: system-ui, sans-serif; margin: 2rem; color: #1d2330; background: #f7f8fa; }
      header p, .meta { color: #5b6475; }
      section.chunk { background: #fff; border: 1px solid #dde1e8; border-radius: 6px; padding: 1rem 1.25rem; margin-bottom: 1.5rem; }
      h2 small { font-weight: normal; color: #5b6475; margin-left: 0.5rem; }
      .stack { display: flex; height: 1.25rem; border-radius: 3px; overflow: hidden; background: #eceff4; margin: 0.75rem 0; }
      .segment { display: block; height: 100%; }
      table { width: 100%; border-collapse: collapse; font-size: 0.9rem; }
      th, td { text-align: left; padding: 0.3rem 0.5rem; border-bottom: 1px solid #eceff4; }
      td.num, th.num { text-align: right; font-variant-numeric: tabular-nums; white-space: nowrap; }
      td.module { font-family: ui-monospace, monospace; word-break: break-all; }
      .bar { display: inline-block; height: 0.6rem; background: #4c78a8; margin-right: 0.5rem; vertical-align: middle; }
      tr.unattributed td { color: #8a6d3b; font-style: italic; }
      .c0 { background: #4c78a8; } .c1 { background: #f58518; } .c2 { background: #54a24b; } .c3 { background: #e45756; }
      .c4 { background: #72b7b2; } .c5 { background: #eeca3b; } .c6 { background: #b279a2; } .c7 { background: #9d755d; }
      .cu { background: #c9ced6; }
"#;

/// Render `report` as a self-contained HTML page with the raw data embedded as JSON.
pub fn render_html(report: &CompositionReport) -> Result<String, serde_json::Error> {
  let data = serde_json::to_string(report)?.replace('<', "\\u003c");
  let title = escape_html(&report.title);

  let mut sections = String::new();
  for (index, chunk) in report.chunks.iter().enumerate() {
    render_chunk(&mut sections, index, chunk);
  }

  Ok(format!(
    r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <style>
{styles}    </style>
  </head>
  <body>
    <header>
      <h1>{title}</h1>
      <p>{chunk_count} chunk{plural}, {total} in total</p>
    </header>
{sections}    <script type="application/json" id="composition-data">{data}</script>
  </body>
</html>
"#,
    styles = STYLES,
    chunk_count = report.chunks.len(),
    plural = if report.chunks.len() == 1 { "" } else { "s" },
    total = format_bytes(report.total_bytes),
  ))
}

fn render_chunk(out: &mut String, index: usize, chunk: &ChunkComposition) {
  let compressed = chunk
    .compressed_size
    .map(|size| format!(", {} brotli", format_bytes(size)))
    .unwrap_or_default();

  let mut segments = String::new();
  let mut rows = String::new();
  for (position, module) in chunk.modules.iter().enumerate() {
    let id = escape_html(&module.id);
    let share = format_share(module.share_basis_points);
    let class = if module.unattributed {
      "cu".to_string()
    } else {
      format!("c{}", position % PALETTE_SIZE)
    };

    if module.share_basis_points > 0 {
      let _ = write!(
        segments,
        r#"<span class="segment {class}" style="width:{share}" title="{id} ({share})"></span>"#
      );
    }

    let row_class = if module.unattributed {
      r#" class="unattributed""#
    } else {
      ""
    };
    let _ = writeln!(
      rows,
      r#"          <tr{row_class}><td class="module">{id}</td><td class="num">{bytes}</td><td class="num"><span class="bar {class}" style="width:{bar_width}px"></span>{share}</td></tr>"#,
      bytes = format_bytes(module.byte_size),
      bar_width = module.share_basis_points / 100,
    );
  }

  let unsized_note = if chunk.unsized_modules.is_empty() {
    String::new()
  } else {
    let names: Vec<String> = chunk.unsized_modules.iter().map(|id| escape_html(id)).collect();
    format!(
      "\n      <p class=\"meta\">Modules without a reported size: {}</p>",
      names.join(", ")
    )
  };

  let _ = write!(
    out,
    r#"    <section class="chunk" id="chunk-{index}">
      <h2>{id}<small>{file}</small></h2>
      <p class="meta">{size}{compressed}, {module_count} module{plural}</p>
      <div class="stack">{segments}</div>
      <table>
        <thead><tr><th>Module</th><th class="num">Size</th><th class="num">Share</th></tr></thead>
        <tbody>
{rows}        </tbody>
      </table>{unsized_note}
    </section>
"#,
    id = escape_html(&chunk.id),
    file = escape_html(&chunk.file_name),
    size = format_bytes(chunk.byte_size),
    module_count = chunk.modules.iter().filter(|module| !module.unattributed).count(),
    plural = if chunk.modules.iter().filter(|module| !module.unattributed).count() == 1 {
      ""
    } else {
      "s"
    },
  );
}

/// Format a byte count with binary units, e.g. `1536` → `1.50 KiB`.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  format!("{value:.2} {}", UNITS[unit])
}

fn escape_html(value: &str) -> String {
  let mut escaped = String::with_capacity(value.len());
  for c in value.chars() {
    match c {
      '&' => escaped.push_str("&amp;"),
      '<' => escaped.push_str("&lt;"),
      '>' => escaped.push_str("&gt;"),
      '"' => escaped.push_str("&quot;"),
      '\'' => escaped.push_str("&#39;"),
      other => escaped.push(other),
    }
  }
  escaped
}
