// src/dashboard/render.rs
//! Server-rendered HTML for the dashboard page.

use std::fmt::Write as _;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use super::view::{ChartBar, DashboardView};
use crate::config::Capabilities;
use crate::sentiment::Strategy;

/// Banner above the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    NotConfigured(String),
    Failed(String),
    NoData(String),
}

impl Notice {
    fn class(&self) -> &'static str {
        match self {
            Notice::Info(_) => "info",
            Notice::NotConfigured(_) => "warn",
            Notice::Failed(_) => "error",
            Notice::NoData(_) => "empty",
        }
    }

    fn message(&self) -> &str {
        match self {
            Notice::Info(m) | Notice::NotConfigured(m) | Notice::Failed(m) | Notice::NoData(m) => m,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub caps: Capabilities,
    pub files: Vec<String>,
    pub selected_file: Option<String>,
    pub keyword: Option<String>,
    pub view: Option<DashboardView>,
    pub notices: Vec<Notice>,
    /// `project.dataset.table` when a warehouse is configured.
    pub warehouse_table: Option<String>,
    pub default_max_items: usize,
}

pub fn render_page(ctx: &PageContext) -> String {
    let mut out = String::with_capacity(16 * 1024);
    out.push_str(concat!(
        "<!doctype html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">",
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
        "<title>News Sentiment Dashboard</title>",
        "<link rel=\"stylesheet\" href=\"/assets/dashboard.css\"></head><body>",
        "<header><h1>News Sentiment Dashboard</h1></header><div class=\"layout\">"
    ));

    render_sidebar(&mut out, ctx);

    out.push_str("<main>");
    for n in &ctx.notices {
        let _ = write!(
            out,
            "<div class=\"notice {}\">{}</div>",
            n.class(),
            text(n.message())
        );
    }

    render_file_form(&mut out, ctx);
    if let Some(view) = &ctx.view {
        render_view(&mut out, view);
    }
    render_actions(&mut out, ctx);

    out.push_str("</main></div>");
    out.push_str(SCRIPT);
    out.push_str("</body></html>\n");
    out
}

fn status(ok: bool) -> &'static str {
    if ok {
        "<span class=\"ok\">Available</span>"
    } else {
        "<span class=\"off\">Not configured</span>"
    }
}

fn render_sidebar(out: &mut String, ctx: &PageContext) {
    let _ = write!(
        out,
        "<aside><h2>Features</h2><ul>\
         <li>News search (GNews): {}</li>\
         <li>Lexicon analyzer: {}</li>\
         <li>Local model: {}</li>\
         <li>LLM analysis (OpenAI): {}</li>\
         <li>Warehouse (BigQuery): {}</li></ul>",
        status(ctx.caps.has_fetch),
        status(true),
        status(true),
        status(ctx.caps.has_llm),
        status(ctx.caps.has_warehouse),
    );
    if let Some(t) = &ctx.warehouse_table {
        let _ = write!(
            out,
            "<p class=\"muted\">Table: <code>{}</code></p>",
            text(t)
        );
    }
    out.push_str("<p class=\"muted\"><a href=\"/api/config\">config</a> · <a href=\"/metrics\">metrics</a></p></aside>");
}

fn render_file_form(out: &mut String, ctx: &PageContext) {
    out.push_str("<section><h2>View data</h2><form method=\"get\" action=\"/\" class=\"row\">");
    out.push_str("<label>File <select name=\"file\">");
    for f in &ctx.files {
        let sel = if ctx.selected_file.as_deref() == Some(f.as_str()) {
            " selected"
        } else {
            ""
        };
        let _ = write!(out, "<option value=\"{}\"{sel}>{}</option>", attr(f), text(f));
    }
    out.push_str("</select></label>");

    if let Some(view) = &ctx.view {
        if !view.sentiment_columns.is_empty() {
            out.push_str("<label>Sentiment column <select name=\"column\">");
            for c in &view.sentiment_columns {
                let sel = if view.selected_column.as_deref() == Some(c.as_str()) {
                    " selected"
                } else {
                    ""
                };
                let _ = write!(out, "<option value=\"{}\"{sel}>{}</option>", attr(c), text(c));
            }
            out.push_str("</select></label>");
        }
    }

    let _ = write!(
        out,
        "<label>Keyword <input type=\"search\" name=\"keyword\" value=\"{}\" \
         placeholder=\"title or description\"></label><button>Show</button></form>",
        attr(ctx.keyword.as_deref().unwrap_or(""))
    );
    if let Some(f) = &ctx.selected_file {
        let _ = write!(
            out,
            "<p><a href=\"/api/download?file={}\">Download {}</a></p>",
            attr(f),
            text(f)
        );
    }
    out.push_str("</section>");
}

fn render_view(out: &mut String, view: &DashboardView) {
    out.push_str("<section>");
    if let Some(kw) = &view.keyword {
        let _ = write!(
            out,
            "<p class=\"muted\">Found {} of {} articles matching '{}'</p>",
            view.rows.len(),
            view.total_rows,
            text(kw)
        );
    }

    match (&view.summary, &view.selected_column) {
        (Some(s), Some(col)) => {
            let _ = write!(
                out,
                "<h2>Sentiment distribution <small>({})</small></h2><div class=\"metrics\">\
                 <div><b>{}</b>Total articles</div><div><b>{}</b>Positive</div>\
                 <div><b>{}</b>Negative</div><div><b>{}</b>Neutral</div></div>",
                text(col),
                s.total,
                s.positive,
                s.negative,
                s.neutral
            );
            out.push_str(&svg_chart(&view.chart));
        }
        _ => out.push_str(
            "<div class=\"notice empty\">No sentiment columns found. Run a classifier first.</div>",
        ),
    }

    out.push_str("<h2>News results</h2><div class=\"table\"><table><thead><tr>");
    for c in &view.columns {
        let _ = write!(out, "<th>{}</th>", text(c));
    }
    out.push_str("</tr></thead><tbody>");
    for row in &view.rows {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", text(cell));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table></div>");

    let _ = write!(
        out,
        "<details><summary>Data statistics</summary><p><b>Columns:</b> {}</p><p><b>Total rows:</b> {}</p>",
        text(&view.stats.columns.join(", ")),
        view.stats.rows
    );
    if let (Some(lo), Some(hi)) = (&view.stats.date_from, &view.stats.date_to) {
        let _ = write!(out, "<p><b>Date range:</b> {} to {}</p>", text(lo), text(hi));
    }
    out.push_str("</details></section>");
}

/// Vertical bars, one per label present, scaled to the tallest.
pub fn svg_chart(bars: &[ChartBar]) -> String {
    const W: usize = 480;
    const H: usize = 220;
    const PAD: usize = 30;
    let max = bars.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    let slot = (W - 2 * PAD) / bars.len().max(1);
    let bar_w = slot * 3 / 5;

    let mut svg = format!(
        "<svg class=\"chart\" viewBox=\"0 0 {W} {H}\" width=\"{W}\" height=\"{H}\" role=\"img\" aria-label=\"sentiment distribution\">"
    );
    let _ = write!(
        svg,
        "<line x1=\"{PAD}\" y1=\"{y}\" x2=\"{x2}\" y2=\"{y}\" stroke=\"#999\"/>",
        y = H - PAD,
        x2 = W - PAD
    );
    for (i, b) in bars.iter().enumerate() {
        let h = (H - 2 * PAD) * b.count / max;
        let x = PAD + i * slot + (slot - bar_w) / 2;
        let y = H - PAD - h;
        let cx = x + bar_w / 2;
        let _ = write!(
            svg,
            "<rect x=\"{x}\" y=\"{y}\" width=\"{bar_w}\" height=\"{h}\" fill=\"{color}\"><title>{label}: {count}</title></rect>\
             <text x=\"{cx}\" y=\"{ty}\" text-anchor=\"middle\">{count}</text>\
             <text x=\"{cx}\" y=\"{ly}\" text-anchor=\"middle\">{label}</text>",
            color = b.color,
            label = b.label,
            count = b.count,
            ty = y.saturating_sub(4),
            ly = H - PAD + 16,
        );
    }
    svg.push_str("</svg>");
    svg
}

fn render_actions(out: &mut String, ctx: &PageContext) {
    out.push_str("<section><h2>Fetch news</h2>");
    if ctx.caps.has_fetch {
        let _ = write!(
            out,
            "<form class=\"row\" data-api=\"/api/fetch\">\
             <label>Query <input name=\"query\" value=\"India\" required></label>\
             <label>Language <input name=\"lang\" value=\"en\" size=\"3\"></label>\
             <label>Country <input name=\"country\" value=\"in\" size=\"3\"></label>\
             <label>Max <input name=\"max\" type=\"number\" min=\"1\" max=\"100\" value=\"{}\"></label>\
             <button>Fetch</button></form>",
            ctx.default_max_items.min(100)
        );
    } else {
        out.push_str("<div class=\"notice warn\">News search is not configured. Set API_KEY to enable it.</div>");
    }
    out.push_str("</section>");

    out.push_str("<section><h2>Analyze sentiment</h2><form class=\"row\" data-api=\"/api/classify\">");
    out.push_str("<label>Strategy <select name=\"strategy\">");
    for s in [Strategy::Lexicon, Strategy::Model, Strategy::Llm] {
        let disabled = if s == Strategy::Llm && !ctx.caps.has_llm {
            " disabled"
        } else {
            ""
        };
        let _ = write!(out, "<option value=\"{s}\"{disabled}>{s}</option>");
    }
    out.push_str("</select></label><label>Input <select name=\"file\"><option value=\"\">last fetched</option>");
    for f in &ctx.files {
        let _ = write!(out, "<option value=\"{}\">{}</option>", attr(f), text(f));
    }
    let _ = write!(
        out,
        "</select></label>\
         <label>Field <select name=\"field\"><option>description</option><option>title</option></select></label>\
         <label>Max items <input name=\"max_items\" type=\"number\" min=\"1\" placeholder=\"all (LLM: {})\"></label>\
         <button>Analyze</button></form>",
        ctx.default_max_items
    );
    if !ctx.caps.has_llm {
        out.push_str("<p class=\"muted\">LLM analysis is not configured. Set OPENAI_API_KEY to enable it.</p>");
    }
    out.push_str("</section>");

    out.push_str("<section><h2>Warehouse</h2>");
    if ctx.caps.has_warehouse {
        out.push_str("<form class=\"row\" data-api=\"/api/upload\"><label>File <select name=\"file\">");
        for f in &ctx.files {
            let _ = write!(out, "<option value=\"{}\">{}</option>", attr(f), text(f));
        }
        out.push_str("</select></label><button>Upload</button></form>");
        out.push_str("<p><a href=\"/?source=warehouse\">View latest rows from the warehouse</a></p>");
    } else {
        out.push_str("<div class=\"notice warn\">Warehouse is not configured. Set GOOGLE_APPLICATION_CREDENTIALS and GCP_PROJECT_ID to enable it.</div>");
    }
    out.push_str("<pre id=\"result\" class=\"muted\"></pre></section>");
}

const SCRIPT: &str = r#"<script>
document.querySelectorAll('form[data-api]').forEach(function (form) {
  form.addEventListener('submit', async function (ev) {
    ev.preventDefault();
    const out = document.getElementById('result');
    const body = {};
    new FormData(form).forEach(function (v, k) {
      if (v === '') return;
      body[k] = (form.elements[k].type === 'number') ? Number(v) : v;
    });
    if (form.dataset.api === '/api/classify' && !body.file) body.use_last_fetched = true;
    out.textContent = 'Working...';
    try {
      const resp = await fetch(form.dataset.api, {
        method: 'POST',
        headers: { 'content-type': 'application/json' },
        body: JSON.stringify(body)
      });
      const json = await resp.json();
      out.textContent = JSON.stringify(json, null, 2);
      if (resp.ok && json.file) {
        window.location = '/?file=' + encodeURIComponent(json.file);
      }
    } catch (e) {
      out.textContent = 'Request failed: ' + e;
    }
  });
});
</script>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::SentimentLabel;

    #[test]
    fn sidebar_marks_missing_features() {
        let ctx = PageContext {
            caps: Capabilities {
                has_fetch: true,
                has_llm: false,
                has_warehouse: false,
            },
            ..Default::default()
        };
        let html = render_page(&ctx);
        assert!(html.contains("News search (GNews): <span class=\"ok\">Available"));
        assert!(html.contains("LLM analysis (OpenAI): <span class=\"off\">Not configured"));
        assert!(html.contains("Set OPENAI_API_KEY"));
        assert!(html.contains("data-api=\"/api/fetch\""));
    }

    #[test]
    fn notices_and_cells_are_escaped() {
        let ctx = PageContext {
            notices: vec![Notice::Failed("<script>alert(1)</script>".into())],
            ..Default::default()
        };
        let html = render_page(&ctx);
        assert!(html.contains("notice error"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn chart_has_one_bar_per_label() {
        let svg = svg_chart(&[
            ChartBar { label: SentimentLabel::Positive, count: 4, color: "green" },
            ChartBar { label: SentimentLabel::Negative, count: 2, color: "red" },
        ]);
        assert_eq!(svg.matches("<rect").count(), 2);
        assert!(svg.contains("fill=\"green\""));
        assert!(svg.contains(">Negative</text>"));
    }
}
