use crate::errors::Failure;
use crate::funnel::{Lookback, format_thousands};
use crate::models::DashboardView;

pub fn render_index(view: &DashboardView) -> String {
    let report = view.funnel.value();
    let mut failures: Vec<&Failure> = Vec::new();
    // identical failures (same source, kind and message) show once
    for failure in [
        view.lifetime.failure(),
        view.today.failure(),
        view.funnel.failure(),
    ]
    .into_iter()
    .flatten()
    {
        if !failures.contains(&failure) {
            failures.push(failure);
        }
    }

    INDEX_HTML
        .replace("{{LIFETIME}}", &format_thousands(*view.lifetime.value()))
        .replace("{{TODAY}}", &format_thousands(*view.today.value()))
        .replace("{{LOOKBACK_OPTIONS}}", &render_options(view.lookback))
        .replace("{{LOOKBACK}}", &view.lookback.to_string())
        .replace("{{RANGE_START}}", &report.start_date.to_string())
        .replace("{{RANGE_END}}", &report.end_date.to_string())
        .replace("{{FUNNEL_ROWS}}", &render_rows(view))
        .replace("{{NOTICES}}", &render_notices(&failures))
}

fn render_notices(failures: &[&Failure]) -> String {
    failures
        .iter()
        .map(|failure| {
            format!(
                r#"<div class="notice" data-kind="{kind}"><strong>Error fetching from {source}</strong> ({kind}): {message}</div>"#,
                kind = failure.kind.label(),
                source = escape(failure.source),
                message = escape(&failure.message),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_options(selected: Lookback) -> String {
    Lookback::ALL
        .iter()
        .map(|lookback| {
            let marker = if *lookback == selected { " selected" } else { "" };
            format!(r#"<option value="{lookback}"{marker}>{lookback} days</option>"#)
        })
        .collect::<Vec<_>>()
        .join("")
}

fn render_rows(view: &DashboardView) -> String {
    view.funnel
        .value()
        .rows
        .iter()
        .map(|row| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&row.step),
                escape(&row.total_display),
                escape(&row.percent_of_baseline),
                escape(&row.drop_off),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Signups Dashboard</title>
  <style>
    @import url('https://fonts.googleapis.com/css2?family=Space+Grotesk:wght@400;500;600&family=Fraunces:wght@600&display=swap');

    :root {
      --bg-1: #f8f3e6;
      --bg-2: #f5d3a7;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Space Grotesk", "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(960px, 100%);
      background: var(--card);
      backdrop-filter: blur(12px);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 28px;
    }

    h1, h2 {
      font-family: "Fraunces", "Georgia", serif;
      font-weight: 600;
      margin: 0;
    }

    h1 {
      font-size: clamp(2rem, 4vw, 2.8rem);
    }

    .notice {
      background: #fdecea;
      border: 1px solid rgba(198, 59, 43, 0.25);
      color: #c63b2b;
      border-radius: 14px;
      padding: 12px 16px;
      font-size: 0.95rem;
    }

    .big-metric {
      text-align: center;
      display: grid;
      gap: 6px;
    }

    .big-metric .label {
      font-size: 20px;
      font-weight: 600;
      color: #888;
    }

    .big-metric .value {
      font-size: 78px;
      font-weight: 600;
      color: var(--accent-2);
    }

    .big-metric .sub {
      color: #6b645d;
    }

    hr {
      border: none;
      border-top: 1px solid rgba(47, 72, 88, 0.12);
      width: 100%;
    }

    .funnel-header {
      display: flex;
      flex-wrap: wrap;
      align-items: center;
      justify-content: space-between;
      gap: 16px;
    }

    .funnel-header .subtitle {
      margin: 6px 0 0;
      color: #5f5c57;
    }

    select {
      font: inherit;
      border-radius: 999px;
      border: 1px solid rgba(47, 72, 88, 0.2);
      padding: 8px 14px;
      background: white;
    }

    table {
      width: 100%;
      border-collapse: collapse;
      background: white;
      border-radius: 20px;
      overflow: hidden;
    }

    th, td {
      text-align: left;
      padding: 12px 16px;
      border-bottom: 1px solid rgba(47, 72, 88, 0.08);
    }

    th {
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #8b857d;
    }

    td:not(:first-child), th:not(:first-child) {
      text-align: right;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>Growth Dashboard</h1>
    </header>

    {{NOTICES}}

    <section class="big-metric">
      <span class="label">Total Signups (Lifetime)</span>
      <span class="value">{{LIFETIME}}</span>
      <span class="sub">{{TODAY}} signed up today</span>
    </section>

    <hr />

    <section class="funnel">
      <div class="funnel-header">
        <div>
          <h2>Funnel (Last {{LOOKBACK}} Days)</h2>
          <p class="subtitle">{{RANGE_START}} to {{RANGE_END}}</p>
        </div>
        <form method="get" action="/">
          <label for="lookback">Select Lookback Days for Funnel:</label>
          <select id="lookback" name="lookback" onchange="this.form.submit()">{{LOOKBACK_OPTIONS}}</select>
          <noscript><button type="submit">Apply</button></noscript>
        </form>
      </div>
      <table>
        <thead>
          <tr><th>Step</th><th>Total</th><th>% of Impressions</th><th>Drop-off</th></tr>
        </thead>
        <tbody>
{{FUNNEL_ROWS}}
        </tbody>
      </table>
    </section>
  </main>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QueryError;
    use crate::funnel::FunnelReport;
    use crate::outcome::Outcome;
    use crate::report::ReportResult;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn view(funnel: Outcome<FunnelReport>) -> DashboardView {
        DashboardView {
            lookback: Lookback::Week,
            lifetime: Outcome::ready(12345),
            today: Outcome::ready(7),
            funnel,
        }
    }

    fn report(counts: &[(&str, u64)]) -> FunnelReport {
        let counts = ReportResult::Dimensioned(
            counts
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
        );
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        FunnelReport::build(Lookback::Week, Lookback::Week.date_range(today), &counts)
    }

    #[test]
    fn renders_metrics_and_table() {
        let html = render_index(&view(Outcome::ready(report(&[
            ("page_view", 1000),
            ("click_register", 250),
            ("discord_signin", 40),
        ]))));
        assert!(html.contains("12,345"));
        assert!(html.contains("7 signed up today"));
        assert!(html.contains("Funnel (Last 7 Days)"));
        assert!(html.contains("2026-10-10 to 2026-10-16"));
        assert!(html.contains("<td>Clicked Register</td><td>250</td><td>25.00%</td><td>84.00%</td>"));
        assert!(html.contains(r#"<option value="7" selected>"#));
        assert!(!html.contains("class=\"notice\""));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn identical_failures_render_one_notice() {
        let missing = || Err(QueryError::Configuration("SUPABASE_URL".into()));
        let view = DashboardView {
            lookback: Lookback::Week,
            lifetime: Outcome::from_result("profiles", missing(), 0),
            today: Outcome::from_result("profiles", missing(), 0),
            funnel: Outcome::ready(report(&[])),
        };
        let html = render_index(&view);
        assert_eq!(html.matches("Error fetching from profiles").count(), 1);
    }

    #[test]
    fn distinct_failures_each_render() {
        let view = DashboardView {
            lookback: Lookback::Week,
            lifetime: Outcome::from_result(
                "profiles",
                Err(QueryError::Permission("bad key".into())),
                0,
            ),
            today: Outcome::ready(0),
            funnel: Outcome::from_result(
                "analytics",
                Err(QueryError::Configuration("GA4_PROPERTY_ID".into())),
                report(&[]),
            ),
        };
        let html = render_index(&view);
        assert_eq!(html.matches("class=\"notice\"").count(), 2);
    }

    #[test]
    fn failures_are_escaped_into_notices() {
        let funnel = Outcome::from_result(
            "analytics",
            Err(QueryError::Permission("<b>denied</b>".into())),
            report(&[]),
        );
        let html = render_index(&view(funnel));
        assert!(html.contains("Error fetching from analytics"));
        assert!(html.contains("&lt;b&gt;denied&lt;/b&gt;"));
        assert!(!html.contains("<b>denied</b>"));
    }
}
