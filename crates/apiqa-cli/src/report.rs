//! Report artifacts: JSON results, JUnit XML, HTML, coverage, diff.
//!
//! Everything renders from the already-computed result structures; the HTML
//! report prefers to re-read `results.json` so the two artifacts can never
//! disagree.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use apiqa_core::{CoverageReport, StepResult, SuiteResult};
use apiqa_runner::DiffReport;

pub fn write_json(w: &mut impl Write, res: &SuiteResult) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, res)?;
    writeln!(w)?;
    Ok(())
}

pub fn write_coverage(w: &mut impl Write, rep: &CoverageReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, rep)?;
    writeln!(w)?;
    Ok(())
}

pub fn write_diff(w: &mut impl Write, rep: &DiffReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, rep)?;
    writeln!(w)?;
    Ok(())
}

// -------- JUnit XML --------

/// Minimal JUnit shape: testsuite → testcase (+failure). One testcase per
/// step, classname = scenario name, timings in seconds.
pub fn write_junit(w: &mut impl Write, suite_name: &str, res: &SuiteResult) -> Result<()> {
    let mut total = 0usize;
    let mut failures = 0usize;
    let mut cases = String::new();

    for sc in &res.scenarios {
        for (i, st) in sc.steps.iter().enumerate() {
            total += 1;
            let classname = xml_escape(&sc.name);
            let name = format!("step-{}", i + 1);
            let time = format!("{:.3}", st.duration_ms / 1000.0);
            if st.passed {
                cases.push_str(&format!(
                    "  <testcase classname=\"{classname}\" name=\"{name}\" time=\"{time}\"/>\n"
                ));
            } else {
                failures += 1;
                let message = st
                    .errors
                    .first()
                    .map_or("assertion failed", String::as_str);
                cases.push_str(&format!(
                    "  <testcase classname=\"{classname}\" name=\"{name}\" time=\"{time}\">\n    <failure message=\"{}\" type=\"AssertionError\">{}</failure>\n  </testcase>\n",
                    xml_escape(message),
                    xml_escape(&st.errors.join("\n")),
                ));
            }
        }
    }

    writeln!(
        w,
        "<testsuite name=\"{}\" tests=\"{total}\" failures=\"{failures}\" time=\"{:.3}\">",
        xml_escape(suite_name),
        res.duration_ms / 1000.0,
    )?;
    w.write_all(cases.as_bytes())?;
    writeln!(w, "</testsuite>")?;
    Ok(())
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// -------- HTML --------

/// Render from the on-disk results.json so HTML and JSON always agree.
pub fn write_html_from_json_path(
    w: &mut impl Write,
    suite_name: &str,
    results_json: &Path,
) -> Result<()> {
    let data = std::fs::read(results_json)
        .with_context(|| format!("read {}", results_json.display()))?;
    let res: SuiteResult = serde_json::from_slice(&data).context("decode results.json")?;
    write_html(w, suite_name, &res)
}

pub fn write_html(w: &mut impl Write, suite_name: &str, res: &SuiteResult) -> Result<()> {
    let mut out = String::new();

    out.push_str("<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">");
    out.push_str(&format!(
        "<title>apiqa Report — {}</title>",
        html_escape(suite_name)
    ));
    out.push_str(
        "<style>\n\
:root { --ok:#0a0; --bad:#b00; --muted:#666; --chip:#eee; --line:#e5e5e5; }\n\
body{font-family:system-ui,Segoe UI,Roboto,Arial,sans-serif;margin:24px;line-height:1.45}\n\
h1{margin:0 0 12px} h2{margin:0 0 8px;font-size:1.05rem}\n\
.summary{display:flex;gap:12px;align-items:center;margin:12px 0 18px}\n\
.pass{color:var(--ok)} .fail{color:var(--bad)}\n\
.badge{display:inline-block;padding:2px 8px;border-radius:999px;background:var(--chip);font-size:.85rem}\n\
.card{border:1px solid var(--line);border-radius:12px;padding:16px;margin:12px 0}\n\
pre{background:#f8f8f8;padding:12px;border-radius:8px;overflow:auto;max-height:320px;margin:8px 0 0;white-space:pre-wrap}\n\
.muted{color:var(--muted)} .small{font-size:.85rem}\n\
hr{border:0;border-top:1px solid var(--line);margin:20px 0}\n\
</style></head><body>",
    );

    out.push_str(&format!("<h1>{}</h1>", html_escape(suite_name)));
    out.push_str("<div class=\"summary\">");
    out.push_str(&format!(
        "<div>Status: <strong class=\"{}\">{}</strong></div>",
        if res.passed { "pass" } else { "fail" },
        if res.passed { "PASS" } else { "FAIL" },
    ));
    out.push_str(&chip(&format!("Duration: {:.0} ms", res.duration_ms)));
    out.push_str(&chip(&format!("Scenarios: {}", res.scenarios.len())));
    out.push_str("</div><hr>");

    for sc in &res.scenarios {
        out.push_str("<div class=\"card\">");
        out.push_str(&format!(
            "<h2>{} — {} {}</h2>",
            html_escape(&sc.name),
            badge(sc.passed),
            chip(&format!("{:.0} ms", sc.duration_ms)),
        ));
        for (i, st) in sc.steps.iter().enumerate() {
            out.push_str(&format!(
                "<details {}><summary>Step {} • {} {} • status {} {} {}</summary>",
                if st.passed { "" } else { "open" },
                i + 1,
                html_escape(&st.method),
                html_escape(&st.url),
                st.status_code,
                badge(st.passed),
                chip(&format!("{:.0} ms", st.duration_ms)),
            ));
            if st.errors.is_empty() {
                out.push_str("<div class=\"small muted\">No errors.</div>");
            } else {
                out.push_str("<pre>");
                for e in &st.errors {
                    out.push_str(&html_escape(e));
                    out.push('\n');
                }
                out.push_str("</pre>");
            }
            push_exchange(&mut out, st);
            out.push_str("</details>");
        }
        out.push_str("</div>");
    }

    out.push_str("</body></html>");
    w.write_all(out.as_bytes())?;
    Ok(())
}

fn push_exchange(out: &mut String, st: &StepResult) {
    out.push_str("<div class=\"small muted\" style=\"margin-top:10px;\">Request</div>");
    out.push_str(&format!(
        "<pre>{} {}</pre>",
        html_escape(&st.method),
        html_escape(&st.url)
    ));
    if !st.req_headers.is_empty() {
        let mut keys: Vec<_> = st.req_headers.keys().collect();
        keys.sort();
        let block: String = keys
            .iter()
            .map(|k| format!("{k}: {}\n", st.req_headers[*k]))
            .collect();
        out.push_str(&format!("<pre>{}</pre>", html_escape(&block)));
    }
    if !st.req_body.is_empty() {
        out.push_str(&format!("<pre>{}</pre>", html_escape(&st.req_body)));
    }

    out.push_str("<div class=\"small muted\" style=\"margin-top:10px;\">Response</div>");
    if !st.resp_headers.is_empty() {
        let mut keys: Vec<_> = st.resp_headers.keys().collect();
        keys.sort();
        let block: String = keys
            .iter()
            .map(|k| format!("{k}: {}\n", st.resp_headers[*k].join(", ")))
            .collect();
        out.push_str(&format!("<pre>{}</pre>", html_escape(&block)));
    }
    if !st.resp_body.is_empty() {
        out.push_str(&format!("<pre>{}</pre>", html_escape(&st.resp_body)));
    }
}

fn badge(ok: bool) -> String {
    if ok {
        "<span class=\"badge pass\">PASS</span>".to_string()
    } else {
        "<span class=\"badge fail\">FAIL</span>".to_string()
    }
}

fn chip(text: &str) -> String {
    format!("<span class=\"badge\">{}</span>", html_escape(text))
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
