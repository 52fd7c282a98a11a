use crate::error::ReportError;
use crate::types::{ContextRow, RenderContext};
use crate::util::{format_long_date, format_number, parse_iso_date};
use chrono::DateTime;
use handlebars::{handlebars_helper, Handlebars};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tabled::{settings::Style, Table};

// `{{date cases_end_date}}` -> `Thursday, 10 June 2021`. Accepts plain dates
// and RFC 3339 timestamps; anything else is shown as is.
handlebars_helper!(date_helper: |value: str| {
    if let Ok(date) = parse_iso_date(value) {
        format_long_date(date)
    } else if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        format_long_date(ts.date_naive())
    } else {
        value.to_string()
    }
});

// `{{thousands cases}}` -> `1,234.0`, `{{thousands cases decimals=0}}` -> `1,234`.
handlebars_helper!(thousands_helper: |value: f64, {decimals: u64 = 1}| {
    format_number(value, decimals as usize)
});

/// A Handlebars registry with the report helpers. Strict mode: a field the
/// template uses but the context lacks is an error, not an empty string.
pub fn registry() -> Handlebars<'static> {
    let mut hb = Handlebars::new();
    hb.set_strict_mode(true);
    hb.register_helper("date", Box::new(date_helper));
    hb.register_helper("thousands", Box::new(thousands_helper));
    hb
}

pub fn render(template: &str, ctx: &RenderContext) -> Result<String, ReportError> {
    Ok(registry().render_template(template, ctx)?)
}

/// Render the template file at `template` into `out`.
pub fn write_report(template: &Path, out: &Path, ctx: &RenderContext) -> Result<(), ReportError> {
    let source = fs::read_to_string(template).map_err(|e| ReportError::io(template, e))?;
    let html = render(&source, ctx)?;
    write_text(out, &html)
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ReportError> {
    create_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(|e| ReportError::io(path, e))?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|e| ReportError::json(path.display().to_string(), e))?;
    write_text(path, &s)
}

fn write_text(path: &Path, text: &str) -> Result<(), ReportError> {
    create_parent(path)?;
    fs::write(path, text).map_err(|e| ReportError::io(path, e))
}

fn create_parent(path: &Path) -> Result<(), ReportError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Print every context field as a Markdown table.
pub fn print_context(ctx: &RenderContext) {
    let rows = ctx.rows();
    if rows.is_empty() {
        println!("(empty context)\n");
    } else {
        println!("{}\n", context_table(rows));
    }
}

fn context_table(rows: Vec<ContextRow>) -> String {
    Table::new(rows).with(Style::markdown()).to_string()
}
