use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use ::time::{format_description::well_known, macros::format_description, Date, Month, OffsetDateTime};

use crate::error::ClientError;
use crate::types::{AttendanceRecord, Student};

pub const REPORT_COLUMNS: [&str; 5] = ["No", "Nama", "NIS", "Kelas", "Waktu Absensi"];

const MISSING: &str = "-";

/// Optional class and day restriction for the attendance listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub class: Option<String>,
    pub date: Option<Date>,
}

impl AttendanceFilter {
    /// Build a filter from raw user input; blank values mean "no filter".
    pub fn new(class: Option<&str>, date: Option<&str>) -> Result<Self, ClientError> {
        let class = class
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let date = match date.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => Some(parse_date(d)?),
            None => None,
        };
        Ok(Self { class, date })
    }

    /// Query parameters for `GET /api/attendances`.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        if let Some(c) = &self.class {
            out.push(("class", c.clone()));
        }
        if let Some(d) = self.date {
            out.push(("date", iso_date(d)));
        }
        out
    }
}

/// Parse a `YYYY-MM-DD` day.
pub fn parse_date(s: &str) -> Result<Date, ClientError> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| ClientError::Invalid(format!("date {s:?} is not YYYY-MM-DD: {e}")))
}

fn iso_date(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReportRow {
    pub no: usize,
    pub name: String,
    pub nis: String,
    pub class: String,
    pub scanned_at: String,
}

/// Printable attendance list: what goes into the exported document.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub title: String,
    pub file_stem: String,
    pub columns: [&'static str; 5],
    pub rows: Vec<ReportRow>,
}

impl AttendanceReport {
    pub fn build(records: &[AttendanceRecord], filter: &AttendanceFilter) -> Self {
        let class_label = filter.class.as_deref().unwrap_or("Semua Kelas");
        let date_label = filter
            .date
            .map(long_indonesian_date)
            .unwrap_or_else(|| "Semua Tanggal".to_string());
        let title = format!("Daftar Absensi Kelas {class_label} - {date_label}");

        let file_stem = format!(
            "absensi_{}_{}",
            filter.class.as_deref().unwrap_or("semua"),
            filter.date.map(iso_date).unwrap_or_else(|| "semua".to_string())
        );

        let rows = records
            .iter()
            .enumerate()
            .map(|(idx, rec)| {
                let field = |f: fn(&Student) -> &str| {
                    rec.student
                        .as_ref()
                        .map(f)
                        .filter(|v| !v.is_empty())
                        .unwrap_or(MISSING)
                        .to_string()
                };
                ReportRow {
                    no: idx + 1,
                    name: field(|s| s.name.as_str()),
                    nis: field(|s| s.nis.as_str()),
                    class: field(|s| s.class.as_str()),
                    scanned_at: display_scan_time(&rec.scan_time),
                }
            })
            .collect();

        Self {
            title,
            file_stem,
            columns: REPORT_COLUMNS,
            rows,
        }
    }
}

fn long_indonesian_date(d: Date) -> String {
    let month = match d.month() {
        Month::January => "Januari",
        Month::February => "Februari",
        Month::March => "Maret",
        Month::April => "April",
        Month::May => "Mei",
        Month::June => "Juni",
        Month::July => "Juli",
        Month::August => "Agustus",
        Month::September => "September",
        Month::October => "Oktober",
        Month::November => "November",
        Month::December => "Desember",
    };
    format!("{:02} {} {}", d.day(), month, d.year())
}

/// `dd/mm/yyyy HH.MM.SS` in the timestamp's own offset; raw input if unparseable.
fn display_scan_time(raw: &str) -> String {
    match OffsetDateTime::parse(raw, &well_known::Rfc3339) {
        Ok(t) => t
            .format(format_description!(
                "[day]/[month]/[year] [hour].[minute].[second]"
            ))
            .unwrap_or_else(|_| raw.to_string()),
        Err(_) if raw.is_empty() => MISSING.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Render the report as an aligned plain-text table.
pub fn render_table(report: &AttendanceReport) -> String {
    let cells: Vec<[String; 5]> = report
        .rows
        .iter()
        .map(|r| {
            [
                r.no.to_string(),
                r.name.clone(),
                r.nis.clone(),
                r.class.clone(),
                r.scanned_at.clone(),
            ]
        })
        .collect();

    let mut widths = report.columns.map(|c| c.chars().count());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&report.title);
    out.push('\n');
    let header: Vec<String> = report.columns.iter().map(|c| c.to_string()).collect();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize; 5]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths.iter())
        .enumerate()
        .map(|(i, (c, w))| {
            // Row numbers read better right-aligned.
            if i == 0 {
                format!("{c:>w$}", w = *w)
            } else {
                format!("{c:<w$}", w = *w)
            }
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Write the report as pretty JSON.
pub fn write_json(path: &Path, report: &AttendanceReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
