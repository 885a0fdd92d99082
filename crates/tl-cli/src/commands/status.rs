//! Status command: a day's total, its session log and per-app usage.

use std::io::Write;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use tl_core::{AppUsageTotal, format_timestamp, session_seconds_on};
use tl_db::Database;

use super::util::format_hms;

/// One line of the session log.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLine {
    pub id: i64,
    pub start: String,
    pub end: Option<String>,
    /// Cached session length; `None` while in progress or when unreadable.
    pub duration_seconds: Option<i64>,
    /// Part of the session that falls on the reported day.
    pub seconds_on_day: i64,
}

/// Everything `tl status` reports about a day.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub date: String,
    pub generated_at: String,
    pub timezone: String,
    pub total_seconds: i64,
    pub sessions: Vec<SessionLine>,
    pub apps: Vec<AppUsageTotal>,
}

pub fn build_report(
    db: &Database,
    day: NaiveDate,
    now: NaiveDateTime,
    timezone: String,
) -> Result<StatusReport> {
    let sessions: Vec<SessionLine> = db
        .sessions_for_date(day, now)?
        .into_iter()
        .map(|session| SessionLine {
            seconds_on_day: session_seconds_on(&session, day, now),
            id: session.id.get(),
            start: session.start_ts,
            end: session.end_ts,
            duration_seconds: session.duration_seconds,
        })
        .collect();
    let total_seconds = sessions.iter().map(|line| line.seconds_on_day).sum();
    let apps = db.app_usage_overlapping(day)?;

    Ok(StatusReport {
        date: day.format("%Y-%m-%d").to_string(),
        generated_at: format_timestamp(now),
        timezone,
        total_seconds,
        sessions,
        apps,
    })
}

/// Writes the human-readable report.
pub fn write_text<W: Write>(writer: &mut W, report: &StatusReport) -> Result<()> {
    writeln!(
        writer,
        "Usage on {}: {}",
        report.date,
        format_hms(report.total_seconds)
    )?;

    writeln!(writer)?;
    if report.sessions.is_empty() {
        writeln!(writer, "No sessions recorded.")?;
    } else {
        writeln!(writer, "Sessions:")?;
        for line in &report.sessions {
            let end = line.end.as_deref().unwrap_or("-");
            let duration = match (&line.end, line.duration_seconds) {
                (None, _) => "in progress".to_string(),
                (Some(_), Some(seconds)) => format_hms(seconds),
                (Some(_), None) => "unknown".to_string(),
            };
            let id = format!("#{}", line.id);
            writeln!(writer, "  {id:<6}{:<21}{end:<21}{duration}", line.start)?;
        }
    }

    writeln!(writer)?;
    if report.apps.is_empty() {
        writeln!(writer, "No app usage recorded.")?;
    } else {
        writeln!(writer, "Apps:")?;
        for app in &report.apps {
            writeln!(
                writer,
                "  {:<20}{}",
                app.app_name,
                format_hms(app.total_seconds)
            )?;
        }
    }

    Ok(())
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    day: NaiveDate,
    now: NaiveDateTime,
    json: bool,
) -> Result<()> {
    let timezone = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
    let report = build_report(db, day, now, timezone)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write_text(writer, &report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use tl_core::parse_timestamp;

    fn ts(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    fn seeded() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let morning = db.create_session(ts("2025-01-01T08:00:00")).unwrap();
        db.close_session(morning, ts("2025-01-01T09:00:00")).unwrap();
        let current = db.create_session(ts("2025-01-01T12:00:00")).unwrap();
        db.record_app_usage(current, "Editor", 5, ts("2025-01-01T12:00:00"))
            .unwrap();
        db.record_app_usage(current, "Browser", 5, ts("2025-01-01T12:00:05"))
            .unwrap();
        db.record_app_usage(current, "Browser", 5, ts("2025-01-01T12:00:10"))
            .unwrap();
        db
    }

    fn report_for(db: &Database, day: &str) -> StatusReport {
        let day = NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap();
        build_report(db, day, ts("2025-01-01T12:30:00"), "UTC".to_string()).unwrap()
    }

    #[test]
    fn status_text_lists_sessions_and_apps() {
        let db = seeded();
        let report = report_for(&db, "2025-01-01");
        assert_eq!(report.total_seconds, 5400);

        let mut output = Vec::new();
        write_text(&mut output, &report).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Usage on 2025-01-01: 01:30:00

        Sessions:
          #2    2025-01-01T12:00:00  -                    in progress
          #1    2025-01-01T08:00:00  2025-01-01T09:00:00  01:00:00

        Apps:
          Browser             00:00:10
          Editor              00:00:05
        ");
    }

    #[test]
    fn status_text_for_empty_day() {
        let db = seeded();
        let report = report_for(&db, "2024-12-31");

        let mut output = Vec::new();
        write_text(&mut output, &report).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Usage on 2024-12-31: 00:00:00

        No sessions recorded.

        No app usage recorded.
        ");
    }

    #[test]
    fn status_json_output() {
        let db = seeded();
        let report = report_for(&db, "2025-01-01");
        let output = serde_json::to_string_pretty(&report).unwrap();
        assert_snapshot!(output, @r#"
        {
          "date": "2025-01-01",
          "generated_at": "2025-01-01T12:30:00",
          "timezone": "UTC",
          "total_seconds": 5400,
          "sessions": [
            {
              "id": 2,
              "start": "2025-01-01T12:00:00",
              "end": null,
              "duration_seconds": null,
              "seconds_on_day": 1800
            },
            {
              "id": 1,
              "start": "2025-01-01T08:00:00",
              "end": "2025-01-01T09:00:00",
              "duration_seconds": 3600,
              "seconds_on_day": 3600
            }
          ],
          "apps": [
            {
              "app_name": "Browser",
              "total_seconds": 10
            },
            {
              "app_name": "Editor",
              "total_seconds": 5
            }
          ]
        }
        "#);
    }
}
