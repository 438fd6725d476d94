//! CSV rendering of report rows.

use std::fmt::Write;

use crate::model::SiteMetrics;

/// Header row of every report.
pub const REPORT_HEADER: [&str; 7] = [
    "site_id",
    "uptime_last_hour",
    "uptime_last_day",
    "uptime_last_week",
    "downtime_last_hour",
    "downtime_last_day",
    "downtime_last_week",
];

/// Content type the report is published under.
pub const REPORT_CONTENT_TYPE: &str = "text/csv";

/// Render rows as CSV, in the order given.
///
/// Values are written with 4 decimal places.
pub fn render_csv(rows: &[SiteMetrics]) -> String {
    let mut out = REPORT_HEADER.join(",");
    out.push('\n');

    for row in rows {
        let _ = writeln!(
            out,
            "{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
            escape_field(&row.site_id),
            row.uptime.hour,
            row.uptime.day,
            row.uptime.week,
            row.downtime.hour,
            row.downtime.day,
            row.downtime.week,
        );
    }

    out
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WindowTotals;

    #[test]
    fn test_empty_report_has_header_only() {
        assert_eq!(
            render_csv(&[]),
            "site_id,uptime_last_hour,uptime_last_day,uptime_last_week,\
             downtime_last_hour,downtime_last_day,downtime_last_week\n"
        );
    }

    #[test]
    fn test_row_formatting() {
        let row = SiteMetrics {
            site_id: "8419537941919820732".to_string(),
            uptime: WindowTotals {
                hour: 30.0,
                day: 1.0 / 3.0,
                week: 12.5,
            },
            downtime: WindowTotals {
                hour: 0.0,
                day: 2.0,
                week: 167.99999,
            },
        };

        let csv = render_csv(&[row]);
        let line = csv.lines().nth(1).unwrap();
        assert_eq!(
            line,
            "8419537941919820732,30.0000,0.3333,12.5000,0.0000,2.0000,168.0000"
        );
    }

    #[test]
    fn test_site_id_with_comma_is_quoted() {
        let row = SiteMetrics {
            site_id: "north, \"main\"".to_string(),
            uptime: WindowTotals::default(),
            downtime: WindowTotals::default(),
        };

        let csv = render_csv(&[row]);
        assert!(csv.lines().nth(1).unwrap().starts_with("\"north, \"\"main\"\"\","));
    }
}
