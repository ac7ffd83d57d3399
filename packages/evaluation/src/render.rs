//! Markdown and CSV output for [`ErrorReport`]s.

use std::fmt::Write as _;

use taxi_demand_evaluation_models::{ErrorReport, SegmentErrorSummary, ZoneErrorSummary};

use crate::{EvaluationError, worst_by_mae, worst_by_relative_mae, worst_segments};

const TOP_ZONES_BY_MAE: usize = 15;
const TOP_ZONES_BY_RATIO: usize = 10;
const TOP_SEGMENTS: usize = 15;
const BASELINE_TOP_ZONES: usize = 10;

/// Formats reports for one month.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    month: String,
}

impl ReportRenderer {
    /// Creates a renderer whose titles name `month`.
    #[must_use]
    pub fn new(month: impl Into<String>) -> Self {
        Self {
            month: month.into(),
        }
    }

    /// The zone and segment error report.
    #[must_use]
    pub fn error_markdown(&self, report: &ErrorReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Errors by zone ({})\n", self.month);
        out.push_str("This report ranks zones by error on the test predictions.\n\n");
        out.push_str("**Overall metrics**\n\n");
        write_overall(&mut out, report);
        if report.excluded > 0 {
            let _ = writeln!(
                out,
                "- Excluded (no prediction): {}",
                report.excluded
            );
        }
        out.push('\n');

        let _ = writeln!(out, "## Top {TOP_ZONES_BY_MAE} zones by MAE\n");
        out.push_str("| zone_id | borough | zone_name | n | mae | rmse | avg_actual | p95_actual |\n");
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for z in worst_by_mae(&report.by_zone, TOP_ZONES_BY_MAE) {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {:.3} | {:.3} | {:.2} | {:.2} |",
                z.zone_id,
                cell(z.borough.as_deref()),
                cell(z.zone_name.as_deref()),
                z.n,
                z.mae,
                z.rmse,
                z.avg_actual,
                z.p95_actual
            );
        }
        out.push('\n');

        out.push_str("## Zones with highest relative error (MAE / avg_actual)\n\n");
        out.push_str(
            "Zones with no pickups during the test period have no ratio and are not ranked here.\n\n",
        );
        out.push_str("| zone_id | borough | zone_name | n | mae | avg_actual | mae_as_fraction_of_avg |\n");
        out.push_str("|---|---|---|---|---|---|---|\n");
        for z in worst_by_relative_mae(&report.by_zone, TOP_ZONES_BY_RATIO) {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {:.3} | {:.2} | {:.2} |",
                z.zone_id,
                cell(z.borough.as_deref()),
                cell(z.zone_name.as_deref()),
                z.n,
                z.mae,
                z.avg_actual,
                z.mae_as_fraction_of_avg
            );
        }
        out.push('\n');

        out.push_str("## Worst (day_of_week, hour) segments by MAE\n\n");
        out.push_str("day_of_week: 0=Mon ... 6=Sun\n\n");
        out.push_str("| day_of_week | hour | n | mae | rmse |\n");
        out.push_str("|---|---|---|---|---|\n");
        for s in worst_segments(&report.by_segment, TOP_SEGMENTS) {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {:.3} | {:.3} |",
                s.day_of_week, s.hour, s.n, s.mae, s.rmse
            );
        }
        out
    }

    /// The baseline report: overall metrics and the zones it misses most.
    #[must_use]
    pub fn baseline_markdown(&self, report: &ErrorReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Baseline report ({})\n", self.month);
        write_overall(&mut out, report);
        let _ = writeln!(out, "- Excluded (zone unseen in training): {}", report.excluded);
        out.push('\n');
        let _ = writeln!(out, "## Top {BASELINE_TOP_ZONES} zones by mean absolute error\n");
        for z in worst_by_mae(&report.by_zone, BASELINE_TOP_ZONES) {
            let _ = writeln!(out, "- zone_id {}: {:.3}", z.zone_id, z.mae);
        }
        out
    }

    /// The boosted model report: overall metrics and split counts per
    /// feature.
    #[must_use]
    pub fn model_markdown(&self, report: &ErrorReport, importance: &[(String, u64)]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Gradient-boosted model report ({})\n", self.month);
        write_overall(&mut out, report);
        out.push('\n');
        out.push_str("## Feature importance\n\n");
        for (name, splits) in importance {
            let _ = writeln!(out, "- {name}: {splits}");
        }
        out
    }

    /// Writes the per-zone table, largest MAE first.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] if the writer fails.
    pub fn write_zone_csv<W: std::io::Write>(
        &self,
        report: &ErrorReport,
        writer: W,
    ) -> Result<(), EvaluationError> {
        let rows: Vec<&ZoneErrorSummary> = worst_by_mae(&report.by_zone, report.by_zone.len());
        write_csv(writer, &rows)
    }

    /// Writes the per-segment table, largest MAE first.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError`] if the writer fails.
    pub fn write_segment_csv<W: std::io::Write>(
        &self,
        report: &ErrorReport,
        writer: W,
    ) -> Result<(), EvaluationError> {
        let rows: Vec<&SegmentErrorSummary> =
            worst_segments(&report.by_segment, report.by_segment.len());
        write_csv(writer, &rows)
    }
}

fn write_overall(out: &mut String, report: &ErrorReport) {
    let _ = writeln!(out, "- MAE: {:.3}", report.overall.mae);
    let _ = writeln!(out, "- RMSE: {:.3}", report.overall.rmse);
    let _ = writeln!(out, "- Scored predictions: {}", report.overall.n);
}

fn cell(value: Option<&str>) -> &str {
    value.unwrap_or("")
}

fn write_csv<W: std::io::Write, T: serde::Serialize>(
    writer: W,
    rows: &[T],
) -> Result<(), EvaluationError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use taxi_demand_evaluation_models::{OverallMetrics, SEGMENT_ERROR_FIELDS, ZONE_ERROR_FIELDS};

    use super::*;

    fn zone(zone_id: u32, mae: f64, avg_actual: f64) -> ZoneErrorSummary {
        ZoneErrorSummary {
            zone_id,
            borough: Some("Manhattan".to_string()),
            zone_name: Some(format!("Zone {zone_id}")),
            n: 4,
            mae,
            rmse: mae * 1.5,
            avg_actual,
            p95_actual: avg_actual * 2.0,
            mae_as_fraction_of_avg: if avg_actual == 0.0 {
                f64::INFINITY
            } else {
                mae / avg_actual
            },
        }
    }

    fn report() -> ErrorReport {
        ErrorReport {
            overall: OverallMetrics {
                n: 12,
                mae: 1.23456,
                rmse: 2.5,
            },
            by_zone: vec![zone(1, 1.0, 10.0), zone(2, 3.0, 100.0), zone(3, 2.0, 0.0)],
            by_segment: vec![
                SegmentErrorSummary {
                    day_of_week: 0,
                    hour: 8,
                    n: 6,
                    mae: 1.0,
                    rmse: 1.0,
                },
                SegmentErrorSummary {
                    day_of_week: 4,
                    hour: 18,
                    n: 6,
                    mae: 4.0,
                    rmse: 5.0,
                },
            ],
            excluded: 3,
        }
    }

    #[test]
    fn error_markdown_sections() {
        let md = ReportRenderer::new("2024-01").error_markdown(&report());
        assert!(md.starts_with("# Errors by zone (2024-01)\n"));
        assert!(md.contains("- MAE: 1.235\n"));
        assert!(md.contains("- Excluded (no prediction): 3\n"));
        assert!(md.contains("| 3 | Manhattan | Zone 3 | 4 | 2.000 | 3.000 | 0.00 | 0.00 |"));
        assert!(md.contains("| 4 | 18 | 6 | 4.000 | 5.000 |"));

        let relative = md
            .split("## Zones with highest relative error")
            .nth(1)
            .and_then(|s| s.split("## Worst").next())
            .unwrap();
        assert!(relative.contains("| 1 | Manhattan"));
        assert!(!relative.contains("| 3 | Manhattan"));
    }

    #[test]
    fn baseline_markdown_lists_worst_zones() {
        let md = ReportRenderer::new("2024-01").baseline_markdown(&report());
        assert!(md.starts_with("# Baseline report (2024-01)\n"));
        let zones: Vec<&str> = md.lines().filter(|l| l.starts_with("- zone_id")).collect();
        assert_eq!(
            zones,
            vec!["- zone_id 2: 3.000", "- zone_id 3: 2.000", "- zone_id 1: 1.000"]
        );
    }

    #[test]
    fn model_markdown_lists_importance() {
        let importance = vec![("lag_1".to_string(), 40), ("hour".to_string(), 7)];
        let md = ReportRenderer::new("2024-01").model_markdown(&report(), &importance);
        assert!(md.contains("## Feature importance\n\n- lag_1: 40\n- hour: 7\n"));
    }

    #[test]
    fn zone_csv_is_sorted_by_mae() {
        let mut buf = Vec::new();
        ReportRenderer::new("2024-01")
            .write_zone_csv(&report(), &mut buf)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(ZONE_ERROR_FIELDS.join(",").as_str()));
        let ids: Vec<&str> = lines.map(|l| l.split(',').next().unwrap()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn segment_csv_is_sorted_by_mae() {
        let mut buf = Vec::new();
        ReportRenderer::new("2024-01")
            .write_segment_csv(&report(), &mut buf)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], SEGMENT_ERROR_FIELDS.join(","));
        assert!(lines[1].starts_with("4,18,6,"));
    }
}
