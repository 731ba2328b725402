use crate::infra::seed_demo;
use clap::Args;
use competency_core::calibration::aggregation::HistogramBucket;
use competency_core::calibration::{
    CalibrationReport, CalibrationService, InMemoryCalibrationStore,
};
use competency_core::error::AppError;
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the calibration report as JSON instead of tables
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryCalibrationStore::new());
    let service = CalibrationService::new(store.clone());
    let demo = seed_demo(&store, &service)?;
    let report = service.calibration_report(&demo.scope, demo.manager_group_id, demo.matrix_id)?;

    if args.json {
        let payload = serde_json::to_string_pretty(&report).map_err(std::io::Error::other)?;
        println!("{payload}");
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn render_report(report: &CalibrationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Calibration: {} ({} reviewees)",
        report.manager_group_name,
        report.members.len()
    );
    for member in &report.members {
        let general = member
            .level_assessments
            .iter()
            .find(|assessment| assessment.scope.is_general())
            .map(|assessment| format!("L{}.{}", assessment.main_level, assessment.sub_level))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<14} {:<10} {}",
            member.full_name,
            member.org_unit.as_deref().unwrap_or("-"),
            general
        );
    }

    let averages = &report.report.averages;
    let _ = writeln!(out, "\nAverage manager ratings");
    for row in &averages.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|cell| format!("{:>5}", cell.label()))
            .collect();
        let _ = writeln!(out, "  {:<14} {}", row.competency_title, cells.join(" "));
    }
    for rollup in &averages.area_rollups {
        let cells: Vec<String> = rollup
            .percentages
            .iter()
            .map(|value| match value {
                Some(value) => format!("{value:>4}%"),
                None => format!("{:>5}", "-"),
            })
            .collect();
        let _ = writeln!(out, "  [{}] {}", rollup.area_title, cells.join(" "));
    }

    let histogram = &report.report.level_histogram;
    let _ = writeln!(out, "\nLevel histogram");
    for row in &histogram.rows {
        let buckets: Vec<String> = HistogramBucket::ALL
            .iter()
            .map(|bucket| {
                let counts = row.buckets.get(bucket).copied().unwrap_or_default();
                format!("{}={:?}", bucket.key(), counts)
            })
            .collect();
        let _ = writeln!(out, "  L{} {}", row.main_level, buckets.join(" "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_report_lists_members_and_levels() {
        let store = Arc::new(InMemoryCalibrationStore::new());
        let service = CalibrationService::new(store.clone());
        let demo = seed_demo(&store, &service).expect("demo seeded");
        let report = service
            .calibration_report(&demo.scope, demo.manager_group_id, demo.matrix_id)
            .expect("report");

        let rendered = render_report(&report);

        assert!(rendered.starts_with("Calibration: Engineering calibration (4 reviewees)"));
        assert!(rendered.contains("Ada Park"));
        assert!(!rendered.contains("Eli Moss"));
        assert!(rendered.contains("[Craft]"));
        assert!(rendered.contains("L1 general="));
    }
}
