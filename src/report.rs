use std::fmt::Write;

use chrono::NaiveDate;

use crate::filter::{self, StudentFilter};
use crate::models::{Intervention, RiskLevel, Student};
use crate::risk;
use crate::stats;

const RECENT_PREDICTIONS: usize = 8;

fn format_gpa(value: Option<f64>) -> String {
    value
        .map(|gpa| format!("{gpa:.2}"))
        .unwrap_or_else(|| "N/A".to_string())
}

fn join_or<T: ToString>(items: &[T], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn build_report(
    generated_on: NaiveDate,
    students: &[Student],
    interventions: &[Intervention],
    watchlist_limit: usize,
) -> String {
    let cohort = stats::cohort_stats(students, interventions);
    let distribution = stats::risk_distribution(students);
    let histogram = stats::intervention_type_histogram(interventions);

    let mut output = String::new();

    let _ = writeln!(output, "# Student Risk Report");
    let _ = writeln!(
        output,
        "Generated {} for {} students",
        generated_on, cohort.total
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Cohort Overview");
    let _ = writeln!(output, "- Average current GPA: {:.2}", cohort.avg_current_gpa);
    let _ = writeln!(output, "- Average predicted GPA: {:.2}", cohort.avg_predicted_gpa);
    let _ = writeln!(
        output,
        "- Average attendance: {:.1}% ({})",
        cohort.avg_attendance,
        stats::attendance_rating(cohort.avg_attendance)
    );
    let _ = writeln!(output, "- Improving students: {}", cohort.improving_count);
    let _ = writeln!(output, "- High risk students: {}", cohort.high_risk_count);
    let _ = writeln!(
        output,
        "- Students with active support: {}",
        cohort.with_active_intervention_count
    );
    let _ = writeln!(output, "- Honor roll (GPA above 3.5): {}", cohort.honor_roll_count);
    let _ = writeln!(
        output,
        "- Attendance at or above 95%: {}",
        cohort.high_attendance_count
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Distribution");
    if distribution.is_empty() {
        let _ = writeln!(output, "No students on file.");
    } else {
        for level in RiskLevel::ALL {
            if let Some(count) = distribution.get(level) {
                let _ = writeln!(output, "- {}: {}", level, count);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Intervention Mix");
    if histogram.is_empty() {
        let _ = writeln!(output, "No interventions recorded.");
    } else {
        for entry in &histogram {
            let _ = writeln!(output, "- {}: {}", entry.intervention_type, entry.count);
        }
    }

    let recent = stats::recent_predictions(students, RECENT_PREDICTIONS);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent AI Predictions");
    if recent.is_empty() {
        let _ = writeln!(output, "No predictions generated yet.");
    } else {
        for student in &recent {
            let trend = student.predicted_gpa().unwrap_or(0.0) - student.current_gpa.unwrap_or(0.0);
            let _ = writeln!(
                output,
                "- {} ({}) {} risk; GPA {} -> {} ({:+.2}); predicted {}",
                student.full_name,
                student.major,
                student.risk_level(),
                format_gpa(student.current_gpa),
                format_gpa(student.predicted_gpa()),
                trend,
                student
                    .prediction
                    .as_ref()
                    .map(|record| record.last_prediction_date.to_string())
                    .unwrap_or_default()
            );
        }
    }

    let watchlist: Vec<Student> = filter::apply(students, &StudentFilter::default())
        .into_iter()
        .filter(|student| matches!(student.risk_level(), RiskLevel::High | RiskLevel::Medium))
        .take(watchlist_limit)
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students Requiring Attention");
    if watchlist.is_empty() {
        let _ = writeln!(output, "All students are doing well!");
    } else {
        for student in &watchlist {
            let assessment = risk::classify_risk(student);
            let suggestions: Vec<_> = risk::suggest_interventions(student)
                .into_iter()
                .map(|s| s.intervention_type)
                .collect();
            let active = risk::active_interventions(student, interventions);

            let _ = writeln!(
                output,
                "- {} ({}, {} {}) {} risk; factors: {}; suggested: {}{}",
                student.full_name,
                student.student_id,
                student.major,
                student.year_level,
                assessment.level,
                join_or(&assessment.factors, "none"),
                join_or(&suggestions, "none"),
                if active.is_empty() { "" } else { "; support active" }
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InterventionStatus, InterventionType};
    use crate::risk::tests::{predicted, student};
    use uuid::Uuid;

    #[test]
    fn empty_report_has_placeholders() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let report = build_report(date, &[], &[], 10);
        assert!(report.contains("Generated 2026-03-02 for 0 students"));
        assert!(report.contains("Average current GPA: 0.00"));
        assert!(report.contains("No students on file."));
        assert!(report.contains("No interventions recorded."));
        assert!(report.contains("All students are doing well!"));
        assert!(report.contains("No predictions generated yet."));
    }

    #[test]
    fn watchlist_orders_by_severity() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let students = vec![
            predicted(student("S-1", Some(2.6), Some(80.0)), 2.7, RiskLevel::Medium),
            predicted(student("S-2", Some(3.6), Some(96.0)), 3.7, RiskLevel::Low),
            predicted(student("S-3", Some(1.9), Some(55.0)), 1.8, RiskLevel::High),
        ];
        let interventions = vec![Intervention {
            id: Uuid::new_v4(),
            student_id: "S-3".to_string(),
            intervention_type: InterventionType::Tutoring,
            description: "calculus tutoring".to_string(),
            target_date: None,
            status: InterventionStatus::InProgress,
            assigned_by: "Advisor".to_string(),
            start_date: date,
        }];

        let report = build_report(date, &students, &interventions, 10);
        let high = report.find("Student S-3 (S-3").unwrap();
        let medium = report.find("Student S-1 (S-1").unwrap();
        assert!(high < medium);
        assert!(!report.contains("Student S-2 (S-2"));
        assert!(report.contains(
            "factors: poor attendance, low GPA, declining trend; suggested: Attendance Monitoring, Tutoring, Academic Coaching; support active"
        ));
        assert!(report.contains("- Tutoring: 1"));
        assert!(report.contains("- High: 1"));
        assert!(report.contains(
            "- Student S-3 (Biology) High risk; GPA 1.90 -> 1.80 (-0.10); predicted 2026-03-01"
        ));
    }
}
