use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::models::{Intervention, InterventionType, RiskLevel, Student};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortStats {
    pub total: usize,
    pub avg_current_gpa: f64,
    pub avg_predicted_gpa: f64,
    pub avg_attendance: f64,
    pub improving_count: usize,
    pub high_risk_count: usize,
    pub with_active_intervention_count: usize,
    pub honor_roll_count: usize,
    pub high_attendance_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub intervention_type: InterventionType,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceRating {
    Excellent,
    Good,
    NeedsImprovement,
}

impl fmt::Display for AttendanceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttendanceRating::Excellent => "Excellent",
            AttendanceRating::Good => "Good",
            AttendanceRating::NeedsImprovement => "Needs Improvement",
        })
    }
}

pub fn risk_distribution(students: &[Student]) -> HashMap<RiskLevel, usize> {
    let mut counts = HashMap::new();
    for student in students {
        *counts.entry(student.risk_level()).or_insert(0) += 1;
    }
    counts
}

/// Cohort-level figures. Averages divide by the full cohort size and count a
/// missing value as zero; an empty cohort yields zero averages.
pub fn cohort_stats(students: &[Student], interventions: &[Intervention]) -> CohortStats {
    let total = students.len();

    let current_sum: f64 = students.iter().map(|s| s.current_gpa.unwrap_or(0.0)).sum();
    let predicted_sum: f64 = students.iter().map(|s| s.predicted_gpa().unwrap_or(0.0)).sum();
    let attendance_sum: f64 = students
        .iter()
        .map(|s| s.attendance_percentage.unwrap_or(0.0))
        .sum();

    let improving_count = students
        .iter()
        .filter(|s| match s.predicted_gpa() {
            Some(predicted) => predicted > s.current_gpa.unwrap_or(0.0),
            None => false,
        })
        .count();

    let high_risk_count = students
        .iter()
        .filter(|s| s.risk_level() == RiskLevel::High)
        .count();

    let with_active_intervention_count = students
        .iter()
        .filter(|s| {
            interventions
                .iter()
                .any(|i| i.student_id == s.student_id && i.is_active())
        })
        .count();

    let honor_roll_count = students
        .iter()
        .filter(|s| s.current_gpa.unwrap_or(0.0) > 3.5)
        .count();

    let high_attendance_count = students
        .iter()
        .filter(|s| s.attendance_percentage.unwrap_or(0.0) >= 95.0)
        .count();

    CohortStats {
        total,
        avg_current_gpa: mean(current_sum, total),
        avg_predicted_gpa: mean(predicted_sum, total),
        avg_attendance: mean(attendance_sum, total),
        improving_count,
        high_risk_count,
        with_active_intervention_count,
        honor_roll_count,
        high_attendance_count,
    }
}

/// Counts interventions per type, in order of first appearance.
pub fn intervention_type_histogram(interventions: &[Intervention]) -> Vec<TypeCount> {
    let mut positions: HashMap<InterventionType, usize> = HashMap::new();
    let mut histogram: Vec<TypeCount> = Vec::new();

    for intervention in interventions {
        match positions.get(&intervention.intervention_type) {
            Some(&index) => histogram[index].count += 1,
            None => {
                positions.insert(intervention.intervention_type, histogram.len());
                histogram.push(TypeCount {
                    intervention_type: intervention.intervention_type,
                    count: 1,
                });
            }
        }
    }

    histogram
}

/// Students with a stored prediction, most recently predicted first. Ties
/// keep their input order.
pub fn recent_predictions(students: &[Student], limit: usize) -> Vec<&Student> {
    let mut recent: Vec<&Student> = students
        .iter()
        .filter(|student| student.prediction.is_some())
        .collect();
    recent.sort_by_key(|student| {
        Reverse(
            student
                .prediction
                .as_ref()
                .map(|record| record.last_prediction_date),
        )
    });
    recent.truncate(limit);
    recent
}

pub fn attendance_rating(avg_attendance: f64) -> AttendanceRating {
    if avg_attendance > 85.0 {
        AttendanceRating::Excellent
    } else if avg_attendance > 75.0 {
        AttendanceRating::Good
    } else {
        AttendanceRating::NeedsImprovement
    }
}

fn mean(sum: f64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        sum / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InterventionStatus;
    use crate::risk::tests::{predicted, student};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn intervention(student_id: &str, kind: InterventionType, status: InterventionStatus) -> Intervention {
        Intervention {
            id: Uuid::new_v4(),
            student_id: student_id.to_string(),
            intervention_type: kind,
            description: "support plan".to_string(),
            target_date: None,
            status,
            assigned_by: "Advisor".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
        }
    }

    #[test]
    fn distribution_counts_missing_level_as_unknown() {
        let students = vec![
            predicted(student("S-1", Some(2.0), Some(70.0)), 1.8, RiskLevel::High),
            student("S-2", Some(3.0), Some(90.0)),
        ];
        let expected = HashMap::from([(RiskLevel::High, 1), (RiskLevel::Unknown, 1)]);
        assert_eq!(risk_distribution(&students), expected);
    }

    #[test]
    fn empty_cohort_has_zero_averages() {
        let stats = cohort_stats(&[], &[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.avg_current_gpa, 0.0);
        assert_eq!(stats.avg_predicted_gpa, 0.0);
        assert_eq!(stats.avg_attendance, 0.0);
        assert_eq!(stats.improving_count, 0);
    }

    #[test]
    fn averages_divide_by_cohort_size() {
        let students = vec![
            predicted(student("S-1", Some(3.0), Some(80.0)), 3.4, RiskLevel::Low),
            student("S-2", None, Some(90.0)),
        ];
        let stats = cohort_stats(&students, &[]);
        assert_eq!(stats.total, 2);
        assert!((stats.avg_current_gpa - 1.5).abs() < 1e-9);
        assert!((stats.avg_predicted_gpa - 1.7).abs() < 1e-9);
        assert!((stats.avg_attendance - 85.0).abs() < 1e-9);
        assert_eq!(stats.improving_count, 1);
    }

    #[test]
    fn counts_students_with_active_support() {
        let students = vec![
            predicted(student("S-1", Some(2.0), Some(60.0)), 1.9, RiskLevel::High),
            predicted(student("S-2", Some(3.8), Some(97.0)), 3.7, RiskLevel::Low),
            student("S-3", Some(2.9), Some(80.0)),
        ];
        let interventions = vec![
            intervention("S-1", InterventionType::Tutoring, InterventionStatus::InProgress),
            intervention("S-1", InterventionType::Counseling, InterventionStatus::InProgress),
            intervention("S-3", InterventionType::StudyGroup, InterventionStatus::Pending),
        ];
        let stats = cohort_stats(&students, &interventions);
        assert_eq!(stats.with_active_intervention_count, 1);
        assert_eq!(stats.high_risk_count, 1);
        assert_eq!(stats.improving_count, 0);
        assert_eq!(stats.honor_roll_count, 1);
        assert_eq!(stats.high_attendance_count, 1);
    }

    #[test]
    fn histogram_keeps_first_seen_order() {
        let interventions = vec![
            intervention("S-1", InterventionType::Tutoring, InterventionStatus::Pending),
            intervention("S-2", InterventionType::AttendanceMonitoring, InterventionStatus::Pending),
            intervention("S-3", InterventionType::Tutoring, InterventionStatus::Completed),
        ];
        assert_eq!(
            intervention_type_histogram(&interventions),
            vec![
                TypeCount {
                    intervention_type: InterventionType::Tutoring,
                    count: 2,
                },
                TypeCount {
                    intervention_type: InterventionType::AttendanceMonitoring,
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn attendance_rating_tiers() {
        assert_eq!(attendance_rating(90.0), AttendanceRating::Excellent);
        assert_eq!(attendance_rating(85.0), AttendanceRating::Good);
        assert_eq!(attendance_rating(75.0), AttendanceRating::NeedsImprovement);
    }

    #[test]
    fn recent_predictions_are_newest_first() {
        let date = |day| NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        let mut older = predicted(student("S-1", Some(3.0), Some(90.0)), 3.1, RiskLevel::Low);
        let mut newer = predicted(student("S-2", Some(2.0), Some(60.0)), 1.8, RiskLevel::High);
        let mut tied = predicted(student("S-3", Some(2.6), Some(78.0)), 2.7, RiskLevel::Medium);
        for (record, day) in [(&mut older, 2), (&mut newer, 9), (&mut tied, 2)] {
            if let Some(prediction) = record.prediction.as_mut() {
                prediction.last_prediction_date = date(day);
            }
        }
        let students = vec![older, student("S-4", Some(3.5), Some(97.0)), newer, tied];

        let ids: Vec<_> = recent_predictions(&students, 8)
            .iter()
            .map(|s| s.student_id.as_str())
            .collect();
        assert_eq!(ids, vec!["S-2", "S-1", "S-3"]);
        assert_eq!(recent_predictions(&students, 1).len(), 1);
    }
}
