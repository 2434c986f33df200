use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::models::{
    Intervention, InterventionStatus, InterventionType, NewIntervention, RiskLevel, Student,
};

pub const ATTENDANCE_FLOOR: f64 = 75.0;
pub const GPA_FLOOR: f64 = 2.5;
pub const ASSESSMENT_FLOOR: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskFactor {
    PoorAttendance,
    LowGpa,
    DecliningTrend,
    LowAssessmentScores,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskFactor::PoorAttendance => "poor attendance",
            RiskFactor::LowGpa => "low GPA",
            RiskFactor::DecliningTrend => "declining trend",
            RiskFactor::LowAssessmentScores => "low assessment scores",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterventionSuggestion {
    pub intervention_type: InterventionType,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    Excellent,
    Good,
    NeedsImprovement,
    AtRisk,
}

impl fmt::Display for PerformanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PerformanceStatus::Excellent => "Excellent",
            PerformanceStatus::Good => "Good",
            PerformanceStatus::NeedsImprovement => "Needs Improvement",
            PerformanceStatus::AtRisk => "At Risk",
        })
    }
}

/// GPA-only band shown next to the current GPA on a risk card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeStatus {
    Excellent,
    Good,
    Average,
    BelowAverage,
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GradeStatus::Excellent => "Excellent",
            GradeStatus::Good => "Good",
            GradeStatus::Average => "Average",
            GradeStatus::BelowAverage => "Below Average",
        })
    }
}

/// Explains a student's stored risk level. The level itself comes from the
/// last prediction run; only the factors are derived here. Absent metrics
/// count as zero, so a student with no attendance on file is flagged.
pub fn classify_risk(student: &Student) -> RiskAssessment {
    let mut factors = Vec::new();

    if student.attendance_percentage.unwrap_or(0.0) < ATTENDANCE_FLOOR {
        factors.push(RiskFactor::PoorAttendance);
    }
    if student.current_gpa.unwrap_or(0.0) < GPA_FLOOR {
        factors.push(RiskFactor::LowGpa);
    }
    if let (Some(predicted), Some(current)) = (student.predicted_gpa(), student.current_gpa) {
        if predicted < current {
            factors.push(RiskFactor::DecliningTrend);
        }
    }
    if student.internal_assessment_avg.unwrap_or(0.0) < ASSESSMENT_FLOOR {
        factors.push(RiskFactor::LowAssessmentScores);
    }

    RiskAssessment {
        level: student.risk_level(),
        factors,
    }
}

pub fn suggest_interventions(student: &Student) -> Vec<InterventionSuggestion> {
    let mut suggestions = Vec::new();

    if student.attendance_percentage.unwrap_or(0.0) < ATTENDANCE_FLOOR {
        suggestions.push(InterventionSuggestion {
            intervention_type: InterventionType::AttendanceMonitoring,
            description: "Weekly check-ins to improve attendance and identify barriers",
        });
    }
    if student.current_gpa.unwrap_or(0.0) < GPA_FLOOR {
        suggestions.push(InterventionSuggestion {
            intervention_type: InterventionType::Tutoring,
            description: "One-on-one tutoring sessions for core subjects",
        });
    }
    if student.risk_level() == RiskLevel::High {
        suggestions.push(InterventionSuggestion {
            intervention_type: InterventionType::AcademicCoaching,
            description: "Comprehensive academic support and study skills development",
        });
    }

    suggestions
}

pub fn performance_status(student: &Student) -> PerformanceStatus {
    band_performance(
        student.current_gpa.unwrap_or(0.0),
        student.attendance_percentage.unwrap_or(0.0),
    )
}

fn band_performance(gpa: f64, attendance: f64) -> PerformanceStatus {
    if gpa >= 3.5 && attendance >= 90.0 {
        PerformanceStatus::Excellent
    } else if gpa >= 3.0 && attendance >= 80.0 {
        PerformanceStatus::Good
    } else if gpa >= 2.5 || attendance >= 70.0 {
        PerformanceStatus::NeedsImprovement
    } else {
        PerformanceStatus::AtRisk
    }
}

pub fn grade_status(student: &Student) -> Option<GradeStatus> {
    let gpa = student.current_gpa.filter(|gpa| *gpa != 0.0)?;
    Some(match gpa {
        g if g >= 3.5 => GradeStatus::Excellent,
        g if g >= 3.0 => GradeStatus::Good,
        g if g >= 2.5 => GradeStatus::Average,
        _ => GradeStatus::BelowAverage,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpaTrend {
    /// Predicted minus current GPA.
    pub delta: f64,
    /// Size of the change relative to the current GPA, always non-negative.
    pub percent: f64,
}

impl GpaTrend {
    pub fn is_improving(&self) -> bool {
        self.delta > 0.0
    }
}

/// `None` unless both the current and the predicted GPA are on file and
/// non-zero.
pub fn gpa_trend(student: &Student) -> Option<GpaTrend> {
    let current = student.current_gpa.filter(|gpa| *gpa != 0.0)?;
    let predicted = student.predicted_gpa().filter(|gpa| *gpa != 0.0)?;
    let delta = predicted - current;
    Some(GpaTrend {
        delta,
        percent: (delta / current * 100.0).abs(),
    })
}

/// Days between an intervention's start and its default target date.
pub const DEFAULT_TARGET_DAYS: i64 = 30;

/// Builds a new intervention for a student. Without an explicit description
/// the type must be one of the student's current suggestions; its text is
/// used and the target date defaults to `today` plus 30 days.
pub fn plan_intervention(
    student: &Student,
    intervention_type: InterventionType,
    description: Option<String>,
    target_date: Option<NaiveDate>,
    assigned_by: String,
    today: NaiveDate,
) -> Result<NewIntervention, String> {
    let (description, target_date) = match description {
        Some(description) => (description, target_date),
        None => {
            let suggestion = suggest_interventions(student)
                .into_iter()
                .find(|s| s.intervention_type == intervention_type)
                .ok_or_else(|| {
                    format!(
                        "a description is required: {intervention_type} is not a suggested intervention for {}",
                        student.student_id
                    )
                })?;
            (
                suggestion.description.to_string(),
                target_date.or(Some(today + Duration::days(DEFAULT_TARGET_DAYS))),
            )
        }
    };

    Ok(NewIntervention {
        student_id: student.student_id.clone(),
        intervention_type,
        description,
        target_date,
        status: InterventionStatus::Pending,
        assigned_by,
        start_date: today,
    })
}

/// Interventions currently in progress for this student, matched on the
/// business key.
pub fn active_interventions<'a>(
    student: &Student,
    interventions: &'a [Intervention],
) -> Vec<&'a Intervention> {
    interventions
        .iter()
        .filter(|intervention| intervention.student_id == student.student_id)
        .filter(|intervention| intervention.is_active())
        .collect()
}
