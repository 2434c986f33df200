use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a closed enum whose variants map one-to-one onto the labels the
/// storage layer and the LLM exchange. Parsing also accepts the snake_case
/// spelling (`study_group` for `Study Group`).
macro_rules! labeled_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let wanted = value.trim().replace('_', " ");
                $name::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(&wanted))
                    .ok_or_else(|| format!("unknown {} '{}'", stringify!($name), value))
            }
        }
    };
}

labeled_enum!(
    YearLevel {
        First => "1st Year",
        Second => "2nd Year",
        Third => "3rd Year",
        Fourth => "4th Year",
        Graduate => "Graduate",
    }
);

labeled_enum!(
    #[derive(Default)]
    Participation {
        High => "High",
        Medium => "Medium",
        Low => "Low",
        #[default]
        None => "None",
    }
);

labeled_enum!(
    #[derive(Default)]
    SocioeconomicStatus {
        High => "High",
        Medium => "Medium",
        Low => "Low",
        #[default]
        NotDisclosed => "Not Disclosed",
    }
);

labeled_enum!(
    /// AI-assigned risk band. `Unknown` stands in for a student that has never
    /// been through a prediction run.
    #[derive(Default)]
    RiskLevel {
        High => "High",
        Medium => "Medium",
        Low => "Low",
        #[default]
        Unknown => "Unknown",
    }
);

impl RiskLevel {
    /// Severity rank used for ordering: High > Medium > Low > Unknown.
    pub fn severity(&self) -> u8 {
        match self {
            RiskLevel::High => 3,
            RiskLevel::Medium => 2,
            RiskLevel::Low => 1,
            RiskLevel::Unknown => 0,
        }
    }
}

labeled_enum!(
    InterventionType {
        Tutoring => "Tutoring",
        Counseling => "Counseling",
        StudyGroup => "Study Group",
        AttendanceMonitoring => "Attendance Monitoring",
        AcademicCoaching => "Academic Coaching",
        Other => "Other",
    }
);

labeled_enum!(
    #[derive(Default)]
    InterventionStatus {
        #[default]
        Pending => "Pending",
        InProgress => "In Progress",
        Completed => "Completed",
    }
);

impl InterventionStatus {
    pub fn can_transition_to(&self, next: InterventionStatus) -> bool {
        matches!(
            (self, next),
            (InterventionStatus::Pending, InterventionStatus::InProgress)
                | (InterventionStatus::Pending, InterventionStatus::Completed)
                | (InterventionStatus::InProgress, InterventionStatus::Completed)
        )
    }
}

/// Output of one prediction run, exactly as the prediction collaborator
/// returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_gpa: f64,
    pub risk_level: RiskLevel,
    pub confidence_score: f64,
    pub recommendations: Vec<String>,
}

/// A prediction stored on a student. The four prediction fields and the run
/// date only ever exist together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub last_prediction_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub student_id: String,
    pub full_name: String,
    pub email: String,
    pub major: String,
    pub year_level: YearLevel,
    pub current_gpa: Option<f64>,
    pub previous_semester_gpa: Option<f64>,
    pub attendance_percentage: Option<f64>,
    pub internal_assessment_avg: Option<f64>,
    #[serde(default)]
    pub extracurricular_participation: Participation,
    #[serde(default)]
    pub socioeconomic_status: SocioeconomicStatus,
    #[serde(flatten)]
    pub prediction: Option<PredictionRecord>,
}

impl Student {
    pub fn risk_level(&self) -> RiskLevel {
        self.prediction
            .as_ref()
            .map(|record| record.prediction.risk_level)
            .unwrap_or_default()
    }

    pub fn predicted_gpa(&self) -> Option<f64> {
        self.prediction
            .as_ref()
            .map(|record| record.prediction.predicted_gpa)
    }

    pub fn recommendations(&self) -> &[String] {
        self.prediction
            .as_ref()
            .map(|record| record.prediction.recommendations.as_slice())
            .unwrap_or(&[])
    }

    /// Replaces the whole prediction group in one step.
    pub fn apply_prediction(&mut self, prediction: Prediction, predicted_on: NaiveDate) {
        self.prediction = Some(PredictionRecord {
            prediction,
            last_prediction_date: predicted_on,
        });
    }
}

/// Fields accepted when creating a student; identity and predictions are
/// assigned later.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub student_id: String,
    pub full_name: String,
    pub email: String,
    pub major: String,
    pub year_level: YearLevel,
    pub current_gpa: Option<f64>,
    pub previous_semester_gpa: Option<f64>,
    pub attendance_percentage: Option<f64>,
    pub internal_assessment_avg: Option<f64>,
    #[serde(default)]
    pub extracurricular_participation: Participation,
    #[serde(default)]
    pub socioeconomic_status: SocioeconomicStatus,
}

impl NewStudent {
    pub fn validate(&self) -> Result<(), String> {
        if self.student_id.trim().is_empty() {
            return Err("student_id is required".to_string());
        }
        if self.full_name.trim().is_empty() {
            return Err(format!("{}: full_name is required", self.student_id));
        }
        let bounded = [
            ("current_gpa", self.current_gpa, 4.0),
            ("previous_semester_gpa", self.previous_semester_gpa, 4.0),
            ("attendance_percentage", self.attendance_percentage, 100.0),
            ("internal_assessment_avg", self.internal_assessment_avg, 100.0),
        ];
        for (field, value, max) in bounded {
            if let Some(value) = value {
                if !(0.0..=max).contains(&value) {
                    return Err(format!(
                        "{}: {field} {value} outside 0-{max}",
                        self.student_id
                    ));
                }
            }
        }
        Ok(())
    }
}

impl From<&Student> for NewStudent {
    fn from(student: &Student) -> Self {
        NewStudent {
            student_id: student.student_id.clone(),
            full_name: student.full_name.clone(),
            email: student.email.clone(),
            major: student.major.clone(),
            year_level: student.year_level,
            current_gpa: student.current_gpa,
            previous_semester_gpa: student.previous_semester_gpa,
            attendance_percentage: student.attendance_percentage,
            internal_assessment_avg: student.internal_assessment_avg,
            extracurricular_participation: student.extracurricular_participation,
            socioeconomic_status: student.socioeconomic_status,
        }
    }
}

/// Corrections to an existing student. Unset fields keep their stored value
/// and the prediction group is never touched.
#[derive(Debug, Clone, Default)]
pub struct StudentEdit {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub major: Option<String>,
    pub year_level: Option<YearLevel>,
    pub current_gpa: Option<f64>,
    pub previous_semester_gpa: Option<f64>,
    pub attendance_percentage: Option<f64>,
    pub internal_assessment_avg: Option<f64>,
    pub extracurricular_participation: Option<Participation>,
    pub socioeconomic_status: Option<SocioeconomicStatus>,
}

impl StudentEdit {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.major.is_none()
            && self.year_level.is_none()
            && self.current_gpa.is_none()
            && self.previous_semester_gpa.is_none()
            && self.attendance_percentage.is_none()
            && self.internal_assessment_avg.is_none()
            && self.extracurricular_participation.is_none()
            && self.socioeconomic_status.is_none()
    }

    /// Returns the edited copy, checked against the same bounds as a new
    /// student.
    pub fn apply(&self, student: &Student) -> Result<Student, String> {
        let mut updated = student.clone();
        if let Some(full_name) = &self.full_name {
            updated.full_name = full_name.clone();
        }
        if let Some(email) = &self.email {
            updated.email = email.clone();
        }
        if let Some(major) = &self.major {
            updated.major = major.clone();
        }
        if let Some(year_level) = self.year_level {
            updated.year_level = year_level;
        }
        if self.current_gpa.is_some() {
            updated.current_gpa = self.current_gpa;
        }
        if self.previous_semester_gpa.is_some() {
            updated.previous_semester_gpa = self.previous_semester_gpa;
        }
        if self.attendance_percentage.is_some() {
            updated.attendance_percentage = self.attendance_percentage;
        }
        if self.internal_assessment_avg.is_some() {
            updated.internal_assessment_avg = self.internal_assessment_avg;
        }
        if let Some(participation) = self.extracurricular_participation {
            updated.extracurricular_participation = participation;
        }
        if let Some(status) = self.socioeconomic_status {
            updated.socioeconomic_status = status;
        }

        NewStudent::from(&updated).validate()?;
        Ok(updated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: Uuid,
    /// Business key of the student (`Student::student_id`), not the storage id.
    pub student_id: String,
    pub intervention_type: InterventionType,
    pub description: String,
    pub target_date: Option<NaiveDate>,
    pub status: InterventionStatus,
    pub assigned_by: String,
    pub start_date: NaiveDate,
}

impl Intervention {
    pub fn is_active(&self) -> bool {
        self.status == InterventionStatus::InProgress
    }
}

#[derive(Debug, Clone)]
pub struct NewIntervention {
    pub student_id: String,
    pub intervention_type: InterventionType,
    pub description: String,
    pub target_date: Option<NaiveDate>,
    pub status: InterventionStatus,
    pub assigned_by: String,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub full_name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_in_either_spelling() {
        assert_eq!("Study Group".parse::<InterventionType>(), Ok(InterventionType::StudyGroup));
        assert_eq!("study_group".parse::<InterventionType>(), Ok(InterventionType::StudyGroup));
        assert_eq!("in progress".parse::<InterventionStatus>(), Ok(InterventionStatus::InProgress));
        assert_eq!("1st Year".parse::<YearLevel>(), Ok(YearLevel::First));
        assert!("Critical".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn edit_overlays_only_given_fields() {
        let original = crate::risk::tests::predicted(
            crate::risk::tests::student("S-1", Some(2.4), Some(71.0)),
            2.6,
            RiskLevel::Medium,
        );
        let edit = StudentEdit {
            current_gpa: Some(2.9),
            year_level: Some(YearLevel::Third),
            ..StudentEdit::default()
        };
        assert!(!edit.is_empty());

        let updated = edit.apply(&original).unwrap();
        assert_eq!(updated.current_gpa, Some(2.9));
        assert_eq!(updated.year_level, YearLevel::Third);
        assert_eq!(updated.attendance_percentage, Some(71.0));
        assert_eq!(updated.full_name, original.full_name);
        assert_eq!(updated.prediction, original.prediction);
    }

    #[test]
    fn edit_is_bounds_checked() {
        let original = crate::risk::tests::student("S-2", Some(3.0), Some(88.0));
        let edit = StudentEdit {
            attendance_percentage: Some(104.0),
            ..StudentEdit::default()
        };
        assert_eq!(
            edit.apply(&original),
            Err("S-2: attendance_percentage 104 outside 0-100".to_string())
        );
        assert!(StudentEdit::default().is_empty());
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(InterventionStatus::Pending.can_transition_to(InterventionStatus::InProgress));
        assert!(InterventionStatus::InProgress.can_transition_to(InterventionStatus::Completed));
        assert!(!InterventionStatus::Completed.can_transition_to(InterventionStatus::Pending));
        assert!(!InterventionStatus::InProgress.can_transition_to(InterventionStatus::InProgress));
    }

    #[test]
    fn new_student_bounds_are_checked() {
        let mut fields = NewStudent {
            student_id: "S-1".to_string(),
            full_name: "Sam Ortiz".to_string(),
            email: "sam@example.edu".to_string(),
            major: "Economics".to_string(),
            year_level: YearLevel::Third,
            current_gpa: Some(3.2),
            previous_semester_gpa: None,
            attendance_percentage: Some(92.0),
            internal_assessment_avg: Some(78.0),
            extracurricular_participation: Participation::default(),
            socioeconomic_status: SocioeconomicStatus::default(),
        };
        assert!(fields.validate().is_ok());

        fields.current_gpa = Some(4.3);
        assert_eq!(
            fields.validate(),
            Err("S-1: current_gpa 4.3 outside 0-4".to_string())
        );
    }

    #[test]
    fn student_without_prediction_is_unknown_risk() {
        let student = crate::risk::tests::student("S-1", Some(3.1), Some(88.0));
        assert_eq!(student.risk_level(), RiskLevel::Unknown);
        assert_eq!(student.predicted_gpa(), None);
        assert!(student.recommendations().is_empty());
    }
}
