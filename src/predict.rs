//! Prediction runs: building the request for one student, merging the
//! response back, and the sequential bulk loop.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ItemError, PredictionError};
use crate::models::{
    Participation, Prediction, RiskLevel, SocioeconomicStatus, Student, YearLevel,
};
use crate::store::StudentStore;

pub const MIN_RECOMMENDATIONS: usize = 3;
pub const MAX_RECOMMENDATIONS: usize = 5;

/// Academic context sent to the prediction collaborator for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRequest {
    pub current_gpa: Option<f64>,
    pub previous_semester_gpa: Option<f64>,
    pub attendance_percentage: Option<f64>,
    pub internal_assessment_avg: Option<f64>,
    pub extracurricular_participation: Participation,
    pub socioeconomic_status: SocioeconomicStatus,
    pub year_level: YearLevel,
    pub major: String,
}

impl PredictionRequest {
    pub fn from_student(student: &Student) -> Self {
        PredictionRequest {
            current_gpa: student.current_gpa,
            previous_semester_gpa: student.previous_semester_gpa,
            attendance_percentage: student.attendance_percentage,
            internal_assessment_avg: student.internal_assessment_avg,
            extracurricular_participation: student.extracurricular_participation,
            socioeconomic_status: student.socioeconomic_status,
            year_level: student.year_level,
            major: student.major.clone(),
        }
    }

    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "Analyze this student's academic data and predict their performance:"
        );
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Student Profile:");
        let _ = writeln!(prompt, "- Current GPA: {}", metric(self.current_gpa));
        let _ = writeln!(
            prompt,
            "- Previous Semester GPA: {}",
            metric(self.previous_semester_gpa)
        );
        let _ = writeln!(prompt, "- Attendance: {}%", metric(self.attendance_percentage));
        let _ = writeln!(
            prompt,
            "- Internal Assessment Average: {}",
            metric(self.internal_assessment_avg)
        );
        let _ = writeln!(
            prompt,
            "- Extracurricular Participation: {}",
            self.extracurricular_participation
        );
        let _ = writeln!(prompt, "- Socioeconomic Status: {}", self.socioeconomic_status);
        let _ = writeln!(prompt, "- Year Level: {}", self.year_level);
        let _ = writeln!(prompt, "- Major: {}", self.major);
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Please predict:");
        let _ = writeln!(prompt, "1. Next semester GPA (0-4 scale)");
        let _ = writeln!(prompt, "2. Risk level (High/Medium/Low)");
        let _ = writeln!(prompt, "3. Confidence score (0-100%)");
        let _ = writeln!(
            prompt,
            "4. {MIN_RECOMMENDATIONS}-{MAX_RECOMMENDATIONS} specific recommendations for improvement"
        );
        let _ = writeln!(prompt);
        let _ = write!(
            prompt,
            "Consider factors like GPA trends, attendance patterns, and engagement levels."
        );
        prompt
    }
}

fn metric(value: Option<f64>) -> String {
    match value {
        Some(value) if value != 0.0 => value.to_string(),
        _ => "N/A".to_string(),
    }
}

/// Checks a prediction against the response contract.
pub fn validate_prediction(prediction: &Prediction) -> Result<(), PredictionError> {
    if !(0.0..=4.0).contains(&prediction.predicted_gpa) {
        return Err(PredictionError::Schema(format!(
            "predicted_gpa {} outside 0-4",
            prediction.predicted_gpa
        )));
    }
    if prediction.risk_level == RiskLevel::Unknown {
        return Err(PredictionError::Schema(
            "risk_level must be Low, Medium or High".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&prediction.confidence_score) {
        return Err(PredictionError::Schema(format!(
            "confidence_score {} outside 0-100",
            prediction.confidence_score
        )));
    }
    let count = prediction.recommendations.len();
    if !(MIN_RECOMMENDATIONS..=MAX_RECOMMENDATIONS).contains(&count) {
        return Err(PredictionError::Schema(format!(
            "expected {MIN_RECOMMENDATIONS}-{MAX_RECOMMENDATIONS} recommendations, got {count}"
        )));
    }
    Ok(())
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictionError>;
}

/// Students that have never received a prediction.
pub fn pending_predictions(students: &[Student]) -> Vec<Student> {
    students
        .iter()
        .filter(|student| student.predicted_gpa().is_none())
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    Running,
    Completed,
}

#[derive(Debug)]
pub enum ItemOutcome {
    Success(Student),
    Failure { student: Student, error: ItemError },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
    pub progress: Progress,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Stops a running batch before its next student. The in-flight prediction
/// is allowed to finish. Every run starts and ends with the flag cleared.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

pub struct BulkPredictionOrchestrator {
    predictor: Arc<dyn Predictor>,
    students: Arc<dyn StudentStore>,
    state: OrchestratorState,
    progress: Progress,
    cancel: CancelHandle,
}

impl BulkPredictionOrchestrator {
    pub fn new(predictor: Arc<dyn Predictor>, students: Arc<dyn StudentStore>) -> Self {
        BulkPredictionOrchestrator {
            predictor,
            students,
            state: OrchestratorState::Idle,
            progress: Progress::default(),
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// One prediction run: ask the predictor, merge the full response into a
    /// copy of the student and persist it.
    pub async fn predict_student(&self, student: &Student) -> Result<Student, ItemError> {
        let request = PredictionRequest::from_student(student);
        let prediction = self.predictor.predict(&request).await?;
        validate_prediction(&prediction)?;

        let mut updated = student.clone();
        updated.apply_prediction(prediction, Utc::now().date_naive());
        let saved = self.students.update_student(student.id, &updated).await?;
        debug!(student_id = %saved.student_id, risk = %saved.risk_level(), "prediction stored");
        Ok(saved)
    }

    /// Runs one prediction per student, strictly in order. A failed student
    /// is recorded and skipped; `on_complete` fires once after the last
    /// attempt, and not at all when the batch is cancelled or empty.
    pub async fn run<F, C>(
        &mut self,
        students: Vec<Student>,
        mut on_progress: F,
        on_complete: C,
    ) -> BatchReport
    where
        F: FnMut(Progress),
        C: FnOnce(),
    {
        self.cancel.reset();
        let total = students.len();
        let mut report = BatchReport::default();
        if total == 0 {
            return report;
        }

        info!(total, "starting bulk prediction run");
        self.state = OrchestratorState::Running;
        self.progress = Progress { current: 0, total };
        on_progress(self.progress);

        for (index, student) in students.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(attempted = index, total, "bulk prediction run cancelled");
                self.cancel.reset();
                self.state = OrchestratorState::Idle;
                report.progress = self.progress;
                report.cancelled = true;
                return report;
            }

            self.progress = Progress {
                current: index + 1,
                total,
            };
            on_progress(self.progress);

            let outcome = match self.predict_student(&student).await {
                Ok(saved) => ItemOutcome::Success(saved),
                Err(error) => {
                    warn!(
                        student_id = %student.student_id,
                        name = %student.full_name,
                        error = %error,
                        "prediction failed, continuing with next student"
                    );
                    ItemOutcome::Failure { student, error }
                }
            };
            report.outcomes.push(outcome);
        }

        self.cancel.reset();
        self.state = OrchestratorState::Completed;
        report.progress = self.progress;
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "bulk prediction run complete"
        );
        on_complete();
        report
    }
}
