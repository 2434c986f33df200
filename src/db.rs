use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::{
    Intervention, InterventionStatus, InterventionType, NewIntervention, NewStudent,
    Participation, Prediction, PredictionRecord, SocioeconomicStatus, Student, YearLevel,
};
use crate::store::{InterventionStore, SortSpec, StudentStore};

const STUDENT_COLUMNS: &str = "id, student_id, full_name, email, major, year_level, \
     current_gpa, previous_semester_gpa, attendance_percentage, internal_assessment_avg, \
     extracurricular_participation, socioeconomic_status, predicted_gpa, risk_level, \
     confidence_score, recommendations, last_prediction_date";

const INTERVENTION_COLUMNS: &str =
    "id, student_id, intervention_type, description, target_date, status, assigned_by, start_date";

const STUDENT_SORTS: &[&str] = &[
    "created_date",
    "updated_date",
    "student_id",
    "full_name",
    "current_gpa",
    "predicted_gpa",
    "attendance_percentage",
    "last_prediction_date",
];

const INTERVENTION_SORTS: &[&str] = &[
    "created_date",
    "updated_date",
    "start_date",
    "target_date",
    "status",
    "intervention_type",
];

pub async fn init_db(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed student and intervention store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn order_clause(sort: Option<&SortSpec>, allowed: &[&str]) -> Result<String, StorageError> {
    let sort = match sort {
        Some(sort) => sort,
        None => return Ok(String::from(" ORDER BY created_date ASC")),
    };
    if !allowed.contains(&sort.field.as_str()) {
        return Err(StorageError::InvalidSort(sort.to_string()));
    }
    let direction = if sort.descending { "DESC" } else { "ASC" };
    Ok(format!(" ORDER BY {} {} NULLS LAST, id", sort.field, direction))
}

fn parse_label<T: FromStr<Err = String>>(value: &str) -> Result<T, StorageError> {
    value.parse().map_err(StorageError::Validation)
}

fn student_from_row(row: &PgRow) -> Result<Student, StorageError> {
    let predicted_gpa: Option<f64> = row.try_get("predicted_gpa")?;
    let risk_level: Option<String> = row.try_get("risk_level")?;
    let confidence_score: Option<f64> = row.try_get("confidence_score")?;
    let recommendations: Option<Vec<String>> = row.try_get("recommendations")?;
    let last_prediction_date: Option<NaiveDate> = row.try_get("last_prediction_date")?;

    let prediction = match (
        predicted_gpa,
        risk_level,
        confidence_score,
        recommendations,
        last_prediction_date,
    ) {
        (Some(predicted_gpa), Some(risk), Some(confidence_score), Some(recommendations), Some(date)) => {
            Some(PredictionRecord {
                prediction: Prediction {
                    predicted_gpa,
                    risk_level: parse_label(&risk)?,
                    confidence_score,
                    recommendations,
                },
                last_prediction_date: date,
            })
        }
        _ => None,
    };

    let year_level: String = row.try_get("year_level")?;
    let participation: String = row.try_get("extracurricular_participation")?;
    let socioeconomic: String = row.try_get("socioeconomic_status")?;

    Ok(Student {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        major: row.try_get("major")?,
        year_level: parse_label::<YearLevel>(&year_level)?,
        current_gpa: row.try_get("current_gpa")?,
        previous_semester_gpa: row.try_get("previous_semester_gpa")?,
        attendance_percentage: row.try_get("attendance_percentage")?,
        internal_assessment_avg: row.try_get("internal_assessment_avg")?,
        extracurricular_participation: parse_label::<Participation>(&participation)?,
        socioeconomic_status: parse_label::<SocioeconomicStatus>(&socioeconomic)?,
        prediction,
    })
}

fn intervention_from_row(row: &PgRow) -> Result<Intervention, StorageError> {
    let intervention_type: String = row.try_get("intervention_type")?;
    let status: String = row.try_get("status")?;

    Ok(Intervention {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        intervention_type: parse_label::<InterventionType>(&intervention_type)?,
        description: row.try_get("description")?,
        target_date: row.try_get("target_date")?,
        status: parse_label::<InterventionStatus>(&status)?,
        assigned_by: row.try_get("assigned_by")?,
        start_date: row.try_get("start_date")?,
    })
}

#[async_trait]
impl StudentStore for PgStore {
    async fn list_students(
        &self,
        sort: Option<&SortSpec>,
        limit: Option<usize>,
    ) -> Result<Vec<Student>, StorageError> {
        let mut query = format!("SELECT {STUDENT_COLUMNS} FROM student_dashboard.students");
        query.push_str(&order_clause(sort, STUDENT_SORTS)?);
        if limit.is_some() {
            query.push_str(" LIMIT $1");
        }

        let mut rows = sqlx::query(&query);
        if let Some(limit) = limit {
            rows = rows.bind(limit as i64);
        }

        let records = rows.fetch_all(&self.pool).await?;
        debug!(count = records.len(), "loaded students");
        records.iter().map(student_from_row).collect()
    }

    async fn create_student(&self, fields: &NewStudent) -> Result<Student, StorageError> {
        fields.validate().map_err(StorageError::Validation)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO student_dashboard.students
            (id, student_id, full_name, email, major, year_level, current_gpa,
             previous_semester_gpa, attendance_percentage, internal_assessment_avg,
             extracurricular_participation, socioeconomic_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {STUDENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&fields.student_id)
        .bind(&fields.full_name)
        .bind(&fields.email)
        .bind(&fields.major)
        .bind(fields.year_level.as_str())
        .bind(fields.current_gpa)
        .bind(fields.previous_semester_gpa)
        .bind(fields.attendance_percentage)
        .bind(fields.internal_assessment_avg)
        .bind(fields.extracurricular_participation.as_str())
        .bind(fields.socioeconomic_status.as_str())
        .fetch_one(&self.pool)
        .await?;

        student_from_row(&row)
    }

    async fn update_student(&self, id: Uuid, student: &Student) -> Result<Student, StorageError> {
        let prediction = student.prediction.as_ref();

        let row = sqlx::query(&format!(
            r#"
            UPDATE student_dashboard.students SET
                student_id = $2, full_name = $3, email = $4, major = $5, year_level = $6,
                current_gpa = $7, previous_semester_gpa = $8, attendance_percentage = $9,
                internal_assessment_avg = $10, extracurricular_participation = $11,
                socioeconomic_status = $12, predicted_gpa = $13, risk_level = $14,
                confidence_score = $15, recommendations = $16, last_prediction_date = $17,
                updated_date = now()
            WHERE id = $1
            RETURNING {STUDENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&student.student_id)
        .bind(&student.full_name)
        .bind(&student.email)
        .bind(&student.major)
        .bind(student.year_level.as_str())
        .bind(student.current_gpa)
        .bind(student.previous_semester_gpa)
        .bind(student.attendance_percentage)
        .bind(student.internal_assessment_avg)
        .bind(student.extracurricular_participation.as_str())
        .bind(student.socioeconomic_status.as_str())
        .bind(prediction.map(|p| p.prediction.predicted_gpa))
        .bind(prediction.map(|p| p.prediction.risk_level.as_str()))
        .bind(prediction.map(|p| p.prediction.confidence_score))
        .bind(prediction.map(|p| p.prediction.recommendations.clone()))
        .bind(prediction.map(|p| p.last_prediction_date))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        student_from_row(&row)
    }
}

#[async_trait]
impl InterventionStore for PgStore {
    async fn list_interventions(
        &self,
        sort: Option<&SortSpec>,
        limit: Option<usize>,
    ) -> Result<Vec<Intervention>, StorageError> {
        let mut query =
            format!("SELECT {INTERVENTION_COLUMNS} FROM student_dashboard.interventions");
        query.push_str(&order_clause(sort, INTERVENTION_SORTS)?);
        if limit.is_some() {
            query.push_str(" LIMIT $1");
        }

        let mut rows = sqlx::query(&query);
        if let Some(limit) = limit {
            rows = rows.bind(limit as i64);
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(intervention_from_row).collect()
    }

    async fn create_intervention(
        &self,
        fields: &NewIntervention,
    ) -> Result<Intervention, StorageError> {
        if fields.description.trim().is_empty() {
            return Err(StorageError::Validation(
                "intervention description is required".to_string(),
            ));
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO student_dashboard.interventions
            (id, student_id, intervention_type, description, target_date, status,
             assigned_by, start_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {INTERVENTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&fields.student_id)
        .bind(fields.intervention_type.as_str())
        .bind(&fields.description)
        .bind(fields.target_date)
        .bind(fields.status.as_str())
        .bind(&fields.assigned_by)
        .bind(fields.start_date)
        .fetch_one(&self.pool)
        .await?;

        intervention_from_row(&row)
    }

    async fn update_intervention_status(
        &self,
        id: Uuid,
        status: InterventionStatus,
    ) -> Result<Intervention, StorageError> {
        let mut tx = self.pool.begin().await?;

        let current: String = sqlx::query(
            "SELECT status FROM student_dashboard.interventions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StorageError::NotFound(id.to_string()))?
        .try_get("status")?;

        let current: InterventionStatus = parse_label(&current)?;
        if !current.can_transition_to(status) {
            return Err(StorageError::Validation(format!(
                "cannot move intervention from {current} to {status}"
            )));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE student_dashboard.interventions
            SET status = $2, updated_date = now()
            WHERE id = $1
            RETURNING {INTERVENTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        intervention_from_row(&row)
    }
}

/// Inserts or refreshes a student's profile fields, keyed by business id.
/// Predictions already on file are left alone. Returns whether a new row was
/// created.
async fn upsert_student(pool: &PgPool, fields: &NewStudent) -> Result<bool, StorageError> {
    fields.validate().map_err(StorageError::Validation)?;

    let inserted: bool = sqlx::query(
        r#"
        INSERT INTO student_dashboard.students
        (id, student_id, full_name, email, major, year_level, current_gpa,
         previous_semester_gpa, attendance_percentage, internal_assessment_avg,
         extracurricular_participation, socioeconomic_status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (student_id) DO UPDATE SET
            full_name = EXCLUDED.full_name,
            email = EXCLUDED.email,
            major = EXCLUDED.major,
            year_level = EXCLUDED.year_level,
            current_gpa = EXCLUDED.current_gpa,
            previous_semester_gpa = EXCLUDED.previous_semester_gpa,
            attendance_percentage = EXCLUDED.attendance_percentage,
            internal_assessment_avg = EXCLUDED.internal_assessment_avg,
            extracurricular_participation = EXCLUDED.extracurricular_participation,
            socioeconomic_status = EXCLUDED.socioeconomic_status,
            updated_date = now()
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&fields.student_id)
    .bind(&fields.full_name)
    .bind(&fields.email)
    .bind(&fields.major)
    .bind(fields.year_level.as_str())
    .bind(fields.current_gpa)
    .bind(fields.previous_semester_gpa)
    .bind(fields.attendance_percentage)
    .bind(fields.internal_assessment_avg)
    .bind(fields.extracurricular_participation.as_str())
    .bind(fields.socioeconomic_status.as_str())
    .fetch_one(pool)
    .await?
    .try_get("inserted")?;

    Ok(inserted)
}

pub async fn seed(pool: &PgPool) -> Result<(), StorageError> {
    let students = vec![
        NewStudent {
            student_id: "STU-1001".to_string(),
            full_name: "Avery Lee".to_string(),
            email: "avery.lee@university.edu".to_string(),
            major: "Computer Science".to_string(),
            year_level: YearLevel::Second,
            current_gpa: Some(3.62),
            previous_semester_gpa: Some(3.48),
            attendance_percentage: Some(94.0),
            internal_assessment_avg: Some(88.0),
            extracurricular_participation: Participation::High,
            socioeconomic_status: SocioeconomicStatus::Medium,
        },
        NewStudent {
            student_id: "STU-1002".to_string(),
            full_name: "Jules Moreno".to_string(),
            email: "jules.moreno@university.edu".to_string(),
            major: "Mechanical Engineering".to_string(),
            year_level: YearLevel::Third,
            current_gpa: Some(2.31),
            previous_semester_gpa: Some(2.74),
            attendance_percentage: Some(68.5),
            internal_assessment_avg: Some(61.0),
            extracurricular_participation: Participation::Low,
            socioeconomic_status: SocioeconomicStatus::Low,
        },
        NewStudent {
            student_id: "STU-1003".to_string(),
            full_name: "Kiara Patel".to_string(),
            email: "kiara.patel@university.edu".to_string(),
            major: "Biology".to_string(),
            year_level: YearLevel::First,
            current_gpa: Some(2.88),
            previous_semester_gpa: None,
            attendance_percentage: Some(81.0),
            internal_assessment_avg: Some(72.5),
            extracurricular_participation: Participation::Medium,
            socioeconomic_status: SocioeconomicStatus::NotDisclosed,
        },
        NewStudent {
            student_id: "STU-1004".to_string(),
            full_name: "Noah Fischer".to_string(),
            email: "noah.fischer@university.edu".to_string(),
            major: "Economics".to_string(),
            year_level: YearLevel::Graduate,
            current_gpa: Some(3.05),
            previous_semester_gpa: Some(3.21),
            attendance_percentage: Some(77.0),
            internal_assessment_avg: Some(69.0),
            extracurricular_participation: Participation::None,
            socioeconomic_status: SocioeconomicStatus::High,
        },
    ];

    for student in &students {
        upsert_student(pool, student).await?;
    }

    let today = Utc::now().date_naive();
    let interventions = vec![
        (
            "seed-001",
            "STU-1002",
            InterventionType::AttendanceMonitoring,
            "Weekly check-ins to improve attendance and identify barriers",
            InterventionStatus::InProgress,
        ),
        (
            "seed-002",
            "STU-1002",
            InterventionType::Tutoring,
            "One-on-one tutoring sessions for thermodynamics",
            InterventionStatus::Pending,
        ),
        (
            "seed-003",
            "STU-1004",
            InterventionType::StudyGroup,
            "Econometrics study group twice a week",
            InterventionStatus::Completed,
        ),
    ];

    for (source_key, student_id, kind, description, status) in interventions {
        sqlx::query(
            r#"
            INSERT INTO student_dashboard.interventions
            (id, student_id, intervention_type, description, target_date, status,
             assigned_by, start_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(kind.as_str())
        .bind(description)
        .bind(today + Duration::days(30))
        .bind(status.as_str())
        .bind("Seed Data")
        .bind(today)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    info!(students = students.len(), "seed data applied");
    Ok(())
}

/// Imports students from a CSV file with a header row named after the
/// student fields. Returns how many new students were created.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> Result<usize, StorageError> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<NewStudent>() {
        let row = result?;
        if upsert_student(pool, &row).await? {
            inserted += 1;
        }
    }

    info!(inserted, path = %csv_path.display(), "csv import finished");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_is_creation() {
        assert_eq!(
            order_clause(None, STUDENT_SORTS).unwrap(),
            " ORDER BY created_date ASC"
        );
    }

    #[test]
    fn sort_spec_becomes_order_clause() {
        let spec = SortSpec::newest_first();
        assert_eq!(
            order_clause(Some(&spec), STUDENT_SORTS).unwrap(),
            " ORDER BY created_date DESC NULLS LAST, id"
        );
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let spec: SortSpec = "email".parse().unwrap();
        assert!(matches!(
            order_clause(Some(&spec), STUDENT_SORTS),
            Err(StorageError::InvalidSort(_))
        ));
        let spec: SortSpec = "status".parse().unwrap();
        assert!(order_clause(Some(&spec), INTERVENTION_SORTS).is_ok());
    }

    #[test]
    fn csv_rows_deserialize_into_students() {
        let data = "\
student_id,full_name,email,major,year_level,current_gpa,previous_semester_gpa,attendance_percentage,internal_assessment_avg,extracurricular_participation,socioeconomic_status
STU-2001,Mara Quinn,mara.quinn@university.edu,History,4th Year,3.1,,87.5,74,Medium,Not Disclosed
";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<NewStudent> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.year_level, YearLevel::Fourth);
        assert_eq!(row.previous_semester_gpa, None);
        assert_eq!(row.attendance_percentage, Some(87.5));
        assert_eq!(row.socioeconomic_status, SocioeconomicStatus::NotDisclosed);
        assert!(row.validate().is_ok());
    }
}
