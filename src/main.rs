use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::{AppConfig, ConfigArgs};
use crate::db::PgStore;
use crate::filter::{GpaRange, Selection, StudentFilter};
use crate::llm::LlmPredictor;
use crate::models::{
    InterventionStatus, InterventionType, NewStudent, Participation, RiskLevel,
    SocioeconomicStatus, Student, StudentEdit, YearLevel,
};
use crate::predict::{BulkPredictionOrchestrator, Predictor};
use crate::store::{InterventionStore, SortSpec, StudentStore};

mod config;
mod db;
mod error;
mod filter;
mod llm;
mod models;
mod predict;
mod report;
mod risk;
mod stats;
mod store;

#[derive(Parser)]
#[command(name = "student-risk-dashboard")]
#[command(about = "Student performance, risk and intervention tracker", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    /// Case-insensitive match on name, student id or major
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value = "all")]
    risk: Selection<RiskLevel>,
    #[arg(long, default_value = "all")]
    year: Selection<YearLevel>,
    /// Inclusive GPA band such as 3.0-3.5
    #[arg(long, default_value = "all")]
    gpa: Selection<GpaRange>,
}

impl From<FilterArgs> for StudentFilter {
    fn from(args: FilterArgs) -> Self {
        StudentFilter {
            search_term: args.search,
            risk_level: args.risk,
            year_level: args.year,
            gpa_range: args.gpa,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Add a single student record
    AddStudent {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        major: String,
        #[arg(long)]
        year: YearLevel,
        #[arg(long)]
        gpa: Option<f64>,
        #[arg(long)]
        previous_gpa: Option<f64>,
        #[arg(long)]
        attendance: Option<f64>,
        #[arg(long)]
        assessment: Option<f64>,
        #[arg(long, default_value = "None")]
        extracurricular: Participation,
        #[arg(long, default_value = "Not Disclosed")]
        socioeconomic: SocioeconomicStatus,
    },
    /// Correct fields on an existing student
    EditStudent {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        major: Option<String>,
        #[arg(long)]
        year: Option<YearLevel>,
        #[arg(long)]
        gpa: Option<f64>,
        #[arg(long)]
        previous_gpa: Option<f64>,
        #[arg(long)]
        attendance: Option<f64>,
        #[arg(long)]
        assessment: Option<f64>,
        #[arg(long)]
        extracurricular: Option<Participation>,
        #[arg(long)]
        socioeconomic: Option<SocioeconomicStatus>,
    },
    /// List students matching the filters, highest risk first
    List {
        #[command(flatten)]
        filter: FilterArgs,
        /// Storage order before filtering; a leading '-' sorts descending
        #[arg(long, default_value = "-created_date", allow_hyphen_values = true)]
        sort: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Cohort statistics and distributions
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Risk cards for students needing attention
    Risk {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Suggested interventions for one student
    Suggest {
        #[arg(long)]
        student_id: String,
    },
    /// Generate AI predictions
    #[command(group(
        ArgGroup::new("scope")
            .args(["all", "student_id"])
            .required(true)
            .multiple(false)
    ))]
    Predict {
        /// Predict every student that has no prediction yet
        #[arg(long)]
        all: bool,
        #[arg(long)]
        student_id: Option<String>,
    },
    /// Record a new intervention for a student
    Intervene {
        #[arg(long)]
        student_id: String,
        #[arg(long = "type")]
        intervention_type: InterventionType,
        /// Defaults to the matching suggestion's description
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        target_date: Option<NaiveDate>,
    },
    /// Move an intervention to a new status
    InterventionStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: InterventionStatus,
    },
    /// Show the signed-in student's own profile
    Me,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("student_risk_dashboard={level},sqlx=warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn format_metric(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(value) => format!("{value:.precision$}"),
        None => "N/A".to_string(),
    }
}

fn find_student<'a>(students: &'a [Student], student_id: &str) -> anyhow::Result<&'a Student> {
    students
        .iter()
        .find(|student| student.student_id.eq_ignore_ascii_case(student_id))
        .with_context(|| format!("no student with id {student_id}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = AppConfig::from(cli.config);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = Arc::new(PgStore::new(pool));

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store.pool()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(store.pool(), &csv)
                .await
                .with_context(|| format!("failed to import {}", csv.display()))?;
            println!("Inserted {inserted} students from {}.", csv.display());
        }
        Commands::AddStudent {
            student_id,
            name,
            email,
            major,
            year,
            gpa,
            previous_gpa,
            attendance,
            assessment,
            extracurricular,
            socioeconomic,
        } => {
            let created = store
                .create_student(&NewStudent {
                    student_id,
                    full_name: name,
                    email,
                    major,
                    year_level: year,
                    current_gpa: gpa,
                    previous_semester_gpa: previous_gpa,
                    attendance_percentage: attendance,
                    internal_assessment_avg: assessment,
                    extracurricular_participation: extracurricular,
                    socioeconomic_status: socioeconomic,
                })
                .await?;
            println!("Added {} ({}).", created.full_name, created.student_id);
        }
        Commands::EditStudent {
            student_id,
            name,
            email,
            major,
            year,
            gpa,
            previous_gpa,
            attendance,
            assessment,
            extracurricular,
            socioeconomic,
        } => {
            let edit = StudentEdit {
                full_name: name,
                email,
                major,
                year_level: year,
                current_gpa: gpa,
                previous_semester_gpa: previous_gpa,
                attendance_percentage: attendance,
                internal_assessment_avg: assessment,
                extracurricular_participation: extracurricular,
                socioeconomic_status: socioeconomic,
            };
            if edit.is_empty() {
                bail!("nothing to change for {student_id}");
            }

            let students = store.list_students(None, None).await?;
            let student = find_student(&students, &student_id)?;
            let updated = edit.apply(student).map_err(anyhow::Error::msg)?;
            let saved = store.update_student(student.id, &updated).await?;
            info!(student_id = %saved.student_id, "student updated");
            println!("Updated {} ({}).", saved.full_name, saved.student_id);
        }
        Commands::List {
            filter,
            sort,
            limit,
            json,
        } => {
            let sort: SortSpec = sort.parse()?;
            let students = store.list_students(Some(&sort), limit).await?;
            let filtered = filter::apply(&students, &StudentFilter::from(filter));

            if json {
                println!("{}", serde_json::to_string_pretty(&filtered)?);
                return Ok(());
            }
            if filtered.is_empty() {
                println!("No students match your filters.");
                return Ok(());
            }
            for student in &filtered {
                println!(
                    "- {} ({}) {} | {} | GPA {} -> {} | attendance {}% | {} risk",
                    student.full_name,
                    student.student_id,
                    student.major,
                    student.year_level,
                    format_metric(student.current_gpa, 2),
                    format_metric(student.predicted_gpa(), 2),
                    format_metric(student.attendance_percentage, 0),
                    student.risk_level()
                );
            }
        }
        Commands::Stats { json } => {
            let students = store.list_students(None, None).await?;
            let interventions = store.list_interventions(None, None).await?;
            let cohort = stats::cohort_stats(&students, &interventions);
            let distribution = stats::risk_distribution(&students);
            let histogram = stats::intervention_type_histogram(&interventions);

            if json {
                let body = json!({
                    "cohort": cohort,
                    "risk_distribution": distribution,
                    "intervention_types": histogram,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }

            println!("Students: {}", cohort.total);
            println!("Average current GPA: {:.2}", cohort.avg_current_gpa);
            println!("Average predicted GPA: {:.2}", cohort.avg_predicted_gpa);
            println!(
                "Average attendance: {:.1}% ({})",
                cohort.avg_attendance,
                stats::attendance_rating(cohort.avg_attendance)
            );
            println!("Improving: {}", cohort.improving_count);
            println!("High risk: {}", cohort.high_risk_count);
            println!("With active support: {}", cohort.with_active_intervention_count);
            println!("Honor roll: {}", cohort.honor_roll_count);
            println!("Attendance at or above 95%: {}", cohort.high_attendance_count);
            println!("Risk distribution:");
            for level in RiskLevel::ALL {
                if let Some(count) = distribution.get(level) {
                    println!("  {level}: {count}");
                }
            }
            if !histogram.is_empty() {
                println!("Interventions by type:");
                for entry in &histogram {
                    println!("  {}: {}", entry.intervention_type, entry.count);
                }
            }
            let recent = stats::recent_predictions(&students, 8);
            if !recent.is_empty() {
                println!("Recent AI predictions:");
                for student in recent {
                    println!(
                        "  {} ({}) {} risk, GPA {} -> {}",
                        student.full_name,
                        student.major,
                        student.risk_level(),
                        format_metric(student.current_gpa, 2),
                        format_metric(student.predicted_gpa(), 2)
                    );
                }
            }
        }
        Commands::Risk { filter } => {
            let students = store
                .list_students(Some(&SortSpec::newest_first()), None)
                .await?;
            let interventions = store
                .list_interventions(Some(&SortSpec::newest_first()), None)
                .await?;
            let filter = StudentFilter::from(filter);
            let cards = filter::apply(&students, &filter);

            if cards.is_empty() {
                if filter.is_active() {
                    println!("No students match your filters.");
                } else {
                    println!("All students are doing well!");
                }
                return Ok(());
            }

            println!("Students requiring attention ({}):", cards.len());
            for student in &cards {
                let assessment = risk::classify_risk(student);
                let grade = risk::grade_status(student)
                    .map(|status| format!(" ({status})"))
                    .unwrap_or_default();
                println!(
                    "\n{} ({}) {} | {} [{} risk]",
                    student.full_name,
                    student.student_id,
                    student.major,
                    student.year_level,
                    assessment.level
                );
                println!(
                    "  GPA {}{} | attendance {}%",
                    format_metric(student.current_gpa, 2),
                    grade,
                    format_metric(student.attendance_percentage, 0)
                );
                for factor in &assessment.factors {
                    println!("  ! {factor}");
                }
                if let Some(record) = &student.prediction {
                    let recommendations = &record.prediction.recommendations;
                    if let Some(first) = recommendations.first() {
                        println!("  AI: {first}");
                        if recommendations.len() > 1 {
                            println!("      +{} more recommendations", recommendations.len() - 1);
                        }
                    }
                    println!("  AI confidence: {:.0}%", record.prediction.confidence_score);
                }
                let active = risk::active_interventions(student, &interventions);
                if active.is_empty() {
                    println!("  No active support");
                } else {
                    let kinds: Vec<String> = active
                        .iter()
                        .map(|i| i.intervention_type.to_string())
                        .collect();
                    println!("  Support active: {}", kinds.join(", "));
                }
            }
        }
        Commands::Suggest { student_id } => {
            let students = store.list_students(None, None).await?;
            let student = find_student(&students, &student_id)?;
            let suggestions = risk::suggest_interventions(student);

            println!(
                "{} ({}) GPA {} | attendance {}% | {} risk | {}",
                student.full_name,
                student.student_id,
                format_metric(student.current_gpa, 2),
                format_metric(student.attendance_percentage, 0),
                student.risk_level(),
                risk::performance_status(student)
            );
            if suggestions.is_empty() {
                println!("No interventions suggested.");
            }
            for suggestion in &suggestions {
                println!("- {}: {}", suggestion.intervention_type, suggestion.description);
            }
        }
        Commands::Predict { student_id, .. } => {
            let predictor: Arc<dyn Predictor> = Arc::new(
                LlmPredictor::new(config.llm.clone())
                    .context("prediction service is not available")?,
            );
            let students = store
                .list_students(Some(&SortSpec::newest_first()), None)
                .await?;
            let mut orchestrator = BulkPredictionOrchestrator::new(predictor, store.clone());

            if let Some(student_id) = student_id {
                let student = find_student(&students, &student_id)?;
                let saved = orchestrator
                    .predict_student(student)
                    .await
                    .with_context(|| format!("prediction failed for {}", student.student_id))?;
                println!(
                    "{}: predicted GPA {} ({} risk)",
                    saved.full_name,
                    format_metric(saved.predicted_gpa(), 2),
                    saved.risk_level()
                );
                for recommendation in saved.recommendations() {
                    println!("- {recommendation}");
                }
                return Ok(());
            }

            let pending = predict::pending_predictions(&students);
            if pending.is_empty() {
                println!("Every student already has a prediction.");
                return Ok(());
            }

            let handle = orchestrator.cancel_handle();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current student");
                    handle.cancel();
                }
            });

            let bar = ProgressBar::new(pending.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} predictions")?
                    .progress_chars("=> "),
            );
            let mut refresh = false;
            let report = orchestrator
                .run(
                    pending,
                    |progress| bar.set_position(progress.current as u64),
                    || refresh = true,
                )
                .await;
            bar.finish_and_clear();
            watcher.abort();
            info!(state = ?orchestrator.state(), "bulk prediction finished");

            for outcome in &report.outcomes {
                match outcome {
                    predict::ItemOutcome::Success(saved) => println!(
                        "  {} ({}): predicted GPA {} ({} risk)",
                        saved.full_name,
                        saved.student_id,
                        format_metric(saved.predicted_gpa(), 2),
                        saved.risk_level()
                    ),
                    predict::ItemOutcome::Failure { student, error } => {
                        println!("! {} ({}): {error}", student.full_name, student.student_id)
                    }
                }
            }
            println!(
                "{} of {} predictions stored{}.",
                report.succeeded(),
                report.progress.total,
                if report.cancelled { " (cancelled)" } else { "" }
            );

            if refresh {
                let students = store.list_students(None, None).await?;
                let remaining = predict::pending_predictions(&students).len();
                info!(remaining, "refreshed student list");
                println!("{remaining} students still without a prediction.");
            }
        }
        Commands::Intervene {
            student_id,
            intervention_type,
            description,
            target_date,
        } => {
            let students = store.list_students(None, None).await?;
            let student = find_student(&students, &student_id)?;
            let assigned_by = store::current_user_name(&config.identity).await;
            let planned = risk::plan_intervention(
                student,
                intervention_type,
                description,
                target_date,
                assigned_by,
                Utc::now().date_naive(),
            )
            .map_err(anyhow::Error::msg)?;
            let created = store.create_intervention(&planned).await?;
            println!(
                "Created {} intervention {} for {}.",
                created.intervention_type, created.id, student.full_name
            );
        }
        Commands::InterventionStatus { id, status } => {
            let updated = store.update_intervention_status(id, status).await?;
            println!("Intervention {} is now {}.", updated.id, updated.status);
        }
        Commands::Me => {
            let profile = store::find_own_profile(&config.identity, store.as_ref()).await?;
            let Some((user, student)) = profile else {
                println!("No student profile found for the signed-in user.");
                return Ok(());
            };

            println!("Welcome back, {}", user.full_name);
            println!(
                "{} | {} | {}",
                student.student_id, student.major, student.year_level
            );
            println!(
                "GPA {} | attendance {}% | status {}",
                format_metric(student.current_gpa, 2),
                format_metric(student.attendance_percentage, 0),
                risk::performance_status(&student)
            );
            if let Some(trend) = risk::gpa_trend(&student) {
                println!(
                    "Predicted GPA {} ({:+.2}, {} {:.1}%)",
                    format_metric(student.predicted_gpa(), 2),
                    trend.delta,
                    if trend.is_improving() { "up" } else { "down" },
                    trend.percent
                );
            }
            for recommendation in student.recommendations() {
                println!("- {recommendation}");
            }
        }
        Commands::Report { out, limit } => {
            let students = store
                .list_students(Some(&SortSpec::newest_first()), None)
                .await?;
            let interventions = store.list_interventions(None, None).await?;
            let report =
                report::build_report(Utc::now().date_naive(), &students, &interventions, limit);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
