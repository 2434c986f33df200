//! Collaborator contracts consumed by the dashboard core. The Postgres
//! implementations live in `db`; tests substitute in-memory fakes.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{NotAuthenticated, StorageError};
use crate::models::{
    Intervention, InterventionStatus, NewIntervention, NewStudent, Student, User,
};

/// Ordering request in the `-field` / `field` form (leading `-` sorts
/// descending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn newest_first() -> Self {
        SortSpec {
            field: "created_date".to_string(),
            descending: true,
        }
    }
}

impl FromStr for SortSpec {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (field, descending) = match value.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (value, false),
        };
        if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StorageError::InvalidSort(value.to_string()));
        }
        Ok(SortSpec {
            field: field.to_string(),
            descending,
        })
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            f.write_str(&self.field)
        }
    }
}

#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn list_students(
        &self,
        sort: Option<&SortSpec>,
        limit: Option<usize>,
    ) -> Result<Vec<Student>, StorageError>;

    async fn create_student(&self, fields: &NewStudent) -> Result<Student, StorageError>;

    /// Writes every field of `student` onto the record with storage id `id`.
    async fn update_student(&self, id: Uuid, student: &Student) -> Result<Student, StorageError>;
}

#[async_trait]
pub trait InterventionStore: Send + Sync {
    async fn list_interventions(
        &self,
        sort: Option<&SortSpec>,
        limit: Option<usize>,
    ) -> Result<Vec<Intervention>, StorageError>;

    async fn create_intervention(
        &self,
        fields: &NewIntervention,
    ) -> Result<Intervention, StorageError>;

    async fn update_intervention_status(
        &self,
        id: Uuid,
        status: InterventionStatus,
    ) -> Result<Intervention, StorageError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn me(&self) -> Result<User, NotAuthenticated>;
}

/// Identity taken from configuration. With no email configured every lookup
/// is anonymous.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredIdentity {
    user: Option<User>,
}

impl ConfiguredIdentity {
    pub fn new(email: Option<String>, full_name: Option<String>) -> Self {
        let user = email.map(|email| User {
            full_name: full_name.unwrap_or_else(|| email.clone()),
            email,
        });
        ConfiguredIdentity { user }
    }
}

#[async_trait]
impl IdentityProvider for ConfiguredIdentity {
    async fn me(&self) -> Result<User, NotAuthenticated> {
        self.user.clone().ok_or(NotAuthenticated)
    }
}

/// Display name to record as `assigned_by`, falling back to an anonymous
/// marker when nobody is signed in.
pub async fn current_user_name(identity: &dyn IdentityProvider) -> String {
    match identity.me().await {
        Ok(user) => user.full_name,
        Err(NotAuthenticated) => "Anonymous".to_string(),
    }
}

/// Finds the student record belonging to the signed-in user.
pub async fn find_own_profile(
    identity: &dyn IdentityProvider,
    students: &dyn StudentStore,
) -> Result<Option<(User, Student)>, StorageError> {
    let user = match identity.me().await {
        Ok(user) => user,
        Err(NotAuthenticated) => return Ok(None),
    };
    let profile = students
        .list_students(None, None)
        .await?
        .into_iter()
        .find(|student| student.email.eq_ignore_ascii_case(&user.email));
    Ok(profile.map(|student| (user, student)))
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryStudents;
    use super::*;
    use crate::risk::tests::student;

    #[test]
    fn parses_sort_specs() {
        let spec: SortSpec = "-created_date".parse().unwrap();
        assert_eq!(spec, SortSpec::newest_first());
        assert_eq!(spec.to_string(), "-created_date");

        let spec: SortSpec = "full_name".parse().unwrap();
        assert!(!spec.descending);

        assert!("-".parse::<SortSpec>().is_err());
        assert!("name; drop table".parse::<SortSpec>().is_err());
    }

    #[tokio::test]
    async fn anonymous_identity_falls_back() {
        let identity = ConfiguredIdentity::default();
        assert_eq!(identity.me().await, Err(NotAuthenticated));
        assert_eq!(current_user_name(&identity).await, "Anonymous");
    }

    #[tokio::test]
    async fn finds_profile_by_email() {
        let mut own = student("S-1", Some(3.2), Some(91.0));
        own.email = "Riley.Chen@example.edu".to_string();
        let store = MemoryStudents::with(vec![student("S-2", Some(2.0), Some(70.0)), own]);
        let identity = ConfiguredIdentity::new(
            Some("riley.chen@example.edu".to_string()),
            Some("Riley Chen".to_string()),
        );

        let (user, profile) = find_own_profile(&identity, &store).await.unwrap().unwrap();
        assert_eq!(user.full_name, "Riley Chen");
        assert_eq!(profile.student_id, "S-1");

        let nobody = ConfiguredIdentity::default();
        assert!(find_own_profile(&nobody, &store).await.unwrap().is_none());
    }
}
