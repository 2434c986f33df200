use std::cmp::Reverse;
use std::str::FromStr;

use crate::models::{RiskLevel, Student, YearLevel};

/// Inclusive `[min, max]` band over current GPA, written `min-max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpaRange {
    pub min: f64,
    pub max: f64,
}

impl GpaRange {
    pub fn contains(&self, gpa: f64) -> bool {
        gpa >= self.min && gpa <= self.max
    }
}

impl FromStr for GpaRange {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (min, max) = value
            .split_once('-')
            .ok_or_else(|| format!("GPA range '{value}' must look like min-max"))?;
        let min: f64 = min
            .trim()
            .parse()
            .map_err(|_| format!("invalid lower GPA bound in '{value}'"))?;
        let max: f64 = max
            .trim()
            .parse()
            .map_err(|_| format!("invalid upper GPA bound in '{value}'"))?;
        if min > max {
            return Err(format!("GPA range '{value}' has min above max"));
        }
        Ok(GpaRange { min, max })
    }
}

/// A filter value that is either a concrete selection or the `all` sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection<T> {
    All,
    Only(T),
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::All
    }
}

impl<T: PartialEq> Selection<T> {
    pub fn admits(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }
}

impl<T: FromStr> FromStr for Selection<T> {
    type Err = T::Err;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("all") {
            Ok(Selection::All)
        } else {
            value.parse().map(Selection::Only)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentFilter {
    pub search_term: Option<String>,
    pub risk_level: Selection<RiskLevel>,
    pub year_level: Selection<YearLevel>,
    pub gpa_range: Selection<GpaRange>,
}

impl StudentFilter {
    pub fn is_active(&self) -> bool {
        self.search_term.as_deref().is_some_and(|term| !term.is_empty())
            || !self.risk_level.is_all()
            || !self.year_level.is_all()
            || !self.gpa_range.is_all()
    }

    pub fn matches(&self, student: &Student) -> bool {
        self.matches_search(student)
            && self.risk_level.admits(&student.risk_level())
            && self.year_level.admits(&student.year_level)
            && match self.gpa_range {
                Selection::All => true,
                Selection::Only(range) => range.contains(student.current_gpa.unwrap_or(0.0)),
            }
    }

    fn matches_search(&self, student: &Student) -> bool {
        let term = match self.search_term.as_deref() {
            Some(term) if !term.is_empty() => term.to_lowercase(),
            _ => return true,
        };
        [&student.full_name, &student.student_id, &student.major]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }
}

/// Applies every filter and orders the survivors by descending risk
/// severity. The sort is stable, so students of equal severity keep their
/// input order.
pub fn apply(students: &[Student], filter: &StudentFilter) -> Vec<Student> {
    let mut filtered: Vec<Student> = students
        .iter()
        .filter(|student| filter.matches(student))
        .cloned()
        .collect();
    filtered.sort_by_key(|student| Reverse(student.risk_level().severity()));
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::tests::{predicted, student};

    fn ids(students: &[Student]) -> Vec<&str> {
        students.iter().map(|s| s.student_id.as_str()).collect()
    }

    #[test]
    fn parses_gpa_ranges() {
        assert_eq!("3.0-3.5".parse::<GpaRange>(), Ok(GpaRange { min: 3.0, max: 3.5 }));
        assert_eq!("0-2.5".parse::<GpaRange>(), Ok(GpaRange { min: 0.0, max: 2.5 }));
        assert!("3.5".parse::<GpaRange>().is_err());
        assert!("high-low".parse::<GpaRange>().is_err());
        assert_eq!("all".parse::<Selection<GpaRange>>(), Ok(Selection::All));
    }

    #[test]
    fn gpa_range_is_inclusive() {
        let students = vec![
            student("S-1", Some(2.9), Some(90.0)),
            student("S-2", Some(3.5), Some(90.0)),
            student("S-3", Some(3.0), Some(90.0)),
        ];
        let filter = StudentFilter {
            gpa_range: Selection::Only(GpaRange { min: 3.0, max: 3.5 }),
            ..Default::default()
        };
        assert_eq!(ids(&apply(&students, &filter)), vec!["S-2", "S-3"]);
    }

    #[test]
    fn missing_gpa_is_treated_as_zero() {
        let students = vec![student("S-1", None, Some(90.0))];
        let filter = StudentFilter {
            gpa_range: Selection::Only(GpaRange { min: 0.0, max: 2.5 }),
            ..Default::default()
        };
        assert_eq!(apply(&students, &filter).len(), 1);
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let mut chem = student("S-1", Some(3.0), Some(90.0));
        chem.major = "Chemistry".to_string();
        let mut named = student("S-2", Some(3.0), Some(90.0));
        named.full_name = "Jordan Reyes".to_string();
        let other = student("X-3", Some(3.0), Some(90.0));
        let students = vec![chem, named, other];

        let by_major = StudentFilter {
            search_term: Some("chem".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&apply(&students, &by_major)), vec!["S-1"]);

        let by_name = StudentFilter {
            search_term: Some("REYES".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&apply(&students, &by_name)), vec!["S-2"]);

        let by_id = StudentFilter {
            search_term: Some("x-".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&apply(&students, &by_id)), vec!["X-3"]);

        let empty = StudentFilter {
            search_term: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(apply(&students, &empty).len(), 3);
    }

    #[test]
    fn filters_compose_and_sort_by_severity() {
        let students = vec![
            predicted(student("S-1", Some(3.2), Some(90.0)), 3.3, RiskLevel::Low),
            predicted(student("S-2", Some(2.1), Some(60.0)), 2.0, RiskLevel::Medium),
            student("S-3", Some(3.0), Some(85.0)),
            predicted(student("S-4", Some(1.8), Some(50.0)), 1.7, RiskLevel::High),
            predicted(student("S-5", Some(2.6), Some(70.0)), 2.5, RiskLevel::Medium),
        ];

        let sorted = apply(&students, &StudentFilter::default());
        assert_eq!(ids(&sorted), vec!["S-4", "S-2", "S-5", "S-1", "S-3"]);

        let medium_only = StudentFilter {
            risk_level: Selection::Only(RiskLevel::Medium),
            year_level: Selection::Only(YearLevel::Second),
            ..Default::default()
        };
        assert_eq!(ids(&apply(&students, &medium_only)), vec!["S-2", "S-5"]);

        let other_year = StudentFilter {
            year_level: Selection::Only(YearLevel::Graduate),
            ..Default::default()
        };
        assert!(apply(&students, &other_year).is_empty());
    }

    #[test]
    fn apply_is_idempotent() {
        let students = vec![
            predicted(student("S-1", Some(2.1), Some(60.0)), 2.0, RiskLevel::Medium),
            predicted(student("S-2", Some(1.8), Some(50.0)), 1.7, RiskLevel::High),
            predicted(student("S-3", Some(2.6), Some(70.0)), 2.5, RiskLevel::Medium),
        ];
        let filter = StudentFilter {
            search_term: Some("s-".to_string()),
            ..Default::default()
        };
        let first = apply(&students, &filter);
        let second = apply(&students, &filter);
        assert_eq!(first, second);
        assert_eq!(apply(&first, &filter), first);
    }

    #[test]
    fn reports_whether_any_filter_is_set() {
        assert!(!StudentFilter::default().is_active());
        let filter = StudentFilter {
            risk_level: Selection::Only(RiskLevel::High),
            ..Default::default()
        };
        assert!(filter.is_active());
    }
}
