use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;

/// Grade
///
/// Letter grade stored on an enrollment. `NA` marks an enrollment whose final-term mark has
/// not been recorded yet.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "grade")]
#[ts(export)]
pub enum Grade {
    #[serde(rename = "A+")]
    #[sqlx(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    #[sqlx(rename = "A")]
    A,
    #[serde(rename = "A-")]
    #[sqlx(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    #[sqlx(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    #[sqlx(rename = "B")]
    B,
    #[serde(rename = "B-")]
    #[sqlx(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    #[sqlx(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    #[sqlx(rename = "C")]
    C,
    #[serde(rename = "D")]
    #[sqlx(rename = "D")]
    D,
    #[serde(rename = "F")]
    #[sqlx(rename = "F")]
    F,
    #[default]
    #[serde(rename = "NA")]
    #[sqlx(rename = "NA")]
    Na,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Na => "NA",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GradeOutcome
///
/// What the calculator hands back for a total: the letter grade and its grade points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradeOutcome {
    pub grade: Grade,
    pub grade_points: f64,
}

// Inclusive lower bounds, highest first.
const GRADE_BANDS: [(f64, Grade, f64); 9] = [
    (80.0, Grade::APlus, 4.0),
    (75.0, Grade::A, 3.75),
    (70.0, Grade::AMinus, 3.5),
    (65.0, Grade::BPlus, 3.25),
    (60.0, Grade::B, 3.0),
    (55.0, Grade::BMinus, 2.75),
    (50.0, Grade::CPlus, 2.5),
    (45.0, Grade::C, 2.25),
    (40.0, Grade::D, 2.0),
];

/// calculate_grade
///
/// Maps a total mark (out of 100) to a letter grade and grade points. Anything below the
/// lowest band, including a non-finite total, is an `F`.
pub fn calculate_grade(total: f64) -> GradeOutcome {
    GRADE_BANDS
        .iter()
        .find(|(lower, _, _)| total >= *lower)
        .map(|&(_, grade, grade_points)| GradeOutcome { grade, grade_points })
        .unwrap_or(GradeOutcome {
            grade: Grade::F,
            grade_points: 0.0,
        })
}
