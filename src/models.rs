use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::grade::Grade;

// --- Identity ---

/// Role
///
/// The RBAC field carried by every user record. Handlers check it before invoking the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Student,
    Faculty,
    Admin,
}

/// UserStatus
///
/// Blocked users keep their records but are refused by the identity extractor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "user_status", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum UserStatus {
    #[default]
    InProgress,
    Blocked,
}

/// User
///
/// The external identity resolved from a bearer token. `id` is the institutional id
/// (e.g. "2025010001"), not a database key.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: String,
    pub role: Role,
    pub status: UserStatus,
    pub is_deleted: bool,
}

/// Student
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Student {
    pub id: Uuid,
    // FK to users.id.
    pub user_id: String,
    pub name: String,
    pub academic_department_id: Uuid,
}

/// Faculty
///
/// An instructor. Offered course sections reference the instructor of record by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Faculty {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub academic_department_id: Uuid,
}

// --- Academic hierarchy (read-only here) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AcademicSemester {
    pub id: Uuid,
    pub name: String,
    pub year: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AcademicFaculty {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AcademicDepartment {
    pub id: Uuid,
    pub name: String,
    pub academic_faculty_id: Uuid,
}

// --- Scheduling ---

/// Course
///
/// `credits` is the credit weight counted against a semester registration's `max_credit`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub prefix: String,
    pub code: i32,
    pub credits: i32,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type, Default,
)]
#[sqlx(type_name = "registration_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum RegistrationStatus {
    #[default]
    Upcoming,
    Ongoing,
    Ended,
}

/// SemesterRegistration
///
/// The administrative period in which sections are offered. `max_credit` caps the total
/// credit load a student may carry within it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SemesterRegistration {
    pub id: Uuid,
    pub academic_semester_id: Uuid,
    pub status: RegistrationStatus,
    pub min_credit: i32,
    pub max_credit: i32,
}

/// OfferedCourse
///
/// A section of a course within one semester registration. `max_capacity` holds the seats
/// still available and is decremented once per successful enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct OfferedCourse {
    pub id: Uuid,
    pub semester_registration_id: Uuid,
    pub academic_semester_id: Uuid,
    pub academic_faculty_id: Uuid,
    pub academic_department_id: Uuid,
    pub course_id: Uuid,
    // The instructor of record. Only this faculty member may record marks for the section.
    pub faculty_id: Uuid,
    pub max_capacity: i32,
    pub section: i32,
}

// --- Enrollment ---

/// CourseMarks
///
/// The stored assessment components of an enrollment. Columns live on the
/// `enrolled_courses` row; in JSON they are nested under `course_marks`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CourseMarks {
    pub class_test1: f64,
    pub mid_term: f64,
    pub class_test2: f64,
    pub final_term: f64,
}

impl CourseMarks {
    /// Applies a partial patch field by field. Components missing from the patch keep
    /// their stored values.
    pub fn merge(&self, patch: &CourseMarksPatch) -> CourseMarks {
        CourseMarks {
            class_test1: patch.class_test1.unwrap_or(self.class_test1),
            mid_term: patch.mid_term.unwrap_or(self.mid_term),
            class_test2: patch.class_test2.unwrap_or(self.class_test2),
            final_term: patch.final_term.unwrap_or(self.final_term),
        }
    }
}

/// CourseMarksPatch
///
/// Partial update payload for course marks. Only `Some` components are written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseMarksPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_test1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid_term: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_test2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_term: Option<f64>,
}

impl CourseMarksPatch {
    pub fn is_empty(&self) -> bool {
        self.components().iter().all(|(_, value)| value.is_none())
    }

    /// Rejects empty patches and any component that is negative or not a finite number.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("at least one mark component is required".to_string());
        }
        for (name, value) in self.components() {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{name} must be a non-negative number"));
                }
            }
        }
        Ok(())
    }

    fn components(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("class_test1", self.class_test1),
            ("mid_term", self.mid_term),
            ("class_test2", self.class_test2),
            ("final_term", self.final_term),
        ]
    }
}

/// EnrolledCourse
///
/// The durable enrollment record. Created once by the enrollment engine; afterwards only
/// the mark and grade fields change. At most one row exists per (student, offered course).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct EnrolledCourse {
    pub id: Uuid,
    pub semester_registration_id: Uuid,
    pub academic_semester_id: Uuid,
    pub academic_faculty_id: Uuid,
    pub academic_department_id: Uuid,
    pub offered_course_id: Uuid,
    pub course_id: Uuid,
    pub student_id: Uuid,
    pub faculty_id: Uuid,
    pub is_enrolled: bool,

    #[sqlx(flatten)]
    pub course_marks: CourseMarks,

    pub grade: Grade,
    pub grade_points: f64,
    pub is_completed: bool,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// NewEnrollment
///
/// Everything the store needs to run the atomic insert + seat decrement. `credits` and
/// `max_credit` let the store re-check the credit limit inside the transaction.
#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub semester_registration_id: Uuid,
    pub academic_semester_id: Uuid,
    pub academic_faculty_id: Uuid,
    pub academic_department_id: Uuid,
    pub offered_course_id: Uuid,
    pub course_id: Uuid,
    pub student_id: Uuid,
    pub faculty_id: Uuid,
    pub credits: i32,
    pub max_credit: i32,
}

impl NewEnrollment {
    pub fn for_section(
        offered: &OfferedCourse,
        student: &Student,
        credits: i32,
        max_credit: i32,
    ) -> Self {
        Self {
            semester_registration_id: offered.semester_registration_id,
            academic_semester_id: offered.academic_semester_id,
            academic_faculty_id: offered.academic_faculty_id,
            academic_department_id: offered.academic_department_id,
            offered_course_id: offered.id,
            course_id: offered.course_id,
            student_id: student.id,
            faculty_id: offered.faculty_id,
            credits,
            max_credit,
        }
    }
}

/// EnrollmentKey
///
/// The tuple a faculty mark update must match exactly. Matching on `faculty_id` doubles as
/// the assignment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentKey {
    pub student_id: Uuid,
    pub offered_course_id: Uuid,
    pub semester_registration_id: Uuid,
    pub faculty_id: Uuid,
}

// --- Request Payloads (Input Schemas) ---

/// CreateEnrolledCourseRequest
///
/// Input payload for POST /enrolled-courses/create-enrolled-course. The student is taken
/// from the authenticated identity, never from the body.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateEnrolledCourseRequest {
    pub offered_course: Uuid,
}

/// UpdateCourseMarksRequest
///
/// Input payload for PATCH /enrolled-courses/update-enrolled-course-marks.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCourseMarksRequest {
    pub semester_registration: Uuid,
    pub offered_course: Uuid,
    pub student: Uuid,
    pub course_marks: CourseMarksPatch,
}

// --- Listing Schemas (Output) ---

/// EnrolledCourseView
///
/// An enrollment with whichever related rows the caller asked to populate.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct EnrolledCourseView {
    #[serde(flatten)]
    pub enrollment: EnrolledCourse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester_registration: Option<SemesterRegistration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_semester: Option<AcademicSemester>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_faculty: Option<AcademicFaculty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub academic_department: Option<AcademicDepartment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty: Option<Faculty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<Course>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offered_course: Option<OfferedCourse>,
}

impl From<EnrolledCourse> for EnrolledCourseView {
    fn from(enrollment: EnrolledCourse) -> Self {
        Self {
            enrollment,
            ..Default::default()
        }
    }
}

/// PageMeta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_page: i64,
}

/// EnrolledCoursePage
///
/// Output schema for GET /enrolled-courses/my-enrolled-courses.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct EnrolledCoursePage {
    pub meta: PageMeta,
    pub data: Vec<EnrolledCourseView>,
}
