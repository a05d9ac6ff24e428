use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{
        Course, CourseMarksPatch, EnrolledCourse, EnrolledCourseView, EnrollmentKey, Faculty,
        NewEnrollment, OfferedCourse, SemesterRegistration, Student, User,
    },
    query::EnrolledCourseQuery,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Failures surfaced by the persistence layer. The first three variants say why the guarded
/// enrollment write rolled back; everything else is a store fault.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The unique (student, offered course) constraint rejected the insert.
    #[error("an enrollment already exists for this student and offered course")]
    DuplicateEnrollment,

    /// The guarded decrement found no seat left at write time.
    #[error("offered course has no remaining seats")]
    SeatUnavailable,

    /// The credit sum re-derived inside the transaction exceeds the registration's limit.
    #[error("enrollment would exceed the semester credit limit")]
    CreditLimitExceeded,

    #[error("record {0} not found")]
    RecordNotFound(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Repository Trait
///
/// The persistence contract consumed by the enrollment engine, the mark recording service
/// and the identity extractor. Handlers never talk to the store directly.
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity ---
    async fn get_user(&self, id: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, RepositoryError>;
    async fn find_student_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Student>, RepositoryError>;
    async fn find_faculty_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Faculty>, RepositoryError>;

    // --- Scheduling lookups ---
    async fn find_offered_course(&self, id: Uuid) -> Result<Option<OfferedCourse>, RepositoryError>;
    async fn find_course(&self, id: Uuid) -> Result<Option<Course>, RepositoryError>;
    async fn find_semester_registration(
        &self,
        id: Uuid,
    ) -> Result<Option<SemesterRegistration>, RepositoryError>;

    // --- Enrollment reads ---
    async fn find_enrollment(
        &self,
        student_id: Uuid,
        offered_course_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<Option<EnrolledCourse>, RepositoryError>;

    /// Matches all four ids, so a faculty member only ever finds rows of sections they teach.
    async fn find_faculty_enrollment(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrolledCourse>, RepositoryError>;

    /// Sum of course credits over the student's enrollments in one registration (0 if none).
    async fn total_enrolled_credits(
        &self,
        student_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<i64, RepositoryError>;

    // --- Enrollment writes ---

    /// Inserts the enrollment and consumes one seat in a single transaction.
    ///
    /// The seat decrement only applies while capacity is positive; if it does not apply, or
    /// anything else fails, nothing is persisted.
    async fn create_enrollment(
        &self,
        new: NewEnrollment,
    ) -> Result<EnrolledCourse, RepositoryError>;

    /// Writes the `Some` components of `patch` in one transaction. When the patch carries
    /// `final_term`, the grade is computed from the row's stored components as read under
    /// that transaction, and the enrollment is marked completed.
    async fn apply_course_marks(
        &self,
        enrollment_id: Uuid,
        patch: CourseMarksPatch,
    ) -> Result<EnrolledCourse, RepositoryError>;

    // --- Listing ---
    async fn list_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<Vec<EnrolledCourseView>, RepositoryError>;
    async fn count_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<i64, RepositoryError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;
