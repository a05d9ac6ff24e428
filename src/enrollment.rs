use uuid::Uuid;

use crate::{
    error::{ConflictKind, EnrollmentError, Entity},
    models::{EnrolledCourse, NewEnrollment},
    query::EnrolledCourseQuery,
    repository::RepositoryState,
};

/// EnrollmentService
///
/// Validates a student's request for a seat in an offered course and performs the atomic
/// insert + seat decrement.
///
/// The checks in `enroll` read outside the write transaction, so they only reject early.
/// Two callers can both pass them when one seat is left; the store's guarded decrement
/// decides which of them gets it, and the other sees `TransactionFailed`.
#[derive(Clone)]
pub struct EnrollmentService {
    repo: RepositoryState,
}

impl EnrollmentService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// enroll
    ///
    /// Checks, in order: offered course exists, student resolves, not already enrolled,
    /// capacity left, credit limit respected. Then commits the enrollment and consumes
    /// exactly one seat. Any failure of that write, whatever the store reports, is rolled
    /// back and returned as `TransactionFailed`. No seat is consumed on any error path.
    pub async fn enroll(
        &self,
        student_user_id: &str,
        offered_course_id: Uuid,
    ) -> Result<EnrolledCourse, EnrollmentError> {
        let offered = self
            .repo
            .find_offered_course(offered_course_id)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::OfferedCourse))?;

        let student = self
            .repo
            .find_student_by_user_id(student_user_id)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::Student))?;

        if self
            .repo
            .find_enrollment(student.id, offered.id, offered.semester_registration_id)
            .await?
            .is_some()
        {
            return Err(EnrollmentError::Conflict(ConflictKind::AlreadyEnrolled));
        }

        // Any non-positive counter is treated as full.
        if offered.max_capacity <= 0 {
            return Err(EnrollmentError::Conflict(ConflictKind::CapacityFull));
        }

        let course = self
            .repo
            .find_course(offered.course_id)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::Course))?;

        let registration = self
            .repo
            .find_semester_registration(offered.semester_registration_id)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::SemesterRegistration))?;

        let existing_credits = self
            .repo
            .total_enrolled_credits(student.id, registration.id)
            .await?;

        if existing_credits + i64::from(course.credits) > i64::from(registration.max_credit) {
            tracing::debug!(
                student_id = %student.id,
                existing_credits,
                course_credits = course.credits,
                max_credit = registration.max_credit,
                "credit limit exceeded"
            );
            return Err(EnrollmentError::Conflict(ConflictKind::CreditLimitExceeded));
        }

        let new =
            NewEnrollment::for_section(&offered, &student, course.credits, registration.max_credit);

        match self.repo.create_enrollment(new).await {
            Ok(record) => {
                tracing::info!(
                    enrollment_id = %record.id,
                    student_id = %student.id,
                    offered_course_id = %offered.id,
                    "student enrolled"
                );
                Ok(record)
            }
            Err(err) => {
                tracing::warn!(
                    student_id = %student.id,
                    offered_course_id = %offered.id,
                    error = %err,
                    "enrollment rolled back"
                );
                Err(EnrollmentError::TransactionFailed(err))
            }
        }
    }

    /// enrolled_courses_query
    ///
    /// Resolves the student and hands back a listing query scoped to them. Callers add
    /// filters, relations and paging, then call `fetch` / `count`.
    pub async fn enrolled_courses_query(
        &self,
        student_user_id: &str,
    ) -> Result<EnrolledCourseQuery, EnrollmentError> {
        let student = self
            .repo
            .find_student_by_user_id(student_user_id)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::Student))?;
        Ok(EnrolledCourseQuery::for_student(student.id))
    }
}
