use crate::{
    error::{EnrollmentError, Entity, UnauthorizedKind},
    grade::{GradeOutcome, calculate_grade},
    models::{
        CourseMarks, CourseMarksPatch, EnrolledCourse, EnrollmentKey, UpdateCourseMarksRequest,
    },
    repository::RepositoryState,
};

/// MarkService
///
/// Applies faculty mark entries to the one enrollment a faculty member is allowed to touch.
#[derive(Clone)]
pub struct MarkService {
    repo: RepositoryState,
}

impl MarkService {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// record_marks
    ///
    /// Resolves faculty → semester registration → offered course → student → enrollment.
    /// The enrollment lookup includes the faculty id, so a faculty member who is not the
    /// instructor of record gets `Unauthorized` even when every referenced row exists.
    /// The grade is derived inside the store's write, never from the record read here.
    pub async fn record_marks(
        &self,
        faculty_user_id: &str,
        request: UpdateCourseMarksRequest,
    ) -> Result<EnrolledCourse, EnrollmentError> {
        let faculty = self
            .repo
            .find_faculty_by_user_id(faculty_user_id)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::Faculty))?;

        let registration = self
            .repo
            .find_semester_registration(request.semester_registration)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::SemesterRegistration))?;

        let offered = self
            .repo
            .find_offered_course(request.offered_course)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::OfferedCourse))?;

        let student = self
            .repo
            .find_student(request.student)
            .await?
            .ok_or(EnrollmentError::NotFound(Entity::Student))?;

        let key = EnrollmentKey {
            student_id: student.id,
            offered_course_id: offered.id,
            semester_registration_id: registration.id,
            faculty_id: faculty.id,
        };
        let enrollment = self
            .repo
            .find_faculty_enrollment(key)
            .await?
            .ok_or(EnrollmentError::Unauthorized(UnauthorizedKind::NotAssignedFaculty))?;

        let patch = request.course_marks;
        patch.validate().map_err(EnrollmentError::InvalidMarks)?;

        let updated = self.repo.apply_course_marks(enrollment.id, patch).await?;

        tracing::info!(
            enrollment_id = %updated.id,
            faculty_id = %faculty.id,
            graded = patch.final_term.is_some(),
            grade = %updated.grade,
            "course marks recorded"
        );
        Ok(updated)
    }
}

/// Computes the grade when, and only when, the patch carries the final-term mark.
///
/// The other three components come from the stored record, not from the patch. Stores call
/// this while holding the row, so `stored` is the value the write lands on.
pub fn grade_for_patch(stored: &CourseMarks, patch: &CourseMarksPatch) -> Option<GradeOutcome> {
    patch.final_term.map(|final_term| {
        let total = stored.class_test1 + stored.class_test2 + stored.mid_term + final_term;
        calculate_grade(total)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grade::Grade;

    #[test]
    fn no_grade_without_final_term() {
        let patch = CourseMarksPatch {
            mid_term: Some(30.0),
            ..Default::default()
        };
        assert!(grade_for_patch(&CourseMarks::default(), &patch).is_none());
    }

    #[test]
    fn grade_uses_stored_components_and_incoming_final() {
        let stored = CourseMarks {
            class_test1: 18.0,
            class_test2: 19.0,
            mid_term: 16.0,
            final_term: 0.0,
        };
        // The incoming class_test1 is ignored for the total.
        let patch = CourseMarksPatch {
            class_test1: Some(0.0),
            final_term: Some(45.0),
            ..Default::default()
        };
        let outcome = grade_for_patch(&stored, &patch).unwrap();
        assert_eq!(outcome.grade, Grade::APlus);
        assert_eq!(outcome.grade_points, 4.0);
    }
}
