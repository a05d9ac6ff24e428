#![allow(dead_code)]

use async_trait::async_trait;
use enrollment_portal::{
    models::{
        AcademicDepartment, AcademicFaculty, AcademicSemester, Course, CourseMarksPatch,
        EnrolledCourse, EnrolledCourseView, EnrollmentKey, Faculty, NewEnrollment, OfferedCourse,
        RegistrationStatus, Role, SemesterRegistration, Student, User, UserStatus,
    },
    query::EnrolledCourseQuery,
    repository::{InMemoryRepository, Repository, RepositoryError, RepositoryState},
};
use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};
use uuid::Uuid;

/// Campus
///
/// A seeded in-memory store: one academic faculty and department, one semester with an
/// ongoing registration, and one instructor. Sections and students are added per test.
pub struct Campus {
    pub repo: Arc<InMemoryRepository>,
    pub academic_faculty: AcademicFaculty,
    pub academic_department: AcademicDepartment,
    pub academic_semester: AcademicSemester,
    pub registration: SemesterRegistration,
    pub instructor: Faculty,
    next_code: AtomicI32,
}

impl Campus {
    pub async fn new(max_credit: i32) -> Self {
        let repo = Arc::new(InMemoryRepository::new());

        let academic_faculty = AcademicFaculty {
            id: Uuid::new_v4(),
            name: "Faculty of Science".to_string(),
        };
        let academic_department = AcademicDepartment {
            id: Uuid::new_v4(),
            name: "Computer Science".to_string(),
            academic_faculty_id: academic_faculty.id,
        };
        let academic_semester = AcademicSemester {
            id: Uuid::new_v4(),
            name: "Autumn".to_string(),
            year: "2025".to_string(),
            code: "01".to_string(),
        };
        let registration = SemesterRegistration {
            id: Uuid::new_v4(),
            academic_semester_id: academic_semester.id,
            status: RegistrationStatus::Ongoing,
            min_credit: 3,
            max_credit,
        };

        repo.insert_academic_faculty(academic_faculty.clone()).await;
        repo.insert_academic_department(academic_department.clone()).await;
        repo.insert_academic_semester(academic_semester.clone()).await;
        repo.insert_semester_registration(registration.clone()).await;

        let mut campus = Self {
            repo,
            academic_faculty,
            academic_department,
            academic_semester,
            registration,
            instructor: Faculty::default(),
            next_code: AtomicI32::new(100),
        };
        campus.instructor = campus.faculty_member("F-0001").await;
        campus
    }

    pub fn state(&self) -> RepositoryState {
        self.repo.clone()
    }

    async fn user(&self, id: &str, role: Role) {
        self.repo
            .insert_user(User {
                id: id.to_string(),
                role,
                status: UserStatus::InProgress,
                is_deleted: false,
            })
            .await;
    }

    pub async fn student(&self, user_id: &str) -> Student {
        self.user(user_id, Role::Student).await;
        let student = Student {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: format!("Student {user_id}"),
            academic_department_id: self.academic_department.id,
        };
        self.repo.insert_student(student.clone()).await;
        student
    }

    pub async fn faculty_member(&self, user_id: &str) -> Faculty {
        self.user(user_id, Role::Faculty).await;
        let faculty = Faculty {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: format!("Instructor {user_id}"),
            academic_department_id: self.academic_department.id,
        };
        self.repo.insert_faculty(faculty.clone()).await;
        faculty
    }

    /// Adds a course and a section of it taught by the campus instructor.
    pub async fn offer(&self, credits: i32, max_capacity: i32) -> OfferedCourse {
        let code = self.next_code.fetch_add(1, Ordering::Relaxed);
        let course = Course {
            id: Uuid::new_v4(),
            title: format!("Course {code}"),
            prefix: "CSE".to_string(),
            code,
            credits,
        };
        self.repo.insert_course(course.clone()).await;

        let offered = OfferedCourse {
            id: Uuid::new_v4(),
            semester_registration_id: self.registration.id,
            academic_semester_id: self.academic_semester.id,
            academic_faculty_id: self.academic_faculty.id,
            academic_department_id: self.academic_department.id,
            course_id: course.id,
            faculty_id: self.instructor.id,
            max_capacity,
            section: 1,
        };
        self.repo.insert_offered_course(offered.clone()).await;
        offered
    }
}

/// StaleReads
///
/// Wraps the in-memory store and lies on the read path, the way a read taken before a
/// concurrent commit would. Writes always reach the real store.
#[derive(Default)]
pub struct StaleReads {
    pub inner: Arc<InMemoryRepository>,
    /// Reported in place of the stored `max_capacity` of every offered course.
    pub reported_capacity: Option<i32>,
    /// Hides existing rows from the duplicate pre-check.
    pub hide_enrollments: bool,
    /// Written to the real row right after `find_faculty_enrollment` has read it.
    pub write_after_read: Option<CourseMarksPatch>,
}

impl StaleReads {
    pub fn over(inner: Arc<InMemoryRepository>) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Repository for StaleReads {
    async fn get_user(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        self.inner.get_user(id).await
    }
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, RepositoryError> {
        self.inner.find_student(id).await
    }
    async fn find_student_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Student>, RepositoryError> {
        self.inner.find_student_by_user_id(user_id).await
    }
    async fn find_faculty_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Faculty>, RepositoryError> {
        self.inner.find_faculty_by_user_id(user_id).await
    }
    async fn find_offered_course(
        &self,
        id: Uuid,
    ) -> Result<Option<OfferedCourse>, RepositoryError> {
        let offered = self.inner.find_offered_course(id).await?;
        Ok(offered.map(|offered| OfferedCourse {
            max_capacity: self.reported_capacity.unwrap_or(offered.max_capacity),
            ..offered
        }))
    }
    async fn find_course(&self, id: Uuid) -> Result<Option<Course>, RepositoryError> {
        self.inner.find_course(id).await
    }
    async fn find_semester_registration(
        &self,
        id: Uuid,
    ) -> Result<Option<SemesterRegistration>, RepositoryError> {
        self.inner.find_semester_registration(id).await
    }
    async fn find_enrollment(
        &self,
        student_id: Uuid,
        offered_course_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<Option<EnrolledCourse>, RepositoryError> {
        if self.hide_enrollments {
            return Ok(None);
        }
        self.inner
            .find_enrollment(student_id, offered_course_id, semester_registration_id)
            .await
    }
    async fn find_faculty_enrollment(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrolledCourse>, RepositoryError> {
        let read = self.inner.find_faculty_enrollment(key).await?;
        if let (Some(record), Some(patch)) = (&read, self.write_after_read) {
            self.inner.apply_course_marks(record.id, patch).await?;
        }
        Ok(read)
    }
    async fn total_enrolled_credits(
        &self,
        student_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<i64, RepositoryError> {
        self.inner
            .total_enrolled_credits(student_id, semester_registration_id)
            .await
    }
    async fn create_enrollment(
        &self,
        new: NewEnrollment,
    ) -> Result<EnrolledCourse, RepositoryError> {
        self.inner.create_enrollment(new).await
    }
    async fn apply_course_marks(
        &self,
        enrollment_id: Uuid,
        patch: CourseMarksPatch,
    ) -> Result<EnrolledCourse, RepositoryError> {
        self.inner.apply_course_marks(enrollment_id, patch).await
    }
    async fn list_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<Vec<EnrolledCourseView>, RepositoryError> {
        self.inner.list_enrolled_courses(query).await
    }
    async fn count_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<i64, RepositoryError> {
        self.inner.count_enrolled_courses(query).await
    }
}
