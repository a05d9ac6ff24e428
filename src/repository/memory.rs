use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::{
    grade::Grade,
    marks::grade_for_patch,
    models::{
        AcademicDepartment, AcademicFaculty, AcademicSemester, Course, CourseMarks,
        CourseMarksPatch, EnrolledCourse, EnrolledCourseView, EnrollmentKey, Faculty,
        NewEnrollment, OfferedCourse, SemesterRegistration, Student, User,
    },
    query::{EnrolledCourseQuery, EnrolledCourseRelation, SortOrder},
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    students: HashMap<Uuid, Student>,
    faculties: HashMap<Uuid, Faculty>,
    courses: HashMap<Uuid, Course>,
    semester_registrations: HashMap<Uuid, SemesterRegistration>,
    offered_courses: HashMap<Uuid, OfferedCourse>,
    academic_semesters: HashMap<Uuid, AcademicSemester>,
    academic_faculties: HashMap<Uuid, AcademicFaculty>,
    academic_departments: HashMap<Uuid, AcademicDepartment>,
    enrollments: Vec<EnrolledCourse>,
    // Offered courses whose enrollment writes fail as if the store dropped the transaction.
    failing_writes: HashSet<Uuid>,
}

impl MemoryState {
    fn credits_of(&self, student_id: Uuid, semester_registration_id: Uuid) -> i64 {
        self.enrollments
            .iter()
            .filter(|e| {
                e.student_id == student_id && e.semester_registration_id == semester_registration_id
            })
            .filter_map(|e| self.courses.get(&e.course_id))
            .map(|c| i64::from(c.credits))
            .sum()
    }

    fn view(&self, record: &EnrolledCourse, query: &EnrolledCourseQuery) -> EnrolledCourseView {
        let mut view = EnrolledCourseView::from(record.clone());
        for relation in query.relations() {
            match relation {
                EnrolledCourseRelation::SemesterRegistration => {
                    view.semester_registration =
                        self.semester_registrations.get(&record.semester_registration_id).cloned();
                }
                EnrolledCourseRelation::AcademicSemester => {
                    view.academic_semester =
                        self.academic_semesters.get(&record.academic_semester_id).cloned();
                }
                EnrolledCourseRelation::AcademicFaculty => {
                    view.academic_faculty =
                        self.academic_faculties.get(&record.academic_faculty_id).cloned();
                }
                EnrolledCourseRelation::AcademicDepartment => {
                    view.academic_department =
                        self.academic_departments.get(&record.academic_department_id).cloned();
                }
                EnrolledCourseRelation::Faculty => {
                    view.faculty = self.faculties.get(&record.faculty_id).cloned();
                }
                EnrolledCourseRelation::Course => {
                    view.course = self.courses.get(&record.course_id).cloned();
                }
                EnrolledCourseRelation::OfferedCourse => {
                    view.offered_course =
                        self.offered_courses.get(&record.offered_course_id).cloned();
                }
            }
        }
        view
    }
}

/// InMemoryRepository
///
/// A process-local implementation of `Repository` used by tests and local experiments.
/// Every trait call takes the lock once, so the enrollment engine's pre-checks and its
/// final write interleave with other callers the same way separate statements do against
/// Postgres. `create_enrollment` performs its guarded checks and both writes under a single
/// acquisition, which is what makes it atomic.
#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding ---

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }

    pub async fn insert_student(&self, student: Student) {
        self.state.write().await.students.insert(student.id, student);
    }

    pub async fn insert_faculty(&self, faculty: Faculty) {
        self.state.write().await.faculties.insert(faculty.id, faculty);
    }

    pub async fn insert_course(&self, course: Course) {
        self.state.write().await.courses.insert(course.id, course);
    }

    pub async fn insert_semester_registration(&self, registration: SemesterRegistration) {
        self.state
            .write()
            .await
            .semester_registrations
            .insert(registration.id, registration);
    }

    pub async fn insert_offered_course(&self, offered: OfferedCourse) {
        self.state.write().await.offered_courses.insert(offered.id, offered);
    }

    pub async fn insert_academic_semester(&self, semester: AcademicSemester) {
        self.state.write().await.academic_semesters.insert(semester.id, semester);
    }

    pub async fn insert_academic_faculty(&self, faculty: AcademicFaculty) {
        self.state.write().await.academic_faculties.insert(faculty.id, faculty);
    }

    pub async fn insert_academic_department(&self, department: AcademicDepartment) {
        self.state
            .write()
            .await
            .academic_departments
            .insert(department.id, department);
    }

    /// Makes every later enrollment write into `offered_course_id` fail mid-transaction.
    pub async fn fail_writes_for(&self, offered_course_id: Uuid) {
        self.state.write().await.failing_writes.insert(offered_course_id);
    }

    // --- Inspection ---

    pub async fn remaining_capacity(&self, offered_course_id: Uuid) -> Option<i32> {
        self.state
            .read()
            .await
            .offered_courses
            .get(&offered_course_id)
            .map(|o| o.max_capacity)
    }

    pub async fn enrollments_for_section(&self, offered_course_id: Uuid) -> Vec<EnrolledCourse> {
        self.state
            .read()
            .await
            .enrollments
            .iter()
            .filter(|e| e.offered_course_id == offered_course_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, RepositoryError> {
        Ok(self.state.read().await.students.get(&id).cloned())
    }

    async fn find_student_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Student>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .students
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn find_faculty_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Faculty>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .faculties
            .values()
            .find(|f| f.user_id == user_id)
            .cloned())
    }

    async fn find_offered_course(
        &self,
        id: Uuid,
    ) -> Result<Option<OfferedCourse>, RepositoryError> {
        Ok(self.state.read().await.offered_courses.get(&id).cloned())
    }

    async fn find_course(&self, id: Uuid) -> Result<Option<Course>, RepositoryError> {
        Ok(self.state.read().await.courses.get(&id).cloned())
    }

    async fn find_semester_registration(
        &self,
        id: Uuid,
    ) -> Result<Option<SemesterRegistration>, RepositoryError> {
        Ok(self.state.read().await.semester_registrations.get(&id).cloned())
    }

    async fn find_enrollment(
        &self,
        student_id: Uuid,
        offered_course_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<Option<EnrolledCourse>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .iter()
            .find(|e| {
                e.student_id == student_id
                    && e.offered_course_id == offered_course_id
                    && e.semester_registration_id == semester_registration_id
            })
            .cloned())
    }

    async fn find_faculty_enrollment(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrolledCourse>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .iter()
            .find(|e| {
                e.student_id == key.student_id
                    && e.offered_course_id == key.offered_course_id
                    && e.semester_registration_id == key.semester_registration_id
                    && e.faculty_id == key.faculty_id
            })
            .cloned())
    }

    async fn total_enrolled_credits(
        &self,
        student_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<i64, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .credits_of(student_id, semester_registration_id))
    }

    async fn create_enrollment(
        &self,
        new: NewEnrollment,
    ) -> Result<EnrolledCourse, RepositoryError> {
        let mut state = self.state.write().await;

        if state
            .credits_of(new.student_id, new.semester_registration_id)
            + i64::from(new.credits)
            > i64::from(new.max_credit)
        {
            return Err(RepositoryError::CreditLimitExceeded);
        }

        if state
            .enrollments
            .iter()
            .any(|e| e.student_id == new.student_id && e.offered_course_id == new.offered_course_id)
        {
            return Err(RepositoryError::DuplicateEnrollment);
        }

        if state.failing_writes.contains(&new.offered_course_id) {
            return Err(RepositoryError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }

        let offered = state
            .offered_courses
            .get_mut(&new.offered_course_id)
            .ok_or(RepositoryError::RecordNotFound(new.offered_course_id))?;
        if offered.max_capacity <= 0 {
            return Err(RepositoryError::SeatUnavailable);
        }
        offered.max_capacity -= 1;

        let now = Utc::now();
        let record = EnrolledCourse {
            id: Uuid::new_v4(),
            semester_registration_id: new.semester_registration_id,
            academic_semester_id: new.academic_semester_id,
            academic_faculty_id: new.academic_faculty_id,
            academic_department_id: new.academic_department_id,
            offered_course_id: new.offered_course_id,
            course_id: new.course_id,
            student_id: new.student_id,
            faculty_id: new.faculty_id,
            is_enrolled: true,
            course_marks: CourseMarks::default(),
            grade: Grade::Na,
            grade_points: 0.0,
            is_completed: false,
            created_at: now,
            updated_at: now,
        };
        state.enrollments.push(record.clone());
        Ok(record)
    }

    async fn apply_course_marks(
        &self,
        enrollment_id: Uuid,
        patch: CourseMarksPatch,
    ) -> Result<EnrolledCourse, RepositoryError> {
        let mut state = self.state.write().await;
        let record = state
            .enrollments
            .iter_mut()
            .find(|e| e.id == enrollment_id)
            .ok_or(RepositoryError::RecordNotFound(enrollment_id))?;

        // Graded against the marks stored under this same lock.
        let outcome = grade_for_patch(&record.course_marks, &patch);
        record.course_marks = record.course_marks.merge(&patch);
        if let Some(outcome) = outcome {
            record.grade = outcome.grade;
            record.grade_points = outcome.grade_points;
            record.is_completed = true;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<Vec<EnrolledCourseView>, RepositoryError> {
        let state = self.state.read().await;
        let mut rows: Vec<&EnrolledCourse> =
            state.enrollments.iter().filter(|e| query.matches(e)).collect();

        match query.sort_order() {
            SortOrder::Newest => {
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)))
            }
            SortOrder::Oldest => {
                rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            }
        }

        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit()).unwrap_or(0);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|record| state.view(record, query))
            .collect())
    }

    async fn count_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<i64, RepositoryError> {
        let state = self.state.read().await;
        let total = state.enrollments.iter().filter(|e| query.matches(e)).count();
        Ok(i64::try_from(total).unwrap_or(i64::MAX))
    }
}
