use serde::Deserialize;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::{EnrolledCourse, EnrolledCourseView, PageMeta},
    repository::{Repository, RepositoryError},
};

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// EnrolledCourseRelation
///
/// Related rows that can be attached to each listed enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrolledCourseRelation {
    SemesterRegistration,
    AcademicSemester,
    AcademicFaculty,
    AcademicDepartment,
    Faculty,
    Course,
    OfferedCourse,
}

impl EnrolledCourseRelation {
    pub const ALL: [EnrolledCourseRelation; 7] = [
        EnrolledCourseRelation::SemesterRegistration,
        EnrolledCourseRelation::AcademicSemester,
        EnrolledCourseRelation::AcademicFaculty,
        EnrolledCourseRelation::AcademicDepartment,
        EnrolledCourseRelation::Faculty,
        EnrolledCourseRelation::Course,
        EnrolledCourseRelation::OfferedCourse,
    ];
}

impl FromStr for EnrolledCourseRelation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "semester_registration" => Ok(Self::SemesterRegistration),
            "academic_semester" => Ok(Self::AcademicSemester),
            "academic_faculty" => Ok(Self::AcademicFaculty),
            "academic_department" => Ok(Self::AcademicDepartment),
            "faculty" => Ok(Self::Faculty),
            "course" => Ok(Self::Course),
            "offered_course" => Ok(Self::OfferedCourse),
            other => Err(format!("unknown relation `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

/// EnrolledCourseQuery
///
/// A listing of enrollments that is always scoped to one student. Callers compose
/// filters, relations and paging on top; the scope itself cannot be widened.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledCourseQuery {
    student_id: Uuid,
    semester_registration_id: Option<Uuid>,
    completed: Option<bool>,
    relations: Vec<EnrolledCourseRelation>,
    sort: SortOrder,
    page: i64,
    limit: i64,
}

impl EnrolledCourseQuery {
    pub fn for_student(student_id: Uuid) -> Self {
        Self {
            student_id,
            semester_registration_id: None,
            completed: None,
            relations: Vec::new(),
            sort: SortOrder::default(),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn populate(mut self, relation: EnrolledCourseRelation) -> Self {
        if !self.includes(relation) {
            self.relations.push(relation);
        }
        self
    }

    pub fn populate_all(self) -> Self {
        EnrolledCourseRelation::ALL
            .into_iter()
            .fold(self, |query, relation| query.populate(relation))
    }

    pub fn in_semester_registration(mut self, id: Uuid) -> Self {
        self.semester_registration_id = Some(id);
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Pages are 1-based; the limit is clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn paginate(mut self, page: i64, limit: i64) -> Self {
        self.page = page.max(1);
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn student_id(&self) -> Uuid {
        self.student_id
    }

    pub fn semester_registration_id(&self) -> Option<Uuid> {
        self.semester_registration_id
    }

    pub fn completed_filter(&self) -> Option<bool> {
        self.completed
    }

    pub fn relations(&self) -> &[EnrolledCourseRelation] {
        &self.relations
    }

    pub fn includes(&self, relation: EnrolledCourseRelation) -> bool {
        self.relations.contains(&relation)
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    /// Scope and filter check for stores that evaluate the query in process.
    pub fn matches(&self, record: &EnrolledCourse) -> bool {
        record.student_id == self.student_id
            && self
                .semester_registration_id
                .is_none_or(|id| record.semester_registration_id == id)
            && self.completed.is_none_or(|done| record.is_completed == done)
    }

    pub fn meta(&self, total: i64) -> PageMeta {
        PageMeta {
            page: self.page,
            limit: self.limit,
            total,
            total_page: (total + self.limit - 1) / self.limit,
        }
    }

    pub async fn fetch(
        &self,
        repo: &dyn Repository,
    ) -> Result<Vec<EnrolledCourseView>, RepositoryError> {
        repo.list_enrolled_courses(self).await
    }

    /// Total rows in scope after filters, ignoring pagination.
    pub async fn count(&self, repo: &dyn Repository) -> Result<i64, RepositoryError> {
        repo.count_enrolled_courses(self).await
    }
}
