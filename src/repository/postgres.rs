use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, postgres::PgRow, query_builder::QueryBuilder};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::{
    marks::grade_for_patch,
    models::{
        AcademicDepartment, AcademicFaculty, AcademicSemester, Course, CourseMarksPatch,
        EnrolledCourse, EnrolledCourseView, EnrollmentKey, Faculty, NewEnrollment, OfferedCourse,
        SemesterRegistration, Student, User,
    },
    query::{EnrolledCourseQuery, EnrolledCourseRelation, SortOrder},
};

const ENROLLED_COURSE_COLUMNS: &str = "id, semester_registration_id, academic_semester_id, \
    academic_faculty_id, academic_department_id, offered_course_id, course_id, student_id, \
    faculty_id, is_enrolled, class_test1, mid_term, class_test2, final_term, grade, \
    grade_points, is_completed, created_at, updated_at";

const OFFERED_COURSE_COLUMNS: &str = "id, semester_registration_id, academic_semester_id, \
    academic_faculty_id, academic_department_id, course_id, faculty_id, max_capacity, section";

const SEMESTER_REGISTRATION_COLUMNS: &str =
    "id, academic_semester_id, status, min_credit, max_credit";

const COURSE_COLUMNS: &str = "id, title, prefix, code, credits";
const STUDENT_COLUMNS: &str = "id, user_id, name, academic_department_id";
const FACULTY_COLUMNS: &str = "id, user_id, name, academic_department_id";

/// Rows that can be batch-loaded by primary key when populating listings.
trait Keyed {
    fn key(&self) -> Uuid;
}

macro_rules! keyed {
    ($($ty:ty),* $(,)?) => {
        $(impl Keyed for $ty {
            fn key(&self) -> Uuid {
                self.id
            }
        })*
    };
}

keyed!(
    SemesterRegistration,
    AcademicSemester,
    AcademicFaculty,
    AcademicDepartment,
    Faculty,
    Course,
    OfferedCourse,
);

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_id<T>(
        &self,
        table: &str,
        columns: &str,
        id: Uuid,
    ) -> Result<Option<T>, RepositoryError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let sql = format!("SELECT {columns} FROM {table} WHERE id = $1");
        Ok(sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn fetch_related<T>(
        &self,
        table: &str,
        columns: &str,
        ids: HashSet<Uuid>,
    ) -> Result<HashMap<Uuid, T>, RepositoryError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin + Keyed,
    {
        let ids: Vec<Uuid> = ids.into_iter().collect();
        let sql = format!("SELECT {columns} FROM {table} WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, T>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| (row.key(), row)).collect())
    }

    /// Attaches each requested relation with one `ANY($1)` lookup per relation.
    async fn populate(
        &self,
        views: &mut [EnrolledCourseView],
        relations: &[EnrolledCourseRelation],
    ) -> Result<(), RepositoryError> {
        fn ids(
            views: &[EnrolledCourseView],
            pick: impl Fn(&EnrolledCourse) -> Uuid,
        ) -> HashSet<Uuid> {
            views.iter().map(|view| pick(&view.enrollment)).collect()
        }

        for relation in relations {
            match relation {
                EnrolledCourseRelation::SemesterRegistration => {
                    let found: HashMap<Uuid, SemesterRegistration> = self
                        .fetch_related(
                            "semester_registrations",
                            SEMESTER_REGISTRATION_COLUMNS,
                            ids(views, |e| e.semester_registration_id),
                        )
                        .await?;
                    for view in views.iter_mut() {
                        view.semester_registration =
                            found.get(&view.enrollment.semester_registration_id).cloned();
                    }
                }
                EnrolledCourseRelation::AcademicSemester => {
                    let found: HashMap<Uuid, AcademicSemester> = self
                        .fetch_related(
                            "academic_semesters",
                            "id, name, year, code",
                            ids(views, |e| e.academic_semester_id),
                        )
                        .await?;
                    for view in views.iter_mut() {
                        view.academic_semester =
                            found.get(&view.enrollment.academic_semester_id).cloned();
                    }
                }
                EnrolledCourseRelation::AcademicFaculty => {
                    let found: HashMap<Uuid, AcademicFaculty> = self
                        .fetch_related(
                            "academic_faculties",
                            "id, name",
                            ids(views, |e| e.academic_faculty_id),
                        )
                        .await?;
                    for view in views.iter_mut() {
                        view.academic_faculty =
                            found.get(&view.enrollment.academic_faculty_id).cloned();
                    }
                }
                EnrolledCourseRelation::AcademicDepartment => {
                    let found: HashMap<Uuid, AcademicDepartment> = self
                        .fetch_related(
                            "academic_departments",
                            "id, name, academic_faculty_id",
                            ids(views, |e| e.academic_department_id),
                        )
                        .await?;
                    for view in views.iter_mut() {
                        view.academic_department =
                            found.get(&view.enrollment.academic_department_id).cloned();
                    }
                }
                EnrolledCourseRelation::Faculty => {
                    let found: HashMap<Uuid, Faculty> = self
                        .fetch_related("faculties", FACULTY_COLUMNS, ids(views, |e| e.faculty_id))
                        .await?;
                    for view in views.iter_mut() {
                        view.faculty = found.get(&view.enrollment.faculty_id).cloned();
                    }
                }
                EnrolledCourseRelation::Course => {
                    let found: HashMap<Uuid, Course> = self
                        .fetch_related("courses", COURSE_COLUMNS, ids(views, |e| e.course_id))
                        .await?;
                    for view in views.iter_mut() {
                        view.course = found.get(&view.enrollment.course_id).cloned();
                    }
                }
                EnrolledCourseRelation::OfferedCourse => {
                    let found: HashMap<Uuid, OfferedCourse> = self
                        .fetch_related(
                            "offered_courses",
                            OFFERED_COURSE_COLUMNS,
                            ids(views, |e| e.offered_course_id),
                        )
                        .await?;
                    for view in views.iter_mut() {
                        view.offered_course =
                            found.get(&view.enrollment.offered_course_id).cloned();
                    }
                }
            }
        }
        Ok(())
    }
}

/// Appends the student scope and optional filters of `query` to a statement that ends
/// right after `FROM enrolled_courses`.
fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, query: &EnrolledCourseQuery) {
    builder.push(" WHERE student_id = ");
    builder.push_bind(query.student_id());

    if let Some(id) = query.semester_registration_id() {
        builder.push(" AND semester_registration_id = ");
        builder.push_bind(id);
    }

    if let Some(done) = query.completed_filter() {
        builder.push(" AND is_completed = ");
        builder.push_bind(done);
    }
}

fn insert_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return RepositoryError::DuplicateEnrollment;
        }
    }
    RepositoryError::Database(err)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let sql = "SELECT id, role, status, is_deleted FROM users WHERE id = $1";
        Ok(sqlx::query_as::<_, User>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, RepositoryError> {
        self.find_by_id("students", STUDENT_COLUMNS, id).await
    }

    async fn find_student_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Student>, RepositoryError> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE user_id = $1");
        Ok(sqlx::query_as::<_, Student>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_faculty_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<Faculty>, RepositoryError> {
        let sql = format!("SELECT {FACULTY_COLUMNS} FROM faculties WHERE user_id = $1");
        Ok(sqlx::query_as::<_, Faculty>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_offered_course(
        &self,
        id: Uuid,
    ) -> Result<Option<OfferedCourse>, RepositoryError> {
        self.find_by_id("offered_courses", OFFERED_COURSE_COLUMNS, id).await
    }

    async fn find_course(&self, id: Uuid) -> Result<Option<Course>, RepositoryError> {
        self.find_by_id("courses", COURSE_COLUMNS, id).await
    }

    async fn find_semester_registration(
        &self,
        id: Uuid,
    ) -> Result<Option<SemesterRegistration>, RepositoryError> {
        self.find_by_id("semester_registrations", SEMESTER_REGISTRATION_COLUMNS, id)
            .await
    }

    async fn find_enrollment(
        &self,
        student_id: Uuid,
        offered_course_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<Option<EnrolledCourse>, RepositoryError> {
        let sql = format!(
            "SELECT {ENROLLED_COURSE_COLUMNS} FROM enrolled_courses \
             WHERE student_id = $1 AND offered_course_id = $2 AND semester_registration_id = $3"
        );
        Ok(sqlx::query_as::<_, EnrolledCourse>(&sql)
            .bind(student_id)
            .bind(offered_course_id)
            .bind(semester_registration_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_faculty_enrollment(
        &self,
        key: EnrollmentKey,
    ) -> Result<Option<EnrolledCourse>, RepositoryError> {
        let sql = format!(
            "SELECT {ENROLLED_COURSE_COLUMNS} FROM enrolled_courses \
             WHERE student_id = $1 AND offered_course_id = $2 \
               AND semester_registration_id = $3 AND faculty_id = $4"
        );
        Ok(sqlx::query_as::<_, EnrolledCourse>(&sql)
            .bind(key.student_id)
            .bind(key.offered_course_id)
            .bind(key.semester_registration_id)
            .bind(key.faculty_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// total_enrolled_credits
    ///
    /// Joins the student's enrollments in the registration to their courses and sums the
    /// credit weights. `COALESCE` turns the empty sum into 0.
    async fn total_enrolled_credits(
        &self,
        student_id: Uuid,
        semester_registration_id: Uuid,
    ) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(c.credits), 0)::BIGINT
            FROM enrolled_courses e
            JOIN courses c ON c.id = e.course_id
            WHERE e.student_id = $1 AND e.semester_registration_id = $2
            "#,
        )
        .bind(student_id)
        .bind(semester_registration_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// create_enrollment
    ///
    /// Runs the whole write in one transaction:
    /// 1. Locks the student row so one student's enrollments commit one at a time.
    /// 2. Re-derives the credit sum and rejects the write if the limit would be exceeded.
    /// 3. Inserts the enrollment (the unique index rejects a concurrent duplicate).
    /// 4. Decrements capacity only `WHERE max_capacity > 0`. Zero affected rows means the
    ///    seat went to someone else.
    ///
    /// Any early return drops `tx`, which rolls the transaction back.
    async fn create_enrollment(
        &self,
        new: NewEnrollment,
    ) -> Result<EnrolledCourse, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM students WHERE id = $1 FOR UPDATE")
            .bind(new.student_id)
            .fetch_optional(&mut *tx)
            .await?;

        let existing_credits = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(c.credits), 0)::BIGINT
            FROM enrolled_courses e
            JOIN courses c ON c.id = e.course_id
            WHERE e.student_id = $1 AND e.semester_registration_id = $2
            "#,
        )
        .bind(new.student_id)
        .bind(new.semester_registration_id)
        .fetch_one(&mut *tx)
        .await?;

        if existing_credits + i64::from(new.credits) > i64::from(new.max_credit) {
            tx.rollback().await?;
            return Err(RepositoryError::CreditLimitExceeded);
        }

        let sql = format!(
            r#"
            INSERT INTO enrolled_courses (
                id, semester_registration_id, academic_semester_id, academic_faculty_id,
                academic_department_id, offered_course_id, course_id, student_id, faculty_id,
                is_enrolled, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true, NOW(), NOW())
            RETURNING {ENROLLED_COURSE_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, EnrolledCourse>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.semester_registration_id)
            .bind(new.academic_semester_id)
            .bind(new.academic_faculty_id)
            .bind(new.academic_department_id)
            .bind(new.offered_course_id)
            .bind(new.course_id)
            .bind(new.student_id)
            .bind(new.faculty_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(insert_error)?;

        let seat = sqlx::query(
            "UPDATE offered_courses SET max_capacity = max_capacity - 1 \
             WHERE id = $1 AND max_capacity > 0",
        )
        .bind(new.offered_course_id)
        .execute(&mut *tx)
        .await?;

        if seat.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::SeatUnavailable);
        }

        tx.commit().await?;
        Ok(record)
    }

    /// apply_course_marks
    ///
    /// Locks the row with `FOR UPDATE`, derives the grade from the locked stored components
    /// plus the incoming `final_term`, then writes. `COALESCE` leaves components missing
    /// from the patch untouched. A concurrent patch to the same row waits for the commit.
    async fn apply_course_marks(
        &self,
        enrollment_id: Uuid,
        patch: CourseMarksPatch,
    ) -> Result<EnrolledCourse, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {ENROLLED_COURSE_COLUMNS} FROM enrolled_courses WHERE id = $1 FOR UPDATE"
        );
        let current = sqlx::query_as::<_, EnrolledCourse>(&select)
            .bind(enrollment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::RecordNotFound(enrollment_id))?;

        let outcome = grade_for_patch(&current.course_marks, &patch);

        let update = format!(
            r#"
            UPDATE enrolled_courses
            SET class_test1 = COALESCE($2, class_test1),
                mid_term = COALESCE($3, mid_term),
                class_test2 = COALESCE($4, class_test2),
                final_term = COALESCE($5, final_term),
                grade = COALESCE($6, grade),
                grade_points = COALESCE($7, grade_points),
                is_completed = is_completed OR $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ENROLLED_COURSE_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, EnrolledCourse>(&update)
            .bind(enrollment_id)
            .bind(patch.class_test1)
            .bind(patch.mid_term)
            .bind(patch.class_test2)
            .bind(patch.final_term)
            .bind(outcome.map(|o| o.grade))
            .bind(outcome.map(|o| o.grade_points))
            .bind(outcome.is_some())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// list_enrolled_courses
    ///
    /// Builds the scoped statement with `QueryBuilder` so every filter value is bound.
    async fn list_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<Vec<EnrolledCourseView>, RepositoryError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ENROLLED_COURSE_COLUMNS} FROM enrolled_courses"));
        push_scope(&mut builder, query);

        builder.push(match query.sort_order() {
            SortOrder::Newest => " ORDER BY created_at DESC, id",
            SortOrder::Oldest => " ORDER BY created_at ASC, id",
        });
        builder.push(" LIMIT ");
        builder.push_bind(query.limit());
        builder.push(" OFFSET ");
        builder.push_bind(query.offset());

        let rows = builder
            .build_query_as::<EnrolledCourse>()
            .fetch_all(&self.pool)
            .await?;

        let mut views: Vec<EnrolledCourseView> =
            rows.into_iter().map(EnrolledCourseView::from).collect();
        if !views.is_empty() {
            self.populate(&mut views, query.relations()).await?;
        }
        Ok(views)
    }

    async fn count_enrolled_courses(
        &self,
        query: &EnrolledCourseQuery,
    ) -> Result<i64, RepositoryError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM enrolled_courses");
        push_scope(&mut builder, query);

        Ok(builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?)
    }
}
