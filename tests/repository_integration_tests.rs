//! Postgres-backed checks of the enrollment transaction.
//!
//! Ignored by default. Run with `DATABASE_URL` pointing at a disposable database:
//! `cargo test --test repository_integration_tests -- --ignored`

use enrollment_portal::{
    EnrollmentService,
    error::{ConflictKind, EnrollmentError},
    grade::Grade,
    models::{CourseMarksPatch, OfferedCourse},
    query::{EnrolledCourseQuery, EnrolledCourseRelation},
    repository::{PostgresRepository, Repository, RepositoryState},
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> RepositoryState {
        Arc::new(PostgresRepository::new(self.pool.clone()))
    }
}

// --- Test Data Helpers ---

/// Seeds one registration and one section with the given credits and capacity.
/// Every name is suffixed so repeated runs do not collide on unique columns.
async fn seed_section(
    pool: &PgPool,
    credits: i32,
    max_capacity: i32,
    max_credit: i32,
) -> OfferedCourse {
    let tag = Uuid::new_v4().simple().to_string();
    let academic_faculty_id = Uuid::new_v4();
    let academic_department_id = Uuid::new_v4();
    let academic_semester_id = Uuid::new_v4();
    let registration_id = Uuid::new_v4();
    let course_id = Uuid::new_v4();
    let faculty_id = Uuid::new_v4();
    let faculty_user = format!("F-{tag}");

    sqlx::query("INSERT INTO academic_faculties (id, name) VALUES ($1, $2)")
        .bind(academic_faculty_id)
        .bind(format!("Science {tag}"))
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO academic_departments (id, name, academic_faculty_id) VALUES ($1, $2, $3)",
    )
    .bind(academic_department_id)
    .bind(format!("CSE {tag}"))
    .bind(academic_faculty_id)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO academic_semesters (id, name, year, code) \
         VALUES ($1, 'Autumn', '2025', '01')",
    )
    .bind(academic_semester_id)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO semester_registrations (id, academic_semester_id, status, max_credit) \
         VALUES ($1, $2, 'ONGOING', $3)",
    )
    .bind(registration_id)
    .bind(academic_semester_id)
    .bind(max_credit)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO courses (id, title, prefix, code, credits) VALUES ($1, $2, 'CSE', 101, $3)",
    )
    .bind(course_id)
    .bind(format!("Algorithms {tag}"))
    .bind(credits)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO users (id, role) VALUES ($1, 'faculty')")
        .bind(&faculty_user)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO faculties (id, user_id, name, academic_department_id) \
         VALUES ($1, $2, 'Instructor', $3)",
    )
    .bind(faculty_id)
    .bind(&faculty_user)
    .bind(academic_department_id)
    .execute(pool)
    .await
    .unwrap();

    let offered = OfferedCourse {
        id: Uuid::new_v4(),
        semester_registration_id: registration_id,
        academic_semester_id,
        academic_faculty_id,
        academic_department_id,
        course_id,
        faculty_id,
        max_capacity,
        section: 1,
    };
    sqlx::query(
        "INSERT INTO offered_courses (id, semester_registration_id, academic_semester_id, \
         academic_faculty_id, academic_department_id, course_id, faculty_id, max_capacity, \
         section) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(offered.id)
    .bind(offered.semester_registration_id)
    .bind(offered.academic_semester_id)
    .bind(offered.academic_faculty_id)
    .bind(offered.academic_department_id)
    .bind(offered.course_id)
    .bind(offered.faculty_id)
    .bind(offered.max_capacity)
    .bind(offered.section)
    .execute(pool)
    .await
    .unwrap();

    offered
}

/// Inserts a student user in the section's department and returns its user id.
async fn seed_student(pool: &PgPool, offered: &OfferedCourse) -> String {
    let user_id = format!("S-{}", Uuid::new_v4().simple());
    sqlx::query("INSERT INTO users (id, role) VALUES ($1, 'student')")
        .bind(&user_id)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO students (id, user_id, name, academic_department_id) \
         VALUES ($1, $2, 'Student', $3)",
    )
    .bind(Uuid::new_v4())
    .bind(&user_id)
    .bind(offered.academic_department_id)
    .execute(pool)
    .await
    .unwrap();
    user_id
}

async fn capacity(pool: &PgPool, offered_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT max_capacity FROM offered_courses WHERE id = $1")
        .bind(offered_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

// --- Tests ---

#[tokio::test]
#[ignore]
async fn test_enroll_then_mark_round_trip() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let offered = seed_section(&ctx.pool, 3, 2, 15).await;
    let user_id = seed_student(&ctx.pool, &offered).await;

    let record = EnrollmentService::new(repo.clone())
        .enroll(&user_id, offered.id)
        .await
        .unwrap();
    assert_eq!(record.grade, Grade::Na);
    assert_eq!(capacity(&ctx.pool, offered.id).await, 1);

    let updated = repo
        .apply_course_marks(
            record.id,
            CourseMarksPatch {
                class_test1: Some(18.0),
                class_test2: Some(19.0),
                mid_term: Some(16.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.grade, Grade::Na);
    assert!(!updated.is_completed);

    // 18 + 19 + 16 stored, plus 45 incoming.
    let updated = repo
        .apply_course_marks(
            record.id,
            CourseMarksPatch {
                final_term: Some(45.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.grade, Grade::APlus);
    assert_eq!(updated.grade_points, 4.0);
    assert_eq!(updated.course_marks.final_term, 45.0);
    assert!(updated.is_completed);

    // A later partial patch keeps the untouched components and the grade.
    let updated = repo
        .apply_course_marks(
            record.id,
            CourseMarksPatch {
                mid_term: Some(17.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.course_marks.mid_term, 17.0);
    assert_eq!(updated.course_marks.class_test1, 18.0);
    assert_eq!(updated.grade, Grade::APlus);
    assert!(updated.is_completed);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_enrollments_respect_capacity() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let offered = seed_section(&ctx.pool, 3, 2, 15).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let user_id = seed_student(&ctx.pool, &offered).await;
        let service = EnrollmentService::new(repo.clone());
        let offered_id = offered.id;
        handles.push(tokio::spawn(async move { service.enroll(&user_id, offered_id).await }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(EnrollmentError::Conflict(ConflictKind::CapacityFull))
            | Err(EnrollmentError::TransactionFailed(_)) => {}
            Err(other) => panic!("unexpected enrollment error: {other}"),
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(capacity(&ctx.pool, offered.id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_listing_is_scoped_and_populated() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let offered = seed_section(&ctx.pool, 3, 5, 15).await;
    let mine = seed_student(&ctx.pool, &offered).await;
    let theirs = seed_student(&ctx.pool, &offered).await;

    let service = EnrollmentService::new(repo.clone());
    service.enroll(&mine, offered.id).await.unwrap();
    service.enroll(&theirs, offered.id).await.unwrap();

    let student = repo.find_student_by_user_id(&mine).await.unwrap().unwrap();
    let query =
        EnrolledCourseQuery::for_student(student.id).populate(EnrolledCourseRelation::Course);

    assert_eq!(query.count(repo.as_ref()).await.unwrap(), 1);
    let rows = query.fetch(repo.as_ref()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].enrollment.student_id, student.id);
    assert_eq!(rows[0].course.as_ref().map(|c| c.id), Some(offered.course_id));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn test_concurrent_mark_writes_grade_against_committed_marks() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let offered = seed_section(&ctx.pool, 3, 2, 15).await;
    let user_id = seed_student(&ctx.pool, &offered).await;
    let record = EnrollmentService::new(repo.clone())
        .enroll(&user_id, offered.id)
        .await
        .unwrap();

    let writers = [
        CourseMarksPatch {
            class_test1: Some(40.0),
            ..Default::default()
        },
        CourseMarksPatch {
            final_term: Some(45.0),
            ..Default::default()
        },
    ]
    .into_iter()
    .map(|patch| {
        let repo = repo.clone();
        tokio::spawn(async move { repo.apply_course_marks(record.id, patch).await })
    })
    .collect::<Vec<_>>();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    // Whichever order the row locks granted, the grade matches a total the store held.
    let stored = repo
        .apply_course_marks(
            record.id,
            CourseMarksPatch {
                mid_term: Some(0.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(stored.course_marks.class_test1, 40.0);
    assert_eq!(stored.course_marks.final_term, 45.0);
    assert!(stored.is_completed);
    assert!(matches!(stored.grade, Grade::APlus | Grade::C));
}
