use crate::{
    AppState,
    auth::AuthUser,
    enrollment::EnrollmentService,
    error::{AppError, ErrorResponse},
    marks::MarkService,
    models::{
        CreateEnrolledCourseRequest, EnrolledCourse, EnrolledCoursePage, Role,
        UpdateCourseMarksRequest,
    },
    query::{DEFAULT_PAGE_LIMIT, EnrolledCourseRelation, SortOrder},
};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// EnrolledCourseParams
///
/// Query parameters accepted by GET /enrolled-courses/my-enrolled-courses.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct EnrolledCourseParams {
    /// 1-based page number.
    pub page: Option<i64>,
    /// Page size, clamped to 1..=100.
    pub limit: Option<i64>,
    /// Restrict to one semester registration.
    pub semester_registration: Option<Uuid>,
    /// Only completed (graded) or only open enrollments.
    pub completed: Option<bool>,
    pub sort: Option<SortOrder>,
    /// Comma-separated relations to attach, e.g. `course,offered_course`.
    pub populate: Option<String>,
}

// --- Handlers ---

/// create_enrolled_course
///
/// [Student Route] Enrolls the authenticated student into an offered course. The student
/// identity comes from `AuthUser`, never from the body.
#[utoipa::path(
    post,
    path = "/enrolled-courses/create-enrolled-course",
    request_body = CreateEnrolledCourseRequest,
    responses(
        (status = 201, description = "Enrolled", body = EnrolledCourse),
        (status = 403, description = "Not a student", body = ErrorResponse),
        (status = 404, description = "Offered course or student not found", body = ErrorResponse),
        (
            status = 409,
            description = "Already enrolled, capacity full or credit limit exceeded",
            body = ErrorResponse
        ),
        (status = 400, description = "Enrollment transaction failed", body = ErrorResponse)
    )
)]
pub async fn create_enrolled_course(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateEnrolledCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !auth.is(Role::Student) {
        return Err(AppError::Forbidden);
    }

    let record = EnrollmentService::new(state.repo.clone())
        .enroll(&auth.id, payload.offered_course)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// get_my_enrolled_courses
///
/// [Student Route] Lists the authenticated student's enrollments with paging metadata.
#[utoipa::path(
    get,
    path = "/enrolled-courses/my-enrolled-courses",
    params(EnrolledCourseParams),
    responses(
        (status = 200, description = "My enrolled courses", body = EnrolledCoursePage),
        (status = 400, description = "Unknown relation in `populate`", body = ErrorResponse),
        (status = 404, description = "Student not found", body = ErrorResponse)
    )
)]
pub async fn get_my_enrolled_courses(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<EnrolledCourseParams>,
) -> Result<Json<EnrolledCoursePage>, AppError> {
    if !auth.is(Role::Student) {
        return Err(AppError::Forbidden);
    }

    let mut query = EnrollmentService::new(state.repo.clone())
        .enrolled_courses_query(&auth.id)
        .await?
        .paginate(params.page.unwrap_or(1), params.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
        .sort(params.sort.unwrap_or_default());

    if let Some(id) = params.semester_registration {
        query = query.in_semester_registration(id);
    }
    if let Some(done) = params.completed {
        query = query.completed(done);
    }
    for name in params.populate.iter().flat_map(|p| p.split(',')).filter(|n| !n.trim().is_empty()) {
        let relation = name.parse::<EnrolledCourseRelation>().map_err(AppError::BadRequest)?;
        query = query.populate(relation);
    }

    let repo = state.repo.as_ref();
    let total = query.count(repo).await?;
    let data = query.fetch(repo).await?;

    Ok(Json(EnrolledCoursePage {
        meta: query.meta(total),
        data,
    }))
}

/// update_enrolled_course_marks
///
/// [Faculty Route] Records a partial set of course marks. Supplying `final_term` also
/// computes the grade and completes the enrollment.
#[utoipa::path(
    patch,
    path = "/enrolled-courses/update-enrolled-course-marks",
    request_body = UpdateCourseMarksRequest,
    responses(
        (status = 200, description = "Marks updated", body = EnrolledCourse),
        (status = 400, description = "Invalid marks", body = ErrorResponse),
        (status = 403, description = "Not the assigned faculty", body = ErrorResponse),
        (status = 404, description = "Referenced entity not found", body = ErrorResponse)
    )
)]
pub async fn update_enrolled_course_marks(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateCourseMarksRequest>,
) -> Result<Json<EnrolledCourse>, AppError> {
    if !auth.is(Role::Faculty) {
        return Err(AppError::Forbidden);
    }

    let record = MarkService::new(state.repo.clone())
        .record_marks(&auth.id, payload)
        .await?;

    Ok(Json(record))
}

/// not_found
///
/// Fallback for unknown paths.
pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::NOT_FOUND, Json(ErrorResponse::new("Not Found!")))
}
