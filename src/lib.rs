use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core domain: grading, the enrollment engine and mark recording.
pub mod enrollment;
pub mod grade;
pub mod marks;
pub mod models;
pub mod query;
pub mod repository;

// Request layer and ambient concerns.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;

use auth::AuthUser;
use routes::{faculty, public, student};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use enrollment::EnrollmentService;
pub use error::{AppError, EnrollmentError};
pub use marks::MarkService;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every handler annotated with `#[utoipa::path]`, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_enrolled_course,
        handlers::get_my_enrolled_courses,
        handlers::update_enrolled_course_marks,
    ),
    components(
        schemas(
            models::EnrolledCourse, models::CourseMarks, models::CourseMarksPatch,
            models::CreateEnrolledCourseRequest, models::UpdateCourseMarksRequest,
            models::EnrolledCourseView, models::EnrolledCoursePage, models::PageMeta,
            models::Course, models::OfferedCourse, models::SemesterRegistration,
            models::Faculty, models::AcademicSemester, models::AcademicFaculty,
            models::AcademicDepartment, grade::Grade, error::ErrorResponse,
        )
    ),
    tags(
        (name = "enrollment-portal", description = "Course enrollment and mark entry API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared by every request. Services are cheap to build from it per request.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    pub config: AppConfig,
}

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor before any student or faculty handler. A failed
/// extraction rejects the request with the extractor's status code.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles routes, applies the authentication layer to the protected groups, and wraps
/// everything in request-id and tracing layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = student::student_routes()
        .merge(faculty::faculty_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .fallback(handlers::not_found)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the `x-request-id` so every log line of a
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}
