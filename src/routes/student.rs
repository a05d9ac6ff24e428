use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Student Router Module
///
/// Every handler here receives a validated `AuthUser` and rejects non-student roles
/// with 403.
pub fn student_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /enrolled-courses/create-enrolled-course
        // Runs the enrollment engine: eligibility checks, then the atomic insert + seat decrement.
        .route(
            "/enrolled-courses/create-enrolled-course",
            post(handlers::create_enrolled_course),
        )
        // GET /enrolled-courses/my-enrolled-courses?page=&limit=&populate=
        // Lists only the caller's own enrollments.
        .route(
            "/enrolled-courses/my-enrolled-courses",
            get(handlers::get_my_enrolled_courses),
        )
}
