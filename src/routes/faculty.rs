use crate::{AppState, handlers};
use axum::{Router, routing::patch};

/// Faculty Router Module
///
/// Mark entry. Whether the faculty member teaches the section is decided by the mark
/// recording service, not by the route.
pub fn faculty_routes() -> Router<AppState> {
    Router::new()
        // PATCH /enrolled-courses/update-enrolled-course-marks
        // Partial mark update; a final-term mark also computes the grade.
        .route(
            "/enrolled-courses/update-enrolled-course-marks",
            patch(handlers::update_enrolled_course_marks),
        )
}
