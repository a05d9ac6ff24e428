/// Router Module Index
///
/// Routes are grouped by who may call them. The student and faculty groups sit behind the
/// authentication layer; the role itself is checked inside each handler.

/// Routes accessible without authentication.
pub mod public;

/// Routes for authenticated students (enrollment and listing).
pub mod student;

/// Routes for authenticated faculty (mark entry).
pub mod faculty;
