mod handler;
mod model;

pub use handler::{create_student, delete_student, get_student, list_students, update_student};
pub use model::{Student, StudentStatus, StudentSummary};
pub(crate) use model::STUDENT_SUMMARY_JSON;
