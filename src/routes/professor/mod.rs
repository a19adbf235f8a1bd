mod handler;
mod model;

pub use handler::{create_professor, delete_professor, get_professor, list_professors, update_professor};
pub use model::{Degree, Professor, ProfessorSummary};
pub(crate) use model::PROFESSOR_SUMMARY_JSON;
