mod handler;
mod model;

pub use handler::{create_department, delete_department, get_department, list_departments, update_department};
pub use model::{Department, DepartmentSummary};
pub(crate) use model::DEPARTMENT_SUMMARY_JSON;
