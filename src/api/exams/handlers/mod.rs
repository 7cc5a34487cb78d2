mod authoring;
mod browse;
mod manage;

pub(super) use authoring::{create_exam, generate_exam, preview_page, score_preview};
pub(super) use browse::{get_exam, list_exams};
pub(super) use manage::{delete_exam, export_exam, export_payload};
