pub(crate) mod exam_export;
pub(crate) mod exam_generation;
pub(crate) mod exam_preview;
pub(crate) mod exam_session;
pub(crate) mod scoring;
pub(crate) mod storage;
pub(crate) mod timeline;
pub(crate) mod upload_staging;
pub(crate) mod upload_wizard;
