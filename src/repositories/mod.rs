pub(crate) mod books;
pub(crate) mod exams;
pub(crate) mod records;
pub(crate) mod sessions;
pub(crate) mod users;
