use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::db::types::DocumentType;

const INITIAL_ASSESSMENT_NOTE: &str = "Initial assessment submitted";

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum WizardError {
    #[error("Select a document type first")]
    NoDocumentType,
    #[error("At most {max} files can be attached")]
    TooManyFiles { max: usize },
    #[error("File index {index} is out of range ({len} files attached)")]
    InvalidFileIndex { index: usize, len: usize },
    #[error("A submission is already in progress")]
    SubmitInFlight,
    #[error("This upload has already been submitted")]
    AlreadySubmitted,
    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum WizardStep {
    SelectType,
    UploadFiles,
    ReviewText,
    Metadata,
    Submitted,
}

/// File held in memory between upload and submission.
#[derive(Debug, Clone)]
pub(crate) struct StagedFile {
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) bytes: Arc<[u8]>,
}

impl StagedFile {
    pub(crate) fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Issues and releases preview URLs for staged files.
pub(crate) trait PreviewUrls {
    fn create(&mut self, file: &StagedFile) -> String;
    fn revoke(&mut self, url: &str);
}

#[derive(Debug, Clone)]
pub(crate) struct WizardFile {
    pub(crate) file: StagedFile,
    pub(crate) preview_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct RecordMetadata {
    pub(crate) doctor_id: Option<String>,
    pub(crate) patient_name: Option<String>,
    pub(crate) age: Option<i32>,
    pub(crate) gender: Option<String>,
    pub(crate) contact: Option<String>,
    pub(crate) notes: Option<String>,
}

/// Partial metadata change; `None` leaves a field as it is. Text fields are
/// cleared with an empty string, `age` with `Some(None)`.
#[derive(Debug, Clone, Default)]
pub(crate) struct MetadataUpdate {
    pub(crate) doctor_id: Option<String>,
    pub(crate) patient_name: Option<String>,
    pub(crate) age: Option<Option<i32>>,
    pub(crate) gender: Option<String>,
    pub(crate) contact: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) extracted_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeedTimelineEntry {
    pub(crate) date: Date,
    pub(crate) description: String,
    pub(crate) notes: String,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordDraft {
    pub(crate) document_type: DocumentType,
    pub(crate) doctor_id: String,
    pub(crate) patient_name: Option<String>,
    pub(crate) age: Option<i32>,
    pub(crate) gender: Option<String>,
    pub(crate) contact: Option<String>,
    pub(crate) notes: Option<String>,
    pub(crate) extracted_text: Option<String>,
    pub(crate) files: Vec<StagedFile>,
    pub(crate) seed_entry: SeedTimelineEntry,
}

/// Multi-step patient document upload.
///
/// Every preview URL created through `P` is revoked exactly once: on
/// removal of its file, on [`UploadWizard::clear`], after a successful
/// submission, or when the wizard is dropped.
pub(crate) struct UploadWizard<P: PreviewUrls> {
    previews: P,
    max_files: usize,
    document_type: Option<DocumentType>,
    files: Vec<WizardFile>,
    metadata: RecordMetadata,
    extracted_text: String,
    text_edited: bool,
    metadata_started: bool,
    in_flight: bool,
    submitted: bool,
}

impl<P: PreviewUrls> UploadWizard<P> {
    pub(crate) fn new(previews: P, max_files: usize) -> Self {
        Self {
            previews,
            max_files,
            document_type: None,
            files: Vec::new(),
            metadata: RecordMetadata::default(),
            extracted_text: String::new(),
            text_edited: false,
            metadata_started: false,
            in_flight: false,
            submitted: false,
        }
    }

    pub(crate) fn step(&self) -> WizardStep {
        match self.document_type {
            _ if self.submitted => WizardStep::Submitted,
            None => WizardStep::SelectType,
            Some(_) if self.files.is_empty() => WizardStep::UploadFiles,
            Some(kind) if !kind.is_initial_assessment() && !self.metadata_started => {
                WizardStep::ReviewText
            }
            Some(_) => WizardStep::Metadata,
        }
    }

    pub(crate) fn document_type(&self) -> Option<DocumentType> {
        self.document_type
    }

    pub(crate) fn files(&self) -> &[WizardFile] {
        &self.files
    }

    pub(crate) fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub(crate) fn extracted_text(&self) -> &str {
        &self.extracted_text
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn select_document_type(&mut self, kind: DocumentType) -> Result<(), WizardError> {
        self.ensure_editable()?;
        self.document_type = Some(kind);
        self.refresh_placeholder();
        Ok(())
    }

    pub(crate) fn add_file(&mut self, file: StagedFile) -> Result<&WizardFile, WizardError> {
        self.ensure_editable()?;
        if self.document_type.is_none() {
            return Err(WizardError::NoDocumentType);
        }
        if self.files.len() >= self.max_files {
            return Err(WizardError::TooManyFiles { max: self.max_files });
        }

        let preview_url = self.previews.create(&file);
        self.files.push(WizardFile { file, preview_url });
        self.refresh_placeholder();
        let index = self.files.len() - 1;
        Ok(&self.files[index])
    }

    pub(crate) fn remove_file(&mut self, index: usize) -> Result<StagedFile, WizardError> {
        self.ensure_editable()?;
        if index >= self.files.len() {
            return Err(WizardError::InvalidFileIndex { index, len: self.files.len() });
        }
        let removed = self.files.remove(index);
        self.previews.revoke(&removed.preview_url);
        self.refresh_placeholder();
        Ok(removed.file)
    }

    pub(crate) fn set_metadata(&mut self, update: MetadataUpdate) -> Result<(), WizardError> {
        self.ensure_editable()?;
        let MetadataUpdate {
            doctor_id,
            patient_name,
            age,
            gender,
            contact,
            notes,
            extracted_text,
        } = update;

        if let Some(doctor_id) = doctor_id {
            self.metadata.doctor_id = non_empty(doctor_id);
        }
        if let Some(patient_name) = patient_name {
            self.metadata.patient_name = non_empty(patient_name);
        }
        if let Some(age) = age {
            self.metadata.age = age;
        }
        if let Some(gender) = gender {
            self.metadata.gender = non_empty(gender);
        }
        if let Some(contact) = contact {
            self.metadata.contact = non_empty(contact);
        }
        if let Some(notes) = notes {
            self.metadata.notes = non_empty(notes);
        }
        if let Some(text) = extracted_text {
            self.extracted_text = text;
            self.text_edited = true;
        }
        self.metadata_started = true;
        Ok(())
    }

    /// Revokes every outstanding preview URL and resets to the first step.
    pub(crate) fn clear(&mut self) {
        self.revoke_all();
        self.document_type = None;
        self.metadata = RecordMetadata::default();
        self.extracted_text.clear();
        self.text_edited = false;
        self.metadata_started = false;
        self.in_flight = false;
        self.submitted = false;
    }

    /// Every validation failure, in form order.
    pub(crate) fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let Some(kind) = self.document_type else {
            errors.push("Document type is required".to_string());
            return errors;
        };
        if self.metadata.doctor_id.is_none() {
            errors.push("Assign a doctor".to_string());
        }
        if kind.is_initial_assessment() {
            if self.metadata.patient_name.is_none() {
                errors.push("Patient name is required".to_string());
            }
            match self.metadata.age {
                None => errors.push("Age is required".to_string()),
                Some(age) if !(0..=150).contains(&age) => {
                    errors.push("Age must be between 0 and 150".to_string())
                }
                Some(_) => {}
            }
            if self.metadata.gender.is_none() {
                errors.push("Gender is required".to_string());
            }
        }
        if self.files.is_empty() {
            errors.push("Upload at least one file".to_string());
        }
        if !kind.is_initial_assessment() && self.extracted_text.trim().is_empty() {
            errors.push("Extracted text must not be empty".to_string());
        }
        errors
    }

    pub(crate) fn validate(&self) -> Result<(), WizardError> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(WizardError::Invalid(errors))
        }
    }

    /// Validates and marks a submission as in flight. Call
    /// [`UploadWizard::finish_submit`] once the record is stored or failed.
    pub(crate) fn begin_submit(&mut self, today: Date) -> Result<RecordDraft, WizardError> {
        if self.submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.in_flight {
            return Err(WizardError::SubmitInFlight);
        }
        self.validate()?;

        let (Some(document_type), Some(doctor_id)) =
            (self.document_type, self.metadata.doctor_id.clone())
        else {
            return Err(WizardError::NoDocumentType);
        };

        let extracted_text = if document_type.is_initial_assessment() {
            non_empty(self.extracted_text.clone())
        } else {
            Some(self.extracted_text.trim().to_string())
        };
        let seed_entry = SeedTimelineEntry {
            date: today,
            description: document_type.label().to_string(),
            notes: extracted_text.clone().unwrap_or_else(|| INITIAL_ASSESSMENT_NOTE.to_string()),
        };

        self.in_flight = true;
        Ok(RecordDraft {
            document_type,
            doctor_id,
            patient_name: self.metadata.patient_name.clone(),
            age: self.metadata.age,
            gender: self.metadata.gender.clone(),
            contact: self.metadata.contact.clone(),
            notes: self.metadata.notes.clone(),
            extracted_text,
            files: self.files.iter().map(|entry| entry.file.clone()).collect(),
            seed_entry,
        })
    }

    /// Ends an in-flight submission. On success the staged files are released
    /// and the wizard becomes terminal; on failure it stays editable.
    pub(crate) fn finish_submit(&mut self, succeeded: bool) {
        self.in_flight = false;
        if succeeded {
            self.revoke_all();
            self.submitted = true;
        }
    }

    fn ensure_editable(&self) -> Result<(), WizardError> {
        if self.submitted {
            return Err(WizardError::AlreadySubmitted);
        }
        if self.in_flight {
            return Err(WizardError::SubmitInFlight);
        }
        Ok(())
    }

    fn refresh_placeholder(&mut self) {
        if self.text_edited {
            return;
        }
        self.extracted_text = match self.document_type {
            Some(kind) if !kind.is_initial_assessment() && !self.files.is_empty() => {
                let names: Vec<&str> =
                    self.files.iter().map(|entry| entry.file.filename.as_str()).collect();
                extracted_text_placeholder(kind, &names)
            }
            _ => String::new(),
        };
    }

    fn revoke_all(&mut self) {
        for entry in self.files.drain(..) {
            self.previews.revoke(&entry.preview_url);
        }
    }
}

impl<P: PreviewUrls> Drop for UploadWizard<P> {
    fn drop(&mut self) {
        self.revoke_all();
    }
}

/// Stand-in for OCR output until a document is reviewed by hand.
pub(crate) fn extracted_text_placeholder(kind: DocumentType, filenames: &[&str]) -> String {
    format!(
        "{} extracted from {}. Review and correct this text before submitting.",
        kind.label(),
        filenames.join(", ")
    )
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use time::Month;

    #[derive(Default)]
    struct UrlLog {
        created: Vec<String>,
        revoked: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct CountingUrls {
        log: Arc<Mutex<UrlLog>>,
    }

    impl CountingUrls {
        fn counts(&self) -> (usize, usize) {
            let log = self.log.lock().unwrap();
            (log.created.len(), log.revoked.len())
        }

        fn assert_each_revoked_once(&self) {
            let log = self.log.lock().unwrap();
            let mut revoked = log.revoked.clone();
            revoked.sort();
            revoked.dedup();
            assert_eq!(revoked.len(), log.revoked.len(), "double revoke");
            let mut created = log.created.clone();
            created.sort();
            assert_eq!(created, revoked);
        }
    }

    impl PreviewUrls for CountingUrls {
        fn create(&mut self, file: &StagedFile) -> String {
            let mut log = self.log.lock().unwrap();
            let url = format!("blob:{}:{}", log.created.len(), file.filename);
            log.created.push(url.clone());
            url
        }

        fn revoke(&mut self, url: &str) {
            self.log.lock().unwrap().revoked.push(url.to_string());
        }
    }

    fn file(name: &str) -> StagedFile {
        StagedFile {
            filename: name.to_string(),
            content_type: "image/png".to_string(),
            bytes: Arc::from(&b"png-bytes"[..]),
        }
    }

    fn today() -> Date {
        Date::from_calendar_date(2025, Month::June, 1).unwrap()
    }

    fn wizard(urls: &CountingUrls) -> UploadWizard<CountingUrls> {
        UploadWizard::new(urls.clone(), 10)
    }

    #[test]
    fn clear_revokes_every_created_url_once() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        wizard.select_document_type(DocumentType::LabReport).unwrap();
        for index in 0..5 {
            wizard.add_file(file(&format!("scan-{index}.png"))).unwrap();
        }
        wizard.remove_file(1).unwrap();
        assert_eq!(urls.counts(), (5, 1));

        wizard.clear();
        assert_eq!(urls.counts(), (5, 5));
        drop(wizard);
        assert_eq!(urls.counts(), (5, 5));
        urls.assert_each_revoked_once();
    }

    #[test]
    fn dropping_the_wizard_revokes_outstanding_urls() {
        let urls = CountingUrls::default();
        {
            let mut wizard = wizard(&urls);
            wizard.select_document_type(DocumentType::InitialAssessment).unwrap();
            wizard.add_file(file("a.png")).unwrap();
            wizard.add_file(file("b.png")).unwrap();
        }
        assert_eq!(urls.counts(), (2, 2));
        urls.assert_each_revoked_once();
    }

    #[test]
    fn steps_follow_the_linear_flow() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        assert_eq!(wizard.step(), WizardStep::SelectType);
        assert_eq!(wizard.add_file(file("x.png")).unwrap_err(), WizardError::NoDocumentType);

        wizard.select_document_type(DocumentType::ImagingReport).unwrap();
        assert_eq!(wizard.step(), WizardStep::UploadFiles);
        wizard.add_file(file("ct.png")).unwrap();
        assert_eq!(wizard.step(), WizardStep::ReviewText);
        wizard.set_metadata(MetadataUpdate::default()).unwrap();
        assert_eq!(wizard.step(), WizardStep::Metadata);
    }

    #[test]
    fn placeholder_tracks_files_until_edited() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        wizard.select_document_type(DocumentType::LabReport).unwrap();
        assert_eq!(wizard.extracted_text(), "");

        wizard.add_file(file("cbc.png")).unwrap();
        wizard.add_file(file("lft.png")).unwrap();
        assert_eq!(
            wizard.extracted_text(),
            extracted_text_placeholder(DocumentType::LabReport, &["cbc.png", "lft.png"])
        );

        wizard
            .set_metadata(MetadataUpdate {
                extracted_text: Some("Hb 13.2".to_string()),
                ..MetadataUpdate::default()
            })
            .unwrap();
        wizard.remove_file(0).unwrap();
        assert_eq!(wizard.extracted_text(), "Hb 13.2");
    }

    #[test]
    fn initial_assessment_gets_no_placeholder() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        wizard.select_document_type(DocumentType::InitialAssessment).unwrap();
        wizard.add_file(file("intake.png")).unwrap();
        assert_eq!(wizard.extracted_text(), "");
        assert_eq!(wizard.step(), WizardStep::Metadata);
    }

    #[test]
    fn validation_collects_all_failures() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        assert_eq!(
            wizard.validate(),
            Err(WizardError::Invalid(vec!["Document type is required".to_string()]))
        );

        wizard.select_document_type(DocumentType::InitialAssessment).unwrap();
        let errors = wizard.validation_errors();
        assert_eq!(
            errors,
            vec![
                "Assign a doctor",
                "Patient name is required",
                "Age is required",
                "Gender is required",
                "Upload at least one file",
            ]
        );

        wizard.select_document_type(DocumentType::Prescription).unwrap();
        wizard
            .set_metadata(MetadataUpdate {
                doctor_id: Some("doc-1".to_string()),
                ..MetadataUpdate::default()
            })
            .unwrap();
        assert_eq!(
            wizard.validation_errors(),
            vec!["Upload at least one file", "Extracted text must not be empty"]
        );
    }

    #[test]
    fn submit_builds_seed_entry_and_guards_in_flight() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        wizard.select_document_type(DocumentType::InitialAssessment).unwrap();
        wizard.add_file(file("intake.png")).unwrap();
        wizard
            .set_metadata(MetadataUpdate {
                doctor_id: Some("doc-1".to_string()),
                patient_name: Some("  Jane Roe ".to_string()),
                age: Some(Some(42)),
                gender: Some("female".to_string()),
                ..MetadataUpdate::default()
            })
            .unwrap();

        let draft = wizard.begin_submit(today()).unwrap();
        assert_eq!(draft.patient_name.as_deref(), Some("Jane Roe"));
        assert_eq!(draft.files.len(), 1);
        assert_eq!(
            draft.seed_entry,
            SeedTimelineEntry {
                date: today(),
                description: "Initial assessment".to_string(),
                notes: INITIAL_ASSESSMENT_NOTE.to_string(),
            }
        );

        assert_eq!(wizard.begin_submit(today()).unwrap_err(), WizardError::SubmitInFlight);
        assert_eq!(wizard.remove_file(0).unwrap_err(), WizardError::SubmitInFlight);

        wizard.finish_submit(true);
        assert_eq!(wizard.step(), WizardStep::Submitted);
        assert_eq!(urls.counts(), (1, 1));
        assert_eq!(wizard.begin_submit(today()).unwrap_err(), WizardError::AlreadySubmitted);
    }

    #[test]
    fn failed_submit_keeps_the_wizard_editable() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        wizard.select_document_type(DocumentType::FollowUpNote).unwrap();
        wizard.add_file(file("note.png")).unwrap();
        wizard
            .set_metadata(MetadataUpdate {
                doctor_id: Some("doc-1".to_string()),
                ..MetadataUpdate::default()
            })
            .unwrap();

        let draft = wizard.begin_submit(today()).unwrap();
        assert_eq!(draft.seed_entry.description, "Follow-up note");
        assert_eq!(Some(draft.seed_entry.notes), draft.extracted_text);

        wizard.finish_submit(false);
        assert!(!wizard.is_in_flight());
        assert_eq!(wizard.files().len(), 1);
        assert!(wizard.begin_submit(today()).is_ok());
    }

    #[test]
    fn age_can_be_cleared_after_it_was_set() {
        let urls = CountingUrls::default();
        let mut wizard = wizard(&urls);
        wizard.select_document_type(DocumentType::InitialAssessment).unwrap();
        wizard
            .set_metadata(MetadataUpdate { age: Some(Some(61)), ..MetadataUpdate::default() })
            .unwrap();
        assert_eq!(wizard.metadata().age, Some(61));

        wizard.set_metadata(MetadataUpdate::default()).unwrap();
        assert_eq!(wizard.metadata().age, Some(61));

        wizard
            .set_metadata(MetadataUpdate { age: Some(None), ..MetadataUpdate::default() })
            .unwrap();
        assert_eq!(wizard.metadata().age, None);
        assert!(wizard.validation_errors().contains(&"Age is required".to_string()));
    }

    #[test]
    fn file_limit_and_bad_index_are_rejected() {
        let urls = CountingUrls::default();
        let mut wizard = UploadWizard::new(urls.clone(), 1);
        wizard.select_document_type(DocumentType::LabReport).unwrap();
        wizard.add_file(file("a.png")).unwrap();
        assert_eq!(
            wizard.add_file(file("b.png")).unwrap_err(),
            WizardError::TooManyFiles { max: 1 }
        );
        assert_eq!(
            wizard.remove_file(3).unwrap_err(),
            WizardError::InvalidFileIndex { index: 3, len: 1 }
        );
        assert_eq!(urls.counts(), (1, 0));
    }
}
