use serde::{Deserialize, Deserializer, Serialize};

use crate::db::types::DocumentType;
use crate::services::upload_wizard::{
    MetadataUpdate, PreviewUrls, RecordMetadata, UploadWizard, WizardStep,
};

#[derive(Debug, Deserialize)]
pub(crate) struct WizardStart {
    #[serde(alias = "documentType")]
    pub(crate) document_type: DocumentType,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WizardPatch {
    #[serde(default, alias = "doctorId")]
    pub(crate) doctor_id: Option<String>,
    #[serde(default, alias = "patientName")]
    pub(crate) patient_name: Option<String>,
    /// Absent leaves the age alone; `null` clears it.
    #[serde(default, deserialize_with = "present_or_null")]
    pub(crate) age: Option<Option<i32>>,
    #[serde(default)]
    pub(crate) gender: Option<String>,
    #[serde(default)]
    pub(crate) contact: Option<String>,
    #[serde(default)]
    pub(crate) notes: Option<String>,
    #[serde(default, alias = "extractedText")]
    pub(crate) extracted_text: Option<String>,
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl From<WizardPatch> for MetadataUpdate {
    fn from(patch: WizardPatch) -> Self {
        Self {
            doctor_id: patch.doctor_id,
            patient_name: patch.patient_name,
            age: patch.age,
            gender: patch.gender,
            contact: patch.contact,
            notes: patch.notes,
            extracted_text: patch.extracted_text,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WizardFileView {
    pub(crate) index: usize,
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) size: usize,
    pub(crate) preview_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct WizardView {
    pub(crate) step: WizardStep,
    pub(crate) document_type: Option<DocumentType>,
    pub(crate) files: Vec<WizardFileView>,
    pub(crate) metadata: RecordMetadata,
    pub(crate) extracted_text: String,
    pub(crate) submitting: bool,
    pub(crate) errors: Vec<String>,
}

impl WizardView {
    pub(crate) fn from_wizard<P: PreviewUrls>(wizard: &UploadWizard<P>) -> Self {
        let files = wizard
            .files()
            .iter()
            .enumerate()
            .map(|(index, entry)| WizardFileView {
                index,
                filename: entry.file.filename.clone(),
                content_type: entry.file.content_type.clone(),
                size: entry.file.size(),
                preview_url: entry.preview_url.clone(),
            })
            .collect();

        Self {
            step: wizard.step(),
            document_type: wizard.document_type(),
            files,
            metadata: wizard.metadata().clone(),
            extracted_text: wizard.extracted_text().to_string(),
            submitting: wizard.is_in_flight(),
            errors: wizard.validation_errors(),
        }
    }
}
