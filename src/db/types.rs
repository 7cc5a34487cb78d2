use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Professor,
    Doctor,
    Student,
}

impl UserRole {
    /// Authors generate, save and export exams and manage the book catalogue.
    pub(crate) fn is_author(self) -> bool {
        matches!(self, Self::Admin | Self::Professor)
    }

    /// Reviewers annotate patient timelines.
    pub(crate) fn is_reviewer(self) -> bool {
        matches!(self, Self::Admin | Self::Doctor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "sessionstatus", rename_all = "snake_case")]
pub(crate) enum SessionStatus {
    Idle,
    InProgress,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "documenttype", rename_all = "snake_case")]
pub(crate) enum DocumentType {
    InitialAssessment,
    LabReport,
    ImagingReport,
    DischargeSummary,
    Prescription,
    FollowUpNote,
}

impl DocumentType {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::InitialAssessment => "Initial assessment",
            Self::LabReport => "Lab report",
            Self::ImagingReport => "Imaging report",
            Self::DischargeSummary => "Discharge summary",
            Self::Prescription => "Prescription",
            Self::FollowUpNote => "Follow-up note",
        }
    }

    pub(crate) fn is_initial_assessment(self) -> bool {
        matches!(self, Self::InitialAssessment)
    }
}
