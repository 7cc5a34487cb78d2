use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::services::upload_wizard::{PreviewUrls, StagedFile, UploadWizard};

pub(crate) type StagedWizard = UploadWizard<ScopedPreviews>;

#[derive(Debug, Clone)]
pub(crate) struct PreviewFile {
    pub(crate) filename: String,
    pub(crate) content_type: String,
    pub(crate) bytes: Arc<[u8]>,
}

struct PreviewEntry {
    owner: String,
    file: PreviewFile,
}

/// In-memory store of staged file bytes addressed by opaque tokens.
#[derive(Default)]
pub(crate) struct PreviewRegistry {
    entries: Mutex<HashMap<String, PreviewEntry>>,
}

impl PreviewRegistry {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, PreviewEntry>> {
        // Entries stay consistent even if a holder panicked mid-insert.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, owner: &str, file: &StagedFile) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let entry = PreviewEntry {
            owner: owner.to_string(),
            file: PreviewFile {
                filename: file.filename.clone(),
                content_type: file.content_type.clone(),
                bytes: file.bytes.clone(),
            },
        };
        self.entries().insert(token.clone(), entry);
        token
    }

    pub(crate) fn remove(&self, token: &str) -> bool {
        self.entries().remove(token).is_some()
    }

    /// Bytes for `token`, visible to its owner only.
    pub(crate) fn get(&self, token: &str, owner: &str) -> Option<PreviewFile> {
        self.entries()
            .get(token)
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.file.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}

/// [`PreviewUrls`] backed by the shared registry, scoped to one user.
pub(crate) struct ScopedPreviews {
    registry: Arc<PreviewRegistry>,
    owner: String,
    base_path: String,
}

impl PreviewUrls for ScopedPreviews {
    fn create(&mut self, file: &StagedFile) -> String {
        let token = self.registry.insert(&self.owner, file);
        format!("{}/{token}", self.base_path)
    }

    fn revoke(&mut self, url: &str) {
        let token = url.rsplit('/').next().unwrap_or(url);
        if !self.registry.remove(token) {
            tracing::warn!(owner = %self.owner, token = %token, "Preview already revoked");
        }
    }
}

/// Per-user upload wizards plus the preview registry they publish into.
#[derive(Clone)]
pub(crate) struct UploadStaging {
    previews: Arc<PreviewRegistry>,
    wizards: Arc<AsyncMutex<HashMap<String, StagedWizard>>>,
    base_path: String,
}

impl UploadStaging {
    pub(crate) fn new(api_prefix: String) -> Self {
        Self {
            previews: Arc::new(PreviewRegistry::default()),
            wizards: Arc::new(AsyncMutex::new(HashMap::new())),
            base_path: format!("{}/uploads/previews", api_prefix.trim_end_matches('/')),
        }
    }

    pub(crate) fn new_wizard(&self, owner: &str, max_files: usize) -> StagedWizard {
        UploadWizard::new(
            ScopedPreviews {
                registry: self.previews.clone(),
                owner: owner.to_string(),
                base_path: self.base_path.clone(),
            },
            max_files,
        )
    }

    pub(crate) async fn wizards(
        &self,
    ) -> tokio::sync::MutexGuard<'_, HashMap<String, StagedWizard>> {
        self.wizards.lock().await
    }

    pub(crate) fn preview(&self, token: &str, owner: &str) -> Option<PreviewFile> {
        self.previews.get(token, owner)
    }

    pub(crate) fn outstanding_previews(&self) -> usize {
        self.previews.len()
    }

    /// Runs the storage half of `owner`'s submission on its own task. The
    /// wizard's in-flight flag is settled when `work` ends, even if it panics
    /// or the request that started it has gone away.
    pub(crate) fn spawn_submit<T, E, F>(
        &self,
        owner: String,
        work: F,
    ) -> JoinHandle<Result<Result<T, E>, JoinError>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let staging = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(work).await;
            let succeeded = matches!(outcome, Ok(Ok(_)));
            staging.finish_submit(&owner, succeeded).await;
            outcome
        })
    }

    /// Clears the in-flight flag; a successful submit also drops the wizard.
    pub(crate) async fn finish_submit(&self, owner: &str, succeeded: bool) {
        let mut wizards = self.wizards.lock().await;
        if let Some(wizard) = wizards.get_mut(owner) {
            wizard.finish_submit(succeeded);
            if succeeded {
                wizards.remove(owner);
            }
        }
    }

    /// Drops every wizard and returns how many there were.
    pub(crate) async fn discard_all(&self) -> usize {
        let mut wizards = self.wizards.lock().await;
        let count = wizards.len();
        wizards.clear();
        count
    }
}
