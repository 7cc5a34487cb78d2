use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::exam_generation::ExamGenerationService;
use crate::services::storage::StorageService;
use crate::services::upload_staging::UploadStaging;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    storage: Option<StorageService>,
    generator: Option<ExamGenerationService>,
    uploads: UploadStaging,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        storage: Option<StorageService>,
    ) -> Self {
        let generator = if settings.ai().is_configured() {
            match ExamGenerationService::from_settings(&settings) {
                Ok(service) => Some(service),
                Err(err) => {
                    tracing::error!(error = %err, "Failed to build exam generation client");
                    None
                }
            }
        } else {
            tracing::warn!("AI credentials not configured; exam generation disabled");
            None
        };

        let uploads = UploadStaging::new(settings.api().api_v1_str.clone());

        Self {
            inner: Arc::new(InnerState { settings, db, redis, storage, generator, uploads }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn generator(&self) -> Option<&ExamGenerationService> {
        self.inner.generator.as_ref()
    }

    pub(crate) fn uploads(&self) -> &UploadStaging {
        &self.inner.uploads
    }
}
