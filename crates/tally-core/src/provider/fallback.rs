//! Primary→backup fallback cascade for provider calls
//!
//! Pure decision logic per call, no persisted state: invoke the primary
//! provider/model; on a transient failure retry once against the
//! configured backup; on a permanent failure (or with no backup)
//! propagate immediately. There is never more than one backup attempt.

use std::sync::Arc;

use tracing::{info, warn};

use crate::reporter::ErrorReporter;

use super::types::{ChatRequest, ChatResponse, ProviderError};
use super::{ChatClient, ChatProvider};

/// A provider paired with the model name to request from it
#[derive(Clone)]
pub struct ModelTarget {
    pub client: ChatClient,
    pub model: String,
}

impl ModelTarget {
    pub fn new(client: ChatClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

/// Primary→backup retry policy for chat-completion calls
#[derive(Clone)]
pub struct FallbackCascade {
    primary: ModelTarget,
    backup: Option<ModelTarget>,
    reporter: Arc<dyn ErrorReporter>,
}

impl FallbackCascade {
    /// Create a cascade with no backup configured
    pub fn new(primary: ModelTarget, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            primary,
            backup: None,
            reporter,
        }
    }

    /// Configure the backup provider/model
    pub fn with_backup(mut self, backup: ModelTarget) -> Self {
        self.backup = Some(backup);
        self
    }

    /// The model name the primary target requests
    pub fn primary_model(&self) -> &str {
        &self.primary.model
    }

    /// Issue the call, applying the fallback policy
    ///
    /// The request's `model` field is overwritten per target, so callers
    /// build requests without caring which tier answers.
    pub async fn call(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut primary_request = request.clone();
        primary_request.model = self.primary.model.clone();

        let primary_error = match self.primary.client.call(&primary_request).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        self.reporter.report(
            self.primary.client.name(),
            &primary_error.to_string(),
            &format!("primary model {}", self.primary.model),
        );

        if !primary_error.is_transient() {
            return Err(primary_error);
        }

        let Some(backup) = &self.backup else {
            warn!(
                model = %self.primary.model,
                "Transient provider failure with no backup configured"
            );
            return Err(primary_error);
        };

        info!(
            primary = %self.primary.model,
            backup = %backup.model,
            "Falling back to backup provider"
        );

        let mut backup_request = request.clone();
        backup_request.model = backup.model.clone();

        match backup.client.call(&backup_request).await {
            Ok(response) => Ok(response),
            Err(backup_error) => {
                self.reporter.report(
                    backup.client.name(),
                    &backup_error.to_string(),
                    &format!("backup model {}", backup.model),
                );
                Err(backup_error)
            }
        }
    }
}
