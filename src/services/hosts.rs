//! Host directory service

use chrono::{DateTime, Utc};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::host::{Host, HostForm},
    repository::VisitStore,
};

#[derive(Clone)]
pub struct HostsService {
    store: Arc<dyn VisitStore>,
}

impl HostsService {
    pub fn new(store: Arc<dyn VisitStore>) -> Self {
        Self { store }
    }

    /// Hosts offered by the kiosk picker
    pub async fn list_active(&self) -> AppResult<Vec<Host>> {
        self.store.list_active_hosts().await
    }

    /// Create or update a host keyed by its lowercased email
    pub async fn upsert(&self, form: HostForm, now: DateTime<Utc>) -> AppResult<Host> {
        let form = HostForm {
            email: form.email.trim().to_lowercase(),
            name: form.name.trim().to_string(),
            department: form
                .department
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            is_active: form.is_active,
        };
        form.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let host = self.store.upsert_host(&form, now).await?;
        tracing::info!(target: "audit", event = "host_upsert", host_id = host.id, email = %host.email, active = host.is_active);
        Ok(host)
    }
}
