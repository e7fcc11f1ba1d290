//! Business logic services

pub mod admin;
pub mod dispatcher;
pub mod email;
pub mod hosts;
pub mod lifecycle;
pub mod policy;
pub mod redis;
pub mod scheduler;
pub mod sweep;
pub mod tokens;

use std::sync::Arc;

use crate::{config::AppConfig, error::AppResult, repository::VisitStore};

use self::{
    dispatcher::{Links, LogDispatcher, NotificationDispatcher},
    policy::LifecyclePolicy,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub lifecycle: lifecycle::LifecycleService,
    pub sweep: sweep::SweepService,
    pub admin: admin::AdminService,
    pub hosts: hosts::HostsService,
}

impl Services {
    /// Create all services over the given store and delivery channel
    pub fn new(
        store: Arc<dyn VisitStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: &AppConfig,
        redis: Option<redis::RedisService>,
    ) -> AppResult<Self> {
        let policy = LifecyclePolicy::from_config(&config.lifecycle)?;
        let lifecycle = lifecycle::LifecycleService::new(
            store.clone(),
            dispatcher,
            policy,
            Links::new(&config.server.public_url),
        );

        Ok(Self {
            sweep: sweep::SweepService::new(lifecycle.clone()),
            admin: admin::AdminService::new(lifecycle.clone(), config.admin.clone(), redis),
            lifecycle,
            hosts: hosts::HostsService::new(store),
        })
    }

    /// Dispatcher matching the email configuration
    pub fn dispatcher_for(config: &AppConfig) -> Arc<dyn NotificationDispatcher> {
        if config.email.enabled {
            Arc::new(email::EmailService::new(config.email.clone()))
        } else {
            Arc::new(LogDispatcher)
        }
    }
}
