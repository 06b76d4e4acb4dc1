//! Control Panel types

use crate::error::{Error, Result};
use crate::queue_store::QueuedPhoto;
use crate::ratio_monitor::RatioReport;
use crate::screen_registry::ScreenStatus;
use crate::sla_monitor::SlaReport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is calling the panel (resolved by the external auth layer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            user_id: user_id.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Caller used by in-process tooling
    pub fn system() -> Self {
        Self::new("system", &["admin"])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelAction {
    ManageQueue,
    ManageScreens,
    ViewStats,
}

/// Role check delegated to the surrounding auth system
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, caller: &Caller, action: PanelAction) -> Result<()>;
}

/// No checks (single-operator deployments, tests)
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _caller: &Caller, _action: PanelAction) -> Result<()> {
        Ok(())
    }
}

/// Requires one of a fixed set of roles for every action
pub struct RoleAuthorizer {
    allowed: Vec<String>,
}

impl RoleAuthorizer {
    pub fn new(allowed: &[&str]) -> Self {
        Self {
            allowed: allowed.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl Default for RoleAuthorizer {
    fn default() -> Self {
        Self::new(&["admin", "moderator"])
    }
}

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn authorize(&self, caller: &Caller, action: PanelAction) -> Result<()> {
        if self.allowed.iter().any(|r| caller.has_role(r)) {
            return Ok(());
        }
        Err(Error::Unauthorized(format!(
            "{} may not {:?}",
            caller.user_id, action
        )))
    }
}

/// Per-screen queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenQueueStats {
    pub screen_id: String,
    pub name: String,
    pub status: ScreenStatus,
    pub effective_status: ScreenStatus,
    pub last_ping: Option<DateTime<Utc>>,
    pub queue_length: usize,
    pub ratio: RatioReport,
    /// Entry at position 0
    pub current: Option<QueuedPhoto>,
}

/// Fleet-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalScreenStats {
    pub total_screens: usize,
    pub online: usize,
    pub paused: usize,
    pub offline: usize,
    /// Entries across all screen queues and the global pool
    pub total_queued: usize,
    pub global_pool_size: usize,
    pub sla: SlaReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_role_authorizer() {
        let auth = RoleAuthorizer::default();
        assert!(auth
            .authorize(&Caller::new("mod", &["moderator"]), PanelAction::ManageQueue)
            .await
            .is_ok());
        let err = auth
            .authorize(&Caller::new("guest", &["viewer"]), PanelAction::ViewStats)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
