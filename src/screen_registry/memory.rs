//! In-memory screen registry

use super::types::*;
use super::ScreenBackend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryScreenRegistry {
    screens: RwLock<HashMap<String, Screen>>,
}

impl MemoryScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a screen (starts offline, never pinged)
    pub async fn insert_screen(&self, screen: Screen) {
        self.screens
            .write()
            .await
            .insert(screen.id.clone(), screen);
    }

    async fn update<F>(&self, screen_id: &str, f: F) -> Result<Screen>
    where
        F: FnOnce(&mut Screen) + Send,
    {
        let mut screens = self.screens.write().await;
        let screen = screens
            .get_mut(screen_id)
            .ok_or_else(|| Error::NotFound(format!("Screen {} not found", screen_id)))?;
        f(screen);
        Ok(screen.clone())
    }
}

#[async_trait]
impl ScreenBackend for MemoryScreenRegistry {
    async fn get_screen(&self, screen_id: &str) -> Result<Option<Screen>> {
        Ok(self.screens.read().await.get(screen_id).cloned())
    }

    async fn list_screens(&self) -> Result<Vec<Screen>> {
        let mut screens: Vec<Screen> = self.screens.read().await.values().cloned().collect();
        screens.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(screens)
    }

    async fn heartbeat(&self, screen_id: &str, now: DateTime<Utc>) -> Result<Screen> {
        self.update(screen_id, |s| {
            s.last_ping = Some(now);
            s.status = s.status.after_heartbeat();
        })
        .await
    }

    async fn set_status(&self, screen_id: &str, status: ScreenStatus) -> Result<Screen> {
        self.update(screen_id, |s| s.status = status).await
    }

    async fn toggle_pause(&self, screen_id: &str) -> Result<Screen> {
        self.update(screen_id, |s| s.status = s.status.toggled()).await
    }
}
