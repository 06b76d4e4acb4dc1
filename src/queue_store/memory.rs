//! In-memory Queue Store backend
//!
//! Single-process stand-in for the MySQL repository. One write lock is held
//! per operation, which gives the same atomicity the repository gets from a
//! transaction. Also carries the photo records and moderation samples the
//! SLA Monitor reads, so a whole deployment can run without a database.

use super::backend::QueueBackend;
use super::ordering::{self, PositionShift};
use super::types::*;
use crate::error::{Error, Result};
use crate::sla_monitor::{ModerationSample, ModerationSource, PendingPhoto};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Approved photo record with a predictable file URL
pub fn approved_photo(id: &str, source: PhotoSource, approved_at: DateTime<Utc>) -> Photo {
    Photo {
        id: id.to_string(),
        source,
        status: PhotoStatus::Approved,
        file_url: format!("https://cdn.example.test/photos/{}.jpg", id),
        thumbnail_url: Some(format!("https://cdn.example.test/thumbs/{}.jpg", id)),
        displayed_count: 0,
        created_at: approved_at - Duration::seconds(60),
        approved_at: Some(approved_at),
    }
}

/// Photo still waiting for moderation
pub fn pending_photo(id: &str, source: PhotoSource, created_at: DateTime<Utc>) -> Photo {
    Photo {
        id: id.to_string(),
        source,
        status: PhotoStatus::Pending,
        file_url: format!("https://cdn.example.test/photos/{}.jpg", id),
        thumbnail_url: None,
        displayed_count: 0,
        created_at,
        approved_at: None,
    }
}

#[derive(Default)]
struct MemoryState {
    photos: HashMap<String, Photo>,
    entries: Vec<QueueEntry>,
    history: Vec<QueueEntry>,
    moderation: Vec<ModerationSample>,
}

impl MemoryState {
    fn in_scope<'a>(&'a self, scope: &'a QueueScope) -> impl Iterator<Item = &'a QueueEntry> + 'a {
        self.entries.iter().filter(move |e| e.scope() == *scope)
    }

    fn scope_len(&self, scope: &QueueScope) -> usize {
        self.in_scope(scope).count()
    }

    fn shift(&mut self, scope: &QueueScope, shift: PositionShift) {
        for entry in self.entries.iter_mut().filter(|e| e.scope() == *scope) {
            entry.position = shift.apply(entry.position);
        }
    }

    fn find(&self, scope: &QueueScope, entry_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.id == entry_id && e.scope() == *scope)
    }

    /// Remove by index and close the gap
    fn remove_at(&mut self, index: usize) -> QueueEntry {
        let scope = self.entries[index].scope();
        let len = self.scope_len(&scope);
        let removed = self.entries.remove(index);
        if let Some(shift) = ordering::plan_remove(len, removed.position).shift {
            self.shift(&scope, shift);
        }
        debug_assert!(ordering::is_contiguous(
            self.in_scope(&scope).map(|e| e.position)
        ));
        removed
    }

    fn join(&self, entry: &QueueEntry) -> Option<QueuedPhoto> {
        match self.photos.get(&entry.photo_id) {
            Some(photo) => Some(QueuedPhoto {
                entry: entry.clone(),
                photo: photo.clone(),
            }),
            None => {
                tracing::warn!(
                    entry_id = %entry.id,
                    photo_id = %entry.photo_id,
                    "Queue entry references unknown photo"
                );
                None
            }
        }
    }

    fn sorted_scope(&self, scope: &QueueScope) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self.in_scope(scope).cloned().collect();
        entries.sort_by_key(|e| e.position);
        entries
    }
}

/// In-memory backend
#[derive(Default)]
pub struct MemoryQueueBackend {
    state: RwLock<MemoryState>,
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a photo record
    pub async fn insert_photo(&self, photo: Photo) {
        self.state
            .write()
            .await
            .photos
            .insert(photo.id.clone(), photo);
    }

    /// Record a moderation decision for average-latency reporting
    pub async fn record_moderation(&self, photo_id: &str, moderated_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let created_at = state
            .photos
            .get(photo_id)
            .map(|p| p.created_at)
            .ok_or_else(|| Error::NotFound(format!("Photo {} not found", photo_id)))?;
        state.moderation.push(ModerationSample {
            photo_id: photo_id.to_string(),
            photo_created_at: created_at,
            moderated_at,
        });
        Ok(())
    }

    /// Entries consumed so far, oldest first
    pub async fn display_history(&self) -> Vec<QueueEntry> {
        self.state.read().await.history.clone()
    }

    /// Raw entries of a scope ordered by position (no photo join)
    pub async fn entries(&self, scope: &QueueScope) -> Vec<QueueEntry> {
        self.state.read().await.sorted_scope(scope)
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn add(
        &self,
        scope: &QueueScope,
        photo_id: &str,
        position: Option<i32>,
    ) -> Result<QueueEntry> {
        let mut state = self.state.write().await;

        let photo = state
            .photos
            .get(photo_id)
            .ok_or_else(|| Error::NotFound(format!("Photo {} not found", photo_id)))?;
        if !photo.is_queueable() {
            return Err(Error::Validation(format!(
                "Photo {} is not approved",
                photo_id
            )));
        }
        if state.in_scope(scope).any(|e| e.photo_id == photo_id) {
            return Err(Error::AlreadyQueued {
                photo_id: photo_id.to_string(),
                scope: scope.to_string(),
            });
        }

        let plan = ordering::plan_insert(state.scope_len(scope), position)?;
        if let Some(shift) = plan.shift {
            state.shift(scope, shift);
        }

        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            screen_id: scope.screen_id().map(String::from),
            photo_id: photo_id.to_string(),
            position: plan.position,
            displayed_at: None,
            created_at: Utc::now(),
            claimed_by: None,
            claim_expires_at: None,
        };
        state.entries.push(entry.clone());

        debug_assert!(ordering::is_contiguous(
            state.in_scope(scope).map(|e| e.position)
        ));
        Ok(entry)
    }

    async fn remove(&self, scope: &QueueScope, entry_id: &str) -> Result<QueueEntry> {
        let mut state = self.state.write().await;
        let index = state
            .find(scope, entry_id)
            .ok_or_else(|| Error::NotFound(format!("Entry {} not in {}", entry_id, scope)))?;
        Ok(state.remove_at(index))
    }

    async fn reorder(
        &self,
        scope: &QueueScope,
        entry_id: &str,
        new_position: i32,
    ) -> Result<Reordered> {
        let mut state = self.state.write().await;
        let index = state
            .find(scope, entry_id)
            .ok_or_else(|| Error::NotFound(format!("Entry {} not in {}", entry_id, scope)))?;

        let from = state.entries[index].position;
        let plan = match ordering::plan_reorder(state.scope_len(scope), from, new_position)? {
            Some(plan) => plan,
            None => {
                return Ok(Reordered {
                    entry: state.entries[index].clone(),
                    previous_position: from,
                })
            }
        };

        for (i, entry) in state.entries.iter_mut().enumerate() {
            if i != index && entry.scope() == *scope {
                entry.position = plan.shift.apply(entry.position);
            }
        }
        state.entries[index].position = plan.to;

        debug_assert!(ordering::is_contiguous(
            state.in_scope(scope).map(|e| e.position)
        ));
        Ok(Reordered {
            entry: state.entries[index].clone(),
            previous_position: from,
        })
    }

    async fn skip_current(&self, scope: &QueueScope) -> Result<QueueEntry> {
        let mut state = self.state.write().await;
        let index = state
            .entries
            .iter()
            .position(|e| e.position == 0 && e.scope() == *scope)
            .ok_or_else(|| Error::EmptyQueue(format!("Nothing to skip in {}", scope)))?;
        Ok(state.remove_at(index))
    }

    async fn list(&self, scope: &QueueScope, limit: usize) -> Result<Vec<QueuedPhoto>> {
        let state = self.state.read().await;
        Ok(state
            .sorted_scope(scope)
            .iter()
            .take(limit)
            .filter_map(|e| state.join(e))
            .collect())
    }

    async fn count(&self, scope: &QueueScope) -> Result<usize> {
        Ok(self.state.read().await.scope_len(scope))
    }

    async fn claim_global(
        &self,
        screen_id: &str,
        limit: usize,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedPhoto>> {
        let mut state = self.state.write().await;

        let mut claimable: Vec<usize> = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.screen_id.is_none() && !e.is_claimed_by_other(screen_id, now))
            .map(|(i, _)| i)
            .collect();
        claimable.sort_by_key(|i| state.entries[*i].position);
        claimable.truncate(limit);

        let mut claimed = Vec::with_capacity(claimable.len());
        for index in claimable {
            let entry = &mut state.entries[index];
            entry.claimed_by = Some(screen_id.to_string());
            entry.claim_expires_at = Some(now + ttl);
            let entry = entry.clone();
            if let Some(joined) = state.join(&entry) {
                claimed.push(joined);
            }
        }

        Ok(claimed)
    }

    async fn consume(&self, entry_id: &str, now: DateTime<Utc>) -> Result<QueueEntry> {
        let mut state = self.state.write().await;
        let index = state
            .entries
            .iter()
            .position(|e| e.id == entry_id && e.displayed_at.is_none())
            .ok_or_else(|| Error::NotFound(format!("Entry {} not found", entry_id)))?;

        state.entries[index].displayed_at = Some(now);
        let consumed = state.remove_at(index);
        state.history.push(consumed.clone());
        Ok(consumed)
    }

    async fn available_photos(&self, scope: &QueueScope, limit: usize) -> Result<Vec<Photo>> {
        let state = self.state.read().await;
        let mut photos: Vec<Photo> = state
            .photos
            .values()
            .filter(|p| p.is_queueable())
            .filter(|p| !state.in_scope(scope).any(|e| e.photo_id == p.id))
            .cloned()
            .collect();
        // newest approval first, never-approved last
        photos.sort_by(|a, b| b.approved_at.cmp(&a.approved_at));
        photos.truncate(limit);
        Ok(photos)
    }

    async fn increment_displayed_count(&self, photo_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let photo = state
            .photos
            .get_mut(photo_id)
            .ok_or_else(|| Error::NotFound(format!("Photo {} not found", photo_id)))?;
        photo.displayed_count += 1;
        Ok(())
    }

    async fn get_photo(&self, photo_id: &str) -> Result<Option<Photo>> {
        Ok(self.state.read().await.photos.get(photo_id).cloned())
    }
}

#[async_trait]
impl ModerationSource for MemoryQueueBackend {
    async fn pending_photos(&self) -> Result<Vec<PendingPhoto>> {
        let state = self.state.read().await;
        Ok(state
            .photos
            .values()
            .filter(|p| p.status == PhotoStatus::Pending)
            .map(|p| PendingPhoto {
                photo_id: p.id.clone(),
                created_at: p.created_at,
            })
            .collect())
    }

    async fn recent_moderation(&self, limit: usize) -> Result<Vec<ModerationSample>> {
        let state = self.state.read().await;
        let mut samples = state.moderation.clone();
        samples.sort_by(|a, b| b.moderated_at.cmp(&a.moderated_at));
        samples.truncate(limit);
        Ok(samples)
    }
}
