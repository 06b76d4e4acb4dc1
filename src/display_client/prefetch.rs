//! Image prefetch
//!
//! Loads upcoming image bytes ahead of display so advancing never waits on
//! the network. Failures are logged and otherwise ignored.

use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// Default number of images kept
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

#[async_trait]
pub trait ImagePrefetch: Send + Sync {
    /// Begin loading `urls`; returns once all attempts finished
    async fn prefetch(&self, urls: Vec<String>);

    async fn is_cached(&self, url: &str) -> bool;
}

/// URL-keyed cache evicting the oldest insert
struct ImageCache {
    capacity: usize,
    order: VecDeque<String>,
    images: HashMap<String, Vec<u8>>,
}

impl ImageCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            images: HashMap::new(),
        }
    }

    fn insert(&mut self, url: String, bytes: Vec<u8>) {
        if self.images.insert(url.clone(), bytes).is_none() {
            self.order.push_back(url);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.images.remove(&evicted);
            }
        }
    }
}

/// reqwest-backed prefetcher
pub struct HttpImagePrefetcher {
    client: Client,
    cache: RwLock<ImageCache>,
}

impl HttpImagePrefetcher {
    pub fn new(capacity: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            cache: RwLock::new(ImageCache::new(capacity)),
        })
    }

    /// Cached bytes for `url`
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.cache.read().await.images.get(url).cloned()
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ImagePrefetch for HttpImagePrefetcher {
    async fn prefetch(&self, urls: Vec<String>) {
        for url in urls {
            if self.is_cached(&url).await {
                continue;
            }
            match self.download(&url).await {
                Ok(bytes) => {
                    tracing::debug!(url = %url, size = bytes.len(), "Image prefetched");
                    self.cache.write().await.insert(url, bytes);
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Image prefetch failed");
                }
            }
        }
    }

    async fn is_cached(&self, url: &str) -> bool {
        self.cache.read().await.images.contains_key(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_evicts_oldest() {
        let mut cache = ImageCache::new(2);
        cache.insert("a".into(), vec![1]);
        cache.insert("b".into(), vec![2]);
        cache.insert("a".into(), vec![3]);
        cache.insert("c".into(), vec![4]);

        assert!(!cache.images.contains_key("a"));
        assert_eq!(cache.images.get("b"), Some(&vec![2]));
        assert_eq!(cache.images.get("c"), Some(&vec![4]));
        assert_eq!(cache.order.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_url_is_ignored() {
        let prefetcher = HttpImagePrefetcher::new(4).unwrap();
        prefetcher
            .prefetch(vec!["http://127.0.0.1:9/missing.jpg".to_string()])
            .await;
        assert!(!prefetcher.is_cached("http://127.0.0.1:9/missing.jpg").await);
    }
}
