use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::snapshot::{read_snapshot, write_snapshot};
use super::types::{MailStats, Message, MessageNotification, MessagePage, MessageQuery};
use crate::error::Result;
use crate::registry::DomainRegistry;

/// Capacity of the new-message notification channel
const NOTIFY_CAPACITY: usize = 64;

/// Upper bound on a query page
pub const MAX_PAGE_SIZE: usize = 100;

/// Insertion-ordered message store mirrored to a JSON snapshot.
///
/// Mutations (`ingest`, `delete`, `mark_read`, `sweep_expired`) hold the
/// write lock while the snapshot is rewritten, so memory and disk agree
/// once a call returns. Reads share the lock and see a consistent view.
/// Persistence failures are logged; the in-memory change is kept.
pub struct MailStore {
    messages: RwLock<Vec<Message>>,
    path: Option<PathBuf>,
    registry: Arc<DomainRegistry>,
    notifier: broadcast::Sender<MessageNotification>,
}

impl MailStore {
    /// Store without a snapshot file
    pub fn in_memory(registry: Arc<DomainRegistry>) -> Self {
        Self::with_messages(Vec::new(), None, registry)
    }

    /// Load the snapshot at `path` (empty store if it does not exist yet)
    pub async fn open(path: impl AsRef<Path>, registry: Arc<DomainRegistry>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let messages = read_snapshot::<Vec<Message>>(&path).await?.unwrap_or_default();
        info!("Loaded {} message(s) from {}", messages.len(), path.display());
        Ok(Self::with_messages(messages, Some(path), registry))
    }

    fn with_messages(
        messages: Vec<Message>,
        path: Option<PathBuf>,
        registry: Arc<DomainRegistry>,
    ) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);
        MailStore {
            messages: RwLock::new(messages),
            path,
            registry,
            notifier,
        }
    }

    async fn persist(&self, messages: &[Message]) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_snapshot(path, messages).await {
            error!("Failed to persist messages: {}", e);
        }
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    /// Receive a notification for every message ingested from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MessageNotification> {
        self.notifier.subscribe()
    }

    /// Append a message, persist, and count it against its domain
    pub async fn ingest(&self, message: Message) -> Message {
        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        self.persist(&messages).await;

        if let Err(e) = self.registry.record_accepted(&message.domain, 1).await {
            warn!("Counter not updated for message {}: {}", message.id, e);
        }
        drop(messages);

        info!(
            "Stored message {} ({} -> {})",
            message.id,
            message.from,
            message.to.join(", ")
        );

        // No subscribers is fine
        let _ = self.notifier.send(MessageNotification::from(&message));

        message
    }

    pub async fn get(&self, id: &str) -> Option<Message> {
        let messages = self.messages.read().await;
        messages.iter().find(|m| m.id == id).cloned()
    }

    /// Filtered, newest-first page. `page` is 1-based; `page_size` is
    /// clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn query(&self, filter: &MessageQuery, page: usize, page_size: usize) -> MessagePage {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let recipient = filter.recipient.as_ref().map(|r| r.to_lowercase());
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());

        let messages = self.messages.read().await;
        let mut matched: Vec<&Message> = messages
            .iter()
            .rev()
            .filter(|m| filter.domain.as_ref().map_or(true, |d| &m.domain == d))
            .filter(|m| {
                recipient.as_ref().map_or(true, |r| {
                    m.to.iter().any(|to| to.to_lowercase().contains(r.as_str()))
                })
            })
            .filter(|m| needle.as_ref().map_or(true, |n| m.matches_text(n)))
            .collect();
        // Stable: equal timestamps keep most-recently-inserted first
        matched.sort_by(|a, b| b.received_at.cmp(&a.received_at));

        let total = matched.len();
        let emails = matched
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();

        MessagePage {
            emails,
            total,
            page,
            total_pages: total.div_ceil(page_size),
        }
    }

    /// Remove a message; `false` if the id is unknown
    pub async fn delete(&self, id: &str) -> bool {
        let mut messages = self.messages.write().await;
        let Some(index) = messages.iter().position(|m| m.id == id) else {
            debug!("Delete of unknown message {}", id);
            return false;
        };

        let message = messages.remove(index);
        self.persist(&messages).await;

        if let Err(e) = self.registry.record_accepted(&message.domain, -1).await {
            warn!("Counter not updated for deleted message {}: {}", id, e);
        }
        info!("Deleted message {}", id);
        true
    }

    /// Flag a message as read; `false` if the id is unknown
    pub async fn mark_read(&self, id: &str) -> bool {
        let mut messages = self.messages.write().await;
        let Some(message) = messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        message.read = true;
        self.persist(&messages).await;
        true
    }

    /// Remove every message received more than `retention` ago.
    /// Persists once for the batch and returns the number removed.
    pub async fn sweep_expired(&self, retention: Duration) -> usize {
        let Ok(window) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(window) else {
            return 0;
        };

        let mut messages = self.messages.write().await;
        let mut removed_by_domain: HashMap<String, i64> = HashMap::new();
        messages.retain(|m| {
            if m.received_at < cutoff {
                *removed_by_domain.entry(m.domain.clone()).or_default() += 1;
                false
            } else {
                true
            }
        });

        let removed: i64 = removed_by_domain.values().sum();
        if removed == 0 {
            return 0;
        }

        self.persist(&messages).await;
        for (domain, count) in &removed_by_domain {
            if let Err(e) = self.registry.record_accepted(domain, -count).await {
                warn!("Counter not updated after sweep: {}", e);
            }
        }

        info!("Removed {} expired message(s)", removed);
        removed as usize
    }

    /// Run `sweep_expired` every `interval` until `shutdown` is cancelled.
    ///
    /// Sweeps run inside one task and are awaited in turn, so a slow sweep
    /// delays the next tick instead of overlapping with it.
    pub fn start_retention_task(
        self: Arc<Self>,
        interval: Duration,
        retention: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Retention sweep every {}s, keeping messages for {}s",
                interval.as_secs(),
                retention.as_secs()
            );

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Retention task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep_expired(retention).await;
                    }
                }
            }
        })
    }

    pub async fn stats(&self) -> MailStats {
        let messages = self.messages.read().await;
        let mut by_domain = BTreeMap::new();
        for message in messages.iter() {
            *by_domain.entry(message.domain.clone()).or_insert(0) += 1;
        }

        MailStats {
            total: messages.len(),
            unread: messages.iter().filter(|m| !m.read).count(),
            by_domain,
        }
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Messages (optionally of one domain) as pretty JSON, newest first
    pub async fn export(&self, domain: Option<&str>) -> Result<String> {
        let messages = self.messages.read().await;
        let mut selected: Vec<&Message> = messages
            .iter()
            .rev()
            .filter(|m| domain.map_or(true, |d| m.domain == d))
            .collect();
        selected.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        Ok(serde_json::to_string_pretty(&selected)?)
    }
}
