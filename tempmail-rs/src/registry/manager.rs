use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::types::{Domain, DomainStats, RegistrySnapshot};
use crate::config::DomainSeed;
use crate::error::{MailError, Result};
use crate::storage::snapshot::{read_snapshot, write_snapshot};
use crate::utils::generate_local_part;

struct RegistryState {
    domains: Vec<Domain>,
    /// Round-robin cursor over the enabled domains
    cursor: usize,
}

/// Domain registry and round-robin balancer.
///
/// All reads and mutations go through one mutex; every mutation rewrites
/// the snapshot file (when the registry is backed by one) before the lock
/// is released, so concurrent callers observe and persist a single order.
pub struct DomainRegistry {
    state: Mutex<RegistryState>,
    path: Option<PathBuf>,
}

impl DomainRegistry {
    /// Registry without a snapshot file
    pub fn in_memory(domains: Vec<Domain>) -> Self {
        DomainRegistry {
            state: Mutex::new(RegistryState { domains, cursor: 0 }),
            path: None,
        }
    }

    /// Load the snapshot at `path`, merging in seeds whose names are not
    /// registered yet. A missing file is created from the seeds.
    pub async fn open(path: impl AsRef<Path>, seeds: &[DomainSeed]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut domains = match read_snapshot::<RegistrySnapshot>(&path).await? {
            Some(snapshot) => snapshot.domains,
            None => Vec::new(),
        };

        for seed in seeds {
            if !domains.iter().any(|d| d.name == seed.name) {
                debug!("Registering seed domain {}", seed.name);
                domains.push(Domain::from(seed));
            }
        }

        info!("Loaded {} domain(s) from {}", domains.len(), path.display());

        let registry = DomainRegistry {
            state: Mutex::new(RegistryState { domains, cursor: 0 }),
            path: Some(path),
        };
        {
            let state = registry.state.lock().await;
            registry.persist(&state.domains).await;
        }
        Ok(registry)
    }

    async fn persist(&self, domains: &[Domain]) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot = RegistrySnapshot {
            domains: domains.to_vec(),
        };
        if let Err(e) = write_snapshot(path, &snapshot).await {
            error!("Failed to persist domain registry: {}", e);
        }
    }

    pub async fn list_all(&self) -> Vec<Domain> {
        self.state.lock().await.domains.clone()
    }

    pub async fn list_enabled(&self) -> Vec<Domain> {
        let state = self.state.lock().await;
        state.domains.iter().filter(|d| d.enabled).cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<Domain> {
        let state = self.state.lock().await;
        state.domains.iter().find(|d| d.name == name).cloned()
    }

    /// Next enabled domain in round-robin order, `None` if none is enabled
    pub async fn next(&self) -> Option<Domain> {
        let mut state = self.state.lock().await;

        let enabled: Vec<usize> = state
            .domains
            .iter()
            .enumerate()
            .filter(|(_, d)| d.enabled)
            .map(|(i, _)| i)
            .collect();
        if enabled.is_empty() {
            return None;
        }

        let index = enabled[state.cursor % enabled.len()];
        state.cursor = state.cursor.wrapping_add(1);

        let domain = &mut state.domains[index];
        domain.last_used_at = Some(Utc::now());
        let selected = domain.clone();

        self.persist(&state.domains).await;
        Some(selected)
    }

    /// Enabled domain with the fewest counted messages
    pub async fn least_used(&self) -> Option<Domain> {
        let state = self.state.lock().await;
        state
            .domains
            .iter()
            .filter(|d| d.enabled)
            .min_by_key(|d| d.accepted)
            .cloned()
    }

    /// Generate a fresh random address on the next round-robin domain
    pub async fn allocate_address(&self) -> Result<(String, String)> {
        let domain = self.next().await.ok_or(MailError::NoDomainAvailable)?;
        let address = format!("{}@{}", generate_local_part(), domain.name);
        debug!("Allocated address {}", address);
        Ok((address, domain.name))
    }

    /// Adjust a domain's counter (+1 on ingest, -1 on delete)
    pub async fn record_accepted(&self, name: &str, delta: i64) -> Result<Domain> {
        let mut state = self.state.lock().await;

        let domain = state
            .domains
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| MailError::DomainNotFound(name.to_string()))?;

        domain.apply_delta(delta);
        domain.last_used_at = Some(Utc::now());
        if domain.is_quota_reached() {
            warn!("Domain {} reached its quota ({})", domain.name, domain.max_accepted);
        }
        let updated = domain.clone();

        self.persist(&state.domains).await;
        Ok(updated)
    }

    /// Enabled and below quota; unknown domains are never healthy
    pub async fn is_healthy(&self, name: &str) -> bool {
        self.get(name).await.map(|d| d.is_healthy()).unwrap_or(false)
    }

    pub async fn toggle(&self, name: &str, enabled: bool) -> Result<Domain> {
        let mut state = self.state.lock().await;

        let domain = state
            .domains
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| MailError::DomainNotFound(name.to_string()))?;

        domain.enabled = enabled;
        info!(
            "Domain {} {}",
            domain.name,
            if enabled { "enabled" } else { "disabled" }
        );
        let updated = domain.clone();

        self.persist(&state.domains).await;
        Ok(updated)
    }

    pub async fn stats(&self) -> DomainStats {
        let state = self.state.lock().await;
        let enabled = state.domains.iter().filter(|d| d.enabled).count();

        DomainStats {
            total: state.domains.len(),
            enabled,
            disabled: state.domains.len() - enabled,
            total_accepted: state.domains.iter().map(|d| d.accepted).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_domains() -> Vec<Domain> {
        vec![
            Domain::new("a.example", 2525, 10),
            Domain::new("b.example", 2526, 10),
            Domain::new("c.example", 2527, 10),
        ]
    }

    #[tokio::test]
    async fn test_round_robin_cycles() {
        let registry = DomainRegistry::in_memory(three_domains());

        let mut first = Vec::new();
        for _ in 0..3 {
            first.push(registry.next().await.unwrap().name);
        }
        let mut second = Vec::new();
        for _ in 0..3 {
            second.push(registry.next().await.unwrap().name);
        }

        assert_eq!(first, vec!["a.example", "b.example", "c.example"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_round_robin_skips_disabled() {
        let registry = DomainRegistry::in_memory(three_domains());
        registry.toggle("b.example", false).await.unwrap();

        let names: Vec<String> = [
            registry.next().await.unwrap().name,
            registry.next().await.unwrap().name,
        ]
        .to_vec();
        assert_eq!(names, vec!["a.example", "c.example"]);
    }

    #[tokio::test]
    async fn test_next_none_without_enabled() {
        let registry = DomainRegistry::in_memory(vec![]);
        assert!(registry.next().await.is_none());
        assert!(matches!(
            registry.allocate_address().await,
            Err(MailError::NoDomainAvailable)
        ));
    }

    #[tokio::test]
    async fn test_next_updates_last_used() {
        let registry = DomainRegistry::in_memory(three_domains());
        let picked = registry.next().await.unwrap();
        assert!(picked.last_used_at.is_some());
        assert!(registry.get("a.example").await.unwrap().last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_allocate_address() {
        let registry = DomainRegistry::in_memory(three_domains());
        let (address, domain) = registry.allocate_address().await.unwrap();
        assert_eq!(domain, "a.example");
        assert!(address.ends_with("@a.example"));
        assert_eq!(address.len(), 10 + "@a.example".len());
    }

    #[tokio::test]
    async fn test_record_accepted_and_health() {
        let registry = DomainRegistry::in_memory(vec![Domain::new("a.example", 2525, 2)]);

        registry.record_accepted("a.example", 1).await.unwrap();
        assert!(registry.is_healthy("a.example").await);

        let domain = registry.record_accepted("a.example", 1).await.unwrap();
        assert_eq!(domain.accepted, 2);
        assert!(!registry.is_healthy("a.example").await);

        let domain = registry.record_accepted("a.example", -1).await.unwrap();
        assert_eq!(domain.accepted, 1);
        assert!(registry.is_healthy("a.example").await);
    }

    #[tokio::test]
    async fn test_unknown_domain_is_not_found() {
        let registry = DomainRegistry::in_memory(three_domains());
        assert!(matches!(
            registry.record_accepted("nope.example", 1).await,
            Err(MailError::DomainNotFound(_))
        ));
        assert!(matches!(
            registry.toggle("nope.example", false).await,
            Err(MailError::DomainNotFound(_))
        ));
        assert!(!registry.is_healthy("nope.example").await);
        assert_eq!(registry.stats().await.total_accepted, 0);
    }

    #[tokio::test]
    async fn test_least_used_and_stats() {
        let registry = DomainRegistry::in_memory(three_domains());
        registry.record_accepted("a.example", 3).await.unwrap();
        registry.record_accepted("c.example", 1).await.unwrap();

        assert_eq!(registry.least_used().await.unwrap().name, "b.example");

        registry.toggle("b.example", false).await.unwrap();
        assert_eq!(registry.least_used().await.unwrap().name, "c.example");

        let stats = registry.stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.enabled, 2);
        assert_eq!(stats.disabled, 1);
        assert_eq!(stats.total_accepted, 4);
    }

    #[tokio::test]
    async fn test_open_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.json");
        let seeds = vec![DomainSeed {
            name: "a.example".to_string(),
            port: 2525,
            max_accepted: 50,
            enabled: true,
        }];

        let registry = DomainRegistry::open(&path, &seeds).await.unwrap();
        registry.record_accepted("a.example", 4).await.unwrap();
        registry.toggle("a.example", false).await.unwrap();
        drop(registry);

        // Persisted state wins over the seed on reload
        let reloaded = DomainRegistry::open(&path, &seeds).await.unwrap();
        let domain = reloaded.get("a.example").await.unwrap();
        assert_eq!(domain.accepted, 4);
        assert!(!domain.enabled);
        assert_eq!(reloaded.list_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_open_merges_new_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.json");
        let seed = |name: &str, port| DomainSeed {
            name: name.to_string(),
            port,
            max_accepted: 100,
            enabled: true,
        };

        DomainRegistry::open(&path, &[seed("a.example", 2525)]).await.unwrap();
        let registry = DomainRegistry::open(&path, &[seed("a.example", 2525), seed("b.example", 2526)])
            .await
            .unwrap();

        let names: Vec<String> = registry.list_enabled().await.into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a.example", "b.example"]);
    }

    #[tokio::test]
    async fn test_concurrent_next_covers_each_domain_once() {
        let registry = std::sync::Arc::new(DomainRegistry::in_memory(three_domains()));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.next().await.unwrap().name })
            })
            .collect();

        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.await.unwrap());
        }
        names.sort();
        assert_eq!(names, vec!["a.example", "b.example", "c.example"]);
    }
}
