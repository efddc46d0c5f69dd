//! Peer Directory Cache.
//!
//! Resolves the registry's address list into a [`PeerCatalog`] and keeps the
//! last non-empty result for a TTL. Addresses are resolved concurrently with
//! a per-address deadline; anything that fails to resolve is left out of the
//! catalog. An empty fetch is returned to the caller but never cached, so a
//! registry outage does not evict a good catalog.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use tokio::time::Instant;

use super::catalog::{PeerCatalog, PeerDescriptor};
use crate::a2a::{normalize_url, A2AClient};
use crate::errors::RegistryError;
use crate::registry::RegistryClient;

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Where peer addresses and descriptors come from.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Every address currently registered.
    async fn list_addresses(&self) -> Result<Vec<String>, RegistryError>;

    /// Resolve one address into a descriptor.
    async fn resolve(&self, address: &str) -> Result<PeerDescriptor, RegistryError>;
}

/// Receives keep-alive text while a directory fetch is running.
#[async_trait]
pub trait DiscoveryObserver: Send + Sync {
    async fn on_discovery_progress(&self, text: &str);
}

/// Registry-backed source: addresses from `GET /agents`, descriptors from
/// each peer's published agent card.
pub struct HttpDirectorySource {
    registry: RegistryClient,
    cards: A2AClient,
    self_address: Option<String>,
}

impl HttpDirectorySource {
    pub fn new(registry: RegistryClient, cards: A2AClient) -> Self {
        Self {
            registry,
            cards,
            self_address: None,
        }
    }

    /// Builder: exclude this address (the caller's own) from listings.
    pub fn excluding(mut self, self_address: &str) -> Self {
        self.self_address = Some(normalize_url(self_address));
        self
    }
}

#[async_trait]
impl DirectorySource for HttpDirectorySource {
    async fn list_addresses(&self) -> Result<Vec<String>, RegistryError> {
        let agents = self.registry.list_agents().await?;
        Ok(agents
            .into_iter()
            .map(|a| normalize_url(&a.address))
            .filter(|a| !a.is_empty() && Some(a) != self.self_address.as_ref())
            .collect())
    }

    async fn resolve(&self, address: &str) -> Result<PeerDescriptor, RegistryError> {
        let card = self.cards.get_agent_card(address).await?;
        Ok(PeerDescriptor::from_card(address, &card))
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CachedCatalog {
    loaded_at: Instant,
    catalog: Arc<PeerCatalog>,
}

/// TTL cache over a [`DirectorySource`].
///
/// Readers clone an `Arc` out of the slot; a refresh swaps the whole slot, so
/// a reader holds either the old or the new catalog, never a mix. Refreshes
/// are serialized so concurrent callers with a stale cache trigger one fetch.
pub struct PeerDirectoryCache {
    source: Arc<dyn DirectorySource>,
    ttl: Duration,
    resolve_timeout: Duration,
    list_timeout: Duration,
    slot: RwLock<Option<CachedCatalog>>,
    refresh: tokio::sync::Mutex<()>,
}

impl PeerDirectoryCache {
    pub fn new(source: Arc<dyn DirectorySource>, ttl: Duration, resolve_timeout: Duration) -> Self {
        Self {
            source,
            ttl,
            resolve_timeout,
            list_timeout: resolve_timeout,
            slot: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// Builder: deadline for the address listing call.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached catalog regardless of age, if any fetch was ever cached.
    pub fn cached(&self) -> Option<Arc<PeerCatalog>> {
        self.slot.read().as_ref().map(|c| Arc::clone(&c.catalog))
    }

    /// Drop the cached catalog so the next call fetches.
    pub fn invalidate(&self) {
        *self.slot.write() = None;
        log::debug!("Peer directory cache invalidated");
    }

    /// Fetch once ahead of the first request. Returns the number of peers found.
    pub async fn prime(&self) -> usize {
        self.get_catalog(None).await.len()
    }

    /// Current catalog: the cached one while fresh, otherwise a new fetch.
    pub async fn get_catalog(&self, observer: Option<&dyn DiscoveryObserver>) -> Arc<PeerCatalog> {
        if let Some(catalog) = self.fresh() {
            log::debug!("Using cached peer catalog ({} peers)", catalog.len());
            return catalog;
        }

        let _guard = match self.refresh.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(observer) = observer {
                    observer
                        .on_discovery_progress("Waiting for directory refresh...")
                        .await;
                }
                self.refresh.lock().await
            }
        };
        // Another flow may have refreshed while this one waited.
        if let Some(catalog) = self.fresh() {
            return catalog;
        }

        let catalog = Arc::new(self.fetch(observer).await);
        if catalog.is_empty() {
            log::debug!("Directory fetch returned no peers; cache left unchanged");
        } else {
            log::info!("Peer directory refreshed: {} peers", catalog.len());
            *self.slot.write() = Some(CachedCatalog {
                loaded_at: Instant::now(),
                catalog: Arc::clone(&catalog),
            });
        }
        catalog
    }

    fn fresh(&self) -> Option<Arc<PeerCatalog>> {
        let slot = self.slot.read();
        slot.as_ref()
            .filter(|c| c.loaded_at.elapsed() < self.ttl)
            .map(|c| Arc::clone(&c.catalog))
    }

    async fn fetch(&self, observer: Option<&dyn DiscoveryObserver>) -> PeerCatalog {
        let listed = match tokio::time::timeout(self.list_timeout, self.source.list_addresses()).await {
            Ok(Ok(addresses)) => addresses,
            Ok(Err(e)) => {
                log::warn!("Failed to list peers from registry: {}", e);
                return PeerCatalog::empty();
            }
            Err(_) => {
                log::warn!("Listing peers from registry timed out after {:?}", self.list_timeout);
                return PeerCatalog::empty();
            }
        };

        let mut seen = HashSet::new();
        let addresses: Vec<String> = listed
            .into_iter()
            .map(|a| normalize_url(&a))
            .filter(|a| seen.insert(a.clone()))
            .collect();
        let total = addresses.len();
        if total == 0 {
            return PeerCatalog::empty();
        }

        if let Some(observer) = observer {
            observer
                .on_discovery_progress(&format!("Discovering {} services...", total))
                .await;
        }

        let mut pending: FuturesUnordered<_> = addresses
            .iter()
            .map(|address| async move {
                let outcome =
                    match tokio::time::timeout(self.resolve_timeout, self.source.resolve(address)).await {
                        Ok(result) => result,
                        Err(_) => Err(RegistryError::Timeout {
                            address: address.clone(),
                        }),
                    };
                (address, outcome)
            })
            .collect();

        let mut peers = Vec::with_capacity(total);
        let mut checked = 0usize;
        while let Some((address, outcome)) = pending.next().await {
            checked += 1;
            match outcome {
                Ok(peer) => peers.push(peer),
                Err(e) => log::debug!("Dropping peer {} from catalog: {}", address, e),
            }
            if checked % 2 == 1 {
                if let Some(observer) = observer {
                    observer
                        .on_discovery_progress(&format!("Checked service {}/{}...", checked, total))
                        .await;
                }
            }
        }

        PeerCatalog::from_peers(peers)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory directory. Addresses with a configured delay sleep before
    /// resolving; addresses marked broken fail.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub peers: parking_lot::Mutex<Vec<PeerDescriptor>>,
        pub delays: HashMap<String, Duration>,
        pub broken: HashSet<String>,
        pub list_calls: AtomicUsize,
        pub generation: AtomicUsize,
        pub stamp_generation: bool,
    }

    impl FakeSource {
        pub(crate) fn with_peers(peers: Vec<PeerDescriptor>) -> Self {
            Self {
                peers: parking_lot::Mutex::new(peers),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl DirectorySource for FakeSource {
        async fn list_addresses(&self) -> Result<Vec<String>, RegistryError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.generation.fetch_add(1, Ordering::SeqCst);
            Ok(self.peers.lock().iter().map(|p| p.address.clone()).collect())
        }

        async fn resolve(&self, address: &str) -> Result<PeerDescriptor, RegistryError> {
            if let Some(delay) = self.delays.get(address) {
                tokio::time::sleep(*delay).await;
            }
            if self.broken.contains(address) {
                return Err(RegistryError::MalformedCard {
                    address: address.to_string(),
                    reason: "card has an empty name".to_string(),
                });
            }
            tokio::task::yield_now().await;
            let mut peer = self
                .peers
                .lock()
                .iter()
                .find(|p| p.address == address)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound {
                    address: address.to_string(),
                })?;
            if self.stamp_generation {
                peer.description = format!("gen-{}", self.generation.load(Ordering::SeqCst));
            }
            Ok(peer)
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        texts: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DiscoveryObserver for RecordingObserver {
        async fn on_discovery_progress(&self, text: &str) {
            self.texts.lock().push(text.to_string());
        }
    }

    fn peer(address: &str, name: &str) -> PeerDescriptor {
        PeerDescriptor::new(address, name, "")
    }

    fn cache(source: Arc<FakeSource>, ttl: Duration) -> PeerDirectoryCache {
        PeerDirectoryCache::new(source, ttl, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_serves_cached_catalog_within_ttl() {
        let source = Arc::new(FakeSource::with_peers(vec![peer("http://a", "A")]));
        let cache = cache(source.clone(), Duration::from_secs(60));

        let first = cache.get_catalog(None).await;
        let second = cache.get_catalog(None).await;
        assert_eq!(first.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetches_after_ttl_and_invalidate() {
        let source = Arc::new(FakeSource::with_peers(vec![peer("http://a", "A")]));
        let cache = cache(source.clone(), Duration::from_millis(30));

        cache.get_catalog(None).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.get_catalog(None).await;
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 2);

        cache.invalidate();
        assert!(cache.cached().is_none());
        cache.get_catalog(None).await;
        assert_eq!(source.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_fetch_is_returned_but_not_cached() {
        let source = Arc::new(FakeSource::with_peers(vec![peer("http://a", "A")]));
        let cache = cache(source.clone(), Duration::ZERO);

        let first = cache.get_catalog(None).await;
        assert_eq!(first.len(), 1);

        source.peers.lock().clear();
        let second = cache.get_catalog(None).await;
        assert!(second.is_empty());
        let kept = cache.cached().expect("previous catalog kept");
        assert!(Arc::ptr_eq(&kept, &first));

        let fresh_source = Arc::new(FakeSource::default());
        let fresh_cache = cache_with(fresh_source);
        assert!(fresh_cache.get_catalog(None).await.is_empty());
        assert!(fresh_cache.cached().is_none());
    }

    fn cache_with(source: Arc<FakeSource>) -> PeerDirectoryCache {
        cache(source, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_unresolvable_and_slow_peers_are_dropped() {
        let mut source = FakeSource::with_peers(vec![
            peer("http://ok", "Ok"),
            peer("http://slow", "Slow"),
            peer("http://broken", "Broken"),
        ]);
        source
            .delays
            .insert("http://slow".to_string(), Duration::from_secs(5));
        source.broken.insert("http://broken".to_string());
        let cache = PeerDirectoryCache::new(
            Arc::new(source),
            Duration::from_secs(60),
            Duration::from_millis(50),
        );

        let catalog = cache.get_catalog(None).await;
        assert_eq!(catalog.names(), vec!["Ok"]);
    }

    #[tokio::test]
    async fn test_all_resolutions_timing_out_yields_empty_catalog() {
        let mut source = FakeSource::with_peers(vec![peer("http://a", "A"), peer("http://b", "B")]);
        for address in ["http://a", "http://b"] {
            source
                .delays
                .insert(address.to_string(), Duration::from_secs(5));
        }
        let cache = PeerDirectoryCache::new(
            Arc::new(source),
            Duration::from_secs(60),
            Duration::from_millis(30),
        );
        assert!(cache.get_catalog(None).await.is_empty());
        assert!(cache.cached().is_none());
    }

    #[tokio::test]
    async fn test_reports_discovery_progress() {
        let source = Arc::new(FakeSource::with_peers(vec![
            peer("http://a", "A"),
            peer("http://b", "B"),
            peer("http://c", "C"),
        ]));
        let cache = cache_with(source);
        let observer = RecordingObserver::default();

        cache.get_catalog(Some(&observer)).await;
        let texts = observer.texts.lock().clone();
        assert_eq!(
            texts,
            vec![
                "Discovering 3 services...",
                "Checked service 1/3...",
                "Checked service 3/3...",
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_never_mix_generations() {
        let source = Arc::new(FakeSource {
            peers: parking_lot::Mutex::new(
                (0..6)
                    .map(|i| peer(&format!("http://p{}", i), &format!("P{}", i)))
                    .collect(),
            ),
            stamp_generation: true,
            ..Default::default()
        });
        let cache = Arc::new(cache(source, Duration::ZERO));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_catalog(None).await })
            })
            .collect();

        for handle in handles {
            let catalog = handle.await.unwrap();
            let generations: HashSet<_> = catalog.peers().map(|p| p.description.clone()).collect();
            assert_eq!(catalog.len(), 6);
            assert_eq!(generations.len(), 1, "mixed generations: {:?}", generations);
        }
    }

    #[tokio::test]
    async fn test_duplicate_addresses_resolve_once() {
        let source = Arc::new(FakeSource::with_peers(vec![
            peer("http://a", "A"),
            peer("http://a/", "A"),
        ]));
        let cache = cache_with(source);
        assert_eq!(cache.get_catalog(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_waiting_flow_hears_from_the_directory() {
        let mut source = FakeSource::with_peers(vec![peer("http://a", "A")]);
        source
            .delays
            .insert("http://a".to_string(), Duration::from_millis(150));
        let cache = Arc::new(cache(Arc::new(source), Duration::from_secs(60)));

        let fetching = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_catalog(None).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let observer = RecordingObserver::default();
        let catalog = cache.get_catalog(Some(&observer)).await;
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            observer.texts.lock().clone(),
            vec!["Waiting for directory refresh..."]
        );
        assert!(Arc::ptr_eq(&catalog, &fetching.await.unwrap()));
    }
}
