//! Long-lived warehouse sessions shared across MCP requests.
//!
//! The registry lazily builds one [`SessionHandle`] per named connection
//! profile and hands out clones. Concurrent requests for the same profile
//! share a single build, idle sessions are evicted after a TTL, and sessions
//! idle past the revalidation window are probed before reuse.

use std::{
    collections::HashMap,
    error::Error,
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use snowmcp_store::ErrorLogStore;
use tokio::{
    sync::{OnceCell, RwLock},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{control::WarehouseControlPlane, warehouse::WarehouseClient};

pub type BuildSessionFuture =
    Pin<Box<dyn Future<Output = Result<Arc<SessionHandle>, RegistryError>> + Send + 'static>>;
pub type BuildSessionFn = Arc<dyn Fn(String) -> BuildSessionFuture + Send + Sync + 'static>;

#[derive(Debug)]
pub enum RegistryError {
    UnknownProfile(String),
    CapacityReached { max: usize },
    BuildFailed(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProfile(name) => write!(f, "unknown connection profile: {name}"),
            Self::CapacityReached { max } => {
                write!(f, "session registry capacity reached (max {max})")
            }
            Self::BuildFailed(reason) => write!(f, "failed to build warehouse session: {reason}"),
        }
    }
}

impl Error for RegistryError {}

/// An established session: the HTTP client plus the control plane built on it.
#[derive(Clone)]
pub struct SessionHandle {
    client: Arc<WarehouseClient>,
    control: WarehouseControlPlane,
}

impl SessionHandle {
    #[must_use]
    pub fn new(client: Arc<WarehouseClient>, error_log: Option<ErrorLogStore>) -> Self {
        let control = WarehouseControlPlane::new(client.clone(), error_log);
        Self { client, control }
    }

    #[must_use]
    pub fn from_client(client: Arc<WarehouseClient>) -> Self {
        Self::new(client, None)
    }

    #[must_use]
    pub fn client(&self) -> Arc<WarehouseClient> {
        self.client.clone()
    }

    #[must_use]
    pub fn control(&self) -> WarehouseControlPlane {
        self.control.clone()
    }
}

pub struct SessionRegistryConfig {
    ttl: Option<Duration>,
    sweep_interval: Duration,
    max_entries: Option<usize>,
    revalidate_after: Option<Duration>,
    build_session: BuildSessionFn,
}

impl SessionRegistryConfig {
    #[must_use]
    pub const fn new(build_session: BuildSessionFn) -> Self {
        Self {
            ttl: None,
            sweep_interval: Duration::from_secs(60),
            max_entries: None,
            revalidate_after: None,
            build_session,
        }
    }

    /// Evict sessions idle longer than `ttl`.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Cap the number of distinct profiles held at once.
    #[must_use]
    pub const fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Probe sessions idle longer than `window` before handing them out.
    #[must_use]
    pub const fn with_revalidate_after(mut self, window: Duration) -> Self {
        self.revalidate_after = Some(window);
        self
    }
}

struct SessionEntry {
    handle: OnceCell<Arc<SessionHandle>>,
    last_used_ms: AtomicU64,
}

impl SessionEntry {
    fn new() -> Self {
        Self { handle: OnceCell::new(), last_used_ms: AtomicU64::new(now_ms()) }
    }

    fn touch(&self) {
        self.last_used_ms.store(now_ms(), Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = self.last_used_ms.load(Ordering::Relaxed);
        Duration::from_millis(now_ms().saturating_sub(last))
    }
}

struct SessionRegistryInner {
    entries: RwLock<HashMap<String, Arc<SessionEntry>>>,
    config: SessionRegistryConfig,
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(config: SessionRegistryConfig) -> Self {
        Self {
            inner: Arc::new(SessionRegistryInner { entries: RwLock::new(HashMap::new()), config }),
        }
    }

    /// Returns the session for `profile`, building it on first use.
    ///
    /// A session idle past the revalidation window is probed first and
    /// rebuilt in place when the probe fails.
    ///
    /// # Errors
    /// Returns an error when the registry is full or the build fails.
    pub async fn get_or_init(&self, profile: &str) -> Result<Arc<SessionHandle>, RegistryError> {
        let entry = self.entry_for(profile).await?;
        let already_built = entry.handle.initialized();
        let idle = entry.idle_for();
        entry.touch();

        let build = self.inner.config.build_session.clone();
        let handle = entry.handle.get_or_try_init(|| build(profile.to_string())).await?.clone();

        let needs_probe = already_built
            && self.inner.config.revalidate_after.is_some_and(|window| idle >= window);
        if !needs_probe {
            return Ok(handle);
        }
        match handle.client().ping().await {
            Ok(()) => Ok(handle),
            Err(err) => {
                warn!("Session for profile {profile} failed revalidation, rebuilding: {err}");
                let fresh = self.replace_entry(profile, &entry).await;
                fresh.touch();
                let build = self.inner.config.build_session.clone();
                Ok(fresh.handle.get_or_try_init(|| build(profile.to_string())).await?.clone())
            }
        }
    }

    /// Profile names currently held, sorted.
    pub async fn list_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.inner.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops sessions idle longer than the TTL and returns how many went.
    pub async fn evict_idle(&self) -> usize {
        let Some(ttl) = self.inner.config.ttl else {
            return 0;
        };
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.idle_for() < ttl);
        before - entries.len()
    }

    /// Starts the background eviction task.
    ///
    /// Returns `None` when no TTL is set or the sweep interval is zero.
    pub fn spawn_sweeper(self) -> Option<JoinHandle<()>> {
        self.inner.config.ttl?;
        let interval = self.inner.config.sweep_interval;
        if interval.is_zero() {
            return None;
        }
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = self.evict_idle().await;
                if evicted > 0 {
                    debug!("Evicted {evicted} idle warehouse sessions");
                }
            }
        }))
    }

    async fn entry_for(&self, profile: &str) -> Result<Arc<SessionEntry>, RegistryError> {
        if let Some(entry) = self.inner.entries.read().await.get(profile) {
            return Ok(entry.clone());
        }
        let mut entries = self.inner.entries.write().await;
        if let Some(entry) = entries.get(profile) {
            return Ok(entry.clone());
        }
        if let Some(max) = self.inner.config.max_entries
            && entries.len() >= max
        {
            return Err(RegistryError::CapacityReached { max });
        }
        let entry = Arc::new(SessionEntry::new());
        entries.insert(profile.to_string(), entry.clone());
        Ok(entry)
    }

    async fn replace_entry(&self, profile: &str, stale: &Arc<SessionEntry>) -> Arc<SessionEntry> {
        let mut entries = self.inner.entries.write().await;
        if let Some(current) = entries.get(profile)
            && !Arc::ptr_eq(current, stale)
        {
            return current.clone();
        }
        let fresh = Arc::new(SessionEntry::new());
        entries.insert(profile.to_string(), fresh.clone());
        fresh
    }
}

fn now_ms() -> u64 {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::warehouse::{
        ClientOptions, ConnectionProfile, Credentials, TokenType, WarehouseClient,
    };

    fn test_profile() -> ConnectionProfile {
        ConnectionProfile {
            account: "testorg-test1".to_string(),
            user: "TESTER".to_string(),
            credentials: Credentials::Token {
                token: "test-token".to_string(),
                token_type: TokenType::OAuth,
            },
            database: None,
            schema: None,
            warehouse: None,
            role: None,
        }
    }

    fn offline_handle() -> Result<Arc<SessionHandle>, RegistryError> {
        let options = ClientOptions::default()
            .with_login_timeout(Duration::from_millis(50))
            .with_request_timeout(Duration::from_millis(50));
        let client = WarehouseClient::new(test_profile(), options)
            .map_err(|err| RegistryError::BuildFailed(err.to_string()))?;
        Ok(Arc::new(SessionHandle::from_client(Arc::new(client))))
    }

    fn counting_config(calls: Arc<AtomicUsize>) -> SessionRegistryConfig {
        SessionRegistryConfig::new(Arc::new(move |_profile: String| -> BuildSessionFuture {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                offline_handle()
            })
        }))
    }

    #[tokio::test]
    async fn concurrent_lookups_share_one_build() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(counting_config(calls.clone()));
        let (a, b) = tokio::join!(registry.get_or_init("dev"), registry.get_or_init("dev"));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.list_profiles().await, vec!["dev".to_string()]);
    }

    #[tokio::test]
    async fn capacity_limit_rejects_new_profiles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(counting_config(calls).with_max_entries(1));
        assert!(registry.get_or_init("dev").await.is_ok());
        let overflow = registry.get_or_init("prod").await;
        assert!(matches!(overflow, Err(RegistryError::CapacityReached { max: 1 })));
        assert!(registry.get_or_init("dev").await.is_ok());
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry =
            SessionRegistry::new(counting_config(calls).with_ttl(Duration::from_millis(20)));
        assert!(registry.get_or_init("dev").await.is_ok());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(registry.evict_idle().await, 1);
        assert!(registry.list_profiles().await.is_empty());
    }

    #[tokio::test]
    async fn failed_revalidation_rebuilds_the_session() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = SessionRegistry::new(
            counting_config(calls.clone()).with_revalidate_after(Duration::ZERO),
        );
        assert!(registry.get_or_init("dev").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The probe cannot reach a warehouse from here, so the second lookup
        // must rebuild the entry.
        assert!(registry.get_or_init("dev").await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
