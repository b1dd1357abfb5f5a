//! Connection management: which relay to talk to, and whether it is up.
//!
//! [`ConnectionManager::active_endpoint`] is the single gate the engine checks
//! before any cycle. It is `None` whenever the user forced offline mode,
//! sync is disabled, or the last check failed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::relay::{Relay, RelayConnector};

/// Where sync traffic goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    Disabled,
    LocalNetwork,
    Cloud,
    Custom,
}

/// Configuration for connection behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub mode: SyncMode,
    pub local_network_url: Option<String>,
    pub cloud_url: Option<String>,
    pub custom_url: Option<String>,
    /// Upper bound on a reachability check.
    pub check_timeout: Duration,
    /// First retry delay after a failure.
    pub backoff_base: Duration,
    /// Retry delay ceiling.
    pub backoff_max: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Disabled,
            local_network_url: None,
            cloud_url: None,
            custom_url: None,
            check_timeout: Duration::from_secs(8),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5 * 60),
        }
    }
}

impl ConnectionConfig {
    /// The endpoint implied by `mode`, if one is configured.
    pub fn endpoint_for_mode(&self) -> Option<&str> {
        match self.mode {
            SyncMode::Disabled => None,
            SyncMode::LocalNetwork => self.local_network_url.as_deref(),
            SyncMode::Cloud => self.cloud_url.as_deref(),
            SyncMode::Custom => self.custom_url.as_deref(),
        }
    }
}

/// Snapshot of connection state, published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub mode: SyncMode,
    pub connected: bool,
    pub checking: bool,
    pub offline_override: bool,
    pub device_online: bool,
    pub failures: u32,
    /// Set only while the gate is open.
    pub active_endpoint: Option<String>,
}

/// `min(max, base * 2^failures)`, saturating.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

struct State {
    config: ConnectionConfig,
    connected: bool,
    checking: bool,
    offline_override: bool,
    device_online: bool,
    failures: u32,
    /// Exists only while the gate is open.
    client: Option<Arc<dyn Relay>>,
    retry: Option<JoinHandle<()>>,
    /// Bumped on every configuration change so stale checks are discarded.
    generation: u64,
}

impl State {
    fn active_endpoint(&self) -> Option<String> {
        if self.offline_override || !self.connected {
            return None;
        }
        self.config.endpoint_for_mode().map(str::to_string)
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.checking = false;
        self.client = None;
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            mode: self.config.mode,
            connected: self.connected,
            checking: self.checking,
            offline_override: self.offline_override,
            device_online: self.device_online,
            failures: self.failures,
            active_endpoint: self.active_endpoint(),
        }
    }
}

struct Inner {
    connector: Arc<dyn RelayConnector>,
    state: Mutex<State>,
    status: watch::Sender<ConnectionStatus>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.status.send_replace(state.status());
    }
}

/// Tracks mode, reachability and backoff for the relay connection.
///
/// Cheap to clone; clones share state. Failure count and backoff timer are
/// process-wide for one manager: zero at start, reset on success.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager. No check is made until [`test_connection`] runs.
    ///
    /// [`test_connection`]: ConnectionManager::test_connection
    pub fn new(config: ConnectionConfig, connector: Arc<dyn RelayConnector>) -> Self {
        let state = State {
            config,
            connected: false,
            checking: false,
            offline_override: false,
            device_online: true,
            failures: 0,
            client: None,
            retry: None,
            generation: 0,
        };
        let (status, _) = watch::channel(state.status());

        Self {
            inner: Arc::new(Inner {
                connector,
                state: Mutex::new(state),
                status,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    /// The endpoint to sync with, or `None` if syncing must not happen.
    pub fn active_endpoint(&self) -> Option<String> {
        self.inner.state().active_endpoint()
    }

    /// The live relay client, present only while the gate is open.
    pub fn client(&self) -> Option<Arc<dyn Relay>> {
        let state = self.inner.state();
        state.active_endpoint().and(state.client.clone())
    }

    pub fn mode(&self) -> SyncMode {
        self.inner.state().config.mode
    }

    pub fn config(&self) -> ConnectionConfig {
        self.inner.state().config.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state().status()
    }

    /// Observe status changes.
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Setters
    // ─────────────────────────────────────────────────────────────────────────

    /// Switch mode and re-check. Returns whether the new endpoint is reachable.
    pub async fn set_mode(&self, mode: SyncMode) -> bool {
        self.reconfigure(|config| config.mode = mode);
        info!(?mode, "sync mode changed");
        self.test_connection().await
    }

    /// Replace the whole configuration and re-check.
    pub async fn set_config(&self, config: ConnectionConfig) -> bool {
        self.reconfigure(|current| *current = config);
        self.test_connection().await
    }

    /// Force offline (or lift the override and re-check).
    pub async fn set_offline_override(&self, offline: bool) -> bool {
        {
            let mut state = self.inner.state();
            state.offline_override = offline;
            state.generation += 1;
            if offline {
                state.disconnect();
                state.cancel_retry();
            }
            self.inner.publish(&state);
        }
        if offline {
            false
        } else {
            self.test_connection().await
        }
    }

    /// Device-level network signal. Going online triggers a check.
    pub async fn set_device_online(&self, online: bool) -> bool {
        let came_online = {
            let mut state = self.inner.state();
            let was_online = state.device_online;
            state.device_online = online;
            if !online {
                state.generation += 1;
                state.disconnect();
                state.cancel_retry();
            }
            self.inner.publish(&state);
            online && !was_online
        };

        if came_online {
            debug!("device came online, probing relay");
            self.test_connection().await
        } else {
            self.active_endpoint().is_some()
        }
    }

    fn reconfigure(&self, change: impl FnOnce(&mut ConnectionConfig)) {
        let mut state = self.inner.state();
        change(&mut state.config);
        state.generation += 1;
        state.failures = 0;
        state.disconnect();
        state.cancel_retry();
        self.inner.publish(&state);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Probing and backoff
    // ─────────────────────────────────────────────────────────────────────────

    /// Bounded reachability check against the endpoint implied by the mode.
    ///
    /// Sets `connected` accordingly and never fails. A check overtaken by a
    /// configuration change is discarded.
    pub async fn test_connection(&self) -> bool {
        let (endpoint, timeout, generation) = {
            let mut state = self.inner.state();
            let endpoint = match state.config.endpoint_for_mode() {
                Some(endpoint) if !state.offline_override && state.device_online => {
                    endpoint.to_string()
                }
                _ => {
                    state.disconnect();
                    self.inner.publish(&state);
                    return false;
                }
            };
            state.checking = true;
            self.inner.publish(&state);
            (endpoint, state.config.check_timeout, state.generation)
        };

        let check = match self.inner.connector.connect(&endpoint) {
            Ok(client) => match tokio::time::timeout(timeout, client.ping()).await {
                Ok(Ok(())) => Ok(client),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("no answer within {timeout:?}")),
            },
            Err(e) => Err(e.to_string()),
        };

        let mut state = self.inner.state();
        if state.generation != generation {
            debug!(%endpoint, "discarding check result after reconfiguration");
            return state.active_endpoint().is_some();
        }

        state.checking = false;
        let reachable = match check {
            Ok(client) => {
                state.connected = true;
                state.client = Some(client);
                debug!(%endpoint, "relay reachable");
                true
            }
            Err(reason) => {
                state.disconnect();
                debug!(%endpoint, %reason, "relay unreachable");
                false
            }
        };
        self.inner.publish(&state);
        reachable
    }

    /// Record a failed relay call and schedule a retry check.
    ///
    /// Returns the delay before the retry. Must be called inside a tokio
    /// runtime.
    pub fn report_failure(&self) -> Duration {
        let mut state = self.inner.state();
        state.failures = state.failures.saturating_add(1);
        let delay = backoff_delay(
            state.config.backoff_base,
            state.config.backoff_max,
            state.failures,
        );
        state.disconnect();
        state.cancel_retry();

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        state.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                ConnectionManager { inner }.test_connection().await;
            }
        }));

        warn!(failures = state.failures, ?delay, "relay call failed, backing off");
        self.inner.publish(&state);
        delay
    }

    /// Record a successful relay round trip. Resets backoff.
    pub fn report_success(&self) {
        let mut state = self.inner.state();
        if state.failures > 0 {
            debug!(failures = state.failures, "relay recovered");
        }
        state.failures = 0;
        state.cancel_retry();
        self.inner.publish(&state);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state().cancel_retry();
    }
}
