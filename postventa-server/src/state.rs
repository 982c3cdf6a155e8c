//! Shared application state for the API server.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime};
use tokio::sync::{RwLock, RwLockReadGuard, broadcast};
use tracing::info;

use postventa::core::types::{AppointmentId, ClaimId, DebrisId};
use postventa::io::config::{PostventaConfig, load_config};
use postventa::io::init::PostventaPaths;
use postventa::io::store_file::{StoreStamp, load_store_stamped, read_stamp, write_store_checked};
use postventa::model::Store;

use crate::error::ApiError;
use crate::session::Sessions;

/// Domain changes broadcast to SSE clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    ClaimChanged { claim: ClaimId },
    AppointmentChanged { appointment: AppointmentId },
    DebrisChanged { debris: DebrisId },
    NotificationsQueued { count: usize },
    /// The store file was changed by another process and reloaded.
    StoreReloaded,
}

pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// The store in memory and the stamp of the file it matches.
struct Current {
    store: Store,
    stamp: StoreStamp,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<PostventaPaths>,
    pub cfg: Arc<PostventaConfig>,
    pub sessions: Sessions,
    /// Broadcast sender for domain change events.
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
    current: Arc<RwLock<Current>>,
    clock: Clock,
}

impl AppState {
    /// `stamp` identifies the file contents `store` was loaded from.
    pub fn new(paths: PostventaPaths, cfg: PostventaConfig, store: Store, stamp: StoreStamp) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            paths: Arc::new(paths),
            cfg: Arc::new(cfg),
            sessions: Sessions::default(),
            event_tx: Arc::new(event_tx),
            current: Arc::new(RwLock::new(Current { store, stamp })),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Load config and store of an initialized project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let paths = PostventaPaths::new(project_dir);
        if !paths.state_dir.is_dir() {
            bail!(
                "{} not found (run `postventa init` first)",
                paths.state_dir.display()
            );
        }
        let cfg = load_config(&paths.config_path)?;
        cfg.validate().context("invalid config")?;
        let (store, stamp) = load_store_stamped(&paths.store_path)?;
        Ok(Self::new(paths, cfg, store, stamp))
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Store> {
        RwLockReadGuard::map(self.current.read().await, |current| &current.store)
    }

    /// Run `apply` on a draft of the store. On success the draft is written
    /// to disk and becomes the current store; on error nothing changes.
    ///
    /// A store file rewritten by another process since we last saw it is
    /// loaded first, so the draft never starts from stale data.
    pub async fn mutate<T, E>(&self, apply: impl FnOnce(&mut Store) -> Result<T, E>) -> Result<T, ApiError>
    where
        ApiError: From<E>,
    {
        let mut current = self.current.write().await;
        let on_disk = read_stamp(&self.paths.store_path).map_err(ApiError::internal)?;
        if on_disk != current.stamp {
            self.catch_up(&mut current).map_err(ApiError::internal)?;
        }
        let mut draft = current.store.clone();
        let out = apply(&mut draft)?;
        if draft != current.store {
            let stamp = write_store_checked(&self.paths.store_path, &draft, &current.stamp)
                .map_err(ApiError::internal)?;
            let queued = draft
                .notifications
                .len()
                .saturating_sub(current.store.notifications.len());
            *current = Current {
                store: draft,
                stamp,
            };
            if queued > 0 {
                self.publish(ChangeEvent::NotificationsQueued { count: queued });
            }
        }
        Ok(out)
    }

    /// Re-read the store file written by another process. The write lock is
    /// held across the read so a concurrent mutation cannot be overwritten.
    /// Returns false when the file is the one already in memory.
    pub async fn reload(&self) -> Result<bool> {
        let mut current = self.current.write().await;
        if read_stamp(&self.paths.store_path)? == current.stamp {
            return Ok(false);
        }
        self.catch_up(&mut current)
    }

    /// Replace the in-memory store with the file; true when the data differs.
    fn catch_up(&self, current: &mut Current) -> Result<bool> {
        let (fresh, stamp) = load_store_stamped(&self.paths.store_path)?;
        current.stamp = stamp;
        if current.store == fresh {
            return Ok(false);
        }
        info!(path = %self.paths.store_path.display(), "store changed on disk, reloaded");
        current.store = fresh;
        self.publish(ChangeEvent::StoreReloaded);
        Ok(true)
    }

    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.event_tx.send(event);
    }
}
