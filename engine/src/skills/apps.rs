//! Installed-app registry
//!
//! The skill matcher needs to know which packages are installed. Scanning the
//! device is slow, so a background task refreshes the list and publishes it
//! by swapping in a new immutable `AppSnapshot`. Readers take the current
//! snapshot and never wait on a scan; a query made before the first scan
//! completes sees the previous (possibly empty) snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdk::ActionError;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Source of the installed package list
#[async_trait]
pub trait AppScanner: Send + Sync {
    async fn scan(&self) -> Result<Vec<String>, ActionError>;
}

/// Immutable view of installed packages at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppSnapshot {
    packages: HashSet<String>,
    scanned_at: Option<DateTime<Utc>>,
}

impl AppSnapshot {
    pub fn new(packages: impl IntoIterator<Item = String>) -> Self {
        Self {
            packages: packages.into_iter().collect(),
            scanned_at: Some(Utc::now()),
        }
    }

    pub fn is_installed(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// `None` until the first scan has completed
    pub fn scanned_at(&self) -> Option<DateTime<Utc>> {
        self.scanned_at
    }
}

#[derive(Debug, Default)]
pub struct InstalledApps {
    current: RwLock<Arc<AppSnapshot>>,
}

impl InstalledApps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let apps = Self::new();
        apps.publish(AppSnapshot::new(packages.into_iter().map(Into::into)));
        apps
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<AppSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the current snapshot
    pub fn publish(&self, snapshot: AppSnapshot) {
        let snapshot = Arc::new(snapshot);
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = snapshot;
    }

    /// Scan once and publish the result; a failed scan keeps the old snapshot
    pub async fn refresh(&self, scanner: &dyn AppScanner) -> Result<usize, ActionError> {
        let packages = scanner.scan().await?;
        let count = packages.len();
        self.publish(AppSnapshot::new(packages));
        debug!("Installed-app snapshot refreshed: {} package(s)", count);
        Ok(count)
    }

    /// Refresh on a background task, once or every `interval`
    pub fn spawn_refresh(
        self: Arc<Self>,
        scanner: Arc<dyn AppScanner>,
        interval: Option<Duration>,
    ) -> JoinHandle<()> {
        let apps = self;
        tokio::spawn(async move {
            loop {
                if let Err(e) = apps.refresh(scanner.as_ref()).await {
                    warn!("Installed-app scan failed: {}", e);
                }
                match interval {
                    Some(period) => tokio::time::sleep(period).await,
                    None => break,
                }
            }
        })
    }
}
