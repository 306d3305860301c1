//! Process-wide collection of launch configurations.
//!
//! The registry is built once at the composition root and shared by `Arc`.
//! It owns the id counter handed to every node and the global listener list.

use std::sync::Arc;

use parking_lot::Mutex;

use launchwatch_core::prelude::*;

use crate::config::ModelSettings;
use crate::events::{ListenerSet, ModelEvent, ModelListener};
use crate::ids::{IdIssuer, NodeId};
use crate::launch::{LaunchConfiguration, LaunchHandle};

/// Root of the launch/tab/server model
#[derive(Debug)]
pub struct Registry {
    ids: IdIssuer,
    listeners: Arc<ListenerSet>,
    launches: Mutex<Vec<Arc<LaunchConfiguration>>>,
    settings: ModelSettings,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_settings(ModelSettings::default())
    }

    pub fn with_settings(settings: ModelSettings) -> Self {
        Self {
            ids: IdIssuer::new(),
            listeners: Arc::new(ListenerSet::default()),
            launches: Mutex::new(Vec::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn add_listener(&self, listener: Arc<dyn ModelListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ModelListener>) -> bool {
        self.listeners.remove(listener)
    }

    // ─────────────────────────────────────────────────────────
    // Launches
    // ─────────────────────────────────────────────────────────

    /// Start tracking a new external launch.
    ///
    /// With `auto_clear_terminated` set, terminated launches are purged first.
    pub fn create_launch_configuration(
        &self,
        handle: Arc<dyn LaunchHandle>,
        name: impl Into<String>,
    ) -> Arc<LaunchConfiguration> {
        if self.settings.launches.auto_clear_terminated {
            self.remove_terminated_launches();
        }

        let launch = LaunchConfiguration::new(
            self.ids.next_id(),
            name.into(),
            handle,
            self.ids.clone(),
            Arc::clone(&self.listeners),
        );
        self.launches.lock().push(Arc::clone(&launch));

        info!("Launch {} ({}) started", launch.id(), launch.name());
        self.listeners
            .publish(ModelEvent::LaunchConfigurationLaunched(Arc::clone(&launch)));
        launch
    }

    /// Snapshot of every launch, oldest first
    pub fn launch_configurations(&self) -> Vec<Arc<LaunchConfiguration>> {
        self.launches.lock().clone()
    }

    pub fn launch_configuration(&self, id: NodeId) -> Option<Arc<LaunchConfiguration>> {
        self.launches.lock().iter().find(|l| l.id() == id).cloned()
    }

    /// Most recent launch whose handle reports `launch_key`
    pub fn find_launch_configuration(&self, launch_key: &str) -> Option<Arc<LaunchConfiguration>> {
        self.launch_configurations()
            .into_iter()
            .rev()
            .find(|l| l.launch_key() == launch_key)
    }

    /// Like [`Registry::find_launch_configuration`], failing with [`Error::UnknownLaunch`]
    pub fn require_launch_configuration(
        &self,
        launch_key: &str,
    ) -> Result<Arc<LaunchConfiguration>> {
        self.find_launch_configuration(launch_key)
            .ok_or_else(|| Error::unknown_launch(launch_key))
    }

    /// Drop one launch regardless of its state
    pub fn remove_launch_configuration(&self, id: NodeId) -> Option<Arc<LaunchConfiguration>> {
        let removed = {
            let mut launches = self.launches.lock();
            let pos = launches.iter().position(|l| l.id() == id)?;
            launches.remove(pos)
        };
        debug!("Launch {} removed", id);
        self.listeners
            .publish(ModelEvent::LaunchConfigurationRemoved(Arc::clone(&removed)));
        Some(removed)
    }

    /// Drop every terminated launch, one removal event each. Returns how many.
    pub fn remove_terminated_launches(&self) -> usize {
        let terminated: Vec<NodeId> = self
            .launch_configurations()
            .iter()
            .filter(|l| l.is_terminated())
            .map(|l| l.id())
            .collect();
        if terminated.is_empty() {
            return 0;
        }

        let removed: Vec<Arc<LaunchConfiguration>> = {
            let mut launches = self.launches.lock();
            let (removed, kept) = std::mem::take(&mut *launches)
                .into_iter()
                .partition(|l| terminated.contains(&l.id()));
            *launches = kept;
            removed
        };

        debug!("Removed {} terminated launches", removed.len());
        for launch in &removed {
            self.listeners
                .publish(ModelEvent::LaunchConfigurationRemoved(Arc::clone(launch)));
        }
        removed.len()
    }
}
