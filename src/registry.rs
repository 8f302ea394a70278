use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::InitError;
use crate::gpio::GpioBackend;
use crate::properties::PropertySurface;

/// Parent node under which property groups are mounted, the analogue of
/// `/sys/dtmf`.
pub struct PropertyRegistry<B: GpioBackend> {
    groups: RwLock<FxHashMap<String, Arc<PropertySurface<B>>>>,
}

impl<B: GpioBackend> Default for PropertyRegistry<B> {
    fn default() -> Self {
        Self {
            groups: RwLock::new(FxHashMap::default()),
        }
    }
}

impl<B: GpioBackend> PropertyRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `surface` under its group name. The group stays mounted until
    /// the returned guard is removed or dropped.
    pub fn create_group(
        self: &Arc<Self>,
        surface: Arc<PropertySurface<B>>,
    ) -> Result<PropertyGroup<B>, InitError> {
        let name = surface.group().to_string();
        let mut groups = self.groups.write();
        if groups.contains_key(&name) {
            return Err(InitError::GroupCreationFailed(format!(
                "group {name} already exists"
            )));
        }
        groups.insert(name.clone(), surface);
        info!("mounted property group dtmf/{name}");

        Ok(PropertyGroup {
            registry: Arc::clone(self),
            name,
            mounted: AtomicBool::new(true),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<PropertySurface<B>>> {
        self.groups.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().keys().cloned().collect();
        names.sort();
        names
    }
}

pub struct PropertyGroup<B: GpioBackend> {
    registry: Arc<PropertyRegistry<B>>,
    name: String,
    mounted: AtomicBool,
}

impl<B: GpioBackend> PropertyGroup<B> {
    pub fn remove(&self) {
        if self.mounted.swap(false, Ordering::AcqRel) {
            self.registry.groups.write().remove(&self.name);
            info!("removed property group dtmf/{}", self.name);
        }
    }
}

impl<B: GpioBackend> Drop for PropertyGroup<B> {
    fn drop(&mut self) {
        self.remove();
    }
}
