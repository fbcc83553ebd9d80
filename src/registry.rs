//! Application Registry
//!
//! Concurrent mapping from app name to its descriptor. Registration may
//! happen before or after the scheduler starts; a dispatch lookup sees every
//! descriptor registered before the task was admitted (the registry lock is
//! the happens-before edge).
//!
//! Re-registering a name replaces the previous descriptor (last write wins).

use std::sync::{Mutex, MutexGuard};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::task::ResourceKind;

/// Immutable description of a registered app.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    /// Logical app name clients submit against.
    pub name: String,
    /// Overlay image reference a reconfigurable slot loads for this app.
    #[serde(default)]
    pub overlay: String,
    /// Kernel tag for runtime control collaborators; informational here.
    #[serde(default)]
    pub kernel: String,
    /// Engine family that serves this app natively.
    pub kind: ResourceKind,
}

impl AppDescriptor {
    /// Descriptor for a software-only app (no overlay, no kernel tag).
    pub fn cpu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overlay: String::new(),
            kernel: String::new(),
            kind: ResourceKind::Cpu,
        }
    }
}

/// Thread-safe name → descriptor map.
#[derive(Debug, Default)]
pub struct ApplicationRegistry {
    apps: Mutex<AHashMap<String, AppDescriptor>>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a descriptor under its name.
    pub fn register(&self, descriptor: AppDescriptor) {
        self.lock().insert(descriptor.name.clone(), descriptor);
    }

    /// Look up a descriptor by name.
    pub fn lookup(&self, name: &str) -> Option<AppDescriptor> {
        self.lock().get(name).cloned()
    }

    /// Number of registered apps.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, AHashMap<String, AppDescriptor>> {
        match self.apps.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, overlay: &str, kind: ResourceKind) -> AppDescriptor {
        AppDescriptor {
            name: name.to_string(),
            overlay: overlay.to_string(),
            kernel: String::new(),
            kind,
        }
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let reg = ApplicationRegistry::new();
        let d = desc("fft", "fft_slot0.bin", ResourceKind::Fft);
        reg.register(d.clone());
        assert_eq!(reg.lookup("fft"), Some(d));
        assert_eq!(reg.lookup("fir"), None);
    }

    #[test]
    fn reregister_replaces() {
        let reg = ApplicationRegistry::new();
        reg.register(desc("zip", "zip_v1.bin", ResourceKind::Zip));
        reg.register(desc("zip", "zip_v2.bin", ResourceKind::Zip));
        assert_eq!(reg.lookup("zip").unwrap().overlay, "zip_v2.bin");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_registration_is_safe() {
        use std::sync::Arc;
        use std::thread;

        let reg = Arc::new(ApplicationRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    for j in 0..50 {
                        reg.register(desc(
                            &format!("app-{}-{}", i, j),
                            "x.bin",
                            ResourceKind::Cpu,
                        ));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.len(), 400);
    }
}
