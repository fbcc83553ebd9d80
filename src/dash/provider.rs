//! Provider Registry
//!
//! A provider declares that some `(op, engine kind, instance)` triple can
//! serve an operation, with a preference priority (0 = most preferred,
//! typically hardware; higher = fallback, typically CPU). The registry keeps
//! providers totally ordered by `(op, priority, kind, instance_id)`, so the
//! first entry for an operation decides the resource kind a new task asks
//! for.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::task::ResourceKind;

/// A declaration that an engine kind can serve an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Operation name ("zip", "fft", …).
    pub op: String,
    /// Engine family that serves it.
    pub kind: ResourceKind,
    /// Informative instance tag; scheduling routes by kind.
    #[serde(default)]
    pub instance_id: u32,
    /// Lower is preferred.
    #[serde(default)]
    pub priority: i32,
}

impl Provider {
    fn sort_key(&self) -> (&str, i32, ResourceKind, u32) {
        (&self.op, self.priority, self.kind, self.instance_id)
    }
}

/// Thread-safe, order-maintaining provider table.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Mutex<Vec<Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a provider, keeping the table sorted.
    pub fn register(&self, provider: Provider) {
        let mut providers = self.lock();
        providers.push(provider);
        providers.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    /// Ordered providers for an operation (most preferred first).
    pub fn providers_for(&self, op: &str) -> Vec<Provider> {
        self.lock().iter().filter(|p| p.op == op).cloned().collect()
    }

    /// Kind of the most preferred provider, if any.
    pub fn preferred_kind(&self, op: &str) -> Option<ResourceKind> {
        self.lock().iter().find(|p| p.op == op).map(|p| p.kind)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Provider>> {
        match self.providers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(op: &str, kind: ResourceKind, instance_id: u32, priority: i32) -> Provider {
        Provider {
            op: op.to_string(),
            kind,
            instance_id,
            priority,
        }
    }

    #[test]
    fn providers_sorted_by_priority_then_kind_then_instance() {
        let reg = ProviderRegistry::new();
        reg.register(p("fft", ResourceKind::Cpu, 0, 10));
        reg.register(p("fft", ResourceKind::Fft, 1, 0));
        reg.register(p("fft", ResourceKind::Fft, 0, 0));
        reg.register(p("zip", ResourceKind::Zip, 0, 0));

        let fft = reg.providers_for("fft");
        assert_eq!(fft.len(), 3);
        assert_eq!(fft[0].instance_id, 0);
        assert_eq!(fft[1].instance_id, 1);
        assert_eq!(fft[2].kind, ResourceKind::Cpu);

        // Head of the list has the minimum priority.
        assert!(fft.iter().all(|q| fft[0].priority <= q.priority));
    }

    #[test]
    fn preferred_kind_prefers_hardware() {
        let reg = ProviderRegistry::new();
        reg.register(p("fft", ResourceKind::Cpu, 0, 10));
        reg.register(p("fft", ResourceKind::Fft, 0, 0));
        assert_eq!(reg.preferred_kind("fft"), Some(ResourceKind::Fft));
        assert_eq!(reg.preferred_kind("fir"), None);
    }

    #[test]
    fn unknown_op_is_empty() {
        let reg = ProviderRegistry::new();
        assert!(reg.providers_for("nope").is_empty());
    }
}
