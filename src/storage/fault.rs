//! Fault Injection
//!
//! TigerStyle: Deterministic, seeded fault injection for the simulation
//! backend. Same seed, same faults.

use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Backend operation class a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Any `ensure_*` call
    ProvisionFail,
    /// Table list/get
    TableReadFail,
    /// Table insert/replace/delete
    TableWriteFail,
    /// Blob get
    BlobReadFail,
    /// Blob put/delete
    BlobWriteFail,
    /// Queue send/receive/delete
    QueueFail,
    /// Share file put/get
    ShareFail,
}

/// One fault rule.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Operation class
    pub fault_type: FaultType,
    /// Probability in `[0.0, 1.0]` that a matching call fails
    pub probability: f64,
    /// Stop injecting after this many faults
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a fault rule.
    ///
    /// # Panics
    /// Panics if `probability` is outside `[0.0, 1.0]`.
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1], got {probability}"
        );
        Self {
            fault_type,
            probability,
            max_injections: None,
        }
    }

    /// Limit the number of injected faults.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        self.max_injections = Some(max);
        self
    }
}

#[derive(Debug)]
struct InjectorState {
    rng: ChaCha8Rng,
    injected: Vec<u64>,
}

/// Decides, deterministically from a seed, whether a call should fail.
#[derive(Debug)]
pub struct FaultInjector {
    seed: u64,
    faults: Vec<FaultConfig>,
    state: Mutex<InjectorState>,
}

impl FaultInjector {
    /// Injector that never fails anything.
    #[must_use]
    pub fn disabled() -> Self {
        FaultInjectorBuilder::new(0).build()
    }

    /// Start building an injector from `seed`.
    #[must_use]
    pub fn builder(seed: u64) -> FaultInjectorBuilder {
        FaultInjectorBuilder::new(seed)
    }

    /// Seed the injector was built from.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Whether a call of class `fault_type` should fail now.
    pub fn should_inject(&self, fault_type: FaultType) -> bool {
        if self.faults.is_empty() {
            return false;
        }
        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        for (index, fault) in self.faults.iter().enumerate() {
            if fault.fault_type != fault_type {
                continue;
            }
            if fault
                .max_injections
                .is_some_and(|max| state.injected[index] >= max)
            {
                continue;
            }
            if state.rng.gen_bool(fault.probability) {
                state.injected[index] += 1;
                tracing::debug!(?fault_type, seed = self.seed, "Injecting fault");
                return true;
            }
        }
        false
    }

    /// Total number of faults injected so far.
    #[must_use]
    pub fn injected_count(&self) -> u64 {
        self.state
            .lock()
            .map(|state| state.injected.iter().sum())
            .unwrap_or(0)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Builder for [`FaultInjector`].
#[derive(Debug)]
pub struct FaultInjectorBuilder {
    seed: u64,
    faults: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            faults: Vec::new(),
        }
    }

    /// Add a fault rule.
    #[must_use]
    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.faults.push(fault);
        self
    }

    /// Build the injector.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let injected = vec![0; self.faults.len()];
        FaultInjector {
            seed: self.seed,
            faults: self.faults,
            state: Mutex::new(InjectorState {
                rng: ChaCha8Rng::seed_from_u64(self.seed),
                injected,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_injects() {
        let injector = FaultInjector::disabled();
        for _ in 0..100 {
            assert!(!injector.should_inject(FaultType::TableWriteFail));
        }
        assert_eq!(injector.injected_count(), 0);
    }

    #[test]
    fn test_certain_fault_respects_max() {
        let injector = FaultInjector::builder(7)
            .with_fault(FaultConfig::new(FaultType::QueueFail, 1.0).with_max_injections(2))
            .build();

        assert!(injector.should_inject(FaultType::QueueFail));
        assert!(injector.should_inject(FaultType::QueueFail));
        assert!(!injector.should_inject(FaultType::QueueFail));
        assert!(!injector.should_inject(FaultType::TableReadFail));
        assert_eq!(injector.injected_count(), 2);
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let run = |seed| {
            let injector = FaultInjector::builder(seed)
                .with_fault(FaultConfig::new(FaultType::BlobWriteFail, 0.5))
                .build();
            (0..64)
                .map(|_| injector.should_inject(FaultType::BlobWriteFail))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    #[should_panic(expected = "probability")]
    fn test_invalid_probability() {
        let _ = FaultConfig::new(FaultType::ShareFail, 1.5);
    }
}
