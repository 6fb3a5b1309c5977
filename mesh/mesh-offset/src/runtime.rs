//! Process-wide worker pool.
//!
//! Offset requests run their data-parallel stages on a dedicated rayon
//! pool. [`initialize`] builds it once; concurrent callers race on a lock
//! and exactly one of them creates the pool. Pipelines call [`initialize`]
//! implicitly with defaults if nobody did so first.
//!
//! # Example
//!
//! ```
//! use mesh_offset::runtime::{self, RuntimeConfig};
//!
//! runtime::initialize(&RuntimeConfig::default().with_num_threads(2)).unwrap();
//! assert!(runtime::is_initialized());
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use rayon::ThreadPool;
use tracing::{debug, info};

use crate::error::{OffsetError, OffsetResult};

/// Global pool, `None` until initialized or after shutdown.
static RUNTIME: RwLock<Option<Arc<ThreadPool>>> = RwLock::new(None);

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Worker threads; `0` lets rayon pick from the available cores.
    pub num_threads: usize,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            thread_name_prefix: "mesh-offset".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Set the worker count.
    #[must_use]
    pub const fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }
}

/// Build the worker pool if it does not exist yet.
///
/// Returns `true` if this call created the pool and `false` if it already
/// existed, in which case `config` is ignored.
///
/// # Errors
///
/// Returns [`OffsetError::Runtime`] if the pool cannot be built.
pub fn initialize(config: &RuntimeConfig) -> OffsetResult<bool> {
    let mut slot = RUNTIME.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        debug!("Runtime already initialized");
        return Ok(false);
    }

    let prefix = config.thread_name_prefix.clone();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .thread_name(move |i| format!("{prefix}-{i}"))
        .build()
        .map_err(|e| OffsetError::Runtime(e.to_string()))?;

    info!("Runtime initialized with {} worker threads", pool.current_num_threads());
    *slot = Some(Arc::new(pool));
    Ok(true)
}

/// Drop the worker pool.
///
/// Pipelines already holding the pool finish on it. Returns `true` if a
/// pool was dropped.
pub fn shutdown() -> bool {
    let mut slot = RUNTIME.write().unwrap_or_else(PoisonError::into_inner);
    let dropped = slot.take().is_some();
    if dropped {
        info!("Runtime shut down");
    }
    dropped
}

/// Whether the worker pool exists.
#[must_use]
pub fn is_initialized() -> bool {
    RUNTIME
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

/// The worker pool, built with defaults on first use.
pub(crate) fn current() -> OffsetResult<Arc<ThreadPool>> {
    loop {
        if let Some(pool) = RUNTIME
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(pool));
        }
        initialize(&RuntimeConfig::default())?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_initializes_lazily() {
        let pool = current().unwrap();
        assert!(pool.current_num_threads() >= 1);
        assert!(is_initialized());
        // A second explicit initialize is a no-op
        assert!(!initialize(&RuntimeConfig::default()).unwrap());
    }

    #[test]
    fn config_builder() {
        let config = RuntimeConfig::default().with_num_threads(3);
        assert_eq!(config.num_threads, 3);
        assert_eq!(config.thread_name_prefix, "mesh-offset");
    }
}
