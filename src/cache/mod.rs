//! Persistent cache system for build-output and dependency-registry state
//!
//! Cache keys are content-addressed over the source tree plus build
//! configuration; volumes are name-addressed by (project, kind) and reused
//! across source changes. Builds sharing a build-output volume are
//! serialized by a per-volume execution lock.
//!
//! # Volume naming
//!
//! | Kind | Name | Scope |
//! |------|------|-------|
//! | BuildOutput | `{project}_cache` | one per project |
//! | Registry | `registry_cache` | global, shared |

pub mod key;
pub mod lock;
pub mod volume;

pub use key::{derive, CacheKey};
pub use lock::{BuildLock, BuildLockGuard};
pub use volume::{labels, CacheVolume, VolumeKind, VolumeStore};
