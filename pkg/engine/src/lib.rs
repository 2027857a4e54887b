//! Ephemeral lease engine.
//!
//! Admits or rejects new leases under contention, reconciles the provider's
//! live view with the local cache, enforces lease lifetimes with bounded
//! extensions, and deletes leases with best-effort notification.

pub mod admission;
pub mod cancel;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod names;
pub mod notifier;
pub mod reconcile;

pub use admission::{AdmissionController, AdmissionLimits, AdmissionPermit, AdmissionState};
pub use cancel::{CancelHandle, CancelSignal};
pub use config::EngineConfig;
pub use error::{CreateOutcome, LeaseError};
pub use lifecycle::{LeaseManager, LeaseView};
pub use names::{CodenameGenerator, NameAllocator, NameGenerator, ScriptedNames};
pub use notifier::{LogNotifier, Notification, Notifier, RecordingNotifier};
pub use reconcile::{ReconcileReport, Reconciler};
