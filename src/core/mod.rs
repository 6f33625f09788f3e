pub mod copier;
pub mod counter;
pub mod hardware;
pub mod lifecycle;
pub mod monitor;
pub mod notifications;
pub mod sampler;
pub mod transfer_engine;
pub mod verifier;
pub mod volume;

pub use copier::{CopyOrchestrator, CopyOutcome};
pub use counter::{CounterError, CounterStore, CounterUpdate};
pub use hardware::{MountEntry, VolumeAdapter};
pub use lifecycle::{VolumeChanges, diff};
pub use monitor::{Monitor, MonitorState, TickReport};
pub use notifications::{Notification, NotificationChannel, NotificationKind, Notifier};
pub use sampler::{SampleError, VolumeSampler};
pub use verifier::{VerifyResult, verify_from_hashes};
pub use volume::{VolumeId, VolumeIdError, VolumeSet};
