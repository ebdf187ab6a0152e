pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::{ClusterError, ClusterResult};
pub use models::{
    ClusterNode, JobDefinition, JobHistoryEntry, JobOutcome, JobResult, LockMode, NodeDescriptor,
    NodeStateEntry, NodeStatus, PreferenceNode, QueueItem, ScheduleDefinition, ScheduleEntry,
    SessionEvent, TriggerMessage, TriggerSource, WatchEvent, WatchKind,
};
pub use traits::{
    CoordinationClient, DistributedLock, JobContext, JobHistory, JobProvider, LockService,
    PreferencesService, QueueService, StatePublisher,
};
