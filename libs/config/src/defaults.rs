//! Runtime defaults
//!
//! Default values used when a configuration file leaves a setting out.
//! Kept in one place so the runtime and the loader agree.

/// Stage defaults
pub mod stage {
    /// Name used for the stage when none is configured
    pub const NAME: &str = "default";

    /// Number of directory shards
    pub const DIRECTORY_BUCKETS: usize = 32;

    /// Expected directory capacity, used as the denominator of the fill ratio
    pub const DIRECTORY_CAPACITY: usize = 32_768;

    /// Attempts made by lookup-or-start before giving up on a contended address
    pub const REGISTRATION_ATTEMPTS: usize = 3;
}

/// Dispatcher defaults
pub mod dispatcher {
    /// Worker threads per available processor
    pub const POOL_FACTOR: f32 = 1.0;

    /// Messages delivered per mailbox turn before yielding the worker
    pub const THROTTLING: usize = 50;
}

/// Mailbox defaults
pub mod mailbox {
    /// Name of the unbounded queue mailbox
    pub const QUEUE: &str = "queue";

    /// Name of the bounded queue mailbox
    pub const BOUNDED: &str = "bounded";

    /// Bounded mailbox capacity
    pub const BOUNDED_CAPACITY: usize = 1024;

    /// Time a sender waits on a full blocking mailbox (milliseconds)
    pub const SEND_TIMEOUT_MS: u64 = 100;
}

/// Supervision defaults
pub mod supervision {
    /// First unhandled failure stops the actor
    pub const INTENSITY: i64 = 1;

    /// Tracking window for the default strategy (milliseconds)
    pub const PERIOD_MS: u64 = 5_000;

    /// Intensity value meaning "restart forever"
    pub const FOREVER_INTENSITY: i64 = -1;
}

/// Eviction defaults
pub mod eviction {
    /// Idle time after which an actor becomes an eviction candidate (milliseconds)
    pub const LRU_THRESHOLD_MS: u64 = 120_000;

    /// Directory fill ratio at which eviction scans start stopping actors
    pub const FILL_RATIO_HIGH_WATERMARK: f32 = 0.8;

    /// Interval between eviction scans (milliseconds)
    pub const INTERVAL_MS: u64 = 30_000;
}
