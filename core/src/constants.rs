/// Length prefix of every frame: 4-byte big-endian u32.
pub const FRAME_PREFIX_LEN: usize = 4;

/// Sanity bound on a single JSON frame (1 GiB).
/// A prefix above this is treated as a desynchronized stream.
pub const MAX_FRAME_LEN: usize = 1 << 30;

/// Largest buffer reserved ahead of a body read (1 MiB).
pub const READ_PREALLOC_LIMIT: usize = 1 << 20;

/// Image and video payloads are always RGB, one byte per channel.
pub const IMAGE_CHANNELS: u32 = 3;

/// Marker prepended to every sideband response line on stdout.
pub const SIDEBAND_PREFIX: &str = "skjson";

/// Capacity of every pipeline queue (task, compute, egress).
/// Producers block until the consumer drains the previous message.
pub const QUEUE_CAPACITY: usize = 1;

/// Watchdog polling interval when none is configured.
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 1_000;

/// Upper bound on tasks submitted to the pipeline but not yet acknowledged.
pub const DEFAULT_MAX_OPEN_TASKS: usize = 4;

/// Hard cap on lanes picked by `PipelineProfile::dynamic`.
pub const DEFAULT_LANE_CAP: usize = 8;

/// Name of the transform used when the config does not pick one.
pub const DEFAULT_TRANSFORM: &str = "identity";

/// Environment variables read by `WorkerConfig::from_env`.
pub mod env {
    pub const CONFIG_PATH: &str = "SKYHOOK_WORKER_CONFIG";
    pub const MODE: &str = "SKYHOOK_MODE";
    pub const TRANSFORM: &str = "SKYHOOK_TRANSFORM";
    pub const LANES: &str = "SKYHOOK_LANES";
}

/// Process exit codes, one per fatal error family.
pub mod exit_codes {
    pub const GENERIC: u8 = 1;
    pub const CODEC: u8 = 2;
    pub const PROTOCOL: u8 = 3;
    pub const TRANSFORM: u8 = 4;
    pub const LANE_FAILURE: u8 = 5;
    pub const CONFIG: u8 = 6;
}
