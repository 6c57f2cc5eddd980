use crate::util::CancellationToken;

/// Knobs for one extraction run
#[derive(Clone, Debug)]
pub struct Settings {
    /// Fan events out to the visitors through per-visitor pipelines on a worker pool
    ///
    /// When this is off, every visitor is called synchronously on the extraction thread.
    pub parallel: bool,

    /// Decode the backward trace on a background thread
    pub pipelined: bool,

    /// Number of instances buffered between the background reader and the extraction loop
    pub pipeline_capacity: usize,

    /// Number of instances whose events are batched into one stamp before being fanned out
    pub stamp_instances: usize,

    /// Maximum number of events buffered for a single visitor pipeline
    ///
    /// Once a pipeline is this far behind, whoever is producing events for it helps draining it
    /// (or blocks) before adding more.
    pub max_buffered_events: u32,

    /// Size of the fan-out worker pool
    pub worker_threads: usize,

    /// How many instances are processed between two looks at the cancellation token
    pub cancellation_check_interval: u64,

    /// Signalled from the outside to stop a run early
    pub cancellation: CancellationToken,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            parallel: false,
            pipelined: false,
            pipeline_capacity: 1 << 16,
            stamp_instances: 1 << 10,
            max_buffered_events: 1 << 16,
            worker_threads: num_cpus::get(),
            cancellation_check_interval: 1 << 16,
            cancellation: CancellationToken::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
