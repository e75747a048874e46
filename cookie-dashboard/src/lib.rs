/// Cookie Dashboard - Shared Library
///
/// This library provides the data synchronisation layer behind the
/// `cookie-dashboard` terminal:
/// - Snapshot types matching the metrics endpoint's JSON
/// - Polling controller with hour-bucketed fallback cache
/// - Per-metric value animators driving every displayed number
/// - Ratatui panels consuming the published state
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{ChartPoint, ChartTime, PnlClass, PnlLine, Snapshot};

pub use shared::error::{FetchError, StorageError};

pub use shared::derived::{format_title, DerivedMetrics};

pub use shared::cache::{
    hour_bucket, Clock, HourlyCache, JsonFileStore, KeyValueStore, MemoryStore, SystemClock,
};

pub use shared::animator::{
    ease_out_quad, AnimationState, DisplayedValues, MetricAnimators, SharedAnimator,
    ValueAnimator,
};

pub use shared::source::{HttpSource, SnapshotSource};

pub use shared::poller::{
    DashboardState, OverlapPolicy, PollerConfig, PollerHandle, PollingController, SnapshotOrigin,
};

pub use shared::widget::{render_dashboard, ChartTrend, RiskLevel};
