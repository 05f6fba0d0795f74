//! # UVHero Core Library
//!
//! This library provides the core logic for UVHero, a wearable UV exposure
//! tracker. A two-channel sensor (outer side of a parasol or hat, inner side
//! next to the skin) streams readings; the core turns them into daily
//! exposure gauges, streak badges and a per-city UV forecast. The `uvhero`
//! CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Sensor**: payload decoding, windowed max aggregation and prevention
//!   counting, fed through a message channel
//! - **Gauges**: pure scoring of a day's records into four 0–3 levels
//! - **Daily**: the once-a-day rollover into summaries, retention and badges
//! - **Forecast**: OpenUV fetches and day-scoped fixed maxima per city
//! - **Storage**: SQLite persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`WindowAggregator`]: running maxima committed as bucket records
//! - [`DailyRollover`]: daily fold of records into a [`DailySummary`]
//! - [`BadgeEvaluator`]: idempotent streak badges
//! - [`FixedValueCache`]: per-city fixed values that expire at local midnight
//! - [`Database`]: durable store shared as a [`SharedDb`]

pub mod clock;
pub mod daily;
pub mod error;
pub mod events;
pub mod forecast;
pub mod gauge;
pub mod sensor;
pub mod storage;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use daily::{
    display_levels, Badge, BadgeEvaluator, BadgeKind, DailyRollover, DailySummary,
    DisplayLevels, LevelSource, RolloverOutcome, RolloverPolicy,
};
pub use error::{ConfigError, CoreError, DatabaseError, FetchError, ValidationError};
pub use events::Event;
pub use forecast::{
    FixedValue, FixedValueCache, ForecastService, UvForecastClient, UvReading, UvSource,
};
pub use gauge::{Advice, GaugeLevels};
pub use sensor::{AggregatedRecord, Ingestor, PreventionDetector, Sample, WindowAggregator};
pub use storage::{Config, Database, SharedDb};
pub use window::ActiveWindow;
