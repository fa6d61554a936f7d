pub mod clock;
pub mod config;
pub mod dst;
pub mod error;
pub mod identity;
pub mod lane;
pub mod observability;
pub mod pacing;
pub mod protocol;
pub mod records;
pub mod remote;
pub mod sharding;
pub mod state;
pub mod streams;
pub mod sync;

pub use clock::{SimulatedClock, SyncClock, SystemClock};
pub use config::{ConfigError, RateLimitConfig, TapConfig};
pub use error::{SyncError, TapError};
pub use lane::{CredentialLane, LaneStats};
pub use pacing::{FixedIntervalPacer, NoopPacer, Pacer};
pub use protocol::{Catalog, Emitter, ExportError};
pub use remote::{ClientFactory, RemoteDataClient, RemoteError};
pub use state::{State, WatermarkStore};
pub use streams::StreamKind;
pub use sync::{SyncEngine, SyncReport};
