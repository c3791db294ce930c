//! Pure domain logic for the ingest pipeline: tire position resolution,
//! threshold evaluation, the tire-API request signer, and per-vehicle log
//! routing. No I/O lives here — everything is deterministic and unit-tested
//! directly.

mod cleanup;
mod logging;
mod position;
mod sign;
mod thresholds;

pub use cleanup::{clean_surrogates, EXPANSION_WINDOWS_DAYS};
pub use logging::vehicle_span;
pub use position::{resolve_position, ResolvedPosition};
pub use sign::sign;
pub use thresholds::{evaluate_load_alerts, evaluate_sensor_alerts, gps_timeout_minutes, psi_to_bar};
