//! Domain Layer - Core rules for the position lifecycle
//!
//! Pure types and logic with no I/O. Everything external goes through the
//! ports layer.
//!
//! - `pair`: feed snapshots and filters
//! - `position`: Position and the stop-loss / trailing-stop engine
//! - `sizing`: fixed-fraction position sizing
//! - `trade`: closed trade records
//! - `alert`: one-shot price alerts
//! - `asset`: the base currency
//! - `units`: base-unit conversions

pub mod alert;
pub mod asset;
pub mod pair;
pub mod position;
pub mod sizing;
pub mod trade;
pub mod units;

pub use alert::{AlertDirection, AlertError, PriceAlert};
pub use asset::{BaseAsset, NATIVE_SOL_MINT, USDC_MINT};
pub use pair::{PairFilter, PairSnapshot};
pub use position::{Position, PositionError, PositionSummary, StopPolicy, ThresholdUpdate, TickOutcome};
pub use sizing::{PositionSizer, SizingError};
pub use trade::{CloseReason, ClosedTrade};
pub use units::{from_base_units, to_base_units};
