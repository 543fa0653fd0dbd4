pub mod api;
pub mod auth;
pub mod cell;
pub mod covering;
pub mod error;
pub mod geo;
pub mod ids;
pub mod model;
pub mod time;
pub mod version;
pub mod volume;

pub use api::*;
pub use auth::{Caller, Capability};
pub use cell::CellId;
pub use covering::{CellUnion, Coverer};
pub use error::{ConflictResponse, DssError, DssResult, ErrorKind};
pub use geo::{Footprint, GeoCircle, GeoPolygon, LatLng, parse_area};
pub use ids::*;
pub use model::*;
pub use crate::time::{Clock, FixedClock, SystemClock, Timestamp};
pub use version::{OvnKey, Version};
pub use volume::{Extent, TimePolicy, Volume3d, Volume4d};
