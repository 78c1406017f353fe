//! Throttled remote enrichment of fixes: speed limits and street addresses.

pub mod geocode;
pub mod mock;
pub mod nominatim;
pub mod sequence;
pub mod speed_limit;
pub mod throttle;

pub use geocode::{GeocodeError, Geocoder, LocationInfo, Placemark, ReverseGeocodeLookup};
pub use sequence::{RequestSequence, RequestToken};
pub use speed_limit::{
    SpeedLimitLookup, SpeedLimitRecord, SpeedLimitResolver, SpeedLimitSource, parse_maxspeed,
};
pub use throttle::{ThrottleConfig, ThrottleGate, ThrottleState};
