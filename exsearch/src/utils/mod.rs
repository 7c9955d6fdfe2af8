//! Utility functions for identifiers and timestamps.

mod ids;
pub mod timestamps;

pub use ids::{generate_uuid, generate_uuid_v7};
pub use timestamps::{
    add_duration, age_of, iso_timestamp, now_utc, parse_timestamp, seconds_to_duration, to_iso,
    Timestamp, TimestampError,
};
