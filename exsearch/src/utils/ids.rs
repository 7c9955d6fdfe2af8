//! Identifier generation.

use uuid::Uuid;

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a new UUID v7 (time-ordered).
///
/// Task ids use v7 so that ids sort in creation order.
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}
