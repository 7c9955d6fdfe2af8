//! Cooperative cancellation for request-scoped work.
//!
//! A request handler owns a [`CancellationToken`] and cancels it when the
//! caller disconnects. Suspension points (the wait-for-downloadable loop)
//! race their sleeps against [`CancellationToken::cancelled`].

mod token;

pub use token::CancellationToken;
