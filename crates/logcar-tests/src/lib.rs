//! LogCar test infrastructure
//!
//! An in-process stand-in for the platform: a capture sink plays the role of
//! the deployment log collector and an in-memory index answers the same
//! filter queries the backboard endpoint would.

pub mod harness;

#[cfg(test)]
mod integration;
