//! Telegram front end for the media relay.
//!
//! The relay logic lives in `relaycore`; this crate wires it to Telegram and
//! provides the command-line entry points.

pub mod cli;
pub mod telegram;
