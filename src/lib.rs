//! The backend for Cadence, a rehearsal scheduler for bands.
//!
//! Bands schedule one-off or recurring rehearsals, members RSVP to them,
//! and everything is exposed through a GraphQL API (see [`graphql`]).

pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod graphql;
pub mod models;
pub mod util;
