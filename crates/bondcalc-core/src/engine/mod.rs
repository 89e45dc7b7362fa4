//! # Engine Module
//!
//! The stateful, concurrent half of bondcalc: everything that turns submitted jobs into
//! results.
//!
//! ## Overview
//!
//! A caller submits [`job::Job`]s to a [`calculator::BondCalculator`]. Calculator workers bind
//! each job to an idle [`sequence::BondSequence`] and place its atoms; extractor workers copy
//! the requested outputs out of the finished sequence, return it to the idle queue, and hand
//! the job on to whichever downstream stages it still needs. Every finished job ends up in a
//! [`result::ResultStore`] keyed by its ticket.
//!
//! ## Architecture
//!
//! - **Jobs and Results** ([`job`], [`result`]) - Tickets, request masks and move-only results
//! - **Pools** ([`pool`]) - Blocking FIFO pools for sequences, jobs and map segments
//! - **Bond Sequences** ([`sequence`], [`sequence_handler`]) - The per-conformation state
//!   machine and the queues that circulate sequences between workers
//! - **Torsion Space** ([`torsion`], [`sampler`]) - How sampled coordinates become torsion
//!   deltas
//! - **Stages** ([`stages`], [`map_sum`]) - Surface area, force-field scoring and the
//!   per-element map fan-in
//! - **Configuration** ([`config`]) - Thread counts, depth limits and per-stage settings
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Lifecycle and configuration errors

pub mod calculator;
pub mod config;
pub mod error;
pub mod job;
pub mod map_sum;
pub mod pool;
pub mod progress;
pub mod result;
pub mod sampler;
pub mod sequence;
pub mod sequence_handler;
pub mod stages;
pub mod torsion;
pub(crate) mod workers;
