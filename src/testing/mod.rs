//! Shared fixtures for unit tests.
//!
//! ```text
//!                 dc1 (datacenter)
//!        ┌─────────────┼─────────────┐
//!      rack1         rack2         rack3
//!    s1 s2 s3      s4 s5 s6       s7 s8
//! ```
//!
//! `dc_policy` places two primary racks and one secondary rack per region;
//! `rack_policy` places one primary and one secondary server.
//!
//! The deep fixture adds a level above the datacenters:
//!
//! ```text
//!                    r (region)
//!            ┌────────────┴────────────┐
//!           dc1                       dc2
//!      ┌─────┴─────┐                   │
//!    rackA       rackB               rackC
//!    s1 s2       s3 s4               s5 s6
//! ```

mod fixtures;

pub(crate) use fixtures::*;
