//! MagSurvey - field survey data engine
//!
//! Magnetometer site surveys ahead of drone light shows: operators walk a
//! site, each reading is fused with a GNSS fix, classified against the
//! mission's reference field and stored for the heatmap. Restricted airspace
//! layers flag points and planned areas inside no-fly zones, and an offline
//! tile cache keeps the map usable without connectivity.
//!
//! # Modules
//!
//! - [`mission`]: mission parameters and the registry owning each mission's store
//! - [`fusion`]: reading + position fix → [`measurement::MeasurementSample`]
//! - [`classify`]: sample → severity-tagged [`measurement::MeasurementPoint`]
//! - [`zones`]: GeoJSON restricted-zone index
//! - [`store`]: append-only point store with copy-on-write snapshots
//! - [`survey`]: live pipeline wiring the above together
//! - [`tiles`]: offline map tile cache
//! - [`export`]: GeoJSON export of a snapshot
//! - [`nmea`], [`ubx`]: position fixes from external GNSS receivers (GGA/RMC/GSA, UBX NAV-PVT)
//! - [`coord`], [`geodesy`]: Web Mercator tiles and great-circle math
//! - [`config`]: INI configuration file
//! - [`logging`]: tracing subscriber for binaries

pub mod classify;
pub mod config;
pub mod coord;
pub mod export;
pub mod fusion;
pub mod geodesy;
pub mod logging;
pub mod measurement;
pub mod mission;
pub mod nmea;
pub mod store;
pub mod survey;
pub mod tiles;
pub mod ubx;
pub mod zones;
