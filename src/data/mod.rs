//! Record parsing, vocabulary management, and feature encoding.
//!
//! ## Submodules
//!
//! - [`vocab`] — bidirectional token↔index tables with reserved sentinels
//! - [`records`] — delimited record source, week grouping, validity checks
//! - [`encoder`] — per-event feature encoding: titles, snapshots, occupancy grids
//! - [`embedding`] — pretrained word-vector loading and vocabulary admission
//! - [`dataset`] — top-level dataset controller and class statistics

pub mod dataset;
pub mod embedding;
pub mod encoder;
pub mod records;
pub mod vocab;
