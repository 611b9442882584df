// Copyright 2026 Parcelscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Parcelscope library — headless retrieval of municipal
//! property-assessment records.
//!
//! The core flow drives a cascading assessor search form (region → street
//! → address number) in a real browser and extracts a best-effort
//! structured record from the response page. See `assessor` for the flow,
//! `renderer` for the browser seam, and `rest` for the HTTP surface.

pub mod assessor;
pub mod config;
pub mod error;
pub mod quote;
pub mod renderer;
pub mod rest;
