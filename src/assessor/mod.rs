//! Assessor-form automation: control discovery, option matching, cascade
//! driving, and record extraction.
//!
//! The flow for one lookup: enumerate the page's dropdowns and classify
//! their roles ([`controls`]), resolve the caller's free text against each
//! dropdown's live options ([`matcher`]), apply the selections in
//! dependency order and submit ([`driver`]), then read the response page
//! into a best-effort record ([`extract`]). [`session`] owns the browser
//! context around all of it.

pub mod controls;
pub mod driver;
pub mod extract;
pub mod matcher;
pub mod session;

pub use extract::PropertyRecord;
pub use session::{fetch_property_record, PropertyQuery};
