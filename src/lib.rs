//! Editdesk: an editorial pipeline engine.
//!
//! Manuscripts move through a fixed sequence of editorial stages. Each
//! stage hands the current text (and, after acquisitions, the Series Bible)
//! to an [`agent::EditorialAgent`] and stores what comes back. The
//! [`workflow`] state machine decides which stage may run next; the
//! [`storage`] layer keeps one directory per project; [`desk::Desk`] is
//! the entry point tying them together.

pub mod agent;
pub mod config;
pub mod desk;
pub mod diff;
pub mod model;
pub mod report;
pub mod storage;
pub mod workflow;
