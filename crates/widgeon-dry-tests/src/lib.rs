// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for widgeon crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - Settings documents held in memory, with load/save counters
//! - [`source`] - In-memory widget directories with call counters
//! - [`session`] - Session store whose clones share state
//! - [`templates`] - `{{ key }}` templates keyed by path
//! - [`fixtures`] - `hello_world`, `asset_test`, `counter` and `pager` widgets

pub mod config;
pub mod fixtures;
pub mod session;
pub mod source;
pub mod templates;

pub use config::InMemoryConfigStore;
pub use fixtures::{
    fixture_registry, fixture_registry_with, fixture_source, fixture_templates, fixture_types, map,
    TEST_SECRET,
};
pub use session::MemorySession;
pub use source::InMemoryWidgetSource;
pub use templates::MemoryTemplates;
