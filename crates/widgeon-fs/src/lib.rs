// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem adapters for widgeon: widget directories, templates and the
//! settings store (uses the platform config dir).
#![forbid(unsafe_code)]

mod config;
mod source;
mod templates;

pub use config::FsConfigStore;
pub use source::FsWidgetSource;
pub use templates::FsTemplateEngine;

use std::io;

use widgeon_core::SourceError;

fn source_error(err: io::Error) -> SourceError {
    if err.kind() == io::ErrorKind::NotFound {
        SourceError::NotFound
    } else {
        SourceError::Io(err)
    }
}
