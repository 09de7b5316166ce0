//! Execution-side directive detection.
//!
//! A module declares its side with a leading string literal:
//!
//! ```text
//! "use client";   → Directive::Client
//! 'use server'    → Directive::Server
//! anything else   → Directive::Default
//! ```
//!
//! Only the first [`PROLOGUE_LEN`] bytes are inspected, enough to tell the
//! two literals apart from arbitrary code.

use serde::{Deserialize, Serialize};
use std::io;

/// Bytes of a module prologue needed to recognize a directive.
pub const PROLOGUE_LEN: usize = 11;

/// Execution side declared by a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directive {
    Client,
    Server,
    /// No directive; runs wherever its importer runs.
    #[default]
    Default,
    /// Prologue could not be read. Never equivalent to `Default`.
    Error,
}

impl Directive {
    #[inline]
    pub const fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }
}

/// Directive literals without their opening quote.
const DIRECTIVES: [(&str, Directive); 2] = [
    ("use client", Directive::Client),
    ("use server", Directive::Server),
];

/// Classify a module from its prologue bytes.
pub fn classify(prologue: &[u8]) -> Directive {
    let head = &prologue[..prologue.len().min(PROLOGUE_LEN)];
    let Ok(text) = std::str::from_utf8(head) else {
        return Directive::Default;
    };
    let Some(body) = text.trim().strip_prefix(['"', '\'']) else {
        return Directive::Default;
    };

    DIRECTIVES
        .iter()
        .find(|(literal, _)| body.starts_with(literal))
        .map_or(Directive::Default, |(_, directive)| *directive)
}

/// Classify the outcome of a prologue read; read failures are `Error`.
pub fn classify_read(read: io::Result<Vec<u8>>) -> Directive {
    read.map_or(Directive::Error, |bytes| classify(&bytes))
}
