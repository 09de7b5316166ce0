//! splitbuild - build orchestrator for split server/client component trees.
//!
//! Walks the module graph from an entry point, classifies modules by their
//! `"use client"` / `"use server"` directive, generates reference proxies for
//! every module crossing the boundary, bundles the client side with content
//! hashes and maintains scoped import-map entries that route boundary imports
//! to the proxies. Builds are skipped entirely when the decision hash of the
//! graph is unchanged.
//!
//! # Module Structure
//!
//! ```text
//! module/        # directive classifier, graph resolver, rate-limited fetch
//! boundary       # boundary scope extraction
//! codegen        # reference and proxy code generation
//! bundler/       # Bundler trait, esbuild collaborator, metafile parsing
//! orchestrator/  # build orchestration, snapshot, import-map updater
//! transform      # streaming path transform for the wire stream
//! reload/        # watch mode
//! ```

pub mod boundary;
pub mod bundler;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod error;
pub mod freshness;
pub mod logger;
pub mod module;
pub mod orchestrator;
pub mod reload;
pub mod transform;
pub mod utils;

pub use error::BuildError;
pub use orchestrator::{BuildHandle, BuildOptions, BuildOutcome, Orchestrator};
