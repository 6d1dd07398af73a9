//! modsync Test - Shared test utilities for the module map synchronizer.
//!
//! Mock fetchers, loaders, metrics sinks and an in-memory filesystem, plus
//! module map fixtures.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! modsync-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use modsync_test::{MockFetcher, MockLoader, TEST_ROOT, module_map};
//!
//! let fetcher = MockFetcher::new().with_map(module_map(&[(TEST_ROOT, "1.0.0")]));
//! let loader = MockLoader::new();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
