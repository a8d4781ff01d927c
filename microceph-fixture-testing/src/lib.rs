//! Testing helpers for use writing unit and integration tests of the `microceph-fixture` crate
//!
//! This is internal to `microceph-fixture` and is not intended for use by any other crates.
//! Breaking changes can be made at any time.
pub mod fakes;
pub mod logging;

/// Test code that reports errors can just cheat and use `eyre`
pub type Result<T> = color_eyre::Result<T>;
