//! Device backends
//!
//! Implementations of `sdk::ActionDispatcher`: a real Android device over
//! adb, and a recording backend for dry runs and tests.

pub mod adb;
pub mod recording;

pub use adb::{Adb, AdbAppScanner, AdbDispatcher};
pub use recording::RecordingDispatcher;
