//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters. All tests run on the host with no real
//! hardware required.

mod app_service_tests;
mod mock_hw;
mod peripheral_flow_tests;
