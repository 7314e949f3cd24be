//! Integration tests for Sumi-Harvest
//!
//! These tests use wiremock to stand in for harvested sites and rendering
//! services, and run full pipelines and coordinated runs against them.

mod common;
mod config_tests;
mod coordinator_tests;
mod pipeline_tests;
