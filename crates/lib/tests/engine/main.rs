//! End-to-end tests driving the engine over the `vizor` fixture workspace.

mod build_tests;
mod common;
mod compose_tests;
mod plan_tests;
