//! Cross-module scenario tests driving the full weekly schedule.

mod helpers;
mod infrastructure_tests;
