//! Cross-module tests
//!
//! Pipeline-level scenarios driven through scripted collaborators.

mod support;
