//! Cross-component tests for the safety core.
