//! End to end tests running against a deployed firebooks service.
//! Enabled with `system_tests` feature, service url is taken from `FIREBOOKS_URL`.
