//! In-process integration coverage for the full reconcile path: a real
//! `ReleaseManager`/`ManagerFactory` and a tempdir chart, driven against a
//! scripted mock API server instead of a live cluster. Grounded on the same
//! `tower_test::mock::pair` harness the operator crate's own unit tests use.
