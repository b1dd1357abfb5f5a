//! # Notevault Testkit
//!
//! Testing utilities for notevault.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed inputs with expected outputs for key
//!   derivation, field decryption, content hashing and PIN sessions, so
//!   other implementations can check they interoperate
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Single-device fixtures and multi-device clusters sharing
//!   one in-memory relay
//!
//! ## Golden Vectors
//!
//! ```rust,no_run
//! use notevault_testkit::vectors::{phrase_vectors, verify_all_vectors};
//!
//! for vector in phrase_vectors() {
//!     println!("{} -> {}", vector.phrase, vector.identity_id);
//! }
//! verify_all_vectors().unwrap();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use notevault_testkit::generators::{record_from_params, NoteParams};
//!
//! proptest! {
//!     #[test]
//!     fn generated_records_validate(params: NoteParams) {
//!         let fixture = TestFixture::with_seed(1);
//!         let record = record_from_params(&params, fixture.identity()).unwrap();
//!         prop_assert!(validate_record(&record, None).is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use notevault_testkit::fixtures::Cluster;
//!
//! async fn example() {
//!     let cluster = Cluster::new(2).await;
//!     let laptop = cluster.device(0);
//!     laptop.notebook.create_note("t", "hello", None).await.unwrap();
//!     laptop.notebook.sync_now().await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_identity_fixtures, Cluster, Device, TestFixture};
pub use generators::{record_from_params, NoteParams};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVectors};
