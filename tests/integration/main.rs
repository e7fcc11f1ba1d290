//! Integration tests
//!
//! `api_tests` drive the router in process over the in-memory store.
//! `store_tests` need PostgreSQL: `DATABASE_URL=... cargo test -- --ignored`

mod api_tests;
mod store_tests;
