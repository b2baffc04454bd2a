//! Storage backend implementations.
//!
//! Concrete implementations of the repository trait defined in
//! `veds_core::storage`. The DynamoDB backend is the production store; the
//! in-memory backend mirrors its conditional-write semantics for tests and
//! local development and must never be pointed at by a deployed
//! environment.

pub mod dynamodb;
pub mod inmemory;

pub use dynamodb::DynamoDbRepository;
pub use inmemory::InMemoryRepository;
