//! Vaccination events data store.
//!
//! The storage and consistency layer for clinical immunization records on
//! behalf of multiple data suppliers: a DynamoDB-backed repository
//! (indexing, conditional writes, soft-delete lifecycle) and the service
//! that orchestrates authorization, content validation, the
//! delete/reinstate state machine, and response redaction on top of it.
//!
//! The store offers only single-item conditional writes and eventually
//! consistent secondary indexes, so every invariant is encoded as a
//! conditional operation plus compensating read-before-write checks. The
//! one gap those checks cannot close is the identifier-uniqueness race:
//! two concurrent creates carrying the same business identifier can both
//! pass the index read and both land. That window is accepted and
//! documented; callers needing a stronger guarantee must serialize their
//! own submissions per identifier.

pub mod config;
pub mod service;
pub mod storage;
