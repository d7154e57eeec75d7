//! Persisted records and read projections.
//!
//! # Invariants
//! - Identity is assigned by the store and never reassigned.
//! - Member owns the member→team link; Team never embeds its members.

pub mod audit;
pub mod member;
pub mod member_dto;
pub mod team;
