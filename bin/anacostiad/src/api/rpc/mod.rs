//! HTTP mirrors of the metadata and resource contracts.
//!
//! Leaf pipelines and external processes speak these instead of
//! opening the store directly.

pub(super) mod metadata;
pub(super) mod resource;
