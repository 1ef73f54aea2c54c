#![doc = "vstore-core: the batched file-upload pipeline behind the vstore CLI."]

//! This crate holds all pipeline logic, the data model and the ports to the
//! remote API. It performs no HTTP itself; the CLI crate supplies a
//! [`contract::StoreClient`] implementation.
//!
//! # Pipeline
//! 1. [`resolve`]: glob patterns → deduplicated local files
//! 2. [`metadata`] / [`manifest`]: per-file strategy, contextualization and metadata
//! 3. [`existing`]: remote files already uploaded from the same paths (`--unique`)
//! 4. [`batch`]: windowed concurrent upload with per-file outcome accounting
//!
//! [`pipeline`] ties steps 1 and 2 together and validates the request.

pub mod batch;
pub mod config;
pub mod content_type;
pub mod contract;
pub mod error;
pub mod existing;
pub mod manifest;
pub mod metadata;
pub mod pipeline;
pub mod resolve;
