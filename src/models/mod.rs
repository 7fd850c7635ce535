//! Request and Response models for the cache server API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::{ExpireRequest, IncrementRequest, InvalidateRequest, SetRequest};
pub use responses::{
    ClusterResponse, CounterResponse, DeleteResponse, ErrorResponse, ExpireResponse, GetResponse,
    HealthResponse, InvalidateResponse, SetResponse, StatsResponse, TtlResponse,
};
