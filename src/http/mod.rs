//! HTTP surfaces besides GraphQL: the REST endpoints and the Dapr pub/sub endpoints.

pub mod event_service;
pub mod review_routes;
