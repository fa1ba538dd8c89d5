//! HTTP API: JWT, middleware, response envelope and route handlers

pub mod jwt;
pub mod middleware;
pub mod response;
pub mod services;
