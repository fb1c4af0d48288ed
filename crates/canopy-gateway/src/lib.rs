//! Canopy request router.
//!
//! Resolves the first label of each request's Host header to a deployment
//! and answers according to that deployment's lifecycle status: live
//! deployments are reverse-proxied to their build artifacts at the origin,
//! in-flight and failed builds get static status pages, and unknown
//! subdomains get a 404.
//!
//! The gateway is stateless; it shares the control plane's state store and
//! consults it on every request, so a status change is visible on the next
//! request without any cache invalidation.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pages;
pub mod proxy;
pub mod resolver;
pub mod server;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use proxy::ArtifactProxy;
pub use resolver::extract_subdomain;
pub use server::{route_decision, GatewayState, RouteDecision};
