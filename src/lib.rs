//! A thread-pooled HTTP/1.1 gateway server core.
//!
//! This crate implements the transport and wire-protocol layer of a
//! gateway server: a bounded worker pool accepts connections and drives
//! each one through HTTP/1.1 parsing, request dispatch to a routed
//! [`GatewayApp`], and response framing, the way a reference WSGI
//! container would, but expressed as Rust types: an application is a
//! trait object instead of a duck-typed callable, and its response body
//! is an iterator of byte chunks instead of an arbitrary iterable.
//!
//! The top-level building blocks:
//! - [`config::Config`] / [`server::ServerBuilder`] configure and start a server.
//! - [`gateway::GatewayApp`] is the trait applications implement.
//! - [`mount::MountTable`] routes requests to mounted applications by path prefix.
//! - [`server::Server`] is the handle used to stop a running server.

pub mod config;
pub mod connection;
pub mod date;
pub mod driver;
pub mod environ;
pub mod error;
pub mod gateway;
pub mod h1;
pub mod listener;
pub mod mount;
pub mod queue;
pub mod request;
pub mod server;
#[cfg(feature = "openssl-tls")]
pub mod tls;
pub mod worker;

pub use config::Config;
pub use environ::Environ;
pub use error::{Error, Result};
pub use gateway::{Body, GatewayApp, HeaderField, ResponseStatus, StartResponse};
pub use mount::MountTable;
pub use server::{Server, ServerBuilder};
