#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! HTTP surface of the Kappa API.
//!
//! Layout: `app/` (shared request state), `http/` (router, middleware, handlers),
//! `error.rs` (server bootstrap errors).

pub(crate) mod app;
pub mod error;
pub mod http;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
