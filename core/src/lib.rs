//! Synchronous client for the Scribd document-hosting API.
//!
//! # Overview
//! Every remote call is a signed multipart POST to a single endpoint, named
//! by a `method` field, answered with an XML envelope. `Client` builds and
//! signs the request, sends it through a `Transport` with bounded retries,
//! and validates the envelope. The resource types (`Document`, `User`,
//! `Category`, `Collection`) are local proxies built on top of it.
//!
//! # Design
//! - Request construction and response validation are pure functions of
//!   their inputs (`Client::build_request`, `Client::parse_response`), so
//!   the I/O boundary is the `Transport` trait alone.
//! - Resources carry an open-ended attribute map discovered from responses,
//!   plus an explicit two-state lifecycle.
//! - `mock::MockTransport` plays back scripted responses for tests.

pub mod category;
pub mod client;
pub mod collection;
pub mod config;
pub mod document;
pub mod envelope;
pub mod error;
pub mod fields;
pub mod http;
pub mod mock;
pub mod multipart;
pub mod resource;
pub mod security;
pub mod signer;
pub mod types;
pub mod user;
pub mod xml;

pub use category::Category;
pub use client::{Actor, Client};
pub use collection::Collection;
pub use config::{Config, Credentials, RetryPolicy};
pub use document::{Document, ThumbnailOptions};
pub use error::{ApiError, RemoteError, TransportError};
pub use fields::{FieldValue, Fields};
pub use http::{HttpRequest, HttpResponse, Transport, UreqTransport};
pub use resource::{Attributes, CreateError, Lifecycle, Record, Resource};
pub use types::{FilePart, Upload, Value};
pub use user::User;
