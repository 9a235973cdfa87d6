//! A request-dispatch core for REST services.
//!
//! A [`Router`] mounts [`Endpoint`]s under path prefixes. Every request runs through a chain of
//! [`Middleware`]: the router's global middleware, an optional request [`Logger`], the
//! endpoint's middleware and finally the handler. Each entry decides whether the request goes on
//! by calling [`Context::next`].
//!
//! Handlers either take the [`Context`] directly or declare what they need as parameters, which
//! are resolved from the request and from services registered on the router or endpoint:
//!
//! ```rust,ignore
//! use river::{Endpoint, Params, Renderer, Router, Service, StatusCode};
//!
//! #[derive(Default)]
//! struct Greeting(String);
//!
//! fn greet(params: Params, greeting: Service<Greeting>) -> (StatusCode, String) {
//!     (StatusCode::OK, format!("{} {}", greeting.0, params.get("name").unwrap_or("you")))
//! }
//!
//! Router::new()
//!     .register(Greeting("hello".into()))
//!     .handle("/greet", Endpoint::new().get("/:name", greet))
//!     .renderer(Renderer::json())
//!     .run("127.0.0.1:8080")?;
//! ```

mod action;
pub mod config;
mod context;
mod endpoint;
mod error;
pub mod framework;
pub mod handler;
pub mod http_utils;
mod injector;
pub mod layers;
pub mod logging;
pub mod middleware;
pub mod render;
mod resolve;
pub mod response;
mod routing;
mod tasks;
mod url_decoding;

pub use action::Action;
pub use config::Config;
pub use context::{Context, ErrorHook, Params};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use handler::{Handler, IntoHandler, Invoke};
pub use injector::{Injector, Service};
pub use middleware::{Fault, Logger, Middleware, Recovery};
pub use render::Renderer;
pub use resolve::{Body, Json, Query, Resolve};
pub use response::{Recorder, ResponseWriter};
pub use routing::{RouteInfo, Router};

pub use http;
pub use http::{Method, StatusCode};

/// The request type handed to every handler.
pub type Request = http::Request<Vec<u8>>;

/// The response type the server writes.
pub type Response = http::Response<Vec<u8>>;
