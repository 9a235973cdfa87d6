//! Chain entries and the built-in recovery and request logging middleware.

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use http::StatusCode;
use tracing::info;

use crate::Context;

pub type BoxMiddleware = Arc<dyn Middleware>;

/// An entry of the middleware chain.
///
/// A middleware decides whether the request continues: calling [`Context::next`] runs the rest
/// of the chain and returns once it is done, returning without calling it ends the request.
///
/// Implemented for every `Fn(&mut Context)`.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: &mut Context<'_>);
}

impl<F> Middleware for F
where
    F: Fn(&mut Context<'_>) + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut Context<'_>) {
        self(ctx)
    }
}

/// The payload of a panic caught by [`Recovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault(String);

impl Fault {
    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(s) => s.to_string(),
                Err(_) => String::from("unknown fault"),
            },
        };

        Fault(message)
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

type FaultHandler = Box<dyn Fn(&mut Context<'_>, &Fault) + Send + Sync>;

/// Catches panics raised further down the chain.
///
/// Without fault handlers a caught panic renders `500 Internal Server Error` with the panic
/// message as payload. Otherwise each handler is called in registration order.
#[derive(Default)]
pub struct Recovery {
    handlers: Vec<FaultHandler>,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Fault) + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(f));

        self
    }
}

impl Middleware for Recovery {
    fn handle(&self, ctx: &mut Context<'_>) {
        let Err(payload) = catch_unwind(AssertUnwindSafe(|| ctx.next())) else {
            return;
        };

        let fault = Fault::from_panic(payload);

        if self.handlers.is_empty() {
            if let Err(e) = ctx.render(StatusCode::INTERNAL_SERVER_ERROR, fault.message()) {
                ctx.fail(e);
            }

            return;
        }

        for handler in &self.handlers {
            handler(ctx, &fault);
        }
    }
}

/// Logs one line per request once the rest of the chain has returned.
///
/// The router inserts one after the global middleware when
/// [`Config::log_requests`](crate::Config::log_requests) is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger;

impl Middleware for Logger {
    fn handle(&self, ctx: &mut Context<'_>) {
        let start = Instant::now();

        ctx.next();

        let duration = start.elapsed();

        let status = match ctx.status() {
            Some(s) => paint(s),
            None => String::from("  -  "),
        };

        info!(
            target: "river::request",
            "{}|{}|{:>12?}|{:>8}|{:<7} {}",
            timestamp(),
            status,
            duration,
            size(ctx.written()),
            ctx.method(),
            ctx.path(),
        );
    }
}

fn paint(status: StatusCode) -> String {
    // white on green, blue, yellow, red
    let bg = match status.as_u16() {
        200..=299 => "42",
        300..=399 => "44",
        400..=499 => "43",
        500..=599 => "41",
        _ => "40",
    };

    format!("\x1b[{bg};37;1m  {}  \x1b[0m", status.as_u16())
}

fn size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(feature = "date")]
fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(not(feature = "date"))]
fn timestamp() -> String {
    String::new()
}
