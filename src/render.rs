//! Output encoders and the policy choosing between them.

use std::sync::Arc;

use http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use serde_json::Value;

use crate::{Context, Result};

type RenderFn = dyn Fn(&mut Context<'_>, StatusCode, &Value) -> Result<()> + Send + Sync;

/// Writes a payload onto the response: headers, status and body.
#[derive(Clone)]
pub struct Renderer(Arc<RenderFn>);

impl Renderer {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Context<'_>, StatusCode, &Value) -> Result<()> + Send + Sync + 'static,
    {
        Renderer(Arc::new(f))
    }

    /// Renders the payload as compact JSON with `Content-Type: application/json`.
    pub fn json() -> Self {
        Renderer::new(|ctx, status, data| {
            ctx.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            ctx.write_header(status);

            let body = serde_json::to_vec(data)?;
            ctx.write(&body)?;

            Ok(())
        })
    }

    /// Renders the payload's string form with `Content-Type: text/plain`.
    ///
    /// Strings are written verbatim, `null` as nothing and any other value as its JSON text.
    pub fn plain() -> Self {
        Renderer::new(|ctx, status, data| {
            ctx.set_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            ctx.write_header(status);

            match data {
                Value::Null => {}
                Value::String(s) => {
                    ctx.write(s.as_bytes())?;
                }
                other => {
                    ctx.write(other.to_string().as_bytes())?;
                }
            }

            Ok(())
        })
    }

    pub fn render(&self, ctx: &mut Context<'_>, status: StatusCode, data: &Value) -> Result<()> {
        (self.0)(ctx, status, data)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Renderer::plain()
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Renderer")
    }
}

/// Picks the renderer for a request: the endpoint's, then the router's, then plain text.
pub fn resolve(endpoint: Option<&Renderer>, router: Option<&Renderer>) -> Renderer {
    endpoint.or(router).cloned().unwrap_or_default()
}
