use http::StatusCode;
use serde::Serialize;

use crate::Context;

/// Dictates what happens to the value an injected handler returns.
///
/// `()` leaves the response untouched, a `StatusCode` writes an empty response with that
/// status and `(StatusCode, T)` renders `T` through the request's renderer.
pub trait Action {
    fn apply(self, ctx: &mut Context<'_>);
}

impl Action for () {
    fn apply(self, _ctx: &mut Context<'_>) {}
}

impl Action for StatusCode {
    fn apply(self, ctx: &mut Context<'_>) {
        ctx.write_header(self);
    }
}

impl<T> Action for (StatusCode, T)
where
    T: Serialize,
{
    fn apply(self, ctx: &mut Context<'_>) {
        let (status, data) = self;

        if let Err(e) = ctx.render(status, &data) {
            ctx.fail(e);
        }
    }
}

impl<T> Action for Option<T>
where
    T: Action,
{
    fn apply(self, ctx: &mut Context<'_>) {
        if let Some(v) = self {
            v.apply(ctx)
        }
    }
}

impl<T, E> Action for Result<T, E>
where
    T: Action,
    E: Action,
{
    fn apply(self, ctx: &mut Context<'_>) {
        match self {
            Ok(v) => v.apply(ctx),
            Err(e) => e.apply(ctx),
        }
    }
}
