use std::{any::Any, sync::Arc};

use http::Method;
use tracing::debug;

use crate::{
    handler::{Handler, IntoHandler},
    middleware::BoxMiddleware,
    Injector, Middleware, Renderer,
};

/// A group of handlers mounted together under one prefix with [`Router::handle`].
///
/// Handlers are registered per `(suffix, method)`; registering the same pair twice keeps the
/// later handler. Endpoint middleware runs after the router's global middleware and before the
/// handler, in the order it was added.
///
/// ```rust,ignore
/// let users = Endpoint::new()
///     .middleware(require_token)
///     .get("/", list_users)
///     .get("/:id", get_user)
///     .post("/", create_user)
///     .renderer(Renderer::json());
///
/// let router = Router::new().handle("/users", users);
/// ```
///
/// [`Router::handle`]: crate::Router::handle
#[derive(Default)]
pub struct Endpoint {
    pub(crate) routes: Vec<Route>,
    pub(crate) middleware: Vec<BoxMiddleware>,
    pub(crate) renderer: Option<Renderer>,
    pub(crate) injector: Injector,
}

pub(crate) struct Route {
    pub suffix: String,
    pub method: Method,
    pub handler: Handler,
}

impl Endpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<M>(self, suffix: &str, handler: impl IntoHandler<M>) -> Self {
        self.handle(Method::GET, suffix, handler)
    }

    pub fn post<M>(self, suffix: &str, handler: impl IntoHandler<M>) -> Self {
        self.handle(Method::POST, suffix, handler)
    }

    pub fn put<M>(self, suffix: &str, handler: impl IntoHandler<M>) -> Self {
        self.handle(Method::PUT, suffix, handler)
    }

    pub fn patch<M>(self, suffix: &str, handler: impl IntoHandler<M>) -> Self {
        self.handle(Method::PATCH, suffix, handler)
    }

    pub fn delete<M>(self, suffix: &str, handler: impl IntoHandler<M>) -> Self {
        self.handle(Method::DELETE, suffix, handler)
    }

    pub fn options<M>(self, suffix: &str, handler: impl IntoHandler<M>) -> Self {
        self.handle(Method::OPTIONS, suffix, handler)
    }

    /// Registers `handler` for `method` requests to `suffix`.
    pub fn handle<M>(mut self, method: Method, suffix: &str, handler: impl IntoHandler<M>) -> Self {
        let handler = handler.into_handler();

        match self
            .routes
            .iter_mut()
            .find(|r| r.suffix == suffix && r.method == method)
        {
            Some(route) => {
                debug!(%method, suffix, "replacing endpoint handler");

                route.handler = handler;
            }
            None => self.routes.push(Route {
                suffix: suffix.to_string(),
                method,
                handler,
            }),
        }

        self
    }

    /// Appends endpoint middleware.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));

        self
    }

    /// Overrides the router's renderer for every route of this endpoint.
    pub fn renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);

        self
    }

    /// Binds a service for handlers of this endpoint. Endpoint bindings win over the router's.
    pub fn register<T>(mut self, service: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.injector.register(service);

        self
    }

    /// `(suffix, method)` pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &Method)> {
        self.routes.iter().map(|r| (r.suffix.as_str(), &r.method))
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("routes", &self.routes().collect::<Vec<_>>())
            .field("middleware", &self.middleware.len())
            .field("renderer", &self.renderer)
            .field("injector", &self.injector)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::Context;

    fn ok() -> StatusCode {
        StatusCode::OK
    }

    fn created() -> StatusCode {
        StatusCode::CREATED
    }

    #[test]
    fn methods_register_in_order() {
        let endpoint = Endpoint::new()
            .get("/", ok)
            .post("/", created)
            .put("/:id", ok)
            .patch("/:id", ok)
            .delete("/:id", ok)
            .options("/", ok)
            .handle(Method::HEAD, "/", |_: &mut Context<'_>| {});

        let methods: Vec<_> = endpoint.routes().map(|(_, m)| m.clone()).collect();

        assert_eq!(
            methods,
            [
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
                Method::HEAD
            ]
        );
    }

    #[test]
    fn same_route_replaces() {
        let endpoint = Endpoint::new().get("/", ok).get("/", created);

        assert_eq!(endpoint.routes.len(), 1);
        assert!(endpoint.routes[0].handler.name().ends_with("created"));
    }

    #[test]
    fn builder_state() {
        let endpoint = Endpoint::new()
            .middleware(|ctx: &mut Context<'_>| ctx.next())
            .renderer(Renderer::json())
            .register(5u8);

        assert_eq!(endpoint.middleware.len(), 1);
        assert!(endpoint.renderer.is_some());
        assert_eq!(endpoint.injector.get::<u8>(), Some(&5));
    }
}
