//! The composition root: global middleware and services, mounted endpoints and the dispatch
//! table behind them.

use std::{any::Any, collections::HashMap, net::ToSocketAddrs, sync::Arc};

use http::{header::ALLOW, HeaderValue, Method, StatusCode};
use tracing::{info, warn};

use crate::{
    context::ErrorHook,
    endpoint::Endpoint,
    framework,
    handler::{Handler, IntoHandler},
    middleware::BoxMiddleware,
    render, Config, Context, Error, Injector, Logger, Middleware, Params, Renderer, Request,
    ResponseWriter, Result,
};

/// What an endpoint contributes to each of its requests.
struct Scope {
    middleware: Vec<BoxMiddleware>,
    renderer: Option<Renderer>,
    injector: Injector,
}

struct Entry {
    method: Method,
    handler: Handler,
    scope: Arc<Scope>,
}

/// Handlers of one path pattern, by method.
struct MethodTable {
    pattern: String,
    entries: Vec<Entry>,
}

impl MethodTable {
    fn get(&self, method: &Method) -> Option<&Entry> {
        self.entries.iter().find(|e| e.method == *method)
    }

    fn allow(&self) -> String {
        let methods: Vec<&str> = self.entries.iter().map(|e| e.method.as_str()).collect();

        methods.join(", ")
    }
}

/// One row of the route dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
    pub handler: String,
}

/// Dispatches requests through a middleware chain to the handler registered for their path and
/// method.
///
/// ```rust,ignore
/// Router::new()
///     .middleware(Recovery::new())
///     .register(Database::connect()?)
///     .handle("/users", users)
///     .renderer(Renderer::json())
///     .run("0.0.0.0:8080")?;
/// ```
///
/// Every matched request runs `[global middleware, Logger, endpoint middleware, handler]`; the
/// logger is present when [`Config::log_requests`] is set. Requests for unknown paths run the
/// global middleware followed by the not found handler, and requests for a known path with an
/// unregistered method run it followed by the not allowed handler.
pub struct Router {
    config: Config,

    matcher: matchit::Router<usize>,
    tables: Vec<MethodTable>,
    routes: Vec<RouteInfo>,

    middleware: Vec<BoxMiddleware>,
    renderer: Option<Renderer>,
    injector: Injector,
    on_error: Option<ErrorHook>,

    not_found: BoxMiddleware,
    not_allowed: BoxMiddleware,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            matcher: matchit::Router::new(),
            tables: Vec::new(),
            routes: Vec::new(),
            middleware: Vec::new(),
            renderer: None,
            injector: Injector::new(),
            on_error: None,
            not_found: Arc::new(|ctx: &mut Context<'_>| ctx.write_header(StatusCode::NOT_FOUND)),
            not_allowed: Arc::new(|ctx: &mut Context<'_>| {
                ctx.write_header(StatusCode::METHOD_NOT_ALLOWED)
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Appends global middleware. It runs for every request, before any endpoint middleware.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));

        self
    }

    /// Mounts every route of `endpoint` under `prefix`.
    ///
    /// `:name` segments capture one path segment and a trailing `*name` segment captures the rest
    /// of the path. Mounting a handler for a path and method that already has one replaces it.
    ///
    /// # Panics
    ///
    /// Panics when a pattern conflicts with a registered one, as `/users/:id` and
    /// `/users/:name` do.
    pub fn handle(mut self, prefix: &str, endpoint: Endpoint) -> Self {
        let Endpoint {
            routes,
            middleware,
            renderer,
            injector,
        } = endpoint;

        let scope = Arc::new(Scope {
            middleware,
            renderer,
            injector,
        });

        for route in routes {
            let path = join(prefix, &route.suffix);

            if let Err(e) = self.insert(&path, route.method, route.handler, &scope) {
                panic!("{e}");
            }
        }

        self
    }

    fn insert(
        &mut self,
        path: &str,
        method: Method,
        handler: Handler,
        scope: &Arc<Scope>,
    ) -> Result<()> {
        let pattern = to_pattern(path);

        let index = match self.tables.iter().position(|t| t.pattern == pattern) {
            Some(index) => index,
            None => {
                let index = self.tables.len();

                self.matcher
                    .insert(pattern.clone(), index)
                    .map_err(|source| Error::Route {
                        path: path.to_string(),
                        source,
                    })?;

                self.tables.push(MethodTable {
                    pattern,
                    entries: Vec::new(),
                });

                index
            }
        };

        let row = RouteInfo {
            method: method.clone(),
            path: path.to_string(),
            handler: handler.signature(),
        };

        let entry = Entry {
            method,
            handler,
            scope: Arc::clone(scope),
        };

        let table = &mut self.tables[index];

        match table.entries.iter_mut().find(|e| e.method == entry.method) {
            Some(existing) => {
                warn!(method = %entry.method, path, "overriding route");

                *existing = entry;

                if let Some(r) = self
                    .routes
                    .iter_mut()
                    .find(|r| r.method == row.method && r.path == row.path)
                {
                    *r = row;
                }
            }
            None => {
                table.entries.push(entry);
                self.routes.push(row);
            }
        }

        Ok(())
    }

    /// Sets the renderer used by endpoints without their own.
    pub fn renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);

        self
    }

    /// Replaces the handler for requests matching no route.
    pub fn not_found<M>(mut self, handler: impl IntoHandler<M>) -> Self {
        self.not_found = handler.into_handler().middleware();

        self
    }

    /// Replaces the handler for requests to a known path with an unregistered method. The
    /// response carries an `Allow` header listing the registered methods.
    pub fn not_allowed<M>(mut self, handler: impl IntoHandler<M>) -> Self {
        self.not_allowed = handler.into_handler().middleware();

        self
    }

    /// Binds a service for every handler.
    pub fn register<T>(mut self, service: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.injector.register(service);

        self
    }

    /// Sets the callback receiving errors raised while rendering a response.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));

        self
    }

    /// Registered routes, in registration order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    /// Mounted paths with their methods.
    pub fn paths(&self) -> HashMap<&str, Vec<&Method>> {
        let mut paths: HashMap<&str, Vec<&Method>> = HashMap::new();

        for route in &self.routes {
            paths.entry(route.path.as_str()).or_default().push(&route.method);
        }

        paths
    }

    /// Logs the route table.
    pub fn dump_routes(&self) {
        info!("{:<8}  {:<25}  {}", "METHOD", "PATH", "HANDLER");

        for route in &self.routes {
            info!("{:<8}  {:<25}  {}", route.method.as_str(), route.path, route.handler);
        }
    }

    /// Runs `request` through its middleware chain, writing the response to `writer`.
    pub fn dispatch(&self, writer: &mut dyn ResponseWriter, request: Request) {
        let mut chain = self.middleware.clone();

        if self.config.log_requests {
            chain.push(Arc::new(Logger));
        }

        let path = request.uri().path().to_owned();

        let (params, renderer, injector) = match self.matcher.at(&path) {
            Ok(matched) => {
                let table = &self.tables[*matched.value];
                let params = Params::from(matched.params);

                match table.get(request.method()) {
                    Some(entry) => {
                        chain.extend(entry.scope.middleware.iter().cloned());
                        chain.push(entry.handler.middleware());

                        let renderer =
                            render::resolve(entry.scope.renderer.as_ref(), self.renderer.as_ref());
                        let injector = Injector::merge([&self.injector, &entry.scope.injector]);

                        (params, renderer, injector)
                    }
                    None => {
                        let allow = HeaderValue::from_str(&table.allow()).ok();
                        let not_allowed = Arc::clone(&self.not_allowed);

                        chain.push(Arc::new(move |ctx: &mut Context<'_>| {
                            if let Some(allow) = &allow {
                                ctx.set_header(ALLOW, allow.clone());
                            }

                            not_allowed.handle(ctx);
                        }));

                        (params, self.fallback_renderer(), self.injector.clone())
                    }
                }
            }
            Err(_) => {
                chain.push(Arc::clone(&self.not_found));

                (Params::new(), self.fallback_renderer(), self.injector.clone())
            }
        };

        let mut ctx = Context::new(request, writer)
            .with_params(params)
            .with_chain(chain)
            .with_renderer(renderer)
            .with_injector(injector)
            .with_error_hook(self.on_error.clone());

        ctx.next();
    }

    fn fallback_renderer(&self) -> Renderer {
        render::resolve(None, self.renderer.as_ref())
    }

    /// Logs the route table when [`Config::dump_routes`] is set, then serves HTTP/1.1 on
    /// `address` until accepting connections fails.
    pub fn run(self, address: impl ToSocketAddrs) -> Result<()> {
        if self.config.dump_routes {
            self.dump_routes();
        }

        framework::serve(self, address)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("routes", &self.routes)
            .field("middleware", &self.middleware.len())
            .field("renderer", &self.renderer)
            .field("injector", &self.injector)
            .finish()
    }
}

/// Joins `prefix` and `suffix` into a clean absolute path: `("/users/", "/:id")` gives
/// `/users/:id` and `("/", "")` gives `/`.
fn join(prefix: &str, suffix: &str) -> String {
    let segments: Vec<&str> = prefix
        .split('/')
        .chain(suffix.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    format!("/{}", segments.join("/"))
}

/// Rewrites `:name` and `*name` segments into the matcher's `{name}` and `{*name}` syntax.
fn to_pattern(path: &str) -> String {
    let segments: Vec<String> = path
        .split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                let name = if name.is_empty() { "path" } else { name };

                format!("{{*{name}}}")
            } else {
                segment.replace('{', "{{").replace('}', "}}")
            }
        })
        .collect();

    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Recorder;

    fn request(method: Method, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Vec::new())
            .unwrap()
    }

    fn quiet() -> Config {
        Config {
            log_requests: false,
            ..Config::default()
        }
    }

    #[test]
    fn joins_paths() {
        assert_eq!(join("/users", "/:id"), "/users/:id");
        assert_eq!(join("/users/", ""), "/users");
        assert_eq!(join("", ""), "/");
        assert_eq!(join("/", "/"), "/");
        assert_eq!(join("api", "v1//items"), "/api/v1/items");
    }

    #[test]
    fn converts_patterns() {
        assert_eq!(to_pattern("/users/:id"), "/users/{id}");
        assert_eq!(to_pattern("/files/*rest"), "/files/{*rest}");
        assert_eq!(to_pattern("/files/*"), "/files/{*path}");
        assert_eq!(to_pattern("/a/:b/c"), "/a/{b}/c");
    }

    #[test]
    fn routes_are_recorded() {
        let router = Router::with_config(quiet())
            .handle(
                "/users",
                Endpoint::new()
                    .get("/", |ctx: &mut Context<'_>| ctx.write_header(StatusCode::OK))
                    .post("/", |ctx: &mut Context<'_>| ctx.write_header(StatusCode::CREATED)),
            )
            .handle(
                "/users",
                Endpoint::new().get("/:id", |ctx: &mut Context<'_>| {
                    ctx.write_header(StatusCode::OK)
                }),
            );

        let rows: Vec<_> = router
            .routes()
            .iter()
            .map(|r| (r.method.as_str(), r.path.as_str()))
            .collect();

        assert_eq!(
            rows,
            [("GET", "/users"), ("POST", "/users"), ("GET", "/users/:id")]
        );
        assert_eq!(router.paths()["/users"].len(), 2);
    }

    #[test]
    fn later_mount_overrides() {
        let router = Router::with_config(quiet())
            .handle(
                "/",
                Endpoint::new().get("/", |ctx: &mut Context<'_>| ctx.write_header(StatusCode::OK)),
            )
            .handle(
                "/",
                Endpoint::new().get("/", |ctx: &mut Context<'_>| {
                    ctx.write_header(StatusCode::ACCEPTED)
                }),
            );

        let mut recorder = Recorder::new();
        router.dispatch(&mut recorder, request(Method::GET, "/"));

        assert_eq!(router.routes().len(), 1);
        assert_eq!(recorder.status(), StatusCode::ACCEPTED);
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_patterns_panic() {
        let _ = Router::with_config(quiet()).handle(
            "/users",
            Endpoint::new()
                .get("/:id", |_: &mut Context<'_>| {})
                .get("/:name", |_: &mut Context<'_>| {}),
        );
    }

    #[test]
    fn unmatched_requests_run_global_middleware() {
        let router = Router::with_config(quiet())
            .middleware(|ctx: &mut Context<'_>| {
                ctx.set_header(
                    http::header::SERVER,
                    HeaderValue::from_static("river"),
                );
                ctx.next();
            })
            .handle(
                "/",
                Endpoint::new().get("/", |_: &mut Context<'_>| {}),
            );

        let mut recorder = Recorder::new();
        router.dispatch(&mut recorder, request(Method::GET, "/nowhere"));

        assert_eq!(recorder.status(), StatusCode::NOT_FOUND);
        assert_eq!(recorder.headers()["server"], "river");

        let mut recorder = Recorder::new();
        router.dispatch(&mut recorder, request(Method::DELETE, "/"));

        assert_eq!(recorder.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(recorder.headers()[ALLOW], "GET");
        assert!(recorder.body().is_empty());
    }

    #[test]
    fn allow_header_only_reaches_not_allowed_responses() {
        let router = Router::with_config(quiet())
            .middleware(|ctx: &mut Context<'_>| ctx.write_header(StatusCode::UNAUTHORIZED))
            .handle("/", Endpoint::new().get("/", |_: &mut Context<'_>| {}));

        let mut recorder = Recorder::new();
        router.dispatch(&mut recorder, request(Method::DELETE, "/"));

        assert_eq!(recorder.status(), StatusCode::UNAUTHORIZED);
        assert!(recorder.headers().get(ALLOW).is_none());
    }
}
