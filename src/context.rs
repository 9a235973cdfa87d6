use std::{
    any::Any,
    io::Write,
    sync::{mpsc::Receiver, Arc},
    time::Instant,
};

use http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde::Serialize;
use tracing::debug;

use crate::{
    handler::Invoke, middleware::BoxMiddleware, render::Renderer, response::ResponseWriter,
    url_decoding, Error, Injector, Request, Result,
};

/// Callback receiving errors raised while rendering a response.
pub type ErrorHook = Arc<dyn Fn(&mut Context<'_>, &Error) + Send + Sync>;

/// Route parameters captured by the path matcher, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Captured values are percent-decoded. A value with a broken escape is kept as sent.
impl From<matchit::Params<'_, '_>> for Params {
    fn from(params: matchit::Params<'_, '_>) -> Self {
        params
            .iter()
            .map(|(k, v)| (k, url_decoding::path(v).unwrap_or_else(|| v.to_string())))
            .collect()
    }
}

/// Request scoped state.
///
/// A `Context` is built once per dispatched request and dropped when its middleware chain
/// returns. It carries the request, the writer the response goes through, the captured route
/// parameters, the request's injector and the chain itself.
///
/// The chain is an immutable list with a cursor: [`Context::next`] runs the entry under the
/// cursor. A middleware that returns without calling `next` ends the request there.
pub struct Context<'w> {
    request: Arc<Request>,
    writer: &'w mut dyn ResponseWriter,
    params: Params,

    chain: Arc<[BoxMiddleware]>,
    cursor: usize,

    renderer: Renderer,
    injector: Injector,
    on_error: Option<ErrorHook>,

    header_written: bool,
    status: Option<StatusCode>,
    written: usize,
}

impl<'w> Context<'w> {
    /// A context with an empty chain, an empty injector and the plain renderer.
    pub fn new(request: impl Into<Arc<Request>>, writer: &'w mut dyn ResponseWriter) -> Self {
        Self {
            request: request.into(),
            writer,
            params: Params::new(),
            chain: Arc::from(Vec::new()),
            cursor: 0,
            renderer: Renderer::default(),
            injector: Injector::new(),
            on_error: None,
            header_written: false,
            status: None,
            written: 0,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Replaces the chain and rewinds the cursor to its start.
    pub fn with_chain(mut self, chain: impl Into<Arc<[BoxMiddleware]>>) -> Self {
        self.chain = chain.into();
        self.cursor = 0;
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_injector(mut self, injector: Injector) -> Self {
        self.injector = injector;
        self
    }

    pub(crate) fn with_error_hook(mut self, hook: Option<ErrorHook>) -> Self {
        self.on_error = hook;
        self
    }

    /// Calls the next handler in the chain. Has no effect once the chain is exhausted.
    pub fn next(&mut self) {
        let Some(current) = self.chain.get(self.cursor).cloned() else {
            return;
        };

        self.cursor += 1;

        current.handle(self);
    }

    /// Number of chain entries that have not run yet.
    pub fn remaining(&self) -> usize {
        self.chain.len() - self.cursor
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn shared_request(&self) -> Arc<Request> {
        Arc::clone(&self.request)
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// Route parameter `key`, or an empty string when the route has no such parameter.
    pub fn param(&self, key: &str) -> &str {
        self.params.get(key).unwrap_or_default()
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Sets a response header unless the header was already written.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.header_written {
            debug!(header = %name, "header already written, ignoring");

            return;
        }

        self.writer.headers_mut().insert(name, value);
    }

    /// Sends the response header with `status`. Only the first call has an effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.header_written {
            debug!(
                status = status.as_u16(),
                written = ?self.status,
                "superfluous write_header call"
            );

            return;
        }

        self.header_written = true;
        self.status = Some(status);

        self.writer.write_header(status);
    }

    /// Writes body bytes, sending a `200 OK` header first if none was written.
    pub fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.header_written {
            self.write_header(StatusCode::OK);
        }

        let n = self.writer.write(buf)?;

        self.written += n;

        Ok(n)
    }

    /// Renders `data` with `status` through this request's renderer.
    pub fn render<T>(&mut self, status: StatusCode, data: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(data)?;

        let renderer = self.renderer.clone();

        renderer.render(self, status, &value)
    }

    /// Hands a render error to the router's error hook, or drops it when none is set.
    pub fn fail(&mut self, err: Error) {
        match self.on_error.clone() {
            Some(hook) => hook(self, &err),
            None => debug!(error = %err, "dropping render error"),
        }
    }

    /// Status written so far, `None` before any header or body write.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    /// Body bytes written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn injector(&self) -> &Injector {
        &self.injector
    }

    /// Binds a request scoped value. Handlers further down the chain receive it as
    /// `Service<T>`.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Any + Send + Sync,
    {
        self.injector.register(value);
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.injector.get()
    }

    /// The bound instance of `T`, `T::default()` when there is none.
    pub fn service<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync + Default,
    {
        self.injector.resolve()
    }

    /// Calls `f` with arguments resolved from this context.
    pub fn invoke<M, F>(&self, f: &F) -> F::Output
    where
        F: Invoke<M>,
    {
        f.invoke(self)
    }

    /// Always `None`: requests carry no deadline.
    pub fn deadline(&self) -> Option<Instant> {
        None
    }

    /// Always `None`: a request is never cancelled.
    pub fn done(&self) -> Option<Receiver<()>> {
        None
    }

    /// Always `None`, see [`Context::done`].
    pub fn err(&self) -> Option<&Error> {
        None
    }
}

impl Write for Context<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Context::write(self, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{middleware::Middleware, response::Recorder};

    fn request() -> Request {
        http::Request::builder()
            .uri("/users/7")
            .body(Vec::new())
            .unwrap()
    }

    struct Mark(&'static str, Arc<Mutex<Vec<&'static str>>>, bool);

    impl Middleware for Mark {
        fn handle(&self, ctx: &mut Context<'_>) {
            self.1.lock().unwrap().push(self.0);

            if self.2 {
                ctx.next();
            }
        }
    }

    fn chain(
        log: &Arc<Mutex<Vec<&'static str>>>,
        steps: &[(&'static str, bool)],
    ) -> Vec<BoxMiddleware> {
        steps
            .iter()
            .map(|&(name, next)| Arc::new(Mark(name, log.clone(), next)) as BoxMiddleware)
            .collect()
    }

    #[test]
    fn next_runs_chain_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut recorder = Recorder::new();

        let mut ctx = Context::new(request(), &mut recorder)
            .with_chain(chain(&log, &[("a", true), ("b", true), ("c", true)]));

        ctx.next();

        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
        assert_eq!(ctx.remaining(), 0);

        // Exhausted chains ignore further calls
        ctx.next();

        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[test]
    fn skipping_next_truncates_chain() {
        for stop in 0..4 {
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut recorder = Recorder::new();

            let steps: Vec<_> = ["a", "b", "c", "d"]
                .into_iter()
                .enumerate()
                .map(|(i, name)| (name, i != stop))
                .collect();

            let mut ctx = Context::new(request(), &mut recorder).with_chain(chain(&log, &steps));

            ctx.next();

            assert_eq!(log.lock().unwrap().len(), stop + 1);
        }
    }

    #[test]
    fn first_header_write_wins() {
        let mut recorder = Recorder::new();
        let mut ctx = Context::new(request(), &mut recorder);

        assert_eq!(ctx.status(), None);

        ctx.write_header(StatusCode::UNAUTHORIZED);
        ctx.write_header(StatusCode::OK);
        ctx.write(b"denied").unwrap();

        assert_eq!(ctx.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(ctx.written(), 6);
        assert_eq!(recorder.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn body_write_commits_ok() {
        let mut recorder = Recorder::new();
        let mut ctx = Context::new(request(), &mut recorder);

        write!(ctx, "hello {}", 7).unwrap();

        assert!(ctx.header_written());
        assert_eq!(ctx.status(), Some(StatusCode::OK));
        assert_eq!(recorder.text(), "hello 7");
    }

    #[test]
    fn render_then_write_keeps_rendered_header() {
        let mut recorder = Recorder::new();
        let mut ctx = Context::new(request(), &mut recorder).with_renderer(Renderer::json());

        ctx.render(StatusCode::CREATED, &serde_json::json!({"ok": true}))
            .unwrap();
        ctx.set_header(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        ctx.write(b"\n").unwrap();

        assert_eq!(recorder.status(), StatusCode::CREATED);
        assert_eq!(recorder.headers()["content-type"], "application/json");
        assert_eq!(recorder.text(), "{\"ok\":true}\n");
    }

    #[test]
    fn params_default_to_empty() {
        let mut recorder = Recorder::new();
        let params: Params = [("id", "7")].into_iter().collect();

        let ctx = Context::new(request(), &mut recorder).with_params(params);

        assert_eq!(ctx.param("id"), "7");
        assert_eq!(ctx.param("missing"), "");
    }

    #[test]
    fn never_cancelled() {
        let mut recorder = Recorder::new();
        let ctx = Context::new(request(), &mut recorder);

        assert!(ctx.deadline().is_none());
        assert!(ctx.done().is_none());
        assert!(ctx.err().is_none());
    }
}
