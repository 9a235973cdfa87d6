use std::{any::Any, collections::HashMap, sync::Arc};

use http::{HeaderMap, Method, Uri, Version};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{url_decoding, Context, Error, Params, Request, Service};

/// `Resolve` constructs the values needed to call an injected handler. Every parameter of such
/// a handler must implement `Resolve`.
///
/// Resolution never fails: a parameter that cannot be satisfied falls back to an empty or
/// default value. Parameter types that want to observe failure resolve to a `Result` or an
/// `Option` instead.
pub trait Resolve: Sized {
    fn resolve(ctx: &Context<'_>) -> Self;
}

impl<T> Resolve for Service<T>
where
    T: Any + Send + Sync + Default,
{
    fn resolve(ctx: &Context<'_>) -> Self {
        Service::from(ctx.injector().resolve())
    }
}

impl<T> Resolve for Option<Service<T>>
where
    T: Any + Send + Sync,
{
    fn resolve(ctx: &Context<'_>) -> Self {
        ctx.injector().service().map(Service::from)
    }
}

/// The request being handled.
impl Resolve for Arc<Request> {
    fn resolve(ctx: &Context<'_>) -> Self {
        ctx.shared_request()
    }
}

impl Resolve for Params {
    fn resolve(ctx: &Context<'_>) -> Self {
        ctx.params().clone()
    }
}

impl Resolve for Method {
    fn resolve(ctx: &Context<'_>) -> Self {
        ctx.method().clone()
    }
}

impl Resolve for Uri {
    fn resolve(ctx: &Context<'_>) -> Self {
        ctx.uri().clone()
    }
}

impl Resolve for Version {
    fn resolve(ctx: &Context<'_>) -> Self {
        ctx.request().version()
    }
}

/// Request headers
impl Resolve for HeaderMap {
    fn resolve(ctx: &Context<'_>) -> Self {
        ctx.headers().clone()
    }
}

/// The raw request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body(pub Vec<u8>);

impl Resolve for Body {
    fn resolve(ctx: &Context<'_>) -> Self {
        Body(ctx.request().body().clone())
    }
}

/// A map of all url query parameters. Ex: "?foo=bar"
///
/// A query string that cannot be decoded resolves to an empty map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query(pub HashMap<String, String>);

impl Query {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl Resolve for Query {
    fn resolve(ctx: &Context<'_>) -> Self {
        let map = ctx
            .uri()
            .query()
            .and_then(url_decoding::map)
            .unwrap_or_default();

        Query(map)
    }
}

/// A JSON request body.
///
/// Decoding is lenient about a single value versus a list: a lone object decodes into a
/// one element `Vec`, and a list decodes into its first element when `T` is not a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T>
where
    T: DeserializeOwned,
{
    pub fn from_slice(body: &[u8]) -> Result<Self, Error> {
        let value: Value = serde_json::from_slice(body).map_err(Error::Decode)?;

        let err = match serde_json::from_value(value.clone()) {
            Ok(v) => return Ok(Json(v)),
            Err(e) => e,
        };

        let retry = match value {
            Value::Object(_) => serde_json::from_value(Value::Array(vec![value])),
            Value::Array(items) => match items.into_iter().next() {
                Some(first) => serde_json::from_value(first),
                None => return Err(Error::Decode(err)),
            },
            _ => return Err(Error::Decode(err)),
        };

        retry.map(Json).map_err(|_| Error::Decode(err))
    }
}

impl<T> Resolve for Result<Json<T>, Error>
where
    T: DeserializeOwned,
{
    fn resolve(ctx: &Context<'_>) -> Self {
        Json::from_slice(ctx.request().body())
    }
}

impl<T> Resolve for Option<Json<T>>
where
    T: DeserializeOwned,
{
    fn resolve(ctx: &Context<'_>) -> Self {
        Json::from_slice(ctx.request().body()).ok()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::{response::Recorder, Injector};

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct User {
        name: String,
    }

    #[test]
    fn json_accepts_object_or_list() {
        let Json(user) = Json::<User>::from_slice(br#"{"name": "Some Name"}"#).unwrap();
        assert_eq!(user.name, "Some Name");

        let Json(user) = Json::<User>::from_slice(br#"[{"name": "Some Name"}]"#).unwrap();
        assert_eq!(user.name, "Some Name");

        let Json(users) = Json::<Vec<User>>::from_slice(br#"{"name": "Some Name"}"#).unwrap();
        assert_eq!(users, [User { name: "Some Name".into() }]);

        let Json(users) = Json::<Vec<User>>::from_slice(br#"[{"name": "Some Name"}]"#).unwrap();
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn json_rejects_garbage() {
        assert!(matches!(
            Json::<User>::from_slice(b"{not json"),
            Err(Error::Decode(_))
        ));
        assert!(Json::<User>::from_slice(b"[]").is_err());
        assert!(Json::<User>::from_slice(b"12").is_err());
    }

    #[test]
    fn request_parts_resolve() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("/search?q=river+rust&page=2")
            .header("x-token", "abc")
            .body(b"payload".to_vec())
            .unwrap();

        let mut recorder = Recorder::new();
        let ctx = Context::new(request, &mut recorder);

        assert_eq!(Method::resolve(&ctx), Method::POST);
        assert_eq!(HeaderMap::resolve(&ctx)["x-token"], "abc");
        assert_eq!(Body::resolve(&ctx).0, b"payload");

        let query = Query::resolve(&ctx);
        assert_eq!(query.get("q"), Some("river rust"));
        assert_eq!(query.get("page"), Some("2"));
    }

    #[test]
    fn services_fall_back_to_default() {
        let mut recorder = Recorder::new();
        let ctx = Context::new(Request::default(), &mut recorder)
            .with_injector(Injector::new().with(String::from("bound")));

        assert_eq!(*Service::<String>::resolve(&ctx), "bound");
        assert_eq!(*Service::<u64>::resolve(&ctx), 0);
        assert!(Option::<Service<u64>>::resolve(&ctx).is_none());
    }

    #[derive(Default)]
    struct Pair(u32, &'static str);

    #[test]
    fn service_fields_read_through() {
        let mut recorder = Recorder::new();
        let ctx = Context::new(Request::default(), &mut recorder)
            .with_injector(Injector::new().with(Pair(7, "seven")));

        let pair = Service::<Pair>::resolve(&ctx);

        assert_eq!(pair.0, 7);
        assert_eq!(pair.1, "seven");
    }
}
