use std::{collections::BTreeMap, sync::RwLock};

use river::{
    http::header::AUTHORIZATION, Context, Endpoint, Error, Json, Params, Recovery, Renderer,
    Router, Service, StatusCode,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    name: String,
    email: String,
}

#[derive(Default)]
struct Users(RwLock<BTreeMap<u64, User>>);

fn list(users: Service<Users>) -> (StatusCode, BTreeMap<u64, User>) {
    (StatusCode::OK, users.0.read().unwrap().clone())
}

fn get(params: Params, users: Service<Users>) -> Result<(StatusCode, User), StatusCode> {
    let id: u64 = params
        .get("id")
        .and_then(|id| id.parse().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    let user = users.0.read().unwrap().get(&id).cloned();

    user.map(|u| (StatusCode::OK, u)).ok_or(StatusCode::NOT_FOUND)
}

fn create(
    body: Result<Json<User>, Error>,
    users: Service<Users>,
) -> Result<(StatusCode, u64), Error> {
    let Json(user) = body?;

    let mut users = users.0.write().unwrap();
    let id = users.keys().next_back().map_or(1, |last| last + 1);

    users.insert(id, user);

    Ok((StatusCode::CREATED, id))
}

fn require_token(ctx: &mut Context<'_>) {
    if ctx.headers().get(AUTHORIZATION).is_none() {
        ctx.write_header(StatusCode::UNAUTHORIZED);
        return;
    }

    ctx.next();
}

fn main() -> river::Result<()> {
    river::logging::init();

    let users = Endpoint::new()
        .get("/", list)
        .get("/:id", get)
        .post("/", create)
        .middleware(require_token);

    Router::with_config(river::Config::from_env())
        .middleware(Recovery::new())
        .register(Users::default())
        .handle("/users", users)
        .handle(
            "/",
            Endpoint::new()
                .get("/", || (StatusCode::OK, "try /users"))
                .renderer(Renderer::plain()),
        )
        .renderer(Renderer::json())
        .run("0.0.0.0:8080")
}
