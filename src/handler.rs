//! Handler shapes accepted by endpoints.
//!
//! A handler is either next-aware, `Fn(&mut Context)` or any other [`Middleware`], and runs with
//! the request context directly; or injected, `Fn(A, B, ..) -> R` where every parameter
//! implements [`Resolve`] and the return value implements [`Action`]:
//!
//! ```rust,ignore
//! fn get_user(params: Params, db: Service<Database>) -> (StatusCode, User) {
//!     (StatusCode::OK, db.find(params.get("id").unwrap_or_default()))
//! }
//! ```

use std::{any::type_name, marker::PhantomData, sync::Arc};

use crate::{action::Action, middleware::BoxMiddleware, resolve::Resolve, Context, Middleware};

/// A function whose arguments can be assembled from a [`Context`].
pub trait Invoke<M> {
    type Output;

    fn invoke(&self, ctx: &Context<'_>) -> Self::Output;

    /// The parameter types, in declaration order.
    fn plan() -> Vec<&'static str>;
}

macro_rules! invoke {
    ($($x:ident),*) => {
        #[allow(non_snake_case, unused_variables)]
        impl<F, R, $($x),*> Invoke<fn($($x),*) -> R> for F
        where
            F: Fn($($x),*) -> R,
            $($x: Resolve,)*
        {
            type Output = R;

            fn invoke(&self, ctx: &Context<'_>) -> R {
                $(
                    let $x = $x::resolve(ctx);
                )*

                (self)($($x),*)
            }

            fn plan() -> Vec<&'static str> {
                vec![$(type_name::<$x>()),*]
            }
        }
    };
}

macro_rules! invoke_all {
    () => {
        invoke! {}
    };

    ($first:ident $(, $x:ident)*) => {
        invoke! { $first $(, $x)* }

        invoke_all! { $($x),* }
    };
}

invoke_all! { A, B, C, D, E, F1, G, H, I, J, K, L }

/// A type erased handler ready to be placed at the end of a chain.
#[derive(Clone)]
pub struct Handler {
    inner: BoxMiddleware,
    name: &'static str,
    plan: Arc<[&'static str]>,
}

impl Handler {
    pub(crate) fn middleware(&self) -> BoxMiddleware {
        Arc::clone(&self.inner)
    }

    /// Type name of the wrapped function.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parameter types of an injected handler, empty for next-aware ones.
    pub fn plan(&self) -> &[&'static str] {
        &self.plan
    }

    /// `name(param, ..)` as shown in the route dump.
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.plan.join(", "))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Marker for handlers taking the `Context` directly.
pub struct Chained;

/// Marker for handlers whose arguments are injected.
pub struct Injected;

/// Converts a function into a [`Handler`]. See the [module docs](self) for accepted shapes.
pub trait IntoHandler<M> {
    fn into_handler(self) -> Handler;
}

impl<T> IntoHandler<Chained> for T
where
    T: Middleware,
{
    fn into_handler(self) -> Handler {
        Handler {
            inner: Arc::new(self),
            name: type_name::<T>(),
            plan: Arc::from(Vec::new()),
        }
    }
}

impl<F, M> IntoHandler<(Injected, M)> for F
where
    F: Invoke<M> + Send + Sync + 'static,
    F::Output: Action,
    M: 'static,
{
    fn into_handler(self) -> Handler {
        Handler {
            inner: Arc::new(InjectedHandler {
                f: self,
                _marker: PhantomData,
            }),
            name: type_name::<F>(),
            plan: Arc::from(F::plan()),
        }
    }
}

struct InjectedHandler<F, M> {
    f: F,
    _marker: PhantomData<fn() -> M>,
}

impl<F, M> Middleware for InjectedHandler<F, M>
where
    F: Invoke<M> + Send + Sync + 'static,
    F::Output: Action,
    M: 'static,
{
    fn handle(&self, ctx: &mut Context<'_>) {
        self.f.invoke(ctx).apply(ctx);
    }
}
