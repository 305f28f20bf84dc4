//! Handler traits and type erasure.
//!
//! # How handlers are stored
//!
//! The route table holds handlers of *different* types in one
//! `Vec<RouteDefinition>` per method, so every handler is erased behind
//! `dyn ErasedHandler`. Three shapes are accepted:
//!
//! ```text
//! async fn index(req: Request) -> impl IntoResponse                 ← Plain
//! async fn show(req: Request, (id,): (u64,)) -> impl IntoResponse   ← WithArgs<(u64,)>
//! action(&ctrl, |ctrl: Arc<Books>, req: Request| async { … })       ← ControllerAction
//! ```
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! router.get("/books/{id}", show)
//!        ↓ show.into_boxed_handler()        ← Handler blanket impl
//! Arc::new(ArgsHandler(show, PhantomData))  ← stored as BoxedHandler
//!        ↓ handler.call(req) at request time
//! (u64,)::from_args(req.args())             ← positional binding, typed
//!        ↓
//! Box::pin(async { show(req, args).await.into_response() })
//! ```
//!
//! Binding is explicit: the route's arguments are parsed into the handler's
//! tuple type in declaration order. A value that does not parse is reported
//! as [`Error::RouteArgument`] instead of reaching the handler.

use std::fmt::Display;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::route::Arguments;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to the handler outcome.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Markers ───────────────────────────────────────────────────────────────────

/// Marker for `Fn(Request) -> Fut` handlers.
pub struct Plain;

/// Marker for `Fn(Request, A) -> Fut` handlers with bound path arguments.
pub struct WithArgs<A>(PhantomData<fn() -> A>);

/// Marker for controller actions built with [`action`].
pub struct ControllerAction<C>(PhantomData<fn() -> C>);

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is sealed and satisfied by the
/// blanket impls below; `M` is an inference-only marker that keeps the
/// handler shapes from overlapping.
pub trait Handler<M>: private::Sealed<M> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed<M> {}
}

// ── Plain handlers ────────────────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed<Plain> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler<Plain> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { Ok(fut.await.into_response()) })
    }
}

// ── Handlers with bound arguments ─────────────────────────────────────────────

impl<F, Fut, R, A> private::Sealed<WithArgs<A>> for F
where
    F: Fn(Request, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
    A: FromArgs + Send + 'static,
{
}

impl<F, Fut, R, A> Handler<WithArgs<A>> for F
where
    F: Fn(Request, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
    A: FromArgs + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(ArgsHandler(self, PhantomData::<fn() -> A>))
    }
}

struct ArgsHandler<F, A>(F, PhantomData<fn() -> A>);

impl<F, Fut, R, A> ErasedHandler for ArgsHandler<F, A>
where
    F: Fn(Request, A) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
    A: FromArgs + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let args = match A::from_args(req.args()) {
            Ok(args) => args,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        let fut = (self.0)(req, args);
        Box::pin(async move { Ok(fut.await.into_response()) })
    }
}

// ── Controllers ───────────────────────────────────────────────────────────────

/// A group of related actions sharing state and a pre-action hook.
pub trait Controller: Send + Sync + 'static {
    /// Runs before every action of this controller. Returning a response
    /// skips the action entirely.
    fn before(&self, _req: &Request) -> Option<Response> {
        None
    }
}

/// A controller method bound as a route handler. Build with [`action`].
pub struct Action<C, F> {
    controller: Arc<C>,
    f: F,
}

/// Binds `f` to `controller` so it can be registered on a route.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use bulwark::{action, Controller, Request, Response, Router};
///
/// struct Books;
/// impl Controller for Books {}
///
/// impl Books {
///     async fn index(self: Arc<Self>, _req: Request) -> Response {
///         Response::text("books")
///     }
/// }
///
/// let books = Arc::new(Books);
/// let app = Router::new().get("/books", action(&books, Books::index)).unwrap();
/// ```
pub fn action<C, F>(controller: &Arc<C>, f: F) -> Action<C, F> {
    Action { controller: Arc::clone(controller), f }
}

impl<C, F, Fut, R> private::Sealed<ControllerAction<C>> for Action<C, F>
where
    C: Controller,
    F: Fn(Arc<C>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<C, F, Fut, R> Handler<ControllerAction<C>> for Action<C, F>
where
    C: Controller,
    F: Fn(Arc<C>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl<C, F, Fut, R> ErasedHandler for Action<C, F>
where
    C: Controller,
    F: Fn(Arc<C>, Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        if let Some(early) = self.controller.before(&req) {
            return Box::pin(async move { Ok(early) });
        }
        let fut = (self.f)(Arc::clone(&self.controller), req);
        Box::pin(async move { Ok(fut.await.into_response()) })
    }
}

// ── Argument binding ──────────────────────────────────────────────────────────

/// Builds a typed argument list from route arguments, by position.
pub trait FromArgs: Sized {
    fn from_args(args: &Arguments) -> Result<Self>;
}

impl FromArgs for Arguments {
    fn from_args(args: &Arguments) -> Result<Self> {
        Ok(args.clone())
    }
}

fn bind<T>(args: &Arguments, index: usize) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let (name, raw) = args.get_index(index).ok_or_else(|| Error::RouteArgument {
        name: format!("#{index}"),
        reason: "route declares fewer parameters than the handler expects".to_owned(),
    })?;
    raw.parse().map_err(|e: T::Err| Error::RouteArgument {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

macro_rules! tuple_from_args {
    ($($T:ident $idx:tt),+) => {
        impl<$($T),+> FromArgs for ($($T,)+)
        where
            $($T: FromStr, $T::Err: Display,)+
        {
            fn from_args(args: &Arguments) -> Result<Self> {
                Ok(($(bind::<$T>(args, $idx)?,)+))
            }
        }
    };
}

tuple_from_args!(A 0);
tuple_from_args!(A 0, B 1);
tuple_from_args!(A 0, B 1, C 2);
tuple_from_args!(A 0, B 1, C 2, D 3);
