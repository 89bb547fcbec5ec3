//! Type-erased handlers.
//!
//! Plain closures and functions become handlers through [`IntoHandler`].
//! A handler always takes `&RequestContext` first, followed by up to three
//! extracted arguments, and returns any [`Responder`]:
//!
//! ```ignore
//! fn show(_: &RequestContext, Path(id): Path<u32>) -> Json<Item> { ... }
//! Binding::get(show)
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use crate::dispatch::error::{InvokeError, ParamSource};
use crate::dispatch::extract::{FromRequest, InvocationScope};
use crate::dispatch::responder::{HandlerValue, Responder, ReturnShape};
use crate::http::request::RequestContext;

/// A bound handler, callable with a request context.
pub trait Handler: Send + Sync + 'static {
    /// Return shape, fixed for the handler's lifetime.
    fn shape(&self) -> ReturnShape;

    /// Extract arguments, call the handler and convert its return value.
    fn call(&self, ctx: &RequestContext, scope: &mut InvocationScope) -> Result<HandlerValue, InvokeError>;
}

/// Conversion of a function into a [`Handler`].
///
/// `Args` is a tuple of the extracted argument types; it only exists to
/// keep the implementations for different arities apart.
pub trait IntoHandler<Args>: Sized {
    fn into_handler(self) -> Arc<dyn Handler>;
}

struct FnHandler<F, Args, R> {
    f: F,
    _marker: PhantomData<fn(Args) -> R>,
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> Handler for FnHandler<F, ($($arg,)*), R>
        where
            F: Fn(&RequestContext, $($arg,)*) -> R + Send + Sync + 'static,
            R: Responder,
            $($arg: FromRequest,)*
        {
            fn shape(&self) -> ReturnShape {
                let takes_sink = false $(|| <$arg as FromRequest>::SOURCE == ParamSource::Sink)*;
                ReturnShape::select(R::SHAPE, takes_sink)
            }

            #[allow(non_snake_case, unused_variables)]
            fn call(&self, ctx: &RequestContext, scope: &mut InvocationScope) -> Result<HandlerValue, InvokeError> {
                $(
                    let $arg = <$arg as FromRequest>::from_request(ctx, scope)
                        .map_err(InvokeError::from_argument)?;
                )*
                (self.f)(ctx, $($arg,)*).into_value().map_err(InvokeError::Handler)
            }
        }

        impl<F, R, $($arg,)*> IntoHandler<($($arg,)*)> for F
        where
            F: Fn(&RequestContext, $($arg,)*) -> R + Send + Sync + 'static,
            R: Responder,
            $($arg: FromRequest,)*
        {
            fn into_handler(self) -> Arc<dyn Handler> {
                Arc::new(FnHandler::<F, ($($arg,)*), R> {
                    f: self,
                    _marker: PhantomData,
                })
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
