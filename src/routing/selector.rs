//! Per-node method selection.
//!
//! # Responsibilities
//! - Filter a node's bindings by request method (HEAD falls back to GET)
//! - Answer OPTIONS when no binding declares it
//! - Filter by request `Content-Type`, then negotiate binding and response
//!   type together from `Accept`
//!
//! # Design Decisions
//! - Failures are reported in HTTP order: 405, then 415, then 406
//! - Exact ties between bindings go to the first declared one

use std::cmp::Ordering;
use std::sync::Arc;

use axum::http::Method;

use crate::http::request::RequestContext;
use crate::media::{negotiate, negotiate_among, AcceptPreference, CombinedMediaType, ProducePreference};
use crate::routing::error::RoutingError;
use crate::routing::tree::{MethodBinding, RouteNode};

/// A binding chosen for a request, with the negotiated response type.
#[derive(Debug, Clone)]
pub struct Selection {
    pub node: Arc<RouteNode>,
    pub binding: Arc<MethodBinding>,
    pub media_type: CombinedMediaType,
    /// HEAD is being served by a GET binding.
    pub head: bool,
}

/// What the router decided for a request.
#[derive(Debug, Clone)]
pub enum Route {
    /// Dispatch to a handler.
    Handler(Selection),
    /// Answer OPTIONS with the allowed methods.
    Options { allowed: Vec<Method> },
}

/// Select the binding serving `ctx` on `node`.
pub fn select(node: &Arc<RouteNode>, ctx: &RequestContext) -> Result<Route, RoutingError> {
    let method = ctx.method();
    let mut head = false;
    let mut bindings: Vec<&Arc<MethodBinding>> = node.bindings_for(method).collect();

    if bindings.is_empty() && *method == Method::HEAD {
        bindings = node.bindings_for(&Method::GET).collect();
        head = true;
    }
    if bindings.is_empty() {
        let allowed = node.allowed_methods();
        if *method == Method::OPTIONS {
            return Ok(Route::Options { allowed });
        }
        return Err(RoutingError::MethodNotAllowed { allowed });
    }

    let content_type = ctx.content_type().map_err(RoutingError::BadHeader)?;
    bindings.retain(|b| b.accepts(content_type.as_ref()));
    if bindings.is_empty() {
        return Err(RoutingError::UnsupportedMediaType);
    }

    let accepted = ctx.accept().map_err(RoutingError::BadHeader)?;
    let produced: Vec<&[ProducePreference]> = bindings.iter().map(|b| b.produces()).collect();
    let (index, media_type) =
        negotiate_among(&accepted, &produced).ok_or(RoutingError::NotAcceptable)?;

    warn_on_tie(node, &bindings, &produced, index, &media_type, &accepted);

    Ok(Route::Handler(Selection {
        node: node.clone(),
        binding: bindings[index].clone(),
        media_type,
        head,
    }))
}

fn warn_on_tie(
    node: &RouteNode,
    bindings: &[&Arc<MethodBinding>],
    produced: &[&[ProducePreference]],
    winner: usize,
    media_type: &CombinedMediaType,
    accepted: &[AcceptPreference],
) {
    let tied = produced
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != winner)
        .filter_map(|(i, p)| negotiate(accepted, p).map(|c| (i, c)))
        .find(|(_, c)| c.compare(media_type) == Ordering::Equal);
    if let Some((other, _)) = tied {
        tracing::warn!(
            path = %node.path(),
            method = %bindings[winner].method(),
            chosen = bindings[winner].name().unwrap_or("<unnamed>"),
            other = bindings[other].name().unwrap_or("<unnamed>"),
            media_type = %media_type.media_type,
            "Ambiguous method selection, using the first declared binding"
        );
    }
}
