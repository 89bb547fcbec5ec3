//! Request path resolution.
//!
//! # Responsibilities
//! - Walk the route tree depth-first, binding template variables
//! - Expand sub-resource locators through the `LocatorCache`
//! - Hand the final node to method selection
//!
//! # Design Decisions
//! - The application tree is immutable after construction; only the
//!   locator cache changes at runtime
//! - Static siblings are backtracked on a miss; once a locator has run the
//!   walk commits to its result
//! - A node whose path is fully consumed serves the request with its own
//!   bindings; a bindingless node defers to its locator

use std::sync::Arc;

use crate::config::schema::RoutingConfig;
use crate::http::request::RequestContext;
use crate::routing::error::{ModelError, RoutingError};
use crate::routing::locator::{CachePolicy, CacheStats, LocatorCache};
use crate::routing::resource::Resource;
use crate::routing::selector::{self, Route};
use crate::routing::tree::{BuildOptions, RouteNode};

/// Locator expansions that consume no path before the walk gives up.
const MAX_EMPTY_EXPANSIONS: usize = 32;

/// Why a walk below a node failed.
enum Miss {
    /// Nothing matched; a later sibling may still match.
    Unmatched,
    /// A locator ran on the way, so the walk is committed to this error.
    Final(RoutingError),
}

impl Miss {
    fn commit(self) -> Miss {
        match self {
            Miss::Unmatched => Miss::Final(RoutingError::NotFound),
            final_miss => final_miss,
        }
    }

    fn into_error(self) -> RoutingError {
        match self {
            Miss::Unmatched => RoutingError::NotFound,
            Miss::Final(err) => err,
        }
    }
}

/// Router construction options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOptions {
    pub build: BuildOptions,
    pub cache: CachePolicy,
}

impl RouterOptions {
    pub fn from_config(config: &RoutingConfig) -> Self {
        Self {
            build: BuildOptions {
                validate: !config.disable_validation,
            },
            cache: CachePolicy::from_config(config),
        }
    }
}

/// Resolves requests against a resource model.
#[derive(Debug)]
pub struct Router {
    root: Arc<RouteNode>,
    cache: LocatorCache,
    build: BuildOptions,
}

impl Router {
    /// Build the tree for `resources`.
    pub fn new(resources: &[Resource], options: RouterOptions) -> Result<Self, ModelError> {
        let root = RouteNode::build_root(resources, options.build)?;
        Ok(Self {
            root,
            cache: LocatorCache::new(options.cache),
            build: options.build,
        })
    }

    pub fn root(&self) -> &Arc<RouteNode> {
        &self.root
    }

    pub fn cache(&self) -> &LocatorCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resolve `ctx` to a handler binding or an OPTIONS answer.
    ///
    /// Path parameters and sub-resource instances found on the way are
    /// recorded on `ctx`.
    pub fn resolve(&self, ctx: &mut RequestContext) -> Result<Route, RoutingError> {
        let node = self.match_path(ctx)?;
        selector::select(&node, ctx)
    }

    /// Find the node serving the request path, ignoring the method.
    pub fn match_path(&self, ctx: &mut RequestContext) -> Result<Arc<RouteNode>, RoutingError> {
        let path = ctx.path().trim_start_matches('/').to_string();
        self.walk(&self.root, "", &path, ctx, 0).map_err(Miss::into_error)
    }

    /// `scope` is the template position of the tree `node` belongs to;
    /// empty for the application tree.
    fn walk(
        &self,
        node: &Arc<RouteNode>,
        scope: &str,
        remaining: &str,
        ctx: &mut RequestContext,
        empty_expansions: usize,
    ) -> Result<Arc<RouteNode>, Miss> {
        let remaining = remaining.trim_start_matches('/');
        if remaining.is_empty() && node.has_bindings() {
            return Ok(node.clone());
        }

        if !remaining.is_empty() {
            for child in node.children() {
                let Some(matched) = child.template().match_path(remaining) else {
                    continue;
                };
                let params = ctx.path_params().len();
                let resources = ctx.resource_depth();
                for (name, value) in matched.values {
                    ctx.path_params_mut().push(name, value);
                }
                match self.walk(child, scope, matched.rest, ctx, 0) {
                    Err(Miss::Unmatched) => {
                        ctx.path_params_mut().truncate(params);
                        ctx.truncate_resources(resources);
                    }
                    result => return result,
                }
            }
        }

        let Some(locator) = node.locator() else {
            return Err(Miss::Unmatched);
        };
        let empty_expansions = if remaining.is_empty() { empty_expansions + 1 } else { 0 };
        if empty_expansions > MAX_EMPTY_EXPANSIONS {
            tracing::warn!(path = %node.path(), "Sub-resource locators never reach a binding");
            return Err(Miss::Unmatched);
        }

        let sub = locator
            .locate(ctx)
            .map_err(|e| Miss::Final(RoutingError::Locator(e)))?;
        let position = format!("{}{}", scope, node.path());
        let build = self.build;
        let expansion = self
            .cache
            .expand(&position, sub, |resource| RouteNode::build_subresource(resource, build))
            .map_err(|e| Miss::Final(RoutingError::SubResource(e)))?;
        if let Some(instance) = expansion.instance {
            ctx.push_resource(instance);
        }
        self.walk(&expansion.tree, &position, remaining, ctx, empty_expansions)
            .map_err(Miss::commit)
    }
}
