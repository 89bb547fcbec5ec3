//! Sub-resource locators and the locator cache.
//!
//! # Responsibilities
//! - `SubResource`: what a locator may return (a resource type, an
//!   instance of one, or a resource model)
//! - `LocatorCache`: memoize the route tree built for a locator result,
//!   keyed by (locator position, target)
//! - Apply the cache policy: model caching switch, max age, size bound
//!
//! # Design Decisions
//! - Types and instances are always cached: the tree of a type never
//!   changes. Models are only cached when model caching is enabled
//! - A position is the template path of the locator node from the
//!   application root, through every expansion on the way. It is the same
//!   on every request, even when an enclosing tree was rebuilt
//! - A shared model (`Arc<Resource>`) is keyed by identity and the entry
//!   keeps the `Arc` alive, so a key is never reused by another model
//! - The map guard is never held while a tree is built; two racing misses
//!   both build and the last insert wins
//! - Ages use `tokio::time::Instant` so they follow a paused test clock

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::schema::{CacheAgeSetting, RoutingConfig};
use crate::observability::metrics;
use crate::routing::error::ModelError;
use crate::routing::resource::Resource;
use crate::routing::tree::RouteNode;

/// Default bound on the number of cached sub-resource trees.
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// A type whose values can serve as sub-resources.
pub trait ResourceType: Send + Sync + 'static {
    /// The resource model served by this type. Its own path is ignored.
    fn resource() -> Resource;
}

/// The result of a sub-resource locator.
#[derive(Clone)]
pub enum SubResource {
    /// A resource type; instances are not needed by its handlers.
    Type {
        id: TypeId,
        name: &'static str,
        build: fn() -> Resource,
    },
    /// An instance of a resource type, available to handlers through
    /// `Instance<T>`.
    Instance {
        id: TypeId,
        name: &'static str,
        build: fn() -> Resource,
        instance: Arc<dyn Any + Send + Sync>,
    },
    /// A resource model built for this request.
    Model(Resource),
    /// A resource model shared between calls.
    Shared(Arc<Resource>),
}

impl SubResource {
    pub fn of<T: ResourceType>() -> Self {
        SubResource::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            build: T::resource,
        }
    }

    pub fn instance<T: ResourceType>(value: T) -> Self {
        SubResource::Instance {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            build: T::resource,
            instance: Arc::new(value),
        }
    }

    pub fn model(resource: Resource) -> Self {
        SubResource::Model(resource)
    }

    pub fn shared(resource: Arc<Resource>) -> Self {
        SubResource::Shared(resource)
    }

    fn target(&self) -> CacheTarget {
        match self {
            SubResource::Type { id, .. } | SubResource::Instance { id, .. } => CacheTarget::Type(*id),
            SubResource::Model(_) => CacheTarget::Model,
            SubResource::Shared(resource) => CacheTarget::Shared(Arc::as_ptr(resource) as usize),
        }
    }

    fn is_model(&self) -> bool {
        matches!(self, SubResource::Model(_) | SubResource::Shared(_))
    }
}

impl fmt::Debug for SubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubResource::Type { name, .. } => f.debug_tuple("Type").field(name).finish(),
            SubResource::Instance { name, .. } => f.debug_tuple("Instance").field(name).finish(),
            SubResource::Model(resource) => f.debug_tuple("Model").field(resource).finish(),
            SubResource::Shared(resource) => f.debug_tuple("Shared").field(resource).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CacheTarget {
    Type(TypeId),
    Model,
    Shared(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    position: String,
    target: CacheTarget,
}

struct CacheEntry {
    tree: Arc<RouteNode>,
    inserted: Instant,
    _pin: Option<Arc<Resource>>,
}

/// How long cached trees stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAge {
    /// Entries never expire.
    Unbounded,
    /// Entries older than this are rebuilt.
    MaxAge(Duration),
    /// Every entry is already expired; nothing is cached.
    Expired,
}

impl CacheAge {
    /// Interpret the configured value.
    ///
    /// Absent or non-positive values never expire; a non-numeric value
    /// disables caching.
    pub fn from_setting(setting: Option<&CacheAgeSetting>) -> Self {
        let seconds = match setting {
            None => return CacheAge::Unbounded,
            Some(CacheAgeSetting::Seconds(seconds)) => *seconds,
            Some(CacheAgeSetting::Text(text)) => match text.trim().parse::<i64>() {
                Ok(seconds) => seconds,
                Err(_) => {
                    tracing::warn!(value = %text, "Invalid locator cache age, sub-resources will not be cached");
                    return CacheAge::Expired;
                }
            },
        };
        if seconds <= 0 {
            CacheAge::Unbounded
        } else {
            CacheAge::MaxAge(Duration::from_secs(seconds.unsigned_abs()))
        }
    }

    fn is_fresh(&self, inserted: Instant) -> bool {
        match self {
            CacheAge::Unbounded => true,
            CacheAge::MaxAge(max) => inserted.elapsed() < *max,
            CacheAge::Expired => false,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Cache trees built from resource models, not only from types.
    pub model_caching: bool,
    pub max_age: CacheAge,
    pub capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            model_caching: false,
            max_age: CacheAge::Unbounded,
            capacity: DEFAULT_CACHE_SIZE,
        }
    }
}

impl CachePolicy {
    pub fn from_config(config: &RoutingConfig) -> Self {
        let capacity = match usize::try_from(config.locator_cache_size) {
            Ok(size) if size > 0 => size,
            _ => {
                tracing::warn!(
                    value = config.locator_cache_size,
                    default = DEFAULT_CACHE_SIZE,
                    "Invalid locator cache size, using default"
                );
                DEFAULT_CACHE_SIZE
            }
        };
        Self {
            model_caching: config.model_caching,
            max_age: CacheAge::from_setting(config.locator_cache_age.as_ref()),
            capacity,
        }
    }
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    /// Locator results that had to be expanded into a tree.
    pub expansions: u64,
    pub entries: usize,
}

/// A resolved locator result.
pub struct Expansion {
    pub tree: Arc<RouteNode>,
    pub instance: Option<Arc<dyn Any + Send + Sync>>,
}

/// Memoizes sub-resource route trees.
pub struct LocatorCache {
    entries: DashMap<CacheKey, CacheEntry>,
    policy: CachePolicy,
    hits: AtomicU64,
    expansions: AtomicU64,
}

impl LocatorCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            hits: AtomicU64::new(0),
            expansions: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Route tree for a locator result at `position`, built with `build`
    /// on a miss.
    pub fn expand<B>(&self, position: &str, sub: SubResource, build: B) -> Result<Expansion, ModelError>
    where
        B: FnOnce(&Resource) -> Result<Arc<RouteNode>, ModelError>,
    {
        let key = CacheKey {
            position: position.to_string(),
            target: sub.target(),
        };
        let cacheable = !sub.is_model() || self.policy.model_caching;

        let (source, pin, instance) = match sub {
            SubResource::Type { build, .. } => (ModelSource::Type(build), None, None),
            SubResource::Instance { build, instance, .. } => (ModelSource::Type(build), None, Some(instance)),
            SubResource::Model(resource) => (ModelSource::Owned(resource), None, None),
            SubResource::Shared(resource) => (ModelSource::Shared(resource.clone()), Some(resource), None),
        };

        if cacheable {
            if let Some(tree) = self.lookup(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_locator_cache("hit");
                return Ok(Expansion { tree, instance });
            }
        }

        self.expansions.fetch_add(1, Ordering::Relaxed);
        metrics::record_locator_cache("miss");
        let tree = match source {
            ModelSource::Type(model) => build(&model())?,
            ModelSource::Owned(resource) => build(&resource)?,
            ModelSource::Shared(resource) => build(&resource)?,
        };
        tracing::debug!(position, cached = cacheable, "Expanded sub-resource");

        if cacheable && self.policy.max_age != CacheAge::Expired {
            self.insert(key, tree.clone(), pin);
        }
        Ok(Expansion { tree, instance })
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<RouteNode>> {
        let fresh = {
            let entry = self.entries.get(key)?;
            if self.policy.max_age.is_fresh(entry.inserted) {
                return Some(entry.tree.clone());
            }
            entry.inserted
        };
        // Remove only the entry we saw; a concurrent refresh stays.
        self.entries.remove_if(key, |_, entry| entry.inserted == fresh);
        None
    }

    fn insert(&self, key: CacheKey, tree: Arc<RouteNode>, pin: Option<Arc<Resource>>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.policy.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.inserted)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                tree,
                inserted: Instant::now(),
                _pin: pin,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            expansions: self.expansions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl fmt::Debug for LocatorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorCache")
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Where the model for an expansion comes from; types are only asked for
/// their model on a miss.
enum ModelSource {
    Type(fn() -> Resource),
    Owned(Resource),
    Shared(Arc<Resource>),
}
