//! Compiled route tree.
//!
//! # Responsibilities
//! - Compile a resource model into immutable `RouteNode`s
//! - Parse binding media types and compute allowed methods per node
//! - Merge resources declared with the same path
//! - Reject ambiguous bindings (unless validation is disabled). A later
//!   binding may only overlap an earlier one by narrowing its media types
//!
//! # Design Decisions
//! - Nodes get a process-unique `NodeId` for diagnostics
//! - Children are sorted once, most specific template first; ties keep
//!   declaration order
//! - With validation disabled, the first declared of two conflicting
//!   bindings wins and the later one is dropped

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::http::Method;

use crate::dispatch::{Handler, ReturnShape};
use crate::media::{MediaType, ProducePreference};
use crate::routing::error::ModelError;
use crate::routing::resource::{Binding, Locator, Resource};
use crate::routing::template::PathTemplate;

/// Process-unique identity of a route node.
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn next_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Options applied while building a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Reject ambiguous models instead of keeping the first binding.
    pub validate: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// A binding with its media types parsed.
pub struct MethodBinding {
    method: Method,
    consumes: Vec<MediaType>,
    produces: Vec<ProducePreference>,
    handler: Arc<dyn Handler>,
    shape: ReturnShape,
    name: Option<String>,
}

impl MethodBinding {
    fn compile(binding: &Binding, path: &str) -> Result<Self, ModelError> {
        let media_error = |value: &str, source| ModelError::MediaType {
            path: path.to_string(),
            method: binding.method().clone(),
            value: value.to_string(),
            source,
        };
        let consumes = binding
            .consumed()
            .iter()
            .map(|v| v.parse::<MediaType>().map_err(|e| media_error(v, e)))
            .collect::<Result<Vec<_>, _>>()?;
        let produces = binding
            .produced()
            .iter()
            .map(|v| v.parse::<ProducePreference>().map_err(|e| media_error(v, e)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            method: binding.method().clone(),
            consumes,
            produces,
            handler: binding.handler().clone(),
            shape: binding.handler().shape(),
            name: binding.name().map(str::to_string),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Declared request types; empty means any.
    pub fn consumes(&self) -> &[MediaType] {
        &self.consumes
    }

    /// Declared response types; empty means any.
    pub fn produces(&self) -> &[ProducePreference] {
        &self.produces
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    /// Return shape, fixed when the binding was compiled.
    pub fn shape(&self) -> ReturnShape {
        self.shape
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True if a request body of `content_type` can be handed to this
    /// binding. A request without a body type matches anything.
    pub fn accepts(&self, content_type: Option<&MediaType>) -> bool {
        match content_type {
            None => true,
            Some(ct) => self.consumes.is_empty() || self.consumes.iter().any(|c| c.is_compatible(ct)),
        }
    }

    /// Media type pair on which `later` fails to override this binding.
    ///
    /// A later binding for the same method may overlap an earlier one only
    /// where it declares a strictly narrower type, on the request side or
    /// the response side. Empty lists count as `*/*`.
    fn conflict_with(&self, later: &MethodBinding) -> Option<(MediaType, MediaType)> {
        if self.method != later.method {
            return None;
        }
        let response_types = |b: &MethodBinding| -> Vec<MediaType> {
            b.produces.iter().map(|p| p.media_type.clone()).collect()
        };

        let consumed = clash(&self.consumes, &later.consumes)?;
        let produced = clash(&response_types(self), &response_types(later))?;
        Some((consumed, produced))
    }
}

/// First `later` type that overlaps an `earlier` type without narrowing it.
fn clash(earlier: &[MediaType], later: &[MediaType]) -> Option<MediaType> {
    let any = [MediaType::wildcard()];
    let earlier = if earlier.is_empty() { &any[..] } else { earlier };
    let later = if later.is_empty() { &any[..] } else { later };
    later
        .iter()
        .find(|l| earlier.iter().any(|e| e.is_compatible(l) && !l.narrows(e)))
        .cloned()
}

impl fmt::Debug for MethodBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodBinding")
            .field("method", &self.method)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("shape", &self.shape)
            .field("name", &self.name)
            .finish()
    }
}

/// One node of the compiled tree.
pub struct RouteNode {
    id: NodeId,
    template: PathTemplate,
    path: String,
    bindings: Vec<Arc<MethodBinding>>,
    children: Vec<Arc<RouteNode>>,
    locator: Option<Locator>,
}

/// Resources merged under one template, before compilation.
struct Draft<'a> {
    template: PathTemplate,
    bindings: Vec<&'a Binding>,
    children: Vec<&'a Resource>,
    locators: Vec<&'a Locator>,
}

impl<'a> Draft<'a> {
    fn new(template: PathTemplate) -> Self {
        Self {
            template,
            bindings: Vec::new(),
            children: Vec::new(),
            locators: Vec::new(),
        }
    }

    /// Take over a resource's bindings and locator. Children with an
    /// empty path are flattened into this draft too.
    fn absorb(&mut self, resource: &'a Resource) {
        self.bindings.extend(resource.bindings());
        self.locators.extend(resource.get_locator());
        self.adopt(resource.children());
    }

    fn adopt(&mut self, resources: &'a [Resource]) {
        for resource in resources {
            if resource.path().trim_matches('/').is_empty() {
                self.absorb(resource);
            } else {
                self.children.push(resource);
            }
        }
    }
}

impl RouteNode {
    /// Build the application tree from its root resources.
    ///
    /// Root resources with an empty path contribute directly to the root
    /// node; the others become its children.
    pub fn build_root(resources: &[Resource], options: BuildOptions) -> Result<Arc<Self>, ModelError> {
        let mut root = Draft::new(PathTemplate::root());
        root.adopt(resources);
        Self::compile(root, "", options)
    }

    /// Build the tree for a sub-resource model. The model's own path is
    /// ignored.
    pub fn build_subresource(resource: &Resource, options: BuildOptions) -> Result<Arc<Self>, ModelError> {
        let mut root = Draft::new(PathTemplate::root());
        root.absorb(resource);
        Self::compile(root, "", options)
    }

    fn compile(draft: Draft<'_>, parent_path: &str, options: BuildOptions) -> Result<Arc<Self>, ModelError> {
        let path = join_path(parent_path, draft.template.as_str());

        let mut bindings: Vec<Arc<MethodBinding>> = Vec::new();
        for binding in &draft.bindings {
            let compiled = MethodBinding::compile(binding, &path)?;
            if let Some(conflict) = bindings.iter().find_map(|b| b.conflict_with(&compiled)) {
                if options.validate {
                    return Err(ModelError::Ambiguous {
                        path,
                        method: compiled.method,
                        consumes: conflict.0.to_string(),
                        produces: conflict.1.to_string(),
                    });
                }
                tracing::warn!(
                    path = %path,
                    method = %compiled.method,
                    "Dropping binding that conflicts with an earlier one"
                );
                continue;
            }
            bindings.push(Arc::new(compiled));
        }

        if draft.locators.len() > 1 && options.validate {
            return Err(ModelError::DuplicateLocator { path });
        }
        let locator = draft.locators.first().map(|l| (*l).clone());

        // Merge children that share a template, keeping first-seen order.
        let mut groups: Vec<Draft<'_>> = Vec::new();
        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        for child in draft.children {
            let template = PathTemplate::parse(child.path())?;
            let slot = match index.get(template.as_str()) {
                Some(&slot) => slot,
                None => {
                    index.insert(template.as_str().to_string(), groups.len());
                    groups.push(Draft::new(template));
                    groups.len() - 1
                }
            };
            groups[slot].absorb(child);
        }

        let mut children = groups
            .into_iter()
            .map(|group| Self::compile(group, &path, options))
            .collect::<Result<Vec<_>, _>>()?;
        children.sort_by(|a, b| a.template.precedence(&b.template));

        Ok(Arc::new(Self {
            id: next_node_id(),
            template: draft.template,
            path,
            bindings,
            children,
            locator,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Full template path from the tree root, e.g. `/items/{id}`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn bindings(&self) -> &[Arc<MethodBinding>] {
        &self.bindings
    }

    pub fn children(&self) -> &[Arc<RouteNode>] {
        &self.children
    }

    pub fn locator(&self) -> Option<&Locator> {
        self.locator.as_ref()
    }

    pub fn has_bindings(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Bindings for exactly `method`, in declaration order.
    pub fn bindings_for<'a>(&'a self, method: &'a Method) -> impl Iterator<Item = &'a Arc<MethodBinding>> + 'a {
        self.bindings.iter().filter(move |b| b.method() == method)
    }

    /// Declared methods plus OPTIONS, and HEAD when GET is declared.
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.bindings.iter().map(|b| b.method().clone()).collect();
        if methods.contains(&Method::GET) {
            methods.push(Method::HEAD);
        }
        methods.push(Method::OPTIONS);
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods.dedup();
        methods
    }
}

impl fmt::Debug for RouteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteNode")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("bindings", &self.bindings)
            .field("children", &self.children)
            .field("locator", &self.locator.is_some())
            .finish()
    }
}

fn join_path(parent: &str, segment: &str) -> String {
    match (parent.is_empty(), segment.is_empty()) {
        (_, true) if parent.is_empty() => "/".to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{}/{}", parent.trim_end_matches('/'), segment),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestContext;

    fn handler(_: &RequestContext) -> &'static str {
        "ok"
    }

    fn names(methods: &[Method]) -> Vec<&str> {
        methods.iter().map(Method::as_str).collect()
    }

    #[test]
    fn test_allowed_methods() {
        let resource = Resource::new("items").get(handler).post(handler);
        let root = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap();
        let items = &root.children()[0];
        assert_eq!(names(&items.allowed_methods()), vec!["GET", "HEAD", "OPTIONS", "POST"]);
    }

    #[test]
    fn test_allowed_methods_without_get() {
        let root = RouteNode::build_root(&[Resource::new("x").delete(handler)], BuildOptions::default()).unwrap();
        assert_eq!(names(&root.children()[0].allowed_methods()), vec!["DELETE", "OPTIONS"]);
    }

    #[test]
    fn test_paths_and_ids() {
        let resource = Resource::new("/shops/").child(Resource::new("{shop}/items").get(handler));
        let root = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap();
        let shops = &root.children()[0];
        let items = &shops.children()[0];
        assert_eq!(root.path(), "/");
        assert_eq!(shops.path(), "/shops");
        assert_eq!(items.path(), "/shops/{shop}/items");
        assert_ne!(shops.id(), items.id());
    }

    #[test]
    fn test_children_sorted_by_precedence() {
        let resource = Resource::new("items")
            .child(Resource::new("{id}").get(handler))
            .child(Resource::new("new").get(handler));
        let root = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap();
        let order: Vec<&str> = root.children()[0]
            .children()
            .iter()
            .map(|c| c.template().as_str())
            .collect();
        assert_eq!(order, vec!["new", "{id}"]);
    }

    #[test]
    fn test_same_path_resources_merge() {
        let a = Resource::new("items").get(handler);
        let b = Resource::new("/items").post(handler);
        let root = RouteNode::build_root(&[a, b], BuildOptions::default()).unwrap();
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].bindings().len(), 2);
    }

    #[test]
    fn test_root_resource_merges_into_root() {
        let root = RouteNode::build_root(&[Resource::root().get(handler)], BuildOptions::default()).unwrap();
        assert!(root.has_bindings());
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_ambiguous_bindings_rejected() {
        let resource = Resource::new("items").get(handler).get(handler);
        let err = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::Ambiguous { .. }));
    }

    #[test]
    fn test_distinct_produces_not_ambiguous() {
        let resource = Resource::new("items")
            .bind(Binding::get(handler).produces(["text/plain"]))
            .bind(Binding::get(handler).produces(["application/json"]));
        assert!(RouteNode::build_root(&[resource], BuildOptions::default()).is_ok());
    }

    #[test]
    fn test_broader_later_binding_is_ambiguous() {
        let resource = Resource::new("items")
            .bind(Binding::get(handler).produces(["text/plain"]))
            .bind(Binding::get(handler).produces(["text/*"]));
        let err = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap_err();
        let ModelError::Ambiguous { produces, .. } = err else {
            panic!("expected an ambiguity error");
        };
        assert_eq!(produces, "text/*");
    }

    #[test]
    fn test_narrower_later_binding_overrides() {
        let resource = Resource::new("items")
            .bind(Binding::get(handler).produces(["text/*"]))
            .bind(Binding::get(handler).produces(["text/plain"]));
        let root = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap();
        assert_eq!(root.children()[0].bindings().len(), 2);

        let resource = Resource::new("items")
            .get(handler)
            .bind(Binding::get(handler).produces(["application/json"]));
        assert!(RouteNode::build_root(&[resource], BuildOptions::default()).is_ok());
    }

    #[test]
    fn test_narrower_consumes_overrides() {
        let resource = Resource::new("items")
            .post(handler)
            .bind(Binding::post(handler).consumes(["application/json"]));
        assert!(RouteNode::build_root(&[resource], BuildOptions::default()).is_ok());

        let resource = Resource::new("items")
            .bind(Binding::post(handler).consumes(["application/json"]))
            .post(handler);
        let err = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::Ambiguous { .. }));
    }

    #[test]
    fn test_disabled_validation_keeps_first() {
        let resource = Resource::new("items")
            .bind(Binding::get(handler).named("first"))
            .bind(Binding::get(handler).named("second"));
        let root = RouteNode::build_root(&[resource], BuildOptions { validate: false }).unwrap();
        let bindings = root.children()[0].bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name(), Some("first"));
    }

    #[test]
    fn test_invalid_media_type() {
        let resource = Resource::new("items").bind(Binding::get(handler).produces(["text"]));
        let err = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::MediaType { .. }));
    }

    #[test]
    fn test_invalid_template() {
        let err = RouteNode::build_root(&[Resource::new("items/{id")], BuildOptions::default()).unwrap_err();
        assert!(matches!(err, ModelError::Template(_)));
    }

    #[test]
    fn test_accepts_content_type() {
        let resource = Resource::new("x").bind(Binding::post(handler).consumes(["application/json"]));
        let root = RouteNode::build_root(&[resource], BuildOptions::default()).unwrap();
        let binding = &root.children()[0].bindings()[0];
        assert!(binding.accepts(None));
        assert!(binding.accepts(Some(&MediaType::application_json())));
        assert!(!binding.accepts(Some(&MediaType::text_plain())));
    }
}
