//! Demo catalog served by the binary.
//!
//! ```text
//! GET    /hello                 text/plain or application/json
//! GET    /items                 list
//! POST   /items                 create (application/json)
//! GET    /items/{id}            located item
//! DELETE /items/{id}            remove
//! GET    /items/{id}/quote      deferred price quote
//! GET    /events                streamed ticks
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use resource_runtime::dispatch::Instance;
use resource_runtime::{
    ApplicationBuilder, Binding, HandlerError, Json, Pending, RequestContext, Resource, ResourceType,
    ResponseDescriptor, Sink, SubResource,
};

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub price_cents: u64,
}

#[derive(Debug, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub price_cents: u64,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("item name must not be empty")]
    EmptyName,
}

#[derive(Debug, Serialize)]
struct Greeting {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct Quote {
    id: u32,
    price_cents: u64,
    currency: &'static str,
}

/// In-memory item store.
#[derive(Debug)]
pub struct Catalog {
    items: DashMap<u32, Item>,
    next_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn insert(&self, new: NewItem) -> Result<Item, CatalogError> {
        if new.name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let item = Item {
            id,
            name: new.name,
            price_cents: new.price_cents,
        };
        self.items.insert(id, item.clone());
        Ok(item)
    }

    pub fn get(&self, id: u32) -> Option<Item> {
        self.items.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: u32) -> bool {
        self.items.remove(&id).is_some()
    }

    pub fn list(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.iter().map(|entry| entry.value().clone()).collect();
        items.sort_by_key(|item| item.id);
        items
    }
}

/// One catalog item, located from `/items/{id}`.
pub struct ItemResource {
    catalog: Arc<Catalog>,
    item: Item,
}

impl ResourceType for ItemResource {
    fn resource() -> Resource {
        Resource::root()
            .bind(
                Binding::get(|_: &RequestContext, Instance(this): Instance<ItemResource>| {
                    Json(this.item.clone())
                })
                .produces(["application/json"])
                .named("item.show"),
            )
            .bind(
                Binding::delete(|_: &RequestContext, Instance(this): Instance<ItemResource>| {
                    this.catalog.remove(this.item.id);
                })
                .named("item.delete"),
            )
            .child(
                Resource::new("quote").bind(
                    Binding::get(|_: &RequestContext, Instance(this): Instance<ItemResource>| {
                        let id = this.item.id;
                        let price_cents = this.item.price_cents;
                        Pending::new(async move {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(Json(Quote {
                                id,
                                price_cents,
                                currency: "EUR",
                            }))
                        })
                    })
                    .produces(["application/json"])
                    .named("item.quote"),
                ),
            )
    }
}

fn locate_item(catalog: &Arc<Catalog>, ctx: &RequestContext) -> Result<SubResource, HandlerError> {
    let not_found = || HandlerError::with_status(StatusCode::NOT_FOUND, "no such item");
    let id: u32 = ctx
        .path_params()
        .get("id")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(not_found)?;
    let item = catalog.get(id).ok_or_else(not_found)?;
    Ok(SubResource::instance(ItemResource {
        catalog: Arc::clone(catalog),
        item,
    }))
}

fn hello() -> Resource {
    Resource::new("hello")
        .bind(
            Binding::get(|_: &RequestContext| "Hello from resource-runtime\n")
                .produces(["text/plain"])
                .named("hello.text"),
        )
        .bind(
            Binding::get(|_: &RequestContext| {
                Json(Greeting {
                    message: "Hello from resource-runtime",
                })
            })
            .produces(["application/json;qs=0.9"])
            .named("hello.json"),
        )
}

fn items(catalog: Arc<Catalog>) -> Resource {
    let list = Arc::clone(&catalog);
    let create = Arc::clone(&catalog);
    Resource::new("items")
        .bind(
            Binding::get(move |_: &RequestContext| Json(list.list()))
                .produces(["application/json"])
                .named("items.list"),
        )
        .bind(
            Binding::post(move |_: &RequestContext, Json(new): Json<NewItem>| {
                let item = create.insert(new)?;
                Ok::<_, HandlerError>(
                    ResponseDescriptor::created(&format!("/items/{}", item.id)).entity(Json(item)),
                )
            })
            .consumes(["application/json"])
            .produces(["application/json"])
            .named("items.create"),
        )
        .sub_resource("{id}", move |ctx: &RequestContext| locate_item(&catalog, ctx))
}

fn events() -> Resource {
    Resource::new("events").bind(
        Binding::get(|_: &RequestContext, sink: Sink| {
            tokio::spawn(async move {
                for tick in 0..5 {
                    if sink.write(format!("tick {}\n", tick)).and_then(|_| sink.flush()).is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                sink.close();
            });
        })
        .produces(["text/plain"])
        .named("events.stream"),
    )
}

/// Register the demo resources and their error mapping.
pub fn install(builder: ApplicationBuilder, catalog: Arc<Catalog>) -> ApplicationBuilder {
    builder
        .resource(hello())
        .resource(items(catalog))
        .resource(events())
        .error_mapper(|e: &CatalogError| {
            ResponseDescriptor::new(StatusCode::UNPROCESSABLE_ENTITY).entity(e.to_string())
        })
}
