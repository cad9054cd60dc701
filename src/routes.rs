//! The route table: a local registry mapping a route name to a handler
//! invocable by peer request.
//!
//! A [`RouteTable`] is mutated only during setup, before a session's reader
//! task starts (spec.md §5) — it therefore needs no internal lock; callers
//! build it, then hand it to a [`crate::client::ClientSessionBuilder`] or
//! [`crate::server::ServerHub`] behind an `Arc`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ZonisError;

/// The future a route handler returns.
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, String>> + Send>>;

/// A locally callable handler: accepts the request's keyword mapping and
/// returns a JSON-encodable value, possibly after asynchronous work.
///
/// Handlers are opaque computations — callers of [`RouteTable::dispatch`]
/// treat them as black boxes keyed by name, per spec.md §4.2.
pub trait RouteHandler: Send + Sync {
    fn call(&self, arguments: serde_json::Map<String, serde_json::Value>) -> HandlerFuture;
}

/// Adapts a plain async closure `Fn(arguments) -> impl Future<Output = Result<Value, String>>`
/// into a [`RouteHandler`], the Rust equivalent of the teacher language's
/// decorator-registered free function (spec.md §9).
struct FnHandler<F>(F);

impl<F, Fut> RouteHandler for FnHandler<F>
where
    F: Fn(serde_json::Map<String, serde_json::Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
{
    fn call(&self, arguments: serde_json::Map<String, serde_json::Value>) -> HandlerFuture {
        Box::pin((self.0)(arguments))
    }
}

/// Wraps a plain async function into a [`RouteHandler`] trait object.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(serde_json::Map<String, serde_json::Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A name-to-handler mapping. Registering a duplicate name is an error;
/// dispatch never swallows a handler's error.
#[derive(Default)]
pub struct RouteTable {
    routes: HashMap<String, Arc<dyn RouteHandler>>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable {
            routes: HashMap::new(),
        }
    }

    /// Insert `name -> handler`. Fails with [`ZonisError::DuplicateRoute`]
    /// if `name` is already present; the table is left unchanged.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<(), ZonisError> {
        let name = name.into();
        if self.routes.contains_key(&name) {
            return Err(ZonisError::DuplicateRoute(name));
        }
        self.routes.insert(name, handler);
        Ok(())
    }

    /// Builder-chain form of [`RouteTable::register`] for the common
    /// "register a few handlers, then freeze" call site.
    pub fn route(mut self, name: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        self.register(name, handler)
            .expect("route/chain: duplicate route name");
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn RouteHandler>> {
        self.routes.get(name).cloned()
    }

    /// Invoke the handler registered under `name`. `UnknownRoute` if absent;
    /// a handler error is captured and returned, never swallowed.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ZonisError> {
        let handler = self
            .lookup(name)
            .ok_or_else(|| ZonisError::UnknownRoute(name.to_owned()))?;
        handler.call(arguments).await.map_err(ZonisError::RequestFailed)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler(value: serde_json::Value) -> Arc<dyn RouteHandler> {
        handler_fn(move |_args| {
            let value = value.clone();
            async move { Ok(value) }
        })
    }

    #[tokio::test]
    async fn register_then_dispatch_returns_handler_value() {
        let mut table = RouteTable::new();
        table
            .register("ping", ok_handler(serde_json::json!("pong")))
            .unwrap();

        let result = table.dispatch("ping", serde_json::Map::new()).await.unwrap();
        assert_eq!(result, serde_json::json!("pong"));
    }

    #[tokio::test]
    async fn duplicate_register_fails_and_leaves_table_unchanged() {
        let mut table = RouteTable::new();
        table
            .register("ping", ok_handler(serde_json::json!("pong")))
            .unwrap();

        let err = table
            .register("ping", ok_handler(serde_json::json!("other")))
            .unwrap_err();
        assert!(matches!(err, ZonisError::DuplicateRoute(name) if name == "ping"));
        assert_eq!(table.len(), 1);
        let result = table.dispatch("ping", serde_json::Map::new()).await.unwrap();
        assert_eq!(result, serde_json::json!("pong"));
    }

    #[tokio::test]
    async fn dispatch_unknown_route_fails() {
        let table = RouteTable::new();
        let err = table.dispatch("nope", serde_json::Map::new()).await.unwrap_err();
        assert!(matches!(err, ZonisError::UnknownRoute(name) if name == "nope"));
    }

    #[tokio::test]
    async fn dispatch_surfaces_handler_error_rather_than_swallowing_it() {
        let mut table = RouteTable::new();
        table
            .register(
                "boom",
                handler_fn(|_args| async { Err("no".to_owned()) }),
            )
            .unwrap();

        let err = table.dispatch("boom", serde_json::Map::new()).await.unwrap_err();
        assert!(matches!(err, ZonisError::RequestFailed(msg) if msg == "no"));
    }

    #[tokio::test]
    async fn builder_chain_registers_multiple_routes() {
        let table = RouteTable::new()
            .route("a", ok_handler(serde_json::json!(1)))
            .route("b", ok_handler(serde_json::json!(2)));
        assert_eq!(table.len(), 2);
    }
}
