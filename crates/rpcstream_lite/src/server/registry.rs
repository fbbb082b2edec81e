use futures::FutureExt;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::error::{RegistryError, Status};
use crate::path::MethodPath;
use crate::server::handler::{
    BidiStreamFn, BidiStreamHandler, ClientStreamFn, ClientStreamHandler, ErasedHandler,
    HandlerContext, RequestStream, ResponseSink, ServerStreamFn, ServerStreamHandler, UnaryFn,
    UnaryHandler,
};
use crate::shape::Shape;

/// Maps method names to computations.
///
/// Names are normalized through [`MethodPath`], so `/pkg.Svc/Method` and
/// `pkg.Svc/Method` refer to the same entry.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Arc<dyn ErasedHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a one-request, one-response computation.
    ///
    /// # Example
    /// ```ignore
    /// registry.register_unary("calculator.CalculatorService/Sum", |_ctx, req: SumRequest| async move {
    ///     Ok(SumResponse { sum_result: req.first_number + req.second_number })
    /// })?;
    /// ```
    pub fn register_unary<Req, Resp, F, Fut>(
        &mut self,
        method: &str,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        Req: prost::Message + Default + 'static,
        Resp: prost::Message + 'static,
        F: Fn(HandlerContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let f: UnaryFn<Req, Resp> = Arc::new(move |ctx, req| handler(ctx, req).boxed());
        self.insert(method, Arc::new(UnaryHandler::new(f)))
    }

    /// Register a computation that answers one request with a stream of responses.
    pub fn register_server_stream<Req, Resp, F, Fut>(
        &mut self,
        method: &str,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        Req: prost::Message + Default + 'static,
        Resp: prost::Message + 'static,
        F: Fn(HandlerContext, Req, ResponseSink<Resp>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let f: ServerStreamFn<Req, Resp> =
            Arc::new(move |ctx, req, responses| handler(ctx, req, responses).boxed());
        self.insert(method, Arc::new(ServerStreamHandler::new(f)))
    }

    /// Register a computation that folds a stream of requests into one response.
    pub fn register_client_stream<Req, Resp, F, Fut>(
        &mut self,
        method: &str,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        Req: prost::Message + Default + 'static,
        Resp: prost::Message + 'static,
        F: Fn(HandlerContext, RequestStream<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let f: ClientStreamFn<Req, Resp> =
            Arc::new(move |ctx, requests| handler(ctx, requests).boxed());
        self.insert(method, Arc::new(ClientStreamHandler::new(f)))
    }

    /// Register a computation that consumes and produces independent streams.
    pub fn register_bidi_stream<Req, Resp, F, Fut>(
        &mut self,
        method: &str,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        Req: prost::Message + Default + 'static,
        Resp: prost::Message + 'static,
        F: Fn(HandlerContext, RequestStream<Req>, ResponseSink<Resp>) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<(), Status>> + Send + 'static,
    {
        let f: BidiStreamFn<Req, Resp> =
            Arc::new(move |ctx, requests, responses| handler(ctx, requests, responses).boxed());
        self.insert(method, Arc::new(BidiStreamHandler::new(f)))
    }

    fn insert(
        &mut self,
        method: &str,
        handler: Arc<dyn ErasedHandler>,
    ) -> Result<(), RegistryError> {
        let method = MethodPath::parse(method)?.to_string();
        let shape = handler.shape();

        match self.handlers.entry(method) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateHandler(entry.key().clone())),
            Entry::Vacant(slot) => {
                info!(method = %slot.key(), shape = %shape, "Registered RPC handler");
                slot.insert(handler);
                Ok(())
            }
        }
    }

    /// Find the computation for `method`, checking it serves `shape`.
    pub(crate) fn lookup(
        &self,
        method: &str,
        shape: Shape,
    ) -> Result<Arc<dyn ErasedHandler>, RegistryError> {
        let method = MethodPath::parse(method)?.to_string();
        let handler = self
            .handlers
            .get(&method)
            .ok_or_else(|| RegistryError::NoHandler(method.clone()))?;

        if handler.shape() != shape {
            return Err(RegistryError::ShapeMismatch {
                method,
                registered: handler.shape(),
                requested: shape,
            });
        }
        Ok(Arc::clone(handler))
    }

    /// The shape served under `method`, if anything is registered there.
    pub fn shape_of(&self, method: &str) -> Option<Shape> {
        let method = MethodPath::parse(method).ok()?.to_string();
        self.handlers.get(&method).map(|handler| handler.shape())
    }

    pub fn has_handler(&self, method: &str) -> bool {
        self.shape_of(method).is_some()
    }

    /// Registered method names, unordered.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Num {
        #[prost(int64, tag = "1")]
        value: i64,
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register_unary("test.Math/Double", |_ctx, req: Num| async move {
                Ok(Num {
                    value: req.value * 2,
                })
            })
            .unwrap();
        registry
            .register_bidi_stream(
                "test.Math/Echo",
                |_ctx, mut requests: RequestStream<Num>, mut responses: ResponseSink<Num>| async move {
                    while let Some(req) = requests.message().await? {
                        responses.send(&req).await?;
                    }
                    Ok(())
                },
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_lookup_by_normalized_name() {
        let registry = registry();
        assert!(registry.has_handler("test.Math/Double"));
        assert!(registry.has_handler("/test.Math/Double"));
        assert_eq!(registry.shape_of("test.Math/Echo"), Some(Shape::BidiStreaming));
        assert!(registry.lookup("/test.Math/Double", Shape::Unary).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let result = registry.register_unary("/test.Math/Double", |_ctx, req: Num| async move {
            Ok(req)
        });
        assert!(matches!(result, Err(RegistryError::DuplicateHandler(name)) if name == "test.Math/Double"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let mut registry = Registry::new();
        let result = registry.register_unary("Double", |_ctx, req: Num| async move { Ok(req) });
        assert!(matches!(result, Err(RegistryError::Path(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_method() {
        let registry = registry();
        assert!(matches!(
            registry.lookup("test.Math/Triple", Shape::Unary),
            Err(RegistryError::NoHandler(_))
        ));
        assert!(!registry.has_handler("not a path"));
    }

    #[test]
    fn test_shape_mismatch() {
        let registry = registry();
        let result = registry.lookup("test.Math/Echo", Shape::Unary);
        assert!(matches!(
            result,
            Err(RegistryError::ShapeMismatch {
                registered: Shape::BidiStreaming,
                requested: Shape::Unary,
                ..
            })
        ));
    }
}
