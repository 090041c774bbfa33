//! Method and emitter registries.
//!
//! Both map a bare name to a handler. Registration happens before the server
//! starts; lookups afterwards are read-only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::{ApplicationError, ClientId};
use tracing::warn;

use crate::emitter::Emitter;

/// Request/response handler. The returned value becomes `result`; an error
/// becomes the response's `error` object.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(
        &self,
        params: Vec<Value>,
        client_id: &ClientId,
    ) -> Result<Value, ApplicationError>;
}

/// Streaming handler. Sends any number of frames through `emitter`; nothing
/// is placed in the batch reply for it.
#[async_trait]
pub trait EmitterHandler: Send + Sync {
    async fn run(&self, params: Vec<Value>, emitter: Emitter, client_id: ClientId);
}

/// Name → [`MethodHandler`].
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler. A second registration under the same name
    /// replaces the first.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        if self
            .handlers
            .insert(method.to_owned(), Arc::new(handler))
            .is_some()
        {
            warn!(method, "method handler replaced");
        }
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Name → [`EmitterHandler`]. Names are stored without the trailing marker.
pub struct EmitterRegistry {
    handlers: HashMap<String, Arc<dyn EmitterHandler>>,
}

impl EmitterRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, handler: impl EmitterHandler + 'static) {
        if self
            .handlers
            .insert(name.to_owned(), Arc::new(handler))
            .is_some()
        {
            warn!(emitter = name, "emitter handler replaced");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EmitterHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for EmitterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RecordingSink;
    use serde_json::json;

    struct Constant(i64);

    #[async_trait]
    impl MethodHandler for Constant {
        async fn handle(
            &self,
            _params: Vec<Value>,
            _client_id: &ClientId,
        ) -> Result<Value, ApplicationError> {
            Ok(json!(self.0))
        }
    }

    struct Once;

    #[async_trait]
    impl EmitterHandler for Once {
        async fn run(&self, params: Vec<Value>, emitter: Emitter, _client_id: ClientId) {
            let _ = emitter.emit(Value::Array(params));
        }
    }

    #[tokio::test]
    async fn register_and_get_method() {
        let mut reg = MethodRegistry::new();
        reg.register("one", Constant(1));

        let handler = reg.get("one").unwrap();
        let result = handler.handle(vec![], &ClientId::from_raw("c")).await.unwrap();
        assert_eq!(result, json!(1));
        assert!(reg.get("two").is_none());
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut reg = MethodRegistry::new();
        reg.register("n", Constant(1));
        reg.register("n", Constant(2));

        assert_eq!(reg.len(), 1);
        let result = reg.get("n").unwrap().handle(vec![], &ClientId::new()).await.unwrap();
        assert_eq!(result, json!(2));
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = MethodRegistry::new();
        reg.register("zeta", Constant(0));
        reg.register("alpha", Constant(0));
        reg.register("mid", Constant(0));
        assert_eq!(reg.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn empty_registry() {
        let reg = MethodRegistry::default();
        assert!(reg.is_empty());
        assert!(!reg.contains("anything"));
    }

    #[tokio::test]
    async fn emitter_registry_runs_handler() {
        let mut reg = EmitterRegistry::new();
        reg.register("feed", Once);
        assert!(reg.contains("feed"));
        assert!(!reg.contains("feed:"));

        let sink = RecordingSink::new();
        let emitter = Emitter::new("e1".into(), sink.clone());
        reg.get("feed")
            .unwrap()
            .run(vec![json!("a")], emitter, ClientId::new())
            .await;

        assert_eq!(sink.frames_json(), vec![json!({"id": "e1", "result": ["a"]})]);
    }

    #[tokio::test]
    async fn method_and_emitter_namespaces_are_separate() {
        let mut methods = MethodRegistry::new();
        let mut emitters = EmitterRegistry::new();
        methods.register("x", Constant(1));
        emitters.register("x", Once);
        methods.register("method_only", Constant(2));
        emitters.register("emitter_only", Once);

        assert!(!emitters.contains("method_only"));
        assert!(!methods.contains("emitter_only"));

        let result = methods
            .get("x")
            .unwrap()
            .handle(vec![json!("p")], &ClientId::new())
            .await
            .unwrap();
        assert_eq!(result, json!(1));

        let sink = RecordingSink::new();
        emitters
            .get("x")
            .unwrap()
            .run(vec![json!("p")], Emitter::new("e".into(), sink.clone()), ClientId::new())
            .await;
        assert_eq!(sink.frames_json(), vec![json!({"id": "e", "result": ["p"]})]);
    }
}
