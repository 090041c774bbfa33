//! Batch execution.
//!
//! Every item of a batch starts at once. Method items run on their own tasks
//! and are joined in index order; emitter items are handed to the sink and
//! never joined. The aggregated reply holds one entry per non-emitter item,
//! in the order the items were parsed.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use metrics::{counter, histogram};
use serde_json::Value;
use tether_core::{ApplicationError, ClientId};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::emitter::{Emitter, FrameSink};
use crate::parser::parse_frame;
use crate::registry::{EmitterRegistry, MethodRegistry};
use crate::types::{Batch, ParsedItem, Request, RequestId, RequestKind, Response};

/// Routes parsed requests to the method and emitter registries.
#[derive(Clone)]
pub struct Dispatcher {
    methods: Arc<MethodRegistry>,
    emitters: Arc<EmitterRegistry>,
}

enum Slot {
    Ready(Response),
    Running(RequestId, JoinHandle<Result<Value, ApplicationError>>),
}

impl Dispatcher {
    pub fn new(methods: MethodRegistry, emitters: EmitterRegistry) -> Self {
        Self {
            methods: Arc::new(methods),
            emitters: Arc::new(emitters),
        }
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    pub fn emitters(&self) -> &EmitterRegistry {
        &self.emitters
    }

    /// Parse and execute one text frame.
    ///
    /// A frame that is not JSON yields a single parse error entry.
    pub async fn dispatch_frame(
        &self,
        frame: &str,
        client_id: &ClientId,
        sink: &Arc<dyn FrameSink>,
    ) -> Vec<Response> {
        match parse_frame(frame) {
            Ok(batch) => self.dispatch_batch(batch, client_id, sink).await,
            Err(failure) => {
                debug!(client_id = %client_id, reason = %failure.reason, "unparseable frame");
                counter!("rpc_errors_total", "error_type" => "parse_error").increment(1);
                vec![Response::parse_error()]
            }
        }
    }

    /// Execute a parsed batch and collect the non-emitter outcomes.
    pub async fn dispatch_batch(
        &self,
        batch: Batch,
        client_id: &ClientId,
        sink: &Arc<dyn FrameSink>,
    ) -> Vec<Response> {
        histogram!("rpc_batch_size").record(batch.len() as f64);

        let slots: Vec<Slot> = batch
            .into_iter()
            .filter_map(|item| self.start(item, client_id, sink))
            .collect();

        join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Ready(response) => response,
                Slot::Running(id, handle) => settle(id, handle).await,
            }
        }))
        .await
    }

    /// Start one item. Returns `None` for emitters that were launched, since
    /// they contribute nothing to the batch reply.
    fn start(
        &self,
        item: ParsedItem,
        client_id: &ClientId,
        sink: &Arc<dyn FrameSink>,
    ) -> Option<Slot> {
        let request = match item {
            ParsedItem::Request(request) => request,
            ParsedItem::Invalid => {
                counter!("rpc_errors_total", "error_type" => "invalid_request").increment(1);
                return Some(Slot::Ready(Response::invalid_request()));
            }
        };
        counter!("rpc_requests_total", "kind" => request.kind.as_str()).increment(1);

        match request.kind {
            RequestKind::Method => Some(self.start_method(request, client_id)),
            RequestKind::Emitter => self.start_emitter(request, client_id, sink),
        }
    }

    fn start_method(&self, request: Request, client_id: &ClientId) -> Slot {
        let Request {
            id, method, params, ..
        } = request;

        let Some(handler) = self.methods.get(&method) else {
            debug!(method = %method, "method not found");
            counter!("rpc_errors_total", "error_type" => "method_not_found").increment(1);
            return Slot::Ready(Response::error(id, ApplicationError::method_not_found()));
        };

        let client_id = client_id.clone();
        let handle = tokio::spawn(async move { handler.handle(params, &client_id).await });
        Slot::Running(id, handle)
    }

    fn start_emitter(
        &self,
        request: Request,
        client_id: &ClientId,
        sink: &Arc<dyn FrameSink>,
    ) -> Option<Slot> {
        let Request {
            id, method, params, ..
        } = request;

        let Some(handler) = self.emitters.get(&method) else {
            debug!(emitter = %method, "emitter not found");
            counter!("rpc_errors_total", "error_type" => "emitter_not_found").increment(1);
            return Some(Slot::Ready(Response::error(
                id,
                ApplicationError::emitter_not_found(),
            )));
        };

        let emitter = Emitter::new(id, Arc::clone(sink));
        let client_id = client_id.clone();
        sink.spawn(Box::pin(async move {
            let run = handler.run(params, emitter, client_id.clone());
            if AssertUnwindSafe(run).catch_unwind().await.is_err() {
                error!(client_id = %client_id, emitter = %method, "emitter handler panicked");
            }
        }));
        None
    }
}

async fn settle(id: RequestId, handle: JoinHandle<Result<Value, ApplicationError>>) -> Response {
    match handle.await {
        Ok(Ok(result)) => Response::success(id, result),
        Ok(Err(err)) => {
            counter!("rpc_errors_total", "error_type" => err.error_kind()).increment(1);
            Response::error(id, err)
        }
        Err(join_err) => {
            warn!(id = ?id, error = %join_err, "method handler failed");
            counter!("rpc_errors_total", "error_type" => "internal_error").increment(1);
            Response::error(id, ApplicationError::internal_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EmitterHandler, MethodHandler};
    use crate::testutil::RecordingSink;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Sleeps `params[0]` ms, then returns `params[1]`.
    struct Sleepy;

    #[async_trait]
    impl MethodHandler for Sleepy {
        async fn handle(
            &self,
            params: Vec<Value>,
            _client_id: &ClientId,
        ) -> Result<Value, ApplicationError> {
            let ms = params.first().and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(params.get(1).cloned().unwrap_or(Value::Null))
        }
    }

    struct Boom;

    #[async_trait]
    impl MethodHandler for Boom {
        async fn handle(
            &self,
            _params: Vec<Value>,
            _client_id: &ClientId,
        ) -> Result<Value, ApplicationError> {
            Err(ApplicationError::new(-32001, "boom"))
        }
    }

    struct Panics;

    #[async_trait]
    impl MethodHandler for Panics {
        async fn handle(
            &self,
            _params: Vec<Value>,
            _client_id: &ClientId,
        ) -> Result<Value, ApplicationError> {
            panic!("handler exploded");
        }
    }

    struct WhoAmI;

    #[async_trait]
    impl MethodHandler for WhoAmI {
        async fn handle(
            &self,
            _params: Vec<Value>,
            client_id: &ClientId,
        ) -> Result<Value, ApplicationError> {
            Ok(json!(client_id.as_str()))
        }
    }

    struct Count;

    #[async_trait]
    impl EmitterHandler for Count {
        async fn run(&self, _params: Vec<Value>, emitter: Emitter, _client_id: ClientId) {
            let _ = emitter.emit(json!(1));
            let _ = emitter.emit(json!(2));
        }
    }

    struct PanicEmitter;

    #[async_trait]
    impl EmitterHandler for PanicEmitter {
        async fn run(&self, _params: Vec<Value>, _emitter: Emitter, _client_id: ClientId) {
            panic!("emitter exploded");
        }
    }

    fn dispatcher() -> Dispatcher {
        let mut methods = MethodRegistry::new();
        methods.register("sleepy", Sleepy);
        methods.register("boom", Boom);
        methods.register("panics", Panics);
        methods.register("whoami", WhoAmI);
        let mut emitters = EmitterRegistry::new();
        emitters.register("count", Count);
        emitters.register("explode", PanicEmitter);
        Dispatcher::new(methods, emitters)
    }

    async fn run(frame: &str) -> (Vec<Value>, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let dyn_sink: Arc<dyn FrameSink> = sink.clone();
        let responses = dispatcher()
            .dispatch_frame(frame, &ClientId::from_raw("c1"), &dyn_sink)
            .await;
        let values = responses
            .iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        (values, sink)
    }

    async fn wait_for_frames(sink: &RecordingSink, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.frames().len() < n {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn single_request_yields_one_element() {
        let (out, _) = run(r#"{"id":"r1","method":"sleepy","params":[0,"ok"]}"#).await;
        assert_eq!(out, vec![json!({"id": "r1", "result": "ok"})]);
    }

    #[tokio::test]
    async fn parse_failure_yields_single_parse_error() {
        let (out, _) = run("{not json").await;
        assert_eq!(
            out,
            vec![json!({"id": null, "error": {"code": -32700, "message": "Parse error"}})]
        );
    }

    #[tokio::test]
    async fn unknown_method_without_id() {
        let (out, _) = run(r#"{"method":"x"}"#).await;
        assert_eq!(
            out,
            vec![json!({"id": null, "error": {"code": -32601, "message": "Method not found"}})]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batch_order_is_preserved_regardless_of_completion() {
        let (out, _) = run(
            r#"[
                {"id":1,"method":"sleepy","params":[30,"a"]},
                {"id":2,"method":"sleepy","params":[10,"b"]},
                {"id":3,"method":"sleepy","params":[20,"c"]}
            ]"#,
        )
        .await;
        assert_eq!(
            out,
            vec![
                json!({"id": 1, "result": "a"}),
                json!({"id": 2, "result": "b"}),
                json!({"id": 3, "result": "c"}),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batch_items_run_concurrently() {
        let started = tokio::time::Instant::now();
        let (out, _) = run(
            r#"[
                {"id":1,"method":"sleepy","params":[100]},
                {"id":2,"method":"sleepy","params":[100]},
                {"id":3,"method":"sleepy","params":[100]}
            ]"#,
        )
        .await;
        assert_eq!(out.len(), 3);
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn application_error_is_isolated_to_its_item() {
        let (out, _) = run(
            r#"[{"id":"a","method":"boom"},{"id":"b","method":"sleepy","params":[0,5]}]"#,
        )
        .await;
        assert_eq!(
            out,
            vec![
                json!({"id": "a", "error": {"code": -32001, "message": "boom"}}),
                json!({"id": "b", "result": 5}),
            ]
        );
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let (out, _) = run(
            r#"[{"id":1,"method":"panics"},{"id":2,"method":"sleepy","params":[0,true]}]"#,
        )
        .await;
        assert_eq!(
            out,
            vec![
                json!({"id": 1, "error": {"code": -32603, "message": "Internal error"}}),
                json!({"id": 2, "result": true}),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_items_answered_in_place() {
        let (out, _) = run(r#"[{"id":1,"method":"sleepy"}, 7, {"params":[]}]"#).await;
        assert_eq!(
            out,
            vec![
                json!({"id": 1, "result": null}),
                json!({"id": null, "error": {"code": -32600, "message": "Invalid Request"}}),
                json!({"id": null, "error": {"code": -32600, "message": "Invalid Request"}}),
            ]
        );
    }

    #[tokio::test]
    async fn empty_array_yields_empty_reply() {
        let (out, _) = run("[]").await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn handler_sees_client_id() {
        let (out, _) = run(r#"{"id":1,"method":"whoami"}"#).await;
        assert_eq!(out, vec![json!({"id": 1, "result": "c1"})]);
    }

    #[tokio::test]
    async fn emitter_sends_standalone_frames_and_no_batch_entry() {
        let (out, sink) = run(r#"{"id":"e1","method":"count:"}"#).await;
        assert!(out.is_empty());

        wait_for_frames(&sink, 2).await;
        assert_eq!(
            sink.frames_json(),
            vec![json!({"id": "e1", "result": 1}), json!({"id": "e1", "result": 2})]
        );
    }

    #[tokio::test]
    async fn emitter_mixed_with_methods() {
        let (out, sink) = run(
            r#"[{"id":"e1","method":"count:"},{"id":"m1","method":"sleepy","params":[0,"x"]}]"#,
        )
        .await;
        assert_eq!(out, vec![json!({"id": "m1", "result": "x"})]);
        wait_for_frames(&sink, 2).await;
    }

    #[tokio::test]
    async fn unknown_emitter_is_reported_in_batch() {
        let (out, sink) = run(r#"{"id":"e9","method":"nope:"}"#).await;
        assert_eq!(
            out,
            vec![json!({"id": "e9", "error": {"code": -32601, "message": "Emitter not found"}})]
        );
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn method_name_does_not_resolve_emitter() {
        let (out, _) = run(r#"{"id":1,"method":"count"}"#).await;
        assert_eq!(
            out,
            vec![json!({"id": 1, "error": {"code": -32601, "message": "Method not found"}})]
        );
    }

    #[tokio::test]
    async fn panicking_emitter_does_not_affect_batch() {
        let (out, sink) = run(
            r#"[{"id":"e","method":"explode:"},{"id":1,"method":"sleepy","params":[0,1]}]"#,
        )
        .await;
        assert_eq!(out, vec![json!({"id": 1, "result": 1})]);
        tokio::task::yield_now().await;
        assert!(sink.frames().is_empty());
    }
}
