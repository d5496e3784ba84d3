//! Integration tests for the eager session middleware.

mod common;

use armature_header_session::prelude::*;
use common::*;
use http::{Request, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt, service_fn};

fn layer(client: &Arc<RecordingClient>) -> SessionLayer {
    SessionLayer::new(config(client)).unwrap()
}

#[tokio::test]
async fn test_counter_end_to_end() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    // A: no header, fresh session
    let a = send(&layer, "/session/get", None).await;
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(a.body(), "1");
    let id = session_header(&a).expect("identifier echoed");
    assert_eq!(id.len(), 32);

    // B: same identifier continues the count
    let b = send(&layer, "/session/get", Some(&id)).await;
    assert_eq!(b.body(), "2");
    assert_eq!(session_header(&b).as_deref(), Some(id.as_str()));

    // C: another client starts over
    let c = send(&layer, "/session/get", None).await;
    assert_eq!(c.body(), "1");
    assert_ne!(session_header(&c).as_deref(), Some(id.as_str()));

    // D: a forged identifier is replaced
    let d = send(&layer, "/session/get", Some(FORGED_ID)).await;
    assert_eq!(d.body(), "1");
    let replaced = session_header(&d).unwrap();
    assert_ne!(replaced, FORGED_ID);

    let again = send(&layer, "/session/get", Some(FORGED_ID)).await;
    assert_eq!(again.body(), "1");
}

#[tokio::test]
async fn test_counter_is_strictly_increasing() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let first = send(&layer, "/session/get", None).await;
    let id = session_header(&first).unwrap();

    for expected in 2..=5 {
        let response = send(&layer, "/session/get", Some(&id)).await;
        assert_eq!(response.body(), &expected.to_string());
    }
    assert_eq!(client.sets(), 5);
}

#[tokio::test]
async fn test_records_are_namespaced_and_use_ttl() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let response = send(&layer, "/session/get", None).await;
    let id = session_header(&response).unwrap();

    let stored = client.peek(&format!("koss:test{id}")).await.unwrap();
    assert_eq!(stored.get::<u64>("count"), Some(1));
    assert_eq!(*client.last_ttl.lock().unwrap(), Some(Duration::from_secs(1)));
}

#[tokio::test]
async fn test_read_only_request_does_not_write() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();
    let sets = client.sets();

    let response = send(&layer, "/session/nothing", Some(&id)).await;
    assert_eq!(response.body(), "1");
    assert_eq!(client.sets(), sets);
    assert_eq!(session_header(&response).as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn test_untouched_new_session_is_not_stored() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let response = send(&layer, "/session/notuse", None).await;
    assert_eq!(response.body(), "not touch session");
    assert_eq!(client.sets(), 0);
    assert_eq!(client.stored(), 0);

    // the identifier is still advertised; presenting it later is a miss
    let id = session_header(&response).expect("identifier echoed");
    let response = send(&layer, "/session/get", Some(&id)).await;
    assert_eq!(response.body(), "1");
    assert_ne!(session_header(&response).as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn test_allow_empty_stores_new_sessions() {
    let client = RecordingClient::new();
    let layer = SessionLayer::new(config(&client).with_allow_empty(true)).unwrap();

    let response = send(&layer, "/session/notuse", None).await;
    assert_eq!(client.sets(), 1);
    assert!(session_header(&response).is_some());
}

#[tokio::test]
async fn test_rolling_writes_unchanged_sessions() {
    let client = RecordingClient::new();
    let layer = SessionLayer::new(config(&client).with_rolling(true)).unwrap();

    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();
    assert_eq!(client.sets(), 1);

    send(&layer, "/session/nothing", Some(&id)).await;
    send(&layer, "/session/notuse", Some(&id)).await;
    assert_eq!(client.sets(), 3);
}

#[tokio::test]
async fn test_remove_destroys_and_next_load_starts_fresh() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();
    assert_eq!(send(&layer, "/session/get", Some(&id)).await.body(), "2");

    let removed = send(&layer, "/session/remove", Some(&id)).await;
    assert_eq!(removed.body(), "0");
    assert_eq!(client.destroys(), 1);
    assert!(session_header(&removed).is_none());

    let after = send(&layer, "/session/get", Some(&id)).await;
    assert_eq!(after.body(), "1");
    assert_ne!(session_header(&after).as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn test_remove_on_new_session_makes_no_store_call() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let response = send(&layer, "/session/remove", None).await;
    assert_eq!(response.body(), "0");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_wrong_path_has_no_session() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();
    let gets = client.gets();

    let response = send(&layer, "/wrongpath", Some(&id)).await;
    assert_eq!(response.body(), "no session");
    assert_eq!(client.gets(), gets);

    let root = send(&layer, "/", None).await;
    assert_eq!(root.body(), "no session");
}

#[tokio::test]
async fn test_session_root_path_has_session() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let response = send(&layer, "/session", None).await;
    assert_eq!(response.body(), "has session");
}

#[tokio::test]
async fn test_rewrite_before_read() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let response = send(&layer, "/session/rewrite", None).await;
    assert_eq!(response.body(), r#"{"foo":"bar"}"#);
    assert_eq!(client.sets(), 1);
}

#[tokio::test]
async fn test_resolved_id_is_exposed_to_handler() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();
    let response = send(&layer, "/session/id", Some(&id)).await;
    assert_eq!(response.body(), &id);
}

#[tokio::test]
async fn test_upstream_session_id_overrides_header() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();

    let mut req = Request::get("/session/get")
        .header(HEADER, FORGED_ID)
        .body(())
        .unwrap();
    req.extensions_mut().insert(SessionId(id.clone()));

    let response = layer
        .layer(service_fn(controllers))
        .oneshot(req)
        .await
        .unwrap();
    assert_eq!(response.body(), "2");
    assert_eq!(session_header(&response).as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn test_generator_sees_request() {
    let client = RecordingClient::new();
    let generator = |ctx: &RequestContext| {
        let suffix = ctx
            .headers
            .get("x-sid-append")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        format!("generated{suffix}")
    };
    let layer = SessionLayer::new(config(&client).with_generator(generator)).unwrap();

    let req = Request::get("/session/get")
        .header("x-sid-append", "-test")
        .body(())
        .unwrap();
    let response = layer
        .layer(service_fn(controllers))
        .oneshot(req)
        .await
        .unwrap();

    assert_eq!(session_header(&response).as_deref(), Some("generated-test"));
}

#[tokio::test]
async fn test_repeat_session_layer_is_ignored() {
    let client = RecordingClient::new();
    let outer = layer(&client);
    let inner_client = RecordingClient::new();
    let inner = SessionLayer::new(config(&inner_client)).unwrap();

    let service = outer.layer(inner.layer(service_fn(controllers)));
    let response = service
        .oneshot(Request::get("/session/get").body(()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.body(), "1");
    assert_eq!(client.sets(), 1);
    assert_eq!(inner_client.calls(), 0);
}

#[tokio::test]
async fn test_store_is_exposed_for_introspection() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let service = layer.layer(service_fn(|req: Request<()>| async move {
        let prefix = req
            .extensions()
            .get::<SessionStore>()
            .map(|store| store.prefix().to_string())
            .unwrap_or_default();
        Ok::<_, std::convert::Infallible>(http::Response::new(prefix))
    }));

    let response = service
        .oneshot(Request::get("/elsewhere").body(()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.body(), "koss:test");
}

#[tokio::test]
async fn test_disconnect_fails_requests() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    client.emit(StoreEvent::Disconnect);
    let response = send(&layer, "/session/get", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(client.calls(), 0);

    client.emit(StoreEvent::Connect);
    let response = send(&layer, "/session/get", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "1");
}

#[tokio::test]
async fn test_get_error_without_identifier_is_not_reached() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    client.fail_with(Fault::GetBackend);
    let response = send(&layer, "/session/get", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "1");
    assert_eq!(client.gets(), 0);
}

#[tokio::test]
async fn test_get_error_fails_request() {
    let client = RecordingClient::new();
    let layer = layer(&client);
    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();

    client.fail_with(Fault::GetBackend);
    let response = send(&layer, "/session/get", Some(&id)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // eager mode loads even for routes that ignore the session
    let response = send(&layer, "/session/notuse", Some(&id)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_not_found_error_starts_new_session() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    client.fail_with(Fault::GetNotFound);
    let response = send(&layer, "/session/get", Some(FORGED_ID)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "1");
    assert_ne!(session_header(&response).as_deref(), Some(FORGED_ID));
}

#[tokio::test]
async fn test_set_error_fails_request() {
    let client = RecordingClient::new();
    let layer = layer(&client);
    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();
    assert_eq!(send(&layer, "/session/get", Some(&id)).await.body(), "2");

    client.fail_with(Fault::Set);
    let response = send(&layer, "/session/get", Some(&id)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    client.heal();
    assert_eq!(send(&layer, "/session/get", Some(&id)).await.body(), "3");
}

#[tokio::test]
async fn test_destroy_error_fails_request() {
    let client = RecordingClient::new();
    let layer = layer(&client);
    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();

    client.fail_with(Fault::Destroy);
    let response = send(&layer, "/session/remove", Some(&id)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_custom_error_handler_can_continue() {
    let client = RecordingClient::new();
    let handler = |_err: SessionError, _op: Operation, _ctx: &RequestContext| -> SessionResult<()> {
        Ok(())
    };
    let layer = SessionLayer::new(config(&client).with_error_handler(handler)).unwrap();
    let id = session_header(&send(&layer, "/session/get", None).await).unwrap();

    client.fail_with(Fault::GetBackend);
    let response = send(&layer, "/session/get", Some(&id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "1");

    client.fail_with(Fault::Set);
    let response = send(&layer, "/session/get", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_header(&response).is_some());
}

#[tokio::test]
async fn test_handler_error_skips_persistence() {
    let client = RecordingClient::new();
    let layer = layer(&client);

    let service = layer.layer(service_fn(|req: Request<()>| async move {
        if let Some(handle) = req.extensions().get::<SessionHandle>() {
            let _ = handle.update(|s| s.set("written", true)).await;
        }
        Err::<http::Response<String>, String>("handler failed".to_string())
    }));

    let result = service
        .oneshot(Request::get("/session/get").body(()).unwrap())
        .await;
    assert_eq!(result.unwrap_err(), "handler failed");
    assert_eq!(client.sets(), 0);
}
