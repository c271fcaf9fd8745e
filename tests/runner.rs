
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use comfyui_workflow::*;
use image::GenericImageView;
use serde_json::json;
use test_helpers::*;

fn graph() -> ExecutionGraph {
    serde_json::from_value(json!({
        "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "a.safetensors"}},
        "9": {"class_type": "SaveImage", "_meta": {"title": "Result Image"},
              "inputs": {"filename_prefix": "ComfyUI", "images": ["8", 0]}}
    }))
    .unwrap()
}

fn image_history() -> serde_json::Value {
    history(json!({
        "9": {"images": [
            {"filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output"},
            {"filename": "ComfyUI_00002_.png", "subfolder": "", "type": "output"}
        ]},
        "12": {"text": ["a caption"]}
    }))
}

fn push_runner() -> JobRunner {
    JobRunner::new(Box::new(PushCompletion::default()))
}

// ── Submit ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_submit_sends_graph_and_client_id() {
    let (transport, log) = MockTransport::new(fake_server(image_history()));
    let session = poll_session(transport);

    let prompt_id = JobRunner::submit(&session, &graph()).await.unwrap();
    assert_eq!(prompt_id, PROMPT_ID);

    let requests = log.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    let RequestBody::Json(body) = &requests[0].body else {
        panic!("expected JSON body");
    };
    assert_eq!(body["client_id"], CLIENT_ID);
    assert_eq!(body["prompt"]["9"]["inputs"]["images"], json!(["8", 0]));
}

#[tokio::test]
async fn test_submit_without_prompt_id_is_protocol_error() {
    let (transport, _) = MockTransport::new(|_| Ok(ApiResponse::json_ok(&json!({"number": 3}))));
    let err = JobRunner::submit(&poll_session(transport), &graph())
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::Protocol(_)));
}

#[tokio::test]
async fn test_submit_invalid_body_is_decode_error() {
    let (transport, _) = MockTransport::new(|_| Ok(ApiResponse::new(200, "<html>")));
    let err = JobRunner::submit(&poll_session(transport), &graph())
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::Decode(_)));
}

#[tokio::test]
async fn test_submit_node_errors() {
    let (transport, _) = MockTransport::new(|_| {
        Ok(ApiResponse::json_ok(&json!({
            "prompt_id": "x",
            "node_errors": {"4": {"errors": [{"message": "Value not in list"}]}}
        })))
    });
    let err = JobRunner::submit(&poll_session(transport), &graph())
        .await
        .unwrap_err();
    match err {
        ComfyError::NodeErrors(detail) => assert!(detail.contains("Value not in list")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_submit_http_error() {
    let (transport, _) = MockTransport::new(|_| Ok(ApiResponse::new(400, "bad prompt")));
    let err = JobRunner::submit(&poll_session(transport), &graph())
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::Http { status: 400, .. }));
    assert!(err.is_connection());
}

// ── Push completion ────────────────────────────────────────────────

#[tokio::test]
async fn test_push_run_completes_on_sentinel() {
    let (transport, log) = MockTransport::new(fake_server(image_history()));
    let mut session = push_session(
        transport,
        vec![
            Notification::Other("status".into()),
            executing(Some("4"), PROMPT_ID),
            Notification::Progress { value: 5, max: 20 },
            executing(Some("9"), PROMPT_ID),
            executing(None, PROMPT_ID),
        ],
    );

    let mut runner = push_runner();
    let result = runner.run(&mut session, &graph()).await.unwrap();

    assert_eq!(runner.state(), JobState::OutputsFetched);
    assert_eq!(result["9"].images.len(), 2);
    assert_eq!(result["9"].image().unwrap().width(), 2);
    assert_eq!(result["12"].text, Some(vec!["a caption".to_string()]));
    assert!(result["12"].images.is_empty());
    assert_eq!(log.count("/prompt"), 1);
}

#[tokio::test]
async fn test_push_ignores_other_jobs() {
    let (transport, log) = MockTransport::new(fake_server(image_history()));
    let mut session = push_session(
        transport,
        vec![
            executing(None, "someone-else"),
            Notification::ExecutionError {
                prompt_id: Some("someone-else".into()),
                message: "boom".into(),
            },
            Notification::Executing {
                node: None,
                prompt_id: None,
            },
        ],
    );

    // The script runs out before this job's sentinel arrives.
    let err = push_runner().run(&mut session, &graph()).await.unwrap_err();
    assert!(matches!(err, ComfyError::ConnectionClosed));
    assert_eq!(log.count("/view"), 0);
}

#[tokio::test]
async fn test_push_execution_error_fails_job() {
    let (transport, _) = MockTransport::new(fake_server(image_history()));
    let mut session = push_session(
        transport,
        vec![
            executing(Some("4"), PROMPT_ID),
            Notification::ExecutionError {
                prompt_id: Some(PROMPT_ID.into()),
                message: "CUDA out of memory".into(),
            },
        ],
    );

    let mut runner = push_runner();
    let err = runner.run(&mut session, &graph()).await.unwrap_err();
    match err {
        ComfyError::ExecutionFailed { prompt_id, message } => {
            assert_eq!(prompt_id, PROMPT_ID);
            assert_eq!(message, "CUDA out of memory");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.state(), JobState::Failed);
}

#[tokio::test]
async fn test_push_without_channel_is_connection_closed() {
    let (transport, _) = MockTransport::new(fake_server(image_history()));
    let mut session = poll_session(transport);
    let err = push_runner().run(&mut session, &graph()).await.unwrap_err();
    assert!(matches!(err, ComfyError::ConnectionClosed));
}

#[tokio::test(start_paused = true)]
async fn test_push_idle_timeout() {
    let (transport, _) = MockTransport::new(fake_server(image_history()));
    let mut session = Session::from_parts(
        CLIENT_ID,
        Box::new(transport),
        Some(Box::new(SilentNotifications)),
    );

    let mut runner = JobRunner::new(Box::new(PushCompletion {
        idle_timeout: Some(Duration::from_secs(30)),
    }));
    let err = runner.run(&mut session, &graph()).await.unwrap_err();
    assert!(matches!(err, ComfyError::Timeout { .. }));
    assert_eq!(runner.state(), JobState::Failed);
}

// ── Poll completion ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_poll_run_waits_for_outputs() {
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    let server = fake_server(image_history());
    let (transport, log) = MockTransport::new(move |req| {
        if req.path == format!("/history/{}", PROMPT_ID) {
            // Pending for the first two polls.
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                return Ok(ApiResponse::json_ok(&json!({})));
            }
        }
        server(req)
    });
    let mut session = poll_session(transport);

    let mut runner = JobRunner::new(Box::new(PollCompletion::default()));
    let result = runner.run(&mut session, &graph()).await.unwrap();

    assert_eq!(runner.state(), JobState::OutputsFetched);
    assert_eq!(result.len(), 2);
    // Three status polls plus the final history fetch.
    assert_eq!(log.count("/history/job-1"), 4);
}

#[tokio::test(start_paused = true)]
async fn test_poll_times_out_after_exact_bound() {
    let (transport, log) = MockTransport::new(|req| match req.path.as_str() {
        "/prompt" => Ok(ApiResponse::json_ok(&json!({"prompt_id": PROMPT_ID}))),
        // Present, but never gains outputs.
        _ => Ok(ApiResponse::json_ok(&json!({PROMPT_ID: {"status": {}}}))),
    });
    let mut session = poll_session(transport);

    let mut runner = JobRunner::new(Box::new(PollCompletion::default()));
    let err = runner.run(&mut session, &graph()).await.unwrap_err();

    assert!(matches!(err, ComfyError::Timeout { .. }));
    assert_eq!(log.count("/history/job-1"), 300);
    assert_eq!(runner.state(), JobState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_poll_swallows_transient_errors() {
    let polls = Arc::new(AtomicU32::new(0));
    let counter = polls.clone();
    let server = fake_server(image_history());
    let (transport, _) = MockTransport::new(move |req| {
        if req.path.starts_with("/history/") && counter.fetch_add(1, Ordering::SeqCst) < 3 {
            return Ok(ApiResponse::new(502, "bad gateway"));
        }
        server(req)
    });
    let mut session = poll_session(transport);

    let poll = PollCompletion {
        interval: Duration::from_millis(10),
        max_attempts: 5,
    };
    poll.await_completion(&mut session, PROMPT_ID).await.unwrap();
    assert_eq!(polls.load(Ordering::SeqCst), 4);
}

// ── Outputs ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_collect_outputs_fetches_each_image() {
    let (transport, log) = MockTransport::new(fake_server(image_history()));
    let session = poll_session(transport);

    let result = JobRunner::collect_outputs(&session, PROMPT_ID).await.unwrap();
    assert_eq!(log.count("/view"), 2);

    let views: Vec<_> = log
        .requests()
        .into_iter()
        .filter(|r| r.path == "/view")
        .collect();
    assert!(views[0]
        .query
        .contains(&("filename".to_string(), "ComfyUI_00001_.png".to_string())));
    assert!(views[1]
        .query
        .contains(&("type".to_string(), "output".to_string())));

    let keys: Vec<_> = result.keys().cloned().collect();
    assert_eq!(keys, ["9", "12"]);
    assert_eq!(result["9"].images[1].reference.filename, "ComfyUI_00002_.png");
}

#[tokio::test]
async fn test_collect_outputs_missing_entry() {
    let (transport, _) = MockTransport::new(|_| Ok(ApiResponse::json_ok(&json!({}))));
    let err = JobRunner::collect_outputs(&poll_session(transport), PROMPT_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, ComfyError::Protocol(_)));
}

#[tokio::test]
async fn test_collect_outputs_keeps_undecodable_artifact() {
    let (transport, _) = MockTransport::new(|req| match req.path.as_str() {
        "/view" => Ok(ApiResponse::new(200, "not an image")),
        _ => Ok(ApiResponse::json_ok(&history(json!({
            "9": {"images": [{"filename": "clip_00001.webm"}]}
        })))),
    });
    let result = JobRunner::collect_outputs(&poll_session(transport), PROMPT_ID)
        .await
        .unwrap();

    let artifact = &result["9"].images[0];
    assert!(artifact.image.is_none());
    assert_eq!(artifact.bytes, b"not an image");
    assert_eq!(artifact.reference.filename, "clip_00001.webm");
    assert!(result["9"].image().is_none());
}

#[tokio::test]
async fn test_session_closed_mid_use() {
    let (transport, _) = MockTransport::new(fake_server(image_history()));
    let mut session = push_session(transport, vec![]);
    session.close().await;
    session.close().await;

    assert!(!session.is_open());
    assert!(!session.has_notifications());
    let err = JobRunner::submit(&session, &graph()).await.unwrap_err();
    assert!(matches!(err, ComfyError::NotConnected));
}
