//! Read/dispatch loop.

use std::sync::Arc;

use metrics::counter;
use tether_core::{HandlerError, InboundMessage, OutboundMessage};
use tracing::{Instrument, debug, error, trace, warn};

use super::classify::{Classification, classify};
use super::handler::{MessageHandler, SessionContext};
use super::transport::{FrameReader, ReadError};
use crate::metrics::{WS_DECODE_FAILURES_TOTAL, WS_HANDLER_ERRORS_TOTAL};

/// Read frames until the connection fails, spawning one handler task per message.
///
/// Handler tasks are spawned in arrival order and never awaited here. Returns
/// the read error that ended the loop.
pub(crate) async fn run_read_loop<R: FrameReader>(
    reader: &mut R,
    ctx: &SessionContext,
    handler: &Arc<dyn MessageHandler>,
) -> ReadError {
    loop {
        let frame = match reader.next_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                if let Some(code) = err.unexpected_close_code() {
                    warn!(%code, error = %err, "unexpected websocket closure");
                } else {
                    debug!(error = %err, "websocket read ended");
                }
                return err;
            }
        };

        let message = match InboundMessage::decode(frame.payload()) {
            Ok(message) => message,
            Err(e) => {
                counter!(WS_DECODE_FAILURES_TOTAL).increment(1);
                trace!(error = %e, "dropping malformed frame");
                continue;
            }
        };

        dispatch(ctx.clone(), Arc::clone(handler), message);
    }
}

fn dispatch(ctx: SessionContext, handler: Arc<dyn MessageHandler>, message: InboundMessage) {
    let _ = tokio::spawn(
        async move {
            if let Err(err) = handler.handle(&ctx, &message).await {
                handle_failure(&ctx, &message, &err).await;
            }
        }
        .in_current_span(),
    );
}

async fn handle_failure(ctx: &SessionContext, message: &InboundMessage, err: &HandlerError) {
    counter!(WS_HANDLER_ERRORS_TOTAL, "kind" => err.kind()).increment(1);
    match classify(err) {
        Classification::TerminateSession => {
            debug!(event = %message.event, "resource suspended, ending session");
            ctx.token().cancel();
        }
        Classification::ReplyError => {
            let reply = OutboundMessage::error_reply(message, err);
            if let Some(error_ref) = &reply.error_ref {
                error!(%error_ref, event = %message.event, error = %err, "failed to handle websocket message");
            } else {
                debug!(event = %message.event, error = %err, "websocket message rejected");
            }
            if let Err(e) = ctx.send(&reply).await {
                debug!(error = %e, "failed to send error reply");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::memory::{self, WrittenFrame};
    use crate::websocket::test_helpers::{ScriptedHandler, make_context};
    use crate::websocket::transport::FrameWriter;
    use proptest::prelude::*;
    use tether_core::messages::{DAEMON_ERROR, GENERIC_ERROR_TEXT};
    use tokio::time::{Duration, timeout};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn object_without_event_is_dispatched_with_empty_event() {
        let (mut reader, writer, peer) = memory::pair();
        let (ctx, _resource) = make_context(writer);
        let (handler, mut seen) = ScriptedHandler::new();

        peer.send_text(r#"{"args":["orphan"]}"#);
        peer.send_text("{}");
        peer.close(1000, "");
        let _ = run_read_loop(&mut reader, &ctx, &handler).await;

        let first = timeout(TIMEOUT, seen.recv()).await.unwrap().unwrap();
        assert_eq!(first, InboundMessage::new("", vec!["orphan".into()]));
        let second = timeout(TIMEOUT, seen.recv()).await.unwrap().unwrap();
        assert_eq!(second, InboundMessage::new("", Vec::new()));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let (mut reader, writer, mut peer) = memory::pair();
        let (ctx, _resource) = make_context(writer);
        let (handler, mut seen) = ScriptedHandler::new();

        peer.send_text("not json");
        peer.send_binary(b"\xff\xfe".to_vec());
        peer.send_text(r#"{"event":42}"#);
        peer.send_event("ok", &["1"]);
        peer.close(1000, "");

        let err = run_read_loop(&mut reader, &ctx, &handler).await;
        assert_eq!(err.unexpected_close_code(), None);

        let first = timeout(TIMEOUT, seen.recv()).await.unwrap().unwrap();
        assert_eq!(first.event, "ok");
        tokio::task::yield_now().await;
        assert!(seen.try_recv().is_err());
        assert!(peer.written().is_empty());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn binary_frames_are_messages() {
        let (mut reader, writer, peer) = memory::pair();
        let (ctx, _resource) = make_context(writer);
        let (handler, mut seen) = ScriptedHandler::new();

        peer.send_binary(br#"{"event":"ok"}"#.to_vec());
        peer.close(1001, "going away");
        let _ = run_read_loop(&mut reader, &ctx, &handler).await;

        let message = timeout(TIMEOUT, seen.recv()).await.unwrap().unwrap();
        assert_eq!(message.event, "ok");
        assert!(message.args.is_empty());
    }

    #[tokio::test]
    async fn handler_error_gets_one_reply_and_loop_continues() {
        let (mut reader, writer, mut peer) = memory::pair();
        let (ctx, _resource) = make_context(writer);
        let (handler, mut seen) = ScriptedHandler::new();

        peer.send_event("fail", &["x"]);
        let loop_ctx = ctx.clone();
        let read_loop =
            tokio::spawn(async move { run_read_loop(&mut reader, &loop_ctx, &handler).await });

        let reply = timeout(TIMEOUT, peer.next_written()).await.unwrap().unwrap();
        let reply = reply.json().unwrap();
        assert_eq!(reply["event"], DAEMON_ERROR);
        assert_eq!(reply["ref"], "fail");
        assert!(reply["args"][0].as_str().unwrap().contains("scripted failure"));

        peer.send_event("ok", &[]);
        let _ = timeout(TIMEOUT, seen.recv()).await.unwrap().unwrap();
        let ok = timeout(TIMEOUT, seen.recv()).await.unwrap().unwrap();
        assert_eq!(ok.event, "ok");
        assert!(!ctx.is_cancelled());

        peer.close(1000, "");
        let _ = timeout(TIMEOUT, read_loop).await.unwrap().unwrap();
        assert!(peer.written().is_empty());
    }

    #[tokio::test]
    async fn internal_error_reply_is_redacted() {
        let (mut reader, writer, mut peer) = memory::pair();
        let (ctx, _resource) = make_context(writer);
        let (handler, _seen) = ScriptedHandler::new();
        let (logs, _guard) = tether_core::logging::capture_logs();

        peer.send_event("internal", &[]);
        let loop_ctx = ctx.clone();
        let read_loop =
            tokio::spawn(async move { run_read_loop(&mut reader, &loop_ctx, &handler).await });

        let reply = timeout(TIMEOUT, peer.next_written()).await.unwrap().unwrap();
        let reply = reply.json().unwrap();
        assert_eq!(reply["args"][0], GENERIC_ERROR_TEXT);
        let error_ref = reply["error_ref"].as_str().unwrap().to_owned();
        assert!(!reply.to_string().contains("secret"));

        assert!(logs.field_values("error_ref").contains(&error_ref));

        peer.close(1000, "");
        let _ = timeout(TIMEOUT, read_loop).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn suspended_error_cancels_without_reply() {
        let (mut reader, writer, mut peer) = memory::pair();
        let (ctx, _resource) = make_context(writer);
        let (handler, _seen) = ScriptedHandler::new();

        peer.send_event("suspend", &[]);
        let loop_ctx = ctx.clone();
        let read_loop =
            tokio::spawn(async move { run_read_loop(&mut reader, &loop_ctx, &handler).await });

        timeout(TIMEOUT, ctx.token().cancelled()).await.unwrap();
        peer.close(1000, "");
        let _ = timeout(TIMEOUT, read_loop).await.unwrap().unwrap();
        assert_eq!(peer.written(), Vec::<WrittenFrame>::new());
    }

    #[tokio::test]
    async fn unexpected_close_code_warns() {
        let (logs, _guard) = tether_core::logging::capture_logs();
        let (mut reader, writer, peer) = memory::pair();
        let (ctx, _resource) = make_context(writer);
        let (handler, _seen) = ScriptedHandler::new();

        peer.close(4000, "custom");
        let err = run_read_loop(&mut reader, &ctx, &handler).await;
        assert!(err.unexpected_close_code().is_some());
        assert!(logs.has_event(tracing::Level::WARN, "unexpected websocket closure"));
    }

    #[tokio::test]
    async fn expected_close_codes_are_quiet() {
        for code in [1000, 1001, 1005, 1006, 1012] {
            let (logs, _guard) = tether_core::logging::capture_logs();
            let (mut reader, writer, peer) = memory::pair();
            let (ctx, _resource) = make_context(writer);
            let (handler, _seen) = ScriptedHandler::new();

            peer.close(code, "");
            let _ = run_read_loop(&mut reader, &ctx, &handler).await;
            assert_eq!(logs.count_at_level(tracing::Level::WARN), 0, "code {code}");
        }
    }

    #[tokio::test]
    async fn local_close_ends_loop_quietly() {
        let (logs, _guard) = tether_core::logging::capture_logs();
        let (mut reader, writer, _peer) = memory::pair();
        let (ctx, _resource) = make_context(writer.clone());
        let (handler, _seen) = ScriptedHandler::new();

        writer.close().await.unwrap();
        let err = run_read_loop(&mut reader, &ctx, &handler).await;
        assert!(matches!(err, ReadError::LocallyClosed));
        assert_eq!(logs.count_at_level(tracing::Level::WARN), 0);
    }

    fn frame_strategy() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            3 => "[a-z]{1,8}".prop_map(Some),
            1 => Just(None),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn dispatch_order_matches_arrival(frames in prop::collection::vec(frame_strategy(), 1..40)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let dispatched = runtime.block_on(async {
                let (mut reader, writer, peer) = memory::pair();
                let (ctx, _resource) = make_context(writer);
                let (handler, mut seen) = ScriptedHandler::new();

                for frame in &frames {
                    match frame {
                        Some(event) => peer.send_event(event, &[]),
                        None => peer.send_text("{broken"),
                    }
                }
                peer.close(1000, "");
                let _ = run_read_loop(&mut reader, &ctx, &handler).await;

                let expected = frames.iter().flatten().count();
                let mut dispatched = Vec::with_capacity(expected);
                for _ in 0..expected {
                    dispatched.push(seen.recv().await.unwrap().event);
                }
                dispatched
            });
            let arrived: Vec<String> = frames.into_iter().flatten().collect();
            prop_assert_eq!(dispatched, arrived);
        }
    }
}
