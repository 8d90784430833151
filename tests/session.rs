//! End-to-end tests driving [`Session`] against [`MockEngine`] the way a real
//! client would, but without a socket: frames are read off `SessionIo`'s
//! outgoing channel and responses are injected straight into its mailbox,
//! standing in for `run_io_worker` + a `Transport`.

use std::sync::Arc;
use std::time::Duration;

use rhost_host::{MockEngine, Session, SessionIo};
use rhost_types::{decode, Id, Message};
use serde_json::{json, Value};

fn next_frame(io: &mut SessionIo) -> Message {
    let text = io
        .outgoing_rx
        .blocking_recv()
        .expect("engine thread dropped its outgoing sender");
    decode(&text).expect("engine emitted a malformed frame")
}

fn expect_request<'a>(msg: &'a Message, expected_name: &str) -> (&'a Id, &'a [Value]) {
    match msg {
        Message::Request { id, name, args } if name == expected_name => (id, args),
        other => panic!("expected a '{expected_name}' request, got {other:?}"),
    }
}

fn respond(io: &SessionIo, request_id: &Id, name: &str, args: &[Value]) {
    io.mailbox
        .deliver(Message::Response {
            id: Id::from("test-client"),
            request_id: request_id.clone(),
            name: name.to_owned(),
            args: args.to_vec(),
        })
        .expect("mailbox refused the response");
}

fn deliver_request(io: &SessionIo, id: &Id, name: &str, args: &[Value]) {
    io.mailbox
        .deliver(Message::Request {
            id: id.clone(),
            name: name.to_owned(),
            args: args.to_vec(),
        })
        .expect("mailbox refused the nested request");
}

fn spawn() -> (std::thread::JoinHandle<()>, SessionIo) {
    let engine = Arc::new(MockEngine::new());
    let (session, io) = Session::new(engine);
    let handle = std::thread::Builder::new()
        .name("test-engine".to_owned())
        .spawn(move || session.run("rhost-mock", "0.1"))
        .unwrap();
    (handle, io)
}

#[test]
fn greeting_has_expected_shape_and_id() {
    let (handle, mut io) = spawn();
    let greeting = next_frame(&mut io);
    let (id, args) = expect_request(&greeting, "rhost-mock");
    assert_eq!(id.as_str(), "#0#");
    assert_eq!(args, &[json!(1.0), json!("0.1")]);

    let prompt = next_frame(&mut io);
    let (prompt_id, _) = expect_request(&prompt, ">");
    respond(&io, prompt_id, ">", &[Value::Null]);
    handle.join().unwrap();
}

#[test]
fn prompt_round_trip_prints_via_write_output_not_a_correlated_response() {
    let (handle, mut io) = spawn();
    next_frame(&mut io); // greeting

    let prompt = next_frame(&mut io);
    let (prompt_id, _) = expect_request(&prompt, ">");
    respond(&io, prompt_id, ">", &[json!("1 + 1\n")]);

    let printed = next_frame(&mut io);
    let (_, args) = expect_request(&printed, "!");
    assert_eq!(args, &[json!("2\n")]);

    let next_prompt = next_frame(&mut io);
    let (next_prompt_id, _) = expect_request(&next_prompt, ">");
    respond(&io, next_prompt_id, ">", &[Value::Null]);

    let shutdown = next_frame(&mut io);
    assert_eq!(shutdown, Message::Shutdown);
    handle.join().unwrap();
}

#[test]
fn eval_error_is_printed_as_error_output() {
    let (handle, mut io) = spawn();
    next_frame(&mut io); // greeting

    let prompt = next_frame(&mut io);
    let (prompt_id, _) = expect_request(&prompt, ">");
    respond(&io, prompt_id, ">", &[json!("nope\n")]);

    let printed = next_frame(&mut io);
    let (_, args) = expect_request(&printed, "!!");
    assert_eq!(args, &[json!("object 'nope' not found")]);

    let next_prompt = next_frame(&mut io);
    let (next_prompt_id, _) = expect_request(&next_prompt, ">");
    respond(&io, next_prompt_id, ">", &[Value::Null]);
    handle.join().unwrap();
}

#[test]
fn nested_eval_is_answered_while_prompt_is_outstanding() {
    let (handle, mut io) = spawn();
    next_frame(&mut io); // greeting

    let prompt = next_frame(&mut io);
    let (prompt_id, _) = expect_request(&prompt, ">");

    // A client-originated nested eval, dispatched while the prompt is still
    // unanswered — distinct from the top-level REPL's own line evaluation,
    // which never goes through this id-correlated response path.
    let c1 = Id::from("c1");
    deliver_request(&io, &c1, "=", &[json!("Sys.time()")]);

    let response = next_frame(&mut io);
    match &response {
        Message::Response { request_id, name, args, .. } => {
            assert_eq!(request_id, &c1);
            assert_eq!(name, "=");
            assert_eq!(args[0], json!("OK"));
            assert_eq!(args[1], Value::Null);
            assert_eq!(args[2], json!("2020-01-01 12:34:56 UTC"));
        }
        other => panic!("expected a response to the nested eval, got {other:?}"),
    }

    // The prompt is still the same one; finishing it now ends the session.
    respond(&io, prompt_id, ">", &[Value::Null]);
    handle.join().unwrap();
}

#[test]
fn cancel_targets_a_specific_eval_without_disturbing_the_prompt() {
    let (handle, mut io) = spawn();
    next_frame(&mut io); // greeting

    let prompt = next_frame(&mut io);
    let (prompt_id, _) = expect_request(&prompt, ">");

    let c2 = Id::from("c2");
    deliver_request(&io, &c2, "=/", &[json!("loop_forever")]);

    // Give the nested eval a moment to actually be mid-tick before cancelling.
    std::thread::sleep(Duration::from_millis(50));
    io.cancel.request_cancel(Some(&c2));

    let response = next_frame(&mut io);
    match &response {
        Message::Response { request_id, args, .. } => {
            assert_eq!(request_id, &c2);
            assert_eq!(args, &[Value::Null]);
        }
        other => panic!("expected the cancelled eval's response, got {other:?}"),
    }

    // The outstanding prompt survives the cancellation of the nested eval.
    respond(&io, prompt_id, ">", &[Value::Null]);
    handle.join().unwrap();
}

#[test]
fn eval_request_with_extra_args_is_fatal_and_still_shuts_down_cleanly() {
    let (handle, mut io) = spawn();
    next_frame(&mut io); // greeting
    next_frame(&mut io); // prompt

    let c = Id::from("c1");
    deliver_request(&io, &c, "=", &[json!("1 + 1"), json!("extra")]);

    // No response to the malformed request; the session tears itself down,
    // but still sends the final `null` frame on the way out.
    let frame = next_frame(&mut io);
    assert_eq!(frame, Message::Shutdown);
    handle.join().unwrap();
}

#[test]
fn json_flagged_eval_result_that_is_not_json_is_fatal() {
    let (handle, mut io) = spawn();
    next_frame(&mut io); // greeting
    next_frame(&mut io); // prompt

    // `Sys.time()`'s result isn't valid JSON, so the 'j' flag's promise that
    // it is can't be honored — that's a fatal protocol error, not a silent
    // fallback to a plain string.
    let c = Id::from("c1");
    deliver_request(&io, &c, "=j", &[json!("Sys.time()")]);

    let frame = next_frame(&mut io);
    assert_eq!(frame, Message::Shutdown);
    handle.join().unwrap();
}

#[test]
fn cancel_to_top_level_unwinds_past_the_prompt_and_notifies() {
    let (handle, mut io) = spawn();
    next_frame(&mut io); // greeting

    let prompt = next_frame(&mut io);
    expect_request(&prompt, ">");

    // Cancel with no target (`null`), i.e. "cancel to top level" (§4.E):
    // collapses onto the sentinel frame, which is the prompt itself.
    io.cancel.request_cancel(None);

    let notification = next_frame(&mut io);
    let (_, args) = expect_request(&notification, "\\");
    assert!(args.is_empty());

    let next_prompt = next_frame(&mut io);
    let (next_prompt_id, _) = expect_request(&next_prompt, ">");
    respond(&io, next_prompt_id, ">", &[Value::Null]);
    handle.join().unwrap();
}
