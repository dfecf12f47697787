#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use funcie_core::protocol::payloads::{
    ForwardRequest, ForwardRequestResponse, ForwardRequestResult, RegistrationMessage,
    RegistrationRequest,
};
use funcie_core::{Endpoint, ErrorCode, Message, MessageKind, ProxyError, RawPayload, Response};

#[test]
fn typed_message_survives_the_wire() {
    let typed = RegistrationMessage::new(
        "orders",
        MessageKind::Register,
        RegistrationRequest {
            name: "orders".into(),
            endpoint: Some(Endpoint::new("http", "localhost", 8086)),
        },
        Duration::from_secs(30),
    );

    let wire = typed.marshal().unwrap().to_json().unwrap();
    let untyped = Message::from_slice(wire.as_bytes()).unwrap();
    assert_eq!(untyped.id, typed.id);
    assert_eq!(untyped.created, typed.created);
    assert_eq!(untyped.ttl, typed.ttl);

    let back = untyped.unmarshal::<RegistrationRequest>().unwrap();
    assert_eq!(back, typed);
}

#[test]
fn forward_response_survives_the_wire() {
    let body = RawPayload::from_json(r#"{"statusCode":200}"#).unwrap();
    let typed = ForwardRequestResult::success("msg-1", ForwardRequestResponse { body });

    let wire = typed.marshal().unwrap().to_json().unwrap();
    let back = Response::from_slice(wire.as_bytes())
        .unwrap()
        .unmarshal::<ForwardRequestResponse>()
        .unwrap();
    assert_eq!(back, typed);
}

#[test]
fn wrong_payload_type_is_an_error_not_a_panic() {
    let msg = Message::new(
        "orders",
        MessageKind::ForwardRequest,
        Some(RawPayload::from_json(r#"{"name":"orders"}"#).unwrap()),
        Duration::from_secs(1),
    );
    let err = msg.unmarshal::<ForwardRequest>().unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadPayload);
}

#[test]
fn failed_response_carries_code() {
    let resp = Response::failure("x", ProxyError::new(ErrorCode::NoActiveConsumer, "gone"));
    let json = resp.to_json().unwrap();
    let back = Response::from_slice(json.as_bytes()).unwrap();
    let err = back.into_result().unwrap_err();
    assert!(err.is_no_consumer());
    assert_eq!(err.to_string(), "gone");
}
