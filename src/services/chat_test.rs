use super::*;
use crate::bus::EventBus;
use crate::net::types::Method;
use crate::test_helpers::{Reply, ScriptedTransport, api_with};
use std::sync::Arc;

fn message(id: i64, text: &str) -> Value {
    json!({ "id": id, "text": text, "firstName": "Ada", "lastName": "L", "is_owner": false })
}

fn api(transport: &Arc<ScriptedTransport>) -> ApiClient {
    api_with(transport, &EventBus::new())
}

#[tokio::test]
async fn send_posts_trimmed_message() {
    let transport = ScriptedTransport::new();
    transport.on(Method::Post, "/42/liveChat/talk/", Reply::ok(json!({})));

    assert_eq!(send_message(&api(&transport), "42", "  hello ").await, Ok(true));
    assert_eq!(transport.body_of(Method::Post, "/42/liveChat/talk/"), Some(json!({ "message": "hello" })));
}

#[tokio::test]
async fn blank_message_is_not_sent() {
    let transport = ScriptedTransport::new();
    assert_eq!(send_message(&api(&transport), "42", "   ").await, Ok(false));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn chat_ended_reads_success_flag() {
    let transport = ScriptedTransport::new();
    transport
        .on(Method::Get, "/42/hasChatEnded/", Reply::ok(json!({ "success": true })))
        .on(Method::Get, "/42/hasChatEnded/", Reply::ok(json!({ "success": false })))
        .on(Method::Get, "/42/hasChatEnded/", Reply::ok(json!(true)))
        .on(Method::Get, "/42/hasChatEnded/", Reply::ok(json!({ "data": true })))
        .on(Method::Get, "/42/hasChatEnded/", Reply::ok(json!({ "success": "yes" })));
    let client = api(&transport);

    assert_eq!(has_chat_ended(&client, "42").await, Ok(true));
    assert_eq!(has_chat_ended(&client, "42").await, Ok(false));
    assert_eq!(has_chat_ended(&client, "42").await, Ok(true));
    assert_eq!(has_chat_ended(&client, "42").await, Ok(false));
    assert_eq!(has_chat_ended(&client, "42").await, Ok(false));
}

#[tokio::test]
async fn moderation_endpoints_include_society() {
    let transport = ScriptedTransport::new();
    transport.on(Method::Post, "/Societies/Chess%20Club/Events/42/liveChat/sendFinalMessage/", Reply::ok(json!({})));
    transport.on(Method::Delete, "/Chess%20Club/42/liveChat/9/delete/", Reply::status(204));
    let client = api(&transport);

    end_chat(&client, "Chess Club", "42").await.unwrap();
    delete_message(&client, "Chess Club", "42", 9).await.unwrap();
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn feed_polls_and_refreshes_after_send() {
    let transport = ScriptedTransport::new();
    transport
        .on(Method::Get, "/42/liveChat/", Reply::ok(json!([message(1, "hi")])))
        .on(Method::Get, "/42/liveChat/", Reply::ok(json!([message(1, "hi"), message(2, "there")])));
    transport.on(Method::Post, "/42/liveChat/talk/", Reply::ok(json!({})));

    let feed = ChatFeed::mount(api(&transport), "42", Duration::from_secs(5));
    assert_eq!(feed.event_id(), "42");
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(feed.messages().map(|m| m.len()), Some(1));

    assert_eq!(feed.send("there").await, Ok(true));
    tokio::time::sleep(Duration::from_millis(1)).await;
    let texts: Vec<String> = feed.messages().unwrap().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["hi", "there"]);
}

#[tokio::test(start_paused = true)]
async fn feed_polls_on_interval_until_unmounted() {
    let transport = ScriptedTransport::new();
    transport.on(Method::Get, "/42/liveChat/", Reply::ok(json!([])));

    let feed = ChatFeed::mount(api(&transport), "42", Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(10_001)).await;
    assert_eq!(transport.count(Method::Get, "/42/liveChat/"), 3);

    feed.unmount();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.count(Method::Get, "/42/liveChat/"), 3);
}
