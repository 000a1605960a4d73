mod support;

use application::SendMessageRequest;
use domain::{Member, MessageId, RoomId};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use support::TestServer;

async fn seed_message(server: &TestServer, room_id: RoomId, sender: &Member, content: &str) -> MessageId {
    server
        .chat_service
        .send_message(SendMessageRequest {
            room_id,
            sender_id: sender.id,
            content: content.to_owned(),
        })
        .await
        .expect("send message")
        .message
        .message_id
}

async fn get_json(client: &Client, url: String, token: &str) -> Value {
    let response = client
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.expect("json")
}

#[tokio::test]
async fn room_creation_is_idempotent_over_http() {
    let server = TestServer::start().await;
    let seller = server.member("seller").await;
    let buyer = server.member("buyer").await;
    let client = Client::new();

    let created = client
        .post(server.api("/chatrooms"))
        .json(&json!({"sellerId": seller.id, "buyerId": buyer.id}))
        .send()
        .await
        .expect("create room");
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = created.json().await.expect("room json");
    assert_eq!(created["sellerId"], json!(seller.id));
    assert_eq!(created["buyerId"], json!(buyer.id));

    let swapped: Value = client
        .post(server.api("/chatrooms"))
        .json(&json!({"sellerId": buyer.id, "buyerId": seller.id}))
        .send()
        .await
        .expect("create swapped")
        .json()
        .await
        .expect("room json");
    assert_eq!(swapped["roomId"], created["roomId"]);

    let room_id = created["roomId"].as_i64().expect("room id");
    let fetched: Value = client
        .get(server.api(&format!("/chatrooms/{room_id}")))
        .send()
        .await
        .expect("get room")
        .json()
        .await
        .expect("room json");
    assert_eq!(fetched["roomId"], room_id);

    let listed: Value = client
        .get(server.api(&format!("/chatrooms?memberId={}", buyer.id)))
        .send()
        .await
        .expect("list rooms")
        .json()
        .await
        .expect("rooms json");
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn room_creation_errors_map_to_status_codes() {
    let server = TestServer::start().await;
    let seller = server.member("seller").await;
    let client = Client::new();

    let self_chat = client
        .post(server.api("/chatrooms"))
        .json(&json!({"sellerId": seller.id, "buyerId": seller.id}))
        .send()
        .await
        .expect("self chat");
    assert_eq!(self_chat.status(), StatusCode::BAD_REQUEST);
    let body: Value = self_chat.json().await.expect("error json");
    assert_eq!(body["code"], "INVALID_CHAT_ROOM_PARTICIPANTS");

    let unknown = client
        .post(server.api("/chatrooms"))
        .json(&json!({"sellerId": seller.id, "buyerId": 9_999}))
        .send()
        .await
        .expect("unknown buyer");
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    let body: Value = unknown.json().await.expect("error json");
    assert_eq!(body["code"], "CHAT_MEMBER_NOT_FOUND");

    let invalid = client
        .post(server.api("/chatrooms"))
        .json(&json!({"sellerId": 0, "buyerId": seller.id}))
        .send()
        .await
        .expect("invalid id");
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let missing = client
        .get(server.api("/chatrooms/404"))
        .send()
        .await
        .expect("missing room");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_endpoints_require_bearer_token() {
    let server = TestServer::start().await;
    let client = Client::new();

    for path in [
        "/chat/messages/unread-count",
        "/chat/rooms",
        "/chat/rooms/1/messages",
        "/chat/rooms/1/unread-count",
    ] {
        let response = client
            .get(server.api(path))
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
    }

    let response = client
        .put(server.api("/chat/rooms/1/read"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn read_receipts_and_unread_counts() {
    let server = TestServer::start().await;
    let seller = server.member("seller").await;
    let buyer = server.member("buyer").await;
    let other_buyer = server.member("other-buyer").await;
    let room_id = server.open_room(&seller, &buyer).await;
    let other_room = server.open_room(&seller, &other_buyer).await;
    let client = Client::new();
    let seller_token = server.token(seller.id);
    let buyer_token = server.token(buyer.id);

    let first = seed_message(&server, room_id, &buyer, "is this still for sale?").await;
    seed_message(&server, room_id, &buyer, "I can pick up today").await;
    seed_message(&server, other_room, &other_buyer, "price?").await;
    let own = seed_message(&server, room_id, &seller, "yes it is").await;

    let total = get_json(&client, server.api("/chat/messages/unread-count"), &seller_token).await;
    assert_eq!(total["unreadCount"], 3);
    assert_eq!(total["memberId"], json!(seller.id));

    let in_room = get_json(
        &client,
        server.api(&format!("/chat/rooms/{room_id}/unread-count")),
        &seller_token,
    )
    .await;
    assert_eq!(in_room["unreadCount"], 2);
    assert_eq!(in_room["roomId"], json!(room_id));

    let single: Value = client
        .put(server.api(&format!("/chat/messages/{first}/read")))
        .bearer_auth(&seller_token)
        .send()
        .await
        .expect("mark read")
        .json()
        .await
        .expect("receipt json");
    assert_eq!(single["success"], true);
    assert_eq!(single["messageId"], json!(first));

    // 发送者也可以把自己的消息标记为已读
    let own_receipt: Value = client
        .put(server.api(&format!("/chat/messages/{own}/read")))
        .bearer_auth(&seller_token)
        .send()
        .await
        .expect("mark own")
        .json()
        .await
        .expect("receipt json");
    assert_eq!(own_receipt["readCount"], 1);
    assert_eq!(own_receipt["success"], true);

    let all: Value = client
        .put(server.api(&format!("/chat/rooms/{room_id}/read")))
        .bearer_auth(&seller_token)
        .send()
        .await
        .expect("mark all")
        .json()
        .await
        .expect("receipt json");
    assert_eq!(all["readCount"], 1);
    assert_eq!(all["success"], true);

    let in_room = get_json(
        &client,
        server.api(&format!("/chat/rooms/{room_id}/unread-count")),
        &seller_token,
    )
    .await;
    assert_eq!(in_room["unreadCount"], 0);

    let total = get_json(&client, server.api("/chat/messages/unread-count"), &seller_token).await;
    assert_eq!(total["unreadCount"], 1);

    // 卖家的消息已经被标记，买家没有未读
    let buyer_total = get_json(&client, server.api("/chat/messages/unread-count"), &buyer_token).await;
    assert_eq!(buyer_total["unreadCount"], 0);

    let stranger = client
        .put(server.api(&format!("/chat/rooms/{room_id}/read")))
        .bearer_auth(server.token(other_buyer.id))
        .send()
        .await
        .expect("stranger mark");
    assert_eq!(stranger.status(), StatusCode::FORBIDDEN);
    let body: Value = stranger.json().await.expect("error json");
    assert_eq!(body["code"], "CHAT_PARTICIPANT_NOT_FOUND");
}

#[tokio::test]
async fn message_history_pages_backwards() {
    let server = TestServer::start().await;
    let seller = server.member("seller").await;
    let buyer = server.member("buyer").await;
    let room_id = server.open_room(&seller, &buyer).await;
    let client = Client::new();
    let token = server.token(buyer.id);

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(seed_message(&server, room_id, &seller, &format!("message {i}")).await);
    }

    let first_page = get_json(
        &client,
        server.api(&format!("/chat/rooms/{room_id}/messages?limit=2")),
        &token,
    )
    .await;
    let contents: Vec<&str> = first_page["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .filter_map(|message| message["content"].as_str())
        .collect();
    assert_eq!(contents, vec!["message 3", "message 4"]);
    assert_eq!(first_page["hasMore"], true);
    assert_eq!(first_page["nextCursor"], json!(ids[3]));

    let cursor = ids[3];
    let last_page = get_json(
        &client,
        server.api(&format!("/chat/rooms/{room_id}/messages?limit=10&before={cursor}")),
        &token,
    )
    .await;
    assert_eq!(last_page["messages"].as_array().map(Vec::len), Some(3));
    assert_eq!(last_page["hasMore"], false);
    assert!(last_page["nextCursor"].is_null());

    let invalid = client
        .get(server.api(&format!("/chat/rooms/{room_id}/messages?limit=500")))
        .bearer_auth(&token)
        .send()
        .await
        .expect("invalid paging");
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    let body: Value = invalid.json().await.expect("error json");
    assert_eq!(body["code"], "INVALID_PAGING");
}

#[tokio::test]
async fn room_summaries_show_counterpart_and_unread() {
    let server = TestServer::start().await;
    let seller = server.member("seller").await;
    let buyer = server.member("buyer").await;
    let room_id = server.open_room(&seller, &buyer).await;
    seed_message(&server, room_id, &buyer, "hello").await;
    seed_message(&server, room_id, &buyer, "last one").await;

    let summaries = get_json(
        &Client::new(),
        server.api("/chat/rooms"),
        &server.token(seller.id),
    )
    .await;
    let summary = &summaries.as_array().expect("summaries")[0];
    assert_eq!(summary["roomId"], json!(room_id));
    assert_eq!(summary["counterpartId"], json!(buyer.id));
    assert_eq!(summary["counterpartName"], "buyer");
    assert_eq!(summary["lastMessage"], "last one");
    assert_eq!(summary["unreadCount"], 2);
    assert_eq!(summary["counterpartOnline"], false);
}

#[tokio::test]
async fn malformed_path_and_query_use_error_body() {
    let server = TestServer::start().await;
    let seller = server.member("seller").await;
    let buyer = server.member("buyer").await;
    let room_id = server.open_room(&seller, &buyer).await;
    let client = Client::new();
    let token = server.token(seller.id);

    let bad_room = client
        .get(server.api("/chatrooms/abc"))
        .send()
        .await
        .expect("bad room id");
    assert_eq!(bad_room.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad_room.json().await.expect("error json");
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["message"].is_string());

    let bad_message = client
        .put(server.api("/chat/messages/not-a-number/read"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("bad message id");
    assert_eq!(bad_message.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad_message.json().await.expect("error json");
    assert_eq!(body["code"], "BAD_REQUEST");

    let bad_cursor = client
        .get(server.api(&format!("/chat/rooms/{room_id}/messages?before=latest")))
        .bearer_auth(&token)
        .send()
        .await
        .expect("bad cursor");
    assert_eq!(bad_cursor.status(), StatusCode::BAD_REQUEST);
    let body: Value = bad_cursor.json().await.expect("error json");
    assert_eq!(body["code"], "BAD_REQUEST");
}
