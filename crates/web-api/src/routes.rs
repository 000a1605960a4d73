use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use validator::Validate;

use application::{
    services::{CreateRoomRequest, ListMessagesRequest},
    MessagePageDto, PresenceDto, ReadReceiptDto, RoomDto, RoomSummaryDto, UnreadCountDto,
};
use domain::{MemberId, MessageId, RoomId};

use crate::{
    auth::AuthMember,
    error::ApiError,
    extract::{ApiPath, ApiQuery},
    gateway::{transport_info, websocket_upgrade},
    state::AppState,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateRoomPayload {
    #[validate(range(min = 1, message = "sellerId must be positive"))]
    seller_id: i64,
    #[validate(range(min = 1, message = "buyerId must be positive"))]
    buyer_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRoomsQuery {
    member_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    before: Option<i64>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    tracked_rooms: usize,
}

pub fn router(state: AppState) -> Router {
    let endpoint = state.websocket.endpoint.clone();
    let layers = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.websocket.allowed_origins));

    Router::new()
        .route("/health", get(health))
        .route(&endpoint, get(websocket_upgrade))
        .route(&format!("{endpoint}/info"), get(transport_info))
        .nest("/api/v1", api_routes())
        .layer(layers)
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chatrooms", post(create_room).get(list_rooms))
        .route("/chatrooms/{room_id}", get(get_room))
        .route("/chat/rooms", get(list_room_summaries))
        .route("/chat/rooms/{room_id}/messages", get(list_messages))
        .route("/chat/rooms/{room_id}/read", put(mark_all_read_in_room))
        .route("/chat/rooms/{room_id}/unread-count", get(unread_count_in_room))
        .route("/chat/rooms/{room_id}/presence", get(room_presence))
        .route("/chat/messages/{message_id}/read", put(mark_message_read))
        .route("/chat/messages/unread-count", get(unread_count))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer.allow_origin(origins)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tracked_rooms: state.chat_service.sessions().tracked_rooms(),
    })
}

async fn create_room(
    State(state): State<AppState>,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<(StatusCode, Json<RoomDto>), ApiError> {
    payload
        .validate()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let dto = state
        .chat_service
        .create_room(CreateRoomRequest {
            seller_id: MemberId::from(payload.seller_id),
            buyer_id: MemberId::from(payload.buyer_id),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(dto)))
}

async fn get_room(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<i64>,
) -> Result<Json<RoomDto>, ApiError> {
    let dto = state.chat_service.get_room(RoomId::from(room_id)).await?;
    Ok(Json(dto))
}

async fn list_rooms(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListRoomsQuery>,
) -> Result<Json<Vec<RoomDto>>, ApiError> {
    let items = state
        .chat_service
        .list_rooms(query.member_id.map(MemberId::from))
        .await?;
    Ok(Json(items))
}

async fn list_room_summaries(
    State(state): State<AppState>,
    AuthMember(member_id): AuthMember,
) -> Result<Json<Vec<RoomSummaryDto>>, ApiError> {
    let items = state.chat_service.list_room_summaries(member_id).await?;
    Ok(Json(items))
}

async fn list_messages(
    State(state): State<AppState>,
    AuthMember(member_id): AuthMember,
    ApiPath(room_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<MessagePageDto>, ApiError> {
    let page = state
        .chat_service
        .list_messages(ListMessagesRequest {
            room_id: RoomId::from(room_id),
            reader_id: member_id,
            before: query.before.map(MessageId::from),
            limit: query.limit,
        })
        .await?;
    Ok(Json(page))
}

async fn mark_message_read(
    State(state): State<AppState>,
    AuthMember(member_id): AuthMember,
    ApiPath(message_id): ApiPath<i64>,
) -> Result<Json<ReadReceiptDto>, ApiError> {
    let message = state
        .chat_service
        .mark_message_read(MessageId::from(message_id), member_id)
        .await?;
    Ok(Json(ReadReceiptDto::for_message(&message, member_id)))
}

async fn mark_all_read_in_room(
    State(state): State<AppState>,
    AuthMember(member_id): AuthMember,
    ApiPath(room_id): ApiPath<i64>,
) -> Result<Json<ReadReceiptDto>, ApiError> {
    let receipt = state
        .chat_service
        .mark_all_read_in_room(RoomId::from(room_id), member_id)
        .await?;
    Ok(Json(receipt))
}

async fn unread_count(
    State(state): State<AppState>,
    AuthMember(member_id): AuthMember,
) -> Result<Json<UnreadCountDto>, ApiError> {
    let dto = state.chat_service.unread_count(member_id).await?;
    Ok(Json(dto))
}

async fn unread_count_in_room(
    State(state): State<AppState>,
    AuthMember(member_id): AuthMember,
    ApiPath(room_id): ApiPath<i64>,
) -> Result<Json<UnreadCountDto>, ApiError> {
    let dto = state
        .chat_service
        .unread_count_in_room(RoomId::from(room_id), member_id)
        .await?;
    Ok(Json(dto))
}

async fn room_presence(
    State(state): State<AppState>,
    AuthMember(member_id): AuthMember,
    ApiPath(room_id): ApiPath<i64>,
) -> Result<Json<PresenceDto>, ApiError> {
    let dto = state
        .chat_service
        .room_presence(RoomId::from(room_id), member_id)
        .await?;
    Ok(Json(dto))
}
