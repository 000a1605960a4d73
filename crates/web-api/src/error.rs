use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }

    pub fn message(&self) -> &str {
        &self.body.message
    }
}

/// 应用层错误到 (状态码, 错误码) 的映射，接口和 WebSocket 错误帧共用
pub fn classify(error: &ApplicationError) -> (StatusCode, &'static str) {
    match error {
        ApplicationError::Domain(err) => match err {
            DomainError::InvalidArgument { .. } => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            DomainError::InvalidParticipants => {
                (StatusCode::BAD_REQUEST, "INVALID_CHAT_ROOM_PARTICIPANTS")
            }
            DomainError::InvalidPaging { .. } => (StatusCode::BAD_REQUEST, "INVALID_PAGING"),
            DomainError::RoomNotFound => (StatusCode::NOT_FOUND, "CHAT_ROOM_NOT_FOUND"),
            DomainError::MessageNotFound => (StatusCode::NOT_FOUND, "CHAT_MESSAGE_NOT_FOUND"),
            DomainError::MemberNotFound => (StatusCode::NOT_FOUND, "CHAT_MEMBER_NOT_FOUND"),
            DomainError::ParticipantNotFound => {
                (StatusCode::FORBIDDEN, "CHAT_PARTICIPANT_NOT_FOUND")
            }
        },
        ApplicationError::Repository(err) => match err {
            RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            RepositoryError::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            RepositoryError::Storage { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
        },
        ApplicationError::Broadcast(_) => (StatusCode::INTERNAL_SERVER_ERROR, "BROADCAST_ERROR"),
        ApplicationError::Infrastructure(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INFRASTRUCTURE_ERROR")
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let (status, code) = classify(&error);
        if status.is_server_error() {
            tracing::error!(error = %error, code, "请求处理失败");
        }
        ApiError::new(status, code, error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
