//! JWT 认证模块
//!
//! 提供 JWT token 生成、验证，以及接口使用的 Bearer 身份提取器。
//! 会员本身由外部系统管理，这里只负责把 token 解析成会员编号。

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use config::JwtConfig;
use domain::MemberId;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub member_id: i64,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token
    pub fn generate_token(&self, member_id: MemberId) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours);

        let claims = Claims {
            member_id: member_id.into(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            ApiError::internal_server_error(format!("Token generation failed: {}", err))
        })
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<MemberId, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| MemberId::from(token_data.claims.member_id))
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {}", err)))
    }

    /// 从 headers 中提取和验证 token
    pub fn extract_member_from_headers(&self, headers: &HeaderMap) -> Result<MemberId, ApiError> {
        let token = bearer_token(headers)
            .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;
        self.verify_token(token)
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 已通过 Bearer token 认证的会员
#[derive(Debug, Clone, Copy)]
pub struct AuthMember(pub MemberId);

impl FromRequestParts<AppState> for AuthMember {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .jwt_service
            .extract_member_from_headers(&parts.headers)
            .map(AuthMember)
    }
}
