// src/auth/jwt.rs

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::config::TokenConfig;
use crate::error::{AppError, AppResult, AuthError};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// principal id（十进制字符串）
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    expiry_hours: i64,
}

impl JwtService {
    pub fn new(config: &TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.validate_nbf = true;
        // 过期即拒绝，不留时钟偏差窗口
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            expiry_hours: config.expiry_hours,
        }
    }

    pub fn generate_token(&self, user_id: i64) -> AppResult<String> {
        let now = Utc::now();
        let exp = now + Duration::hours(self.expiry_hours);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(format!("Failed to generate token: {}", e)))
    }

    /// 校验 token 并返回 principal id
    pub fn validate_token(&self, token: &str) -> Result<i64, AuthError> {
        // header 都解析不了的 token 视为格式错误，之后的 JSON 错误只可能来自 claims
        decode_header(token).map_err(|_| AuthError::Malformed)?;

        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::InvalidSubject
                | ErrorKind::ImmatureSignature
                | ErrorKind::MissingRequiredClaim(_)
                | ErrorKind::Json(_) => AuthError::InvalidClaims,
                _ => AuthError::Malformed,
            })?;

        token_data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidClaims)
    }

    /// 从 `Authorization` 头解析并校验 Bearer token
    pub fn authenticate(&self, header: Option<&str>) -> Result<i64, AuthError> {
        let token = parse_bearer(header)?;
        self.validate_token(token)
    }
}

/// 解析 `Bearer <token>`；缺失、scheme 不对或段数不为 2 都是 Malformed
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::Malformed)?;
    let parts: Vec<&str> = header.split(' ').collect();

    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(token),
        _ => Err(AuthError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(secret: &str) -> TokenConfig {
        TokenConfig {
            secret: secret.to_string(),
            issuer: "social-core".to_string(),
            audience: "social-core".to_string(),
            expiry_hours: 24,
        }
    }

    fn create_test_jwt_service() -> JwtService {
        JwtService::new(&test_config("test-secret-key-for-testing"))
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn claims_for(sub: &str, exp_offset_hours: i64) -> Claims {
        let now = Utc::now();
        Claims {
            sub: sub.to_string(),
            exp: (now + Duration::hours(exp_offset_hours)).timestamp(),
            iat: now.timestamp(),
            nbf: (now - Duration::hours(48)).timestamp(),
            iss: "social-core".to_string(),
            aud: "social-core".to_string(),
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let service = create_test_jwt_service();

        let token = service.generate_token(42).unwrap();
        assert_eq!(service.validate_token(&token), Ok(42));
    }

    #[test]
    fn test_signed_with_other_secret() {
        let service = create_test_jwt_service();
        let token = sign(&claims_for("42", 1), "some-other-secret");

        assert_eq!(service.validate_token(&token), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_tampered_payload() {
        let service = create_test_jwt_service();
        let token = service.generate_token(1).unwrap();
        let other = service.generate_token(2).unwrap();

        // 用另一个 token 的 payload 替换，签名不再匹配
        let parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);

        assert_eq!(service.validate_token(&forged), Err(AuthError::InvalidSignature));
    }

    #[test]
    fn test_expired_token() {
        let service = create_test_jwt_service();
        let token = sign(&claims_for("42", -2), "test-secret-key-for-testing");

        assert_eq!(service.validate_token(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_recently_expired_token() {
        let service = create_test_jwt_service();
        let mut claims = claims_for("42", 1);
        claims.exp = (Utc::now() - Duration::seconds(30)).timestamp();
        let token = sign(&claims, "test-secret-key-for-testing");

        assert_eq!(service.validate_token(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_non_numeric_subject() {
        let service = create_test_jwt_service();
        let token = sign(&claims_for("alice", 1), "test-secret-key-for-testing");

        assert_eq!(service.validate_token(&token), Err(AuthError::InvalidClaims));
    }

    #[test]
    fn test_wrong_issuer() {
        let service = create_test_jwt_service();
        let mut claims = claims_for("42", 1);
        claims.iss = "someone-else".to_string();
        let token = sign(&claims, "test-secret-key-for-testing");

        assert_eq!(service.validate_token(&token), Err(AuthError::InvalidClaims));
    }

    #[test]
    fn test_invalid_token() {
        let service = create_test_jwt_service();

        assert_eq!(
            service.validate_token("invalid.token.here"),
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer(Some("Bearer abc")), Ok("abc"));
        assert_eq!(parse_bearer(None), Err(AuthError::Malformed));
        assert_eq!(parse_bearer(Some("Basic abc")), Err(AuthError::Malformed));
        assert_eq!(parse_bearer(Some("Bearer")), Err(AuthError::Malformed));
        assert_eq!(parse_bearer(Some("Bearer a b")), Err(AuthError::Malformed));
        assert_eq!(parse_bearer(Some("Bearer ")), Err(AuthError::Malformed));
    }

    #[test]
    fn test_authenticate_header() {
        let service = create_test_jwt_service();
        let token = service.generate_token(7).unwrap();

        assert_eq!(service.authenticate(Some(&format!("Bearer {}", token))), Ok(7));
        assert_eq!(
            service.authenticate(Some(&format!("Token {}", token))),
            Err(AuthError::Malformed)
        );
    }
}
