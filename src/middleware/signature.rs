//! Webhook 签名校验
//!
//! 提供 `SignedPayload` extractor：读取原始 body，并在强制模式下校验
//! `X-Hub-Signature-256`（HMAC-SHA256）

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

use crate::config::EnvConfig;
use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// 签名 header
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// 校验 `algorithm=hexdigest` 形式的签名
///
/// 缺少 `=`、非法 hex 或摘要不匹配都返回 false。比较是常量时间的
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(header) = header else {
        return false;
    };
    let Some((_algorithm, digest)) = header.split_once('=') else {
        return false;
    };
    let expected = match hex::decode(digest.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// 触发门：只在 production 且配置了密钥时强制校验
#[derive(Clone, Copy, Debug)]
pub struct TriggerGate<'a> {
    config: &'a EnvConfig,
}

impl<'a> TriggerGate<'a> {
    pub fn new(config: &'a EnvConfig) -> Self {
        Self { config }
    }

    pub fn is_enforcing(&self) -> bool {
        self.config.is_production() && !self.config.webhook_secret.is_empty()
    }

    pub fn authenticate(&self, header: Option<&str>, body: &[u8]) -> bool {
        if !self.is_enforcing() {
            return true;
        }
        verify_signature(self.config.webhook_secret.expose(), body, header)
    }
}

/// 已通过签名校验的原始 body
#[derive(Debug, Clone)]
pub struct SignedPayload(pub Bytes);

#[async_trait]
impl FromRequest<Arc<AppState>> for SignedPayload {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = req
            .headers()
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::rejected(e.status(), e.body_text()))?;

        if !TriggerGate::new(&state.config).authenticate(header.as_deref(), &body) {
            tracing::warn!(
                signature_present = header.is_some(),
                "Rejected webhook with invalid signature"
            );
            return Err(ApiError::forbidden());
        }

        Ok(SignedPayload(body))
    }
}
