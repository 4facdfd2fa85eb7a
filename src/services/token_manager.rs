// 令牌管理服务
// 缓存网关访问令牌, 过期或被拒绝时单飞刷新

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::Mutex;
use crate::config::Credentials;
use crate::errors::{PaymentError, Result};
use crate::models::AuthToken;
use crate::services::PaymentGateway;

/// 令牌管理服务
///
/// 缓存放在异步互斥锁内: 第一个发现缓存失效的调用方持锁完成凭证交换,
/// 其余并发调用方在锁上等待并直接拿到新令牌, 不会重复交换。
pub struct TokenManager {
    gateway: Arc<dyn PaymentGateway>,
    credentials: Arc<Credentials>,
    safety_margin: chrono::Duration,
    cache: Mutex<Option<AuthToken>>,
}

impl TokenManager {
    /// 创建新的令牌管理服务
    ///
    /// # Arguments
    /// * `gateway` - 支付网关
    /// * `credentials` - 网关凭证
    /// * `safety_margin` - 令牌到期前的安全余量
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<Credentials>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            gateway,
            credentials,
            safety_margin: chrono::Duration::from_std(safety_margin)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            cache: Mutex::new(None),
        }
    }

    /// 获取有效令牌
    ///
    /// 缓存令牌剩余有效期大于安全余量时直接返回, 否则同步交换新令牌。
    /// 交换失败时清空缓存并返回 `PaymentError::Authentication`。
    pub async fn get_token(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.as_ref() {
            if token.is_fresh(Utc::now(), self.safety_margin) {
                return Ok(token.value.clone());
            }
            log::debug!("Cached gateway token is within the safety margin, refreshing");
        }

        // 持锁交换, 保证并发调用方只触发一次
        *cache = None;
        let token = self
            .gateway
            .request_token(&self.credentials.consumer_key, &self.credentials.consumer_secret)
            .await
            .map_err(|e| {
                log::error!("Gateway token exchange failed: {}", e);
                match e {
                    PaymentError::Authentication(_) => e,
                    other => PaymentError::Authentication(other.to_string()),
                }
            })?;

        if !token.is_fresh(Utc::now(), self.safety_margin) {
            log::warn!("Gateway issued a token that expires within the safety margin ({})", token.expires_at);
        } else {
            log::info!("Obtained gateway token valid until {}", token.expires_at);
        }

        let value = token.value.clone();
        *cache = Some(token);
        Ok(value)
    }

    /// 作废被网关拒绝的令牌
    ///
    /// 只有缓存中仍是该令牌时才清除, 避免丢弃其他调用方刚刷新的令牌。
    pub async fn invalidate(&self, rejected: &str) {
        let mut cache = self.cache.lock().await;
        if cache.as_ref().map(|t| t.value.as_str()) == Some(rejected) {
            log::warn!("Discarding gateway token rejected by the gateway");
            *cache = None;
        }
    }
}
