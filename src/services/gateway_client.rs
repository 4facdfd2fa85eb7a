// 支付网关客户端
// 封装令牌交换、IPN注册和订单提交三个上游接口

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT}};
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::config::GatewayConfig;
use crate::errors::{PaymentError, Result};
use crate::models::{
    AuthToken, TokenRequest, TokenResponse, IpnRegistrationRequest, IpnRegistrationResponse,
    SubmitOrderRequest, SubmitOrderResponse,
};

/// 支付网关接口
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 用消费者密钥换取访问令牌
    async fn request_token(&self, consumer_key: &str, consumer_secret: &str) -> Result<AuthToken>;

    /// 注册IPN回调地址, 返回通知ID
    async fn register_ipn(&self, token: &str, callback_url: &str) -> Result<String>;

    /// 提交订单; 401 时返回 `PaymentError::TokenRejected`
    async fn submit_order(&self, token: &str, request: &SubmitOrderRequest) -> Result<SubmitOrderResponse>;
}

/// Pesapal v3 客户端
pub struct PesapalClient {
    client: Client,
    base_url: String,
}

impl PesapalClient {
    /// 创建新的网关客户端
    ///
    /// 所有请求共用配置中的超时, 超时按网关错误处理。
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("PayCore/1.0"));

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// 发送JSON请求并解析响应
    async fn post_json<B, R>(&self, path: &str, token: Option<&str>, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::Gateway(format!("{} timed out", path))
            } else {
                PaymentError::Gateway(format!("{} request failed: {}", path, e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(PaymentError::TokenRejected);
        }

        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(format!("Failed to read {} response: {}", path, e)))?;

        if !status.is_success() {
            return Err(PaymentError::Gateway(format!(
                "{} returned HTTP {}: {}",
                path,
                status.as_u16(),
                truncate(&text, 200)
            )));
        }

        // 2xx 但无法解析: 网关已受理请求, 重试无意义
        serde_json::from_str(&text).map_err(|e| {
            PaymentError::MalformedResponse(format!("{} returned unparseable body: {}", path, e))
        })
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl PaymentGateway for PesapalClient {
    async fn request_token(&self, consumer_key: &str, consumer_secret: &str) -> Result<AuthToken> {
        let body = TokenRequest { consumer_key, consumer_secret };

        let response: TokenResponse = self
            .post_json("api/Auth/RequestToken", None, &body)
            .await
            .map_err(|e| match e {
                PaymentError::TokenRejected => PaymentError::Authentication("credentials rejected".to_string()),
                other => PaymentError::Authentication(other.to_string()),
            })?;

        if let Some(error) = response.error {
            return Err(PaymentError::Authentication(error.describe()));
        }

        match (response.token, response.expiry_date) {
            (Some(value), Some(expires_at)) if !value.is_empty() => Ok(AuthToken { value, expires_at }),
            _ => Err(PaymentError::Authentication(format!(
                "token response missing token or expiry (status {:?}, message {:?})",
                response.status, response.message
            ))),
        }
    }

    async fn register_ipn(&self, token: &str, callback_url: &str) -> Result<String> {
        let body = IpnRegistrationRequest {
            url: callback_url,
            ipn_notification_type: "GET",
        };

        let response: IpnRegistrationResponse = self
            .post_json("api/URLSetup/RegisterIPN", Some(token), &body)
            .await?;

        if let Some(error) = response.error {
            return Err(PaymentError::Gateway(error.describe()));
        }

        if let Some(registered) = response.url.as_deref().filter(|url| *url != callback_url) {
            log::warn!("Gateway registered IPN for {} instead of {}", registered, callback_url);
        }

        response
            .ipn_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PaymentError::Gateway(format!("IPN registration returned no id (status {:?})", response.status)))
    }

    async fn submit_order(&self, token: &str, request: &SubmitOrderRequest) -> Result<SubmitOrderResponse> {
        self.post_json("api/Transactions/SubmitOrderRequest", Some(token), request)
            .await
    }
}
