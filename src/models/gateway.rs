// 支付网关报文模型
// 令牌交换、IPN注册和订单提交的请求/响应结构

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// 网关访问令牌 (进程内缓存, 不持久化)
#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    /// Bearer令牌值
    pub value: String,
    /// 过期时间
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// 剩余有效期是否仍大于安全余量
    pub fn is_fresh(&self, now: DateTime<Utc>, safety_margin: chrono::Duration) -> bool {
        self.expires_at - safety_margin > now
    }
}

/// 令牌交换请求
#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
}

/// 网关返回的错误对象
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayErrorBody {
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

impl GatewayErrorBody {
    pub fn describe(&self) -> String {
        let detail = [self.code.as_deref(), self.message.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(": ");
        match self.error_type.as_deref() {
            Some(kind) if !kind.is_empty() => format!("[{}] {}", kind, detail),
            _ => detail,
        }
    }
}

/// 令牌交换响应
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: Option<String>,
    #[serde(rename = "expiryDate")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub error: Option<GatewayErrorBody>,
    pub status: Option<String>,
    pub message: Option<String>,
}

/// IPN注册请求
#[derive(Debug, Serialize)]
pub struct IpnRegistrationRequest<'a> {
    pub url: &'a str,
    pub ipn_notification_type: &'a str,
}

/// IPN注册响应
#[derive(Debug, Deserialize)]
pub struct IpnRegistrationResponse {
    pub ipn_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<GatewayErrorBody>,
    pub status: Option<String>,
}

/// 账单地址 (网关要求至少提供邮箱或电话)
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct BillingAddress {
    pub email_address: String,
    pub phone_number: String,
}

/// 订单提交请求
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SubmitOrderRequest {
    /// 商户订单号, 网关以此识别重复提交
    pub id: Uuid,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub callback_url: String,
    pub notification_id: String,
    pub billing_address: BillingAddress,
}

/// 订单提交响应
#[derive(Debug, Deserialize, Default)]
pub struct SubmitOrderResponse {
    pub order_tracking_id: Option<String>,
    pub merchant_reference: Option<String>,
    pub redirect_url: Option<String>,
    pub error: Option<GatewayErrorBody>,
    pub status: Option<String>,
}

/// 订单提交成功的回执
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub redirect_url: String,
    pub tracking_id: String,
}
