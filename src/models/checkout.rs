// 结账接口数据模型
// 店面发起支付请求与网关回调参数

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use rust_decimal::Decimal;
use crate::models::OrderStatus;

/// 发起支付请求
#[derive(Debug, Deserialize, Clone)]
pub struct InitiatePaymentRequest {
    /// 支付金额
    pub amount: Decimal,
    /// 币种代码
    pub currency: String,
    /// 套餐名称
    pub description: String,
    /// 付款人邮箱
    #[serde(alias = "email")]
    pub payer_email: String,
    /// 付款人电话
    #[serde(alias = "phone")]
    pub payer_phone: String,
    /// 附加项标签 (可选)
    #[serde(default, alias = "label")]
    pub item_label: Option<String>,
}

/// 发起支付响应
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct InitiatePaymentResponse {
    /// 本地订单ID
    pub order_id: Uuid,
    /// 付款人跳转地址
    pub redirect_url: String,
    /// 网关跟踪ID
    pub order_tracking_id: String,
    /// 当前订单状态
    pub status: OrderStatus,
}

/// 网关回调查询参数
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CallbackQuery {
    /// 网关跟踪ID
    #[serde(rename = "OrderTrackingId", alias = "tracking_id", alias = "orderTrackingId")]
    pub tracking_id: Option<String>,
    /// 上报的支付结果
    #[serde(alias = "OrderStatus", alias = "payment_status_description")]
    pub status: Option<String>,
    /// 商户订单号 (仅记录)
    #[serde(rename = "OrderMerchantReference", default)]
    pub merchant_reference: Option<String>,
    /// 通知类型 IPNCHANGE / CALLBACKURL (仅记录)
    #[serde(rename = "OrderNotificationType", default)]
    pub notification_type: Option<String>,
}
