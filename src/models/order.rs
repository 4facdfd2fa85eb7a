// 订单数据模型
// 订单实体、状态机以及回调结果映射

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use crate::errors::PaymentError;

/// 订单模型
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Order {
    /// 订单唯一标识符, 同时作为网关幂等引用
    pub order_id: Uuid,
    /// 支付金额
    pub amount: Decimal,
    /// 币种代码
    pub currency: String,
    /// 商品描述 (套餐/附加项名称)
    pub description: String,
    /// 店面附加标签
    pub item_label: Option<String>,
    /// 付款人邮箱
    pub payer_email: String,
    /// 付款人电话
    pub payer_phone: String,
    /// 订单状态
    pub status: OrderStatus,
    /// 网关分配的跟踪ID
    pub gateway_tracking_id: Option<String>,
    /// 付款人跳转地址
    pub redirect_url: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间 (仅在状态变更时推进)
    pub updated_at: DateTime<Utc>,
    /// 乐观并发版本号
    pub version: i64,
}

/// 订单状态枚举
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 已创建, 尚未提交
    Created,
    /// 网关已受理
    Submitted,
    /// 等待网关回调
    AwaitingCallback,
    /// 支付成功
    Completed,
    /// 支付失败/取消/超时
    Failed,
    /// 输入或网关响应校验失败
    Invalid,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Created
    }
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Submitted,
        OrderStatus::AwaitingCallback,
        OrderStatus::Completed,
        OrderStatus::Failed,
        OrderStatus::Invalid,
    ];

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Invalid)
    }

    /// 状态机允许的变更
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Submitted)
                | (Created, Invalid)
                | (Submitted, AwaitingCallback)
                | (Submitted, Completed)
                | (Submitted, Failed)
                | (Submitted, Invalid)
                | (AwaitingCallback, Completed)
                | (AwaitingCallback, Failed)
                | (AwaitingCallback, Invalid)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Submitted => "submitted",
            OrderStatus::AwaitingCallback => "awaiting_callback",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Invalid => "invalid",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PaymentError::Storage(format!("Unknown order status '{}'", s)))
    }
}

/// 网关回调上报的支付结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedStatus {
    Completed,
    Failed,
    Invalid,
}

impl ReportedStatus {
    /// 对应的订单终态
    pub fn target_status(&self) -> OrderStatus {
        match self {
            ReportedStatus::Completed => OrderStatus::Completed,
            ReportedStatus::Failed => OrderStatus::Failed,
            ReportedStatus::Invalid => OrderStatus::Invalid,
        }
    }
}

impl FromStr for ReportedStatus {
    type Err = PaymentError;

    /// 同时接受网关的状态描述和数字状态码 (0=INVALID, 1=COMPLETED, 2=FAILED, 3=REVERSED)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COMPLETED" | "SUCCESS" | "1" => Ok(ReportedStatus::Completed),
            "FAILED" | "FAILURE" | "CANCELLED" | "REVERSED" | "2" | "3" => Ok(ReportedStatus::Failed),
            "INVALID" | "0" => Ok(ReportedStatus::Invalid),
            other => Err(PaymentError::Validation(format!("Unrecognized payment status '{}'", other))),
        }
    }
}

/// 付款人跳转决策
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedirectDecision {
    Success,
    Failure,
}

impl From<OrderStatus> for RedirectDecision {
    /// 只有 Completed 对应成功页面, 其余一律视为失败
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Completed => RedirectDecision::Success,
            _ => RedirectDecision::Failure,
        }
    }
}

impl Order {
    /// 创建新订单 (状态 Created, 版本 0)
    pub fn new(
        amount: Decimal,
        currency: String,
        description: String,
        item_label: Option<String>,
        payer_email: String,
        payer_phone: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4(),
            amount,
            currency,
            description,
            item_label,
            payer_email,
            payer_phone,
            status: OrderStatus::Created,
            gateway_tracking_id: None,
            redirect_url: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// 计算一次状态变更后的订单快照
    ///
    /// 原订单不变; 调用方需通过存储的版本比较写入结果。
    pub fn transition(&self, next: OrderStatus) -> Result<Order, PaymentError> {
        if self.status.is_terminal() {
            return Err(PaymentError::DuplicateCallback {
                order_id: self.order_id.to_string(),
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::stale(
                self.order_id,
                format!("{} -> {} is not permitted", self.status, next),
            ));
        }

        let mut updated = self.clone();
        updated.status = next;
        updated.updated_at = Utc::now();
        updated.version = self.version + 1;
        Ok(updated)
    }

    /// Created -> Submitted, 同时写入网关跟踪ID和跳转地址
    pub fn mark_submitted(&self, tracking_id: String, redirect_url: String) -> Result<Order, PaymentError> {
        if self.gateway_tracking_id.is_some() {
            return Err(PaymentError::stale(self.order_id, "tracking id already assigned"));
        }
        let mut updated = self.transition(OrderStatus::Submitted)?;
        updated.gateway_tracking_id = Some(tracking_id);
        updated.redirect_url = Some(redirect_url);
        Ok(updated)
    }

    /// 订单在网关侧使用的描述 (附加标签折叠进描述)
    pub fn gateway_description(&self) -> String {
        match &self.item_label {
            Some(label) if !label.trim().is_empty() => {
                format!("{} - {}", self.description.trim(), label.trim())
            }
            _ => self.description.trim().to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 订单查询响应
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub gateway_tracking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id,
            status: order.status,
            amount: order.amount,
            currency: order.currency.clone(),
            description: order.gateway_description(),
            gateway_tracking_id: order.gateway_tracking_id.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            version: order.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order() -> Order {
        Order::new(
            dec!(4200000),
            "UGX".to_string(),
            "Grow".to_string(),
            None,
            "payer@example.com".to_string(),
            "+256701234567".to_string(),
        )
    }

    #[test]
    fn test_new_order_starts_created() {
        let order = sample_order();
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.version, 0);
        assert!(order.gateway_tracking_id.is_none());
        assert_eq!(order.created_at, order.updated_at);
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        let allowed = [
            (Created, Submitted),
            (Created, Invalid),
            (Submitted, AwaitingCallback),
            (Submitted, Completed),
            (Submitted, Failed),
            (Submitted, Invalid),
            (AwaitingCallback, Completed),
            (AwaitingCallback, Failed),
            (AwaitingCallback, Invalid),
        ];
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_transition_bumps_version() {
        let order = sample_order();
        let next = order.transition(OrderStatus::Invalid).unwrap();
        assert_eq!(next.status, OrderStatus::Invalid);
        assert_eq!(next.version, 1);
        assert!(next.updated_at >= order.updated_at);
        // 原快照不变
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let order = sample_order().transition(OrderStatus::Invalid).unwrap();
        let err = order.transition(OrderStatus::Submitted).unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateCallback { status: OrderStatus::Invalid, .. }));
    }

    #[test]
    fn test_skipping_submission_is_stale() {
        let err = sample_order().transition(OrderStatus::Completed).unwrap_err();
        assert!(matches!(err, PaymentError::StaleTransition { .. }));
    }

    #[test]
    fn test_mark_submitted_sets_tracking_once() {
        let submitted = sample_order()
            .mark_submitted("TRK-1".to_string(), "https://pay.example/r/1".to_string())
            .unwrap();
        assert_eq!(submitted.status, OrderStatus::Submitted);
        assert_eq!(submitted.gateway_tracking_id.as_deref(), Some("TRK-1"));
        assert!(submitted.mark_submitted("TRK-2".to_string(), "x".to_string()).is_err());
    }

    #[test]
    fn test_reported_status_parsing() {
        assert_eq!("COMPLETED".parse::<ReportedStatus>().unwrap(), ReportedStatus::Completed);
        assert_eq!("success".parse::<ReportedStatus>().unwrap(), ReportedStatus::Completed);
        assert_eq!("Reversed".parse::<ReportedStatus>().unwrap(), ReportedStatus::Failed);
        assert_eq!("cancelled".parse::<ReportedStatus>().unwrap(), ReportedStatus::Failed);
        assert_eq!("0".parse::<ReportedStatus>().unwrap(), ReportedStatus::Invalid);
        assert!("pending".parse::<ReportedStatus>().is_err());
    }

    #[test]
    fn test_redirect_decision_from_status() {
        assert_eq!(RedirectDecision::from(OrderStatus::Completed), RedirectDecision::Success);
        assert_eq!(RedirectDecision::from(OrderStatus::Failed), RedirectDecision::Failure);
        assert_eq!(RedirectDecision::from(OrderStatus::Invalid), RedirectDecision::Failure);
    }

    #[test]
    fn test_status_round_trips_through_storage_name() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_gateway_description_folds_label() {
        let mut order = sample_order();
        assert_eq!(order.gateway_description(), "Grow");
        order.item_label = Some("SEO add-on".to_string());
        assert_eq!(order.gateway_description(), "Grow - SEO add-on");
    }
}
