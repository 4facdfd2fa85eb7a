// 错误类型定义
// 支付编排核心的错误分类及其HTTP映射

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use crate::models::{ApiResponse, OrderStatus};

/// 支付核心错误
#[derive(Debug, Error)]
pub enum PaymentError {
    /// 输入数据不合法 (不重试, 400)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 网关凭证交换失败
    #[error("Gateway authentication failed: {0}")]
    Authentication(String),

    /// 网关拒绝了当前令牌 (HTTP 401), 仅供内部重试判断
    #[error("Gateway rejected the bearer token")]
    TokenRejected,

    /// 网关非认证类错误或超时 (502)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// 网关返回2xx但响应体无法解析 (不重试)
    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    /// 回调引用了本服务从未创建的订单
    #[error("Unknown order: {0}")]
    UnknownOrder(String),

    /// 对终态订单的重复状态变更
    #[error("Order {order_id} is already {status}")]
    DuplicateCallback { order_id: String, status: OrderStatus },

    /// 版本不匹配或状态机不允许的变更
    #[error("Stale transition on order {order_id}: {reason}")]
    StaleTransition { order_id: String, reason: String },

    /// 订单存储故障
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PaymentError {
    /// 是否为可由调用方安全重试的网关错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::Gateway(_))
    }

    pub fn stale(order_id: impl ToString, reason: impl Into<String>) -> Self {
        PaymentError::StaleTransition {
            order_id: order_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        PaymentError::Storage(err.to_string())
    }
}

impl ResponseError for PaymentError {
    fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
            PaymentError::Gateway(_) | PaymentError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            PaymentError::UnknownOrder(_) => StatusCode::NOT_FOUND,
            PaymentError::DuplicateCallback { .. } | PaymentError::StaleTransition { .. } => {
                StatusCode::CONFLICT
            }
            PaymentError::Authentication(_)
            | PaymentError::TokenRejected
            | PaymentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // 网关与存储的原始错误只写日志, 不透传给调用方
        let message = match self {
            PaymentError::Validation(msg) => msg.clone(),
            PaymentError::Authentication(_) | PaymentError::TokenRejected => {
                "Payment gateway authentication failed".to_string()
            }
            PaymentError::Gateway(_) => "Payment gateway unavailable, please retry".to_string(),
            PaymentError::MalformedResponse(_) => "Payment gateway returned an invalid response".to_string(),
            PaymentError::Storage(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            log::error!("Responding {} for error: {}", status.as_u16(), self);
        }

        HttpResponse::build(status).json(ApiResponse::<()>::error(status.as_u16() as i32, message))
    }
}

/// 支付核心结果类型
pub type Result<T, E = PaymentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(PaymentError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(PaymentError::Authentication("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(PaymentError::Gateway("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(PaymentError::UnknownOrder("x".into()).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_only_gateway_errors_are_retryable() {
        assert!(PaymentError::Gateway("timeout".into()).is_retryable());
        assert!(!PaymentError::Validation("amount".into()).is_retryable());
        assert!(!PaymentError::Authentication("bad key".into()).is_retryable());
        assert!(!PaymentError::TokenRejected.is_retryable());
        assert!(!PaymentError::MalformedResponse("not json".into()).is_retryable());
        assert_eq!(PaymentError::MalformedResponse("x".into()).status_code(), StatusCode::BAD_GATEWAY);
    }
}
