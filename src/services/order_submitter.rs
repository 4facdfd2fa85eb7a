// 订单提交服务
// 校验订单、携带幂等引用提交到网关, 成功后推进订单状态

use std::sync::Arc;
use crate::config::Credentials;
use crate::errors::{PaymentError, Result};
use crate::models::{
    BillingAddress, Order, OrderStatus, SubmissionReceipt, SubmitOrderRequest, SubmitOrderResponse,
};
use crate::services::{OrderStore, PaymentGateway, TokenManager};
use crate::utils::{InputValidator, MAX_DESCRIPTION_LENGTH};

/// 订单提交服务
pub struct OrderSubmitter {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    tokens: Arc<TokenManager>,
    credentials: Arc<Credentials>,
}

impl OrderSubmitter {
    /// 创建新的订单提交服务
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        tokens: Arc<TokenManager>,
        credentials: Arc<Credentials>,
    ) -> Self {
        Self { store, gateway, tokens, credentials }
    }

    /// 提交订单
    ///
    /// # Arguments
    /// * `order` - 已入库的订单快照
    ///
    /// # Returns
    /// * 付款人跳转地址和网关跟踪ID
    ///
    /// 前置校验失败时订单转为 Invalid, 不发起任何网络请求。
    /// 网关错误或超时时订单保持 Created, 可用同一订单ID安全重试。
    pub async fn submit(&self, order: &Order) -> Result<SubmissionReceipt> {
        if order.status != OrderStatus::Created {
            return self.existing_receipt(order);
        }

        if let Err(message) = validate_order(order) {
            log::warn!("Order {} failed validation: {}", order.order_id, message);
            self.mark_invalid(order).await;
            return Err(PaymentError::Validation(message));
        }

        let notification_id = self.credentials.notification_id.clone().ok_or_else(|| {
            PaymentError::Authentication("IPN notification id is not configured".to_string())
        })?;

        let request = SubmitOrderRequest {
            id: order.order_id,
            currency: order.currency.clone(),
            amount: order.amount,
            description: order.gateway_description(),
            callback_url: self.credentials.callback_url.clone(),
            notification_id,
            billing_address: BillingAddress {
                email_address: order.payer_email.clone(),
                phone_number: order.payer_phone.clone(),
            },
        };

        let response = match self.send_with_token_retry(&request).await {
            Ok(response) => response,
            Err(PaymentError::MalformedResponse(detail)) => return Err(self.reject_malformed(order, &detail).await),
            Err(e) => return Err(e),
        };

        if let Some(error) = &response.error {
            return Err(PaymentError::Gateway(format!(
                "Gateway rejected order {}: {}",
                order.order_id,
                error.describe()
            )));
        }

        let expected_reference = order.order_id.to_string();
        if let Some(reference) = response.merchant_reference.as_deref() {
            if !reference.eq_ignore_ascii_case(&expected_reference) {
                let detail = format!("merchant reference {} does not match the submitted order", reference);
                return Err(self.reject_malformed(order, &detail).await);
            }
        }

        let receipt = match (response.redirect_url, response.order_tracking_id) {
            (Some(redirect_url), Some(tracking_id)) if !redirect_url.is_empty() && !tracking_id.is_empty() => {
                SubmissionReceipt { redirect_url, tracking_id }
            }
            _ => {
                let detail = format!("no redirect url or tracking id (status {:?})", response.status);
                return Err(self.reject_malformed(order, &detail).await);
            }
        };

        self.record_submission(order, receipt).await
    }

    /// 网关已受理但响应不可用: 订单转为 Invalid, 向调用方报告网关错误
    async fn reject_malformed(&self, order: &Order, detail: &str) -> PaymentError {
        log::error!("Gateway accepted order {} with a malformed response: {}", order.order_id, detail);
        self.mark_invalid(order).await;
        PaymentError::Gateway(format!("Malformed submission response for order {}", order.order_id))
    }

    /// 使用有效令牌发送; 令牌被拒绝时刷新一次并重试一次
    async fn send_with_token_retry(&self, request: &SubmitOrderRequest) -> Result<SubmitOrderResponse> {
        let token = self.tokens.get_token().await?;

        match self.gateway.submit_order(&token, request).await {
            Err(PaymentError::TokenRejected) => {
                log::warn!("Gateway rejected token while submitting order {}, refreshing once", request.id);
                self.tokens.invalidate(&token).await;
                let fresh = self.tokens.get_token().await?;

                self.gateway
                    .submit_order(&fresh, request)
                    .await
                    .map_err(|e| match e {
                        PaymentError::TokenRejected => PaymentError::Authentication(
                            "Gateway rejected a freshly issued token".to_string(),
                        ),
                        other => other,
                    })
            }
            other => other,
        }
    }

    /// 写入跟踪ID并推进到 AwaitingCallback
    async fn record_submission(&self, order: &Order, receipt: SubmissionReceipt) -> Result<SubmissionReceipt> {
        let submitted = order.mark_submitted(receipt.tracking_id.clone(), receipt.redirect_url.clone())?;

        match self.store.compare_and_swap(&submitted, order.version).await {
            Ok(()) => {}
            Err(PaymentError::StaleTransition { .. }) => {
                // 同一订单的并发提交已经胜出, 以胜者结果为准
                let current = self.reload(order).await?;
                log::info!(
                    "Order {} was submitted concurrently, returning recorded outcome ({})",
                    order.order_id,
                    current.status
                );
                return self.existing_receipt(&current);
            }
            Err(e) => return Err(e),
        }

        log::info!(
            "Submitted order {} to gateway, tracking id {}",
            order.order_id,
            receipt.tracking_id
        );

        let awaiting = submitted.transition(OrderStatus::AwaitingCallback)?;
        match self.store.compare_and_swap(&awaiting, submitted.version).await {
            Ok(()) => {}
            // 回调先到达并已完成对账
            Err(PaymentError::StaleTransition { .. }) => {
                log::debug!("Order {} reconciled before it reached awaiting_callback", order.order_id);
            }
            Err(e) => return Err(e),
        }

        Ok(receipt)
    }

    /// 已提交订单的回执 (重复发起时返回原结果)
    fn existing_receipt(&self, order: &Order) -> Result<SubmissionReceipt> {
        match (&order.redirect_url, &order.gateway_tracking_id) {
            (Some(redirect_url), Some(tracking_id)) if !order.is_terminal() => Ok(SubmissionReceipt {
                redirect_url: redirect_url.clone(),
                tracking_id: tracking_id.clone(),
            }),
            _ => Err(PaymentError::stale(
                order.order_id,
                format!("order is {} and cannot be submitted", order.status),
            )),
        }
    }

    async fn reload(&self, order: &Order) -> Result<Order> {
        self.store
            .get(order.order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder(order.order_id.to_string()))
    }

    /// Created -> Invalid; 竞争失败时保留已有状态
    async fn mark_invalid(&self, order: &Order) {
        let result = match order.transition(OrderStatus::Invalid) {
            Ok(invalid) => self.store.compare_and_swap(&invalid, order.version).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::warn!("Could not mark order {} invalid: {}", order.order_id, e);
        }
    }
}

/// 提交前置校验
///
/// 所有字段错误一次性汇总返回。
pub fn validate_order(order: &Order) -> std::result::Result<(), String> {
    let mut validator = InputValidator::new();

    validator.validate_amount_field("amount", &order.amount);
    validator.validate_currency_field("currency", &order.currency);
    validator.validate_required("description", &order.description);
    validator.validate_length("description", &order.gateway_description(), 0, MAX_DESCRIPTION_LENGTH);
    validator.validate_email_field("payer_email", &order.payer_email);
    validator.validate_phone_field("payer_phone", &order.payer_phone);

    validator.into_result()
}
