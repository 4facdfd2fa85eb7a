// 结账服务
// 组合订单构建、提交和回调对账, 对HTTP层提供发起支付与回调通知两个操作

use std::sync::Arc;
use std::time::Duration;
use rand::Rng;
use tokio::time::sleep;
use uuid::Uuid;
use crate::config::{GatewayConfig, ReconciliationConfig};
use crate::errors::{PaymentError, Result};
use crate::models::{
    CallbackQuery, InitiatePaymentRequest, InitiatePaymentResponse, Order, OrderStatus, RedirectDecision,
    ReportedStatus,
};
use crate::services::{CallbackReconciler, OrderBuilder, OrderStore, OrderSubmitter};

/// 提交重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次失败后的最大重试次数
    pub max_retries: u32,
    /// 基础退避间隔
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// 第 `attempt` 次重试前的等待时间: base * 2^attempt 加最多一个 base 的随机抖动
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.base_delay.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            Duration::ZERO
        };
        exponential + jitter
    }
}

impl From<&GatewayConfig> for RetryPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
        }
    }
}

/// 结账服务
pub struct CheckoutService {
    store: Arc<dyn OrderStore>,
    submitter: Arc<OrderSubmitter>,
    reconciler: Arc<CallbackReconciler>,
    retry: RetryPolicy,
    success_url: String,
    failure_url: String,
}

impl CheckoutService {
    /// 创建新的结账服务
    pub fn new(
        store: Arc<dyn OrderStore>,
        submitter: Arc<OrderSubmitter>,
        reconciler: Arc<CallbackReconciler>,
        retry: RetryPolicy,
        reconciliation: &ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            submitter,
            reconciler,
            retry,
            success_url: reconciliation.success_url.clone(),
            failure_url: reconciliation.failure_url.clone(),
        }
    }

    /// 发起支付
    ///
    /// # Arguments
    /// * `request` - 店面购买请求
    ///
    /// # Returns
    /// * 付款人跳转地址
    ///
    /// 网关错误按指数退避重试, 每次重试沿用同一订单ID。
    pub async fn initiate(&self, request: InitiatePaymentRequest) -> Result<InitiatePaymentResponse> {
        let order = OrderBuilder::build(request);
        self.store.insert(&order).await?;
        log::info!(
            "Created order {} for {} {} ({})",
            order.order_id,
            order.amount,
            order.currency,
            order.description
        );

        let mut attempt = 0;
        let receipt = loop {
            let current = self.current(&order).await?;
            match self.submitter.submit(&current).await {
                Ok(receipt) => break receipt,
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    // 只有仍处于 Created 的订单可以重新提交
                    if self.current(&order).await?.status != OrderStatus::Created {
                        return Err(e);
                    }
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    log::warn!(
                        "Submitting order {} failed (attempt {}), retrying in {}ms: {}",
                        order.order_id,
                        attempt,
                        delay.as_millis(),
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let current = self.current(&order).await?;
        Ok(InitiatePaymentResponse {
            order_id: order.order_id,
            redirect_url: receipt.redirect_url,
            order_tracking_id: receipt.tracking_id,
            status: current.status,
        })
    }

    /// 处理网关回调通知, 返回付款人应跳转的地址
    ///
    /// 任何错误都只写日志并跳转到失败页面, 不向付款人暴露错误细节。
    pub async fn notify(&self, query: &CallbackQuery) -> String {
        let decision = match self.reconcile_query(query).await {
            Ok(decision) => decision,
            Err(PaymentError::UnknownOrder(tracking_id)) => {
                log::warn!(
                    "Anomaly: callback for unknown tracking id {} (merchant reference {:?})",
                    tracking_id,
                    query.merchant_reference
                );
                RedirectDecision::Failure
            }
            Err(PaymentError::Validation(message)) => {
                log::warn!("Anomaly: rejected callback {:?}: {}", query, message);
                RedirectDecision::Failure
            }
            Err(e) => {
                log::error!("Callback reconciliation failed for {:?}: {}", query.tracking_id, e);
                RedirectDecision::Failure
            }
        };
        self.redirect_url(decision).to_string()
    }

    async fn reconcile_query(&self, query: &CallbackQuery) -> Result<RedirectDecision> {
        let tracking_id = query
            .tracking_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PaymentError::Validation("Missing OrderTrackingId".to_string()))?;

        let reported: ReportedStatus = query
            .status
            .as_deref()
            .ok_or_else(|| PaymentError::Validation("Missing payment status".to_string()))?
            .parse()?;

        log::info!(
            "Callback received for tracking id {} ({:?}, type {:?})",
            tracking_id,
            reported,
            query.notification_type
        );
        self.reconciler.reconcile(tracking_id, reported).await
    }

    /// 跳转决策对应的页面地址
    pub fn redirect_url(&self, decision: RedirectDecision) -> &str {
        match decision {
            RedirectDecision::Success => &self.success_url,
            RedirectDecision::Failure => &self.failure_url,
        }
    }

    /// 查询订单
    pub async fn find_order(&self, order_id: Uuid) -> Result<Order> {
        self.store
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::UnknownOrder(order_id.to_string()))
    }

    async fn current(&self, order: &Order) -> Result<Order> {
        self.find_order(order.order_id).await
    }

    /// 存储连通性检查
    pub async fn ping_store(&self) -> Result<()> {
        self.store.ping().await
    }

    /// 周期性扫描超时未回调的订单
    pub async fn run_timeout_sweeper(self: Arc<Self>, callback_timeout: Duration, interval: Duration) {
        log::info!(
            "Starting callback timeout sweeper (timeout {}s, interval {}s)",
            callback_timeout.as_secs(),
            interval.as_secs()
        );

        loop {
            sleep(interval).await;
            if let Err(e) = self.reconciler.expire_overdue(callback_timeout).await {
                log::error!("Callback timeout sweep failed: {}", e);
            }
        }
    }
}
