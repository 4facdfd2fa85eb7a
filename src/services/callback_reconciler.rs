// 回调对账服务
// 处理网关的异步支付通知, 以版本号保护的状态变更收敛订单终态

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use crate::errors::{PaymentError, Result};
use crate::models::{Order, OrderStatus, RedirectDecision, ReportedStatus};
use crate::services::OrderStore;

/// 并发冲突时重新读取的最大次数
const MAX_CAS_ATTEMPTS: usize = 5;

/// 超时扫描覆盖的状态
const PENDING_STATUSES: [OrderStatus; 2] = [OrderStatus::Submitted, OrderStatus::AwaitingCallback];

/// 回调对账服务
pub struct CallbackReconciler {
    store: Arc<dyn OrderStore>,
}

impl CallbackReconciler {
    /// 创建新的对账服务
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// 对账一次网关回调
    ///
    /// # Arguments
    /// * `tracking_id` - 网关跟踪ID
    /// * `reported` - 网关上报的支付结果
    ///
    /// # Returns
    /// * 付款人跳转决策
    ///
    /// 订单不存在时返回 `UnknownOrder` 且不做任何修改; 订单已是终态时
    /// 直接返回已记录的结果, 同一回调重复投递不会改变订单。
    pub async fn reconcile(&self, tracking_id: &str, reported: ReportedStatus) -> Result<RedirectDecision> {
        let target = reported.target_status();

        for _ in 0..MAX_CAS_ATTEMPTS {
            let order = self
                .store
                .find_by_tracking_id(tracking_id)
                .await?
                .ok_or_else(|| PaymentError::UnknownOrder(tracking_id.to_string()))?;

            if order.is_terminal() {
                if order.status != target {
                    log::warn!(
                        "Order {} is already {}, ignoring reported {:?} for tracking id {}",
                        order.order_id,
                        order.status,
                        reported,
                        tracking_id
                    );
                } else {
                    log::info!("Duplicate callback for order {} ({})", order.order_id, order.status);
                }
                return Ok(RedirectDecision::from(order.status));
            }

            let next = order.transition(target)?;
            match self.store.compare_and_swap(&next, order.version).await {
                Ok(()) => {
                    log::info!(
                        "Order {} moved {} -> {} (tracking id {})",
                        order.order_id,
                        order.status,
                        next.status,
                        tracking_id
                    );
                    return Ok(RedirectDecision::from(next.status));
                }
                Err(PaymentError::StaleTransition { reason, .. }) => {
                    // 另一个写入者先完成, 重新读取后以其结果为准
                    log::debug!("Lost transition race on order {}: {}", order.order_id, reason);
                }
                Err(e) => return Err(e),
            }
        }

        Err(PaymentError::stale(
            tracking_id,
            format!("gave up after {} concurrent update attempts", MAX_CAS_ATTEMPTS),
        ))
    }

    /// 将超过等待窗口仍未收到回调的订单置为 Failed
    ///
    /// # Returns
    /// * 本次置为失败的订单数量
    pub async fn expire_overdue(&self, callback_timeout: Duration) -> Result<u64> {
        let window = chrono::Duration::from_std(callback_timeout)
            .map_err(|e| PaymentError::Validation(format!("Invalid callback timeout: {}", e)))?;
        let cutoff = Utc::now() - window;

        let overdue = self.store.overdue(&PENDING_STATUSES, cutoff).await?;
        let mut expired = 0;

        for order in overdue {
            match self.expire(&order).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => log::error!("Failed to expire order {}: {}", order.order_id, e),
            }
        }

        if expired > 0 {
            log::warn!("Marked {} orders failed after callback timeout; manual reconciliation pending", expired);
        }
        Ok(expired)
    }

    async fn expire(&self, order: &Order) -> Result<bool> {
        let failed = order.transition(OrderStatus::Failed)?;
        match self.store.compare_and_swap(&failed, order.version).await {
            Ok(()) => {
                log::warn!(
                    "Order {} presumed failed: no callback since {}",
                    order.order_id,
                    order.updated_at
                );
                Ok(true)
            }
            // 回调在扫描期间到达
            Err(PaymentError::StaleTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
