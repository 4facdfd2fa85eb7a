// 订单存储
// 订单ID到订单状态的持久映射, 以版本号做乐观并发控制

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::errors::{PaymentError, Result};
use crate::models::{Order, OrderStatus};

/// 订单存储接口
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 插入新订单, 订单ID已存在时报错
    async fn insert(&self, order: &Order) -> Result<()>;

    /// 按订单ID查询
    async fn get(&self, order_id: Uuid) -> Result<Option<Order>>;

    /// 按网关跟踪ID查询
    async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Order>>;

    /// 版本比较写入
    ///
    /// 仅当存储中的版本等于 `expected_version` 时写入 `next`,
    /// 否则返回 `PaymentError::StaleTransition` 且不做任何修改。
    async fn compare_and_swap(&self, next: &Order, expected_version: i64) -> Result<()>;

    /// 查询处于给定状态且在 `cutoff` 之前未更新的订单
    async fn overdue(&self, statuses: &[OrderStatus], cutoff: DateTime<Utc>) -> Result<Vec<Order>>;

    /// 存储连通性检查
    async fn ping(&self) -> Result<()>;
}

/// 内存订单存储
///
/// 每个订单独占一把锁; 索引只在插入和分配跟踪ID时短暂写锁定,
/// 不同订单之间的状态变更互不阻塞。
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Order>>>>>,
    tracking_index: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl InMemoryOrderStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, order_id: Uuid) -> Option<Arc<Mutex<Order>>> {
        self.orders.read().await.get(&order_id).cloned()
    }

    fn lock_order(cell: &Mutex<Order>) -> Result<std::sync::MutexGuard<'_, Order>> {
        cell.lock()
            .map_err(|_| PaymentError::Storage("order cell lock poisoned".to_string()))
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(PaymentError::Storage(format!("Order {} already exists", order.order_id)));
        }
        orders.insert(order.order_id, Arc::new(Mutex::new(order.clone())));
        drop(orders);

        if let Some(tracking_id) = &order.gateway_tracking_id {
            self.tracking_index.write().await.insert(tracking_id.clone(), order.order_id);
        }
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>> {
        match self.cell(order_id).await {
            Some(cell) => Ok(Some(Self::lock_order(&cell)?.clone())),
            None => Ok(None),
        }
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Order>> {
        let order_id = self.tracking_index.read().await.get(tracking_id).copied();
        match order_id {
            Some(order_id) => self.get(order_id).await,
            None => Ok(None),
        }
    }

    async fn compare_and_swap(&self, next: &Order, expected_version: i64) -> Result<()> {
        let cell = self
            .cell(next.order_id)
            .await
            .ok_or_else(|| PaymentError::UnknownOrder(next.order_id.to_string()))?;

        // 跟踪ID只能写入一次且全局唯一, 先占位索引再写订单
        let new_tracking_id = {
            let current = Self::lock_order(&cell)?;
            if current.version != expected_version {
                return Err(PaymentError::stale(
                    next.order_id,
                    format!("expected version {}, found {}", expected_version, current.version),
                ));
            }
            match (&current.gateway_tracking_id, &next.gateway_tracking_id) {
                (None, Some(tracking_id)) => Some(tracking_id.clone()),
                (Some(existing), Some(tracking_id)) if existing != tracking_id => {
                    return Err(PaymentError::stale(next.order_id, "tracking id is immutable"));
                }
                _ => None,
            }
        };

        if let Some(tracking_id) = &new_tracking_id {
            let mut index = self.tracking_index.write().await;
            match index.get(tracking_id) {
                Some(owner) if *owner != next.order_id => {
                    return Err(PaymentError::Storage(format!(
                        "Tracking id {} already belongs to order {}",
                        tracking_id, owner
                    )));
                }
                _ => {
                    index.insert(tracking_id.clone(), next.order_id);
                }
            }
        }

        let (outcome, orphaned) = {
            let mut current = Self::lock_order(&cell)?;
            if current.version == expected_version {
                *current = next.clone();
                (Ok(()), false)
            } else {
                let orphaned = new_tracking_id.is_some()
                    && current.gateway_tracking_id != new_tracking_id;
                let err = PaymentError::stale(
                    next.order_id,
                    format!("expected version {}, found {}", expected_version, current.version),
                );
                (Err(err), orphaned)
            }
        };

        // 输掉竞争且胜者没有使用同一跟踪ID时撤销索引占位
        if orphaned {
            if let Some(tracking_id) = &new_tracking_id {
                self.tracking_index.write().await.remove(tracking_id);
            }
        }
        outcome
    }

    async fn overdue(&self, statuses: &[OrderStatus], cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let cells: Vec<Arc<Mutex<Order>>> = self.orders.read().await.values().cloned().collect();
        let mut overdue = Vec::new();
        for cell in cells {
            let order = Self::lock_order(&cell)?;
            if statuses.contains(&order.status) && order.updated_at < cutoff {
                overdue.push(order.clone());
            }
        }
        overdue.sort_by_key(|o| o.updated_at);
        Ok(overdue)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
