// 应用状态管理
// 包含结账服务、配置信息等全局状态

use std::sync::Arc;
use actix_web::web;
use crate::config::Config;
use crate::services::{
    CallbackReconciler, CheckoutService, OrderStore, OrderSubmitter, PaymentGateway, RetryPolicy, TokenManager,
};

/// 应用全局状态
pub struct AppState {
    /// 应用配置
    pub config: Config,
    /// 结账服务
    pub checkout: Arc<CheckoutService>,
}

impl AppState {
    /// 创建新的应用状态实例
    ///
    /// # Arguments
    /// * `config` - 应用配置
    /// * `store` - 订单存储
    /// * `gateway` - 支付网关
    ///
    /// # Returns
    /// * 应用状态实例
    pub fn new(config: Config, store: Arc<dyn OrderStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        let credentials = config.gateway.credentials.clone();
        let tokens = Arc::new(TokenManager::new(
            gateway.clone(),
            credentials.clone(),
            config.gateway.token_safety_margin,
        ));
        let submitter = Arc::new(OrderSubmitter::new(store.clone(), gateway, tokens, credentials));
        let reconciler = Arc::new(CallbackReconciler::new(store.clone()));
        let checkout = Arc::new(CheckoutService::new(
            store,
            submitter,
            reconciler,
            RetryPolicy::from(&config.gateway),
            &config.reconciliation,
        ));

        Self { config, checkout }
    }

    /// 创建测试用的应用状态
    #[cfg(test)]
    pub fn new_for_test(gateway: Arc<crate::services::mock_gateway::MockGateway>) -> Self {
        let store = Arc::new(crate::services::InMemoryOrderStore::new());
        Self::new(Config::for_test(), store, gateway)
    }
}

/// 应用状态数据类型别名
pub type AppStateData = web::Data<AppState>;
