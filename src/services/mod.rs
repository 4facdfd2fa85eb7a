// 服务层模块
// 包含所有业务逻辑服务

pub mod gateway_client;
pub mod token_manager;
pub mod order_store;
pub mod pg_order_store;
pub mod order_builder;
pub mod order_submitter;
pub mod callback_reconciler;
pub mod checkout_service;

#[cfg(test)]
pub mod mock_gateway;

// 重新导出服务
pub use gateway_client::{PaymentGateway, PesapalClient};
pub use token_manager::TokenManager;
pub use order_store::{InMemoryOrderStore, OrderStore};
pub use pg_order_store::PgOrderStore;
pub use order_builder::OrderBuilder;
pub use order_submitter::OrderSubmitter;
pub use callback_reconciler::CallbackReconciler;
pub use checkout_service::{CheckoutService, RetryPolicy};
