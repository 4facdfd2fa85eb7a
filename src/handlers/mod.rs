// API处理器模块
// 包含所有HTTP请求处理逻辑

pub mod checkout_handlers;
pub mod health_handlers;

// 重新导出处理器
pub use checkout_handlers::*;
pub use health_handlers::*;
