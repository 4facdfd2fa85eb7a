// API路由配置
// 定义所有HTTP接口的路由规则

use actix_web::{web, Scope};
use crate::handlers::*;

/// 结账API路由
pub fn api_routes() -> Scope {
    web::scope("/api")
        .app_data(json_config())
        .route("/initiate-payment", web::post().to(initiate_payment))
        .route("/orders/{order_id}", web::get().to(get_order))
}

/// 公共路由 (网关回调、健康检查)
pub fn public_routes() -> Scope {
    web::scope("")
        .route("/payment-callback", web::get().to(payment_callback))
        .route("/health", web::get().to(health_check))
}
