// 健康检查API处理器

use actix_web::HttpResponse;
use serde::Serialize;
use crate::state::AppStateData;

/// 系统健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本信息
    pub version: String,
    /// 订单存储状态
    pub store: String,
    /// 网关环境
    pub gateway_environment: String,
    /// 当前时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// 基础健康检查
///
/// GET /health
///
/// 订单存储不可用时返回503
pub async fn health_check(data: AppStateData) -> HttpResponse {
    let mut health = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: "connected".to_string(),
        gateway_environment: format!("{:?}", data.config.gateway.environment).to_lowercase(),
        timestamp: chrono::Utc::now(),
    };

    if let Err(e) = data.checkout.ping_store().await {
        log::error!("Order store health check failed: {}", e);
        health.store = "disconnected".to_string();
        health.status = "unhealthy".to_string();
        return HttpResponse::ServiceUnavailable().json(health);
    }

    HttpResponse::Ok().json(health)
}
