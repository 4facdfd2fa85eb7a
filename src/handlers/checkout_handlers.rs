// 结账API处理器
// 处理店面发起支付、网关回调跳转、订单查询等HTTP请求

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use uuid::Uuid;
use crate::errors::PaymentError;
use crate::models::{ApiResponse, CallbackQuery, InitiatePaymentRequest, OrderResponse, RedirectDecision};
use crate::state::AppStateData;

/// JSON请求体解析配置
///
/// 缺字段或格式错误的请求体按校验错误返回标准响应信封。
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| PaymentError::Validation(err.to_string()).into())
}

/// 发起支付
///
/// POST /api/initiate-payment
///
/// 请求体: InitiatePaymentRequest
/// 响应: InitiatePaymentResponse
pub async fn initiate_payment(
    data: AppStateData,
    request: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, PaymentError> {
    let response = data.checkout.initiate(request.into_inner()).await?;
    log::info!(
        "Payment initiated for order {} (tracking id {})",
        response.order_id,
        response.order_tracking_id
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// 网关回调
///
/// GET /payment-callback?OrderTrackingId=...&OrderStatus=...
///
/// 总是以302跳转到成功或失败页面, 查询参数无法解析时也一样
pub async fn payment_callback(data: AppStateData, req: HttpRequest) -> HttpResponse {
    let location = match web::Query::<CallbackQuery>::from_query(req.query_string()) {
        Ok(query) => data.checkout.notify(&query).await,
        Err(e) => {
            log::warn!("Anomaly: unparseable callback query '{}': {}", req.query_string(), e);
            data.checkout.redirect_url(RedirectDecision::Failure).to_string()
        }
    };
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// 查询订单
///
/// GET /api/orders/{order_id}
pub async fn get_order(data: AppStateData, path: web::Path<String>) -> Result<HttpResponse, PaymentError> {
    let order_id = Uuid::parse_str(path.trim())
        .map_err(|_| PaymentError::Validation(format!("Invalid order id '{}'", path)))?;
    let order = data.checkout.find_order(order_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(OrderResponse::from(&order))))
}
