// 订单构建
// 把店面的购买请求转换为规范化、带唯一ID的订单记录

use crate::models::{InitiatePaymentRequest, Order};
use crate::utils::normalize_phone;

/// 订单构建器
///
/// 只做规范化 (去空白、币种大写、电话去分隔符), 不做校验;
/// 校验由提交前置检查完成, 以便不合法的请求也留下 Invalid 记录。
pub struct OrderBuilder;

impl OrderBuilder {
    /// 构建新订单
    pub fn build(request: InitiatePaymentRequest) -> Order {
        let item_label = request
            .item_label
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty());

        Order::new(
            request.amount,
            request.currency.trim().to_ascii_uppercase(),
            request.description.trim().to_string(),
            item_label,
            request.payer_email.trim().to_string(),
            normalize_phone(&request.payer_phone),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_build_normalizes_fields() {
        let order = OrderBuilder::build(InitiatePaymentRequest {
            amount: dec!(4200000),
            currency: " ugx ".to_string(),
            description: " Grow ".to_string(),
            payer_email: " payer@example.com".to_string(),
            payer_phone: "+256 701-234-567".to_string(),
            item_label: Some("   ".to_string()),
        });

        assert_eq!(order.currency, "UGX");
        assert_eq!(order.description, "Grow");
        assert_eq!(order.payer_email, "payer@example.com");
        assert_eq!(order.payer_phone, "+256701234567");
        assert!(order.item_label.is_none());
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[test]
    fn test_each_build_gets_a_new_id() {
        let request = InitiatePaymentRequest {
            amount: dec!(1),
            currency: "UGX".to_string(),
            description: "Grow".to_string(),
            payer_email: "payer@example.com".to_string(),
            payer_phone: "0701234567".to_string(),
            item_label: None,
        };
        let a = OrderBuilder::build(request.clone());
        let b = OrderBuilder::build(request);
        assert_ne!(a.order_id, b.order_id);
    }
}
