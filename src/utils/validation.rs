// 数据验证工具函数
// 提供输入数据验证和格式检查功能

use std::collections::BTreeMap;
use std::sync::OnceLock;
use regex::Regex;
use rust_decimal::Decimal;

/// 网关允许的描述最大长度
pub const MAX_DESCRIPTION_LENGTH: usize = 100;

/// 金额允许的最大小数位
pub const MAX_AMOUNT_SCALE: u32 = 2;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
    })
}

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").expect("valid url regex"))
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    // 乌干达号码: +256 / 256 / 0 前缀, 随后9位且以3、4、7开头
    PHONE.get_or_init(|| Regex::new(r"^(?:\+256|256|0)[347]\d{8}$").expect("valid phone regex"))
}

/// 验证邮箱地址格式
///
/// # Arguments
/// * `email` - 邮箱地址字符串
///
/// # Returns
/// * 邮箱是否有效
pub fn validate_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// 验证URL格式
pub fn validate_url(url: &str) -> bool {
    url_regex().is_match(url)
}

/// 验证电话号码格式 (忽略空格和连字符)
pub fn validate_phone(phone: &str) -> bool {
    phone_regex().is_match(&normalize_phone(phone))
}

/// 去掉电话号码中的空格和连字符
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect()
}

/// 验证币种代码 (三位字母)
pub fn validate_currency(currency: &str) -> bool {
    currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic())
}

/// 验证支付金额
///
/// # Returns
/// * 错误描述 (金额有效时为 None)
pub fn check_payment_amount(amount: &Decimal) -> Option<&'static str> {
    if *amount <= Decimal::ZERO {
        return Some("Amount must be greater than zero");
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Some("Amount has too many decimal places");
    }
    None
}

/// 通用输入验证器
pub struct InputValidator {
    errors: BTreeMap<String, Vec<String>>,
}

impl InputValidator {
    /// 创建新的验证器
    pub fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }

    /// 添加字段验证错误
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    /// 验证必填字段
    pub fn validate_required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add_error(field, "This field is required");
        }
    }

    /// 验证字符串长度
    pub fn validate_length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min {
            self.add_error(field, &format!("Must be at least {} characters", min));
        }
        if len > max {
            self.add_error(field, &format!("Must be at most {} characters", max));
        }
    }

    /// 验证邮箱格式
    pub fn validate_email_field(&mut self, field: &str, email: &str) {
        if !validate_email(email) {
            self.add_error(field, "Invalid email format");
        }
    }

    /// 验证电话格式
    pub fn validate_phone_field(&mut self, field: &str, phone: &str) {
        if !validate_phone(phone) {
            self.add_error(field, "Invalid phone number format");
        }
    }

    /// 验证币种
    pub fn validate_currency_field(&mut self, field: &str, currency: &str) {
        if !validate_currency(currency) {
            self.add_error(field, "Currency must be a three-letter code");
        }
    }

    /// 验证金额
    pub fn validate_amount_field(&mut self, field: &str, amount: &Decimal) {
        if let Some(message) = check_payment_amount(amount) {
            self.add_error(field, message);
        }
    }

    /// 检查是否有验证错误
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 转换为错误结果
    pub fn into_result(self) -> Result<(), String> {
        if !self.has_errors() {
            return Ok(());
        }

        let error_msg = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        Err(error_msg)
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_email() {
        // 有效邮箱
        assert!(validate_email("test@example.com"));
        assert!(validate_email("user.name+tag@domain.co.ug"));

        // 无效邮箱
        assert!(!validate_email("invalid-email"));
        assert!(!validate_email("@domain.com"));
        assert!(!validate_email("user@"));
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+256701234567"));
        assert!(validate_phone("0701234567"));
        assert!(validate_phone("256 701 234 567"));
        assert!(validate_phone("0414-123456"));

        assert!(!validate_phone("+25670123456")); // 太短
        assert!(!validate_phone("+254701234567")); // 非本国
        assert!(!validate_phone("0801234567")); // 号段无效
        assert!(!validate_phone(""));
    }

    #[test]
    fn test_validate_currency() {
        assert!(validate_currency("UGX"));
        assert!(validate_currency("usd"));
        assert!(!validate_currency(""));
        assert!(!validate_currency("US"));
        assert!(!validate_currency("U5D"));
    }

    #[test]
    fn test_check_payment_amount() {
        assert!(check_payment_amount(&dec!(4200000)).is_none());
        assert!(check_payment_amount(&dec!(10.50)).is_none());
        assert!(check_payment_amount(&dec!(10.500)).is_none());
        assert!(check_payment_amount(&Decimal::ZERO).is_some());
        assert!(check_payment_amount(&dec!(-1)).is_some());
        assert!(check_payment_amount(&dec!(1.005)).is_some());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://shop.example.com/payment-callback"));
        assert!(!validate_url("/payment-callback"));
    }

    #[test]
    fn test_input_validator() {
        let mut validator = InputValidator::new();

        validator.validate_required("description", "");
        validator.validate_email_field("payer_email", "invalid-email");
        validator.validate_amount_field("amount", &Decimal::ZERO);

        assert!(validator.has_errors());
        let message = validator.into_result().unwrap_err();
        assert_eq!(message.split("; ").count(), 3);
        assert!(message.contains("amount: Amount must be greater than zero"));
    }
}
