// 配置管理模块
// 负责加载和管理应用程序配置

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Result, Context};

const SANDBOX_BASE_URL: &str = "https://cybqa.pesapal.com/pesapalv3";
const PRODUCTION_BASE_URL: &str = "https://pay.pesapal.com/v3";

/// 应用程序配置结构
#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器配置
    pub server: ServerConfig,
    /// 支付网关配置
    pub gateway: GatewayConfig,
    /// 对账配置
    pub reconciliation: ReconciliationConfig,
    /// 数据库配置 (未配置时使用内存存储)
    pub database: Option<DatabaseConfig>,
}

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 服务器监听地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
    /// 允许跨域的店面来源
    pub allowed_origins: Vec<String>,
}

/// 网关环境
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEnvironment {
    Sandbox,
    Production,
}

impl GatewayEnvironment {
    /// 环境对应的默认API地址
    pub fn base_url(&self) -> &'static str {
        match self {
            GatewayEnvironment::Sandbox => SANDBOX_BASE_URL,
            GatewayEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl FromStr for GatewayEnvironment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" => Ok(GatewayEnvironment::Sandbox),
            "production" | "live" => Ok(GatewayEnvironment::Production),
            other => anyhow::bail!("Unknown gateway environment '{}'", other),
        }
    }
}

/// 网关凭证 (运行期只读)
#[derive(Clone)]
pub struct Credentials {
    /// 消费者密钥
    pub consumer_key: String,
    /// 消费者密钥口令
    pub consumer_secret: String,
    /// 对外公开的回调地址
    pub callback_url: String,
    /// 预注册的IPN通知ID
    pub notification_id: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("consumer_key", &"***")
            .field("consumer_secret", &"***")
            .field("callback_url", &self.callback_url)
            .field("notification_id", &self.notification_id)
            .finish()
    }
}

/// 支付网关配置
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 网关环境
    pub environment: GatewayEnvironment,
    /// API基础地址
    pub base_url: String,
    /// 凭证
    pub credentials: Arc<Credentials>,
    /// 单次请求超时
    pub timeout: Duration,
    /// 令牌安全余量
    pub token_safety_margin: Duration,
    /// 提交失败时的最大重试次数
    pub max_retries: u32,
    /// 重试基础间隔
    pub retry_base_delay: Duration,
}

/// 对账配置
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// 等待回调的最长时间, 超时视为失败
    pub callback_timeout: Duration,
    /// 超时扫描间隔
    pub sweep_interval: Duration,
    /// 支付成功跳转页面
    pub success_url: String,
    /// 支付失败跳转页面
    pub failure_url: String,
}

/// 数据库配置
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
}

/// 读取带默认值的环境变量并解析
fn env_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

/// 分钟数转换为时长, 溢出时返回 None
fn minutes(value: u64) -> Option<Duration> {
    value.checked_mul(60).map(Duration::from_secs)
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        let environment: GatewayEnvironment = env::var("PESAPAL_ENVIRONMENT")
            .context("PESAPAL_ENVIRONMENT environment variable is required")?
            .parse()?;

        let credentials = Credentials {
            consumer_key: env::var("PESAPAL_CONSUMER_KEY")
                .context("PESAPAL_CONSUMER_KEY environment variable is required")?,
            consumer_secret: env::var("PESAPAL_CONSUMER_SECRET")
                .context("PESAPAL_CONSUMER_SECRET environment variable is required")?,
            callback_url: env::var("PESAPAL_CALLBACK_URL")
                .context("PESAPAL_CALLBACK_URL environment variable is required")?,
            notification_id: env::var("PESAPAL_IPN_ID").ok().filter(|id| !id.trim().is_empty()),
        };

        let database = match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(DatabaseConfig {
                url,
                max_connections: env_or("DB_MAX_CONNECTIONS", "10")?,
            }),
            _ => None,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env_or("PORT", "8080")?,
                allowed_origins: env::var("ALLOWED_ORIGINS")
                    .map(|origins| {
                        origins
                            .split(',')
                            .map(|o| o.trim().to_string())
                            .filter(|o| !o.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            gateway: GatewayConfig {
                environment,
                base_url: env::var("PESAPAL_BASE_URL")
                    .unwrap_or_else(|_| environment.base_url().to_string()),
                credentials: Arc::new(credentials),
                timeout: Duration::from_secs(env_or("GATEWAY_TIMEOUT", "30")?),
                token_safety_margin: Duration::from_secs(env_or("TOKEN_SAFETY_MARGIN", "60")?),
                max_retries: env_or("GATEWAY_MAX_RETRIES", "2")?,
                retry_base_delay: Duration::from_millis(env_or("GATEWAY_RETRY_BASE_MS", "500")?),
            },
            reconciliation: ReconciliationConfig {
                callback_timeout: minutes(env_or("CALLBACK_TIMEOUT_MINUTES", "30")?)
                    .context("CALLBACK_TIMEOUT_MINUTES is too large")?,
                sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL", "60")?),
                success_url: env::var("PAYMENT_SUCCESS_URL")
                    .unwrap_or_else(|_| "/payment-success".to_string()),
                failure_url: env::var("PAYMENT_FAILURE_URL")
                    .unwrap_or_else(|_| "/payment-failed".to_string()),
            },
            database,
        })
    }

    /// 验证配置的有效性
    ///
    /// `require_notification_id` 为 false 时允许缺少IPN ID (仅注册IPN时)。
    pub fn validate(&self, require_notification_id: bool) -> Result<()> {
        let credentials = &self.gateway.credentials;

        if credentials.consumer_key.trim().is_empty() || credentials.consumer_secret.trim().is_empty() {
            anyhow::bail!("Gateway consumer key and secret cannot be empty");
        }

        if !crate::utils::validate_url(&credentials.callback_url) {
            anyhow::bail!("PESAPAL_CALLBACK_URL must be an absolute http(s) URL");
        }

        if !crate::utils::validate_url(&self.gateway.base_url) {
            anyhow::bail!("Gateway base URL must be an absolute http(s) URL");
        }

        if require_notification_id && credentials.notification_id.is_none() {
            anyhow::bail!("PESAPAL_IPN_ID is required; run `register-ipn` once to obtain it");
        }

        if self.gateway.timeout.is_zero() {
            anyhow::bail!("GATEWAY_TIMEOUT cannot be 0");
        }

        if self.reconciliation.callback_timeout.is_zero() || self.reconciliation.sweep_interval.is_zero() {
            anyhow::bail!("Callback timeout and sweep interval cannot be 0");
        }

        Ok(())
    }

    /// 获取服务器绑定地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 测试用配置
    #[cfg(test)]
    pub fn for_test() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                allowed_origins: Vec::new(),
            },
            gateway: GatewayConfig {
                environment: GatewayEnvironment::Sandbox,
                base_url: SANDBOX_BASE_URL.to_string(),
                credentials: Arc::new(Credentials {
                    consumer_key: "test_key".to_string(),
                    consumer_secret: "test_secret".to_string(),
                    callback_url: "https://shop.example.com/payment-callback".to_string(),
                    notification_id: Some("ipn-test".to_string()),
                }),
                timeout: Duration::from_secs(5),
                token_safety_margin: Duration::from_secs(60),
                max_retries: 2,
                retry_base_delay: Duration::from_millis(1),
            },
            reconciliation: ReconciliationConfig {
                callback_timeout: Duration::from_secs(30 * 60),
                sweep_interval: Duration::from_secs(60),
                success_url: "/payment-success".to_string(),
                failure_url: "/payment-failed".to_string(),
            },
            database: None,
        }
    }
}
