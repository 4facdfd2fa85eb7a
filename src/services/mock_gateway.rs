// 测试用支付网关
// 可编排令牌交换与订单提交的结果, 并记录调用次数

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;
use crate::errors::{PaymentError, Result};
use crate::models::{AuthToken, GatewayErrorBody, SubmitOrderRequest, SubmitOrderResponse};
use crate::services::PaymentGateway;

/// 单次订单提交的编排结果
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// 正常受理
    Accept,
    /// 返回 401
    RejectToken,
    /// 网络或5xx错误
    Fail(String),
    /// 2xx 但响应体带错误对象
    ErrorBody(String),
    /// 2xx 但缺少跳转地址和跟踪ID
    Malformed,
    /// 2xx 但响应体不是JSON
    Unparseable,
    /// 2xx 但商户订单号属于其他订单
    ForeignReference,
}

pub struct MockGateway {
    token_requests: AtomicUsize,
    submissions: AtomicUsize,
    fail_tokens: AtomicBool,
    token_lifetime: Mutex<chrono::Duration>,
    token_delay: Mutex<Duration>,
    submit_delay: Mutex<Duration>,
    outcomes: Mutex<VecDeque<SubmitOutcome>>,
    tracking_ids: Mutex<HashMap<Uuid, String>>,
    tokens_seen: Mutex<Vec<String>>,
    last_request: Mutex<Option<SubmitOrderRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            token_requests: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            fail_tokens: AtomicBool::new(false),
            token_lifetime: Mutex::new(chrono::Duration::minutes(5)),
            token_delay: Mutex::new(Duration::ZERO),
            submit_delay: Mutex::new(Duration::ZERO),
            outcomes: Mutex::new(VecDeque::new()),
            tracking_ids: Mutex::new(HashMap::new()),
            tokens_seen: Mutex::new(Vec::new()),
            last_request: Mutex::new(None),
        }
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn fail_token_requests(&self, fail: bool) {
        self.fail_tokens.store(fail, Ordering::SeqCst);
    }

    pub fn set_token_lifetime(&self, lifetime: chrono::Duration) {
        *self.token_lifetime.lock().unwrap() = lifetime;
    }

    pub fn set_token_delay(&self, delay: Duration) {
        *self.token_delay.lock().unwrap() = delay;
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    /// 追加下一次提交的结果; 队列为空时默认受理
    pub fn push_outcome(&self, outcome: SubmitOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// 提交时携带的令牌, 按调用顺序
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<SubmitOrderRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn tracking_id_for(order_id: Uuid) -> String {
        format!("TRK-{}", order_id.simple())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn request_token(&self, _consumer_key: &str, _consumer_secret: &str) -> Result<AuthToken> {
        let n = self.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.token_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_tokens.load(Ordering::SeqCst) {
            return Err(PaymentError::Authentication("invalid_consumer_key_or_secret".to_string()));
        }
        let lifetime = *self.token_lifetime.lock().unwrap();
        Ok(AuthToken {
            value: format!("token-{}", n),
            expires_at: Utc::now() + lifetime,
        })
    }

    async fn register_ipn(&self, _token: &str, callback_url: &str) -> Result<String> {
        Ok(format!("ipn-{}", callback_url.len()))
    }

    async fn submit_order(&self, token: &str, request: &SubmitOrderRequest) -> Result<SubmitOrderResponse> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.to_string());
        *self.last_request.lock().unwrap() = Some(request.clone());

        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(SubmitOutcome::Accept);
        match outcome {
            SubmitOutcome::Accept => {
                // 同一商户订单号重复提交时返回同一个跟踪ID
                let tracking_id = self
                    .tracking_ids
                    .lock()
                    .unwrap()
                    .entry(request.id)
                    .or_insert_with(|| Self::tracking_id_for(request.id))
                    .clone();
                Ok(SubmitOrderResponse {
                    redirect_url: Some(format!("https://pay.example.com/iframe?OrderTrackingId={}", tracking_id)),
                    order_tracking_id: Some(tracking_id),
                    merchant_reference: Some(request.id.to_string()),
                    error: None,
                    status: Some("200".to_string()),
                })
            }
            SubmitOutcome::RejectToken => Err(PaymentError::TokenRejected),
            SubmitOutcome::Fail(message) => Err(PaymentError::Gateway(message)),
            SubmitOutcome::ErrorBody(code) => Ok(SubmitOrderResponse {
                error: Some(GatewayErrorBody {
                    error_type: Some("api_error".to_string()),
                    code: Some(code),
                    message: Some("rejected by mock".to_string()),
                }),
                status: Some("500".to_string()),
                ..Default::default()
            }),
            SubmitOutcome::Malformed => Ok(SubmitOrderResponse {
                status: Some("200".to_string()),
                ..Default::default()
            }),
            SubmitOutcome::Unparseable => Err(PaymentError::MalformedResponse(
                "api/Transactions/SubmitOrderRequest returned unparseable body".to_string(),
            )),
            SubmitOutcome::ForeignReference => {
                let tracking_id = Self::tracking_id_for(request.id);
                Ok(SubmitOrderResponse {
                    redirect_url: Some(format!("https://pay.example.com/iframe?OrderTrackingId={}", tracking_id)),
                    order_tracking_id: Some(tracking_id),
                    merchant_reference: Some(Uuid::new_v4().to_string()),
                    error: None,
                    status: Some("200".to_string()),
                })
            }
        }
    }
}
