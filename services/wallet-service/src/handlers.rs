use crate::database::WalletStore;
use crate::errors::WalletServiceError;
use crate::metrics;
use crate::models::{parse_amount_cents, BalanceResponse, OperationRequest, OperationResponse};
use crate::services::WalletService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Liveness plus the storage backend this instance was started with
pub async fn health_check<S: WalletStore>(
    service: web::Data<Arc<WalletService<S>>>,
) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": service.store().backend()
    }))
}

/// Deposit or withdraw endpoint
pub async fn create_operation<S: WalletStore>(
    service: web::Data<Arc<WalletService<S>>>,
    request: web::Json<OperationRequest>,
) -> Result<HttpResponse, WalletServiceError> {
    let request = request.into_inner();

    let wallet_id = Uuid::parse_str(request.wallet_id.trim())
        .map_err(|_| WalletServiceError::InvalidWalletId(request.wallet_id.clone()))?;
    let amount_cents = parse_amount_cents(&request.amount)?;

    debug!(
        "Operation request: wallet={} type={} amount={}",
        wallet_id, request.operation_type, request.amount
    );

    let result = service
        .process_operation(wallet_id, &request.operation_type, amount_cents)
        .await?;

    Ok(HttpResponse::Ok().json(OperationResponse::from(&result)))
}

/// Get balance endpoint
pub async fn get_balance<S: WalletStore>(
    service: web::Data<Arc<WalletService<S>>>,
    wallet_id: web::Path<String>,
) -> Result<HttpResponse, WalletServiceError> {
    // Malformed ids can never name a stored wallet.
    let wallet_id = match Uuid::parse_str(&wallet_id) {
        Ok(id) => id,
        Err(_) => {
            return Ok(HttpResponse::NotFound()
                .content_type("text/plain; charset=utf-8")
                .body("wallet not found\n"))
        }
    };

    let wallet = service.get_balance(wallet_id).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(&wallet)))
}

/// Operation and balance query counters in the Prometheus text format.
/// An encoding failure answers the same plain-text 500 as store failures.
pub async fn metrics_endpoint() -> Result<HttpResponse, WalletServiceError> {
    let body = metrics::metrics_handler()
        .map_err(|e| WalletServiceError::Internal(format!("metrics encoding: {e}")))?;

    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

/// Malformed bodies get the same plain-text 400 as other validation failures.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .content_type_required(false)
        .error_handler(|err, _req| {
            warn!("Rejected request body: {}", err);
            WalletServiceError::MalformedRequest("invalid json".to_string()).into()
        })
}

/// Configure routes
pub fn configure_routes<S: WalletStore>(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(
            web::scope("/api/v1/wallets")
                .route("", web::post().to(create_operation::<S>))
                .route("/{wallet_id}", web::get().to(get_balance::<S>)),
        )
        .route("/metrics", web::get().to(metrics_endpoint))
        .route("/health", web::get().to(health_check::<S>));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryWalletStore;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::Value;

    fn service_data() -> web::Data<Arc<WalletService<InMemoryWalletStore>>> {
        web::Data::new(Arc::new(WalletService::new(Arc::new(
            InMemoryWalletStore::new(),
        ))))
    }

    macro_rules! test_app {
        ($data:expr) => {
            test::init_service(
                App::new()
                    .app_data($data.clone())
                    .configure(configure_routes::<InMemoryWalletStore>),
            )
            .await
        };
    }

    fn operation(wallet_id: Uuid, operation_type: &str, amount: &str) -> Value {
        json!({
            "walletId": wallet_id.to_string(),
            "operationType": operation_type,
            "amount": amount,
        })
    }

    #[actix_web::test]
    async fn test_deposit_scenario() {
        let data = service_data();
        let app = test_app!(data);
        let id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(id, "DEPOSIT", "100.00"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["walletId"], id.to_string());
        assert_eq!(body["balance"], "100.00");
        assert_eq!(body["operationStatus"], "SUCCESS");
        assert!(body.get("error").is_none());
    }

    #[actix_web::test]
    async fn test_deposit_then_withdraw_scenario() {
        let data = service_data();
        let app = test_app!(data);
        let id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(id, "deposit", "100.00"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(id, "Withdraw", "30.00"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["balance"], "70.00");
        assert_eq!(body["operationStatus"], "SUCCESS");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/wallets/{}", id))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["walletId"], id.to_string());
        assert_eq!(body["balance"], "70.00");
    }

    #[actix_web::test]
    async fn test_insufficient_balance_scenario() {
        let data = service_data();
        let app = test_app!(data);
        let id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(id, "DEPOSIT", "20.00"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(id, "WITHDRAW", "50.00"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["balance"], "20.00");
        assert_eq!(body["operationStatus"], "INSUFFICIENT_BALANCE");
        assert_eq!(body["error"], "not_enough_money");
    }

    #[actix_web::test]
    async fn test_zero_deposit_never_creates_wallet() {
        let data = service_data();
        let app = test_app!(data);
        let id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(id, "DEPOSIT", "0.00"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/wallets/{}", id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_unknown_wallet_is_not_found() {
        let data = service_data();
        let app = test_app!(data);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/wallets/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/v1/wallets/not-a-uuid")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_bad_requests_are_plain_text() {
        let data = service_data();
        let app = test_app!(data);
        let id = Uuid::new_v4();

        let cases = vec![
            (
                test::TestRequest::post()
                    .uri("/api/v1/wallets")
                    .insert_header(("content-type", "application/json"))
                    .set_payload("{not json")
                    .to_request(),
                "invalid json\n",
            ),
            (
                test::TestRequest::post()
                    .uri("/api/v1/wallets")
                    .set_json(json!({"walletId": "123", "operationType": "DEPOSIT", "amount": "1"}))
                    .to_request(),
                "invalid walletId\n",
            ),
            (
                test::TestRequest::post()
                    .uri("/api/v1/wallets")
                    .set_json(operation(id, "DEPOSIT", "lots"))
                    .to_request(),
                "invalid amount\n",
            ),
            (
                test::TestRequest::post()
                    .uri("/api/v1/wallets")
                    .set_json(operation(id, "TRANSFER", "1.00"))
                    .to_request(),
                "invalid operation type\n",
            ),
        ];

        for (req, expected) in cases {
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            let body = to_bytes(resp.into_body()).await.unwrap();
            assert_eq!(body, expected);
        }
    }

    #[actix_web::test]
    async fn test_store_failure_is_internal_error() {
        let store = InMemoryWalletStore::new();
        let data = web::Data::new(Arc::new(WalletService::new(Arc::new(store.clone()))));
        let app = test_app!(data);

        store.set_fail_commits(true);
        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(Uuid::new_v4(), "DEPOSIT", "5.00"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_health_and_metrics() {
        let data = service_data();
        let app = test_app!(data);

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "memory");

        let req = test::TestRequest::post()
            .uri("/api/v1/wallets")
            .set_json(operation(Uuid::new_v4(), "DEPOSIT", "1.00"))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("wallet_operations_total"));
    }
}
