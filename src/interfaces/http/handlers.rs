use super::IDEMPOTENCY_KEY_HEADER;
use super::dto::{
    AmountRequest, BalanceResponse, CredentialsRequest, CustomerQuery, ErrorBody, LoginResponse,
    MessageResponse, MutationResponse, RegisterResponse, TransactionsResponse,
};
use crate::error::ErrorKind;
use crate::gateway::{Gateway, GatewayError};
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Validation | ErrorKind::Domain => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::DuplicateRequest => StatusCode::CONFLICT,
            ErrorKind::Overload => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::TransientInfra => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if kind == ErrorKind::TransientInfra {
            error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
            kind: kind.as_str(),
            code: self.code(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after() {
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    header_value(headers, header::AUTHORIZATION.as_str())
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    body.map(|Json(body)| body)
        .map_err(|rejection| GatewayError::Validation(rejection.body_text()))
}

fn query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, GatewayError> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| GatewayError::Validation(rejection.body_text()))
}

/// Credential checks come before input validation: an unauthenticated
/// request is rejected as such even when its input is also malformed.
async fn authenticated_input<T>(
    gateway: &Gateway,
    headers: &HeaderMap,
    input: Result<T, GatewayError>,
) -> Result<T, GatewayError> {
    if input.is_err() {
        gateway.authenticate(authorization(headers)).await?;
    }
    input
}

pub async fn register(
    State(gateway): State<Gateway>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, GatewayError> {
    let req = json_body(body)?;
    let customer_id = gateway.register(&req.username, &req.password).await?;
    Ok(Json(RegisterResponse {
        message: "registration successful",
        customer_id,
    }))
}

pub async fn login(
    State(gateway): State<Gateway>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, GatewayError> {
    let req = json_body(body)?;
    let token = gateway.login(&req.username, &req.password).await?;
    Ok(Json(LoginResponse {
        token,
        message: "login successful",
    }))
}

pub async fn logout(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, GatewayError> {
    gateway.logout(authorization(&headers)).await?;
    Ok(Json(MessageResponse {
        message: "logout successful",
    }))
}

pub async fn deposit(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<MutationResponse>, GatewayError> {
    let req = authenticated_input(&gateway, &headers, json_body(body)).await?;
    gateway
        .deposit(
            authorization(&headers),
            header_value(&headers, IDEMPOTENCY_KEY_HEADER),
            req.customer_id,
            req.amount,
        )
        .await?;
    Ok(Json(MutationResponse {
        success: true,
        message: "deposit successful",
    }))
}

pub async fn withdraw(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<MutationResponse>, GatewayError> {
    let req = authenticated_input(&gateway, &headers, json_body(body)).await?;
    gateway
        .withdraw(
            authorization(&headers),
            header_value(&headers, IDEMPOTENCY_KEY_HEADER),
            req.customer_id,
            req.amount,
        )
        .await?;
    Ok(Json(MutationResponse {
        success: true,
        message: "withdraw successful",
    }))
}

pub async fn balance(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    params: Result<Query<CustomerQuery>, QueryRejection>,
) -> Result<Json<BalanceResponse>, GatewayError> {
    let params = authenticated_input(&gateway, &headers, query(params)).await?;
    let balance = gateway
        .balance(authorization(&headers), params.customer_id)
        .await?;
    Ok(Json(BalanceResponse::new(balance)))
}

pub async fn transactions(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    params: Result<Query<CustomerQuery>, QueryRejection>,
) -> Result<Json<TransactionsResponse>, GatewayError> {
    let params = authenticated_input(&gateway, &headers, query(params)).await?;
    let history = gateway
        .transactions(authorization(&headers), params.customer_id)
        .await?;
    Ok(Json(TransactionsResponse {
        transactions: history.into_iter().map(Into::into).collect(),
        message: "transaction history retrieved",
    }))
}

pub async fn ping() -> &'static str {
    "pong"
}
