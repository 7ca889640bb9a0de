use garage_utils::Vehicle;
use garage_utils::api::{
    AuthResponse, CatalogPage, Comment, FeedbackRequest, LogInRequest, PostCommentRequest,
    SignUpRequest, SuccessResponse, VerifyTwoFactorRequest,
};
use wasm_bindgen::prelude::*;

use crate::utils::{get_from_api, post_to_api, response_json};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Request error: {0}")]
    Request(String),
    #[error("HTTP error: {status} {body}")]
    Status { status: String, body: String },
    #[error("Response parsing error: {0}")]
    Parse(String),
    #[error("Timed out after {0} ms")]
    Timeout(u32),
}

impl From<ApiError> for JsValue {
    fn from(error: ApiError) -> Self {
        JsValue::from_str(&error.to_string())
    }
}

/// Percent-encode a path segment or query value.
pub(crate) fn encode_component(value: &str) -> String {
    js_sys::encode_uri_component(value).into()
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn fetch_catalog(page: usize, per_page: usize) -> Result<CatalogPage, JsValue> {
    let response = get_from_api(&format!("/cars?page={page}&perPage={per_page}"), None).await?;
    Ok(response_json(response).await?)
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn fetch_vehicle(slug: String) -> Result<Vehicle, JsValue> {
    let response = get_from_api(&format!("/cars/{}", encode_component(&slug)), None).await?;
    Ok(response_json(response).await?)
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn sign_up(request: SignUpRequest) -> Result<AuthResponse, JsValue> {
    let response = post_to_api("/auth/signup", &request, None)
        .await
        .inspect_err(|e| log::warn!("Sign-up failed: {e}"))?;
    Ok(response_json(response).await?)
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn log_in(request: LogInRequest) -> Result<AuthResponse, JsValue> {
    let response = post_to_api("/auth/login", &request, None)
        .await
        .inspect_err(|e| log::warn!("Log-in failed: {e}"))?;
    Ok(response_json(response).await?)
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn verify_two_factor(request: VerifyTwoFactorRequest) -> Result<AuthResponse, JsValue> {
    let response = post_to_api("/auth/2fa/verify", &request, None).await?;
    Ok(response_json(response).await?)
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn submit_feedback(
    request: FeedbackRequest,
    access_token: Option<String>,
) -> Result<SuccessResponse, JsValue> {
    let response = post_to_api("/feedback", &request, access_token.as_deref()).await?;
    Ok(response_json(response).await?)
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn list_comments(car_slug: String) -> Result<JsValue, JsValue> {
    let response = get_from_api(
        &format!("/comments?car={}", encode_component(&car_slug)),
        None,
    )
    .await?;
    let comments: Vec<Comment> = response_json(response).await?;

    serde_wasm_bindgen::to_value(&comments)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {e:?}")))
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub async fn post_comment(
    request: PostCommentRequest,
    access_token: String,
) -> Result<Comment, JsValue> {
    let response = post_to_api("/comments", &request, Some(&access_token)).await?;
    Ok(response_json(response).await?)
}
