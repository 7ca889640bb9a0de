use serde::{Serialize, de::DeserializeOwned};
use wasm_bindgen::prelude::*;

use crate::api::ApiError;

pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function at least once during initialization, and then
    // we will get better error messages if our code ever panics.
    //
    // For more details see
    // https://github.com/rustwasm/console_error_panic_hook#readme
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, serde::Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub base_url: String,
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn api_config() -> ApiConfig {
    let base_url = if cfg!(feature = "local-backend") {
        "http://localhost:8080"
    } else {
        "https://garage-tracker-api.fly.dev"
    };
    ApiConfig {
        base_url: base_url.to_string(),
    }
}

fn url_for(path: &str) -> String {
    format!("{}{path}", api_config().base_url)
}

pub(crate) async fn get_from_api(
    path: &str,
    access_token: Option<&str>,
) -> Result<fetch_happen::Response, ApiError> {
    let client = fetch_happen::Client;
    let mut request = client.get(url_for(path));
    if let Some(token) = access_token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }
    request
        .send()
        .await
        .map_err(|e| ApiError::Request(format!("{e:?}")))
}

pub(crate) async fn post_to_api(
    path: &str,
    body: &impl Serialize,
    access_token: Option<&str>,
) -> Result<fetch_happen::Response, ApiError> {
    let client = fetch_happen::Client;
    // Always include an Authorization header - use "anonymous" as dummy token when not logged in
    let token = access_token.unwrap_or("anonymous");
    client
        .post(url_for(path))
        .json(body)
        .map_err(|e| ApiError::Request(format!("{e:?}")))?
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await
        .map_err(|e| ApiError::Request(format!("{e:?}")))
}

/// Read the body of a successful response, failing with the status and body otherwise.
pub(crate) async fn response_text(response: fetch_happen::Response) -> Result<String, ApiError> {
    if !response.ok() {
        let status = response.status().to_string();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status, body });
    }
    response
        .text()
        .await
        .map_err(|e| ApiError::Request(format!("{e:?}")))
}

pub(crate) async fn response_json<T: DeserializeOwned>(
    response: fetch_happen::Response,
) -> Result<T, ApiError> {
    let body = response_text(response).await?;
    serde_json::from_str(&body).map_err(|e| ApiError::Parse(format!("{e}. Body: {body}")))
}

/// Tell UI code in this tab that `topic` changed. No-op outside the browser.
pub(crate) fn notify_topic(topic: &str, detail: &str) {
    #[cfg(target_arch = "wasm32")]
    depot::web::dispatch_window_event(topic, detail);
    #[cfg(not(target_arch = "wasm32"))]
    let _ = (topic, detail);
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn sleep_ms(ms: u32) {
    let promise = js_sys::Promise::new(&mut |resolve, _| {
        let Some(window) = web_sys::window() else {
            log::error!("No window to schedule a timer on");
            return;
        };
        let timeout = i32::try_from(ms).unwrap_or(i32::MAX);
        if let Err(e) =
            window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, timeout)
        {
            log::error!("Failed to schedule timer: {e:?}");
        }
    });
    if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
        log::error!("Timer rejected: {e:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_has_no_trailing_slash() {
        let config = api_config();
        assert!(!config.base_url.ends_with('/'));
        assert_eq!(url_for("/progress"), format!("{}/progress", config.base_url));
    }
}
