pub mod endpoint;
pub mod error;
pub mod response;

use crate::model::{DayEnergySummary, OverviewSummary, PowerFlowSnapshot, RawPoints, StationDetails};
use crate::normalize;
use crate::session::Session;
use crate::settings::{Settings, PLANT_DEVICE_TYPE};
pub use error::Error;
use response::device_real_time_data::DeviceRealTimeData;
use response::{Envelope, Login};
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};

use std::sync::Arc;
use std::time::Duration;

const ACCESS_KEY_HEADER: &str = "x-access-key";

/// Map a transport-level failure to Error
fn map_transport_err(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::ApiError(format!("request timed out: {}", error))
    } else {
        Error::ApiError(error.to_string())
    }
}

/// Process a response of any endpoint: HTTP status first, then the vendor
/// `result_code`. Returns the `result_data` node of a successful call, which
/// may be `Null`.
fn map_response(status: http::StatusCode, body: String) -> Result<Value, Error> {
    if status == http::StatusCode::UNAUTHORIZED {
        return Err(Error::TokenExpired);
    }

    let envelope = serde_json::from_str::<Envelope>(&body);

    if !status.is_success() {
        let detail = envelope
            .map(|e| e.describe())
            .unwrap_or_else(|_| status.to_string());
        return Err(Error::ApiError(format!("HTTP {}: {}", status.as_u16(), detail)));
    }

    let envelope = envelope.map_err(|e| Error::InvalidResponse(e.to_string(), body))?;

    if envelope.is_token_invalid() {
        Err(Error::TokenExpired)
    } else if envelope.is_success() {
        Ok(envelope.result_data)
    } else {
        Err(Error::ApiError(envelope.describe()))
    }
}

/// Client for the vendor's open API, bound to one account and one session.
pub struct Client {
    http: reqwest::Client,
    settings: Settings,
    session: Arc<Session>,
}

impl Client {
    pub fn new(settings: Settings) -> Result<Self, Error> {
        let session = Arc::new(Session::new(Duration::from_secs(settings.login_timeout_secs)));
        Client::with_session(settings, session)
    }

    /// Build a client that shares an existing session, e.g. after a
    /// reconfiguration that kept the same account.
    pub fn with_session(settings: Settings, session: Arc<Session>) -> Result<Self, Error> {
        settings.validate()?;

        let http = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| Error::InternalError(e.to_string()))?;

        Ok(Client {
            http,
            settings,
            session,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Fields every request body starts with.
    fn base_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("appkey".into(), Value::from(self.settings.app_key.as_str()));
        body.insert("lang".into(), Value::from(self.settings.lang.as_str()));
        body.insert("sys_code".into(), Value::from(self.settings.sys_code.as_str()));
        body
    }

    async fn post(&self, endpoint: &endpoint::Endpoint, body: &Map<String, Value>) -> Result<Value, Error> {
        let url = format!("{}{}", self.settings.api_url.trim_end_matches('/'), endpoint);

        let response = self
            .http
            .post(url)
            .header(ACCESS_KEY_HEADER, self.settings.secret_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(map_transport_err)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::ApiError(format!("Error reading API response: {}", e)))?;

        map_response(status, text)
    }

    /// Perform the login call. Does not touch the session; use
    /// `ensure_session` to obtain a cached token.
    pub async fn login(&self) -> Result<String, Error> {
        let mut body = self.base_body();
        body.insert("user_account".into(), Value::from(self.settings.username.as_str()));
        body.insert(
            "user_password".into(),
            Value::from(self.settings.password.expose_secret()),
        );

        let data = self
            .post(endpoint::LOGIN, &body)
            .await
            .map_err(|e| match e {
                Error::TokenExpired => Error::AuthError(String::from("login unauthorized (HTTP 401)")),
                e => Error::AuthError(e.message()),
            })?;

        serde_json::from_value::<Login>(data)
            .ok()
            .and_then(|login| login.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::AuthError(String::from("no token in login response")))
    }

    pub async fn ensure_session(&self) -> Result<String, Error> {
        self.session.ensure(|| self.login()).await
    }

    async fn post_with_token(
        &self,
        endpoint: &endpoint::Endpoint,
        token: &str,
        payload: &Map<String, Value>,
    ) -> Result<Value, Error> {
        let mut body = self.base_body();
        body.insert("token".into(), Value::from(token));
        body.extend(payload.clone());

        log::trace!("endpoint: {}, payload: {:?}", endpoint, payload);

        let result = self.post(endpoint, &body).await;
        match &result {
            Err(Error::TokenExpired) => self.session.invalidate_token(token),
            Ok(data) => log::trace!("endpoint: {}, result_data: {}", endpoint, data),
            Err(_) => {}
        }
        result
    }

    /// Authenticated call. An expired token triggers one re-login and one
    /// retry of the same call; a second expiry is returned to the caller.
    async fn call(&self, endpoint: &endpoint::Endpoint, payload: Map<String, Value>) -> Result<Value, Error> {
        let token = self.ensure_session().await?;

        match self.post_with_token(endpoint, &token, &payload).await {
            Err(Error::TokenExpired) => {
                log::info!("token expired calling {}, logging in again", endpoint);
                let token = self.ensure_session().await?;
                self.post_with_token(endpoint, &token, &payload).await
            }
            result => result,
        }
    }

    pub async fn fetch_station_detail(&self, serial_number: &str) -> Result<StationDetails, Error> {
        let mut payload = Map::new();
        payload.insert("sn".into(), Value::from(serial_number));

        let data = self.call(endpoint::STATION_DETAIL, payload).await?;
        if data.is_null() {
            log::debug!("no station detail returned for {}", serial_number);
            return Err(Error::EmptyResult(format!(
                "no station detail for {}",
                serial_number
            )));
        }

        Ok(normalize::to_station_details(&data))
    }

    /// Read `point_ids` of the device identified by `device_key`.
    pub async fn fetch_realtime_points(
        &self,
        point_ids: &[String],
        device_key: &str,
        device_type: u32,
    ) -> Result<RawPoints, Error> {
        let mut payload = Map::new();
        payload.insert("point_id_list".into(), json!(point_ids));
        payload.insert("ps_key_list".into(), json!([device_key]));
        payload.insert("device_type".into(), json!(device_type));

        let data = self.call(endpoint::DEVICE_REAL_TIME_DATA, payload).await?;
        if data.is_null() {
            log::debug!("No result_data returned for device {}", device_key);
            return Err(Error::EmptyResult(format!(
                "no device points for {}",
                device_key
            )));
        }

        let points = serde_json::from_value::<DeviceRealTimeData>(data.clone())
            .map_err(|e| Error::InvalidResponse(e.to_string(), data.to_string()))?
            .into_first_device();

        match points {
            Some(points) => Ok(RawPoints::new(points)),
            None => {
                log::debug!("No device_point_list returned for device {}", device_key);
                Err(Error::EmptyResult(format!(
                    "no device points for {}",
                    device_key
                )))
            }
        }
    }

    pub async fn station_details(&self) -> Result<StationDetails, Error> {
        let serial_number = self.settings.serial_number()?;
        self.fetch_station_detail(serial_number).await
    }

    pub async fn power_flow(&self) -> Result<PowerFlowSnapshot, Error> {
        let points = &self.settings.points;
        let raw = self
            .fetch_realtime_points(
                &points.power_flow_ids(),
                self.settings.device_key()?,
                self.settings.device_type,
            )
            .await?;
        Ok(normalize::to_power_flow(&raw, points))
    }

    pub async fn day_energy(&self) -> Result<DayEnergySummary, Error> {
        let points = &self.settings.points;
        let raw = self
            .fetch_realtime_points(
                &points.day_energy_ids(),
                self.settings.device_key()?,
                self.settings.device_type,
            )
            .await?;
        Ok(normalize::to_day_energy(&raw, points))
    }

    /// Lifetime totals come from the plant-level device, keyed by plant id.
    pub async fn overview(&self) -> Result<OverviewSummary, Error> {
        let points = &self.settings.points;
        let raw = self
            .fetch_realtime_points(
                &points.overview_ids(),
                self.settings.plant_id()?,
                PLANT_DEVICE_TYPE,
            )
            .await?;
        Ok(normalize::to_overview(&raw, points))
    }

    /// Dump every configured device point, raw, for mapping diagnostics.
    pub async fn raw_points(&self) -> Result<RawPoints, Error> {
        self.fetch_realtime_points(
            &self.settings.points.device_ids(),
            self.settings.device_key()?,
            self.settings.device_type,
        )
        .await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unauthorized_status_is_token_expired() {
        let result = map_response(http::StatusCode::UNAUTHORIZED, String::new());
        assert_eq!(Err(Error::TokenExpired), result);
    }

    #[test]
    fn server_error_carries_vendor_message() {
        let body = r#"{"result_code": "E500", "result_msg": "er_internal"}"#.to_string();
        let result = map_response(http::StatusCode::INTERNAL_SERVER_ERROR, body);
        assert_eq!(Err(Error::ApiError("HTTP 500: E500: er_internal".into())), result);
    }

    #[test]
    fn vendor_failure_is_api_error() {
        let body = r#"{"result_code": "E912", "result_msg": "er_no_access"}"#.to_string();
        let result = map_response(http::StatusCode::OK, body);
        assert_eq!(Err(Error::ApiError("E912: er_no_access".into())), result);
    }

    #[test]
    fn success_returns_result_data() {
        let body = r#"{"result_code": "1", "result_data": {"a": 1}}"#.to_string();
        let result = map_response(http::StatusCode::OK, body);
        assert_eq!(Ok(serde_json::json!({"a": 1})), result);
    }

    #[test]
    fn garbage_body_is_invalid_response() {
        let result = map_response(http::StatusCode::OK, "<html>".to_string());
        assert!(matches!(result, Err(Error::InvalidResponse(_, body)) if body == "<html>"));
    }
}
