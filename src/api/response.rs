use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// `result_code` of a successful call. Always a JSON string; a numeric `1`
/// is not a success.
pub const SUCCESS: &str = "1";

/// `result_code` the vendor returns for an expired or unknown token.
pub const TOKEN_INVALID: &str = "E00003";

/* Envelope wrapping every response */
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub result_code: Value,
    pub result_msg: Option<String>,
    #[serde(default)]
    pub result_data: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.result_code.as_str() == Some(SUCCESS)
    }

    pub fn is_token_invalid(&self) -> bool {
        self.result_code.as_str() == Some(TOKEN_INVALID)
    }

    /// Vendor message with its result code, for error reporting.
    pub fn describe(&self) -> String {
        let code = match &self.result_code {
            Value::String(s) => s.clone(),
            Value::Null => String::from("(none)"),
            other => other.to_string(),
        };
        format!(
            "{}: {}",
            code,
            self.result_msg
                .as_deref()
                .unwrap_or("(no error message received)")
        )
    }
}

/* /openapi/login */
#[derive(Debug, Deserialize)]
pub struct Login {
    pub token: Option<String>,
}

/* /openapi/getDeviceRealTimeData */
pub mod device_real_time_data {
    use super::*;

    #[derive(Debug, Deserialize)]
    pub struct DevicePointEntry {
        #[serde(default)]
        pub device_point: Option<HashMap<String, Value>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct DeviceRealTimeData {
        #[serde(default)]
        pub device_point_list: Option<Vec<DevicePointEntry>>,
    }

    impl DeviceRealTimeData {
        /// Point map of the first device that reported one.
        pub fn into_first_device(self) -> Option<HashMap<String, Value>> {
            self.device_point_list?
                .into_iter()
                .find_map(|entry| entry.device_point)
        }
    }
}

#[cfg(test)]
mod test {
    use super::device_real_time_data::DeviceRealTimeData;
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn read_resource(filename: &str) -> String {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push(format!("resources/test/{}", filename));
        fs::read_to_string(d.as_path()).unwrap()
    }

    #[test]
    fn login() {
        let envelope: Envelope = serde_json::from_str(&read_resource("login.json")).unwrap();
        assert!(envelope.is_success());
        let login: Login = serde_json::from_value(envelope.result_data).unwrap();
        assert_eq!(
            Some("742314_8c8e4ad8a2b34f37b4f3c2c6bdbd6f0d"),
            login.token.as_deref()
        );
    }

    #[test]
    fn login_failed() {
        let envelope: Envelope =
            serde_json::from_str(&read_resource("login_failed.json")).unwrap();
        assert!(!envelope.is_success());
        assert_eq!("E911: er_invalid_appkey", envelope.describe());
        assert!(envelope.result_data.is_null());
    }

    #[test]
    fn numeric_result_code_is_not_success() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"result_code": 1, "result_data": {}}"#).unwrap();
        assert!(!envelope.is_success());
        assert_eq!("1: (no error message received)", envelope.describe());
    }

    #[test]
    fn token_invalid() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"result_code": "E00003", "result_msg": "er_token_login_invalid"}"#,
        )
        .unwrap();
        assert!(envelope.is_token_invalid());
        assert!(!envelope.is_success());
    }

    #[test]
    fn power_station_detail() {
        let envelope: Envelope =
            serde_json::from_str(&read_resource("getPowerStationDetail.json")).unwrap();
        let details = crate::normalize::to_station_details(&envelope.result_data);
        assert_eq!("Hauptstrasse 1, 10115 Berlin", details.address);
        assert!((details.peak_power_kw - 14.05).abs() < 1e-9);
    }

    #[test]
    fn device_real_time_data() {
        let envelope: Envelope =
            serde_json::from_str(&read_resource("getDeviceRealTimeData.json")).unwrap();
        let data: DeviceRealTimeData = serde_json::from_value(envelope.result_data).unwrap();
        let points = data.into_first_device().unwrap();
        assert_eq!(Some(&Value::from("0.85")), points.get("p13141"));
        assert_eq!(Some(&Value::from("1234567_14_1_1")), points.get("ps_key"));
    }

    #[test]
    fn device_real_time_data_without_point_list() {
        let envelope: Envelope =
            serde_json::from_str(&read_resource("getDeviceRealTimeData_empty.json")).unwrap();
        let data: DeviceRealTimeData = serde_json::from_value(envelope.result_data).unwrap();
        assert!(data.into_first_device().is_none());
    }

    #[test]
    #[should_panic]
    fn invalid_json() {
        let _envelope: Envelope = serde_json::from_str(&read_resource("invalid_json.json")).unwrap();
    }
}
