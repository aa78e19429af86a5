use crate::api::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

const API_URL: &str = "https://gateway.isolarcloud.eu";
const CONFIG_FILE: &str = "isolarcloud";
const ENV_PREFIX: &str = "ISC";

/// Device type of a plant-level virtual device, used for the overview totals.
pub const PLANT_DEVICE_TYPE: u32 = 11;

/// Point ids of every metric this crate reads, sent to the vendor as-is and
/// looked up in responses under their `p<id>` keys.
///
/// These codes differ between vendor API revisions, so they live here as
/// configuration rather than in the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PointMap {
    pub battery_level: String,
    pub battery_charging_power: String,
    pub battery_discharging_power: String,
    pub battery_status: Option<String>,
    pub load_power: String,
    pub pv_power: String,
    pub feed_in_power: String,
    pub purchased_power: String,
    pub daily_production: String,
    pub daily_consumption: String,
    pub daily_feed_in: String,
    pub daily_purchased: String,
    pub daily_self_consumption: String,
    pub overview_day: String,
    pub overview_month: String,
    pub overview_year: String,
}

impl Default for PointMap {
    fn default() -> Self {
        PointMap {
            battery_level: "13141".into(),
            battery_charging_power: "13126".into(),
            battery_discharging_power: "13150".into(),
            battery_status: None,
            load_power: "13119".into(),
            pv_power: "13003".into(),
            feed_in_power: "13121".into(),
            purchased_power: "13149".into(),
            daily_production: "13112".into(),
            daily_consumption: "13199".into(),
            daily_feed_in: "13122".into(),
            daily_purchased: "13147".into(),
            daily_self_consumption: "13116".into(),
            overview_day: "83022".into(),
            overview_month: "83032".into(),
            overview_year: "83033".into(),
        }
    }
}

impl PointMap {
    pub fn power_flow_ids(&self) -> Vec<String> {
        let mut ids = vec![
            self.battery_level.clone(),
            self.battery_charging_power.clone(),
            self.battery_discharging_power.clone(),
            self.load_power.clone(),
            self.pv_power.clone(),
            self.feed_in_power.clone(),
            self.purchased_power.clone(),
        ];
        ids.extend(self.battery_status.iter().cloned());
        ids
    }

    pub fn day_energy_ids(&self) -> Vec<String> {
        vec![
            self.daily_production.clone(),
            self.daily_consumption.clone(),
            self.daily_feed_in.clone(),
            self.daily_purchased.clone(),
            self.daily_self_consumption.clone(),
        ]
    }

    pub fn overview_ids(&self) -> Vec<String> {
        vec![
            self.overview_day.clone(),
            self.overview_month.clone(),
            self.overview_year.clone(),
        ]
    }

    /// Every device-level point, deduplicated, for diagnostic dumps.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids = self.power_flow_ids();
        for id in self.day_energy_ids() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

fn secret<'de, D: Deserializer<'de>>(d: D) -> Result<SecretString, D::Error> {
    String::deserialize(d).map(SecretString::from)
}

fn default_api_url() -> String {
    API_URL.to_string()
}

fn default_lang() -> String {
    "_en_US".to_string()
}

fn default_sys_code() -> String {
    "901".to_string()
}

fn default_device_type() -> u32 {
    14
}

fn default_login_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    20
}

fn default_interval() -> u64 {
    60
}

/// Account, endpoint and polling configuration. `Debug` never prints the
/// secret key or the password.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub app_key: String,
    #[serde(deserialize_with = "secret")]
    pub secret_key: SecretString,
    pub username: String,
    #[serde(deserialize_with = "secret")]
    pub password: SecretString,
    #[serde(default)]
    pub plant_id: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    /// Device key (`ps_key`) of the device whose real-time points are read.
    #[serde(default)]
    pub device_key: Option<String>,
    #[serde(default = "default_device_type")]
    pub device_type: u32,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_sys_code")]
    pub sys_code: String,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Minimum seconds between two metric refreshes of the host binary.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub points: PointMap,
}

impl Settings {
    /// Build settings from an optional `isolarcloud.{toml,json,yaml}` file
    /// overlaid with `ISC_*` environment variables (`ISC_POINTS__PV_POWER`
    /// for nested keys).
    pub fn load() -> Result<Settings, Error> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("api_url", self.api_url.as_str()),
            ("app_key", self.app_key.as_str()),
            ("secret_key", self.secret_key.expose_secret()),
            ("username", self.username.as_str()),
            ("password", self.password.expose_secret()),
        ];

        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::ConfigError(format!("missing `{}`", name)));
        }

        if self.plant_id.is_none() && self.serial_number.is_none() {
            return Err(Error::ConfigError(String::from(
                "either `plant_id` or `serial_number` is required",
            )));
        }

        Ok(())
    }

    /// True when `other` logs into the same account on the same endpoint, so
    /// an existing session token stays valid.
    pub fn same_account(&self, other: &Settings) -> bool {
        self.api_url == other.api_url
            && self.app_key == other.app_key
            && self.username == other.username
            && self.secret_key.expose_secret() == other.secret_key.expose_secret()
            && self.password.expose_secret() == other.password.expose_secret()
    }

    pub fn serial_number(&self) -> Result<&str, Error> {
        self.serial_number
            .as_deref()
            .ok_or_else(|| Error::ConfigError(String::from("`serial_number` is not set")))
    }

    pub fn device_key(&self) -> Result<&str, Error> {
        self.device_key
            .as_deref()
            .ok_or_else(|| Error::ConfigError(String::from("`device_key` is not set")))
    }

    pub fn plant_id(&self) -> Result<&str, Error> {
        self.plant_id
            .as_deref()
            .ok_or_else(|| Error::ConfigError(String::from("`plant_id` is not set")))
    }
}
