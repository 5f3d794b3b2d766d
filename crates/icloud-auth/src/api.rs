//! Wire types for the setup and auth services.
//!
//! Only the fields that drive decisions are modelled; everything else in the
//! account document is ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Account snapshot returned by validate and account-login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    #[serde(default)]
    pub ds_info: DsInfo,
    #[serde(default)]
    pub hsa_challenge_required: bool,
    #[serde(default)]
    pub hsa_trusted_browser: bool,
    #[serde(default)]
    pub is_extended_login: bool,
    #[serde(default)]
    pub webservices: HashMap<String, Webservice>,
    #[serde(default)]
    pub apps: HashMap<String, AppCapabilities>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsInfo {
    #[serde(default)]
    pub hsa_version: i64,
    #[serde(default)]
    pub dsid: String,
    #[serde(default)]
    pub apple_id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub country_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Webservice {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppCapabilities {
    #[serde(default)]
    pub can_launch_with_one_factor: bool,
}

impl AccountState {
    pub fn is_trusted_session(&self) -> bool {
        self.hsa_trusted_browser
    }

    /// Second-factor (HSA2) verification is needed.
    pub fn requires_2fa(&self) -> bool {
        self.ds_info.hsa_version == 2 && (self.hsa_challenge_required || !self.is_trusted_session())
    }

    /// Second-step verification is needed (any HSA version).
    pub fn requires_2sa(&self) -> bool {
        self.ds_info.hsa_version >= 1 && (self.hsa_challenge_required || !self.is_trusted_session())
    }

    /// Base URL of a web service. `drive`, `drivews` and `DriveWS` all name the same one.
    pub fn webservice_url(&self, service: &str) -> Option<&str> {
        let name = service.to_ascii_lowercase();
        let short = name.strip_suffix("ws").unwrap_or(&name);
        [name.clone(), short.to_string(), format!("{}ws", short)]
            .iter()
            .find_map(|key| self.webservices.get(key))
            .map(|ws| ws.url.as_str())
            .filter(|url| !url.is_empty())
    }

    /// Whether the named app can be entered with credentials alone.
    pub fn allows_one_factor(&self, app: &str) -> bool {
        self.apps
            .get(&app.to_ascii_lowercase())
            .map(|caps| caps.can_launch_with_one_factor)
            .unwrap_or(false)
    }

    /// Names of services that have a URL, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .webservices
            .iter()
            .filter(|(_, ws)| !ws.url.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// A second-step verification target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub area_code: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}

/// Fields that carry an error reason, highest priority first.
const REASON_FIELDS: &[&str] = &["errorMessage", "reason", "errorReason", "error"];
/// Fields that carry an error code, highest priority first.
const CODE_FIELDS: &[&str] = &["errorCode", "serverErrorCode"];

/// Extract `(code, reason)` from a JSON body that reports an application error.
pub(crate) fn decode_error_fields(body: &[u8]) -> Option<(i64, String)> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let obj = value.as_object()?;

    let reason = REASON_FIELDS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())?;

    let code = CODE_FIELDS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_i64))
        .find(|c| *c != 0)
        .unwrap_or(0);

    Some((code, reason.to_string()))
}
