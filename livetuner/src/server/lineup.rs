use serde::Serialize;
use serde_json::{Value, json};

use crate::channel::Channel;

/// One channel of the HDHomeRun lineup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineupItem {
    pub guide_name: String,
    pub guide_number: String,
    #[serde(rename = "HD")]
    pub hd: bool,
    #[serde(rename = "URL")]
    pub url: String,
}

pub fn lineup(channels: &[Channel], base_url: &str) -> Vec<LineupItem> {
    channels
        .iter()
        .map(|channel| LineupItem {
            guide_name: channel.display_name.clone(),
            guide_number: channel.id.clone(),
            hd: true,
            url: format!("{}/getStream/{}", base_url, channel.id),
        })
        .collect()
}

/// Device description answered on `/discover.json`.
pub fn discover(base_url: &str) -> Value {
    json!({
        "FriendlyName": "Twitch Tuner",
        "Manufacturer": "livetuner",
        "ModelNumber": "HDTC-2US",
        "FirmwareName": "hdhomeruntc_atsc",
        "FirmwareVersion": "20150826",
        "TunerCount": 1,
        "DeviceID": "12345678",
        "DeviceAuth": "password",
        "BaseURL": base_url,
        "LineupURL": format!("{base_url}/lineup.json"),
    })
}

/// Scan status answered on `/lineup_status.json`. Clients expect "Cable".
pub fn lineup_status() -> Value {
    json!({
        "ScanInProgress": false,
        "ScanPossible": true,
        "Source": "Cable",
        "SourceList": ["Cable"],
        "Found": 1,
    })
}
