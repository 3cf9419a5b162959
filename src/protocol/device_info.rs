//! Device info tokens sent with `Get-Cookie`.
//!
//! A token is a `:`-separated list of segments, each a two-letter tag
//! followed by hex-encoded bytes, e.g. `PN50616C6D:PL3030`.

use std::collections::BTreeMap;
use std::fmt;

use crate::protocol::error::{ProtocolResult, ServerError};

/// Recognized segment tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceTag {
    /// Platform (mandatory).
    Platform,
    /// Phone number.
    PhoneNumber,
    /// Serial number.
    SerialNumber,
    /// HotSync name.
    HotSyncName,
    /// OEM company id.
    OemCompany,
    /// OEM device id.
    OemDevice,
    /// HotSync serial.
    HotSyncSerial,
    /// IMEI.
    Imei,
}

impl DeviceTag {
    fn from_code(code: &str) -> Option<Self> {
        let tag = match code {
            "PL" => DeviceTag::Platform,
            "PN" => DeviceTag::PhoneNumber,
            "SN" => DeviceTag::SerialNumber,
            "HN" => DeviceTag::HotSyncName,
            "OC" => DeviceTag::OemCompany,
            "OD" => DeviceTag::OemDevice,
            "HS" => DeviceTag::HotSyncSerial,
            "IM" => DeviceTag::Imei,
            _ => return None,
        };
        Some(tag)
    }

    /// Tags that identify one physical device.
    fn is_unique(self) -> bool {
        matches!(
            self,
            DeviceTag::PhoneNumber | DeviceTag::SerialNumber | DeviceTag::HotSyncName | DeviceTag::Imei
        )
    }
}

/// A validated device info token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    token: String,
    segments: BTreeMap<DeviceTag, Vec<u8>>,
}

impl DeviceInfo {
    /// Validate a token. Any syntax error, unknown or repeated tag, or a
    /// missing platform segment makes the device unsupported.
    pub fn parse(token: &str) -> ProtocolResult<Self> {
        let mut segments = BTreeMap::new();

        for segment in token.split(':') {
            if segment.len() < 2 || !segment.is_char_boundary(2) {
                return Err(ServerError::UnsupportedDevice);
            }
            let (code, hex) = segment.split_at(2);
            let tag = DeviceTag::from_code(code).ok_or(ServerError::UnsupportedDevice)?;
            let bytes = decode_hex(hex).ok_or(ServerError::UnsupportedDevice)?;
            if segments.insert(tag, bytes).is_some() {
                return Err(ServerError::UnsupportedDevice);
            }
        }

        if !segments.contains_key(&DeviceTag::Platform) {
            return Err(ServerError::UnsupportedDevice);
        }

        Ok(Self {
            token: token.to_owned(),
            segments,
        })
    }

    /// True when the token names a specific device, so a repeated
    /// `Get-Cookie` with it means a reinstall rather than a new device.
    pub fn is_unique_identifying(&self) -> bool {
        self.segments.keys().any(|tag| tag.is_unique())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn segment(&self, tag: DeviceTag) -> Option<&[u8]> {
        self.segments.get(&tag).map(Vec::as_slice)
    }

    /// HotSync user name, if the token carries one.
    pub fn hotsync_name(&self) -> Option<String> {
        self.segment(DeviceTag::HotSyncName)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
