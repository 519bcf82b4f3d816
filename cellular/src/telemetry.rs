//! Typed views over the loosely-typed telemetry maps the daemon returns.
//!
//! Decoding is tolerant by design: a field the daemon did not report, or
//! reported in a shape we cannot parse (e.g. a malformed hex identifier),
//! is simply absent from the resulting record. Only structural problems
//! are errors, the main one being a radio technology without a typed
//! representation.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;
use zbus::zvariant::OwnedValue;

use crate::attrs::AttrBag;
use crate::error::{Error, Result};

/// A raw attribute map as delivered by the daemon (`a{sv}`).
pub type RawValueMap = HashMap<String, OwnedValue>;

// MMModemAccessTechnology bit values.
const ACCESS_TECH_GSM: u32 = 1 << 1;
const ACCESS_TECH_GSM_COMPACT: u32 = 1 << 2;
const ACCESS_TECH_GPRS: u32 = 1 << 3;
const ACCESS_TECH_EDGE: u32 = 1 << 4;
const ACCESS_TECH_UMTS: u32 = 1 << 5;
const ACCESS_TECH_HSDPA: u32 = 1 << 6;
const ACCESS_TECH_HSUPA: u32 = 1 << 7;
const ACCESS_TECH_HSPA: u32 = 1 << 8;
const ACCESS_TECH_HSPA_PLUS: u32 = 1 << 9;
const ACCESS_TECH_LTE: u32 = 1 << 14;
const ACCESS_TECH_5GNR: u32 = 1 << 15;

// MMCellType values used in GetCellInfo responses.
const CELL_TYPE_LTE: u32 = 5;
const CELL_TYPE_5GNR: u32 = 6;

/// Coarse radio access technology.
///
/// Bit-flag valued so that sets of technologies can be expressed as masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Technology {
    Unknown = 0,
    /// 2G (GSM, GPRS, EDGE)
    Gsm = 1 << 0,
    /// 3G (UMTS, HSPA)
    Umts = 1 << 1,
    /// 4G (LTE, LTE-A)
    Lte = 1 << 2,
    /// 5G (NR)
    Nr5g = 1 << 3,
}

impl Technology {
    /// Buckets a raw `MMModemAccessTechnology` code. Several raw codes map
    /// to the same coarse bucket (all the HSPA variants are 3G, etc.);
    /// unmapped codes come out as [`Technology::Unknown`].
    pub fn from_access_technology(code: u32) -> Self {
        match code {
            ACCESS_TECH_GSM | ACCESS_TECH_GSM_COMPACT | ACCESS_TECH_GPRS
            | ACCESS_TECH_EDGE => Self::Gsm,
            ACCESS_TECH_UMTS | ACCESS_TECH_HSDPA | ACCESS_TECH_HSUPA
            | ACCESS_TECH_HSPA | ACCESS_TECH_HSPA_PLUS => Self::Umts,
            ACCESS_TECH_LTE => Self::Lte,
            ACCESS_TECH_5GNR => Self::Nr5g,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gsm => "GSM",
            Self::Umts => "UMTS",
            Self::Lte => "LTE",
            Self::Nr5g => "NR5G",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Splits a PLMN id into MCC (always the first 3 characters) and MNC
/// (the remaining 2 or 3).
pub fn split_plmn(plmn: &str) -> (String, String) {
    match plmn.split_at_checked(3) {
        Some((mcc, mnc)) => (mcc.to_owned(), mnc.to_owned()),
        None => (plmn.to_owned(), String::new()),
    }
}

/// Signal quality of one technology, e.g. RSRP/RSRQ/SINR for LTE.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    tech: Technology,
    attrs: AttrBag,
}

impl Signal {
    /// Decodes a raw signal map for `tech`. Keys the daemon did not report
    /// stay absent; the daemon's `snr` is stored as `sinr`.
    pub fn decode(tech: Technology, raw: &RawValueMap) -> Result<Self> {
        let mut attrs = AttrBag::new();
        match tech {
            Technology::Lte => {
                put_f64(&mut attrs, raw, "rsrp", "rsrp");
                put_f64(&mut attrs, raw, "rsrq", "rsrq");
                put_f64(&mut attrs, raw, "rssi", "rssi");
                put_f64(&mut attrs, raw, "snr", "sinr");
            }
            Technology::Nr5g => {
                put_f64(&mut attrs, raw, "rsrp", "rsrp");
                put_f64(&mut attrs, raw, "rsrq", "rsrq");
                put_f64(&mut attrs, raw, "snr", "sinr");
            }
            other => return Err(Error::UnsupportedTechnology(other)),
        }
        Ok(Self { tech, attrs })
    }

    pub fn tech(&self) -> Technology {
        self.tech
    }

    /// Reference Signal Received Power in dBm.
    pub fn rsrp(&self) -> Result<f64> {
        self.attrs.get("rsrp")
    }

    /// Reference Signal Received Quality in dB.
    pub fn rsrq(&self) -> Result<f64> {
        self.attrs.get("rsrq")
    }

    /// Received Signal Strength Indication in dBm. LTE only.
    pub fn rssi(&self) -> Result<f64> {
        self.attrs.get("rssi")
    }

    /// Signal to (interference plus) noise ratio in dB.
    pub fn sinr(&self) -> Result<f64> {
        self.attrs.get("sinr")
    }

    pub fn attrs(&self) -> &AttrBag {
        &self.attrs
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tech: Technology, attrs: AttrBag) -> Self {
        Self { tech, attrs }
    }
}

/// Identifiers locating the cell a modem is using.
///
/// NR cells share the LTE field set (MCC/MNC, CI, TAC), so both
/// technologies decode through the same path and only the tag differs.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    tech: Technology,
    attrs: AttrBag,
}

impl Location {
    /// Decodes a raw map carrying `operator-id` and hex-string `ci`/`tac`
    /// keys, as found in cell-info entries.
    pub fn decode(tech: Technology, raw: &RawValueMap) -> Result<Self> {
        if !matches!(tech, Technology::Lte | Technology::Nr5g) {
            return Err(Error::UnsupportedTechnology(tech));
        }

        let mut attrs = AttrBag::new();
        if let Some(plmn) = raw.get("operator-id").and_then(v_str) {
            let (mcc, mnc) = split_plmn(&plmn);
            attrs.insert("mcc", mcc);
            attrs.insert("mnc", mnc);
        }
        if let Some(ci) = raw.get("ci").and_then(v_str).as_deref().and_then(parse_hex) {
            attrs.insert("ci", ci);
        }
        if let Some(tac) = raw.get("tac").and_then(v_str).as_deref().and_then(parse_hex)
        {
            attrs.insert("tac", tac);
        }
        Ok(Self { tech, attrs })
    }

    /// Parses the combined `"<mcc>,<mnc>,<lac>,<ci>,<tac>"` string of the
    /// 3GPP LAC/CI location source (LAC, CI and TAC in hex). `Ok(None)`
    /// when the string does not carry all required fields.
    pub fn from_lac_ci(tech: Technology, data: &str) -> Result<Option<Self>> {
        if !matches!(tech, Technology::Lte | Technology::Nr5g) {
            return Err(Error::UnsupportedTechnology(tech));
        }

        let Some((mcc, mnc, ci, tac)) = parse_lac_ci(data) else {
            return Ok(None);
        };

        let mut attrs = AttrBag::new();
        attrs.insert("mcc", mcc);
        attrs.insert("mnc", mnc);
        attrs.insert("ci", ci);
        attrs.insert("tac", tac);
        Ok(Some(Self { tech, attrs }))
    }

    pub fn tech(&self) -> Technology {
        self.tech
    }

    /// Mobile Country Code (3 digits), e.g. "262" for Germany.
    pub fn mcc(&self) -> Result<String> {
        self.attrs.get("mcc")
    }

    /// Mobile Network Code (2..3 digits), e.g. "01".
    pub fn mnc(&self) -> Result<String> {
        self.attrs.get("mnc")
    }

    /// Cell identity.
    pub fn ci(&self) -> Result<u32> {
        self.attrs.get("ci")
    }

    /// Tracking area code (24 bits).
    pub fn tac(&self) -> Result<u32> {
        self.attrs.get("tac")
    }

    pub fn attrs(&self) -> &AttrBag {
        &self.attrs
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tech: Technology, attrs: AttrBag) -> Self {
        Self { tech, attrs }
    }
}

/// One entry of the daemon's cell list: the serving flag, channel and cell
/// identifiers, plus embedded [`Signal`] and [`Location`] sub-records
/// decoded from the same raw map. Often only partially populated.
#[derive(Debug, Clone, PartialEq)]
pub struct CellInfo {
    tech: Technology,
    attrs: AttrBag,
}

impl CellInfo {
    /// Decodes one raw cell entry. Entries whose `cell-type` has no typed
    /// representation yield `None` and are skipped by callers.
    pub fn decode(raw: &RawValueMap) -> Option<Self> {
        let cell_type = raw.get("cell-type").and_then(v_u32);
        let tech = match cell_type {
            Some(CELL_TYPE_LTE) => Technology::Lte,
            Some(CELL_TYPE_5GNR) => Technology::Nr5g,
            other => {
                debug!(cell_type = ?other, "skipping cell entry of unsupported type");
                return None;
            }
        };

        let mut attrs = AttrBag::new();
        if let Some(serving) = raw.get("serving").and_then(v_bool) {
            attrs.insert("serving", serving);
        }
        if let Some(ci) = raw.get("ci").and_then(v_str).as_deref().and_then(parse_hex) {
            attrs.insert("ci", ci);
        }
        if let Some(pci) = raw
            .get("physical-ci")
            .and_then(v_str)
            .as_deref()
            .and_then(parse_hex)
        {
            attrs.insert("pci", pci);
        }
        let channel_key = match tech {
            Technology::Lte => "earfcn",
            _ => "nrarfcn",
        };
        if let Some(channel) = raw.get(channel_key).and_then(v_u32) {
            attrs.insert(channel_key, channel);
        }

        // sub-records share the raw map and may themselves be partial
        if let Ok(signal) = Signal::decode(tech, raw) {
            attrs.insert("signal", signal);
        }
        if let Ok(location) = Location::decode(tech, raw) {
            attrs.insert("location", location);
        }

        Some(Self { tech, attrs })
    }

    pub fn tech(&self) -> Technology {
        self.tech
    }

    /// Whether this is the cell currently in use, as opposed to a
    /// neighboring one.
    pub fn serving(&self) -> bool {
        self.attrs.get_or("serving", false)
    }

    /// Cell identity; not available for non-serving cells.
    pub fn ci(&self) -> Result<u32> {
        self.attrs.get("ci")
    }

    /// Physical cell id (0..503 for LTE, 0..1007 for NR).
    pub fn pci(&self) -> Result<u32> {
        self.attrs.get("pci")
    }

    /// LTE channel number.
    pub fn earfcn(&self) -> Result<u32> {
        self.attrs.get("earfcn")
    }

    /// NR channel number.
    pub fn nrarfcn(&self) -> Result<u32> {
        self.attrs.get("nrarfcn")
    }

    pub fn signal(&self) -> Result<Signal> {
        self.attrs.get("signal")
    }

    pub fn location(&self) -> Result<Location> {
        self.attrs.get("location")
    }

    pub fn attrs(&self) -> &AttrBag {
        &self.attrs
    }
}

fn parse_lac_ci(data: &str) -> Option<(String, String, u32, u32)> {
    let mut fields = data.split(',');
    let mcc = fields.next().filter(|f| is_mcc_mnc(f))?;
    let mnc = fields.next().filter(|f| is_mcc_mnc(f))?;
    // the LAC field must scan as hex but its value is not carried over
    parse_hex(fields.next()?)?;
    let ci = parse_hex(fields.next()?)?;
    let tac = parse_hex(fields.next()?)?;
    Some((mcc.to_owned(), mnc.to_owned(), ci, tac))
}

fn is_mcc_mnc(field: &str) -> bool {
    (1..=3).contains(&field.len()) && field.bytes().all(|b| b.is_ascii_digit())
}

fn parse_hex(field: &str) -> Option<u32> {
    let field = field.trim();
    let field = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field);
    u32::from_str_radix(field, 16).ok()
}

fn put_f64(attrs: &mut AttrBag, raw: &RawValueMap, from: &str, as_key: &str) {
    if let Some(value) = raw.get(from).and_then(v_f64) {
        attrs.insert(as_key, value);
    }
}

pub(crate) fn v_str(value: &OwnedValue) -> Option<String> {
    value.downcast_ref().ok()
}

pub(crate) fn v_f64(value: &OwnedValue) -> Option<f64> {
    value.downcast_ref().ok()
}

pub(crate) fn v_u32(value: &OwnedValue) -> Option<u32> {
    value.downcast_ref().ok()
}

pub(crate) fn v_bool(value: &OwnedValue) -> Option<bool> {
    value.downcast_ref().ok()
}
