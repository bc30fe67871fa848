// Case-insensitive string property bag with typed accessors

use crate::errors::SettingsError;
use crate::format::{
    format_datetime, format_duration, is_zero, parse_datetime, parse_duration, ZERO_TIMESTAMP,
};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

const REDACTED_KEYS: &[&str] = &["password"];

/// String-keyed settings where keys compare case-insensitively.
///
/// The spelling used on first insert is kept for serialization. Values are
/// always strings; the typed getters convert on read and report a
/// [`SettingsError`] naming the key when the stored text does not parse.
/// An empty value reads as absent.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct SettingsBag {
    entries: BTreeMap<String, (String, String)>,
}

impl SettingsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    /// Raw value, or `None` when missing or blank
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn get_required(&self, key: &str) -> Result<&str, SettingsError> {
        self.get(key)
            .ok_or_else(|| SettingsError::MissingKey(key.to_string()))
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.get_mut(&key.to_lowercase()) {
            Some((_, existing)) => *existing = value,
            None => {
                self.entries
                    .insert(key.to_lowercase(), (key.to_string(), value));
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries
            .remove(&key.to_lowercase())
            .map(|(_, value)| value)
    }

    /// Entries in key order, with the key spelling first inserted
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Parse any `FromStr` value held under `key`
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, SettingsError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|e| SettingsError::invalid(key, raw, e.to_string())),
        }
    }

    pub fn set_value<T: fmt::Display>(&mut self, key: &str, value: &T) {
        self.set(key, value.to_string());
    }

    /// Accepts `True`/`False` in any case, plus `1`/`0` and `yes`/`no`
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(SettingsError::invalid(key, raw, "expected True or False")),
            },
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, if value { "True" } else { "False" });
    }

    /// Timestamps use `MM/dd/yyyy hh:mm:ss tt`; the zero sentinel reads as `None`
    pub fn get_datetime(&self, key: &str) -> Result<Option<NaiveDateTime>, SettingsError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_datetime(raw)
                .map(|at| Some(at).filter(|at| !is_zero(*at)))
                .ok_or_else(|| SettingsError::invalid(key, raw, "expected MM/dd/yyyy hh:mm:ss tt")),
        }
    }

    /// `None` is written as the zero sentinel
    pub fn set_datetime(&mut self, key: &str, value: Option<NaiveDateTime>) {
        match value {
            Some(at) => self.set(key, format_datetime(at)),
            None => self.set(key, ZERO_TIMESTAMP),
        }
    }

    pub fn get_duration(&self, key: &str) -> Result<Option<Duration>, SettingsError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => parse_duration(raw)
                .map(Some)
                .ok_or_else(|| SettingsError::invalid(key, raw, "expected hh:mm:ss")),
        }
    }

    pub fn set_duration(&mut self, key: &str, value: Duration) {
        self.set(key, format_duration(value));
    }

    pub fn get_uuid(&self, key: &str) -> Result<Option<Uuid>, SettingsError> {
        self.get_parsed(key)
    }

    pub fn set_uuid(&mut self, key: &str, value: Uuid) {
        self.set_value(key, &value);
    }
}

impl fmt::Debug for SettingsBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (lower, (key, value)) in &self.entries {
            if REDACTED_KEYS.contains(&lower.as_str()) {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for SettingsBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = SettingsBag::new();
        for (key, value) in iter {
            bag.set(key.as_ref(), value);
        }
        bag
    }
}

impl From<BTreeMap<String, String>> for SettingsBag {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<HashMap<String, String>> for SettingsBag {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<SettingsBag> for BTreeMap<String, String> {
    fn from(bag: SettingsBag) -> Self {
        bag.entries.into_values().collect()
    }
}
