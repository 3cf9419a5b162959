//! Article database naming.
//!
//! # Responsibilities
//! - Recognize `ipedia_YYYYMMDD` (English) and `ipedia_<lang>_YYYYMMDD`
//! - Map language codes to the fixed set of supported languages
//!
//! # Design Decisions
//! - Dates are zero-padded, so comparing names as strings orders them by date
//! - Names for unsupported languages are not article databases as far as the
//!   server is concerned

use std::fmt;

const DB_PREFIX: &str = "ipedia_";

/// Supported article languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Lang {
    #[default]
    En,
    De,
    Fr,
}

impl Lang {
    /// All supported languages, in the order they are reported to clients.
    pub const ALL: [Lang; 3] = [Lang::En, Lang::De, Lang::Fr];

    pub fn as_str(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::De => "de",
            Lang::Fr => "fr",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.as_str() == code)
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed article database name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbName {
    name: String,
    lang: Lang,
    date: String,
}

impl DbName {
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(DB_PREFIX)?;
        let (lang, date) = match rest.split_once('_') {
            Some((code, date)) => (Lang::from_code(code)?, date),
            None => (Lang::En, rest),
        };
        if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            name: name.to_owned(),
            lang,
            date: date.to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn lang(&self) -> Lang {
        self.lang
    }

    /// Snapshot date as `YYYYMMDD`.
    pub fn date(&self) -> &str {
        &self.date
    }
}

impl fmt::Display for DbName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
