//! Postcode normalisation and district derivation.
//!
//! A UK postcode is an outward code (area letters, district digits, an
//! optional sub-district letter) followed by a three-character inward
//! code. The district is the area letters plus the district digits, so
//! "B14 5AB" and "EC1A 1BB" belong to districts "B14" and "EC1".

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::PostcodeError;

static OUTWARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{1,2})([0-9]{1,2})[A-Z]?$").expect("valid regex")
});

static INWARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][A-Z]{2}$").expect("valid regex"));

static DISTRICT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{1,2})([0-9]{1,2})$").expect("valid regex"));

/// A postal district code such as `B14`.
///
/// Orders naturally: by area letters, then numerically by district
/// number, so `B2 < B10 < BA1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistrictCode {
    area: String,
    number: u8,
}

impl DistrictCode {
    /// Postcode area letters (`"B"` for `B14`).
    #[must_use]
    pub fn area(&self) -> &str {
        &self.area
    }

    /// District number (`14` for `B14`).
    #[must_use]
    pub const fn number(&self) -> u8 {
        self.number
    }

    fn from_captures(area: &str, digits: &str) -> Option<Self> {
        Some(Self {
            area: area.to_string(),
            number: digits.parse().ok()?,
        })
    }
}

impl Ord for DistrictCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.area
            .cmp(&other.area)
            .then(self.number.cmp(&other.number))
    }
}

impl PartialOrd for DistrictCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DistrictCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.area, self.number)
    }
}

impl FromStr for DistrictCode {
    type Err = PostcodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        DISTRICT_RE
            .captures(&upper)
            .and_then(|caps| Self::from_captures(&caps[1], &caps[2]))
            .ok_or_else(|| PostcodeError::Parse {
                postcode: s.to_string(),
                reason: "not a district code".to_string(),
            })
    }
}

impl TryFrom<String> for DistrictCode {
    type Error = PostcodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DistrictCode> for String {
    fn from(value: DistrictCode) -> Self {
        value.to_string()
    }
}

/// A syntactically valid, normalised postcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Postcode {
    normalized: String,
    district: DistrictCode,
}

impl Postcode {
    /// Normalised form, e.g. `"B14 5AB"`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// District the postcode belongs to.
    #[must_use]
    pub const fn district(&self) -> &DistrictCode {
        &self.district
    }

    /// Consumes the postcode, returning its normalised text and district.
    #[must_use]
    pub fn into_parts(self) -> (String, DistrictCode) {
        (self.normalized, self.district)
    }
}

impl fmt::Display for Postcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized)
    }
}

impl FromStr for Postcode {
    type Err = PostcodeError;

    /// Parses a postcode regardless of case and spacing. The inward code
    /// is always the last three characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| PostcodeError::Parse {
            postcode: s.to_string(),
            reason: reason.to_string(),
        };

        let compact: String = s
            .split_whitespace()
            .collect::<String>()
            .to_ascii_uppercase();

        if !compact.is_ascii() {
            return Err(fail("non-ASCII characters"));
        }
        if !(5..=7).contains(&compact.len()) {
            return Err(fail("wrong length"));
        }

        let (outward, inward) = compact.split_at(compact.len() - 3);

        if !INWARD_RE.is_match(inward) {
            return Err(fail("malformed inward code"));
        }

        let district = OUTWARD_RE
            .captures(outward)
            .and_then(|caps| DistrictCode::from_captures(&caps[1], &caps[2]))
            .ok_or_else(|| fail("malformed outward code"))?;

        Ok(Self {
            normalized: format!("{outward} {inward}"),
            district,
        })
    }
}
