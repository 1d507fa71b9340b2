use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Output columns for conference standings: Y=25, Z=26, AA=27 (1-indexed)
pub const MEN_COL_CONFERENCE_RECORD: usize = 25;
pub const MEN_COL_OVERALL_RECORD: usize = 26;
pub const MEN_COL_CONFERENCE_STANDING: usize = 27;
// Women-specific columns: AV=48, AW=49, AX=50
pub const WOMEN_COL_CONFERENCE_RECORD: usize = 48;
pub const WOMEN_COL_OVERALL_RECORD: usize = 49;
pub const WOMEN_COL_CONFERENCE_STANDING: usize = 50;
// National ranking columns: AB=28 for men, AY=51 for women
pub const MEN_COL_RANKING: usize = 28;
pub const WOMEN_COL_RANKING: usize = 51;

/// Canonical university row loaded from the universities sheet.
/// Read-only during matching; `row` is the 1-based sheet row used for writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntity {
    pub row: usize,
    pub name: String,
    pub conference: Option<String>,
    pub division: Option<String>,
}

/// One ranked match against the reference list. Derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub row: usize,
    pub name: String,
    pub score: f64,
}

/// A single (column, value) update within a write group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellWrite {
    pub col: usize,
    pub value: String,
}

/// A write group deferred by the rate limiter, persisted in the checkpoint
/// until flushed. Writes are kept in their original order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub row: usize,
    pub writes: Vec<CellWrite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Men,
    Women,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Men => "men",
            Gender::Women => "women",
        }
    }

    /// (conference record, overall record, standing) columns for this gender.
    pub fn standings_columns(&self) -> (usize, usize, usize) {
        match self {
            Gender::Men => (
                MEN_COL_CONFERENCE_RECORD,
                MEN_COL_OVERALL_RECORD,
                MEN_COL_CONFERENCE_STANDING,
            ),
            Gender::Women => (
                WOMEN_COL_CONFERENCE_RECORD,
                WOMEN_COL_OVERALL_RECORD,
                WOMEN_COL_CONFERENCE_STANDING,
            ),
        }
    }

    pub fn ranking_column(&self) -> usize {
        match self {
            Gender::Men => MEN_COL_RANKING,
            Gender::Women => WOMEN_COL_RANKING,
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "men" => Ok(Gender::Men),
            "women" => Ok(Gender::Women),
            other => bail!("Gender must be 'men' or 'women', got '{}'", other),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Division {
    D1,
    D2,
    D3,
    Naia,
}

impl Division {
    pub fn as_str(&self) -> &'static str {
        match self {
            Division::D1 => "d1",
            Division::D2 => "d2",
            Division::D3 => "d3",
            Division::Naia => "naia",
        }
    }

    /// Division label as it appears in the sheet's division column.
    pub fn sheet_label(&self) -> &'static str {
        match self {
            Division::D1 => "Division 1",
            Division::D2 => "Division 2",
            Division::D3 => "Division 3",
            Division::Naia => "NAIA",
        }
    }

    pub fn all() -> [Division; 4] {
        [Division::D1, Division::D2, Division::D3, Division::Naia]
    }
}

impl FromStr for Division {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "d1" => Ok(Division::D1),
            "d2" => Ok(Division::D2),
            "d3" => Ok(Division::D3),
            "naia" => Ok(Division::Naia),
            other => bail!("Division must be one of d1/d2/d3/naia, got '{}'", other),
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_columns() {
        assert_eq!(Gender::Men.standings_columns(), (25, 26, 27));
        assert_eq!(Gender::Women.standings_columns(), (48, 49, 50));
        assert_eq!(Gender::Men.ranking_column(), 28);
        assert_eq!(Gender::Women.ranking_column(), 51);
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("men".parse::<Gender>().unwrap(), Gender::Men);
        assert_eq!(" Women ".parse::<Gender>().unwrap(), Gender::Women);
        assert!("boys".parse::<Gender>().is_err());
    }

    #[test]
    fn test_division_parse() {
        assert_eq!("d1".parse::<Division>().unwrap(), Division::D1);
        assert_eq!("NAIA".parse::<Division>().unwrap(), Division::Naia);
        assert_eq!(Division::D3.sheet_label(), "Division 3");
        assert!("d4".parse::<Division>().is_err());
    }
}
