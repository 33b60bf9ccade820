// User-maintained cheque flags (`House Complete`, `Shifted`, `Design`),
// persisted to a small CSV keyed by `(sanction_no, tranch_no)`.
//
// The file is read when a cheque list is processed and overwritten
// wholesale on save. There is no locking: the last save wins.

use crate::error::{ReconError, Result};
use crate::normalize::{clean_colname, normalize_key};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    #[serde(rename = "House Complete", default)]
    pub house_complete: String,
    #[serde(rename = "Shifted", default)]
    pub shifted: String,
    #[serde(rename = "Design", default)]
    pub design: String,
}

impl Flags {
    /// Field-wise first-non-blank: values already in `self` win, blanks
    /// are filled from `fallback`.
    pub fn or(self, fallback: &Flags) -> Flags {
        fn pick(primary: String, fallback: &str) -> String {
            if primary.trim().is_empty() {
                fallback.to_string()
            } else {
                primary
            }
        }
        Flags {
            house_complete: pick(self.house_complete, &fallback.house_complete),
            shifted: pick(self.shifted, &fallback.shifted),
            design: pick(self.design, &fallback.design),
        }
    }
}

/// One editable flag column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagField {
    HouseComplete,
    Shifted,
    Design,
}

impl FromStr for FlagField {
    type Err = ReconError;

    /// Accepts the column header in any spacing or case, e.g. `house_complete`.
    fn from_str(s: &str) -> Result<Self> {
        match clean_colname(s).as_str() {
            "housecomplete" => Ok(FlagField::HouseComplete),
            "shifted" => Ok(FlagField::Shifted),
            "design" => Ok(FlagField::Design),
            _ => Err(ReconError::InvalidConfig(format!("unknown flag column '{}'", s))),
        }
    }
}

impl Flags {
    pub fn with(mut self, field: FlagField, value: &str) -> Flags {
        let value = value.trim().to_string();
        match field {
            FlagField::HouseComplete => self.house_complete = value,
            FlagField::Shifted => self.shifted = value,
            FlagField::Design => self.design = value,
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FlagRecord {
    sanction_no: String,
    tranch_no: String,
    #[serde(rename = "House Complete", default)]
    house_complete: String,
    #[serde(rename = "Shifted", default)]
    shifted: String,
    #[serde(rename = "Design", default)]
    design: String,
}

pub type FlagKey = (String, i64);

pub fn flag_key(sanction_no: &str, tranch_no: i64) -> FlagKey {
    (normalize_key(sanction_no), tranch_no)
}

#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    // sanction number as written, kept for saving
    entries: Vec<(String, i64, Flags)>,
    index: HashMap<FlagKey, usize>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the store, or an empty one if the file does not exist yet.
    pub fn load(path: &Path) -> Result<FlagStore> {
        if !path.exists() {
            debug!(path = %path.display(), "no saved flags");
            return Ok(FlagStore::new());
        }
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|source| ReconError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let mut store = FlagStore::new();
        for rec in rdr.deserialize::<FlagRecord>() {
            let rec = rec?;
            match crate::util::parse_i64_safe(Some(&rec.tranch_no)) {
                Some(t) => store.set(
                    &rec.sanction_no,
                    t,
                    Flags {
                        house_complete: rec.house_complete,
                        shifted: rec.shifted,
                        design: rec.design,
                    },
                ),
                None => debug!(
                    sanction_no = rec.sanction_no.as_str(),
                    tranch_no = rec.tranch_no.as_str(),
                    "skipping saved flag with unreadable tranche number"
                ),
            }
        }
        info!(path = %path.display(), entries = store.len(), "loaded saved flags");
        Ok(store)
    }

    /// Overwrite `path` with every entry.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;
        for (sanction_no, tranch_no, flags) in &self.entries {
            wtr.serialize(FlagRecord {
                sanction_no: sanction_no.clone(),
                tranch_no: tranch_no.to_string(),
                house_complete: flags.house_complete.clone(),
                shifted: flags.shifted.clone(),
                design: flags.design.clone(),
            })?;
        }
        wtr.flush()?;
        info!(path = %path.display(), entries = self.len(), "saved flags");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, sanction_no: &str, tranch_no: i64) -> Option<&Flags> {
        self.index_of(sanction_no, tranch_no)
            .map(|i| &self.entries[i].2)
    }

    /// Insert or replace the flags of one tranche.
    pub fn set(&mut self, sanction_no: &str, tranch_no: i64, flags: Flags) {
        match self.index_of(sanction_no, tranch_no) {
            Some(i) => self.entries[i].2 = flags,
            None => {
                self.index
                    .insert(flag_key(sanction_no, tranch_no), self.entries.len());
                self.entries
                    .push((sanction_no.trim().to_string(), tranch_no, flags));
            }
        }
    }

    fn index_of(&self, sanction_no: &str, tranch_no: i64) -> Option<usize> {
        self.index.get(&flag_key(sanction_no, tranch_no)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(h: &str, s: &str, d: &str) -> Flags {
        Flags {
            house_complete: h.into(),
            shifted: s.into(),
            design: d.into(),
        }
    }

    #[test]
    fn saved_values_win_over_blank_uploads() {
        let saved = flags("Yes", "", "A");
        let uploaded = flags("", "No", "B");
        assert_eq!(saved.or(&uploaded), flags("Yes", "No", "A"));
    }

    #[test]
    fn lookup_ignores_key_spacing_and_case() {
        let mut store = FlagStore::new();
        store.set(" s-1 ", 1, flags("Yes", "", ""));
        assert_eq!(store.get("S-1", 1).unwrap().house_complete, "Yes");
        assert!(store.get("S-1", 2).is_none());
        store.set("S-1", 1, flags("No", "", ""));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("s-1", 1).unwrap().house_complete, "No");
    }

    #[test]
    fn save_then_load_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cheque_flags.csv");
        let mut store = FlagStore::new();
        store.set("S1", 1, flags("Yes", "No", ""));
        store.set("S2", 2, flags("", "Yes", "Done"));
        store.save(&path).unwrap();
        let loaded = FlagStore::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("S2", 2).unwrap().design, "Done");
    }

    #[test]
    fn flag_columns_parse_loosely() {
        assert_eq!("House Complete".parse::<FlagField>().unwrap(), FlagField::HouseComplete);
        assert_eq!("shifted".parse::<FlagField>().unwrap(), FlagField::Shifted);
        assert!("colour".parse::<FlagField>().is_err());
        let f = Flags::default().with(FlagField::Design, " B ");
        assert_eq!(f.design, "B");
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cheque_flags.csv");
        assert!(FlagStore::load(&path).unwrap().is_empty());
    }
}
