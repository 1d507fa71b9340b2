use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;

use crate::config::SheetConfig;
use crate::types::{Gender, ReferenceEntity};

/// School names live in column B regardless of gender.
pub(crate) const NAME_COL: usize = 1;

/// 0-based fallbacks used when the header row does not carry the named
/// columns. They match the historical sheet layout.
const MEN_DIVISION_FALLBACK: usize = 20;
const MEN_CONFERENCE_FALLBACK: usize = 21;
const WOMEN_DIVISION_FALLBACK: usize = 43;
const WOMEN_CONFERENCE_FALLBACK: usize = 44;

/// Backing storage for the master sheet. Rows and columns are 1-based,
/// matching the spreadsheet conventions the operators work in.
pub trait SheetStore {
    /// Every row in the sheet, including title and header rows.
    fn read_all(&self) -> Result<Vec<Vec<String>>>;
    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<()>;
    fn append_row(&mut self, values: &[String]) -> Result<()>;
}

pub struct CsvSheetStore {
    path: PathBuf,
}

impl CsvSheetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_rows(&self) -> Result<Vec<Vec<String>>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open sheet {}", self.path.display()))?;
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|field| field.to_string()).collect());
        }
        Ok(rows)
    }

    fn write_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to write sheet {}", self.path.display()))?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl SheetStore for CsvSheetStore {
    fn read_all(&self) -> Result<Vec<Vec<String>>> {
        self.read_rows()
    }

    fn update_cell(&mut self, row: usize, col: usize, value: &str) -> Result<()> {
        if row == 0 || col == 0 {
            anyhow::bail!("Sheet rows and columns are 1-based");
        }
        let mut rows = self.read_rows()?;
        if row > rows.len() {
            anyhow::bail!("Row {} out of range ({} rows in sheet)", row, rows.len());
        }
        let target = &mut rows[row - 1];
        if col > target.len() {
            target.resize(col, String::new());
        }
        target[col - 1] = value.to_string();
        self.write_rows(&rows)
    }

    fn append_row(&mut self, values: &[String]) -> Result<()> {
        let mut rows = self.read_rows()?;
        rows.push(values.to_vec());
        self.write_rows(&rows)
    }
}

fn find_column(header: &[String], name: &str, fallback: usize) -> usize {
    header
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .unwrap_or(fallback)
}

/// Load the university list for one gender. Rows with an empty name cell
/// are skipped, so sheet row numbers on the returned entries are not
/// necessarily contiguous.
pub fn load_reference_entities(
    store: &dyn SheetStore,
    gender: Gender,
    config: &SheetConfig,
) -> Result<Vec<ReferenceEntity>> {
    let rows = store.read_all()?;
    if rows.len() < config.header_row {
        anyhow::bail!(
            "Sheet has no header row (expected headers on row {})",
            config.header_row
        );
    }
    let header = &rows[config.header_row - 1];
    let (conf_name, conf_fallback, div_name, div_fallback) = match gender {
        Gender::Men => (
            "men_conference",
            MEN_CONFERENCE_FALLBACK,
            "men_ncaa_division",
            MEN_DIVISION_FALLBACK,
        ),
        Gender::Women => (
            "women_conference",
            WOMEN_CONFERENCE_FALLBACK,
            "women_ncaa_division",
            WOMEN_DIVISION_FALLBACK,
        ),
    };
    let conf_col = find_column(header, conf_name, conf_fallback);
    let div_col = find_column(header, div_name, div_fallback);

    let mut entities = Vec::new();
    for (i, row) in rows.iter().enumerate().skip(config.header_row) {
        let name = row.get(NAME_COL).map(|s| s.trim()).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        entities.push(ReferenceEntity {
            row: i + 1,
            name: name.to_string(),
            conference: row
                .get(conf_col)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            division: row
                .get(div_col)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        });
    }
    Ok(entities)
}

/// Round-trip a marker value through cell A1, then restore the original.
/// Returns false when the readback does not match what was written.
pub fn validate_sheet(store: &mut dyn SheetStore) -> Result<bool> {
    println!("Validating sheet read/write access...");
    let original = store
        .read_all()?
        .first()
        .and_then(|row| row.first())
        .cloned()
        .unwrap_or_default();

    let test_value = format!("TEST-{}", Utc::now().timestamp());
    store.update_cell(1, 1, &test_value)?;
    let readback = store
        .read_all()?
        .first()
        .and_then(|row| row.first())
        .cloned()
        .unwrap_or_default();
    store.update_cell(1, 1, &original)?;

    if readback != test_value {
        println!("Validation FAILED: readback mismatch");
        return Ok(false);
    }
    println!("Validation OK");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn store_with(content: &str) -> (tempfile::TempDir, CsvSheetStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sheet.csv");
        fs::write(&path, content).unwrap();
        let store = CsvSheetStore::new(&path);
        (dir, store)
    }

    #[test]
    fn test_read_all() {
        let (_dir, store) = store_with("a,b,c\nd,e,f\n");
        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b", "c"]);
        assert_eq!(rows[1], vec!["d", "e", "f"]);
    }

    #[test]
    fn test_update_cell_persists() {
        let (_dir, mut store) = store_with("a,b\nc,d\n");
        store.update_cell(2, 1, "changed").unwrap();
        let rows = store.read_all().unwrap();
        assert_eq!(rows[1][0], "changed");
        assert_eq!(rows[0][1], "b");
    }

    #[test]
    fn test_update_cell_pads_short_row() {
        let (_dir, mut store) = store_with("a\n");
        store.update_cell(1, 4, "x").unwrap();
        let rows = store.read_all().unwrap();
        assert_eq!(rows[0], vec!["a", "", "", "x"]);
    }

    #[test]
    fn test_update_cell_row_out_of_range() {
        let (_dir, mut store) = store_with("a,b\n");
        let err = store.update_cell(5, 1, "x").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_append_row() {
        let (_dir, mut store) = store_with("a,b\n");
        store
            .append_row(&["c".to_string(), "d".to_string()])
            .unwrap();
        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["c", "d"]);
    }

    #[test]
    fn test_load_reference_entities_by_header_name() {
        // Title row, then headers on row 2, data from row 3.
        let content = "\
Master List,,,,
id,school,men_ncaa_division,men_conference,notes
1,Duke University,Division 1,ACC,
2,,Division 1,ACC,
3,Wake Forest,Division 1,ACC,
";
        let (_dir, store) = store_with(content);
        let entities =
            load_reference_entities(&store, Gender::Men, &SheetConfig::default()).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].row, 3);
        assert_eq!(entities[0].name, "Duke University");
        assert_eq!(entities[0].conference.as_deref(), Some("ACC"));
        assert_eq!(entities[0].division.as_deref(), Some("Division 1"));
        // Row 4 has an empty name and is skipped.
        assert_eq!(entities[1].row, 5);
        assert_eq!(entities[1].name, "Wake Forest");
    }

    #[test]
    fn test_load_reference_entities_fallback_columns() {
        // Headers that do not carry the named columns fall back to the
        // historical positions (0-based 20/21 for men).
        let mut header = vec![String::new(); 25];
        header[0] = "id".to_string();
        header[1] = "school".to_string();
        let mut data = vec![String::new(); 25];
        data[1] = "Elon".to_string();
        data[20] = "Division 1".to_string();
        data[21] = "CAA".to_string();

        let content = format!("title\n{}\n{}\n", header.join(","), data.join(","));
        let (_dir, store) = store_with(&content);
        let entities =
            load_reference_entities(&store, Gender::Men, &SheetConfig::default()).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].conference.as_deref(), Some("CAA"));
        assert_eq!(entities[0].division.as_deref(), Some("Division 1"));
    }

    #[test]
    fn test_validate_sheet_restores_original() {
        let (_dir, mut store) = store_with("original,b\nc,d\n");
        assert!(validate_sheet(&mut store).unwrap());
        let rows = store.read_all().unwrap();
        assert_eq!(rows[0][0], "original");
    }
}
