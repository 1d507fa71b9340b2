use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ScraperConfig;
use crate::fetch::PageFetcher;
use crate::similarity::combined_similarity;
use crate::standings::SessionStats;
use crate::store::{SheetStore, NAME_COL};
use crate::types::{CellWrite, Gender, PendingWrite};
use crate::utils::{name_variants, normalize_name};
use crate::writer::{resume_time_hint, RateLimitedWriter, WriteOutcome};

/// Minimum combined similarity for an automatic school match.
pub const COACH_MATCH_THRESHOLD: f64 = 0.90;

const ALLOWED_POSITIONS: [&str; 6] = [
    "Head Coach",
    "Interim Head Coach",
    "Head Coach (second email)",
    "Head Coach, Director of Soccer",
    "Head Coach, Director of Operations",
    "Head Coach, JV Head Coach",
];

/// Schools whose change-file spelling never fuzzy-matches the sheet name.
const HARD_CODED_MATCHES: [(&str, &str); 6] = [
    ("Union Commonwealth University", "Union College - KY"),
    ("Bryan College - Tennessee", "Bryan (TN)"),
    ("Warner University", "Warner University (FL)"),
    ("Wiley College", "Wiley (TX)"),
    ("Converse College", "Converse University"),
    (
        "St. Joseph's College - Brooklyn",
        "St. Joseph’s University, New York - Brooklyn",
    ),
];

pub fn division_from_filename(path: &Path) -> Option<String> {
    let base = path.file_name()?.to_string_lossy().into_owned();
    let re = Regex::new(r"(?i)(DI{1,3}|NAIA)").unwrap();
    re.find(&base).map(|m| m.as_str().to_string())
}

/// "women" is checked before "men" since the former contains the latter.
pub fn gender_from_filename(path: &Path) -> Option<Gender> {
    let base = path.file_name()?.to_string_lossy().to_lowercase();
    if base.contains("women") {
        Some(Gender::Women)
    } else if base.contains("men") {
        Some(Gender::Men)
    } else {
        None
    }
}

/// Change exports sometimes carry five banner rows above the real header,
/// and the sixth header cell varies. Drop the banner and force the sixth
/// header to "Change", rewriting the file in place.
pub fn preprocess_change_csv(path: &Path) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open change file {}", path.display()))?;
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    if rows.is_empty() {
        return Ok(());
    }

    if rows[0].first().map(String::as_str) != Some("Conference") {
        println!("First value is not 'Conference'. Dropping first 5 rows.");
        rows = if rows.len() >= 5 { rows.split_off(5) } else { Vec::new() };
    }

    if let Some(header) = rows.first_mut() {
        while header.len() < 6 {
            header.push(String::new());
        }
        header[5] = "Change".to_string();
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to rewrite change file {}", path.display()))?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to rewrite change file {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone)]
struct ChangeRow {
    school: String,
    position: String,
    change: String,
    first_name: String,
    last_name: String,
    email: String,
}

fn read_change_rows(path: &Path) -> Result<Vec<ChangeRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open change file {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let school_idx =
        col("School").ok_or_else(|| anyhow!("Column 'School' not found in {}", path.display()))?;
    let position_idx = col("Position")
        .ok_or_else(|| anyhow!("Column 'Position' not found in {}", path.display()))?;
    let change_idx =
        col("Change").ok_or_else(|| anyhow!("Column 'Change' not found in {}", path.display()))?;
    let email_idx = col("Email address")
        .ok_or_else(|| anyhow!("Column 'Email address' not found in {}", path.display()))?;
    let first_idx = col("First name");
    let last_idx = col("Last name");

    let field = |record: &csv::StringRecord, idx: usize| -> String {
        record.get(idx).unwrap_or("").trim().to_string()
    };
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(ChangeRow {
            school: field(&record, school_idx),
            position: field(&record, position_idx),
            change: field(&record, change_idx),
            first_name: first_idx.map(|i| field(&record, i)).unwrap_or_default(),
            last_name: last_idx.map(|i| field(&record, i)).unwrap_or_default(),
            email: field(&record, email_idx),
        });
    }
    Ok(rows)
}

fn join_url(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Scan a roster page for a coach link: the name in the link text or
/// aria-label, or a URL-ish form of it in the href itself.
pub fn find_coach_profile_url_roster(
    fetcher: &dyn PageFetcher,
    base_url: &str,
    coach_name: &str,
) -> Option<String> {
    let html = match fetcher.fetch(base_url) {
        Ok(html) => html,
        Err(e) => {
            println!("Error searching for coach profile on roster page: {:#}", e);
            return None;
        }
    };
    let document = Html::parse_document(&html);
    let a_selector = Selector::parse("a[href]").unwrap();
    let name_norm = normalize_name(coach_name);
    let variants = name_variants(coach_name);

    for a in document.select(&a_selector) {
        let href = a.value().attr("href").unwrap_or("");
        let href_lower = href.to_lowercase();
        if !href_lower.contains("/roster/coaches/") {
            continue;
        }
        let text = a.text().collect::<Vec<_>>().join(" ").to_lowercase();
        let aria = a
            .value()
            .attr("aria-label")
            .unwrap_or("")
            .to_lowercase();
        if text.contains(&name_norm) || aria.contains(&name_norm) {
            return Some(join_url(base_url, href));
        }
        if variants.iter().any(|v| href_lower.contains(v.as_str())) {
            return Some(join_url(base_url, href));
        }
    }
    None
}

pub fn find_coach_profile_url_staff_directory(
    fetcher: &dyn PageFetcher,
    base_url: &str,
    coach_name: &str,
) -> Option<String> {
    let html = match fetcher.fetch(base_url) {
        Ok(html) => html,
        Err(e) => {
            println!(
                "Error searching for coach profile on staff-directory page: {:#}",
                e
            );
            return None;
        }
    };
    let document = Html::parse_document(&html);
    let a_selector = Selector::parse("a[href]").unwrap();
    let name_lower = coach_name.to_lowercase();

    for a in document.select(&a_selector) {
        let href = a.value().attr("href").unwrap_or("");
        let text = a.text().collect::<Vec<_>>().join(" ").to_lowercase();
        if text.contains(&name_lower) && href.contains("/staff-directory/") {
            return Some(join_url(base_url, href));
        }
    }
    None
}

pub fn find_coach_profile_url_general(
    fetcher: &dyn PageFetcher,
    base_url: &str,
    coach_name: &str,
) -> Option<String> {
    let html = match fetcher.fetch(base_url) {
        Ok(html) => html,
        Err(e) => {
            println!(
                "Error searching for coach profile on general coaches page: {:#}",
                e
            );
            return None;
        }
    };
    let document = Html::parse_document(&html);
    let a_selector = Selector::parse("a[href]").unwrap();
    let name_lower = coach_name.to_lowercase();
    let name_dashed = name_lower.replace(' ', "-");

    for a in document.select(&a_selector) {
        let href = a.value().attr("href").unwrap_or("");
        let text = a.text().collect::<Vec<_>>().join(" ").to_lowercase();
        if text.contains(&name_lower) || href.to_lowercase().contains(&name_dashed) {
            return Some(join_url(base_url, href));
        }
    }
    None
}

enum UrlRefresh {
    Found(String),
    /// Coaches listing page stored as a placeholder until the profile
    /// link appears on the roster.
    Fallback(String),
}

/// Derive the new coach URL from the shape of the previous one: roster
/// pattern, then staff-directory pattern, then a general coaches page.
fn refresh_coach_url(
    fetcher: &dyn PageFetcher,
    prev_url: &str,
    coach_name: &str,
) -> Option<UrlRefresh> {
    if let Some((prefix, _)) = prev_url.split_once("/roster/coaches/") {
        let roster_base = format!("{}/roster", prefix);
        return match find_coach_profile_url_roster(fetcher, &roster_base, coach_name) {
            Some(url) => Some(UrlRefresh::Found(url)),
            None => Some(UrlRefresh::Fallback(format!("{}/coaches/", roster_base))),
        };
    }
    if let Some((prefix, _)) = prev_url.split_once("/staff-directory/") {
        let staff_base = format!("{}/staff-directory", prefix);
        return find_coach_profile_url_staff_directory(fetcher, &staff_base, coach_name)
            .map(UrlRefresh::Found);
    }
    let base = match prev_url.split_once("/coaches") {
        Some((prefix, _)) => format!("{}/coaches", prefix),
        None => prev_url.to_string(),
    };
    find_coach_profile_url_general(fetcher, &base, coach_name).map(UrlRefresh::Found)
}

/// Apply one change file against the sheet: filter to head-coach rows
/// with actionable change codes, match schools, and write coach name,
/// email, and profile URL cells through the rate-limited writer.
pub fn process_change_file<S: SheetStore>(
    fetcher: &dyn PageFetcher,
    writer: &mut RateLimitedWriter<S>,
    config: &ScraperConfig,
    path: &Path,
    gender: Gender,
) -> Result<SessionStats> {
    let updates = read_change_rows(path)?;
    let rows = writer.store().read_all()?;
    let header_row = config.sheet.header_row;
    if rows.len() < header_row {
        anyhow::bail!(
            "Sheet has fewer than {} rows; header row missing",
            header_row
        );
    }
    let header = &rows[header_row - 1];
    let col = |name: &str| {
        header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };
    let name_idx = col("university_name").unwrap_or(NAME_COL);
    let (coach_name_col, coach_email_col, coach_url_col) = match gender {
        Gender::Men => ("men_coach_name", "men_coach_email", "men_coach_url"),
        Gender::Women => ("women_coach_name", "women_coach_email", "women_coach_url"),
    };
    let coach_name_idx = col(coach_name_col);
    let coach_email_idx = col(coach_email_col);
    let coach_url_idx = col(coach_url_col);

    let schools: Vec<(usize, String)> = rows
        .iter()
        .enumerate()
        .skip(header_row)
        .filter_map(|(i, row)| {
            let name = row.get(name_idx).map(|s| s.trim()).unwrap_or("");
            if name.is_empty() {
                None
            } else {
                Some((i + 1, name.to_string()))
            }
        })
        .collect();

    let mut stats = SessionStats::default();
    for update in &updates {
        if !ALLOWED_POSITIONS.contains(&update.position.as_str()) {
            continue;
        }
        if update.change.is_empty() || update.change == "#" || update.change == "c" {
            continue;
        }

        let matched_school = if let Some((_, target)) = HARD_CODED_MATCHES
            .iter()
            .find(|(from, _)| *from == update.school)
        {
            println!("Using hard-coded match for {}: {}", update.school, target);
            target.to_string()
        } else {
            let best = schools
                .iter()
                .map(|(_, name)| (name, combined_similarity(&update.school, name)))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            match best {
                Some((name, score)) if score >= COACH_MATCH_THRESHOLD => name.clone(),
                _ => {
                    println!("No good match found for {}", update.school);
                    stats.skipped += 1;
                    continue;
                }
            }
        };

        let change = update.change.to_lowercase().replace(' ', "");
        let new_name = format!("{} {}", update.first_name, update.last_name)
            .trim()
            .to_string();
        let new_email = if update.email.is_empty() {
            println!(
                "No email found for {} in changes. Skipping email update.",
                update.school
            );
            None
        } else {
            Some(update.email.clone())
        };

        let email_idx = match coach_email_idx {
            Some(idx) => idx,
            None => {
                println!("Column '{}' not found in sheet.", coach_email_col);
                continue;
            }
        };

        let matched_rows: Vec<usize> = schools
            .iter()
            .filter(|(_, name)| *name == matched_school)
            .map(|(row, _)| *row)
            .collect();

        for row in matched_rows {
            let mut message = format!(
                "Updated row {} in Universities tab for school: {} with coach: {}",
                row, matched_school, new_name
            );
            let mut writes: Vec<CellWrite> = Vec::new();
            let mut email_only = false;

            if change == "e" {
                if let Some(email) = &new_email {
                    message = format!(
                        "Updated row {} in Universities tab for coach {} with email: {}",
                        row, new_name, email
                    );
                    writes.push(CellWrite {
                        col: email_idx + 1,
                        value: email.clone(),
                    });
                    email_only = true;
                }
            } else if change.contains('j') || change.contains('x') {
                if let Some(idx) = coach_name_idx {
                    writes.push(CellWrite {
                        col: idx + 1,
                        value: new_name.clone(),
                    });
                } else {
                    println!("Column '{}' not found in sheet.", coach_name_col);
                }
                if let Some(email) = &new_email {
                    message.push_str(&format!(" and email: {}", email));
                    writes.push(CellWrite {
                        col: email_idx + 1,
                        value: email.clone(),
                    });
                }
            }

            if !email_only {
                let prev_url = coach_url_idx
                    .and_then(|idx| rows[row - 1].get(idx))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                if !prev_url.is_empty() && !new_name.is_empty() {
                    match refresh_coach_url(fetcher, &prev_url, &new_name) {
                        Some(UrlRefresh::Found(url)) => {
                            message.push_str(&format!(" and URL: {}", url));
                            if let Some(idx) = coach_url_idx {
                                writes.push(CellWrite {
                                    col: idx + 1,
                                    value: url,
                                });
                            }
                        }
                        Some(UrlRefresh::Fallback(url)) => {
                            message.push_str(&format!(
                                " and URL: {} (coach URL not updated yet)",
                                url
                            ));
                            if let Some(idx) = coach_url_idx {
                                writes.push(CellWrite {
                                    col: idx + 1,
                                    value: url,
                                });
                            }
                        }
                        None => {}
                    }
                }
            }

            if writes.is_empty() {
                println!("{}", message);
                continue;
            }
            let group = PendingWrite { row, writes };
            match writer.write_group(&group)? {
                WriteOutcome::Success => {
                    println!("{}", message);
                    stats.updated += 1;
                }
                WriteOutcome::Deferred { retry_after_secs } => {
                    println!(
                        "Write limit reached. Parked updates for row {}; slots free around {}.",
                        row,
                        resume_time_hint(retry_after_secs)
                    );
                    stats.deferred += 1;
                }
                WriteOutcome::Aborted { row, col } => {
                    println!(
                        "Failed to write row {} col {}. Aborting update for this row.",
                        row, col
                    );
                    stats.failed += 1;
                }
            }
        }
    }
    Ok(stats)
}

fn handle_change_file<S: SheetStore>(
    fetcher: &dyn PageFetcher,
    writer: &mut RateLimitedWriter<S>,
    config: &ScraperConfig,
    path: &Path,
    stats: &mut SessionStats,
) -> Result<()> {
    preprocess_change_csv(path)?;
    let gender = match gender_from_filename(path) {
        Some(gender) => gender,
        None => {
            println!(
                "Skipping {}: could not determine gender from filename.",
                path.display()
            );
            return Ok(());
        }
    };
    println!(
        "{} :",
        division_from_filename(path).as_deref().unwrap_or("None")
    );
    let file_stats = process_change_file(fetcher, writer, config, path, gender)?;
    stats.updated += file_stats.updated;
    stats.deferred += file_stats.deferred;
    stats.skipped += file_stats.skipped;
    stats.failed += file_stats.failed;
    Ok(())
}

/// Process every change CSV in a folder. A failure in one file is
/// reported and does not stop the rest.
pub fn run_coaching_updates<S: SheetStore>(
    fetcher: &dyn PageFetcher,
    writer: &mut RateLimitedWriter<S>,
    config: &ScraperConfig,
    folder: &Path,
) -> Result<SessionStats> {
    info!("Processing coaching updates from {}", folder.display());
    let mut files: Vec<PathBuf> = fs::read_dir(folder)
        .with_context(|| format!("Failed to read change folder {}", folder.display()))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "csv"))
        .collect();
    files.sort();
    println!("Found {} update files.", files.len());

    if writer.has_pending() {
        let report = writer.flush_pending()?;
        println!(
            "Flushed {} pending write group(s); {} failed, {} still pending.",
            report.flushed, report.failed, report.remaining
        );
    }

    let progress_bar = ProgressBar::new(files.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap(),
    );

    let mut stats = SessionStats::default();
    for path in &files {
        progress_bar.set_message(format!(
            "Processing {:?}",
            path.file_name().unwrap_or_default()
        ));
        if let Err(e) = handle_change_file(fetcher, writer, config, path, &mut stats) {
            eprintln!("Error processing {:?}: {:#}", path, e);
        }
        progress_bar.inc(1);
    }
    progress_bar.finish_with_message(format!(
        "Updated {} rows, {} deferred, {} skipped, {} failed",
        stats.updated, stats.deferred, stats.skipped, stats.failed
    ));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointFile;
    use crate::store::CsvSheetStore;
    use tempfile::tempdir;

    struct StaticFetcher {
        body: String,
    }

    impl PageFetcher for StaticFetcher {
        fn fetch(&self, _url: &str) -> Result<String> {
            Ok(self.body.clone())
        }
    }

    fn write_sheet(dir: &Path, prev_url: &str) -> std::path::PathBuf {
        let sheet_path = dir.join("sheet.csv");
        std::fs::write(
            &sheet_path,
            format!(
                "\
Master List,,,,,
id,university_name,men_coach_name,men_coach_email,men_coach_url,notes
1,Duke University,Old Coach,old@duke.edu,{},
2,Converse University,Old W,oldw@conv.edu,,
",
                prev_url
            ),
        )
        .unwrap();
        sheet_path
    }

    fn writer_for(
        dir: &Path,
        sheet_path: &Path,
    ) -> RateLimitedWriter<CsvSheetStore> {
        let store = CsvSheetStore::new(sheet_path);
        let checkpoint = CheckpointFile::load(dir.join("cp.json")).unwrap();
        RateLimitedWriter::new(store, checkpoint, 60)
    }

    #[test]
    fn test_division_from_filename() {
        assert_eq!(
            division_from_filename(Path::new("/tmp/Changes_DII_men.csv")).as_deref(),
            Some("DII")
        );
        assert_eq!(
            division_from_filename(Path::new("naia_women_july.csv")).as_deref(),
            Some("naia")
        );
        assert_eq!(division_from_filename(Path::new("updates.csv")), None);
    }

    #[test]
    fn test_gender_from_filename() {
        assert_eq!(
            gender_from_filename(Path::new("DII_Womens_changes.csv")),
            Some(Gender::Women)
        );
        assert_eq!(
            gender_from_filename(Path::new("DII_Mens_changes.csv")),
            Some(Gender::Men)
        );
        assert_eq!(gender_from_filename(Path::new("DII_changes.csv")), None);
    }

    #[test]
    fn test_preprocess_drops_banner_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changes.csv");
        std::fs::write(
            &path,
            "\
Export of coaching changes,,
generated July 2026,,
,,
,,
,,
Conference,School,Position,First name,Last name,Chg,Email address
ACC,Duke University,Head Coach,Jane,Doe,j,jane@duke.edu
",
        )
        .unwrap();
        preprocess_change_csv(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let first_line = contents.lines().next().unwrap();
        assert!(first_line.starts_with("Conference"));
        assert_eq!(first_line.split(',').nth(5), Some("Change"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_preprocess_keeps_conference_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("changes.csv");
        std::fs::write(
            &path,
            "Conference,School,Position,First name,Last name,X,Email address\n",
        )
        .unwrap();
        preprocess_change_csv(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents.lines().next().unwrap().split(',').nth(5),
            Some("Change")
        );
    }

    #[test]
    fn test_roster_finder_matches_href_variant() {
        let fetcher = StaticFetcher {
            body: r#"<html><body>
<a href="/sports/mens-soccer/roster/coaches/jane-doe/123">Details</a>
<a href="/other/page">Jane Doe</a>
</body></html>"#
                .to_string(),
        };
        let url = find_coach_profile_url_roster(
            &fetcher,
            "https://godukes.com/sports/mens-soccer/roster",
            "Jane Doe",
        );
        assert_eq!(
            url.as_deref(),
            Some("https://godukes.com/sports/mens-soccer/roster/coaches/jane-doe/123")
        );
    }

    #[test]
    fn test_roster_finder_matches_link_text() {
        let fetcher = StaticFetcher {
            body: r#"<a href="/sports/wsoc/roster/coaches/42">Jane Doe - Head Coach</a>"#
                .to_string(),
        };
        let url = find_coach_profile_url_roster(
            &fetcher,
            "https://example.edu/sports/wsoc/roster",
            "Jane Doe",
        );
        assert_eq!(
            url.as_deref(),
            Some("https://example.edu/sports/wsoc/roster/coaches/42")
        );
    }

    #[test]
    fn test_process_change_file_applies_name_and_email() {
        let dir = tempdir().unwrap();
        let sheet_path = write_sheet(dir.path(), "");
        let changes_path = dir.path().join("DII_men_changes.csv");
        std::fs::write(
            &changes_path,
            "\
Conference,School,Position,First name,Last name,Change,Email address
ACC,Duke University,Head Coach,Jane,Doe,j,jane@duke.edu
ACC,Duke University,Assistant Coach,Bob,Smith,j,bob@duke.edu
SAC,Converse College,Head Coach,Sue,Ray,e,sue@conv.edu
ACC,Nowhere College,Head Coach,Al,Bee,j,al@x.edu
ACC,Duke University,Head Coach,Skip,Me,#,skip@x.edu
",
        )
        .unwrap();

        let mut config = ScraperConfig::default();
        config.sheet.path = sheet_path.to_string_lossy().into_owned();
        let mut writer = writer_for(dir.path(), &sheet_path);
        let fetcher = StaticFetcher { body: String::new() };

        let stats =
            process_change_file(&fetcher, &mut writer, &config, &changes_path, Gender::Men)
                .unwrap();
        assert_eq!(stats.updated, 2);
        assert_eq!(stats.skipped, 1);

        let rows = writer.store().read_all().unwrap();
        assert_eq!(rows[2][2], "Jane Doe");
        assert_eq!(rows[2][3], "jane@duke.edu");
        // Hard-coded match, email-only change: name cell untouched.
        assert_eq!(rows[3][2], "Old W");
        assert_eq!(rows[3][3], "sue@conv.edu");
    }

    #[test]
    fn test_process_change_file_refreshes_roster_url() {
        let dir = tempdir().unwrap();
        let sheet_path = write_sheet(
            dir.path(),
            "https://godukes.com/sports/msoc/roster/coaches/old-guy/7",
        );
        let changes_path = dir.path().join("DI_men_changes.csv");
        std::fs::write(
            &changes_path,
            "\
Conference,School,Position,First name,Last name,Change,Email address
ACC,Duke University,Head Coach,Jane,Doe,j,jane@duke.edu
",
        )
        .unwrap();

        let mut config = ScraperConfig::default();
        config.sheet.path = sheet_path.to_string_lossy().into_owned();
        let mut writer = writer_for(dir.path(), &sheet_path);
        let fetcher = StaticFetcher {
            body: r#"<a href="/sports/msoc/roster/coaches/jane-doe/42">Jane Doe</a>"#.to_string(),
        };

        process_change_file(&fetcher, &mut writer, &config, &changes_path, Gender::Men).unwrap();

        let rows = writer.store().read_all().unwrap();
        assert_eq!(
            rows[2][4],
            "https://godukes.com/sports/msoc/roster/coaches/jane-doe/42"
        );
    }

    #[test]
    fn test_process_change_file_writes_fallback_url() {
        let dir = tempdir().unwrap();
        let sheet_path = write_sheet(
            dir.path(),
            "https://godukes.com/sports/msoc/roster/coaches/old-guy/7",
        );
        let changes_path = dir.path().join("DI_men_changes.csv");
        std::fs::write(
            &changes_path,
            "\
Conference,School,Position,First name,Last name,Change,Email address
ACC,Duke University,Head Coach,Jane,Doe,j,jane@duke.edu
",
        )
        .unwrap();

        let mut config = ScraperConfig::default();
        config.sheet.path = sheet_path.to_string_lossy().into_owned();
        let mut writer = writer_for(dir.path(), &sheet_path);
        // No matching anchor anywhere on the roster page.
        let fetcher = StaticFetcher {
            body: "<html><body><a href=\"/home\">Home</a></body></html>".to_string(),
        };

        process_change_file(&fetcher, &mut writer, &config, &changes_path, Gender::Men).unwrap();

        let rows = writer.store().read_all().unwrap();
        assert_eq!(rows[2][4], "https://godukes.com/sports/msoc/roster/coaches/");
    }

    #[test]
    fn test_run_coaching_updates_skips_genderless_file() {
        let dir = tempdir().unwrap();
        let sheet_path = write_sheet(dir.path(), "");
        let changes_dir = dir.path().join("changes");
        std::fs::create_dir(&changes_dir).unwrap();
        std::fs::write(
            changes_dir.join("DII_changes.csv"),
            "Conference,School,Position,First name,Last name,Change,Email address\n",
        )
        .unwrap();

        let mut config = ScraperConfig::default();
        config.sheet.path = sheet_path.to_string_lossy().into_owned();
        let mut writer = writer_for(dir.path(), &sheet_path);
        let fetcher = StaticFetcher { body: String::new() };

        let stats =
            run_coaching_updates(&fetcher, &mut writer, &config, &changes_dir).unwrap();
        assert_eq!(stats.updated, 0);
    }
}
