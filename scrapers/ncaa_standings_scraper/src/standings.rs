use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ScraperConfig;
use crate::fetch::PageFetcher;
use crate::matcher::{find_best_candidates, DEFAULT_TOP_N};
use crate::resolver::{resolve_interactive, Console, Resolution};
use crate::similarity::combined_similarity;
use crate::store::{load_reference_entities, SheetStore};
use crate::types::{CellWrite, Division, Gender, PendingWrite, ReferenceEntity};
use crate::utils::{clean_cell_text, parse_record};
use crate::writer::{resume_time_hint, RateLimitedWriter, WriteOutcome};

/// Minimum fuzzy score for resolving an operator-typed start conference
/// against the scraped conference list.
const START_CONFERENCE_MATCH_THRESHOLD: f64 = 0.65;

pub fn standings_url(division: Division, gender: Gender) -> Option<&'static str> {
    match (division, gender) {
        (Division::D1, Gender::Men) => Some(
            "https://www.topdrawersoccer.com/college-soccer/college-soccer-conference-standings/men",
        ),
        (Division::D1, Gender::Women) => Some(
            "https://www.topdrawersoccer.com/college-soccer/college-soccer-conference-standings/women",
        ),
        _ => None,
    }
}

/// One parsed standings table row: position, school, conference record,
/// overall record, under a conference heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandingsRow {
    pub conference: String,
    pub standing: String,
    pub school: String,
    pub conf_record: String,
    pub overall_record: String,
}

impl StandingsRow {
    pub fn to_writes(&self, gender: Gender) -> Vec<CellWrite> {
        let (conf_col, overall_col, standing_col) = gender.standings_columns();
        vec![
            CellWrite {
                col: conf_col,
                value: self.conf_record.clone(),
            },
            CellWrite {
                col: overall_col,
                value: self.overall_record.clone(),
            },
            CellWrite {
                col: standing_col,
                value: self.standing.clone(),
            },
        ]
    }
}

fn element_text(el: ElementRef) -> String {
    clean_cell_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Conference title for a block: first non-empty h1..h4, else the first
/// anchor text.
fn block_conference_name(block: ElementRef) -> String {
    for tag in ["h1", "h2", "h3", "h4"] {
        let selector = Selector::parse(tag).unwrap();
        if let Some(heading) = block.select(&selector).next() {
            let text = element_text(heading);
            if !text.is_empty() {
                return text;
            }
        }
    }
    let a_selector = Selector::parse("a").unwrap();
    if let Some(a) = block.select(&a_selector).next() {
        let text = element_text(a);
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

/// Parse conference standings tables out of a page. Conference blocks are
/// nested divs under <main>, each holding a heading and a table whose rows
/// are [standing, school, conference record, overall record].
pub fn parse_standings(html: &str) -> Vec<StandingsRow> {
    let document = Html::parse_document(html);
    let main_selector = Selector::parse("main").unwrap();
    let block_selector = Selector::parse("div > div > div").unwrap();
    let table_selector = Selector::parse("table").unwrap();
    let tr_selector = Selector::parse("tr").unwrap();
    let td_selector = Selector::parse("td").unwrap();

    let mut results = Vec::new();
    let main = match document.select(&main_selector).next() {
        Some(main) => main,
        None => return results,
    };

    let mut blocks: Vec<ElementRef> = main.select(&block_selector).collect();
    if blocks.is_empty() {
        blocks = vec![main];
    }

    // Nested block selectors can surface the same table twice.
    let mut seen_tables = HashSet::new();
    for block in blocks {
        let conference = block_conference_name(block);
        for table in block.select(&table_selector) {
            if !seen_tables.insert(table.id()) {
                continue;
            }
            for tr in table.select(&tr_selector) {
                let cells: Vec<String> = tr.select(&td_selector).map(element_text).collect();
                if cells.len() < 2 {
                    continue;
                }
                let school = cells[1].clone();
                if school.is_empty() {
                    continue;
                }
                results.push(StandingsRow {
                    conference: conference.clone(),
                    standing: cells[0].clone(),
                    school,
                    conf_record: cells.get(2).cloned().unwrap_or_default(),
                    overall_record: cells.get(3).cloned().unwrap_or_default(),
                });
            }
        }
    }
    results
}

#[derive(Debug, Clone)]
pub struct ConferenceGroup {
    pub name: String,
    /// (index into the full parsed row list, row)
    pub entries: Vec<(usize, StandingsRow)>,
}

/// Group rows by conference label, preserving page order.
pub fn group_by_conference(rows: &[StandingsRow]) -> Vec<ConferenceGroup> {
    let mut groups: Vec<ConferenceGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let name = row.conference.trim().to_string();
        let at = *index.entry(name.clone()).or_insert_with(|| {
            groups.push(ConferenceGroup {
                name,
                entries: Vec::new(),
            });
            groups.len() - 1
        });
        groups[at].entries.push((i, row.clone()));
    }
    groups
}

fn unique_conferences(rows: &[StandingsRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let conf = row.conference.trim().to_string();
        if !conf.is_empty() && seen.insert(conf.clone()) {
            out.push(conf);
        }
    }
    out
}

fn sheet_conferences(universities: &[ReferenceEntity]) -> Vec<String> {
    let unique: HashSet<String> = universities
        .iter()
        .filter_map(|u| u.conference.clone())
        .collect();
    let mut confs: Vec<String> = unique.into_iter().collect();
    confs.sort_by_key(|s| s.to_lowercase());
    confs
}

fn parse_index_list(input: &str) -> Vec<usize> {
    input
        .split(',')
        .filter_map(|part| part.trim().parse::<usize>().ok())
        .collect()
}

/// Persisted mapping from scraped conference labels to sheet conference
/// names. Empty values mean "deliberately unmapped".
pub struct ConferenceMap {
    path: PathBuf,
    pub map: HashMap<String, String>,
}

impl ConferenceMap {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = fs::read_to_string(&path)
            .ok()
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        Self { path, map }
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.map)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, scraped: &str) -> Option<&str> {
        self.map
            .get(scraped)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Suggest a sheet conference for every scraped conference and let the
/// operator accept the batch or correct individual mappings.
pub fn confirm_conference_mappings(
    console: &mut dyn Console,
    scraped_confs: &[String],
    sheet_confs: &[String],
    conf_map: &mut ConferenceMap,
) -> Result<()> {
    struct Suggested<'a> {
        scraped: &'a str,
        suggested: &'a str,
        score: f64,
        existing: String,
    }

    let mut display = Vec::new();
    for scraped in scraped_confs {
        let mut suggested = "";
        let mut best = -1.0_f64;
        for sheet_conf in sheet_confs {
            let score = combined_similarity(scraped, sheet_conf);
            if score > best {
                best = score;
                suggested = sheet_conf;
            }
        }
        let existing = conf_map.map.get(scraped).cloned().unwrap_or_default();
        display.push(Suggested {
            scraped,
            suggested,
            score: best,
            existing,
        });
    }

    println!("\nScraped conferences and suggested sheet mappings:");
    for (i, d) in display.iter().enumerate() {
        let existing_note = if d.existing.is_empty() {
            String::new()
        } else {
            format!(" [existing -> '{}']", d.existing)
        };
        println!(
            "{}) '{}' -> suggested: '{}' (score={:.3}){}",
            i + 1,
            d.scraped,
            d.suggested,
            d.score,
            existing_note
        );
    }

    let to_edit = console.prompt(
        "Enter comma-separated numbers to edit specific mappings (or Enter to accept all suggestions): ",
    )?;
    let edit_indices = parse_index_list(&to_edit);

    for (idx, d) in display.iter().enumerate() {
        if !edit_indices.contains(&(idx + 1)) {
            let value = if d.existing.is_empty() {
                d.suggested.to_string()
            } else {
                d.existing.clone()
            };
            conf_map.map.insert(d.scraped.to_string(), value);
            continue;
        }

        println!("\nEditing mapping for scraped conference '{}'", d.scraped);
        println!("Available sheet conferences (alphabetical):");
        for (i, sheet_conf) in sheet_confs.iter().enumerate() {
            println!("{}) {}", i + 1, sheet_conf);
        }
        let ans = console
            .prompt("Choose number to map, 'm' to show suggestions, 'e' to enter manual, or Enter to skip: ")?
            .to_lowercase();
        if let Ok(p) = ans.parse::<usize>() {
            if p >= 1 && p <= sheet_confs.len() {
                conf_map
                    .map
                    .insert(d.scraped.to_string(), sheet_confs[p - 1].clone());
                continue;
            }
        }
        if ans == "m" {
            let mut scored: Vec<(&String, f64)> = sheet_confs
                .iter()
                .map(|sheet_conf| (sheet_conf, combined_similarity(d.scraped, sheet_conf)))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            let shown = scored.len().min(DEFAULT_TOP_N);
            for (i, (sheet_conf, score)) in scored.iter().take(shown).enumerate() {
                println!("{}) {} (score={:.3})", i + 1, sheet_conf, score);
            }
            let pick = console.prompt("Choose number to accept (or Enter to cancel): ")?;
            if let Ok(p) = pick.parse::<usize>() {
                if p >= 1 && p <= shown {
                    conf_map
                        .map
                        .insert(d.scraped.to_string(), scored[p - 1].0.clone());
                    continue;
                }
            }
            println!("No selection made; leaving mapping empty for now.");
            conf_map.map.insert(d.scraped.to_string(), String::new());
            continue;
        }
        if ans == "e" {
            let manual =
                console.prompt("Type manual sheet conference name (exact as in sheet) or Enter to skip: ")?;
            conf_map.map.insert(d.scraped.to_string(), manual);
            continue;
        }
        conf_map.map.insert(d.scraped.to_string(), String::new());
    }

    match conf_map.save() {
        Ok(()) => println!("\nSaved conference mappings to {}", conf_map.path().display()),
        Err(e) => println!("Warning: could not save conference mapping: {:#}", e),
    }
    Ok(())
}

/// Locate an operator-typed start conference in the scraped list: exact
/// normalized match, then containment either way, then best fuzzy score.
fn resolve_start_index(start: &str, scraped_confs: &[String]) -> Option<usize> {
    let norm = start.trim().to_lowercase();
    if let Some(i) = scraped_confs
        .iter()
        .position(|c| c.trim().to_lowercase() == norm)
    {
        return Some(i);
    }
    if let Some(i) = scraped_confs.iter().position(|c| {
        let cand = c.trim().to_lowercase();
        cand.contains(&norm) || norm.contains(&cand)
    }) {
        return Some(i);
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in scraped_confs.iter().enumerate() {
        let score = combined_similarity(&norm, &c.trim().to_lowercase());
        if best.map_or(true, |(_, b)| score > b) {
            best = Some((i, score));
        }
    }
    best.filter(|&(_, score)| score >= START_CONFERENCE_MATCH_THRESHOLD)
        .map(|(i, _)| i)
}

fn clear_completed_from<S: SheetStore>(
    writer: &mut RateLimitedWriter<S>,
    page_key: &str,
    start: &str,
    scraped_confs: &[String],
) -> Result<()> {
    let start_norm = start.trim().to_lowercase();
    match resolve_start_index(start, scraped_confs) {
        Some(idx) => {
            let to_clear: HashSet<String> = scraped_confs[idx..]
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect();
            let progress = writer.checkpoint_file_mut().progress_mut(page_key);
            let old_len = progress.completed_conferences.len();
            progress
                .completed_conferences
                .retain(|c| !to_clear.contains(&c.trim().to_lowercase()));
            let removed = old_len - progress.completed_conferences.len();
            if removed > 0 {
                writer.save_checkpoint()?;
                println!(
                    "Cleared completed markers for {} from '{}' onward ({} removed)",
                    page_key, start, removed
                );
            }
        }
        None => {
            let progress = writer.checkpoint_file_mut().progress_mut(page_key);
            let old_len = progress.completed_conferences.len();
            progress
                .completed_conferences
                .retain(|c| !c.trim().to_lowercase().contains(&start_norm));
            let removed = old_len - progress.completed_conferences.len();
            if removed > 0 {
                writer.save_checkpoint()?;
                println!(
                    "Cleared completed markers for {} matching '{}' ({} removed)",
                    page_key, start, removed
                );
            } else {
                println!(
                    "Warning: start conference '{}' not found among scraped conferences; no completed markers cleared.",
                    start
                );
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StandingsOptions {
    pub gender: Gender,
    pub division: Division,
    pub url: Option<String>,
    pub start_conference: Option<String>,
    pub map_conferences: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub updated: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub failed: usize,
}

struct Suggestion {
    global_idx: usize,
    data: StandingsRow,
    row: Option<usize>,
    name: Option<String>,
    score: f64,
}

/// Full interactive standings session: fetch, parse, map conferences,
/// confirm school matches, write through the rate-limited writer.
pub fn run_standings<S: SheetStore>(
    fetcher: &dyn PageFetcher,
    writer: &mut RateLimitedWriter<S>,
    console: &mut dyn Console,
    config: &ScraperConfig,
    options: &StandingsOptions,
) -> Result<SessionStats> {
    let universities = load_reference_entities(writer.store(), options.gender, &config.sheet)?;
    if universities.is_empty() {
        anyhow::bail!("No universities found in sheet. Aborting.");
    }

    if writer.has_pending() {
        let report = writer.flush_pending()?;
        println!(
            "Flushed {} pending write group(s); {} failed, {} still pending.",
            report.flushed, report.failed, report.remaining
        );
    }

    let url = match &options.url {
        Some(url) => url.clone(),
        None => standings_url(options.division, options.gender)
            .map(|u| u.to_string())
            .ok_or_else(|| {
                anyhow!(
                    "No standings URL known for {} {}; pass --url",
                    options.division,
                    options.gender
                )
            })?,
    };

    info!("Fetching standings page from {}", url);
    let html = fetcher.fetch(&url)?;
    let rows = parse_standings(&html);
    if rows.is_empty() {
        anyhow::bail!("No standings data found.");
    }

    let page_key = format!("{}_{}", options.division, options.gender);
    let resume_index = writer
        .checkpoint()
        .standings
        .get(&page_key)
        .map(|p| p.next_index)
        .unwrap_or(0);
    println!("Resuming from index {}", resume_index);

    let scraped_confs = unique_conferences(&rows);
    let sheet_confs = sheet_conferences(&universities);
    let mut conf_map = ConferenceMap::load(&config.state.conference_map_file);

    if options.map_conferences {
        confirm_conference_mappings(console, &scraped_confs, &sheet_confs, &mut conf_map)?;
    } else {
        println!(
            "Interactive conference mapping skipped. To enable mapping confirmation, run with the '--map-conferences' flag."
        );
    }

    let start_norm = options
        .start_conference
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    if let Some(start) = options
        .start_conference
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        clear_completed_from(writer, &page_key, start, &scraped_confs)?;
    }

    let completed_norm: HashSet<String> = writer
        .checkpoint()
        .standings
        .get(&page_key)
        .map(|p| {
            p.completed_conferences
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect()
        })
        .unwrap_or_default();

    let groups = group_by_conference(&rows);
    let mut stats = SessionStats::default();
    let mut started = start_norm.is_none();

    for group in &groups {
        let conf_norm = group.name.trim().to_lowercase();
        if let Some(start) = &start_norm {
            if !started {
                if conf_norm != *start {
                    println!(
                        "Skipping conference '{}' until start conference ('{}') is reached",
                        group.name, start
                    );
                    continue;
                }
                started = true;
            }
        }
        let is_start_conf = start_norm.as_deref() == Some(conf_norm.as_str());
        if completed_norm.contains(&conf_norm) && !is_start_conf {
            println!(
                "Conference '{}' already completed for {}; skipping",
                group.name, page_key
            );
            continue;
        }

        let mapped = conf_map.get(&group.name).unwrap_or("").to_string();
        println!(
            "\nProcessing conference: '{}' -> mapped sheet conference: '{}'",
            group.name, mapped
        );

        let mapped_lower = mapped.to_lowercase();
        let filtered: Vec<ReferenceEntity> = if mapped.is_empty() {
            universities.clone()
        } else {
            universities
                .iter()
                .filter(|u| {
                    u.conference
                        .as_deref()
                        .map(|c| c.trim().to_lowercase())
                        .as_deref()
                        == Some(mapped_lower.as_str())
                })
                .cloned()
                .collect()
        };

        let mut suggestions: Vec<Suggestion> = Vec::new();
        for (global_idx, ent) in &group.entries {
            if !ent.conf_record.is_empty() && parse_record(&ent.conf_record).is_err() {
                warn!(
                    "Conference record '{}' for {} is not W-L or W-L-T",
                    ent.conf_record, ent.school
                );
            }
            let cands = find_best_candidates(&ent.school, &filtered, None, DEFAULT_TOP_N);
            match cands.first() {
                Some(c) => suggestions.push(Suggestion {
                    global_idx: *global_idx,
                    data: ent.clone(),
                    row: Some(c.row),
                    name: Some(c.name.clone()),
                    score: c.score,
                }),
                None => suggestions.push(Suggestion {
                    global_idx: *global_idx,
                    data: ent.clone(),
                    row: None,
                    name: None,
                    score: 0.0,
                }),
            }
        }

        println!("\nSuggestions for conference {}", group.name);
        for (i, s) in suggestions.iter().enumerate() {
            println!(
                "{}) {}  -> {} (score={:.3})",
                i + 1,
                s.data.school,
                s.name.as_deref().unwrap_or("NO SUGGESTION"),
                s.score
            );
        }

        let to_correct =
            console.prompt("Enter comma-separated numbers to correct (or Enter to accept all): ")?;
        for ind in parse_index_list(&to_correct) {
            if ind < 1 || ind > suggestions.len() {
                println!("Index {} out of range", ind);
                continue;
            }
            let school = suggestions[ind - 1].data.school.clone();
            let current = suggestions[ind - 1]
                .name
                .clone()
                .unwrap_or_else(|| "NO SUGGESTION".to_string());
            println!(
                "Correcting {}. Current suggestion: {} (score={:.3})",
                school,
                current,
                suggestions[ind - 1].score
            );
            let restrict = console
                .prompt("Restrict suggestions to mapped conference only? [Y/n]: ")?
                .to_lowercase();
            let source: &[ReferenceEntity] = if matches!(restrict.as_str(), "" | "y" | "yes") {
                &filtered
            } else {
                &universities
            };
            let cands = find_best_candidates(&school, source, None, DEFAULT_TOP_N);
            match resolve_interactive(console, &school, Some(&mapped), &cands, source)? {
                Resolution::Confirmed { row, name } => {
                    suggestions[ind - 1].row = Some(row);
                    suggestions[ind - 1].name = Some(name);
                }
                Resolution::NoMatch => println!("No selection made; leaving suggestion as-is"),
            }
        }

        for s in &suggestions {
            match s.row {
                None => {
                    println!("Skipping {} (no matched row)", s.data.school);
                    stats.skipped += 1;
                }
                Some(row) => {
                    let writes = PendingWrite {
                        row,
                        writes: s.data.to_writes(options.gender),
                    };
                    match writer.write_group(&writes)? {
                        WriteOutcome::Success => {
                            println!(
                                "Updated row {}: {} (conf {}, overall {}, standing {})",
                                row,
                                s.data.school,
                                s.data.conf_record,
                                s.data.overall_record,
                                s.data.standing
                            );
                            stats.updated += 1;
                        }
                        WriteOutcome::Deferred { retry_after_secs } => {
                            println!(
                                "Write limit reached. Parked writes for row {}; slots free around {}.",
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
            let progress = writer.checkpoint_file_mut().progress_mut(&page_key);
            progress.next_index = s.global_idx + 1;
            writer.save_checkpoint()?;
        }

        let progress = writer.checkpoint_file_mut().progress_mut(&page_key);
        if !group.name.is_empty()
            && !progress
                .completed_conferences
                .iter()
                .any(|c| c == &group.name)
        {
            progress.completed_conferences.push(group.name.clone());
        }
        writer.save_checkpoint()?;
    }

    println!("\nAll conferences processed.");
    Ok(stats)
}
