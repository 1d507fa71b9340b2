use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::info;

use crate::config::ScraperConfig;
use crate::fetch::PageFetcher;
use crate::matcher::{find_best_candidates, DEFAULT_TOP_N};
use crate::resolver::{resolve_interactive, Console, Resolution};
use crate::standings::SessionStats;
use crate::store::{load_reference_entities, SheetStore};
use crate::types::{CellWrite, Division, Gender, PendingWrite, ReferenceEntity};
use crate::utils::clean_cell_text;
use crate::writer::{resume_time_hint, RateLimitedWriter, WriteOutcome};

pub fn ranking_url(division: Division, gender: Gender) -> &'static str {
    match (gender, division) {
        (Gender::Men, Division::D1) => {
            "https://www.ncaa.com/rankings/soccer-men/d1/united-soccer-coaches"
        }
        (Gender::Men, Division::D2) => {
            "https://www.ncaa.com/rankings/soccer-men/d2/regional-rankings"
        }
        (Gender::Men, Division::D3) => {
            "https://unitedsoccercoaches.org/rankings/college-rankings/ncaa-diii-men/"
        }
        (Gender::Men, Division::Naia) => {
            "https://www.naia.org/sports/msoc/2025-26/releases/Poll_6"
        }
        (Gender::Women, Division::D1) => {
            "https://www.ncaa.com/rankings/soccer-women/d1/united-soccer-coaches"
        }
        (Gender::Women, Division::D2) => {
            "https://www.ncaa.com/rankings/soccer-women/d2/regional-rankings"
        }
        (Gender::Women, Division::D3) => {
            "https://unitedsoccercoaches.org/rankings/college-rankings/ncaa-diii-women/"
        }
        (Gender::Women, Division::Naia) => {
            "https://www.naia.org/sports/wsoc/2025-26/releases/Poll_6"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingEntry {
    pub rank: u32,
    pub school: String,
}

fn element_text(el: ElementRef) -> String {
    clean_cell_text(&el.text().collect::<Vec<_>>().join(" "))
}

fn leading_rank(text: &str) -> Option<u32> {
    let re = Regex::new(r"^\s*(\d{1,2})").unwrap();
    re.captures(text).and_then(|cap| cap[1].parse().ok())
}

/// Table rows carry the rank in the first cell and the school in the
/// second, except NAIA poll tables which use the second and fourth cells.
fn parse_table_rankings(document: &Html) -> Vec<RankingEntry> {
    let tr_selector = Selector::parse("table tr").unwrap();
    let td_selector = Selector::parse("td").unwrap();

    let mut results = Vec::new();
    for tr in document.select(&tr_selector) {
        let cells: Vec<String> = tr.select(&td_selector).map(element_text).collect();
        if cells.len() < 2 {
            continue;
        }
        let mut rank = None;
        let mut name = None;
        if let Some(r) = leading_rank(&cells[0]) {
            rank = Some(r);
            name = Some(cells[1].clone());
        } else if cells.len() >= 4 {
            if let Some(r) = leading_rank(&cells[1]) {
                rank = Some(r);
                name = Some(cells[3].clone());
            }
        }
        if rank.is_none() {
            for (i, cell) in cells.iter().take(3).enumerate() {
                if let Some(r) = leading_rank(cell) {
                    rank = Some(r);
                    name = cells
                        .iter()
                        .enumerate()
                        .find(|(j, c)| *j != i && !c.is_empty())
                        .map(|(_, c)| c.clone());
                    break;
                }
            }
        }
        if let (Some(rank), Some(school)) = (rank, name) {
            if !school.is_empty() {
                results.push(RankingEntry { rank, school });
            }
        }
    }
    results
}

fn rankings_from_text(text: &str) -> Vec<RankingEntry> {
    let pattern = Regex::new(r#"(?m)^\s*(\d{1,2})[.)]\s*([A-Za-z0-9&'".\- ,/]{3,120})$"#).unwrap();
    let mut results = Vec::new();
    for cap in pattern.captures_iter(text) {
        let rank: u32 = match cap[1].parse() {
            Ok(rank) => rank,
            Err(_) => continue,
        };
        let school = cap[2].trim().to_string();
        if school.len() < 2 {
            continue;
        }
        results.push(RankingEntry { rank, school });
    }
    results
}

fn parse_text_line_rankings(document: &Html) -> Vec<RankingEntry> {
    let text = document.root_element().text().collect::<Vec<_>>().join("\n");
    rankings_from_text(&text)
}

/// Pages that mark teams with team/school classes but no parseable table:
/// scan block elements for "<rank> <name>" text.
fn parse_element_rankings(document: &Html) -> Vec<RankingEntry> {
    let class_selector = Selector::parse(".team-name, .team, .school, .rank-team").unwrap();
    if document.select(&class_selector).next().is_none() {
        return Vec::new();
    }
    let node_selector = Selector::parse("div, li, tr, p").unwrap();
    let pattern = Regex::new(r"^(\d{1,2})[.)]?\s+(.*)$").unwrap();

    let mut results = Vec::new();
    for el in document.select(&node_selector) {
        let text = element_text(el);
        if let Some(cap) = pattern.captures(&text) {
            if let Ok(rank) = cap[1].parse::<u32>() {
                let school = cap[2].trim().to_string();
                if !school.is_empty() {
                    results.push(RankingEntry { rank, school });
                }
            }
        }
    }
    results
}

fn parse_anchor_rankings(document: &Html) -> Vec<RankingEntry> {
    let a_selector = Selector::parse("a").unwrap();
    let pattern = Regex::new(r"^#?(\d{1,2})\s*[-.:)]\s*(.+)$").unwrap();

    let mut results = Vec::new();
    for a in document.select(&a_selector) {
        let text = element_text(a);
        if text.len() <= 3 {
            continue;
        }
        if let Some(cap) = pattern.captures(&text) {
            if let Ok(rank) = cap[1].parse::<u32>() {
                let school = cap[2].trim().to_string();
                if !school.is_empty() {
                    results.push(RankingEntry { rank, school });
                }
            }
        }
    }
    results
}

/// Last resort for markup the DOM parser mangles: strip tags from the raw
/// response, decode entities, and run the line parser.
fn parse_raw_text_rankings(html: &str) -> Vec<RankingEntry> {
    let tag_re = Regex::new(r"(?s)<[^>]+>").unwrap();
    let stripped = tag_re.replace_all(html, "\n");
    let decoded = html_escape::decode_html_entities(&stripped);
    rankings_from_text(&decoded)
}

/// Keep one entry per school (lowest rank wins), sorted ascending.
fn dedup_and_sort(entries: Vec<RankingEntry>) -> Vec<RankingEntry> {
    let mut best: HashMap<String, RankingEntry> = HashMap::new();
    for entry in entries {
        let key = entry.school.to_lowercase();
        match best.get(&key) {
            Some(existing) if existing.rank <= entry.rank => {}
            _ => {
                best.insert(key, entry);
            }
        }
    }
    let mut cleaned: Vec<RankingEntry> = best.into_values().collect();
    cleaned.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.school.cmp(&b.school)));
    cleaned
}

/// Extract (rank, school) pairs from a rankings page, trying strategies
/// from most to least structured.
pub fn parse_rankings(html: &str) -> Vec<RankingEntry> {
    let document = Html::parse_document(html);
    let mut results = parse_table_rankings(&document);
    if results.is_empty() {
        results = parse_text_line_rankings(&document);
    }
    if results.is_empty() {
        results = parse_element_rankings(&document);
    }
    if results.is_empty() {
        results = parse_anchor_rankings(&document);
    }
    if results.is_empty() {
        results = parse_raw_text_rankings(html);
    }
    dedup_and_sort(results)
}

#[derive(Debug, Clone)]
pub struct RankingsOptions {
    pub gender: Gender,
    /// None scrapes every division in order.
    pub division: Option<Division>,
}

/// Fetch ranking pages, confirm school matches, and write ranks into the
/// gender's ranking column through the rate-limited writer.
pub fn run_rankings<S: SheetStore>(
    fetcher: &dyn PageFetcher,
    writer: &mut RateLimitedWriter<S>,
    console: &mut dyn Console,
    config: &ScraperConfig,
    options: &RankingsOptions,
) -> Result<SessionStats> {
    let universities = load_reference_entities(writer.store(), options.gender, &config.sheet)?;
    if universities.is_empty() {
        anyhow::bail!("No university names found in sheet. Aborting.");
    }
    println!(
        "Loaded {} universities from sheet (data starts at row {}).",
        universities.len(),
        config.sheet.header_row + 1
    );

    if writer.has_pending() {
        let report = writer.flush_pending()?;
        println!(
            "Flushed {} pending write group(s); {} failed, {} still pending.",
            report.flushed, report.failed, report.remaining
        );
    }

    let divisions: Vec<Division> = match options.division {
        Some(division) => vec![division],
        None => Division::all().to_vec(),
    };
    let ranking_col = options.gender.ranking_column();
    let mut stats = SessionStats::default();

    for division in divisions {
        let url = ranking_url(division, options.gender);
        println!("\nFetching rankings from {}", url);
        let html = match fetcher.fetch(url) {
            Ok(html) => html,
            Err(e) => {
                println!("Failed to fetch {}: {:#}", url, e);
                continue;
            }
        };
        let rankings = parse_rankings(&html);
        if rankings.is_empty() {
            println!("No rankings parsed from {}", url);
            continue;
        }
        info!("Parsed {} ranking rows from {}", rankings.len(), url);
        println!(
            "Parsed {} ranking rows from {} ({})",
            rankings.len(),
            division,
            url
        );

        let target = division.sheet_label();
        let filtered: Vec<ReferenceEntity> = universities
            .iter()
            .filter(|u| match u.division.as_deref() {
                Some(div) if !div.trim().is_empty() => div.trim().eq_ignore_ascii_case(target),
                _ => true,
            })
            .cloned()
            .collect();
        if filtered.is_empty() {
            println!("No candidate universities in sheet for division {}.", target);
            continue;
        }

        for entry in &rankings {
            let candidates = find_best_candidates(&entry.school, &filtered, None, DEFAULT_TOP_N);
            match resolve_interactive(console, &entry.school, None, &candidates, &filtered)? {
                Resolution::Confirmed { row, name } => {
                    let group = PendingWrite {
                        row,
                        writes: vec![CellWrite {
                            col: ranking_col,
                            value: entry.rank.to_string(),
                        }],
                    };
                    match writer.write_group(&group)? {
                        WriteOutcome::Success => {
                            println!(
                                "Wrote ranking {} to row {}, column {} for '{}'.",
                                entry.rank, row, ranking_col, name
                            );
                            stats.updated += 1;
                        }
                        WriteOutcome::Deferred { retry_after_secs } => {
                            println!(
                                "Write limit reached. Parked ranking for row {}; slots free around {}.",
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
                Resolution::NoMatch => {
                    println!("Skipping this ranking.");
                    stats.skipped += 1;
                }
            }
        }
    }

    println!("\nDone.");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointFile;
    use crate::store::CsvSheetStore;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    struct ScriptedConsole {
        inputs: VecDeque<String>,
    }

    impl ScriptedConsole {
        fn new(inputs: &[&str]) -> Self {
            Self {
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl Console for ScriptedConsole {
        fn prompt(&mut self, _message: &str) -> Result<String> {
            self.inputs
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("scripted console ran out of inputs"))
        }
    }

    struct StaticFetcher {
        body: String,
    }

    impl PageFetcher for StaticFetcher {
        fn fetch(&self, _url: &str) -> Result<String> {
            Ok(self.body.clone())
        }
    }

    #[test]
    fn test_parse_table_rankings_standard_layout() {
        let html = r#"
<table>
  <tr><th>Rank</th><th>School</th></tr>
  <tr><td>1</td><td>Duke University</td><td>12-0</td></tr>
  <tr><td>2</td><td>Wake Forest</td><td>10-2</td></tr>
</table>"#;
        let rankings = parse_rankings(html);
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0], RankingEntry { rank: 1, school: "Duke University".to_string() });
        assert_eq!(rankings[1].rank, 2);
    }

    #[test]
    fn test_parse_table_rankings_naia_layout() {
        // Rank in the second cell, school in the fourth.
        let html = r#"
<table>
  <tr><td>prev 2</td><td>1</td><td>(8)</td><td>Marian (Ind.)</td><td>240</td></tr>
  <tr><td>prev 1</td><td>2</td><td></td><td>Keiser (Fla.)</td><td>231</td></tr>
</table>"#;
        let rankings = parse_rankings(html);
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].school, "Marian (Ind.)");
        assert_eq!(rankings[1].school, "Keiser (Fla.)");
    }

    #[test]
    fn test_parse_text_line_rankings() {
        let html = "<html><body><div>1. Duke University</div><div>2. Wake Forest</div><div>not a rank</div></body></html>";
        let rankings = parse_rankings(html);
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].school, "Duke University");
    }

    #[test]
    fn test_parse_anchor_rankings() {
        let html = r#"<html><body><p><a href="/a">#1 - Elon</a><a href="/b">#2 - Duke</a></p></body></html>"#;
        let rankings = parse_rankings(html);
        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].school, "Elon");
    }

    #[test]
    fn test_raw_text_fallback_decodes_entities() {
        let rankings =
            parse_raw_text_rankings("<ul><li>1. Texas A&amp;M</li><li>2. Duke</li></ul>");
        assert_eq!(rankings[0].school, "Texas A&M");
        assert_eq!(rankings[1].school, "Duke");
    }

    #[test]
    fn test_dedup_keeps_lowest_rank() {
        let entries = vec![
            RankingEntry { rank: 5, school: "duke".to_string() },
            RankingEntry { rank: 2, school: "Duke".to_string() },
            RankingEntry { rank: 3, school: "Elon".to_string() },
        ];
        let cleaned = dedup_and_sort(entries);
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[0].rank, 2);
        assert_eq!(cleaned[1].school, "Elon");
    }

    #[test]
    fn test_run_rankings_writes_rank_column() {
        let dir = tempdir().unwrap();
        let sheet_path = dir.path().join("sheet.csv");
        std::fs::write(
            &sheet_path,
            "\
Master List,,,
id,school,men_ncaa_division,notes
1,Duke University,Division 1,
2,Wake Forest University,Division 1,
3,Marian,NAIA,
",
        )
        .unwrap();

        let mut config = ScraperConfig::default();
        config.sheet.path = sheet_path.to_string_lossy().into_owned();

        let store = CsvSheetStore::new(&sheet_path);
        let checkpoint = CheckpointFile::load(dir.path().join("cp.json")).unwrap();
        let mut writer = RateLimitedWriter::new(store, checkpoint, 60);

        let fetcher = StaticFetcher {
            body: "<html><body><div>1. Duke University</div><div>2. Wake Forest</div></body></html>"
                .to_string(),
        };
        // Accept the top suggestion for both schools.
        let mut console = ScriptedConsole::new(&["", ""]);

        let options = RankingsOptions {
            gender: Gender::Men,
            division: Some(Division::D1),
        };
        let stats =
            run_rankings(&fetcher, &mut writer, &mut console, &config, &options).unwrap();
        assert_eq!(stats.updated, 2);

        let rows = writer.store().read_all().unwrap();
        // Sheet rows 3 and 4, ranking column 28 (index 27).
        assert_eq!(rows[2][27], "1");
        assert_eq!(rows[3][27], "2");
        // The NAIA school was filtered out of candidates and untouched.
        assert_eq!(rows[4].len(), 4);
    }
}
