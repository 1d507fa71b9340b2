use anyhow::Result;
use std::cmp::Ordering;
use std::io::{self, Write};

use crate::error::MatchError;
use crate::matcher::DEFAULT_TOP_N;
use crate::similarity::combined_similarity;
use crate::types::{MatchCandidate, ReferenceEntity};

/// Where resolver prompts come from. Production uses stdin; tests drive
/// the session with a scripted console.
pub trait Console {
    fn prompt(&mut self, message: &str) -> Result<String>;
}

pub struct StdinConsole;

impl Console for StdinConsole {
    fn prompt(&mut self, message: &str) -> Result<String> {
        print!("{}", message);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Confirmed { row: usize, name: String },
    NoMatch,
}

fn parse_selection(input: &str, max: usize) -> Result<usize, MatchError> {
    let n: usize = input.parse().map_err(|_| MatchError::AmbiguousInput {
        input: input.to_string(),
    })?;
    if n < 1 || n > max {
        return Err(MatchError::AmbiguousInput {
            input: input.to_string(),
        });
    }
    Ok(n)
}

/// Walk the operator through confirming a match for one scraped school.
///
/// `candidates` is sorted best-first. Besides stepping through candidates,
/// the operator can type an exact sheet name, search the sheet by
/// substring, or skip the school. Manual entry and partial search work
/// even when the candidate list is empty.
pub fn resolve_interactive(
    console: &mut dyn Console,
    scraped_name: &str,
    scraped_conf: Option<&str>,
    candidates: &[MatchCandidate],
    universities: &[ReferenceEntity],
) -> Result<Resolution> {
    if candidates.is_empty() {
        println!(
            "{}",
            MatchError::NoCandidates {
                name: scraped_name.to_string(),
            }
        );
    }
    let mut idx = 0;
    loop {
        if let Some(cand) = candidates.get(idx) {
            match scraped_conf {
                Some(conf) if !conf.is_empty() => {
                    println!("\nScraped school: {}  (Conference: {})", scraped_name, conf);
                }
                _ => println!("\nScraped school: {}", scraped_name),
            }
            println!("Suggested: {} (score={:.3})", cand.name, cand.score);
        }
        let ans = console
            .prompt("Confirm? [y]es / [n]ext / s=show top 10 / e=manual / p=partial search / q=skip: ")?
            .to_lowercase();
        match ans.as_str() {
            "" | "y" | "yes" => match candidates.get(idx) {
                Some(cand) => {
                    return Ok(Resolution::Confirmed {
                        row: cand.row,
                        name: cand.name.clone(),
                    });
                }
                None => println!("Invalid input."),
            },
            "n" | "next" => {
                idx += 1;
                if idx >= candidates.len() {
                    println!("No more candidates in list.");
                    return Ok(Resolution::NoMatch);
                }
            }
            "s" => {
                for (i, cand) in candidates.iter().enumerate() {
                    println!("{}) {} (score={:.3})", i + 1, cand.name, cand.score);
                }
                let pick = console.prompt("Choose number (or Enter to return): ")?;
                if let Ok(p) = parse_selection(&pick, candidates.len()) {
                    let cand = &candidates[p - 1];
                    return Ok(Resolution::Confirmed {
                        row: cand.row,
                        name: cand.name.clone(),
                    });
                }
            }
            "e" => {
                let manual = console.prompt("Type manual university name (exact as in sheet): ")?;
                if manual.is_empty() {
                    continue;
                }
                if !universities.is_empty() {
                    if let Some(uni) = universities
                        .iter()
                        .find(|u| u.name.trim().to_lowercase() == manual.to_lowercase())
                    {
                        return Ok(Resolution::Confirmed {
                            row: uni.row,
                            name: uni.name.clone(),
                        });
                    }
                    let mut fuzzy: Vec<(&ReferenceEntity, f64)> = universities
                        .iter()
                        .map(|u| (u, combined_similarity(&manual, &u.name)))
                        .collect();
                    fuzzy.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
                    println!("No exact match found; top fuzzy matches:");
                    let shown = fuzzy.len().min(DEFAULT_TOP_N);
                    for (i, (uni, score)) in fuzzy.iter().take(shown).enumerate() {
                        println!("{}) {} (score={:.3})", i + 1, uni.name, score);
                    }
                    let pick = console.prompt("Choose number to accept (or Enter to cancel): ")?;
                    if let Ok(p) = parse_selection(&pick, shown) {
                        let (uni, _) = fuzzy[p - 1];
                        return Ok(Resolution::Confirmed {
                            row: uni.row,
                            name: uni.name.clone(),
                        });
                    }
                }
                println!("Manual entry not found. Returning to menu.");
            }
            "p" => {
                let substr = console
                    .prompt("Enter partial name to search sheet for: ")?
                    .to_lowercase();
                if substr.is_empty() {
                    continue;
                }
                let filtered: Vec<&ReferenceEntity> = universities
                    .iter()
                    .filter(|u| u.name.to_lowercase().contains(&substr))
                    .collect();
                if filtered.is_empty() {
                    println!("No universities in sheet match that partial string.");
                    continue;
                }
                let mut scored: Vec<(&ReferenceEntity, f64)> = filtered
                    .into_iter()
                    .map(|u| (u, combined_similarity(scraped_name, &u.name)))
                    .collect();
                scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
                println!("Top matches for partial search:");
                let shown = scored.len().min(DEFAULT_TOP_N);
                for (i, (uni, score)) in scored.iter().take(shown).enumerate() {
                    println!("{}) {} (score={:.3})", i + 1, uni.name, score);
                }
                let pick = console.prompt("Choose number to accept (or Enter to cancel): ")?;
                if let Ok(p) = parse_selection(&pick, shown) {
                    let (uni, _) = scored[p - 1];
                    return Ok(Resolution::Confirmed {
                        row: uni.row,
                        name: uni.name.clone(),
                    });
                }
            }
            "q" | "skip" => {
                println!("Skipped.");
                return Ok(Resolution::NoMatch);
            }
            _ => println!("Invalid input."),
        }
    }
}
