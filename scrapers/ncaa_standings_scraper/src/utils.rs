use anyhow::{Context, Result};

/// Parse a "W-L" or "W-L-T" record string into (wins, losses, ties).
pub fn parse_record(record: &str) -> Result<(u32, u32, u32)> {
    let parts: Vec<&str> = record.split('-').collect();
    if parts.len() != 2 && parts.len() != 3 {
        anyhow::bail!("Invalid record format: {}", record);
    }

    let wins = parts[0]
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid wins: {}", parts[0]))?;
    let losses = parts[1]
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid losses: {}", parts[1]))?;
    let ties = if parts.len() == 3 {
        parts[2]
            .trim()
            .parse::<u32>()
            .with_context(|| format!("Invalid ties: {}", parts[2]))?
    } else {
        0
    };

    Ok((wins, losses, ties))
}

/// Collapse runs of whitespace (including newlines from HTML text nodes)
/// into single spaces and trim the ends.
pub fn clean_cell_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Lowercase and collapse internal whitespace. Used when comparing names
/// that came from different sources.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// URL-ish forms of a person's name, for matching profile links:
/// "first-last", "first_last", and "firstlast".
pub fn name_variants(full_name: &str) -> Vec<String> {
    let normalized = normalize_name(full_name);
    vec![
        normalized.replace(' ', "-"),
        normalized.replace(' ', "_"),
        normalized.replace(' ', ""),
    ]
}
