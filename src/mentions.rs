//! Rewrites `@name` tokens in note text into chat-native mentions by
//! fuzzy-matching against the recipient roster. Pure, no I/O.
use crate::model::Recipient;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Jaro-Winkler acceptance threshold; below it the token stays literal.
const MATCH_THRESHOLD: f64 = 0.8;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+").expect("valid mention pattern"));

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Best-scoring roster entry above the threshold; ties keep the entry
/// encountered first.
fn best_match<'a>(token: &str, roster: &'a [Recipient]) -> Option<&'a Recipient> {
    let wanted = normalize(token.trim_start_matches('@'));
    if wanted.is_empty() {
        return None;
    }
    let mut best: Option<(&Recipient, f64)> = None;
    for recipient in roster {
        let score = strsim::jaro_winkler(&wanted, &normalize(&recipient.display_name));
        if score >= MATCH_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
            best = Some((recipient, score));
        }
    }
    best.map(|(recipient, _)| recipient)
}

/// Replace each `@name` token with `<@ID>` for the closest roster entry.
/// Unmatched tokens pass through untouched; this never fails.
pub fn resolve(text: &str, roster: &[Recipient]) -> String {
    MENTION
        .replace_all(text, |caps: &Captures| {
            let token = &caps[0];
            match best_match(token, roster) {
                Some(recipient) => format!("<@{}>", recipient.id),
                None => token.to_string(),
            }
        })
        .into_owned()
}
