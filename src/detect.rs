use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// One placeholder signature, matched as a case-insensitive substring.
///
/// Broad phrases ("welcome to", "coming soon") are scoped to the page title
/// so ordinary prose in a titleless body cannot trigger them; specific
/// signatures may match anywhere when no title is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    pub pattern: String,
    pub title_only: bool,
}

impl PatternRule {
    fn body(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            title_only: false,
        }
    }

    fn title(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            title_only: true,
        }
    }
}

/// Built-in denylist of default/placeholder page signatures.
///
/// Entries are stored lowercase. The list is ordered roughly by how specific
/// the signature is; matching is a plain OR so order only affects which rule
/// fires first.
pub fn default_patterns() -> Vec<PatternRule> {
    vec![
        // Apache
        PatternRule::body("apache2 ubuntu default page"),
        PatternRule::body("apache2 debian default page"),
        PatternRule::body("test page for the apache"),
        PatternRule::body("it works!"),
        // Nginx
        PatternRule::body("welcome to nginx"),
        // IIS
        PatternRule::body("iis windows server"),
        PatternRule::body("internet information services"),
        PatternRule::body("iis7"),
        PatternRule::body("iis8"),
        PatternRule::body("iis10"),
        // Generic hosting / placeholder pages
        PatternRule::body("web server's default page"),
        PatternRule::body("default web site page"),
        PatternRule::body("index of /"),
        PatternRule::body("directory listing"),
        PatternRule::body("under construction"),
        PatternRule::body("site under maintenance"),
        PatternRule::body("maintenance mode"),
        PatternRule::body("parked domain"),
        PatternRule::body("domain for sale"),
        PatternRule::body("website coming soon"),
        PatternRule::body("example domain"),
        // Broad phrases: common in real prose, trusted only inside a title.
        PatternRule::title("welcome to"),
        PatternRule::title("congratulations"),
        PatternRule::title("coming soon"),
        PatternRule::title("this domain"),
        PatternRule::title("new website"),
        PatternRule::title("placeholder"),
        PatternRule::title("default page"),
        PatternRule::title("test page"),
        // Hosting control panels
        PatternRule::title("plesk"),
        PatternRule::title("cpanel"),
        PatternRule::title("webmin"),
        PatternRule::title("directadmin"),
    ]
}

/// Parse a pattern list: one rule per line, `#` starts a comment, blank lines
/// are skipped, duplicates removed. A `title:` prefix scopes the rule to the
/// page title. Rules are lowercased on load.
pub fn parse_patterns_str(s: &str) -> Vec<PatternRule> {
    let mut out: Vec<PatternRule> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for raw_line in s.lines() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        let (pattern, title_only) = match line.strip_prefix("title:") {
            Some(rest) => (rest.trim(), true),
            None => (line, false),
        };
        if pattern.is_empty() {
            continue;
        }
        let pattern = pattern.to_lowercase();
        if seen.insert(pattern.clone()) {
            out.push(PatternRule {
                pattern,
                title_only,
            });
        }
    }
    out
}

/// Load a pattern list from a file path.
pub fn load_patterns_from_path(path: impl AsRef<Path>) -> Result<Vec<PatternRule>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read patterns file: {}", path.as_ref().display()))?;
    Ok(parse_patterns_str(&content))
}

/// Load a pattern list from a file, or fall back to the built-in list when the
/// file is missing or empty.
pub fn load_patterns_or_default(path: impl AsRef<Path>) -> Vec<PatternRule> {
    match load_patterns_from_path(&path) {
        Ok(v) if !v.is_empty() => v,
        _ => default_patterns(),
    }
}

/// Decide whether a response body looks like a server default/placeholder page.
///
/// Pure function over (body, rules): when the body has a non-empty `<title>`,
/// every rule is matched against the title text; otherwise only body-scoped
/// rules are matched against the whole body. A body that is not valid UTF-8
/// never matches. Binary outcome, no scoring.
pub fn is_default_page(body: &[u8], rules: &[PatternRule]) -> bool {
    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    // ASCII lowercasing keeps byte offsets aligned with the input text.
    let lowered = text.to_ascii_lowercase();
    match extract_title(&lowered) {
        Some(title) if !title.trim().is_empty() => {
            rules.iter().any(|r| title.contains(r.pattern.as_str()))
        }
        _ => rules
            .iter()
            .any(|r| !r.title_only && lowered.contains(r.pattern.as_str())),
    }
}

/// Pull the inner text of the first `<title>` element, if any.
/// Expects an already-lowercased document.
fn extract_title(doc: &str) -> Option<&str> {
    let open = doc.find("<title")?;
    let rest = &doc[open..];
    let gt = rest.find('>')?;
    let inner = &rest[gt + 1..];
    let close = inner.find("</title")?;
    Some(&inner[..close])
}
