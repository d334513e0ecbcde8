//! Helpers for building safe Cypher.
//!
//! Labels and relationship types cannot be bound as parameters, so anything
//! derived from LLM output or user input goes through the sanitizers here
//! before being interpolated. Values are always bound.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Labels used by the storage layout itself; entity types may not reuse them.
const RESERVED_LABELS: &[&str] = &["KnowledgeGraph", "Document", "Episode", "Entity"];

const MAX_IDENT_LEN: usize = 64;

/// Canonical timestamp format stored on nodes and edges.
///
/// Millisecond precision with a `Z` suffix keeps lexical and chronological
/// order identical, which the range filters depend on.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// Parse a stored timestamp back into a `DateTime`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Which end of a range a user-supplied bound describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Normalize a user-supplied date or datetime into the stored timestamp format.
///
/// A bare date covers the whole day: as a start bound it becomes midnight,
/// as an end bound the last millisecond of the day.
pub fn normalize_time_bound(raw: &str, bound: Bound) -> Result<String, String> {
    let raw = raw.trim();
    if let Some(ts) = parse_timestamp(raw) {
        return Ok(format_timestamp(ts));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{raw}': expected YYYY-MM-DD or RFC 3339"))?;
    let time = match bound {
        Bound::Start => date.and_hms_milli_opt(0, 0, 0, 0),
        Bound::End => date.and_hms_milli_opt(23, 59, 59, 999),
    }
    .ok_or_else(|| format!("Invalid date '{raw}'"))?;
    Ok(format_timestamp(time.and_utc()))
}

/// Sanitize an entity type into a PascalCase Neo4j label.
///
/// `"software engineer"` becomes `SoftwareEngineer`. Empty input and the
/// labels reserved by the storage layout map to `Concept`, except
/// `Document` which becomes `DocumentEntity` so the entity stays apart from
/// uploaded documents.
pub fn sanitize_label(raw: &str) -> String {
    let mut out = String::new();
    for word in raw.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'T');
    }
    out.truncate(MAX_IDENT_LEN);

    if out.is_empty() {
        return "Concept".to_string();
    }
    if RESERVED_LABELS.contains(&out.as_str()) {
        return match out.as_str() {
            "Document" => "DocumentEntity".to_string(),
            _ => "Concept".to_string(),
        };
    }
    out
}

/// Sanitize a relationship name into a SCREAMING_SNAKE relationship type.
///
/// `"works for"` and `"worksFor"` both become `WORKS_FOR`; empty input maps
/// to `RELATED_TO`.
pub fn sanitize_rel_type(raw: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_uppercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }

    let mut out = out.trim_matches('_').to_string();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "R_");
    }
    out.truncate(MAX_IDENT_LEN);
    let out = out.trim_end_matches('_').to_string();

    if out.is_empty() {
        "RELATED_TO".to_string()
    } else {
        out
    }
}

/// Escape Lucene query syntax so user text is searched literally.
///
/// Special characters are backslash-escaped and the boolean operators
/// `AND`, `OR` and `NOT` are lowercased into plain terms. Whitespace runs
/// collapse to single spaces.
pub fn escape_lucene(raw: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
        '/',
    ];
    let mut terms = Vec::new();
    for word in raw.split_whitespace() {
        if matches!(word, "AND" | "OR" | "NOT") {
            terms.push(word.to_ascii_lowercase());
            continue;
        }
        let mut term = String::with_capacity(word.len());
        for c in word.chars() {
            if SPECIAL.contains(&c) {
                term.push('\\');
            }
            term.push(c);
        }
        terms.push(term);
    }
    terms.join(" ")
}

/// Merge key for entities: lowercase with whitespace collapsed.
pub fn entity_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Build the node predicate used by visualization and timeline queries.
///
/// Parameters referenced: `$graph_id`, and when enabled `$start_date`,
/// `$end_date`, `$node_types`.
pub fn node_predicate(var: &str, start: bool, end: bool, node_types: bool) -> String {
    let mut conditions = vec![format!("{var}.graph_id = $graph_id")];
    if start {
        conditions.push(format!("{var}.timestamp >= $start_date"));
    }
    if end {
        conditions.push(format!("{var}.timestamp <= $end_date"));
    }
    if node_types {
        conditions.push(format!("any(l IN labels({var}) WHERE l IN $node_types)"));
    }
    conditions.join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("Person"), "Person");
        assert_eq!(sanitize_label("software engineer"), "SoftwareEngineer");
        assert_eq!(sanitize_label("org`) DETACH DELETE (n"), "OrgDETACHDELETEN");
        assert_eq!(sanitize_label(""), "Concept");
        assert_eq!(sanitize_label("  --  "), "Concept");
        assert_eq!(sanitize_label("3d model"), "T3dModel");
        assert_eq!(sanitize_label("episode"), "Concept");
        assert_eq!(sanitize_label("document"), "DocumentEntity");
    }

    #[test]
    fn test_sanitize_rel_type() {
        assert_eq!(sanitize_rel_type("works for"), "WORKS_FOR");
        assert_eq!(sanitize_rel_type("worksFor"), "WORKS_FOR");
        assert_eq!(sanitize_rel_type("FOUNDED_BY"), "FOUNDED_BY");
        assert_eq!(sanitize_rel_type("is-part-of"), "IS_PART_OF");
        assert_eq!(sanitize_rel_type("]->(x) DELETE x //"), "X_DELETE_X");
        assert_eq!(sanitize_rel_type(""), "RELATED_TO");
        assert_eq!(sanitize_rel_type("2nd cousin"), "R_2ND_COUSIN");
    }

    #[test]
    fn test_sanitized_identifiers_are_bounded() {
        let long = "a".repeat(200);
        assert!(sanitize_label(&long).len() <= MAX_IDENT_LEN);
        assert!(sanitize_rel_type(&long).len() <= MAX_IDENT_LEN);
    }

    #[test]
    fn test_escape_lucene() {
        assert_eq!(escape_lucene("plain words"), "plain words");
        assert_eq!(escape_lucene("C++ (lang)"), "C\\+\\+ \\(lang\\)");
        assert_eq!(escape_lucene("a:b && c"), "a\\:b \\&\\& c");
    }

    #[test]
    fn test_escape_lucene_neutralizes_boolean_operators() {
        assert_eq!(escape_lucene("cats OR"), "cats or");
        assert_eq!(escape_lucene("tell me about Ada AND"), "tell me about Ada and");
        assert_eq!(escape_lucene("NOT"), "not");
        assert_eq!(escape_lucene("  Ada\tNOT  Charles "), "Ada not Charles");
        assert_eq!(escape_lucene("ANDROID Oregon"), "ANDROID Oregon");
        assert_eq!(escape_lucene(""), "");
    }

    #[test]
    fn test_entity_key() {
        assert_eq!(entity_key("  Ada   Lovelace "), "ada lovelace");
        assert_eq!(entity_key("ADA LOVELACE"), entity_key("Ada Lovelace"));
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let a = format_timestamp("2024-01-02T03:04:05Z".parse().unwrap());
        let b = format_timestamp("2024-01-02T03:04:05.5Z".parse().unwrap());
        assert_eq!(a, "2024-01-02T03:04:05.000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp(&a).map(format_timestamp), Some(a));
    }

    #[test]
    fn test_normalize_time_bound() {
        assert_eq!(
            normalize_time_bound("2024-03-01", Bound::Start).unwrap(),
            "2024-03-01T00:00:00.000Z"
        );
        assert_eq!(
            normalize_time_bound("2024-03-01", Bound::End).unwrap(),
            "2024-03-01T23:59:59.999Z"
        );
        assert_eq!(
            normalize_time_bound("2024-03-01T12:00:00+02:00", Bound::Start).unwrap(),
            "2024-03-01T10:00:00.000Z"
        );
        assert!(normalize_time_bound("yesterday", Bound::End).is_err());
    }

    #[test]
    fn test_node_predicate() {
        assert_eq!(node_predicate("n", false, false, false), "n.graph_id = $graph_id");
        assert_eq!(
            node_predicate("n", true, true, true),
            "n.graph_id = $graph_id AND n.timestamp >= $start_date \
             AND n.timestamp <= $end_date AND any(l IN labels(n) WHERE l IN $node_types)"
        );
    }
}
