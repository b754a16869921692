//! CLI command handlers.
//!
//! This module contains the business logic for CLI commands,
//! separated from argument parsing for testability.

use crate::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Card fields shared by `card register` and `card update`.
#[derive(Debug, Clone, Default)]
pub struct CardInput {
    /// Contact for the card owner.
    pub contact: Option<String>,
    /// `key=value` tags.
    pub tags: Vec<String>,
    /// Card-type-specific fields as a JSON object.
    pub details: Option<String>,
    /// Artifact files, as `path` or `name=path`.
    pub artifacts: Vec<String>,
}

/// Build the version request for a registration.
///
/// For `pre`, `build` and `pre_build` the tags name the channels. For
/// numeric increments a build tag is appended verbatim as build metadata.
pub fn version_request(
    increment: &str,
    pre_tag: Option<&str>,
    build_tag: Option<&str>,
) -> Result<VersionRequest> {
    let increment = VersionIncrement::from_parts(increment, pre_tag, build_tag)?;
    let numeric = !increment.is_tagged();
    let request = VersionRequest::new(increment);
    Ok(match build_tag {
        Some(tag) if numeric => request.with_build_tag(tag),
        _ => request,
    })
}

/// Parse `key=value` tags.
pub fn parse_tags(tags: &[String]) -> Result<BTreeMap<String, String>> {
    tags.iter()
        .map(|tag| {
            tag.split_once('=')
                .filter(|(k, _)| !k.trim().is_empty())
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| CardexError::Validation(format!("tag '{tag}' must be key=value")))
        })
        .collect()
}

/// Parse card details from a JSON object; the `kind` key is implied by the
/// card type.
pub fn parse_details(card_type: CardType, json: &str) -> Result<CardDetails> {
    let mut value: serde_json::Value = serde_json::from_str(json)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| CardexError::Validation("details must be a JSON object".to_string()))?;
    object
        .entry("kind")
        .or_insert_with(|| serde_json::Value::String(card_type.to_string()));
    let details: CardDetails = serde_json::from_value(value)?;
    if details.card_type() != card_type {
        return Err(CardexError::Validation(format!(
            "{} details given for a {card_type} card",
            details.card_type()
        )));
    }
    Ok(details)
}

/// Read an artifact file given as `path` or `name=path`.
///
/// Without an explicit name the file stem is used; the suffix is the file
/// extension, or `bin` when there is none.
pub fn read_artifact(spec: &str) -> Result<Artifact> {
    let (name, path) = match spec.split_once('=') {
        Some((name, path)) => (Some(name.to_string()), PathBuf::from(path)),
        None => (None, PathBuf::from(spec)),
    };
    let name = match name {
        Some(name) => name,
        None => path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| CardexError::Validation(format!("cannot name artifact '{spec}'")))?,
    };
    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("bin")
        .to_string();
    let bytes = std::fs::read(&path)?;
    Ok(Artifact::new(name, suffix, bytes))
}

/// Handle `card register`.
pub fn handle_register(
    registry: &Registry,
    card_type: CardType,
    name: &str,
    repository: &str,
    version: Option<&str>,
    input: &CardInput,
    request: &VersionRequest,
) -> Result<CardRecord> {
    let contact = input
        .contact
        .clone()
        .ok_or_else(|| CardexError::Validation("--contact is required".to_string()))?;
    let mut card = Card::new(card_type, name, repository, contact);
    card.version = version.map(SemVer::parse).transpose()?;
    card.tags = parse_tags(&input.tags)?;
    if let Some(ref details) = input.details {
        card.details = parse_details(card_type, details)?;
    }
    for spec in &input.artifacts {
        card.add_artifact(read_artifact(spec)?);
    }

    match registry.register_card(&mut card, request)? {
        Registration::Registered(record) => Ok(record),
        // A freshly built card never carries a uid.
        Registration::AlreadyRegistered => Err(CardexError::Validation(
            "card was already registered".to_string(),
        )),
    }
}

/// Handle `card update`: merge the input into the stored record.
pub fn handle_update(
    registry: &Registry,
    card_type: CardType,
    uid: &str,
    input: &CardInput,
) -> Result<CardRecord> {
    let mut card = registry.load_card(card_type, uid)?.to_card();
    if let Some(ref contact) = input.contact {
        card.contact.clone_from(contact);
    }
    card.tags.extend(parse_tags(&input.tags)?);
    if let Some(ref details) = input.details {
        card.details = parse_details(card_type, details)?;
    }
    for spec in &input.artifacts {
        card.add_artifact(read_artifact(spec)?);
    }
    registry.update_card(&card)
}

/// Resolve a record by uid, or by name and repository plus an optional
/// version query.
pub fn resolve_record(
    registry: &Registry,
    card_type: CardType,
    uid: Option<&str>,
    name: Option<&str>,
    repository: Option<&str>,
    version: Option<&str>,
) -> Result<CardRecord> {
    match (uid, name, repository) {
        (Some(uid), _, _) => registry.load_card(card_type, uid),
        (None, Some(name), Some(repository)) => {
            registry.find_card(card_type, name, repository, version)
        }
        _ => Err(CardexError::Validation(
            "either --uid or both --name and --repository are required".to_string(),
        )),
    }
}

/// Handle `card download`.
pub fn handle_download(
    registry: &Registry,
    record: &CardRecord,
    artifact: Option<&str>,
    output: &Path,
) -> Result<Vec<PathBuf>> {
    registry.download_artifacts(record, artifact, output)
}

/// Format a record for display.
pub fn format_record(record: &CardRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Card: {record}");
    let _ = writeln!(out, "  UID:        {}", record.uid);
    let _ = writeln!(out, "  Contact:    {}", record.contact);
    match record.created_at() {
        Some(at) => {
            let _ = writeln!(out, "  Created:    {}", at.to_rfc3339());
        }
        None => {
            let _ = writeln!(out, "  Created:    {}", record.timestamp);
        }
    }
    let _ = writeln!(out, "  URI:        {}", record.uri);
    if !record.tags.is_empty() {
        out.push_str("  Tags:\n");
        for (k, v) in &record.tags {
            let _ = writeln!(out, "    {k}: {v}");
        }
    }
    let references = record.details.references();
    if !references.is_empty() {
        out.push_str("  References:\n");
        for (card_type, uid) in references {
            let _ = writeln!(out, "    {card_type}: {uid}");
        }
    }
    if !record.artifacts.is_empty() {
        out.push_str("  Artifacts:\n");
        for (name, stored) in &record.artifacts {
            let _ = writeln!(
                out,
                "    {name}: {} ({} bytes, {})",
                stored.path,
                stored.content.size(),
                stored.content.hash_hex()
            );
        }
    }
    out
}

/// Format records as one line each.
pub fn format_record_list(records: &[CardRecord]) -> String {
    let mut out = String::new();
    if records.is_empty() {
        out.push_str("No cards found.\n");
        return out;
    }
    for record in records {
        let _ = writeln!(
            out,
            "{:<20} {:<24} {:<20} {}",
            record.repository, record.name, record.version, record.uid
        );
    }
    out
}

/// Format a version list.
pub fn format_versions(name: &str, repository: &str, versions: &[SemVer]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Versions of '{repository}/{name}':");
    for version in versions {
        let _ = writeln!(out, "  {version}");
    }
    out
}

/// Format storage stats for display.
pub fn format_stats(stats: &StorageStats) -> String {
    let mut out = String::new();
    out.push_str("Registry Statistics:\n");
    for (card_type, count) in &stats.cards {
        let label = format!("{card_type}:");
        let _ = writeln!(out, "  {label:<10}{count}");
    }
    let _ = writeln!(out, "  {:<10}{}", "Artifacts:", stats.artifact_count);
    let _ = writeln!(out, "  {:<10}{} bytes", "Size:", stats.total_size_bytes);
    out
}
