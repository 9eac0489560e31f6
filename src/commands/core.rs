//! Core command handlers: check, add, stats, cleanup.

use super::filter::FilterSnapshots;
use super::{Output, open_service, read_text};
use echoless::config::EcholessConfig;
use echoless::models::{Category, ContentId, OwnerId};
use echoless::{FailurePolicy, SimilarityVerdict};
use std::process::ExitCode;

/// Arguments of the check command.
pub struct CheckArgs<'a> {
    /// Owner id.
    pub owner: &'a str,
    /// Candidate text or `-`.
    pub text: &'a str,
    /// Optional category.
    pub category: Option<&'a str>,
    /// Fail open on upstream errors.
    pub fail_open: bool,
    /// Exit with status 2 on a duplicate.
    pub exit_code: bool,
}

fn parse_category(category: Option<&str>) -> Option<Category> {
    category.and_then(Category::parse)
}

/// Check command.
pub fn cmd_check(
    config: &EcholessConfig,
    output: Output,
    args: &CheckArgs<'_>,
) -> anyhow::Result<ExitCode> {
    let service = open_service(config)?;
    let owner = OwnerId::new(args.owner);
    let text = read_text(args.text)?;
    let category = parse_category(args.category);
    FilterSnapshots::new(config).restore(&service, &owner)?;

    let policy = if args.fail_open {
        FailurePolicy::FailOpen
    } else {
        FailurePolicy::FailClosed
    };
    let verdict = service.check_with_policy(&owner, &text, None, category.as_ref(), policy)?;

    if output.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict);
    }

    Ok(if args.exit_code && verdict.is_duplicate {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_verdict(verdict: &SimilarityVerdict) {
    if verdict.is_duplicate {
        println!(
            "Duplicate ({}), confidence {:.3}",
            verdict.reason, verdict.confidence
        );
    } else {
        println!("Not a duplicate");
    }

    let details = &verdict.details;
    if let Some(score) = details.lexical_score {
        println!("  Lexical filter score: {score:.3}");
    }
    if let Some(similarity) = details.confirmed_similarity {
        println!("  Confirmed trigram similarity: {similarity:.3}");
    }
    for m in &details.semantic_matches {
        println!(
            "  Similar: {} ({:.3}, shown {}) {}",
            m.id,
            m.similarity,
            format_timestamp(m.created_at),
            m.text
        );
    }
    if let Some(error) = &details.error {
        println!("  Semantic check skipped: {error}");
    }
    println!("  Took {} ms", details.check_duration_ms);
}

/// Formats a Unix timestamp as a UTC datetime string.
fn format_timestamp(ts: u64) -> String {
    chrono::DateTime::from_timestamp(i64::try_from(ts).unwrap_or(0), 0).map_or_else(
        || "unknown".to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

/// Add command.
pub fn cmd_add(
    config: &EcholessConfig,
    output: Output,
    owner: &str,
    text: &str,
    id: Option<&str>,
    category: Option<&str>,
) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let owner = OwnerId::new(owner);
    let text = read_text(text)?;
    let category = parse_category(category);
    let id = id.map_or_else(ContentId::generate, ContentId::new);

    let snapshots = FilterSnapshots::new(config);
    let restored = snapshots.restore(&service, &owner)?;
    service.add_content(&id, &owner, &text, None, category.as_ref())?;
    if restored {
        snapshots.save(&service, &owner)?;
    }

    if output.json {
        println!("{}", serde_json::json!({ "id": id, "owner": owner }));
    } else {
        println!("Added {id} for {owner}");
    }
    Ok(())
}

/// Stats command.
pub fn cmd_stats(config: &EcholessConfig, output: Output, owner: Option<&str>) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let owner = owner.map(OwnerId::new);
    if let Some(owner) = &owner
        && !FilterSnapshots::new(config).restore(&service, owner)?
    {
        service.rehydrate(owner)?;
    }

    let stats = service.get_stats(owner.as_ref())?;
    if output.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    match &stats.owner {
        Some(owner) => println!("Owner: {owner}"),
        None => println!("All owners"),
    }
    println!("  Stored items: {}", stats.stored_items);
    println!("  Stored embeddings: {}", stats.stored_embeddings);
    println!(
        "  Layers: lexical={} semantic={}",
        stats.lexical_enabled, stats.semantic_enabled
    );
    if let Some(lexical) = &stats.lexical {
        println!(
            "  Filter: {} bits, {} hashes, {} elements, {} bits set",
            lexical.filter.size,
            lexical.filter.hash_function_count,
            lexical.filter.element_count,
            lexical.filter.bits_set
        );
        println!(
            "  Estimated false positive rate: {:.6}",
            lexical.filter.estimated_false_positive_rate
        );
        println!("  Recent texts held: {}", lexical.recent_texts);
    }
    Ok(())
}

/// Cleanup command.
pub fn cmd_cleanup(config: &EcholessConfig, output: Output) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let cleaned = service.cleanup_old_embeddings()?;
    if output.json {
        println!("{}", serde_json::json!({ "cleaned": cleaned }));
    } else {
        println!("Removed {cleaned} expired embeddings");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20");
        assert_eq!(format_timestamp(u64::MAX), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category(Some(" Focus ")), Some(Category::new("focus")));
        assert_eq!(parse_category(Some("  ")), None);
        assert_eq!(parse_category(None), None);
    }
}
