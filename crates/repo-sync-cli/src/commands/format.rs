use std::collections::BTreeSet;

use repo_sync::{ContentSummary, ContentUnit, KindCounts};

const MAX_NAME_WIDTH: usize = 35;
const ATTRIBUTE_BUDGET: usize = 60;

/// Print units grouped by kind, one per line.
pub fn print_unit_table(units: &[ContentUnit]) {
    if units.is_empty() {
        println!("(no content)");
        return;
    }

    let name_width = units
        .iter()
        .map(|u| u.name().chars().count())
        .max()
        .unwrap_or(0)
        .min(MAX_NAME_WIDTH);

    let mut current_kind: Option<&str> = None;
    for unit in units {
        if current_kind != Some(unit.kind()) {
            if current_kind.is_some() {
                println!();
            }
            let count = units.iter().filter(|u| u.kind() == unit.kind()).count();
            println!("{} ({count})", unit.kind());
            current_kind = Some(unit.kind());
        }

        let name = truncate(unit.name(), name_width);
        println!(
            "  {:<width$}  {:<16}  {}",
            name,
            unit.version(),
            truncate(&attribute_text(unit), ATTRIBUTE_BUDGET),
            width = name_width
        );
    }

    println!("\n{} units", units.len());
}

/// Print the units a sync added or removed, prefixed with `+` or `-`.
pub fn print_changes(added: &BTreeSet<ContentUnit>, removed: &BTreeSet<ContentUnit>) {
    for unit in added {
        println!("  + {unit}");
    }
    for unit in removed {
        println!("  - {unit}");
    }
}

/// One-line rendering of a version summary, e.g. `gem: 3 present, +1 -0`.
pub fn summary_line(summary: &ContentSummary) -> String {
    if summary.present.is_empty() && summary.added.is_empty() && summary.removed.is_empty() {
        return "empty".to_owned();
    }

    let kinds: BTreeSet<&String> = summary
        .present
        .keys()
        .chain(summary.added.keys())
        .chain(summary.removed.keys())
        .collect();

    kinds
        .into_iter()
        .map(|kind| {
            format!(
                "{kind}: {} present, +{} -{}",
                count(&summary.present, kind),
                count(&summary.added, kind),
                count(&summary.removed, kind)
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn count(counts: &KindCounts, kind: &str) -> u64 {
    counts.get(kind).copied().unwrap_or(0)
}

fn attribute_text(unit: &ContentUnit) -> String {
    unit.attributes()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}
