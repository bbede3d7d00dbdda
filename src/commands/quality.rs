use anyhow::Result;
use tracing::{info, warn};

use crate::cli::QualityArgs;
use crate::commands::harness;
use crate::semantic::{embed_text_local, normalize_whitespace};
use crate::service::{IndexService, SearchRequest};
use crate::util::write_stdout;

const COLUMN_WIDTH: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct QualityColumn {
    pub scenario: String,
    pub titles: Vec<String>,
}

pub fn run(args: QualityArgs) -> Result<()> {
    let config = harness::resolve_config(&args.harness, &args.harness.overrides())?;
    let scenarios = harness::load_catalog()?;
    let service = harness::open_service(&args.harness, &config)?;

    let query = normalize_whitespace(&args.query);
    let request = SearchRequest {
        vector: embed_text_local(&query, config.vector_dimensions),
        query_text: query,
        k_nearest: args.k_nearest,
        top: args.top,
    };

    let mut columns = Vec::<QualityColumn>::with_capacity(scenarios.len());
    for scenario in &scenarios {
        let index_name = scenario.index_name(&config.index_prefix);
        match service.search(&index_name, &request) {
            Ok(hits) => {
                info!(index = %index_name, hits = hits.len(), "search completed");
                columns.push(QualityColumn {
                    scenario: scenario.name().to_string(),
                    titles: hits.into_iter().map(|hit| hit.title).collect(),
                });
            }
            Err(err) => {
                warn!(index = %index_name, error = %err, "search failed; scenario skipped");
            }
        }
    }

    if columns.is_empty() {
        warn!(query = %request.query_text, "no scenario index could be searched");
        return Ok(());
    }

    write_stdout(&render_quality_table(&columns, args.top))
}

/// One column per scenario, one row per rank.
pub fn render_quality_table(columns: &[QualityColumn], top: usize) -> String {
    let mut out = String::new();

    out.push_str(&format!("{:<6}", "Rank"));
    for column in columns {
        out.push_str(&format!(" | {}", fit(&column.scenario)));
    }
    out.push('\n');
    out.push_str(&"-".repeat(6 + columns.len() * (COLUMN_WIDTH + 3)));
    out.push('\n');

    for rank in 0..top {
        out.push_str(&format!("{:<6}", rank + 1));
        for column in columns {
            let title = column.titles.get(rank).map(String::as_str).unwrap_or("");
            out.push_str(&format!(" | {}", fit(title)));
        }
        out.push('\n');
    }

    out
}

fn fit(value: &str) -> String {
    let count = value.chars().count();
    if count <= COLUMN_WIDTH {
        return format!("{value:<width$}", width = COLUMN_WIDTH);
    }
    let mut clipped = value.chars().take(COLUMN_WIDTH - 3).collect::<String>();
    clipped.push_str("...");
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_table_aligns_columns_and_pads_missing_ranks() {
        let columns = vec![
            QualityColumn {
                scenario: "baseline".to_string(),
                titles: vec!["Archaeopteryx 0".to_string(), "Archaeopteryx 1".to_string()],
            },
            QualityColumn {
                scenario: "binary-truncated-discard".to_string(),
                titles: vec!["Archaeopteryx 1".to_string()],
            },
        ];

        let table = render_quality_table(&columns, 3);
        let lines = table.lines().collect::<Vec<&str>>();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Rank"));
        assert!(lines[0].contains("binary-truncated-discard"));
        assert!(lines[2].contains("Archaeopteryx 0"));
        assert!(lines[3].starts_with("2"));
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|line| line.chars().count() == width));
    }

    #[test]
    fn long_titles_are_clipped_to_column_width() {
        let clipped = fit(&"x".repeat(50));
        assert_eq!(clipped.chars().count(), COLUMN_WIDTH);
        assert!(clipped.ends_with("..."));
    }
}
