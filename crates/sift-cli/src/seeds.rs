use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One row of a crawl seeds file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Seed {
    pub url: String,
    /// Per-request schema override (registry path).
    #[serde(default)]
    pub schema: Option<String>,
}

/// Read a seeds CSV with a required `url` column and an optional `schema`
/// column. Rows with a blank URL are skipped.
pub fn read_seeds(path: &Path) -> Result<Vec<Seed>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open seeds file: {}", path.display()))?;

    let headers = reader.headers().context("Seeds file has no header row")?;
    if !headers.iter().any(|h| h == "url") {
        anyhow::bail!("Seeds file {} has no 'url' column", path.display());
    }

    let mut seeds = Vec::new();
    for (i, row) in reader.deserialize::<Seed>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let mut seed = row.with_context(|| format!("Invalid row at line {line}"))?;
        if seed.url.is_empty() {
            tracing::warn!(line, "Skipping seed with empty url");
            continue;
        }
        if seed.schema.as_deref().is_some_and(str::is_empty) {
            seed.schema = None;
        }
        seeds.push(seed);
    }

    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn seeds_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_url_only() {
        let file = seeds_file("url\nhttps://a.example/halls\nhttps://b.example/dorms\n");
        let seeds = read_seeds(file.path()).unwrap();
        assert_eq!(
            seeds,
            vec![
                Seed {
                    url: "https://a.example/halls".into(),
                    schema: None
                },
                Seed {
                    url: "https://b.example/dorms".into(),
                    schema: None
                },
            ]
        );
    }

    #[test]
    fn test_schema_column() {
        let file = seeds_file(
            "url,schema\n\
             https://a.example/halls,dorm_capacity.CapacityInfo\n\
             https://b.example/dorms,\n",
        );
        let seeds = read_seeds(file.path()).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].schema.as_deref(), Some("dorm_capacity.CapacityInfo"));
        assert_eq!(seeds[1].schema, None);
    }

    #[test]
    fn test_blank_urls_skipped() {
        let file = seeds_file("url,schema\n  ,x.Y\nhttps://a.example\n");
        let seeds = read_seeds(file.path()).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].url, "https://a.example");
    }

    #[test]
    fn test_missing_url_column() {
        let file = seeds_file("link\nhttps://a.example\n");
        let err = read_seeds(file.path()).unwrap_err();
        assert!(err.to_string().contains("no 'url' column"));
    }

    #[test]
    fn test_missing_file() {
        assert!(read_seeds(Path::new("/nonexistent/seeds.csv")).is_err());
    }
}
