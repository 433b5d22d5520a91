use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rsmetrics_core::context::DEFAULT_TOP_K;
use rsmetrics_core::models::{ItemType, Schema};
use rsmetrics_core::normalize::RecommendationShape;
use rsmetrics_core::paths::{PathPatterns, PathRules};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvaluationConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// A recommendation provider whose output can be evaluated.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub name: String,
    /// Item types that make up this provider's catalog. Empty means all.
    #[serde(default)]
    pub item_types: Vec<ItemType>,
    /// Recommendations carry parallel `resource_ids` / `resource_scores`
    /// lists that are zipped into rows.
    #[serde(default)]
    pub zip_scores: bool,
}

impl ProviderConfig {
    pub fn shape(&self) -> RecommendationShape {
        if self.zip_scores {
            RecommendationShape::ZipScores
        } else {
            RecommendationShape::Unwind
        }
    }
}

/// Per-schema path pattern overrides.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PathsConfig {
    pub legacy: Option<PathPatterns>,
    pub current: Option<PathPatterns>,
}

impl PathsConfig {
    pub fn patterns(&self, schema: Schema) -> PathPatterns {
        let configured = match schema {
            Schema::Legacy => self.legacy.as_ref(),
            Schema::Current => self.current.as_ref(),
        };
        configured
            .cloned()
            .unwrap_or_else(|| PathPatterns::default_for(schema))
    }

    pub fn rules(&self, schema: Schema) -> Result<PathRules> {
        PathRules::compile(&self.patterns(schema))
            .with_context(|| format!("Invalid [paths.{}] configuration", schema))
    }
}

impl Config {
    /// Look up a provider by name, or the first configured provider.
    pub fn provider(&self, name: Option<&str>) -> Result<&ProviderConfig> {
        match name {
            Some(name) => self
                .providers
                .iter()
                .find(|p| p.name == name)
                .with_context(|| {
                    let known: Vec<&str> = self.providers.iter().map(|p| p.name.as_str()).collect();
                    format!(
                        "Unknown provider: '{}'. Configured providers: {}",
                        name,
                        known.join(", ")
                    )
                }),
            None => self
                .providers
                .first()
                .context("No providers configured"),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.evaluation.top_k == 0 {
        bail!("evaluation.top_k must be > 0");
    }

    // Validate providers
    if config.providers.is_empty() {
        bail!("At least one [[providers]] entry is required");
    }
    let mut seen = HashSet::new();
    for provider in &config.providers {
        if provider.name.trim().is_empty() {
            bail!("providers.name must not be empty");
        }
        if !seen.insert(provider.name.as_str()) {
            bail!("Duplicate provider name: '{}'", provider.name);
        }
    }

    // Validate path patterns for both schemas
    for schema in [Schema::Legacy, Schema::Current] {
        config.paths.rules(schema)?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[db]
path = "./data/rsmetrics.sqlite"

[[providers]]
name = "marketplace_rs"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.evaluation.top_k, 5);
        assert_eq!(config.provider(None).unwrap().name, "marketplace_rs");
        assert_eq!(
            config.paths.patterns(Schema::Legacy),
            PathPatterns::default_for(Schema::Legacy)
        );
    }

    #[test]
    fn providers_and_overrides() {
        let file = write_config(
            r#"
[db]
path = "db.sqlite"

[evaluation]
top_k = 3

[[providers]]
name = "marketplace_rs"
item_types = ["service", "data_source"]

[[providers]]
name = "athena"
zip_scores = true

[paths.current]
search_pages = ["/catalog/search*"]
recommendation_surfaces = ["/catalog/*"]
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.evaluation.top_k, 3);
        let athena = config.provider(Some("athena")).unwrap();
        assert_eq!(athena.shape(), RecommendationShape::ZipScores);
        let rs = config.provider(Some("marketplace_rs")).unwrap();
        assert_eq!(rs.item_types, vec![ItemType::Service, ItemType::DataSource]);
        assert!(config
            .paths
            .rules(Schema::Current)
            .unwrap()
            .is_search_page("/catalog/search?q=x"));
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        let err = config.provider(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn rejects_invalid_configs() {
        let cases = [
            "[db]\npath = \"x\"\n",
            "[db]\npath = \"x\"\n[evaluation]\ntop_k = 0\n[[providers]]\nname = \"a\"\n",
            "[db]\npath = \"x\"\n[[providers]]\nname = \"a\"\n[[providers]]\nname = \"a\"\n",
            "[db]\npath = \"x\"\n[[providers]]\nname = \" \"\n",
            "[db]\npath = \"x\"\n[[providers]]\nname = \"a\"\n[paths.legacy]\nsearch_pages = [\"[\"]\n",
            "[db\npath = \"x\"\n",
        ];
        for body in cases {
            let file = write_config(body);
            assert!(load_config(file.path()).is_err(), "accepted: {}", body);
        }
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_config(Path::new("/nonexistent/rsmetrics.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
