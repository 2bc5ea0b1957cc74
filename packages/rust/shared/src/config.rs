//! Application configuration for the gift-refresh pipeline.
//!
//! Config lives at `<site root>/giftrefresh.toml` and is optional.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{RefreshError, Result};
use crate::types::PeriodKey;

/// Default configuration file name, looked up in the site root.
pub const CONFIG_FILE_NAME: &str = "giftrefresh.toml";

// ---------------------------------------------------------------------------
// Config structs (matching giftrefresh.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site layout on disk.
    #[serde(default)]
    pub site: SiteConfig,

    /// Affiliate settings.
    #[serde(default)]
    pub affiliate: AffiliateConfig,

    /// Refresh batch policy.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Prompt template locations.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Generation endpoint settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// `[site]` section. Paths are relative to the site root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Directory holding the post documents.
    #[serde(default = "default_blog_dir")]
    pub blog_dir: String,

    /// Listing page containing the monthly card.
    #[serde(default = "default_catalog_index")]
    pub catalog_index: String,

    /// Extension (without the dot) of post documents.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Filename prefix of dated archive posts.
    #[serde(default = "default_archive_prefix")]
    pub archive_prefix: String,

    /// Fixed filename of the stable redirect record.
    #[serde(default = "default_stable_redirect")]
    pub stable_redirect: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            blog_dir: default_blog_dir(),
            catalog_index: default_catalog_index(),
            extension: default_extension(),
            archive_prefix: default_archive_prefix(),
            stable_redirect: default_stable_redirect(),
        }
    }
}

fn default_blog_dir() -> String {
    "blog".into()
}
fn default_catalog_index() -> String {
    "blog.html".into()
}
fn default_extension() -> String {
    "html".into()
}
fn default_archive_prefix() -> String {
    "monthly-teacher-gift-refresh-".into()
}
fn default_stable_redirect() -> String {
    "monthly-teacher-gift-refresh.html".into()
}

/// `[affiliate]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffiliateConfig {
    /// Value of the `tag` query parameter.
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Marketplace domain whose links must carry the tag.
    #[serde(default = "default_marketplace_domain")]
    pub marketplace_domain: String,
}

impl Default for AffiliateConfig {
    fn default() -> Self {
        Self {
            tag: default_tag(),
            marketplace_domain: default_marketplace_domain(),
        }
    }
}

fn default_tag() -> String {
    "giftsforteacher-20".into()
}
fn default_marketplace_domain() -> String {
    "amazon.com".into()
}

/// `[refresh]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Maximum number of existing posts refreshed per run.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
        }
    }
}

fn default_max_files() -> usize {
    2
}

/// `[prompts]` section. Paths are relative to the site root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Instructions used when refreshing an existing post.
    #[serde(default = "default_refresh_prompt")]
    pub refresh: String,

    /// Instructions used when creating the monthly post.
    #[serde(default = "default_new_post_prompt")]
    pub new_post: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            refresh: default_refresh_prompt(),
            new_post: default_new_post_prompt(),
        }
    }
}

fn default_refresh_prompt() -> String {
    ".github/prompts/monthly_refresh_prompt.txt".into()
}
fn default_new_post_prompt() -> String {
    ".github/prompts/monthly_new_post_prompt.txt".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// API base URL; the account and model path are appended to it.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Slash-delimited model path.
    #[serde(default = "default_model")]
    pub model: String,

    /// Token budget per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name of the env var holding the account identifier.
    #[serde(default = "default_account_id_env")]
    pub account_id_env: String,

    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            account_id_env: default_account_id_env(),
            api_token_env: default_api_token_env(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.cloudflare.com/client/v4".into()
}
fn default_model() -> String {
    "@cf/meta/llama-3.1-8b-instruct-fast".into()
}
fn default_max_tokens() -> u32 {
    3500
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_account_id_env() -> String {
    "CLOUDFLARE_ACCOUNT_ID".into()
}
fn default_api_token_env() -> String {
    "CLOUDFLARE_API_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Endpoint credentials, resolved once at startup.
#[derive(Clone)]
pub struct Credentials {
    /// Account / tenant identifier embedded in the endpoint URL.
    pub account_id: String,
    /// Bearer token.
    pub api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read both credentials from the process environment.
    pub fn from_env(config: &GenerationConfig) -> Result<Self> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Resolve both credentials through `lookup`. Both are required.
    pub fn resolve(
        config: &GenerationConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let fetch = |var: &str| -> Option<String> {
            lookup(var).filter(|v| !v.trim().is_empty())
        };

        match (fetch(&config.account_id_env), fetch(&config.api_token_env)) {
            (Some(account_id), Some(api_token)) => Ok(Self {
                account_id,
                api_token,
            }),
            _ => Err(RefreshError::config(format!(
                "Missing {} or {}.",
                config.account_id_env, config.api_token_env
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Run context (immutable, one per invocation)
// ---------------------------------------------------------------------------

/// Everything a run needs to know, fixed before the first file is touched.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Current date at day resolution.
    pub today: NaiveDate,
    /// Root directory of the static site.
    pub site_root: PathBuf,
    /// Resolved configuration.
    pub config: AppConfig,
    /// Validate only; never write.
    pub dry_run: bool,
}

impl RunContext {
    /// Period key for `today`.
    pub fn period(&self) -> PeriodKey {
        PeriodKey::from_date(self.today)
    }

    /// Absolute path of the post directory.
    pub fn blog_dir(&self) -> PathBuf {
        self.site_root.join(&self.config.site.blog_dir)
    }

    /// Absolute path of the catalog index document.
    pub fn catalog_index_path(&self) -> PathBuf {
        self.site_root.join(&self.config.site.catalog_index)
    }

    /// Absolute path of the stable redirect record.
    pub fn stable_redirect_path(&self) -> PathBuf {
        self.blog_dir().join(&self.config.site.stable_redirect)
    }

    /// Site-relative href of the stable redirect record, as linked from the catalog.
    pub fn stable_redirect_href(&self) -> String {
        format!(
            "{}/{}",
            self.config.site.blog_dir.trim_end_matches('/'),
            self.config.site.stable_redirect
        )
    }

    /// Filename of the archive post for the current period.
    pub fn archive_filename(&self) -> String {
        format!(
            "{}{}.{}",
            self.config.site.archive_prefix,
            self.period(),
            self.config.site.extension
        )
    }

    /// Resolve a site-relative path.
    pub fn site_path(&self, relative: &str) -> PathBuf {
        self.site_root.join(relative)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the config for a site. Returns defaults if the file does not exist.
pub fn load_config(site_root: &Path) -> Result<AppConfig> {
    let path = site_root.join(CONFIG_FILE_NAME);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RefreshError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RefreshError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file into the site root.
/// Returns the path to the created file. An existing file is left alone.
pub fn init_config(site_root: &Path) -> Result<PathBuf> {
    let path = site_root.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(RefreshError::config(format!(
            "{} already exists",
            path.display()
        )));
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RefreshError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RefreshError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
