//! Prompt composition.
//!
//! Static instruction templates are loaded once per run; each call merges
//! them with per-run context into a single prompt string. Nothing here
//! validates model output.

use std::path::Path;

use tracing::debug;

use giftrefresh_shared::{PeriodKey, RefreshError, Result, RunContext};

/// Meta description used for every archive post.
pub const MONTHLY_DESCRIPTION: &str = "Fresh teacher gift ideas and quick wins, updated monthly.";

/// The two static instruction templates.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    /// Instructions for refreshing an existing post.
    pub refresh: String,
    /// Instructions for writing the monthly post.
    pub new_post: String,
}

impl PromptTemplates {
    /// Read both templates from the paths in the run's config. Missing files are fatal.
    pub fn load(ctx: &RunContext) -> Result<Self> {
        let refresh = read_template(&ctx.site_path(&ctx.config.prompts.refresh))?;
        let new_post = read_template(&ctx.site_path(&ctx.config.prompts.new_post))?;
        Ok(Self { refresh, new_post })
    }
}

fn read_template(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| RefreshError::io(path, e))?;
    debug!(path = %path.display(), chars = text.len(), "loaded prompt template");
    Ok(text)
}

/// H1 / `<title>` of the archive post for `period`.
pub fn monthly_title(period: PeriodKey) -> String {
    format!("{} Teacher Gift Ideas & Quick Wins", period.month_name())
}

/// Prompt for rewriting `file`, whose current markup is `current_html`.
pub fn compose_refresh(
    templates: &PromptTemplates,
    ctx: &RunContext,
    file: &str,
    current_html: &str,
) -> String {
    let affiliate = &ctx.config.affiliate;
    format!(
        "\n{template}\n\nDATE: {date}\nFILE: {file}\n\n\
         REQUIREMENTS:\n\
         - Output ONLY the FULL updated HTML file, starting with <!doctype html>. No commentary.\n\
         - Maintain the existing header/nav/footer and CSS references exactly.\n\
         - If any {domain} links are present, ensure they include tag={tag}\n\
         - Keep content evergreen (no years in article content).\n\n\
         CURRENT HTML:\n{current_html}\n",
        template = templates.refresh.trim(),
        date = ctx.today.format("%Y-%m-%d"),
        domain = affiliate.marketplace_domain,
        tag = affiliate.tag,
    )
}

/// Prompt for the period's archive post. The model must return a content fragment only.
pub fn compose_new_post(
    templates: &PromptTemplates,
    ctx: &RunContext,
    title: &str,
    existing_posts: &[String],
) -> String {
    let affiliate = &ctx.config.affiliate;
    let related = if existing_posts.is_empty() {
        "(none yet)".to_string()
    } else {
        existing_posts
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "\n{template}\n\nDATE: {date}\nPOST TITLE (H1): {title}\n\n\
         HARD REQUIREMENTS (DO NOT VIOLATE):\n\
         - Output ONLY the inner HTML of the article. Do NOT include <!doctype>, <html>, <head> or <body>; the site template is added for you.\n\
         - Begin with <h1>{title}</h1>.\n\
         - Every gift idea MUST include a clickable <a> tag to a {domain} SEARCH URL (https://www.{domain}/s?k=...) that includes tag={tag}\n\
         - Use only search-style {domain} links. No product pages, no placeholder links, no plain text \"links\".\n\
         - Include a short affiliate disclosure near the bottom.\n\
         - Keep content evergreen (no years in article content).\n\
         - Link related posts with relative links to these existing files:\n{related}\n\n\
         Return ONLY the HTML fragment.\n",
        template = templates.new_post.trim(),
        date = ctx.today.format("%Y-%m-%d"),
        domain = affiliate.marketplace_domain,
        tag = affiliate.tag,
    )
}
