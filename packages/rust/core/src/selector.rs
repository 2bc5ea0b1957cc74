//! Decides which posts a run refreshes and whether the monthly post is due.

use std::path::Path;

use tracing::{debug, info, instrument};

use giftrefresh_shared::{
    PeriodKey, PostKind, RefreshError, Result, RunContext, SiteConfig, classify_post,
};

/// What the monthly phase should do this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthlyDecision {
    /// No archive post exists for the period; generate one.
    Create { filename: String },
    /// The period's archive post exists; only re-publish the redirect and catalog card.
    Republish { filename: String },
}

impl MonthlyDecision {
    /// Archive filename for the period, whichever way the decision went.
    pub fn filename(&self) -> &str {
        match self {
            Self::Create { filename } | Self::Republish { filename } => filename,
        }
    }
}

/// Output of [`select`].
#[derive(Debug, Clone)]
pub struct Selection {
    /// Posts to refresh, in processing order.
    pub candidates: Vec<String>,
    /// Every hand-authored post, candidates included (fed to the new-post prompt).
    pub content_posts: Vec<String>,
    /// Monthly phase decision.
    pub monthly: MonthlyDecision,
}

/// Scan the post directory and build the run's plan.
#[instrument(skip_all, fields(period = %ctx.period()))]
pub fn select(ctx: &RunContext) -> Result<Selection> {
    let files = list_posts(&ctx.blog_dir(), &ctx.config.site.extension)?;
    let site = &ctx.config.site;

    let content_posts = content_posts(&files, site);
    let candidates = pick_candidates(&files, site, ctx.config.refresh.max_files);
    let monthly = monthly_decision(&files, site, ctx.period(), ctx.archive_filename());

    info!(
        posts = files.len(),
        candidates = candidates.len(),
        monthly = ?monthly,
        "selection complete"
    );

    Ok(Selection {
        candidates,
        content_posts,
        monthly,
    })
}

/// Filenames in `dir` with the given extension, sorted.
pub fn list_posts(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| RefreshError::io(dir, e))?;
    let suffix = format!(".{extension}");

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RefreshError::io(dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| RefreshError::io(entry.path(), e))?
            .is_file();
        if !is_file {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if name.ends_with(&suffix) => files.push(name),
            Ok(_) => {}
            Err(raw) => debug!(?raw, "skipping non-UTF-8 filename"),
        }
    }

    files.sort();
    Ok(files)
}

/// Hand-authored posts: everything except the redirect record and archive posts.
pub fn content_posts(files: &[String], site: &SiteConfig) -> Vec<String> {
    let mut posts: Vec<String> = files
        .iter()
        .filter(|f| classify_post(f, site) == PostKind::Content)
        .cloned()
        .collect();
    posts.sort();
    posts
}

/// The lexicographically first `max` hand-authored posts.
pub fn pick_candidates(files: &[String], site: &SiteConfig, max: usize) -> Vec<String> {
    let mut posts = content_posts(files, site);
    posts.truncate(max);
    posts
}

/// Create unless an archive post already embeds `period`.
pub fn monthly_decision(
    files: &[String],
    site: &SiteConfig,
    period: PeriodKey,
    filename: String,
) -> MonthlyDecision {
    let exists = files.iter().any(|f| {
        matches!(
            classify_post(f, site),
            PostKind::Archive { period: Some(p) } if p == period
        )
    });

    if exists {
        MonthlyDecision::Republish { filename }
    } else {
        MonthlyDecision::Create { filename }
    }
}
