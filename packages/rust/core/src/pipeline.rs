//! End-to-end run: select → compose → generate → validate → publish.
//!
//! Refresh candidates are processed one at a time; a candidate that cannot
//! be read, generated or validated is logged and skipped. The monthly phase
//! runs once afterwards and any failure in it aborts the run.

use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use giftrefresh_generation::TextGenerator;
use giftrefresh_shared::{PeriodKey, RefreshError, Result, RunContext, RunId};

use crate::prompt::{self, PromptTemplates};
use crate::publisher::{MonthlyOutcome, Publisher, RefreshOutcome};
use crate::selector::{self, MonthlyDecision, Selection};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Status of one refresh candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub file: String,
    #[serde(flatten)]
    pub outcome: RefreshOutcome,
}

/// Everything a run did, in order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub date: NaiveDate,
    pub period: PeriodKey,
    pub dry_run: bool,
    pub candidates: Vec<CandidateReport>,
    pub monthly: MonthlyOutcome,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Candidates that were written (or would be, in a dry run).
    pub fn refreshed(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| {
                matches!(
                    c.outcome,
                    RefreshOutcome::Updated { .. } | RefreshOutcome::WouldUpdate { .. }
                )
            })
            .count()
    }

    /// Candidates skipped after a read, generation or validation failure.
    pub fn skipped(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| matches!(c.outcome, RefreshOutcome::Skipped { .. }))
            .count()
    }
}

/// Write the report as pretty JSON.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| RefreshError::parse(format!("failed to serialize run report: {e}")))?;
    std::fs::write(path, json).map_err(|e| RefreshError::io(path, e))
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each refresh candidate.
    fn candidate_done(&self, file: &str, outcome: &RefreshOutcome, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn candidate_done(
        &self,
        _file: &str,
        _outcome: &RefreshOutcome,
        _current: usize,
        _total: usize,
    ) {
    }
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run the whole pipeline once.
///
/// 1. Select refresh candidates and decide on the monthly post
/// 2. Refresh each candidate (failures isolated per candidate)
/// 3. Create or re-publish the monthly post (failures fatal)
#[instrument(skip_all, fields(date = %ctx.today, dry_run = ctx.dry_run))]
pub async fn run<G: TextGenerator>(
    ctx: &RunContext,
    templates: &PromptTemplates,
    generator: &G,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();
    let run_id = RunId::new();
    info!(%run_id, period = %ctx.period(), "starting refresh run");

    progress.phase("Selecting posts");
    let selection = selector::select(ctx)?;
    let publisher = Publisher::new(ctx)?;

    progress.phase("Refreshing existing posts");
    let candidates =
        refresh_posts(ctx, templates, generator, &publisher, &selection, progress).await?;

    progress.phase("Publishing monthly post");
    let monthly = monthly_post(ctx, templates, generator, &publisher, &selection).await?;

    let report = RunReport {
        run_id,
        date: ctx.today,
        period: ctx.period(),
        dry_run: ctx.dry_run,
        candidates,
        monthly,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        refreshed = report.refreshed(),
        skipped = report.skipped(),
        monthly = ?report.monthly.action,
        elapsed_ms = report.elapsed_ms,
        "refresh run complete"
    );
    progress.done(&report);

    Ok(report)
}

/// Refresh every selected candidate in order.
async fn refresh_posts<G: TextGenerator>(
    ctx: &RunContext,
    templates: &PromptTemplates,
    generator: &G,
    publisher: &Publisher<'_>,
    selection: &Selection,
    progress: &dyn ProgressReporter,
) -> Result<Vec<CandidateReport>> {
    let total = selection.candidates.len();
    let mut reports = Vec::with_capacity(total);

    for (i, file) in selection.candidates.iter().enumerate() {
        let outcome = match refresh_one(ctx, templates, generator, publisher, file).await {
            Ok(outcome @ RefreshOutcome::Skipped { .. }) => {
                warn!(file = %file, status = %outcome, "refresh skipped");
                outcome
            }
            Ok(outcome) => {
                info!(file = %file, status = %outcome, "refresh finished");
                outcome
            }
            Err(e) if e.is_candidate_scoped() => {
                error!(file = %file, error = %e, "refresh failed; skipping write");
                RefreshOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };

        progress.candidate_done(file, &outcome, i + 1, total);
        reports.push(CandidateReport {
            file: file.clone(),
            outcome,
        });
    }

    Ok(reports)
}

/// Compose, generate and publish a single refresh.
#[instrument(skip(ctx, templates, generator, publisher))]
async fn refresh_one<G: TextGenerator>(
    ctx: &RunContext,
    templates: &PromptTemplates,
    generator: &G,
    publisher: &Publisher<'_>,
    file: &str,
) -> Result<RefreshOutcome> {
    let path = ctx.blog_dir().join(file);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return Ok(RefreshOutcome::Skipped {
                reason: RefreshError::io(&path, e).to_string(),
            });
        }
    };
    // Stray non-UTF-8 bytes are replaced rather than failing the post.
    let current = String::from_utf8_lossy(&bytes).into_owned();

    let prompt = prompt::compose_refresh(templates, ctx, file, &current);
    let generated = generator
        .generate(&prompt, ctx.config.generation.max_tokens)
        .await?;

    publisher.publish_refresh(file, &current, &generated)
}

/// Create this period's archive post, or re-publish it if it already exists.
#[instrument(skip_all, fields(archive = %selection.monthly.filename()))]
async fn monthly_post<G: TextGenerator>(
    ctx: &RunContext,
    templates: &PromptTemplates,
    generator: &G,
    publisher: &Publisher<'_>,
    selection: &Selection,
) -> Result<MonthlyOutcome> {
    match &selection.monthly {
        MonthlyDecision::Republish { filename } => publisher.republish_existing(filename),
        MonthlyDecision::Create { filename } => {
            let title = prompt::monthly_title(ctx.period());
            let prompt =
                prompt::compose_new_post(templates, ctx, &title, &selection.content_posts);

            let generated = generator
                .generate(&prompt, ctx.config.generation.max_tokens)
                .await
                .inspect_err(|e| error!(error = %e, "monthly post generation failed"))?;

            publisher.publish_monthly(filename, &generated).inspect_err(|e| {
                warn!(error = %e, "monthly post rejected; nothing written");
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::publisher::{CardStatus, MonthlyAction};
    use giftrefresh_markup::{monthly_card_hrefs, redirect_target};
    use giftrefresh_shared::AppConfig;

    /// Replays canned replies in order and records every prompt it saw.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RefreshError::EmptyResponse))
        }
    }

    fn fixture(rel: &str) -> String {
        let path = format!("../../../fixtures/{rel}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    /// A throwaway site with `posts` in the blog dir and the fixture catalog + prompts.
    fn site(posts: &[&str]) -> RunContext {
        let root = std::env::temp_dir().join(format!("gr-pipeline-test-{}", uuid::Uuid::now_v7()));
        let prompts = root.join(".github").join("prompts");
        std::fs::create_dir_all(root.join("blog")).unwrap();
        std::fs::create_dir_all(&prompts).unwrap();

        std::fs::write(root.join("blog.html"), fixture("site/blog.html")).unwrap();
        std::fs::write(
            prompts.join("monthly_refresh_prompt.txt"),
            fixture("prompts/monthly_refresh_prompt.txt"),
        )
        .unwrap();
        std::fs::write(
            prompts.join("monthly_new_post_prompt.txt"),
            fixture("prompts/monthly_new_post_prompt.txt"),
        )
        .unwrap();
        for post in posts {
            std::fs::write(
                root.join("blog").join(post),
                format!("<!doctype html>\n<html><body><h1>{post}</h1></body></html>\n"),
            )
            .unwrap();
        }

        RunContext {
            today: NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            site_root: root,
            config: AppConfig::default(),
            dry_run: false,
        }
    }

    fn read(path: PathBuf) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    fn archives(ctx: &RunContext) -> Vec<String> {
        selector::list_posts(&ctx.blog_dir(), "html")
            .unwrap()
            .into_iter()
            .filter(|f| f.starts_with("monthly-teacher-gift-refresh-"))
            .collect()
    }

    #[tokio::test]
    async fn end_to_end_run() {
        let ctx = site(&["a.html", "b.html", "z.html"]);
        let templates = PromptTemplates::load(&ctx).unwrap();
        let z_before = read(ctx.blog_dir().join("z.html"));

        let generator = ScriptedGenerator::new(vec![
            Ok(fixture("generated/refreshed-post.html")),
            Ok(fixture("generated/refreshed-post.html").replace("Under $20", "Under $25")),
            Ok(fixture("generated/monthly-fragment.html")),
        ]);

        let report = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap();

        let files: Vec<&str> = report.candidates.iter().map(|c| c.file.as_str()).collect();
        assert_eq!(files, ["a.html", "b.html"]);
        assert_eq!(report.refreshed(), 2);
        assert_eq!(report.period.to_string(), "2025-06");

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("FILE: a.html"));
        assert!(prompts[1].contains("FILE: b.html"));
        assert!(prompts[2].contains("POST TITLE (H1): June Teacher Gift Ideas & Quick Wins"));

        let a = read(ctx.blog_dir().join("a.html"));
        assert!(a.contains("Teacher Gifts Under $20"));
        assert!(!a.contains("/dp/B0CLASSMUG\""));
        assert!(a.contains("/dp/B0CLASSMUG?tag=giftsforteacher-20"));
        assert!(read(ctx.blog_dir().join("b.html")).contains("Under $25"));
        assert_eq!(read(ctx.blog_dir().join("z.html")), z_before);

        let archive = "monthly-teacher-gift-refresh-2025-06.html";
        assert_eq!(report.monthly.archive, archive);
        assert_eq!(report.monthly.action, MonthlyAction::Created);
        let post = read(ctx.blog_dir().join(archive));
        assert!(post.contains("<section class=\"blog-post\">\n<h1>June Teacher Gift Ideas"));

        let redirect = read(ctx.stable_redirect_path());
        assert_eq!(redirect_target(&redirect).as_deref(), Some(archive));

        let catalog = read(ctx.catalog_index_path());
        assert_eq!(monthly_card_hrefs(&catalog), vec![ctx.stable_redirect_href()]);

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn monthly_creation_is_idempotent_within_a_period() {
        let ctx = site(&["a.html"]);
        let templates = PromptTemplates::load(&ctx).unwrap();
        let refreshed = fixture("generated/refreshed-post.html");

        let first = ScriptedGenerator::new(vec![
            Ok(refreshed.clone()),
            Ok(fixture("generated/monthly-fragment.html")),
        ]);
        let report = run(&ctx, &templates, &first, &SilentProgress).await.unwrap();
        assert_eq!(report.monthly.action, MonthlyAction::Created);
        let redirect_first = read(ctx.stable_redirect_path());
        let catalog_first = read(ctx.catalog_index_path());
        let archive_first = read(ctx.blog_dir().join(&report.monthly.archive));

        // Second run: only the refresh call is made.
        let second = ScriptedGenerator::new(vec![Ok(refreshed)]);
        let report = run(&ctx, &templates, &second, &SilentProgress).await.unwrap();
        assert_eq!(second.prompts().len(), 1);
        assert_eq!(report.monthly.action, MonthlyAction::AlreadyExists);
        assert_eq!(report.monthly.card, CardStatus::AlreadyCurrent);
        assert_eq!(report.candidates[0].outcome, RefreshOutcome::Unchanged);

        assert_eq!(archives(&ctx), vec!["monthly-teacher-gift-refresh-2025-06.html"]);
        assert_eq!(read(ctx.stable_redirect_path()), redirect_first);
        assert_eq!(read(ctx.catalog_index_path()), catalog_first);
        assert_eq!(read(ctx.blog_dir().join(&report.monthly.archive)), archive_first);

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn refresh_failures_are_isolated() {
        let mut ctx = site(&["a.html", "b.html", "c.html"]);
        ctx.config.refresh.max_files = 3;
        let templates = PromptTemplates::load(&ctx).unwrap();
        let a_before = read(ctx.blog_dir().join("a.html"));
        let b_before = read(ctx.blog_dir().join("b.html"));

        let generator = ScriptedGenerator::new(vec![
            Ok("Here are some ideas: <ul><li>Mugs</li></ul>".to_string()),
            Err(RefreshError::Upstream {
                status: 503,
                body: "overloaded".into(),
            }),
            Ok(fixture("generated/refreshed-post.html")),
            Ok(fixture("generated/monthly-fragment.html")),
        ]);

        let report = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.skipped(), 2);
        assert_eq!(report.refreshed(), 1);
        assert!(matches!(
            &report.candidates[0].outcome,
            RefreshOutcome::Skipped { reason } if reason.contains("no valid HTML")
        ));
        assert!(matches!(
            &report.candidates[1].outcome,
            RefreshOutcome::Skipped { reason } if reason.contains("503")
        ));
        assert_eq!(read(ctx.blog_dir().join("a.html")), a_before);
        assert_eq!(read(ctx.blog_dir().join("b.html")), b_before);
        assert_eq!(report.monthly.action, MonthlyAction::Created);

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn undecodable_post_does_not_stop_the_run() {
        let ctx = site(&["b.html"]);
        std::fs::write(ctx.blog_dir().join("a.html"), b"<html>caf\xe9</html>").unwrap();
        let templates = PromptTemplates::load(&ctx).unwrap();

        let generator = ScriptedGenerator::new(vec![
            Ok(fixture("generated/refreshed-post.html")),
            Ok(fixture("generated/refreshed-post.html")),
            Ok(fixture("generated/monthly-fragment.html")),
        ]);
        let report = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap();

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("<html>caf\u{FFFD}</html>"));
        assert_eq!(report.refreshed(), 2);
        assert!(read(ctx.blog_dir().join("b.html")).contains("Teacher Gifts Under $20"));
        assert_eq!(report.monthly.action, MonthlyAction::Created);

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn unreadable_post_is_skipped() {
        let ctx = site(&[]);
        let templates = PromptTemplates::load(&ctx).unwrap();
        let publisher = Publisher::new(&ctx).unwrap();
        let generator = ScriptedGenerator::new(vec![]);

        let outcome = refresh_one(&ctx, &templates, &generator, &publisher, "vanished.html")
            .await
            .unwrap();
        assert!(matches!(
            &outcome,
            RefreshOutcome::Skipped { reason } if reason.contains("vanished.html")
        ));
        assert!(generator.prompts().is_empty());

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn monthly_rejection_is_fatal() {
        let ctx = site(&["a.html"]);
        let templates = PromptTemplates::load(&ctx).unwrap();
        let catalog_before = read(ctx.catalog_index_path());

        let full_document = format!(
            "<!DOCTYPE html><html><body>{}</body></html>",
            fixture("generated/monthly-fragment.html")
        );
        let generator = ScriptedGenerator::new(vec![
            Ok(fixture("generated/refreshed-post.html")),
            Ok(full_document),
        ]);

        let err = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Validation { .. }));

        assert!(archives(&ctx).is_empty());
        assert!(!ctx.stable_redirect_path().exists());
        assert_eq!(read(ctx.catalog_index_path()), catalog_before);
        // The refresh phase already committed before the monthly phase failed.
        assert!(read(ctx.blog_dir().join("a.html")).contains("Teacher Gifts Under $20"));

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn monthly_upstream_error_is_fatal() {
        let ctx = site(&[]);
        let templates = PromptTemplates::load(&ctx).unwrap();
        let generator = ScriptedGenerator::new(vec![Err(RefreshError::Upstream {
            status: 500,
            body: "boom".into(),
        })]);

        let err = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Upstream { status: 500, .. }));
        assert!(archives(&ctx).is_empty());

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn bounded_batch_takes_lexicographic_first() {
        let ctx = site(&["d.html", "c.html", "b.html", "a.html", "e.html"]);
        let templates = PromptTemplates::load(&ctx).unwrap();
        std::fs::write(ctx.blog_dir().join("monthly-teacher-gift-refresh-2025-06.html"), "x")
            .unwrap();

        let generator = ScriptedGenerator::new(vec![
            Ok(fixture("generated/refreshed-post.html")),
            Ok(fixture("generated/refreshed-post.html")),
        ]);
        let report = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap();

        let files: Vec<&str> = report.candidates.iter().map(|c| c.file.as_str()).collect();
        assert_eq!(files, ["a.html", "b.html"]);
        assert_eq!(generator.prompts().len(), 2);
        assert_eq!(report.monthly.action, MonthlyAction::AlreadyExists);

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn missing_blog_dir_is_fatal_before_generation() {
        let ctx = site(&[]);
        std::fs::remove_dir_all(ctx.blog_dir()).unwrap();
        let templates = PromptTemplates::load(&ctx).unwrap();
        let generator = ScriptedGenerator::new(vec![]);

        let err = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Io { .. }));
        assert!(generator.prompts().is_empty());

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }

    #[tokio::test]
    async fn report_serializes() {
        let ctx = site(&["a.html"]);
        let templates = PromptTemplates::load(&ctx).unwrap();
        let generator = ScriptedGenerator::new(vec![
            Err(RefreshError::EmptyResponse),
            Ok(fixture("generated/monthly-fragment.html")),
        ]);
        let report = run(&ctx, &templates, &generator, &SilentProgress)
            .await
            .unwrap();

        let path = ctx.site_root.join("report.json");
        write_report(&path, &report).unwrap();
        let json: serde_json::Value = serde_json::from_str(&read(path)).unwrap();
        assert_eq!(json["period"], "2025-06");
        assert_eq!(json["candidates"][0]["file"], "a.html");
        assert_eq!(json["candidates"][0]["status"], "skipped");
        assert_eq!(json["monthly"]["action"], "created");
        assert_eq!(json["monthly"]["card"], "updated");

        std::fs::remove_dir_all(&ctx.site_root).ok();
    }
}
