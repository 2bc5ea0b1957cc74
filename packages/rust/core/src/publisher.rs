//! Validates generated markup and commits it to the site.
//!
//! Validation always runs before any write. Each file is written to a temp
//! sibling and renamed into place, so a post is either its old bytes or its
//! new bytes, never a partial write.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use giftrefresh_markup::{
    AffiliateLinks, CardUpdate, SitePage, has_document_structure, is_full_document,
    monthly_card_hrefs, point_monthly_card, redirect_document, wrap_in_site_template,
};
use giftrefresh_shared::{PeriodKey, RefreshError, Result, RunContext};

use crate::prompt::{MONTHLY_DESCRIPTION, monthly_title};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of refreshing one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// New content written.
    Updated { sha256: String },
    /// Accepted content identical to what is on disk; nothing written.
    Unchanged,
    /// Dry run: content accepted but not written.
    WouldUpdate { sha256: String },
    /// Generation or validation failed; the file was left untouched.
    Skipped { reason: String },
}

impl std::fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Updated { .. } => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::WouldUpdate { .. } => write!(f, "would update"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// What happened to the period's archive post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthlyAction {
    Created,
    AlreadyExists,
    WouldCreate,
}

/// State of the catalog index's monthly card after publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Updated,
    AlreadyCurrent,
    WouldUpdate,
    CardMissing,
    IndexMissing,
}

/// Result of the monthly phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyOutcome {
    pub period: PeriodKey,
    pub archive: String,
    pub action: MonthlyAction,
    /// Filename the stable redirect record forwards to.
    pub redirect_target: String,
    pub card: CardStatus,
    /// Digest of the archive post bytes, when one was written (or would be).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Owns every write to posts, the redirect record and the catalog index.
#[derive(Debug)]
pub struct Publisher<'a> {
    ctx: &'a RunContext,
    links: AffiliateLinks,
}

impl<'a> Publisher<'a> {
    pub fn new(ctx: &'a RunContext) -> Result<Self> {
        Ok(Self {
            ctx,
            links: AffiliateLinks::new(&ctx.config.affiliate)?,
        })
    }

    // --- refresh path ---

    /// Repair tags, then require a full document with a correct affiliate tag.
    pub fn accept_refresh(&self, generated: &str) -> Result<String> {
        let repaired = self.links.repair(generated).text;

        if !is_full_document(&repaired) {
            return Err(RefreshError::validation("no valid HTML document returned"));
        }
        self.links.enforce(&repaired)?;

        Ok(repaired)
    }

    /// Validate generated markup for `file` and overwrite it in place.
    #[instrument(skip(self, current, generated), fields(dry_run = self.ctx.dry_run))]
    pub fn publish_refresh(
        &self,
        file: &str,
        current: &str,
        generated: &str,
    ) -> Result<RefreshOutcome> {
        let accepted = self.accept_refresh(generated)?;

        if accepted == current {
            return Ok(RefreshOutcome::Unchanged);
        }

        let sha256 = sha256_hex(accepted.as_bytes());
        if self.ctx.dry_run {
            return Ok(RefreshOutcome::WouldUpdate { sha256 });
        }

        write_atomic(&self.ctx.blog_dir().join(file), &accepted)?;
        Ok(RefreshOutcome::Updated { sha256 })
    }

    // --- create path ---

    /// Repair tags, then require a bare fragment with a correct affiliate tag.
    pub fn accept_fragment(&self, generated: &str) -> Result<String> {
        let repaired = self.links.repair(generated).text;

        if has_document_structure(&repaired) {
            return Err(RefreshError::validation(
                "monthly post generation returned a full HTML document; expected inner HTML only",
            ));
        }
        self.links.enforce(&repaired)?;

        Ok(repaired)
    }

    /// Validate the generated fragment, write the archive post, then re-point
    /// the redirect record and the catalog card at it.
    #[instrument(skip(self, generated), fields(dry_run = self.ctx.dry_run))]
    pub fn publish_monthly(&self, archive: &str, generated: &str) -> Result<MonthlyOutcome> {
        let fragment = self.accept_fragment(generated)?;

        let archive_path = self.ctx.blog_dir().join(archive);
        if archive_path.exists() {
            return Err(RefreshError::validation(format!(
                "{archive} already exists; refusing to overwrite an archive post"
            )));
        }

        let title = monthly_title(self.ctx.period());
        let document = wrap_in_site_template(&SitePage {
            title: &title,
            description: MONTHLY_DESCRIPTION,
            body: &fragment,
        });
        let sha256 = Some(sha256_hex(document.as_bytes()));

        if self.ctx.dry_run {
            return Ok(MonthlyOutcome {
                period: self.ctx.period(),
                archive: archive.to_string(),
                action: MonthlyAction::WouldCreate,
                redirect_target: archive.to_string(),
                card: self.card_preview()?,
                sha256,
            });
        }

        write_atomic(&archive_path, &document)?;
        info!(archive, "created monthly post");

        let card = self.point_at(archive)?;
        Ok(MonthlyOutcome {
            period: self.ctx.period(),
            archive: archive.to_string(),
            action: MonthlyAction::Created,
            redirect_target: archive.to_string(),
            card,
            sha256,
        })
    }

    /// The period's archive post already exists: refresh the redirect and card only.
    #[instrument(skip(self), fields(dry_run = self.ctx.dry_run))]
    pub fn republish_existing(&self, archive: &str) -> Result<MonthlyOutcome> {
        let card = if self.ctx.dry_run {
            self.card_preview()?
        } else {
            self.point_at(archive)?
        };

        info!(archive, "monthly post already exists; refreshed stable redirect and catalog card");

        Ok(MonthlyOutcome {
            period: self.ctx.period(),
            archive: archive.to_string(),
            action: MonthlyAction::AlreadyExists,
            redirect_target: archive.to_string(),
            card,
            sha256: None,
        })
    }

    /// Redirect record first, then the catalog card.
    fn point_at(&self, archive: &str) -> Result<CardStatus> {
        self.write_redirect(archive)?;
        self.update_catalog_card()
    }

    /// (Re)write the stable redirect record so it forwards to `archive`.
    pub fn write_redirect(&self, archive: &str) -> Result<()> {
        let path = self.ctx.stable_redirect_path();
        let document = redirect_document(archive);

        if read_optional(&path)?.as_deref() == Some(document.as_str()) {
            return Ok(());
        }

        write_atomic(&path, &document)?;
        info!(
            redirect = %self.ctx.config.site.stable_redirect,
            target = archive,
            "updated stable monthly redirect"
        );
        Ok(())
    }

    /// Point the catalog index's monthly card at the stable redirect record.
    pub fn update_catalog_card(&self) -> Result<CardStatus> {
        let path = self.ctx.catalog_index_path();
        let Some(html) = read_optional(&path)? else {
            warn!(path = %path.display(), "catalog index not found; skipping monthly card update");
            return Ok(CardStatus::IndexMissing);
        };

        let href = self.ctx.stable_redirect_href();
        warn_on_extra_cards(&html);

        match point_monthly_card(&html, &href) {
            CardUpdate::Rewritten(updated) => {
                write_atomic(&path, &updated)?;
                info!(%href, "updated catalog monthly card href to stable URL");
                Ok(CardStatus::Updated)
            }
            CardUpdate::AlreadyCurrent => Ok(CardStatus::AlreadyCurrent),
            CardUpdate::NotFound => {
                warn!(
                    path = %path.display(),
                    "monthly card not found; add data-monthly=\"true\" to the monthly card <a>"
                );
                Ok(CardStatus::CardMissing)
            }
        }
    }

    /// What [`Self::update_catalog_card`] would do, without writing.
    fn card_preview(&self) -> Result<CardStatus> {
        let path = self.ctx.catalog_index_path();
        let Some(html) = read_optional(&path)? else {
            return Ok(CardStatus::IndexMissing);
        };

        Ok(match point_monthly_card(&html, &self.ctx.stable_redirect_href()) {
            CardUpdate::Rewritten(_) => CardStatus::WouldUpdate,
            CardUpdate::AlreadyCurrent => CardStatus::AlreadyCurrent,
            CardUpdate::NotFound => CardStatus::CardMissing,
        })
    }
}

fn warn_on_extra_cards(html: &str) {
    let cards = monthly_card_hrefs(html).len();
    if cards > 1 {
        warn!(cards, "more than one monthly card in catalog index; only the first is updated");
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Read a file, mapping "not found" to `None`.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RefreshError::io(path, e)),
    }
}

/// Write to a hidden temp sibling, then rename over `target`.
pub(crate) fn write_atomic(target: &Path, content: &str) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp: PathBuf = dir.join(format!(".{name}.tmp"));

    if let Err(e) = std::fs::write(&temp, content) {
        let _ = std::fs::remove_file(&temp);
        return Err(RefreshError::io(&temp, e));
    }
    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(RefreshError::io(target, e));
    }
    Ok(())
}
