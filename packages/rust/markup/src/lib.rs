//! Pure text transforms over site markup.
//!
//! Nothing in this crate touches the filesystem. It provides:
//! - [`AffiliateLinks`]: tag repair and enforcement for marketplace links
//! - [`is_full_document`] / [`has_document_structure`]: document-marker predicates
//! - [`wrap_in_site_template`] / [`redirect_document`]: fixed site chrome
//! - [`point_monthly_card`]: catalog index card rewrite

mod affiliate;
mod catalog;
mod document;
mod template;

pub use affiliate::{AffiliateLinks, Repaired};
pub use catalog::{CardUpdate, monthly_card_hrefs, point_monthly_card};
pub use document::{has_document_structure, is_full_document};
pub use template::{SitePage, redirect_document, redirect_target, wrap_in_site_template};
