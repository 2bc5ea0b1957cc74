//! Affiliate-tag repair and enforcement for outbound marketplace links.

use regex::Regex;
use tracing::debug;

use giftrefresh_shared::{AffiliateConfig, RefreshError, Result};

/// Compiled matchers for one marketplace domain and tag value.
#[derive(Debug, Clone)]
pub struct AffiliateLinks {
    tag: String,
    domain: String,
    link_re: Regex,
    any_tag_re: Regex,
    exact_tag_re: Regex,
}

/// Output of [`AffiliateLinks::repair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repaired {
    /// Text with the tag appended to every untagged marketplace link.
    pub text: String,
    /// Number of links that received a tag.
    pub links_tagged: usize,
}

impl AffiliateLinks {
    /// Compile matchers for the configured domain and tag.
    pub fn new(config: &AffiliateConfig) -> Result<Self> {
        let domain = regex::escape(&config.marketplace_domain);
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .map_err(|e| RefreshError::config(format!("bad affiliate pattern: {e}")))
        };

        Ok(Self {
            tag: config.tag.clone(),
            domain: config.marketplace_domain.clone(),
            // Stops at quotes, whitespace and angle brackets so anchor text is never swallowed.
            link_re: compile(format!(r#"(?i)https?://(?:www\.)?{domain}/[^\s"'<>]+"#))?,
            any_tag_re: compile(r"[?&](?:amp;)?tag=".to_string())?,
            exact_tag_re: compile(format!(
                r#"[?&](?:amp;)?tag={}(?:[&#"'\s<>]|$)"#,
                regex::escape(&config.tag)
            ))?,
        })
    }

    /// Append `tag=<value>` to every marketplace URL that has no tag parameter.
    ///
    /// The joiner is `&` when the URL already has a query string and `?`
    /// otherwise. A `#fragment` stays at the end. URLs that already carry a
    /// tag, even a different one, are left untouched.
    pub fn repair(&self, text: &str) -> Repaired {
        let mut links_tagged = 0;

        let repaired = self.link_re.replace_all(text, |caps: &regex::Captures| {
            let url = &caps[0];
            if self.any_tag_re.is_match(url) {
                return url.to_string();
            }

            links_tagged += 1;
            let (base, fragment) = match url.find('#') {
                Some(idx) => url.split_at(idx),
                None => (url, ""),
            };
            let joiner = if base.contains('?') { '&' } else { '?' };
            format!("{base}{joiner}tag={}{fragment}", self.tag)
        });

        if links_tagged > 0 {
            debug!(links_tagged, "appended affiliate tag to marketplace links");
        }

        Repaired {
            text: repaired.into_owned(),
            links_tagged,
        }
    }

    /// Whether the text contains the marketplace domain as written in config.
    /// Case-sensitive: prose such as "Amazon.com" is not a link and does not count.
    pub fn mentions_marketplace(&self, text: &str) -> bool {
        text.contains(&self.domain)
    }

    /// Whether at least one link carries the tag with the configured value.
    pub fn has_correct_tag(&self, text: &str) -> bool {
        self.exact_tag_re.is_match(text)
    }

    /// Reject text that references the marketplace without carrying the correct tag.
    pub fn enforce(&self, text: &str) -> Result<()> {
        if self.mentions_marketplace(text) && !self.has_correct_tag(text) {
            return Err(RefreshError::validation(format!(
                "affiliate tag '{}' missing from {} links",
                self.tag, self.domain
            )));
        }
        Ok(())
    }
}
