//! Catalog index: locating and re-pointing the monthly card.
//!
//! The card is the `<a>` element carrying `data-monthly="true"`. Only its
//! `href` is rewritten; every other byte of the index is preserved.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Outcome of [`point_monthly_card`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardUpdate {
    /// The card's href changed; holds the new document.
    Rewritten(String),
    /// The card already points at the requested href.
    AlreadyCurrent,
    /// No monthly card in the document.
    NotFound,
}

/// Hrefs of every monthly card, in document order. A card without an href yields `""`.
pub fn monthly_card_hrefs(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"a[data-monthly="true"]"#) else {
        return Vec::new();
    };

    doc.select(&selector)
        .map(|el| el.value().attr("href").unwrap_or_default().to_string())
        .collect()
}

/// Point the first monthly card at `href`.
pub fn point_monthly_card(html: &str, href: &str) -> CardUpdate {
    // Quoted attribute values may contain `>`.
    static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?is)<a\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("valid regex")
    });
    static SENTINEL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)\sdata-monthly\s*=\s*(?:"true"|'true'|true\b)"#).expect("valid regex")
    });
    static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)(\shref\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
            .expect("valid regex")
    });

    let Some(tag) = ANCHOR_RE
        .find_iter(html)
        .find(|m| SENTINEL_RE.is_match(m.as_str()))
    else {
        return CardUpdate::NotFound;
    };

    let tag_text = tag.as_str();
    let new_tag = match HREF_RE.captures(tag_text) {
        Some(caps) => {
            let current = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if current == href {
                return CardUpdate::AlreadyCurrent;
            }
            let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
            format!(
                "{}{}\"{href}\"{}",
                &tag_text[..whole.start],
                &caps[1],
                &tag_text[whole.end..]
            )
        }
        None => {
            // `<a data-monthly="true">` or `<a ... />`: add the attribute before the close.
            let close = if tag_text.ends_with("/>") { 2 } else { 1 };
            let split = tag_text.len() - close;
            format!("{} href=\"{href}\"{}", &tag_text[..split], &tag_text[split..])
        }
    };

    let mut out = String::with_capacity(html.len() + href.len());
    out.push_str(&html[..tag.start()]);
    out.push_str(&new_tag);
    out.push_str(&html[tag.end()..]);
    CardUpdate::Rewritten(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STABLE: &str = "blog/monthly-teacher-gift-refresh.html";

    #[test]
    fn rewrites_href_after_sentinel() {
        let html = r#"<div class="grid">
  <a class="blog-card" href="blog/teacher-gifts-under-20.html">Under $20</a>
  <a class="blog-card" data-monthly="true" href="blog/monthly-teacher-gift-refresh-2025-05.html">Monthly</a>
</div>"#;
        let CardUpdate::Rewritten(out) = point_monthly_card(html, STABLE) else {
            panic!("expected rewrite");
        };
        assert_eq!(
            out,
            html.replace("blog/monthly-teacher-gift-refresh-2025-05.html", STABLE)
        );
        assert_eq!(monthly_card_hrefs(&out), vec![STABLE.to_string()]);
    }

    #[test]
    fn rewrites_href_before_sentinel() {
        let html = r#"<a href='old.html'
   class="blog-card" DATA-MONTHLY="true">Monthly</a>"#;
        let CardUpdate::Rewritten(out) = point_monthly_card(html, STABLE) else {
            panic!("expected rewrite");
        };
        assert!(out.starts_with(&format!("<a href=\"{STABLE}\"\n")));
        assert!(out.ends_with(r#"class="blog-card" DATA-MONTHLY="true">Monthly</a>"#));
    }

    #[test]
    fn adds_missing_href() {
        let html = r#"<a class="blog-card" data-monthly="true">Monthly</a>"#;
        let CardUpdate::Rewritten(out) = point_monthly_card(html, STABLE) else {
            panic!("expected rewrite");
        };
        assert_eq!(
            out,
            format!(r#"<a class="blog-card" data-monthly="true" href="{STABLE}">Monthly</a>"#)
        );
    }

    #[test]
    fn already_current_is_untouched() {
        let html = format!(r#"<a data-monthly="true" href="{STABLE}">Monthly</a>"#);
        assert_eq!(point_monthly_card(&html, STABLE), CardUpdate::AlreadyCurrent);
    }

    #[test]
    fn missing_card() {
        let html = r#"<a class="blog-card" href="blog/a.html">A</a><a data-monthly="false" href="x">"#;
        assert_eq!(point_monthly_card(html, STABLE), CardUpdate::NotFound);
        assert!(monthly_card_hrefs(html).is_empty());
    }

    #[test]
    fn only_first_card_is_rewritten() {
        let html = r#"<a data-monthly="true" href="one.html">1</a><a data-monthly="true" href="two.html">2</a>"#;
        let CardUpdate::Rewritten(out) = point_monthly_card(html, STABLE) else {
            panic!("expected rewrite");
        };
        assert_eq!(
            monthly_card_hrefs(&out),
            vec![STABLE.to_string(), "two.html".to_string()]
        );
    }

    #[test]
    fn data_href_attribute_is_not_the_link() {
        let html = r#"<a data-monthly="true" data-href="keep.html" href="old.html">M</a>"#;
        let CardUpdate::Rewritten(out) = point_monthly_card(html, STABLE) else {
            panic!("expected rewrite");
        };
        assert!(out.contains(r#"data-href="keep.html""#));
        assert!(out.contains(&format!(r#" href="{STABLE}""#)));
    }

    #[test]
    fn angle_bracket_inside_quoted_attribute() {
        let html = r#"<a class="blog-card" title="Gifts > $20" data-monthly="true" href="blog/old.html">M</a>"#;
        assert_eq!(monthly_card_hrefs(html), vec!["blog/old.html".to_string()]);

        let CardUpdate::Rewritten(out) = point_monthly_card(html, STABLE) else {
            panic!("expected rewrite");
        };
        assert_eq!(out, html.replace("blog/old.html", STABLE));
        assert_eq!(monthly_card_hrefs(&out), vec![STABLE.to_string()]);
    }

    #[test]
    fn single_quoted_angle_bracket_before_sentinel() {
        let html = "<a title='a > b' href=old.html data-monthly=true>M</a>";
        let CardUpdate::Rewritten(out) = point_monthly_card(html, STABLE) else {
            panic!("expected rewrite");
        };
        assert_eq!(
            out,
            format!("<a title='a > b' href=\"{STABLE}\" data-monthly=true>M</a>")
        );
    }
}
