//! Fixed site chrome for archive posts and the stable redirect record.

use scraper::{Html, Selector};

/// Inputs for [`wrap_in_site_template`].
#[derive(Debug, Clone)]
pub struct SitePage<'a> {
    /// `<title>` text.
    pub title: &'a str,
    /// `<meta name="description">` content.
    pub description: &'a str,
    /// Validated content fragment placed inside the post section.
    pub body: &'a str,
}

/// Wrap a content fragment in the site's header, nav and stylesheet links.
///
/// Archive posts live one level below the site root, so every site link is `../`-relative.
pub fn wrap_in_site_template(page: &SitePage<'_>) -> String {
    let title = escape_html(page.title);
    let description = escape_html(page.description);
    let body = page.body.trim();

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title}</title>
  <meta name="description" content="{description}" />

  <link rel="preconnect" href="https://fonts.googleapis.com">
  <link rel="preconnect" href="https://fonts.gstatic.com" crossorigin>
  <link rel="stylesheet" href="https://fonts.googleapis.com/css2?family=Montserrat:wght@400;500;700&display=swap">
  <link rel="stylesheet" href="../style.css" />
</head>
<body>
  <header class="site-header">
    <div class="nav-inner">
      <a class="brand" href="../index.html">Gifts for Teachers</a>
      <nav class="nav-links">
        <a href="../index.html">Home</a>
        <a href="../holidays.html">Holidays</a>
        <a href="../types.html">Gift Types</a>
        <a href="../blog.html" aria-current="page">Blog</a>
      </nav>
    </div>
  </header>

  <main>
    <section class="blog-post">
{body}
    </section>
  </main>

  <script src="../script.js"></script>
</body>
</html>
"#
    )
}

/// A document whose only job is to forward to `target_href`.
///
/// Forwards three ways (meta refresh, `location.replace`, a plain link) and
/// marks itself `noindex` with a canonical pointing at the target.
pub fn redirect_document(target_href: &str) -> String {
    let href = escape_html(target_href);
    let js_target = js_string_literal(target_href);

    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Monthly Teacher Gift Ideas &amp; Quick Wins</title>
  <meta http-equiv="refresh" content="0; url={href}">
  <link rel="canonical" href="{href}">
  <meta name="robots" content="noindex, follow">
  <script>location.replace({js_target});</script>
</head>
<body>
  <p>Redirecting to the latest monthly teacher gift ideas&hellip; <a href="{href}">Click here</a>.</p>
</body>
</html>
"#
    )
}

/// Read the target of a redirect record back out of its meta refresh.
pub fn redirect_target(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[http-equiv="refresh"]"#).ok()?;

    let content = doc.select(&selector).next()?.value().attr("content")?;
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let url = rest
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("url="))
        .map(|_| &rest[4..])?;

    let url = url.trim().trim_matches(|c| c == '\'' || c == '"');
    (!url.is_empty()).then(|| url.to_string())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A double-quoted JS string literal safe to embed inside a `<script>` element.
fn js_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '<' => out.push_str("\\u003c"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
