use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::core::error::{Error, ErrorKind, Result};

/// One outbound link: absolute URL plus the anchor text on the source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub anchor: String,
}

/// Extraction result for one fetched page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: String,
    pub body_text: String,
    pub links: Vec<Link>,
}

/// Parse raw HTML bytes. Body text skips text whose immediate parent element
/// is `script`, `style` or `a`; links resolve against `base_url`, keep only
/// http(s) targets, and drop fragments so cycle detection sees one URL per
/// page.
pub fn parse_page(raw: &[u8], base_url: &str) -> Result<ParsedPage> {
    let html = String::from_utf8_lossy(raw);
    let document = Html::parse_document(&html);
    let base = Url::parse(base_url)?;

    let title_selector = selector("title")?;
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let mut body_text = String::new();
    collect_visible_text(document.root_element(), &mut body_text);

    let anchor_selector = selector("a[href]")?;
    let mut links = Vec::new();
    for el in document.select(&anchor_selector) {
        let Some(href) = el.value().attr("href") else { continue };
        let Ok(mut resolved) = base.join(href) else { continue };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        resolved.set_fragment(None);
        links.push(Link {
            url: resolved.to_string(),
            anchor: el.text().collect::<String>().trim().to_string(),
        });
    }

    Ok(ParsedPage { title, body_text, links })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|err| Error::new(ErrorKind::Parse, format!("selector {}: {}", css, err)))
}

const SKIPPED_PARENTS: [&str; 3] = ["script", "style", "a"];

fn collect_visible_text(element: ElementRef, out: &mut String) {
    let parent_name = element.value().name();
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            if SKIPPED_PARENTS.contains(&parent_name) {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(trimmed);
            }
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if child_el.value().name() == "title" {
                continue;
            }
            collect_visible_text(child_el, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head>
            <title> Hello World </title>
            <style>.x { color: red; }</style>
          </head>
          <body>
            <p>visible text</p>
            <script>var hidden = 1;</script>
            <a href="/b">link label</a>
            <a href="https://other.test/c#frag">other <b>bold</b></a>
            <a href="mailto:x@y.z">mail</a>
            <div>more text</div>
          </body>
        </html>"#;

    #[test]
    fn test_title_extraction() {
        let page = parse_page(PAGE.as_bytes(), "http://ex.test/a").unwrap();
        assert_eq!(page.title, "Hello World");
    }

    #[test]
    fn test_body_skips_script_style_and_anchor_text() {
        let page = parse_page(PAGE.as_bytes(), "http://ex.test/a").unwrap();
        assert!(page.body_text.contains("visible text"));
        assert!(page.body_text.contains("more text"));
        assert!(!page.body_text.contains("hidden"));
        assert!(!page.body_text.contains("color"));
        assert!(!page.body_text.contains("link label"));
        // Text nested deeper inside an anchor is not directly under <a>.
        assert!(page.body_text.contains("bold"));
    }

    #[test]
    fn test_links_resolved_and_filtered() {
        let page = parse_page(PAGE.as_bytes(), "http://ex.test/a").unwrap();
        let urls: Vec<&str> = page.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["http://ex.test/b", "https://other.test/c"]);
        assert_eq!(page.links[0].anchor, "link label");
        assert_eq!(page.links[1].anchor, "other bold");
    }

    #[test]
    fn test_malformed_html_still_parses() {
        let page = parse_page(b"<p>unclosed <b>tags", "http://ex.test/a").unwrap();
        assert!(page.body_text.contains("unclosed"));
        assert!(page.links.is_empty());
    }
}
