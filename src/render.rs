use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::models::{Clipping, Collection, Site};

pub const DOCUMENT_TITLE: &str = "Clippings";
pub const DOCUMENT_FILE_NAME: &str = "clippings.md";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Numbering {
    #[default]
    #[serde(rename = "none")]
    Unnumbered,
    /// `1.`, `2.`, ... restarting under every site heading.
    #[serde(rename = "per-site")]
    PerSite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderPolicy {
    pub numbering: Numbering,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Renders the whole collection as one Markdown document. Sites appear in
/// ascending identity order, clippings in insertion order, so the same
/// collection always yields the same bytes.
pub fn render_document(collection: &Collection, policy: RenderPolicy) -> String {
    let mut md = format!("# {}\n\n", DOCUMENT_TITLE);
    for (identity, site) in &collection.sites {
        render_site(&mut md, identity, site, policy);
    }
    md
}

fn render_site(md: &mut String, identity: &str, site: &Site, policy: RenderPolicy) {
    let title = if site.title.is_empty() { identity } else { site.title.as_str() };
    let address = if site.url.is_empty() { identity } else { site.url.as_str() };
    let _ = write!(md, "## {}\n\n", title);
    let _ = writeln!(md, "- Address: {}", address);
    let _ = write!(md, "- Created: {}\n\n", format_timestamp(&site.created));

    for (i, clip) in site.clippings.iter().enumerate() {
        match policy.numbering {
            Numbering::Unnumbered => render_clipping(md, clip, "", ""),
            Numbering::PerSite => {
                let marker = format!("{}. ", i + 1);
                render_clipping(md, clip, &marker, "   ")
            }
        }
    }
}

fn render_clipping(md: &mut String, clip: &Clipping, marker: &str, indent: &str) {
    let quoted = clip
        .text
        .split('\n')
        .collect::<Vec<_>>()
        .join(&format!("\n{}> ", indent));
    let _ = write!(md, "{}> {}\n\n", marker, quoted);
    if !clip.note.is_empty() {
        let _ = writeln!(md, "{}- Note: {}", indent, clip.note);
    }
    if !clip.tags.is_empty() {
        let _ = writeln!(md, "{}- Tags: {}", indent, clip.tags.join(", "));
    }
    let _ = write!(md, "{}- Saved: {}\n\n", indent, format_timestamp(&clip.date));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::merge_clipping;
    use crate::storage::models::ClippingPayload;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    fn payload(text: &str, url: &str, title: &str) -> ClippingPayload {
        ClippingPayload {
            text: Some(text.into()),
            url: Some(url.into()),
            title: Some(title.into()),
            date: Some(at(10)),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_collection() {
        let md = render_document(&Collection::default(), RenderPolicy::default());
        assert_eq!(md, "# Clippings\n\n");
    }

    #[test]
    fn test_exact_unnumbered_output() {
        let mut p = payload("line one\nline two", "https://example.com/p", "Example");
        p.note = Some("worth reading".into());
        p.tags = Some(vec!["design".into(), "dev".into()]);
        let c = merge_clipping(Collection::default(), &p, at(0));
        let md = render_document(&c, RenderPolicy::default());
        assert_eq!(
            md,
            "# Clippings\n\n\
             ## Example\n\n\
             - Address: https://example.com/p\n\
             - Created: 2024-05-01T10:00:00.000Z\n\n\
             > line one\n> line two\n\n\
             - Note: worth reading\n\
             - Tags: design, dev\n\
             - Saved: 2024-05-01T10:00:00.000Z\n\n"
        );
    }

    #[test]
    fn test_note_and_tags_omitted_when_empty() {
        let c = merge_clipping(
            Collection::default(),
            &payload("x", "https://example.com", "Example"),
            at(0),
        );
        let md = render_document(&c, RenderPolicy::default());
        assert!(!md.contains("- Note:"));
        assert!(!md.contains("- Tags:"));
        assert!(md.contains("- Saved: "));
    }

    #[test]
    fn test_per_site_numbering_restarts() {
        let c = merge_clipping(
            Collection::default(),
            &payload("a1", "https://a.example", "A"),
            at(0),
        );
        let c = merge_clipping(c, &payload("a2", "https://a.example", "A"), at(0));
        let c = merge_clipping(c, &payload("b1\nmore", "https://b.example", "B"), at(0));
        let md = render_document(
            &c,
            RenderPolicy {
                numbering: Numbering::PerSite,
            },
        );
        assert!(md.contains("1. > a1\n\n   - Saved:"));
        assert!(md.contains("2. > a2\n\n"));
        assert!(md.contains("1. > b1\n   > more\n\n"));
        assert!(!md.contains("3. >"));
    }

    #[test]
    fn test_sites_sorted_regardless_of_insertion() {
        let c = merge_clipping(
            Collection::default(),
            &payload("zed", "https://z.example", "Zed"),
            at(0),
        );
        let c = merge_clipping(c, &payload("ay", "https://a.example", "Ay"), at(0));
        let md = render_document(&c, RenderPolicy::default());
        let a = md.find("## Ay").unwrap();
        let z = md.find("## Zed").unwrap();
        assert!(a < z);
    }

    #[test]
    fn test_deterministic() {
        let c = merge_clipping(
            Collection::default(),
            &payload("one", "https://b.example", "B"),
            at(0),
        );
        let c = merge_clipping(c, &payload("two", "https://a.example", "A"), at(0));
        let first = render_document(&c, RenderPolicy::default());
        let second = render_document(&c.clone(), RenderPolicy::default());
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_both_clippings_under_single_heading() {
        let c = merge_clipping(
            Collection::default(),
            &payload("first text", "https://example.com/1", "Example"),
            at(0),
        );
        let c = merge_clipping(c, &payload("second text", "https://example.com/2", "Example"), at(0));
        let md = render_document(&c, RenderPolicy::default());
        assert_eq!(md.matches("## Example").count(), 1);
        let heading = md.find("## Example").unwrap();
        let first = md.find("> first text").unwrap();
        let second = md.find("> second text").unwrap();
        assert!(heading < first && first < second);
    }

    #[test]
    fn test_numbering_serde_names() {
        assert_eq!(serde_json::to_string(&Numbering::Unnumbered).unwrap(), "\"none\"");
        assert_eq!(serde_json::to_string(&Numbering::PerSite).unwrap(), "\"per-site\"");
    }
}
