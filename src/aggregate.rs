use chrono::{DateTime, Utc};
use url::Url;

use crate::storage::models::{Clipping, ClippingPayload, Collection, Site};

pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Grouping key for a source URL: its origin (`scheme://host[:port]`).
/// Unparseable URLs and opaque origins group under the raw string; a
/// missing or empty URL groups under `"unknown"`.
pub fn site_identity(url: Option<&str>) -> String {
    let raw = match url {
        Some(u) if !u.is_empty() => u,
        _ => return UNKNOWN_IDENTITY.to_string(),
    };
    match Url::parse(raw) {
        Ok(parsed) if parsed.origin().is_tuple() => parsed.origin().ascii_serialization(),
        _ => raw.to_string(),
    }
}

/// Appends a clipping built from `payload` to the site its URL maps to,
/// creating the site on first use. Never removes anything and never fails.
pub fn merge_clipping(
    mut collection: Collection,
    payload: &ClippingPayload,
    now: DateTime<Utc>,
) -> Collection {
    let url = non_empty(payload.url.as_deref());
    let identity = site_identity(url);
    let date = payload.date.unwrap_or(now);

    let site = collection
        .sites
        .entry(identity.clone())
        .or_insert_with(|| Site {
            title: non_empty(payload.title.as_deref())
                .unwrap_or(identity.as_str())
                .to_string(),
            url: url.unwrap_or(identity.as_str()).to_string(),
            created: date,
            clippings: Vec::new(),
            identity: identity.clone(),
        });

    site.clippings.push(Clipping {
        text: payload.text.clone().unwrap_or_default(),
        note: payload.note.clone().unwrap_or_default(),
        tags: payload.tags.clone().unwrap_or_default(),
        date,
    });

    tracing::debug!(
        site = %identity,
        clippings = site.clippings.len(),
        "merged clipping"
    );
    collection
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    fn payload(text: &str, url: &str) -> ClippingPayload {
        ClippingPayload {
            text: Some(text.into()),
            url: Some(url.into()),
            title: Some("Example".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_is_origin() {
        assert_eq!(
            site_identity(Some("https://example.com/a/b?q=1#frag")),
            "https://example.com"
        );
        assert_eq!(
            site_identity(Some("http://localhost:8080/x")),
            "http://localhost:8080"
        );
    }

    #[test]
    fn test_identity_drops_default_port() {
        assert_eq!(
            site_identity(Some("https://example.com:443/a")),
            "https://example.com"
        );
    }

    #[test]
    fn test_identity_malformed_url_uses_raw() {
        assert_eq!(site_identity(Some("not a url")), "not a url");
    }

    #[test]
    fn test_identity_opaque_origin_uses_raw() {
        assert_eq!(site_identity(Some("about:blank")), "about:blank");
    }

    #[test]
    fn test_identity_missing_is_unknown() {
        assert_eq!(site_identity(None), UNKNOWN_IDENTITY);
        assert_eq!(site_identity(Some("")), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_same_origin_groups_in_call_order() {
        let c = merge_clipping(
            Collection::default(),
            &payload("first", "https://example.com/one"),
            at(1),
        );
        let c = merge_clipping(c, &payload("second", "https://example.com/two"), at(2));
        assert_eq!(c.sites.len(), 1);
        let site = c.site("https://example.com").unwrap();
        let texts: Vec<_> = site.clippings.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_new_site_fields() {
        let c = merge_clipping(
            Collection::default(),
            &payload("x", "https://example.com/page"),
            at(3),
        );
        let site = c.site("https://example.com").unwrap();
        assert_eq!(site.identity, "https://example.com");
        assert_eq!(site.title, "Example");
        assert_eq!(site.url, "https://example.com/page");
        assert_eq!(site.created, at(3));
    }

    #[test]
    fn test_created_set_once() {
        let c = merge_clipping(
            Collection::default(),
            &payload("a", "https://example.com/"),
            at(1),
        );
        let mut later = payload("b", "https://example.com/other");
        later.title = Some("Renamed".into());
        let c = merge_clipping(c, &later, at(5));
        let site = c.site("https://example.com").unwrap();
        assert_eq!(site.created, at(1));
        assert_eq!(site.title, "Example");
        assert_eq!(site.url, "https://example.com/");
    }

    #[test]
    fn test_missing_fields_default() {
        let c = merge_clipping(Collection::default(), &ClippingPayload::default(), at(4));
        let site = c.site(UNKNOWN_IDENTITY).unwrap();
        assert_eq!(site.title, UNKNOWN_IDENTITY);
        assert_eq!(site.url, UNKNOWN_IDENTITY);
        let clip = &site.clippings[0];
        assert_eq!(clip.text, "");
        assert_eq!(clip.note, "");
        assert!(clip.tags.is_empty());
        assert_eq!(clip.date, at(4));
    }

    #[test]
    fn test_payload_date_wins_over_now() {
        let mut p = payload("x", "https://example.com");
        p.date = Some(at(9));
        let c = merge_clipping(Collection::default(), &p, at(1));
        let site = c.site("https://example.com").unwrap();
        assert_eq!(site.created, at(9));
        assert_eq!(site.clippings[0].date, at(9));
    }

    #[test]
    fn test_tags_kept_as_typed() {
        let mut p = payload("x", "https://example.com");
        p.tags = Some(vec!["Rust".into(), "rust".into(), "Rust".into()]);
        let c = merge_clipping(Collection::default(), &p, at(1));
        assert_eq!(
            c.site("https://example.com").unwrap().clippings[0].tags,
            vec!["Rust", "rust", "Rust"]
        );
    }

    #[test]
    fn test_merge_never_removes() {
        let c = merge_clipping(Collection::default(), &payload("a", "https://a.example"), at(1));
        let c = merge_clipping(c, &payload("b", "https://b.example"), at(2));
        let before = c.clone();
        let c = merge_clipping(c, &payload("c", "https://a.example"), at(3));
        for (identity, site) in &before.sites {
            let after = c.site(identity).unwrap();
            assert!(after.clippings.starts_with(&site.clippings));
        }
    }
}
