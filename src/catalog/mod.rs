//! Read-only OWASP Top 10 (2021) reference data.

mod handlers;
pub mod types;

use anyhow::{ensure, Context};

use crate::state::AppState;
use axum::Router;
pub use types::{ListItem, Vulnerability};

const DATA: &str = include_str!("vulnerabilities.json");

pub fn router() -> Router<AppState> {
    handlers::routes()
}

/// The ten categories, ordered by rank.
#[derive(Debug)]
pub struct Catalog {
    entries: Vec<Vulnerability>,
}

impl Catalog {
    pub fn load() -> anyhow::Result<Self> {
        let mut entries: Vec<Vulnerability> =
            serde_json::from_str(DATA).context("parse embedded vulnerability catalog")?;
        ensure!(!entries.is_empty(), "vulnerability catalog is empty");
        entries.sort_by_key(|v| v.overview.rank);
        Ok(Self { entries })
    }

    pub fn list(&self) -> Vec<ListItem> {
        self.entries.iter().map(ListItem::from).collect()
    }

    /// Looks up by id (`A01`, any case) or by slug (`broken-access-control`).
    pub fn find(&self, id_or_slug: &str) -> Option<&Vulnerability> {
        let id = id_or_slug.to_uppercase();
        let slug = id_or_slug.to_lowercase();
        self.entries
            .iter()
            .find(|v| v.id == id || v.short_title == slug)
    }

    /// Case-insensitive substring match over title, code, slug, description
    /// paragraphs and the common-weakness list.
    pub fn search(&self, query: &str) -> Vec<ListItem> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let hit = |s: &str| s.to_lowercase().contains(&needle);
        self.entries
            .iter()
            .filter(|v| {
                hit(&v.title)
                    || hit(&v.code)
                    || hit(&v.short_title)
                    || v.description.iter().any(|d| hit(d))
                    || v.common_vulnerabilities.iter().any(|c| hit(c))
            })
            .map(ListItem::from)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_data_has_ten_ranked_entries() {
        let catalog = Catalog::load().unwrap();
        assert_eq!(catalog.len(), 10);
        let ranks: Vec<u8> = catalog.list().iter().map(|i| i.rank).collect();
        assert_eq!(ranks, (1..=10).collect::<Vec<u8>>());
    }

    #[test]
    fn find_by_id_or_slug() {
        let catalog = Catalog::load().unwrap();
        assert_eq!(catalog.find("a01").unwrap().title, "Broken Access Control");
        assert_eq!(catalog.find("A03").unwrap().short_title, "injection");
        assert_eq!(catalog.find("SSRF").unwrap().id, "A10");
        assert!(catalog.find("A11").is_none());
    }

    #[test]
    fn search_matches_titles_and_weakness_lists() {
        let catalog = Catalog::load().unwrap();

        let by_title: Vec<String> = catalog.search("injection").into_iter().map(|i| i.id).collect();
        assert!(by_title.contains(&"A03".to_string()));

        let by_weakness: Vec<String> = catalog
            .search("credential stuffing")
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert!(by_weakness.contains(&"A07".to_string()));

        assert!(catalog.search("zzz-no-such-thing").is_empty());
        assert!(catalog.search("   ").is_empty());
    }

    #[test]
    fn list_item_uses_overview_description() {
        let catalog = Catalog::load().unwrap();
        let first = &catalog.list()[0];
        assert_eq!(first.code, "A01:2021");
        assert!(first.description.contains("broken access control"));
    }
}
