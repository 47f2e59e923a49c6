use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A short alias bound to a destination URL within a domain.
///
/// `(domain, lower(alias))` is globally unique; alias matching against the
/// backing store is case-insensitive while the cache key keeps the original
/// casing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub id: i64,
    pub alias: String,
    pub domain: String,
    pub url: String,
    pub password_hash: Option<String>,
    pub disabled: bool,
    pub archived: bool,
    pub owner_id: String,
    pub folder_id: Option<i64>,
    /// Soft-disable the link once this many visits were recorded.
    pub disable_after_clicks: Option<i64>,
    /// Soft-disable the link once this unix timestamp has passed.
    pub disable_after_date: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub created_at: i64,
}

impl Link {
    pub fn is_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Cache key for this link, `"<domain>:<alias>"`.
    pub fn cache_key(&self) -> String {
        cache_key(&self.domain, &self.alias)
    }
}

/// Build the colon-delimited cache key. Aliases and domains are assumed not
/// to contain colons, so no escaping is applied.
pub fn cache_key(domain: &str, alias: &str) -> String {
    format!("{domain}:{alias}")
}

/// Fields required to insert a new link.
#[derive(Debug, Clone, Default)]
pub struct NewLink {
    pub alias: String,
    pub domain: String,
    pub url: String,
    pub password_hash: Option<String>,
    pub owner_id: String,
    pub folder_id: Option<i64>,
    pub disable_after_clicks: Option<i64>,
    pub disable_after_date: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Partial update applied to an existing link.
///
/// Outer `None` leaves the column untouched; `Some(None)` on the nested
/// options clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct LinkUpdate {
    pub alias: Option<String>,
    pub domain: Option<String>,
    pub url: Option<String>,
    pub password_hash: Option<Option<String>>,
    pub disabled: Option<bool>,
    pub archived: Option<bool>,
    pub folder_id: Option<Option<i64>>,
    pub disable_after_clicks: Option<Option<i64>>,
    pub disable_after_date: Option<Option<i64>>,
    pub title: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub image: Option<Option<String>>,
}

impl LinkUpdate {
    /// Whether this update touches a field the resolver depends on, i.e.
    /// whether the old cache entry must be invalidated.
    pub fn invalidates_cache(&self) -> bool {
        self.alias.is_some()
            || self.domain.is_some()
            || self.url.is_some()
            || self.password_hash.is_some()
            || self.disabled.is_some()
            || self.archived.is_some()
            || self.disable_after_clicks.is_some()
            || self.disable_after_date.is_some()
    }

    /// Produce the merged row that should replace `current`.
    pub fn apply(&self, current: &Link) -> Link {
        let mut next = current.clone();
        if let Some(ref v) = self.alias {
            next.alias = v.clone();
        }
        if let Some(ref v) = self.domain {
            next.domain = v.clone();
        }
        if let Some(ref v) = self.url {
            next.url = v.clone();
        }
        if let Some(ref v) = self.password_hash {
            next.password_hash = v.clone();
        }
        if let Some(v) = self.disabled {
            next.disabled = v;
        }
        if let Some(v) = self.archived {
            next.archived = v;
        }
        if let Some(v) = self.folder_id {
            next.folder_id = v;
        }
        if let Some(v) = self.disable_after_clicks {
            next.disable_after_clicks = v;
        }
        if let Some(v) = self.disable_after_date {
            next.disable_after_date = v;
        }
        if let Some(ref v) = self.title {
            next.title = v.clone();
        }
        if let Some(ref v) = self.description {
            next.description = v.clone();
        }
        if let Some(ref v) = self.image {
            next.image = v.clone();
        }
        next
    }
}

/// One recorded click. Append-only; never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LinkVisit {
    pub id: i64,
    pub link_id: i64,
    pub device: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub model: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
    pub referer: Option<String>,
    pub created_at: i64,
}

/// Visit row about to be inserted.
#[derive(Debug, Clone, Default)]
pub struct NewVisit {
    pub link_id: i64,
    pub device: Option<String>,
    pub os: Option<String>,
    pub browser: Option<String>,
    pub model: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub continent: Option<String>,
    pub referer: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_colon_delimited() {
        assert_eq!(cache_key("ishortn.ink", "promo"), "ishortn.ink:promo");
    }

    #[test]
    fn cache_key_preserves_alias_case() {
        assert_eq!(cache_key("ishortn.ink", "PROMO"), "ishortn.ink:PROMO");
    }

    #[test]
    fn update_apply_merges_only_set_fields() {
        let link = Link {
            id: 1,
            alias: "promo".into(),
            domain: "ishortn.ink".into(),
            url: "https://example.com".into(),
            password_hash: None,
            disabled: false,
            archived: false,
            owner_id: "user_1".into(),
            folder_id: None,
            disable_after_clicks: None,
            disable_after_date: None,
            title: None,
            description: None,
            image: None,
            created_at: 0,
        };

        let update = LinkUpdate {
            alias: Some("sale".into()),
            disabled: Some(true),
            ..Default::default()
        };
        let next = update.apply(&link);
        assert_eq!(next.alias, "sale");
        assert!(next.disabled);
        assert_eq!(next.url, "https://example.com");
        assert_eq!(next.domain, "ishortn.ink");
    }

    #[test]
    fn url_change_invalidates_cache() {
        let update = LinkUpdate {
            url: Some("https://other.example".into()),
            ..Default::default()
        };
        assert!(update.invalidates_cache());

        let cosmetic = LinkUpdate {
            title: Some(Some("Spring promo".into())),
            ..Default::default()
        };
        assert!(!cosmetic.invalidates_cache());
    }
}
