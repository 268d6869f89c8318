//! # Cache Keys
//!
//! Namespaced key builders. Every reader and every invalidating writer goes
//! through these functions so a key family can never drift between the two.
//!
//! Layout: `<entityType>:<id>` for single documents, `<entityType>:<id>` with
//! the owner id for per-user lists, and `...:page:<n>` for paginated listings.

/// Pattern matching every cached page of the unfiltered plant type listing
pub const PLANT_TYPE_PAGES: &str = "plantTypes:page:*";

/// Pattern matching every cached page of every plant type search
pub const PLANT_TYPE_SEARCH_PAGES: &str = "plantTypes:search:*";

/// The shared container listing
pub const CONTAINERS: &str = "containers";

/// Single plant type document
pub fn plant_type(id: &str) -> String {
    format!("plantType:{}", id)
}

/// One page of the plant type listing, optionally filtered by a search query
pub fn plant_types_page(search: Option<&str>, page: u32) -> String {
    match search.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => format!("plantTypes:search:{}:page:{}", escape_glob(query), page),
        None => format!("plantTypes:page:{}", page),
    }
}

/// Single plant document
pub fn plant(id: &str) -> String {
    format!("plant:{}", id)
}

/// Plants owned by a user
pub fn plants_for_owner(owner_id: &str) -> String {
    format!("plants:{}", owner_id)
}

/// Single device document
pub fn device(id: &str) -> String {
    format!("device:{}", id)
}

/// Devices owned by a user
pub fn devices_for_owner(owner_id: &str) -> String {
    format!("devices:{}", owner_id)
}

/// Single area document
pub fn area(id: &str) -> String {
    format!("area:{}", id)
}

/// Areas owned by a user
pub fn areas_for_owner(owner_id: &str) -> String {
    format!("areas:{}", owner_id)
}

/// Entity family of a key (`plantTypes:page:3` -> `plantTypes`), used as a metric label
pub fn family(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}

/// Escape glob metacharacters in user-supplied key segments so a search
/// query like `a*` cannot widen a pattern invalidation.
fn escape_glob(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
