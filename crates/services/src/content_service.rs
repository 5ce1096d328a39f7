use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, warn};

use roadmap_core::model::{DetailSection, SubDetail, SubDetailKey};

use crate::api::{ContentApi, NoteKind, SavedNote};
use crate::detail_cache::DetailCache;
use crate::error::FetchError;

/// Lazily loaded content addressed by `K`.
///
/// The seam between `SelectionController` and whatever caches the content.
pub trait DetailSource<K, V>: Send + Sync + 'static {
    /// Already-loaded content, without starting a fetch.
    fn cached(&self, key: &K) -> Option<Arc<V>>;

    /// Load the content, joining any fetch already in flight.
    fn load(&self, key: K) -> BoxFuture<'static, Result<Arc<V>, FetchError>>;
}

/// Module details and term deep-dives, cached for the session.
///
/// Saved notes are consulted before asking the generator.
#[derive(Clone)]
pub struct ContentService {
    api: Arc<dyn ContentApi>,
    details: DetailCache<String, Vec<DetailSection>>,
    sub_details: DetailCache<SubDetailKey, SubDetail>,
}

impl ContentService {
    #[must_use]
    pub fn new(api: Arc<dyn ContentApi>) -> Self {
        Self {
            api,
            details: DetailCache::new(),
            sub_details: DetailCache::new(),
        }
    }

    /// Structured details of the module titled `title`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if neither saved notes nor generation produce content.
    pub async fn module_details(&self, title: &str) -> Result<Arc<Vec<DetailSection>>, FetchError> {
        <Self as DetailSource<String, Vec<DetailSection>>>::load(self, title.to_owned()).await
    }

    /// HTML deep-dive for one study item.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if neither saved notes nor generation produce content.
    pub async fn sub_detail(&self, key: SubDetailKey) -> Result<Arc<SubDetail>, FetchError> {
        <Self as DetailSource<SubDetailKey, SubDetail>>::load(self, key).await
    }

    #[must_use]
    pub fn details_cache(&self) -> &DetailCache<String, Vec<DetailSection>> {
        &self.details
    }

    #[must_use]
    pub fn sub_details_cache(&self) -> &DetailCache<SubDetailKey, SubDetail> {
        &self.sub_details
    }
}

impl DetailSource<String, Vec<DetailSection>> for ContentService {
    fn cached(&self, key: &String) -> Option<Arc<Vec<DetailSection>>> {
        self.details.cached(key)
    }

    fn load(&self, key: String) -> BoxFuture<'static, Result<Arc<Vec<DetailSection>>, FetchError>> {
        let api = Arc::clone(&self.api);
        let title = key.clone();
        self.details
            .get_or_fetch(key, move || fetch_details(api, title).boxed())
    }
}

impl DetailSource<SubDetailKey, SubDetail> for ContentService {
    fn cached(&self, key: &SubDetailKey) -> Option<Arc<SubDetail>> {
        self.sub_details.cached(key)
    }

    fn load(&self, key: SubDetailKey) -> BoxFuture<'static, Result<Arc<SubDetail>, FetchError>> {
        let api = Arc::clone(&self.api);
        let owned = key.clone();
        self.sub_details
            .get_or_fetch(key, move || fetch_sub_detail(api, owned).boxed())
    }
}

async fn fetch_details(
    api: Arc<dyn ContentApi>,
    title: String,
) -> Result<Vec<DetailSection>, FetchError> {
    let saved = saved_notes(api.as_ref(), &title, NoteKind::Details).await?;
    if let Some(sections) = saved
        .into_iter()
        .next()
        .and_then(|note| decode_saved_details(note.content))
    {
        debug!(title = %title, sections = sections.len(), "module details loaded from saved notes");
        return Ok(sections);
    }

    let sections = api.generate_details(&title).await?;
    debug!(title = %title, sections = sections.len(), "module details generated");
    Ok(sections)
}

async fn fetch_sub_detail(
    api: Arc<dyn ContentApi>,
    key: SubDetailKey,
) -> Result<SubDetail, FetchError> {
    let saved = saved_notes(api.as_ref(), &key.context, NoteKind::SubDetails).await?;
    let html = saved
        .into_iter()
        .find(|note| note.term() == Some(key.term.as_str()))
        .and_then(|note| match note.content {
            Value::String(html) => Some(html),
            _ => None,
        });
    if let Some(html) = html {
        debug!(term = %key.term, "sub-detail loaded from saved notes");
        return Ok(SubDetail::new(key, &html));
    }

    let raw = api.generate_sub_details(&key).await?;
    debug!(term = %key.term, bytes = raw.len(), "sub-detail generated");
    Ok(SubDetail::new(key, &raw))
}

/// Saved notes lookup; anything but an auth failure degrades to "no notes".
async fn saved_notes(
    api: &dyn ContentApi,
    topic: &str,
    kind: NoteKind,
) -> Result<Vec<SavedNote>, FetchError> {
    match api.saved_notes(topic, kind).await {
        Ok(notes) => Ok(notes),
        Err(FetchError::Unauthorized) => Err(FetchError::Unauthorized),
        Err(err) => {
            warn!(topic, kind = kind.as_str(), error = %err, "saved notes lookup failed");
            Ok(Vec::new())
        }
    }
}

/// Saved details are stored either as the section array or as its JSON text.
fn decode_saved_details(content: Value) -> Option<Vec<DetailSection>> {
    let content = match content {
        Value::String(text) => serde_json::from_str(&text).ok()?,
        other => other,
    };
    let sections: Vec<DetailSection> = serde_json::from_value(content).ok()?;
    (!sections.is_empty()).then_some(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn saved_details_accept_array_or_text() {
        let array = json!([{"section_title": "Basics", "section_items": [
            {"term": "Move", "definition": "Ownership transfer"}
        ]}]);
        let sections = decode_saved_details(array.clone()).unwrap();
        assert_eq!(sections[0].title, "Basics");

        let text = Value::String(array.to_string());
        assert_eq!(decode_saved_details(text).unwrap(), sections);
    }

    #[test]
    fn unusable_saved_details_fall_through() {
        assert!(decode_saved_details(json!([])).is_none());
        assert!(decode_saved_details(json!("not json")).is_none());
        assert!(decode_saved_details(Value::Null).is_none());
    }
}
