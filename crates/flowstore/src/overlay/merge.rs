use crate::param::{ParamFields, ParamItem};
use flowcore::Id;
use serde::{Deserialize, Serialize};

/// Where a merged item's fields came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemSource {
    Origin,
    Mixed,
    Delta,
}

/// One entry of a view as the user sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayItem {
    pub id: Id,
    pub source: ItemSource,
    #[serde(flatten)]
    pub fields: ParamFields,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamPatch {
    pub key: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}

impl ParamPatch {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none()
            && self.value.is_none()
            && self.description.is_none()
            && self.enabled.is_none()
    }
}

/// Per-view overrides of one origin item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StateRow {
    pub suppressed: bool,
    pub overrides: ParamPatch,
}

/// Merge an origin item with its view state. `None` when suppressed.
pub(crate) fn coalesce(origin: &ParamItem, state: Option<&StateRow>) -> Option<OverlayItem> {
    let Some(state) = state else {
        return Some(OverlayItem {
            id: origin.id,
            source: ItemSource::Origin,
            fields: origin.fields.clone(),
        });
    };
    if state.suppressed {
        return None;
    }
    let o = &state.overrides;
    let base = &origin.fields;
    Some(OverlayItem {
        id: origin.id,
        source: if o.is_empty() {
            ItemSource::Origin
        } else {
            ItemSource::Mixed
        },
        fields: ParamFields {
            key: o.key.clone().unwrap_or_else(|| base.key.clone()),
            value: o.value.clone().unwrap_or_else(|| base.value.clone()),
            description: o
                .description
                .clone()
                .unwrap_or_else(|| base.description.clone()),
            enabled: o.enabled.unwrap_or(base.enabled),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> ParamItem {
        ParamItem {
            id: Id::now(),
            example_id: Id::now(),
            fields: ParamFields::new("Accept", "text/plain"),
            prev: None,
            next: None,
        }
    }

    #[test]
    fn no_state_is_origin() {
        let item = coalesce(&origin(), None).unwrap();
        assert_eq!(item.source, ItemSource::Origin);
        assert_eq!(item.fields.value, "text/plain");
    }

    #[test]
    fn overrides_win_field_by_field() {
        let state = StateRow {
            suppressed: false,
            overrides: ParamPatch::value("application/json"),
        };
        let item = coalesce(&origin(), Some(&state)).unwrap();
        assert_eq!(item.source, ItemSource::Mixed);
        assert_eq!(item.fields.key, "Accept");
        assert_eq!(item.fields.value, "application/json");
    }

    #[test]
    fn explicit_disable_counts_as_override() {
        let state = StateRow {
            suppressed: false,
            overrides: ParamPatch {
                enabled: Some(false),
                ..ParamPatch::default()
            },
        };
        let item = coalesce(&origin(), Some(&state)).unwrap();
        assert_eq!(item.source, ItemSource::Mixed);
        assert!(!item.fields.enabled);
    }

    #[test]
    fn suppressed_is_hidden_and_empty_state_is_origin() {
        let hidden = StateRow {
            suppressed: true,
            overrides: ParamPatch::value("x"),
        };
        assert_eq!(coalesce(&origin(), Some(&hidden)), None);
        let blank = StateRow::default();
        assert_eq!(
            coalesce(&origin(), Some(&blank)).unwrap().source,
            ItemSource::Origin
        );
    }
}
