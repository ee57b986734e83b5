//! The closed event catalogue.
//!
//! Every event the bus can carry is a variant of [`XEvent`]. Wiring and
//! store emitters are keyed by `XEvent`, so an unknown event name is a
//! compile error rather than a silent no-op.
//!
//! Each event also has a marker type in [`typed`] that binds the event to
//! its payload type:
//!
//! ```ignore
//! bus.emit_typed::<typed::UserTypedAQuery>("pizza".to_string(), None)?;
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Binds an event name to its payload type.
pub trait TypedEvent {
    const EVENT: XEvent;
    type Payload: Serialize + DeserializeOwned;
}

macro_rules! x_events {
    ($( $(#[$doc:meta])* $name:ident: $payload:ty, )*) => {
        /// Every event known to the bus.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum XEvent {
            $( $(#[$doc])* $name, )*
        }

        impl XEvent {
            pub const ALL: &'static [XEvent] = &[ $( XEvent::$name, )* ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( XEvent::$name => stringify!($name), )*
                }
            }

            /// Whether `payload` deserializes into this event's payload type.
            pub fn accepts(&self, payload: &Value) -> bool {
                match self {
                    $( XEvent::$name => serde_json::from_value::<$payload>(payload.clone()).is_ok(), )*
                }
            }
        }

        /// Marker types, one per event, implementing [`TypedEvent`].
        pub mod typed {
            use super::{TypedEvent, XEvent};
            #[allow(unused_imports)]
            use serde_json::Value;

            $(
                $(#[$doc])*
                pub struct $name;

                impl TypedEvent for $name {
                    const EVENT: XEvent = XEvent::$name;
                    type Payload = $payload;
                }
            )*
        }
    };
}

x_events! {
    // ── Search box ──
    /// The query typed in the search box changed.
    UserTypedAQuery: String,
    /// The user is still typing; fires before debouncing.
    UserIsTypingAQuery: String,
    /// The user submitted a query.
    UserAcceptedAQuery: String,
    /// The query was cleared.
    UserClearedQuery: String,
    UserPressedClearSearchBoxButton: (),
    UserFocusedSearchBox: (),
    UserBlurredSearchBox: (),
    UserHoveredInSearchBox: (),
    UserHoveredOutSearchBox: (),
    /// The search box module's query state changed.
    SearchBoxQueryChanged: String,

    // ── Suggestions and history ──
    UserSelectedAQuerySuggestion: Value,
    QuerySuggestionsChanged: Vec<Value>,
    QuerySuggestionsRequestUpdated: Value,
    UserSelectedAHistoryQuery: Value,
    UserPressedClearHistoryQueries: (),
    HistoryQueriesChanged: Vec<Value>,

    // ── Search ──
    SearchRequestChanged: Value,
    SearchRequestUpdated: Value,
    SearchResponseChanged: Value,
    ResultsChanged: Vec<Value>,
    UserClickedAResult: Value,
    UserReachedResultsListEnd: (),

    // ── Filters, sort, pagination ──
    FacetsChanged: Vec<Value>,
    SelectedFiltersChanged: Vec<Value>,
    UserClickedAFilter: Value,
    UserClickedClearAllFilters: (),
    SortChanged: String,
    UserClickedASort: String,
    PageChanged: u32,
    UserSelectedAPage: u32,

    // ── Extra params ──
    ExtraParamsProvided: Value,
    ExtraParamsInitialized: Value,
    ExtraParamsChanged: Value,
    ParamsLoadedFromUrl: Value,

    // ── Layout ──
    UserOpenedX: (),
    UserClosedX: (),

    // ── Lifecycle ──
    /// A module finished registering. Payload: the module name.
    ModuleRegistered: String,
    /// The request adapter reported a configuration change.
    AdapterConfigChanged: Value,
}

impl fmt::Display for XEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for XEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        XEvent::ALL
            .iter()
            .copied()
            .find(|event| event.name() == s)
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

/// Provenance attached to an emission.
///
/// Never required for correctness. Store emitters fill `module_name`;
/// components fill `module_name` and, for element-triggered events, `target`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    /// Identifier of the originating element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl WireMetadata {
    pub fn from_module(module_name: impl Into<String>) -> Self {
        Self {
            module_name: Some(module_name.into()),
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}
