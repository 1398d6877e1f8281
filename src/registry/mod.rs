pub mod binding;
pub mod catalog;
pub mod handlers;
pub mod params;
pub mod reference;
pub mod validation;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CapabilityError, CapabilityFault};
use crate::model::Project;
use crate::state::{AppState, CancelToken};

use binding::Signature;
use handlers::{analysis, lyrics, timeline};

// ── Capability metadata ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityCategory {
    Edit,
    Query,
    Analysis,
}

impl CapabilityCategory {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Query => "query",
            Self::Analysis => "analysis",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Edit => "Create, modify, delete and clear timeline segments",
            Self::Query => "Inspect timelines and aligned lyrics",
            Self::Analysis => "Audio analysis: beats and tempo",
        }
    }

    pub fn all() -> &'static [CapabilityCategory] {
        &[Self::Edit, Self::Query, Self::Analysis]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CapabilityInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub category: CapabilityCategory,
    /// Whether the capability changes the project.
    pub mutates: bool,
}

// ── Call context ────────────────────────────────────────────────

/// What a capability receives besides its arguments: the injected state and,
/// for script runs, the run's cancellation token.
pub struct CallContext<'a> {
    pub state: &'a AppState,
    cancel: Option<&'a CancelToken>,
}

impl<'a> CallContext<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state, cancel: None }
    }

    pub fn with_cancel(state: &'a AppState, cancel: &'a CancelToken) -> Self {
        Self {
            state,
            cancel: Some(cancel),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    pub fn read_project<R>(&self, f: impl FnOnce(&Project) -> R) -> R {
        self.state.with_project(f)
    }

    /// Run one validated mutation under the project lock. `f` must check
    /// everything before changing anything; an `Err` means nothing changed.
    /// The cancellation check happens under the same lock the deadline
    /// handler takes, so a timed-out run can never mutate afterwards.
    pub fn mutate_project<R>(
        &self,
        f: impl FnOnce(&mut Project) -> Result<R, CapabilityFault>,
    ) -> Result<R, CapabilityFault> {
        self.state.with_project_mut(|project| {
            if self.is_cancelled() {
                return Err(CapabilityFault::Cancelled);
            }
            f(project)
        })
    }
}

// ── Capability trait ────────────────────────────────────────────

/// A named operation exposed to the agent, both as a direct tool and as a
/// script function. All capabilities share one contract: a JSON argument
/// object in, a JSON descriptor or a typed fault out.
pub trait Capability: Send + Sync {
    fn info(&self) -> &CapabilityInfo;

    /// JSON schema of the argument object.
    fn param_schema(&self) -> &Value;

    fn signature(&self) -> &Signature;

    fn invoke(&self, ctx: &CallContext<'_>, args: &Map<String, Value>) -> Result<Value, CapabilityError>;

    fn name(&self) -> &'static str {
        self.info().name
    }
}

type Handler<P, R> = fn(&CallContext<'_>, P) -> Result<R, CapabilityFault>;

/// Adapts a typed handler function into a [`Capability`].
pub struct Wrapper<P, R> {
    info: CapabilityInfo,
    schema: Value,
    signature: Signature,
    handler: Handler<P, R>,
}

impl<P, R> Wrapper<P, R>
where
    P: DeserializeOwned + JsonSchema + 'static,
    R: Serialize + 'static,
{
    pub fn new(info: CapabilityInfo, handler: Handler<P, R>) -> Self {
        let schema = catalog::schema_value::<P>();
        let signature = Signature::from_schema(&schema);
        Self {
            info,
            schema,
            signature,
            handler,
        }
    }

    pub fn boxed(info: CapabilityInfo, handler: Handler<P, R>) -> Box<dyn Capability> {
        Box::new(Self::new(info, handler))
    }
}

impl<P, R> Capability for Wrapper<P, R>
where
    P: DeserializeOwned + JsonSchema + 'static,
    R: Serialize + 'static,
{
    fn info(&self) -> &CapabilityInfo {
        &self.info
    }

    fn param_schema(&self) -> &Value {
        &self.schema
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, ctx: &CallContext<'_>, args: &Map<String, Value>) -> Result<Value, CapabilityError> {
        let fail = |fault| CapabilityError::new(self.info.name, fault);
        let params: P = self.signature.bind(args).map_err(fail)?;
        log::debug!("capability {} invoked", self.info.name);
        let output = (self.handler)(ctx, params).map_err(fail)?;
        serde_json::to_value(output).map_err(|e| fail(CapabilityFault::Internal(e.to_string())))
    }
}

// ── Registry ────────────────────────────────────────────────────

/// Explicit name → capability table. Lookup order is registration order,
/// which is also the order shown to the agent.
#[derive(Default)]
pub struct Registry {
    capabilities: IndexMap<&'static str, Box<dyn Capability>>,
}

impl Registry {
    /// Every built-in capability.
    pub fn standard() -> Self {
        use CapabilityCategory::{Analysis, Edit, Query};

        let mut registry = Self::default();
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "create_segment",
                description: "Color one ball from startTime to endTime. Overlapping segments on that timeline are trimmed, split or removed.",
                category: Edit,
                mutates: true,
            },
            timeline::create_segment,
        ));
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "modify_segment",
                description: "Change the times, color or pixel count of one existing segment.",
                category: Edit,
                mutates: true,
            },
            timeline::modify_segment,
        ));
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "delete_segment",
                description: "Delete one segment from a timeline.",
                category: Edit,
                mutates: true,
            },
            timeline::delete_segment,
        ));
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "clear_timeline",
                description: "Remove every segment from one ball's timeline.",
                category: Edit,
                mutates: true,
            },
            timeline::clear_timeline,
        ));
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "clear_all_timelines",
                description: "Remove every segment from every timeline.",
                category: Edit,
                mutates: true,
            },
            timeline::clear_all_timelines,
        ));
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "list_segments",
                description: "List the segments on one ball's timeline in start-time order.",
                category: Query,
                mutates: false,
            },
            timeline::list_segments,
        ));
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "get_word_timestamps",
                description: "Find when a word is sung, from the aligned lyrics.",
                category: Query,
                mutates: false,
            },
            lyrics::get_word_timestamps,
        ));
        registry.register(Wrapper::boxed(
            CapabilityInfo {
                name: "get_beats_in_range",
                description: "Beat and downbeat times between startTime and endTime.",
                category: Analysis,
                mutates: false,
            },
            analysis::get_beats_in_range,
        ));
        registry
    }

    /// Add a capability. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, capability: Box<dyn Capability>) {
        let name = capability.name();
        if self.capabilities.insert(name, capability).is_some() {
            log::warn!("capability {name} registered twice; keeping the later one");
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Capability> {
        self.capabilities.get(name).map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.capabilities.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Capability> {
        self.capabilities.values().map(|c| c.as_ref())
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
