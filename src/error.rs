//! Errors and warnings raised by the reactive core and the reconciler.
//!
//! Errors come from user code: tracked functions, watch callbacks, lifecycle
//! hooks and render functions. They are wrapped with enough context to say
//! *which* computation failed and then either propagated to the caller or
//! routed to the central handler on the [`Runtime`](crate::Runtime).
//!
//! Warnings are diagnostics that never interrupt work: duplicate sibling keys,
//! runaway update loops, invalid props.

use std::rc::Rc;

use crate::component::Hook;
use crate::vdom::Key;

/// An error produced while evaluating user code inside the core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A watcher's tracked function failed.
    #[error("error evaluating watcher \"{expression}\": {source}")]
    Evaluation {
        /// Label of the failing watcher.
        expression: Rc<str>,
        #[source]
        source: anyhow::Error,
    },

    /// A watch callback failed.
    #[error("error in callback for watcher \"{expression}\": {source}")]
    Callback {
        /// Label of the watcher whose callback failed.
        expression: Rc<str>,
        #[source]
        source: anyhow::Error,
    },

    /// A lifecycle hook failed.
    #[error("error in {hook} hook of <{component}>: {source}")]
    Hook {
        hook: Hook,
        component: Rc<str>,
        #[source]
        source: anyhow::Error,
    },

    /// A render function failed.
    #[error("error rendering <{component}>: {source}")]
    Render {
        component: Rc<str>,
        #[source]
        source: anyhow::Error,
    },

    /// An event listener registered through a component node failed.
    #[error("error in \"{event}\" listener of <{component}>: {source}")]
    Listener {
        event: Rc<str>,
        component: Rc<str>,
        #[source]
        source: anyhow::Error,
    },
}

/// A non-fatal diagnostic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Warning {
    /// Two siblings in one child list share a key. The first occurrence wins.
    #[error("duplicate key {key:?} detected among siblings; this may cause an update error")]
    DuplicateKey { key: Key },

    /// A watcher was invalidated too many times within a single flush.
    #[error("you may have an infinite update loop in watcher \"{expression}\" ({count} runs in one flush)")]
    InfiniteUpdate { expression: Rc<str>, count: u32 },

    /// A required prop was not passed.
    #[error("missing required prop \"{prop}\" on <{component}>")]
    MissingRequiredProp { component: Rc<str>, prop: Rc<str> },

    /// A prop value failed its validator.
    #[error("invalid prop: custom validator check failed for prop \"{prop}\" on <{component}>")]
    InvalidProp { component: Rc<str>, prop: Rc<str> },

    /// A prop was assigned from inside the component that receives it.
    #[error("avoid mutating prop \"{prop}\" of <{component}> directly; it is overwritten on parent re-render")]
    MutatedProp { component: Rc<str>, prop: Rc<str> },

    /// A component read a key that is neither a prop, data field nor computed value.
    #[error("property \"{key}\" is not defined on <{component}>")]
    UnknownProperty { component: Rc<str>, key: Rc<str> },
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
