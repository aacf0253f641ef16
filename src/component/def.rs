//! Component definitions.
//!
//! A [`ComponentDef`] is the static description shared by every instance of
//! a component: declared props, data initializer, computed values, watchers,
//! lifecycle hooks and the render function. Build one with the builder
//! methods and freeze it with [`ComponentDef::build`].
//!
//! ```ignore
//! let counter = ComponentDef::new("Counter")
//!     .prop(PropDef::new("start").default(0))
//!     .data(|vm| Object::from_iter([("count", vm.prop("start"))]))
//!     .computed("double", |vm| Ok(Value::from(vm.get("count").as_f64().unwrap_or(0.0) * 2.0)))
//!     .hook(Hook::Mounted, |_| Ok(()))
//!     .render(|vm| Ok(h("span").text_content(vm.get("count").to_string())))
//!     .build();
//! ```

use std::fmt;
use std::rc::Rc;

use super::instance::Instance;
use crate::error::Error;
use crate::reactive::{Object, Value};
use crate::vdom::VNode;

/// Lifecycle hook names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl Hook {
    pub fn name(self) -> &'static str {
        match self {
            Hook::BeforeCreate => "beforeCreate",
            Hook::Created => "created",
            Hook::BeforeMount => "beforeMount",
            Hook::Mounted => "mounted",
            Hook::BeforeUpdate => "beforeUpdate",
            Hook::Updated => "updated",
            Hook::Activated => "activated",
            Hook::Deactivated => "deactivated",
            Hook::BeforeDestroy => "beforeDestroy",
            Hook::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instance lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Mounted,
    Updated,
    Unmounted,
}

pub type HookFn = Rc<dyn Fn(&Instance) -> anyhow::Result<()>>;
pub type RenderFn = Rc<dyn Fn(&Instance) -> anyhow::Result<VNode>>;
pub type DataFn = Rc<dyn Fn(&Instance) -> Object>;
pub type ComputedFn = Rc<dyn Fn(&Instance) -> anyhow::Result<Value>>;
pub type WatchHandler = Rc<dyn Fn(&Instance, &Value, &Value) -> anyhow::Result<()>>;
pub type Validator = Rc<dyn Fn(&Value) -> bool>;
/// Receives the error and the instance it came from. Return `false` to stop
/// propagation.
pub type ErrorCapturedFn = Rc<dyn Fn(&Error, &Instance) -> bool>;
/// Event listener passed to a component node.
pub type Listener = Rc<dyn Fn(&[Value]) -> anyhow::Result<()>>;

// =============================================================================
// Props
// =============================================================================

/// A declared prop.
#[derive(Clone)]
pub struct PropDef {
    pub name: Rc<str>,
    pub required: bool,
    default: Option<Rc<dyn Fn() -> Value>>,
    validator: Option<Validator>,
}

impl PropDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            required: false,
            default: None,
            validator: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Default for primitives. The value is cloned per instance.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = Some(Rc::new(move || value.clone()));
        self
    }

    /// Default factory, for containers that must not be shared.
    pub fn default_with(mut self, factory: impl Fn() -> Value + 'static) -> Self {
        self.default = Some(Rc::new(factory));
        self
    }

    pub fn validator(mut self, check: impl Fn(&Value) -> bool + 'static) -> Self {
        self.validator = Some(Rc::new(check));
        self
    }

    pub(crate) fn default_value(&self) -> Value {
        self.default.as_ref().map(|f| f()).unwrap_or_default()
    }

    pub(crate) fn is_valid(&self, value: &Value) -> bool {
        self.validator.as_ref().is_none_or(|check| check(value))
    }
}

impl fmt::Debug for PropDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropDef")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("default", &self.default.is_some())
            .finish()
    }
}

// =============================================================================
// Watchers
// =============================================================================

/// What a declared watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// Dotted path from the instance, e.g. `"user.name"`.
    Path(Rc<str>),
    Getter(ComputedFn),
}

/// A declared watcher.
#[derive(Clone)]
pub struct WatchDef {
    pub source: WatchSource,
    pub handler: WatchHandler,
    pub deep: bool,
    pub immediate: bool,
    pub sync: bool,
}

impl WatchDef {
    pub fn path(path: &str, handler: impl Fn(&Instance, &Value, &Value) -> anyhow::Result<()> + 'static) -> Self {
        Self {
            source: WatchSource::Path(path.into()),
            handler: Rc::new(handler),
            deep: false,
            immediate: false,
            sync: false,
        }
    }

    pub fn getter(
        getter: impl Fn(&Instance) -> anyhow::Result<Value> + 'static,
        handler: impl Fn(&Instance, &Value, &Value) -> anyhow::Result<()> + 'static,
    ) -> Self {
        Self {
            source: WatchSource::Getter(Rc::new(getter)),
            handler: Rc::new(handler),
            deep: false,
            immediate: false,
            sync: false,
        }
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    pub(crate) fn label(&self) -> Rc<str> {
        match &self.source {
            WatchSource::Path(path) => path.clone(),
            WatchSource::Getter(_) => "getter".into(),
        }
    }
}

// =============================================================================
// Component Definition
// =============================================================================

/// Static description of a component.
#[derive(Clone)]
pub struct ComponentDef {
    name: Rc<str>,
    pub(crate) props: Vec<PropDef>,
    pub(crate) data: Option<DataFn>,
    pub(crate) computed: Vec<(Rc<str>, ComputedFn)>,
    pub(crate) watch: Vec<WatchDef>,
    pub(crate) hooks: Vec<(Hook, HookFn)>,
    pub(crate) error_captured: Vec<ErrorCapturedFn>,
    pub(crate) render: Option<RenderFn>,
}

impl ComponentDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            props: Vec::new(),
            data: None,
            computed: Vec::new(),
            watch: Vec::new(),
            hooks: Vec::new(),
            error_captured: Vec::new(),
            render: None,
        }
    }

    pub fn name(&self) -> Rc<str> {
        self.name.clone()
    }

    pub fn prop(mut self, prop: PropDef) -> Self {
        self.props.push(prop);
        self
    }

    pub fn data(mut self, init: impl Fn(&Instance) -> Object + 'static) -> Self {
        self.data = Some(Rc::new(init));
        self
    }

    pub fn computed(mut self, key: &str, getter: impl Fn(&Instance) -> anyhow::Result<Value> + 'static) -> Self {
        self.computed.push((key.into(), Rc::new(getter)));
        self
    }

    pub fn watch(mut self, watch: WatchDef) -> Self {
        self.watch.push(watch);
        self
    }

    /// Register a lifecycle hook. A hook may be registered more than once;
    /// registrations run in order.
    pub fn hook(mut self, hook: Hook, f: impl Fn(&Instance) -> anyhow::Result<()> + 'static) -> Self {
        self.hooks.push((hook, Rc::new(f)));
        self
    }

    pub fn error_captured(mut self, f: impl Fn(&Error, &Instance) -> bool + 'static) -> Self {
        self.error_captured.push(Rc::new(f));
        self
    }

    pub fn render(mut self, f: impl Fn(&Instance) -> anyhow::Result<VNode> + 'static) -> Self {
        self.render = Some(Rc::new(f));
        self
    }

    pub fn build(self) -> Rc<ComponentDef> {
        Rc::new(self)
    }

    pub fn prop_def(&self, name: &str) -> Option<&PropDef> {
        self.props.iter().find(|p| &*p.name == name)
    }

    pub(crate) fn hooks_for(&self, hook: Hook) -> impl Iterator<Item = &HookFn> {
        self.hooks.iter().filter(move |(h, _)| *h == hook).map(|(_, f)| f)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("computed", &self.computed.len())
            .field("watch", &self.watch.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
