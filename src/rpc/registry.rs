//! Method registry: name-to-handler mapping fixed at startup.
//!
//! Handlers carry an explicit Async/Sync tag from the moment they are
//! registered; nothing is inferred at call time. Dotted names
//! (`ns.method`) are ordinary registrations gated by an explicit
//! builder switch and validated for uniqueness, replacing dynamic
//! attribute walks.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::common::error::HandlerError;
use crate::protocol::xmlrpc::Value;

/// Boxed future returned by method handlers.
pub type MethodFuture = Pin<Box<dyn Future<Output = Result<Value, HandlerError>> + Send>>;

/// Handler that runs inline on the connection task.
pub type AsyncHandler = Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>;

/// Blocking/CPU-bound handler, a candidate for the worker pool.
pub type SyncHandler = Arc<dyn Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync>;

/// A registered method with its execution tag.
#[derive(Clone)]
pub enum Handler {
    Async(AsyncHandler),
    Sync(SyncHandler),
}

/// Catch-all resolver consulted when exact lookup fails.
///
/// Installing a hook delegates every unresolved name to it entirely;
/// the hook decides whether to answer or fail.
pub trait DispatchHook: Send + Sync {
    fn dispatch(&self, method: &str, params: Vec<Value>) -> MethodFuture;
}

/// Registration-time error.
#[derive(Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Name already registered
    Duplicate(String),
    /// Dotted name used without enabling dotted names
    DottedNotAllowed(String),
    /// Empty method name
    EmptyName,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Duplicate(name) => {
                write!(f, "method \"{}\" registered twice", name)
            }
            RegistryError::DottedNotAllowed(name) => {
                write!(f, "dotted method name \"{}\" requires allow_dotted_names", name)
            }
            RegistryError::EmptyName => write!(f, "empty method name"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Builder for [`MethodRegistry`]. Names are validated as they arrive
/// so a bad registration fails at startup, not at call time.
#[derive(Default)]
pub struct RegistryBuilder {
    funcs: HashMap<String, Handler>,
    hook: Option<Arc<dyn DispatchHook>>,
    allow_dotted_names: bool,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit `ns.method` style names.
    pub fn allow_dotted_names(mut self) -> Self {
        self.allow_dotted_names = true;
        self
    }

    /// Register a handler that runs inline on the connection task.
    pub fn register_async<F, Fut>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |params| -> MethodFuture { Box::pin(f(params)) });
        self.insert(name, Handler::Async(handler))
    }

    /// Register a blocking handler, routed through the worker pool when
    /// one is configured.
    pub fn register_sync<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(Vec<Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.insert(name, Handler::Sync(Arc::new(f)))
    }

    /// Install the catch-all dispatch hook.
    pub fn dispatch_hook(&mut self, hook: Arc<dyn DispatchHook>) {
        self.hook = Some(hook);
    }

    fn insert(&mut self, name: &str, handler: Handler) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if name.contains('.') && !self.allow_dotted_names {
            return Err(RegistryError::DottedNotAllowed(name.to_string()));
        }
        if self.funcs.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.funcs.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn build(self) -> MethodRegistry {
        MethodRegistry {
            funcs: self.funcs,
            hook: self.hook,
        }
    }
}

/// Immutable method table shared by every connection task.
pub struct MethodRegistry {
    funcs: HashMap<String, Handler>,
    hook: Option<Arc<dyn DispatchHook>>,
}

impl MethodRegistry {
    /// Exact-name lookup.
    pub fn lookup(&self, name: &str) -> Option<&Handler> {
        self.funcs.get(name)
    }

    pub fn hook(&self) -> Option<&Arc<dyn DispatchHook>> {
        self.hook.as_ref()
    }

    /// True if at least one registered method is tagged Sync; governs
    /// whether a worker pool is worth creating.
    pub fn has_sync_methods(&self) -> bool {
        self.funcs.values().any(|h| matches!(h, Handler::Sync(_)))
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
