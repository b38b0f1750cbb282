//! Pass registry mapping pass names to constructors.
//!
//! A [`PassRegistry`] is an explicit catalog that can be built and handed to
//! a pipeline. The process-wide catalog returned by [`global`] holds the
//! built-in passes. It is built on first use (or by [`init`] at startup) and
//! is read-only afterwards. A failed build is returned to the caller and
//! retried on the next call.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;

use crate::error::{PassError, Result};
use crate::pass::Pass;
use crate::ps_server;

/// Constructor producing a fresh pass instance.
pub type PassFactory = fn() -> Box<dyn Pass>;

/// Factory for any pass with a `Default` impl.
pub fn default_factory<P>() -> Box<dyn Pass>
where
    P: Pass + Default + 'static,
{
    Box::new(P::default())
}

/// Name → constructor table. Each name may be registered once.
#[derive(Default)]
pub struct PassRegistry {
    factories: BTreeMap<String, PassFactory>,
    order: Vec<String>,
}

impl PassRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in parameter-server passes.
    pub fn with_builtin_passes() -> Result<Self> {
        let mut registry = Self::new();
        ps_server::register_builtin_passes(&mut registry)?;
        Ok(registry)
    }

    /// Registers a constructor under `name`.
    pub fn register(&mut self, name: &str, factory: PassFactory) -> Result<()> {
        if self.factories.contains_key(name) {
            return Err(PassError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.factories.insert(name.to_string(), factory);
        self.order.push(name.to_string());
        tracing::debug!(pass = %name, "registered pass");
        Ok(())
    }

    /// Registers `P` under the name its instances report.
    pub fn register_default<P>(&mut self) -> Result<()>
    where
        P: Pass + Default + 'static,
    {
        let name = P::default().name();
        self.register(name, default_factory::<P>)
    }

    /// Returns a fresh instance of the pass registered as `name`.
    pub fn create(&self, name: &str) -> Result<Box<dyn Pass>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| PassError::UnknownPass {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl std::fmt::Debug for PassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassRegistry")
            .field("passes", &self.order)
            .finish()
    }
}

static GLOBAL_REGISTRY: OnceCell<PassRegistry> = OnceCell::new();

/// Builds the process-wide registry; call once at startup.
pub fn init() -> Result<&'static PassRegistry> {
    GLOBAL_REGISTRY.get_or_try_init(|| {
        let registry = PassRegistry::with_builtin_passes()?;
        tracing::debug!(passes = registry.len(), "built process-wide pass registry");
        Ok(registry)
    })
}

/// The process-wide registry of built-in passes.
pub fn global() -> Result<&'static PassRegistry> {
    init()
}

/// Creates a pass from the process-wide registry.
pub fn new_pass(name: &str) -> Result<Box<dyn Pass>> {
    global()?.create(name)
}
