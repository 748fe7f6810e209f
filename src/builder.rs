//! Fluent assembly of a backend and its decorators into one store.
//!
//! [`CacheBuilder`] is an immutable description: every `with_*` call returns
//! a new builder, so a partially configured builder can serve as a template
//! for several caches. Nothing is resolved until [`try_build`]:
//!
//! 1. resolve the backend (`ArgumentError` if none is configured or the name
//!    is unknown),
//! 2. reject decorator names listed more than once,
//! 3. wrap the backend in each decorator, in declaration order,
//! 4. if instrumentation was requested, wrap the result in the
//!    `instrumented` decorator last.
//!
//! Each stage is chained with [`Either::bind`], so the first failure is the
//! one returned.
//!
//! [`try_build`]: CacheBuilder::try_build
//!
//! ## Example
//!
//! ```
//! use typed_cache::prelude::*;
//!
//! let store = CacheBuilder::<String>::new()
//!     .with_backend("memory")
//!     .with_instrumentation()
//!     .try_build(Namespace::at(["users"]))
//!     .right_or_raise();
//!
//! assert_eq!(store.store_type(), "instrumented(memory)");
//! let greet = store.cache_ref("greet");
//! assert!(greet.fetch(|| Some("hello".to_string())).right_or_raise().is_computed());
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::algebra::Either;
use crate::config::CacheConfig;
use crate::decorator::instrumented::INSTRUMENTED;
use crate::decorator::{DecoratedStore, Instrumented};
use crate::error::{CacheError, CacheResult};
use crate::instrument::Instrumenter;
use crate::namespace::Namespace;
use crate::registry::{BackendArgs, DecoratorArgs, InstrumenterSource, Options, Registries};
use crate::traits::SharedStore;

#[derive(Debug, Clone)]
struct Component {
    name: String,
    options: Options,
}

/// Immutable cache pipeline description.
pub struct CacheBuilder<V> {
    config: CacheConfig,
    registries: Arc<Registries<V>>,
    backend: Option<Component>,
    decorators: Vec<Component>,
    instrumentation: Option<InstrumenterSource>,
}

impl<V> CacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Default config and a fresh set of default registries.
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            registries: Arc::new(Registries::with_defaults()),
            backend: None,
            decorators: Vec::new(),
            instrumentation: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The registries this builder resolves against. Registering on them
    /// affects every builder sharing them.
    pub fn registries(&self) -> &Arc<Registries<V>> {
        &self.registries
    }

    pub fn with_config(&self, config: CacheConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    pub fn with_registries(&self, registries: Arc<Registries<V>>) -> Self {
        Self {
            registries,
            ..self.clone()
        }
    }

    pub fn with_backend(&self, name: impl Into<String>) -> Self {
        self.with_backend_options(name, Options::new())
    }

    pub fn with_backend_options(&self, name: impl Into<String>, options: Options) -> Self {
        Self {
            backend: Some(Component {
                name: name.into(),
                options,
            }),
            ..self.clone()
        }
    }

    /// Appends a decorator. Decorators wrap in the order they are added.
    pub fn with_decorator(&self, name: impl Into<String>) -> Self {
        self.with_decorator_options(name, Options::new())
    }

    pub fn with_decorator_options(&self, name: impl Into<String>, options: Options) -> Self {
        let mut next = self.clone();
        next.decorators.push(Component {
            name: name.into(),
            options,
        });
        next
    }

    /// Instruments with the configured instrumenter, or the null one when
    /// instrumentation is disabled in the config.
    pub fn with_instrumentation(&self) -> Self {
        self.with_instrumentation_source(InstrumenterSource::Config)
    }

    /// Instruments with a registered instrumenter, regardless of the config's
    /// `enabled` flag.
    pub fn with_instrumenter(&self, name: impl Into<String>) -> Self {
        self.with_instrumentation_source(InstrumenterSource::Named(name.into()))
    }

    pub fn with_instrumenter_instance(&self, instrumenter: Arc<dyn Instrumenter>) -> Self {
        self.with_instrumentation_source(InstrumenterSource::Instance(instrumenter))
    }

    fn with_instrumentation_source(&self, source: InstrumenterSource) -> Self {
        Self {
            instrumentation: Some(source),
            ..self.clone()
        }
    }

    /// Assembles the pipeline under `namespace`.
    pub fn try_build(&self, namespace: Namespace) -> CacheResult<SharedStore<V>> {
        debug!(
            namespace = %namespace,
            backend = self.backend.as_ref().map(|b| b.name.as_str()),
            decorators = self.decorators.len(),
            instrumented = self.instrumentation.is_some(),
            "building cache"
        );
        self.create_backend(namespace)
            .bind(|store| self.check_duplicates().map(|()| store))
            .bind(|store| self.apply_decorators(store))
            .bind(|store| self.apply_instrumentation(store))
    }

    /// [`try_build`](Self::try_build) under the config's default namespace.
    pub fn try_build_default(&self) -> CacheResult<SharedStore<V>> {
        self.try_build(Namespace::at_with(&self.config, std::iter::empty::<&str>()))
    }

    /// [`try_build`](Self::try_build) for callers that treat a bad
    /// configuration as a bug.
    ///
    /// # Panics
    ///
    /// If any build stage fails.
    pub fn build(&self, namespace: Namespace) -> SharedStore<V> {
        self.try_build(namespace).right_or_raise()
    }

    fn create_backend(&self, namespace: Namespace) -> CacheResult<SharedStore<V>> {
        let Some(backend) = &self.backend else {
            return Either::Left(CacheError::argument("Backend not configured"));
        };
        let args = BackendArgs::new(namespace, backend.options.clone());
        self.registries.backends.resolve(&backend.name, &args)
    }

    fn check_duplicates(&self) -> CacheResult<()> {
        let mut duplicates: Vec<&str> = Vec::new();
        for (i, decorator) in self.decorators.iter().enumerate() {
            let name = decorator.name.as_str();
            let repeated = self.decorators[..i].iter().any(|d| d.name == name);
            if repeated && !duplicates.contains(&name) {
                duplicates.push(name);
            }
        }
        if duplicates.is_empty() {
            Either::Right(())
        } else {
            Either::Left(CacheError::argument(format!(
                "Duplicate decorators: {}",
                duplicates.join(", ")
            )))
        }
    }

    fn apply_decorators(&self, store: SharedStore<V>) -> CacheResult<SharedStore<V>> {
        self.decorators
            .iter()
            .fold(Either::Right(store), |acc, decorator| {
                acc.bind(|inner| {
                    let args = DecoratorArgs {
                        inner,
                        options: decorator.options.clone(),
                        config: self.config.clone(),
                        instrumenters: Arc::clone(&self.registries.instrumenters),
                    };
                    self.registries.decorators.resolve(&decorator.name, &args)
                })
            })
    }

    fn apply_instrumentation(&self, store: SharedStore<V>) -> CacheResult<SharedStore<V>> {
        let Some(source) = &self.instrumentation else {
            return Either::Right(store);
        };
        self.registries
            .instrumenters
            .resolve_source(source, &self.config)
            .map(|instrumenter| {
                debug!(
                    decorator = INSTRUMENTED,
                    instrumenter = ?instrumenter,
                    "instrumenting cache"
                );
                DecoratedStore::new(store, Instrumented::new(instrumenter)).into_shared()
            })
    }
}

impl<V> Clone for CacheBuilder<V> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            registries: Arc::clone(&self.registries),
            backend: self.backend.clone(),
            decorators: self.decorators.clone(),
            instrumentation: self.instrumentation.clone(),
        }
    }
}

impl<V> Default for CacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for CacheBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBuilder")
            .field("backend", &self.backend.as_ref().map(|b| &b.name))
            .field(
                "decorators",
                &self.decorators.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            )
            .field("instrumentation", &self.instrumentation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::decorator::Decorator;
    use crate::error::BoxError;
    use crate::traits::StoreExt;

    struct Tagging;

    impl Decorator for Tagging {
        fn name(&self) -> &str {
            "tagging"
        }
    }

    fn with_tagging() -> CacheBuilder<String> {
        let builder = CacheBuilder::new();
        builder
            .registries()
            .decorators
            .register(
                "tagging",
                |args: &DecoratorArgs<String>| -> Result<SharedStore<String>, BoxError> {
                    Ok(DecoratedStore::new(Arc::clone(&args.inner), Tagging).into_shared())
                },
            )
            .right_or_raise();
        builder
    }

    #[test]
    fn missing_backend_is_argument_error() {
        let err = CacheBuilder::<String>::new().try_build(Namespace::root()).left().unwrap();
        assert!(err.is_argument());
        assert_eq!(err.to_string(), "Backend not configured");
    }

    #[test]
    fn unknown_backend_is_argument_error() {
        let err = CacheBuilder::<String>::new()
            .with_backend("redis")
            .try_build(Namespace::root())
            .left()
            .unwrap();
        assert_eq!(err.to_string(), "Unknown backend: redis");
    }

    #[test]
    fn unknown_decorator_names_it() {
        let err = CacheBuilder::<String>::new()
            .with_backend("memory")
            .with_decorator("compressing")
            .try_build(Namespace::root())
            .left()
            .unwrap();
        assert!(err.is_argument());
        assert!(err.to_string().contains("compressing"));
    }

    #[test]
    fn duplicate_decorators_are_listed() {
        let err = with_tagging()
            .with_backend("memory")
            .with_decorator("tagging")
            .with_decorator("instrumented")
            .with_decorator("tagging")
            .with_decorator("tagging")
            .try_build(Namespace::root())
            .left()
            .unwrap();
        assert_eq!(err.to_string(), "Duplicate decorators: tagging");
    }

    #[test]
    fn decorators_wrap_in_declaration_order() {
        let store = with_tagging()
            .with_backend("memory")
            .with_decorator("tagging")
            .with_decorator("instrumented")
            .with_instrumenter("log")
            .try_build(Namespace::root())
            .right_or_raise();
        assert_eq!(
            store.store_type(),
            "instrumented(instrumented(tagging(memory)))"
        );
    }

    #[test]
    fn builders_are_reusable_templates() {
        let base = CacheBuilder::<String>::new().with_backend("memory");
        let plain = base.try_build(Namespace::root()).right_or_raise();
        let instrumented = base
            .with_instrumentation()
            .try_build(Namespace::root())
            .right_or_raise();

        assert_eq!(plain.store_type(), "memory");
        assert_eq!(instrumented.store_type(), "instrumented(memory)");
        assert_eq!(base.build(Namespace::root()).store_type(), "memory");
    }

    #[test]
    fn backend_options_reach_the_factory() {
        let store = CacheBuilder::<String>::new()
            .with_backend_options("memory", Options::new().with("ttl", Duration::ZERO))
            .try_build(Namespace::root())
            .right_or_raise();
        store.set("k", "v".to_string()).right_or_raise();
        assert!(!store.has("k"));

        let err = CacheBuilder::<String>::new()
            .with_backend_options("memory", Options::new().with("ttl", "soon"))
            .try_build(Namespace::root())
            .left()
            .unwrap();
        assert!(err.is_type());
    }

    #[test]
    fn default_namespace_comes_from_config() {
        let store = CacheBuilder::<String>::new()
            .with_config(CacheConfig::default().with_default_namespace("svc").with_delimiter("/"))
            .with_backend("memory")
            .try_build_default()
            .right_or_raise();
        assert_eq!(store.key("k").to_string(), "svc/k");
    }

    #[test]
    #[should_panic(expected = "Backend not configured")]
    fn build_panics_on_error() {
        CacheBuilder::<String>::new().build(Namespace::root());
    }
}
