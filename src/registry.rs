//! Name → factory registries for backends, decorators and instrumenters.
//!
//! ## Architecture
//!
//! ```text
//!   Registries<V>
//!   ┌─────────────────────────────────────────────────────────────────────┐
//!   │ backends:      Registry<BackendArgs, SharedStore<V>>                │
//!   │                  "memory"        → MemoryBackend (ttl, shared)      │
//!   │ decorators:    Registry<DecoratorArgs<V>, SharedStore<V>>           │
//!   │                  "instrumented"  → DecoratedStore<V, Instrumented>  │
//!   │ instrumenters: InstrumenterRegistry (one instance per name + ns)    │
//!   │                  "null" "default" "notifications" "log"            │
//!   └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Registry::resolve`] never panics and never returns a raw factory error:
//!
//! | Situation                         | Result                                   |
//! |-----------------------------------|------------------------------------------|
//! | name not registered               | `ArgumentError "Unknown <kind>: <name>"` |
//! | factory returned a `TypeError`, `ArgumentError` or `CacheError` | that error |
//! | factory returned any other error  | `StoreError` op `<kind>_creation`        |
//! | factory panicked                  | `StoreError` op `<kind>_creation`        |
//!
//! Construction options travel as [`Options`], a string-keyed map of
//! [`OptionValue`]s whose typed getters report mismatches as
//! [`TypeError`]s.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::algebra::Either;
use crate::config::CacheConfig;
use crate::decorator::instrumented::INSTRUMENTED;
use crate::decorator::{DecoratedStore, Instrumented};
use crate::error::{ArgumentError, BoxError, CacheError, CacheResult, StoreError, TypeError};
use crate::instrument::{
    Instrumenter, LogInstrumenter, NotificationsInstrumenter, NullInstrumenter, panic_message,
};
use crate::namespace::Namespace;
use crate::store::{MemoryBackend, MemoryOptions};
use crate::traits::SharedStore;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// A construction option value.
#[derive(Debug, Clone)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Duration(Duration),
    Instrumenter(Arc<dyn Instrumenter>),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "integer",
            OptionValue::Str(_) => "string",
            OptionValue::Duration(_) => "duration",
            OptionValue::Instrumenter(_) => "instrumenter",
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<Duration> for OptionValue {
    fn from(value: Duration) -> Self {
        OptionValue::Duration(value)
    }
}

impl From<Arc<dyn Instrumenter>> for OptionValue {
    fn from(value: Arc<dyn Instrumenter>) -> Self {
        OptionValue::Instrumenter(value)
    }
}

/// Where an instrumenter comes from.
#[derive(Debug, Clone)]
pub enum InstrumenterSource {
    /// The configured instrumenter, or `null` when instrumentation is
    /// disabled in [`CacheConfig`].
    Config,
    /// A registered instrumenter name.
    Named(String),
    /// A ready-made instance.
    Instance(Arc<dyn Instrumenter>),
}

/// Named construction options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    values: FxHashMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, TypeError> {
        match self.get(name) {
            None => Ok(None),
            Some(OptionValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(mismatch(name, "bool", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, TypeError> {
        match self.get(name) {
            None => Ok(None),
            Some(OptionValue::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(mismatch(name, "integer", other)),
        }
    }

    pub fn str(&self, name: &str) -> Result<Option<&str>, TypeError> {
        match self.get(name) {
            None => Ok(None),
            Some(OptionValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(mismatch(name, "string", other)),
        }
    }

    /// A duration, or a non-negative integer number of seconds.
    pub fn duration(&self, name: &str) -> Result<Option<Duration>, TypeError> {
        match self.get(name) {
            None => Ok(None),
            Some(OptionValue::Duration(d)) => Ok(Some(*d)),
            Some(OptionValue::Int(secs)) if *secs >= 0 => {
                Ok(Some(Duration::from_secs(*secs as u64)))
            },
            Some(other) => Err(mismatch(name, "duration or non-negative seconds", other)),
        }
    }

    /// An instrumenter name or instance.
    pub fn instrumenter(&self, name: &str) -> Result<Option<InstrumenterSource>, TypeError> {
        match self.get(name) {
            None => Ok(None),
            Some(OptionValue::Str(s)) => Ok(Some(InstrumenterSource::Named(s.clone()))),
            Some(OptionValue::Instrumenter(i)) => {
                Ok(Some(InstrumenterSource::Instance(Arc::clone(i))))
            },
            Some(other) => Err(mismatch(name, "instrumenter name or instance", other)),
        }
    }
}

fn mismatch(name: &str, expected: &str, value: &OptionValue) -> TypeError {
    let actual = value.type_name();
    TypeError::new(
        expected,
        actual,
        value,
        format!("Option '{name}' expected {expected}, got {actual}"),
    )
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Factory stored in a [`Registry`].
pub type Factory<A, T> = Arc<dyn Fn(&A) -> Result<T, BoxError> + Send + Sync>;

/// Thread-safe map from names to factories taking `&A` and producing `T`.
pub struct Registry<A, T> {
    kind: String,
    factories: RwLock<FxHashMap<String, Factory<A, T>>>,
}

impl<A, T> Registry<A, T> {
    /// `kind` names what is produced (`backend`, `decorator`, ...) in error
    /// messages.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            factories: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Adds or replaces a factory. Blank names are rejected.
    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> CacheResult<()>
    where
        F: Fn(&A) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Either::Left(CacheError::argument(format!(
                "{} name cannot be empty",
                capitalize(&self.kind)
            )));
        }
        let replaced = self.factories.write().insert(name.clone(), Arc::new(factory)).is_some();
        debug!(kind = %self.kind, name = %name, replaced, "registered factory");
        Either::Right(())
    }

    /// Looks `name` up and runs its factory. See the module docs for the
    /// error mapping.
    pub fn resolve(&self, name: &str, args: &A) -> CacheResult<T> {
        let Some(factory) = self.find(name) else {
            return Either::Left(CacheError::argument(format!("Unknown {}: {}", self.kind, name)));
        };
        trace!(kind = %self.kind, name, "resolving");
        match panic::catch_unwind(AssertUnwindSafe(|| factory(args))) {
            Ok(Ok(value)) => Either::Right(value),
            Ok(Err(err)) => Either::Left(self.creation_error(name, err)),
            Err(payload) => {
                let err: BoxError = panic_message(payload.as_ref()).into();
                Either::Left(self.creation_error(name, err))
            },
        }
    }

    pub fn find(&self, name: &str) -> Option<Factory<A, T>> {
        self.factories.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Returns whether the name was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.factories.write().remove(name).is_some()
    }

    fn creation_error(&self, name: &str, err: BoxError) -> CacheError {
        let err = match err.downcast::<TypeError>() {
            Ok(type_error) => return CacheError::Type(*type_error),
            Err(err) => err,
        };
        let err = match err.downcast::<ArgumentError>() {
            Ok(argument_error) => return CacheError::Argument(*argument_error),
            Err(err) => err,
        };
        let err = match err.downcast::<CacheError>() {
            Ok(cache_error) => return *cache_error,
            Err(err) => err,
        };
        let message = format!("Failed to create {} '{}': {}", self.kind, name, err);
        StoreError::new(format!("{}_creation", self.kind), name, message)
            .with_boxed_cause(err)
            .into()
    }
}

impl<A, T> fmt::Debug for Registry<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("available", &self.available())
            .finish()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Factory arguments
// ---------------------------------------------------------------------------

/// Input to a backend factory.
#[derive(Debug, Clone)]
pub struct BackendArgs {
    pub namespace: Namespace,
    pub options: Options,
}

impl BackendArgs {
    pub fn new(namespace: Namespace, options: Options) -> Self {
        Self { namespace, options }
    }
}

/// Input to a decorator factory.
pub struct DecoratorArgs<V> {
    /// The store being wrapped.
    pub inner: SharedStore<V>,
    pub options: Options,
    pub config: CacheConfig,
    pub instrumenters: Arc<InstrumenterRegistry>,
}

impl<V> Clone for DecoratorArgs<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            options: self.options.clone(),
            config: self.config.clone(),
            instrumenters: Arc::clone(&self.instrumenters),
        }
    }
}

/// Input to an instrumenter factory.
#[derive(Debug, Clone)]
pub struct InstrumenterArgs {
    /// Event name prefix.
    pub namespace: String,
}

// ---------------------------------------------------------------------------
// InstrumenterRegistry
// ---------------------------------------------------------------------------

type InstanceKey = (String, String);

/// Instrumenter registry that hands out one shared instance per
/// `(name, namespace)`, so subscribers attached to a resolved instrumenter
/// see events from every store built with it.
pub struct InstrumenterRegistry {
    registry: Registry<InstrumenterArgs, Arc<dyn Instrumenter>>,
    instances: Mutex<FxHashMap<InstanceKey, Arc<dyn Instrumenter>>>,
}

impl InstrumenterRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new("instrumenter"),
            instances: Mutex::new(FxHashMap::default()),
        }
    }

    /// `null`, `default` (alias of `null`), `notifications` and `log`.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        let defaults: [(&str, Factory<InstrumenterArgs, Arc<dyn Instrumenter>>); 4] = [
            ("null", Arc::new(|args: &InstrumenterArgs| {
                Ok(Arc::new(NullInstrumenter::new(&args.namespace)) as Arc<dyn Instrumenter>)
            })),
            ("default", Arc::new(|args: &InstrumenterArgs| {
                Ok(Arc::new(NullInstrumenter::new(&args.namespace)) as Arc<dyn Instrumenter>)
            })),
            ("notifications", Arc::new(|args: &InstrumenterArgs| {
                let instrumenter = NotificationsInstrumenter::new(&args.namespace);
                Ok(Arc::new(instrumenter) as Arc<dyn Instrumenter>)
            })),
            ("log", Arc::new(|args: &InstrumenterArgs| {
                Ok(Arc::new(LogInstrumenter::new(&args.namespace)) as Arc<dyn Instrumenter>)
            })),
        ];
        for (name, factory) in defaults {
            registry.registry.factories.write().insert(name.to_string(), factory);
        }
        registry
    }

    /// Registering a name drops its cached instances.
    pub fn register<F>(&self, name: impl Into<String>, factory: F) -> CacheResult<()>
    where
        F: Fn(&InstrumenterArgs) -> Result<Arc<dyn Instrumenter>, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.evict(&name);
        self.registry.register(name, factory)
    }

    /// The cached instance for `(name, namespace)`, created on first use.
    ///
    /// The factory runs without the instance cache locked, so it may resolve
    /// other instrumenters. If two callers race, the first one cached wins.
    pub fn resolve(&self, name: &str, namespace: &str) -> CacheResult<Arc<dyn Instrumenter>> {
        let key = (name.to_string(), namespace.to_string());
        if let Some(existing) = self.instances.lock().get(&key) {
            return Either::Right(Arc::clone(existing));
        }
        let args = InstrumenterArgs {
            namespace: namespace.to_string(),
        };
        self.registry
            .resolve(name, &args)
            .map(|created| Arc::clone(self.instances.lock().entry(key).or_insert(created)))
    }

    pub fn resolve_source(
        &self,
        source: &InstrumenterSource,
        config: &CacheConfig,
    ) -> CacheResult<Arc<dyn Instrumenter>> {
        let namespace = &config.instrumentation.namespace;
        match source {
            InstrumenterSource::Config if config.instrumentation.enabled => {
                self.resolve(&config.instrumentation.instrumenter, namespace)
            },
            InstrumenterSource::Config => self.resolve("null", namespace),
            InstrumenterSource::Named(name) => self.resolve(name, namespace),
            InstrumenterSource::Instance(instance) => Either::Right(Arc::clone(instance)),
        }
    }

    pub fn available(&self) -> Vec<String> {
        self.registry.available()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.is_registered(name)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.evict(name);
        self.registry.unregister(name)
    }

    /// Forgets every cached instance.
    pub fn clear_instances(&self) {
        self.instances.lock().clear();
    }

    fn evict(&self, name: &str) {
        self.instances.lock().retain(|(n, _), _| n != name);
    }
}

impl Default for InstrumenterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for InstrumenterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumenterRegistry")
            .field("available", &self.available())
            .field("instances", &self.instances.lock().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

pub type BackendRegistry<V> = Registry<BackendArgs, SharedStore<V>>;
pub type DecoratorRegistry<V> = Registry<DecoratorArgs<V>, SharedStore<V>>;

/// The three registries a [`CacheBuilder`](crate::builder::CacheBuilder)
/// resolves against.
pub struct Registries<V> {
    pub backends: BackendRegistry<V>,
    pub decorators: DecoratorRegistry<V>,
    pub instrumenters: Arc<InstrumenterRegistry>,
}

impl<V> Registries<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// No backends or decorators; default instrumenters.
    pub fn empty() -> Self {
        Self {
            backends: Registry::new("backend"),
            decorators: Registry::new("decorator"),
            instrumenters: Arc::new(InstrumenterRegistry::with_defaults()),
        }
    }

    /// `memory` backend and `instrumented` decorator.
    pub fn with_defaults() -> Self {
        let registries = Self::empty();
        registries
            .backends
            .factories
            .write()
            .insert("memory".to_string(), Arc::new(memory_backend::<V>));
        registries
            .decorators
            .factories
            .write()
            .insert(INSTRUMENTED.to_string(), Arc::new(instrumented_decorator::<V>));
        registries
    }
}

impl<V> Default for Registries<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<V> fmt::Debug for Registries<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registries")
            .field("backends", &self.backends)
            .field("decorators", &self.decorators)
            .field("instrumenters", &self.instrumenters)
            .finish()
    }
}

/// Options: `ttl` (duration or seconds), `shared` (bool).
fn memory_backend<V>(args: &BackendArgs) -> Result<SharedStore<V>, BoxError>
where
    V: Clone + Send + Sync + 'static,
{
    let mut options = MemoryOptions::default();
    if let Some(ttl) = args.options.duration("ttl")? {
        options.ttl = ttl;
    }
    if let Some(shared) = args.options.bool("shared")? {
        options.shared = shared;
    }
    Ok(MemoryBackend::with_options(args.namespace.clone(), options).into_shared())
}

/// Option: `instrumenter` (name or instance). Without it the configured
/// instrumenter is used.
fn instrumented_decorator<V>(args: &DecoratorArgs<V>) -> Result<SharedStore<V>, BoxError>
where
    V: Send + Sync + 'static,
{
    let source = args.options.instrumenter("instrumenter")?.unwrap_or(InstrumenterSource::Config);
    let instrumenter = args.instrumenters.resolve_source(&source, &args.config).into_result()?;
    Ok(DecoratedStore::new(Arc::clone(&args.inner), Instrumented::new(instrumenter)).into_shared())
}
