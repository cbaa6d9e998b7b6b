//! Shared engine state: decoder and encoder registries, the decoder cache,
//! named-type lineage, and the active config format.
//!
//! [`Context::global`] is the process-wide default used by the top-level
//! convenience functions. Independent contexts can be created with
//! [`Context::new`] and passed to [`StructfigBuilder::context`](crate::StructfigBuilder::context)
//! where isolation is needed, e.g. in tests.
//!
//! Registries and the cache sit behind `RwLock`s; a lock is never held while
//! a decoder or encoder runs, so user functions may call back into the
//! context.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{DecodeError, EncodeError};
use crate::format::ConfigFormat;
use crate::types::TypeExpr;
use crate::value::Value;

/// A resolved decoding function.
pub type Decoder = Arc<dyn Fn(&Context, &Value) -> Result<Value, DecodeError> + Send + Sync>;

/// A user decoding function. Receives the annotation it was resolved for.
pub type DecodeFn = Arc<dyn Fn(&TypeExpr, &Value) -> Result<Value, DecodeError> + Send + Sync>;

/// A user encoding function. Receives the default primitive form of the
/// value (for data-carrying enum variants, a single-key `{variant: payload}`
/// map) and returns the representation to emit.
pub type EncodeFn = Arc<dyn Fn(Value) -> Result<Value, EncodeError> + Send + Sync>;

struct Registration<F> {
    func: F,
    include_subclasses: bool,
}

static GLOBAL: LazyLock<Context> = LazyLock::new(Context::new);

pub struct Context {
    decoders: RwLock<HashMap<TypeExpr, Registration<DecodeFn>>>,
    cache: RwLock<HashMap<TypeExpr, Decoder>>,
    encoders: RwLock<HashMap<String, Registration<EncodeFn>>>,
    lineage: RwLock<HashMap<&'static str, &'static [&'static str]>>,
    format: RwLock<ConfigFormat>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Context {
    /// A fresh context with the built-in scalar decoders registered.
    pub fn new() -> Self {
        let ctx = Self {
            decoders: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            encoders: RwLock::new(HashMap::new()),
            lineage: RwLock::new(HashMap::new()),
            format: RwLock::new(ConfigFormat::default()),
        };
        crate::decode::register_builtins(&ctx);
        ctx
    }

    /// The process-wide context.
    pub fn global() -> &'static Context {
        &GLOBAL
    }

    /// Registers a decoding function for `ty`, replacing any previous one.
    ///
    /// With `include_subclasses`, the function also applies to named types
    /// declaring `ty` among their bases. Every cached decoder is discarded.
    pub fn register_decoder<F>(&self, ty: TypeExpr, func: F, include_subclasses: bool)
    where
        F: Fn(&TypeExpr, &Value) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        debug!(ty = %ty, include_subclasses, "Registering decoder");
        self.declare(&ty);
        write(&self.decoders).insert(
            ty,
            Registration {
                func: Arc::new(func),
                include_subclasses,
            },
        );
        write(&self.cache).clear();
    }

    /// Registers an encoding function for the serde type named `name`.
    ///
    /// The name is the one serde reports for the container: the struct or
    /// enum identifier, or its `#[serde(rename)]`.
    pub fn register_encoder<F>(&self, name: &str, func: F, include_subclasses: bool)
    where
        F: Fn(Value) -> Result<Value, EncodeError> + Send + Sync + 'static,
    {
        debug!(name, include_subclasses, "Registering encoder");
        write(&self.encoders).insert(
            name.to_string(),
            Registration {
                func: Arc::new(func),
                include_subclasses,
            },
        );
    }

    /// Records the lineage of every named type reachable from `ty`, so
    /// encoders registered for a base can be found by name.
    pub fn declare(&self, ty: &TypeExpr) {
        let mut lineage = write(&self.lineage);
        let mut seen = HashSet::new();
        declare_into(ty, &mut lineage, &mut seen);
    }

    pub(crate) fn registered_decoder(&self, ty: &TypeExpr) -> Option<DecodeFn> {
        let decoders = read(&self.decoders);
        if let Some(registration) = decoders.get(ty) {
            return Some(registration.func.clone());
        }
        ty.bases().iter().find_map(|base| {
            decoders.iter().find_map(|(key, registration)| {
                (registration.include_subclasses && key.name() == Some(*base))
                    .then(|| registration.func.clone())
            })
        })
    }

    pub(crate) fn registered_encoder(&self, name: &str) -> Option<EncodeFn> {
        let encoders = read(&self.encoders);
        if let Some(registration) = encoders.get(name) {
            return Some(registration.func.clone());
        }
        let lineage = read(&self.lineage);
        let bases = lineage.get(name)?;
        bases.iter().find_map(|base| {
            encoders
                .get(*base)
                .filter(|registration| registration.include_subclasses)
                .map(|registration| registration.func.clone())
        })
    }

    pub(crate) fn cached_decoder(&self, ty: &TypeExpr) -> Option<Decoder> {
        read(&self.cache).get(ty).cloned()
    }

    pub(crate) fn cache_decoder(&self, ty: TypeExpr, decoder: Decoder) {
        write(&self.cache).insert(ty, decoder);
    }

    /// The format used for parsing CLI strings, loading and dumping.
    pub fn config_format(&self) -> ConfigFormat {
        *read(&self.format)
    }

    pub fn set_config_format(&self, format: ConfigFormat) {
        *write(&self.format) = format;
    }

    /// Switches the active format until the returned guard is dropped.
    ///
    /// The previous format is restored on every exit path, including
    /// unwinding.
    pub fn scoped_format(&self, format: ConfigFormat) -> FormatGuard<'_> {
        let previous = std::mem::replace(&mut *write(&self.format), format);
        debug!(%format, %previous, "Entering scoped config format");
        FormatGuard {
            ctx: self,
            previous,
        }
    }
}

fn declare_into(
    ty: &TypeExpr,
    lineage: &mut HashMap<&'static str, &'static [&'static str]>,
    seen: &mut HashSet<&'static str>,
) {
    match ty {
        TypeExpr::Named(named) => {
            if !named.bases.is_empty() {
                lineage.insert(named.name, named.bases);
            }
        }
        TypeExpr::Record(record) => {
            if seen.insert(record.type_name()) {
                for field in record.schema().fields() {
                    declare_into(field.ty(), lineage, seen);
                }
            }
        }
        TypeExpr::List(item) | TypeExpr::Set(item) | TypeExpr::VarTuple(item) => {
            declare_into(item, lineage, seen)
        }
        TypeExpr::Tuple(items) | TypeExpr::Union(items) => {
            for item in items {
                declare_into(item, lineage, seen);
            }
        }
        TypeExpr::Map(key, value) => {
            declare_into(key, lineage, seen);
            declare_into(value, lineage, seen);
        }
        TypeExpr::Var(var) => {
            if let Some(bound) = &var.bound {
                declare_into(bound, lineage, seen);
            }
        }
        _ => {}
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("decoders", &read(&self.decoders).len())
            .field("cached", &read(&self.cache).len())
            .field("encoders", &read(&self.encoders).len())
            .field("format", &self.config_format())
            .finish()
    }
}

/// Restores the previous config format on drop.
#[must_use = "the format reverts as soon as the guard is dropped"]
pub struct FormatGuard<'a> {
    ctx: &'a Context,
    previous: ConfigFormat,
}

impl Drop for FormatGuard<'_> {
    fn drop(&mut self) {
        debug!(format = %self.previous, "Restoring config format");
        *write(&self.ctx.format) = self.previous;
    }
}
