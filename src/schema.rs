//! Explicit record schemas.
//!
//! A [`Record`] is a serde struct paired with a [`RecordSchema`] describing
//! its fields in declaration order: the declared [`TypeExpr`], an optional
//! default (computed lazily per decode), whether the field is accepted at
//! construction, help text, and extra option aliases.
//!
//! ```ignore
//! impl Record for LogConfig {
//!     fn schema() -> RecordSchema {
//!         RecordSchema::builder("LogConfig")
//!             .doc("Logging settings")
//!             .field(Field::new::<String>("exp_name").default("default_exp"))
//!             .field(Field::new::<PathBuf>("exp_folder").default("/tmp/exp"))
//!             .build()
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::context::Context;
use crate::error::EncodeError;
use crate::types::{TypeExpr, Typed};
use crate::value::{Map, Value};

/// A configuration record: a serde struct with an explicit schema.
pub trait Record: Serialize + DeserializeOwned + 'static {
    fn schema() -> RecordSchema;
}

/// Lazily computes a field's default in primitive form.
pub type DefaultFactory = Arc<dyn Fn(&Context) -> Result<Value, EncodeError> + Send + Sync>;

/// Runs on the constructed field map before it becomes a typed instance.
/// May rewrite fields or reject the record with a reason.
pub type PostInit = fn(&mut Map) -> Result<(), String>;

/// One declared field of a record.
#[derive(Clone)]
pub struct Field {
    name: String,
    ty: TypeExpr,
    default: Option<DefaultFactory>,
    init: bool,
    doc: Option<String>,
    comment_above: Option<String>,
    comment_inline: Option<String>,
    aliases: Vec<String>,
}

impl Field {
    pub fn new<T: Typed>(name: &str) -> Self {
        Self::with_type(name, T::type_expr())
    }

    pub fn with_type(name: &str, ty: TypeExpr) -> Self {
        Self {
            name: name.to_string(),
            ty,
            default: None,
            init: true,
            doc: None,
            comment_above: None,
            comment_inline: None,
            aliases: Vec::new(),
        }
    }

    /// A nested record field. Its defaults come from the nested schema.
    pub fn nested<R: Record>(name: &str) -> Self {
        Self::with_type(name, TypeExpr::record::<R>())
    }

    /// Default value, encoded each time it is needed.
    pub fn default<V>(self, value: V) -> Self
    where
        V: Serialize + Send + Sync + 'static,
    {
        self.default_factory(Arc::new(move |ctx: &Context| ctx.encode(&value)))
    }

    /// Default computed by a factory on each use, for values that should not
    /// be shared between instances.
    pub fn default_with<V, F>(self, factory: F) -> Self
    where
        V: Serialize,
        F: Fn() -> V + Send + Sync + 'static,
    {
        self.default_factory(Arc::new(move |ctx: &Context| ctx.encode(&factory())))
    }

    /// Default already in primitive form.
    pub fn default_value(self, value: Value) -> Self {
        self.default_factory(Arc::new(move |_: &Context| Ok::<_, EncodeError>(value.clone())))
    }

    pub fn default_factory(mut self, factory: DefaultFactory) -> Self {
        self.default = Some(factory);
        self
    }

    /// Excludes the field from construction. Its value is set after the
    /// record is built, and it gets no command-line option.
    pub fn no_init(mut self) -> Self {
        self.init = false;
        self
    }

    pub fn doc(mut self, text: &str) -> Self {
        self.doc = Some(text.to_string());
        self
    }

    /// Comment placed on the line(s) above the field in the source.
    pub fn comment_above(mut self, text: &str) -> Self {
        self.comment_above = Some(text.to_string());
        self
    }

    /// Comment trailing the field on its own line.
    pub fn comment_inline(mut self, text: &str) -> Self {
        self.comment_inline = Some(text.to_string());
        self
    }

    /// Extra option string, e.g. `-n` or `--workers`.
    pub fn alias(mut self, option: &str) -> Self {
        self.aliases.push(option.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeExpr {
        &self.ty
    }

    pub fn is_init(&self) -> bool {
        self.init
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_in(&self, ctx: &Context) -> Option<Result<Value, EncodeError>> {
        self.default.as_ref().map(|factory| factory(ctx))
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Help text: the docstring, else the comment above, else the inline
    /// comment.
    pub fn help(&self) -> Option<&str> {
        self.doc
            .as_deref()
            .or(self.comment_above.as_deref())
            .or(self.comment_inline.as_deref())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("has_default", &self.default.is_some())
            .field("init", &self.init)
            .field("help", &self.help())
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// Ordered field list of a record type.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    name: String,
    doc: Option<String>,
    fields: Vec<Field>,
    post_init: Option<PostInit>,
}

impl RecordSchema {
    pub fn builder(name: &str) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            schema: RecordSchema {
                name: name.to_string(),
                doc: None,
                fields: Vec::new(),
                post_init: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn post_init(&self) -> Option<PostInit> {
        self.post_init
    }

    /// Default values of every field that has one, nested records expanded
    /// into their own defaults.
    ///
    /// A default that fails to encode is skipped and logged.
    pub fn defaults(&self, ctx: &Context) -> Map {
        let mut out = Map::with_capacity(self.fields.len());
        for field in &self.fields {
            match (field.ty.resolved(), field.default_in(ctx)) {
                (TypeExpr::Record(record), None) => {
                    out.insert(field.name.clone(), Value::Map(record.schema().defaults(ctx)));
                }
                (_, Some(Ok(value))) => {
                    out.insert(field.name.clone(), value);
                }
                (_, Some(Err(err))) => {
                    debug!(record = %self.name, field = %field.name, error = %err, "Skipping default that failed to encode");
                }
                (_, None) => {}
            }
        }
        out
    }

    /// Drops non-init fields from an encoded instance, descending into
    /// nested records, so derived values are recomputed on decode.
    pub fn retain_init(&self, map: &mut Map) {
        for field in &self.fields {
            if !field.init {
                map.shift_remove(&field.name);
                continue;
            }
            let record = match field.ty.resolved() {
                TypeExpr::Record(record) => Some(*record),
                other => other.record_arg(),
            };
            if let (Some(record), Some(Value::Map(nested))) = (record, map.get_mut(&field.name)) {
                record.schema().retain_init(nested);
            }
        }
    }
}

pub struct RecordSchemaBuilder {
    schema: RecordSchema,
}

impl RecordSchemaBuilder {
    pub fn doc(mut self, text: &str) -> Self {
        self.schema.doc = Some(text.to_string());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.schema.fields.push(field);
        self
    }

    pub fn post_init(mut self, hook: PostInit) -> Self {
        self.schema.post_init = Some(hook);
        self
    }

    pub fn build(self) -> RecordSchema {
        self.schema
    }
}
