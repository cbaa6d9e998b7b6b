//! Schema registrar: walks a record schema into named groups of
//! command-line field descriptors.
//!
//! Every leaf field becomes a [`FieldDescriptor`] addressed by its dotted
//! destination (`compute.workers`). Nested records become their own
//! [`FieldGroup`]; records behind an optional annotation become optional
//! groups whose fields are never required. The walk is independent of any
//! CLI framework; the clap adapter in [`cli`](crate::cli) builds a
//! `Command` from the result.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::context::Context;
use crate::decode::str2bool;
use crate::error::{DecodeError, SchemaError};
use crate::format::ConfigFormat;
use crate::schema::Field;
use crate::types::{RecordType, TypeExpr};
use crate::value::{Map, Value};

/// Reserved option naming config files to load. No top-level field may use
/// it.
pub const CONFIG_PATH: &str = "config_path";

/// One command-line option bound to a leaf field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Dotted destination, e.g. `log.exp_name`.
    pub dest: String,
    /// Field name within its record.
    pub name: String,
    pub ty: TypeExpr,
    pub required: bool,
    pub default: Option<Value>,
    pub help: Option<String>,
    /// `--dest` first, then declared aliases.
    pub option_strings: Vec<String>,
}

impl FieldDescriptor {
    /// Converts a raw token. Boolean fields accept the usual yes/no
    /// spellings; everything else goes through the active format's parser.
    pub fn coerce(&self, raw: &str, format: ConfigFormat) -> Result<Value, DecodeError> {
        if self.ty.is_bool() {
            str2bool(raw).map(Value::Bool)
        } else {
            Ok(format.parse_string(raw))
        }
    }

    /// Help line with the default appended.
    pub fn help_text(&self) -> Option<String> {
        match (&self.help, &self.default) {
            (Some(help), Some(default)) => Some(format!("{help} [default: {default}]")),
            (Some(help), None) => Some(help.clone()),
            (None, Some(default)) => Some(format!("[default: {default}]")),
            (None, None) => None,
        }
    }
}

/// Fields of one record, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroup {
    pub record: String,
    /// Dotted prefix of the group's fields; empty for the root.
    pub dest: String,
    pub description: Option<String>,
    pub optional: bool,
    pub fields: Vec<FieldDescriptor>,
}

impl FieldGroup {
    pub fn title(&self) -> String {
        if self.dest.is_empty() {
            self.record.clone()
        } else {
            format!("{} ['{}']", self.record, self.dest)
        }
    }
}

/// The registered groups of a root record: root first, then nested records
/// depth-first in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct Registrar {
    groups: Vec<FieldGroup>,
}

impl Registrar {
    /// Walks `record`. `defaults` is an encoded default instance whose
    /// values take precedence over the schema's own defaults.
    pub fn build(ctx: &Context, record: &RecordType, defaults: Option<&Value>) -> Result<Self, SchemaError> {
        ctx.declare(&TypeExpr::Record(*record));
        let mut walk = Walk {
            ctx,
            groups: Vec::new(),
            dests: HashSet::new(),
            options: HashMap::new(),
            ancestry: Vec::new(),
        };
        walk.record(record, "", defaults.cloned(), None, false)?;
        debug!(
            record = record.name(),
            groups = walk.groups.len(),
            "Registered schema"
        );
        Ok(Self { groups: walk.groups })
    }

    pub fn groups(&self) -> &[FieldGroup] {
        &self.groups
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.groups.iter().flat_map(|group| group.fields.iter())
    }

    pub fn field(&self, dest: &str) -> Option<&FieldDescriptor> {
        self.fields().find(|field| field.dest == dest)
    }

    /// Finds a field by destination or by any of its option strings, with
    /// or without leading dashes.
    pub fn lookup(&self, key: &str) -> Option<&FieldDescriptor> {
        self.field(key).or_else(|| {
            self.fields().find(|field| {
                field
                    .option_strings
                    .iter()
                    .any(|option| option == key || option.trim_start_matches('-') == key)
            })
        })
    }

    /// Coerces raw `(key, token)` pairs into a flat dotted mapping.
    ///
    /// Keys may be destinations or option aliases. Repeated `config_path`
    /// tokens are collected into a list; unknown keys are parsed with the
    /// active format and left for the decoder to reject.
    pub fn coerce_flat<I, K, V>(&self, raw: I, format: ConfigFormat) -> Result<Map, DecodeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut flat = Map::new();
        let mut config_paths = Vec::new();
        for (key, token) in raw {
            let (key, token) = (key.as_ref(), token.as_ref());
            if key == CONFIG_PATH {
                config_paths.push(Value::from(token));
                continue;
            }
            match self.lookup(key) {
                Some(field) => {
                    flat.insert(field.dest.clone(), field.coerce(token, format)?);
                }
                None => {
                    debug!(key, "Passing through value for unregistered key");
                    flat.insert(key.to_string(), format.parse_string(token));
                }
            }
        }
        if !config_paths.is_empty() {
            flat.insert(CONFIG_PATH.to_string(), Value::List(config_paths));
        }
        Ok(flat)
    }
}

impl fmt::Display for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            writeln!(f, "{}:", group.title())?;
            for field in &group.fields {
                write!(f, "  {} {}", field.option_strings.join(", "), field.ty)?;
                if field.required {
                    write!(f, " (required)")?;
                }
                if let Some(help) = field.help_text() {
                    write!(f, "  {help}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

struct Walk<'a> {
    ctx: &'a Context,
    groups: Vec<FieldGroup>,
    dests: HashSet<String>,
    /// Option string → owning destination.
    options: HashMap<String, String>,
    ancestry: Vec<&'static str>,
}

struct Nested {
    record: RecordType,
    dest: String,
    defaults: Option<Value>,
    field: Field,
    optional: bool,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

impl Walk<'_> {
    fn record(
        &mut self,
        record: &RecordType,
        dest: &str,
        defaults: Option<Value>,
        parent: Option<&Field>,
        optional: bool,
    ) -> Result<(), SchemaError> {
        if self.ancestry.contains(&record.type_name()) {
            return Err(SchemaError::RecursiveRecord {
                record: record.name().to_string(),
                dest: dest.to_string(),
            });
        }
        let schema = record.schema();
        let defaults = defaults.and_then(Value::into_map);

        let mut group = FieldGroup {
            record: schema.name().to_string(),
            dest: dest.to_string(),
            description: parent
                .and_then(Field::help)
                .or(schema.doc())
                .map(String::from),
            optional,
            fields: Vec::new(),
        };
        let mut nested = Vec::new();

        for field in schema.fields().iter().filter(|f| f.is_init()) {
            if dest.is_empty() && field.name() == CONFIG_PATH {
                return Err(SchemaError::ReservedName {
                    record: schema.name().to_string(),
                    name: CONFIG_PATH.to_string(),
                });
            }
            let ty = field.ty().resolved();
            let field_dest = join(dest, field.name());
            let inherited = defaults.as_ref().and_then(|d| d.get(field.name())).cloned();

            if ty.is_container_of_records() {
                return Err(SchemaError::ContainerOfRecords {
                    record: schema.name().to_string(),
                    field: field.name().to_string(),
                    ty: field.ty().to_string(),
                });
            }

            match ty {
                TypeExpr::Record(child) => {
                    let child_defaults = match inherited {
                        Some(value) => Some(value),
                        None => self.field_default(field, &field_dest)?,
                    };
                    nested.push(Nested {
                        record: *child,
                        dest: field_dest,
                        defaults: child_defaults,
                        field: field.clone(),
                        optional,
                    });
                    continue;
                }
                TypeExpr::Union(_) if ty.contains_record() => {
                    let Some(child) = ty.record_arg() else {
                        return Err(SchemaError::AmbiguousRecordUnion {
                            record: schema.name().to_string(),
                            field: field.name().to_string(),
                            ty: field.ty().to_string(),
                        });
                    };
                    nested.push(Nested {
                        record: child,
                        dest: field_dest,
                        defaults: inherited.filter(|v| !v.is_null()),
                        field: field.clone(),
                        optional: true,
                    });
                    continue;
                }
                _ => {}
            }

            let default = match inherited {
                Some(value) => Some(value),
                None => self.field_default(field, &field_dest)?,
            };
            let descriptor = FieldDescriptor {
                required: default.is_none() && !optional,
                default,
                help: field.help().or(schema.doc()).map(String::from),
                option_strings: std::iter::once(format!("--{field_dest}"))
                    .chain(field.aliases().iter().cloned())
                    .collect(),
                name: field.name().to_string(),
                ty: field.ty().clone(),
                dest: field_dest,
            };
            self.claim(&descriptor)?;
            group.fields.push(descriptor);
        }

        self.groups.push(group);
        self.ancestry.push(record.type_name());
        for child in nested {
            if !self.dests.insert(child.dest.clone()) {
                return Err(SchemaError::DuplicateDestination { dest: child.dest });
            }
            self.record(
                &child.record,
                &child.dest,
                child.defaults,
                Some(&child.field),
                child.optional,
            )?;
        }
        self.ancestry.pop();
        Ok(())
    }

    fn field_default(&self, field: &Field, dest: &str) -> Result<Option<Value>, SchemaError> {
        field
            .default_in(self.ctx)
            .transpose()
            .map_err(|source| SchemaError::Default {
                dest: dest.to_string(),
                source,
            })
    }

    fn claim(&mut self, descriptor: &FieldDescriptor) -> Result<(), SchemaError> {
        if !self.dests.insert(descriptor.dest.clone()) {
            return Err(SchemaError::DuplicateDestination {
                dest: descriptor.dest.clone(),
            });
        }
        for option in &descriptor.option_strings {
            if let Some(first) = self.options.insert(option.clone(), descriptor.dest.clone()) {
                return Err(SchemaError::DuplicateOption {
                    option: option.clone(),
                    first,
                    second: descriptor.dest.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::fixtures::test::{
        Clashing, Crowd, Parent, Reserved, Simple, TrainConfig, Tree,
    };

    fn build<R: crate::schema::Record>() -> Result<Registrar, SchemaError> {
        Registrar::build(&Context::new(), &RecordType::of::<R>(), None)
    }

    #[test]
    fn flat_record_single_group() {
        let registrar = build::<Simple>().unwrap();
        assert_eq!(registrar.groups().len(), 1);
        let a = registrar.field("a").unwrap();
        assert!(a.required);
        assert_eq!(a.option_strings, ["--a"]);
        let b = registrar.field("b").unwrap();
        assert!(!b.required);
        assert_eq!(b.default, Some(Value::Float(5.0)));
    }

    #[test]
    fn nested_records_get_dotted_dests() {
        let registrar = build::<TrainConfig>().unwrap();
        let titles: Vec<_> = registrar.groups().iter().map(FieldGroup::title).collect();
        assert_eq!(
            titles,
            [
                "TrainConfig",
                "LogConfig ['log']",
                "ComputeConfig ['compute']"
            ]
        );
        let workers = registrar.field("compute.workers").unwrap();
        assert_eq!(workers.default, Some(Value::Int(8)));
        assert!(workers.option_strings.contains(&"-n".to_string()));
        assert!(registrar.field("log.exp_dir").is_none());
    }

    #[test]
    fn group_description_prefers_parent_field_doc() {
        let registrar = build::<TrainConfig>().unwrap();
        let log = &registrar.groups()[1];
        assert_eq!(log.description.as_deref(), Some("Where logs and checkpoints go"));
        let compute = &registrar.groups()[2];
        assert_eq!(compute.description.as_deref(), Some("Compute resources"));
    }

    #[test]
    fn help_falls_back_to_record_doc() {
        let registrar = build::<TrainConfig>().unwrap();
        assert_eq!(
            registrar.field("steps").unwrap().help.as_deref(),
            Some("Number of training steps")
        );
        assert_eq!(
            registrar.field("compute.device").unwrap().help.as_deref(),
            Some("Compute resources")
        );
    }

    #[test]
    fn defaults_instance_overrides_schema_defaults() {
        let ctx = Context::new();
        let defaults = crate::fixtures::test::map(&[(
            "compute",
            crate::fixtures::test::map(&[("workers", Value::Int(2))]),
        )]);
        let registrar =
            Registrar::build(&ctx, &RecordType::of::<TrainConfig>(), Some(&defaults)).unwrap();
        assert_eq!(registrar.field("compute.workers").unwrap().default, Some(Value::Int(2)));
        assert_eq!(
            registrar.field("compute.device").unwrap().default,
            Some(Value::from("cpu"))
        );
    }

    #[test]
    fn optional_record_group_is_not_required() {
        let registrar = build::<Parent>().unwrap();
        let group = &registrar.groups()[1];
        assert!(group.optional);
        assert_eq!(group.dest, "child");
        assert!(!registrar.field("child.name").unwrap().required);
    }

    #[test]
    fn reserved_name_is_rejected() {
        assert_matches!(build::<Reserved>(), Err(SchemaError::ReservedName { .. }));
    }

    #[test]
    fn container_of_records_is_rejected() {
        assert_matches!(
            build::<Crowd>(),
            Err(SchemaError::ContainerOfRecords { ref field, .. }) if field == "people"
        );
    }

    #[test]
    fn duplicate_alias_is_rejected() {
        assert_matches!(build::<Clashing>(), Err(SchemaError::DuplicateOption { .. }));
    }

    #[test]
    fn recursive_record_is_rejected() {
        assert_matches!(build::<Tree>(), Err(SchemaError::RecursiveRecord { .. }));
    }

    #[test]
    fn coerce_bool_and_strings() {
        let registrar = build::<TrainConfig>().unwrap();
        let flat = registrar
            .coerce_flat(
                [("log.verbose", "yes"), ("steps", "20"), ("-n", "4"), ("config_path", "a.yaml")],
                ConfigFormat::Yaml,
            )
            .unwrap();
        assert_eq!(flat["log.verbose"], Value::Bool(true));
        assert_eq!(flat["steps"], Value::Int(20));
        assert_eq!(flat["compute.workers"], Value::Int(4));
        assert_eq!(flat[CONFIG_PATH], Value::List(vec![Value::from("a.yaml")]));
        assert!(registrar.coerce_flat([("log.verbose", "perhaps")], ConfigFormat::Yaml).is_err());
    }

    #[test]
    fn display_lists_options() {
        let text = build::<Simple>().unwrap().to_string();
        assert!(text.contains("--a int (required)"));
        assert!(text.contains("[default: 5.0]"));
    }
}
