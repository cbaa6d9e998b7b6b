#[cfg(test)]
pub mod test {
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::PathBuf;

    use serde::{Deserialize, Serialize};

    use crate::context::Context;
    use crate::schema::{Field, Record, RecordSchema};
    use crate::types::{TypeExpr, Typed};
    use crate::value::{Map, Value};

    /// Builds a mapping value from literal entries.
    pub fn map(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }

    // -- Flat records -----------------------------------------------------------

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Simple {
        pub a: i64,
        pub b: f64,
        pub c: String,
    }

    impl Record for Simple {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Simple")
                .field(Field::new::<i64>("a"))
                .field(Field::new::<f64>("b").default(5.0))
                .field(Field::new::<String>("c").default(""))
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Pair {
        pub ints: (i64, i64),
    }

    impl Record for Pair {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Pair")
                .field(Field::new::<(i64, i64)>("ints").default((1, 5)))
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
    pub struct Maybe {
        pub val_a: Option<i64>,
        pub val_b: Option<i64>,
    }

    impl Record for Maybe {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Maybe")
                .field(Field::new::<Option<i64>>("val_a").default(None::<i64>))
                .field(Field::new::<Option<i64>>("val_b").default(None::<i64>))
                .build()
        }
    }

    // -- Enum member by name ----------------------------------------------------

    #[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum Color {
        #[default]
        Red,
        Blue,
    }

    impl Typed for Color {
        fn type_expr() -> TypeExpr {
            TypeExpr::enumeration("Color", &["RED", "BLUE"])
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
    pub struct Palette {
        pub color: Color,
    }

    impl Record for Palette {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Palette")
                .field(Field::new::<Color>("color").default(Color::Red))
                .build()
        }
    }

    // -- Optional nested record -------------------------------------------------

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Child {
        pub name: String,
        pub age: i64,
    }

    impl Record for Child {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Child")
                .field(Field::new::<String>("name").default("Kevin"))
                .field(Field::new::<i64>("age").default(12))
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
    pub struct Parent {
        pub child: Option<Child>,
    }

    impl Record for Parent {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Parent")
                .field(Field::new::<Option<Child>>("child").default(None::<Child>))
                .build()
        }
    }

    // -- Narrow integer: range checked when the struct is built ----------------

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Port {
        pub port: u8,
    }

    impl Record for Port {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Port")
                .field(Field::new::<u8>("port").default(80u8))
                .build()
        }
    }

    // -- Every container shape --------------------------------------------------

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(untagged)]
    pub enum IdOrName {
        Id(i64),
        Name(String),
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Catalog {
        pub tags: BTreeSet<String>,
        pub names_by_id: BTreeMap<i64, String>,
        pub edges: BTreeMap<(i64, i64), String>,
        pub widths: Vec<f64>,
        pub key: IdOrName,
        pub owner: Option<Child>,
    }

    impl Record for Catalog {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Catalog")
                .field(Field::new::<BTreeSet<String>>("tags").default(BTreeSet::<String>::new()))
                .field(
                    Field::new::<BTreeMap<i64, String>>("names_by_id")
                        .default(BTreeMap::<i64, String>::new()),
                )
                .field(
                    Field::new::<BTreeMap<(i64, i64), String>>("edges")
                        .default(BTreeMap::<(i64, i64), String>::new()),
                )
                .field(
                    Field::with_type("widths", TypeExpr::var_tuple(TypeExpr::Float))
                        .default(Vec::<f64>::new()),
                )
                .field(
                    Field::with_type("key", TypeExpr::Union(vec![TypeExpr::Int, TypeExpr::Str]))
                        .default(IdOrName::Id(0)),
                )
                .field(Field::new::<Option<Child>>("owner").default(None::<Child>))
                .build()
        }
    }

    // -- Training config: nested records, docs, aliases, post-init ---------------

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct TrainConfig {
        pub steps: i64,
        pub lr: f64,
        pub log: LogConfig,
        pub compute: ComputeConfig,
    }

    impl Default for TrainConfig {
        fn default() -> Self {
            Self {
                steps: 10,
                lr: 0.01,
                log: LogConfig::default(),
                compute: ComputeConfig::default(),
            }
        }
    }

    impl Record for TrainConfig {
        fn schema() -> RecordSchema {
            RecordSchema::builder("TrainConfig")
                .doc("Training run settings")
                .field(Field::new::<i64>("steps").default(10).doc("Number of training steps"))
                .field(Field::new::<f64>("lr").default(0.01).comment_inline("Learning rate"))
                .field(Field::nested::<LogConfig>("log").doc("Where logs and checkpoints go"))
                .field(Field::nested::<ComputeConfig>("compute"))
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct LogConfig {
        pub exp_name: String,
        pub exp_folder: PathBuf,
        pub verbose: bool,
        #[serde(default)]
        pub exp_dir: PathBuf,
    }

    impl Default for LogConfig {
        fn default() -> Self {
            Self {
                exp_name: "default_exp".into(),
                exp_folder: PathBuf::from("/tmp/exp"),
                verbose: false,
                exp_dir: PathBuf::from("/tmp/exp/default_exp"),
            }
        }
    }

    fn derive_exp_dir(fields: &mut Map) -> Result<(), String> {
        let folder = fields
            .get("exp_folder")
            .and_then(Value::as_str)
            .ok_or("exp_folder is not set")?;
        let name = fields
            .get("exp_name")
            .and_then(Value::as_str)
            .ok_or("exp_name is not set")?;
        let dir = PathBuf::from(folder).join(name);
        fields.insert("exp_dir".into(), Value::from(dir.to_string_lossy().into_owned()));
        Ok(())
    }

    impl Record for LogConfig {
        fn schema() -> RecordSchema {
            RecordSchema::builder("LogConfig")
                .doc("Logging settings")
                .field(Field::new::<String>("exp_name").default("default_exp"))
                .field(Field::new::<PathBuf>("exp_folder").default(PathBuf::from("/tmp/exp")))
                .field(Field::new::<bool>("verbose").default(false))
                .field(Field::new::<PathBuf>("exp_dir").no_init())
                .post_init(derive_exp_dir)
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct ComputeConfig {
        pub workers: i64,
        pub device: String,
    }

    impl Default for ComputeConfig {
        fn default() -> Self {
            Self {
                workers: 8,
                device: "cpu".into(),
            }
        }
    }

    fn positive_workers(fields: &mut Map) -> Result<(), String> {
        match fields.get("workers") {
            Some(Value::Int(n)) if *n <= 0 => Err(format!("workers must be positive, got {n}")),
            _ => Ok(()),
        }
    }

    impl Record for ComputeConfig {
        fn schema() -> RecordSchema {
            RecordSchema::builder("ComputeConfig")
                .doc("Compute resources")
                .field(
                    Field::new::<i64>("workers")
                        .default(8)
                        .doc("Number of dataloader workers")
                        .alias("-n")
                        .alias("--workers"),
                )
                .field(Field::new::<String>("device").default("cpu"))
                .post_init(positive_workers)
                .build()
        }
    }

    // -- Schemas the registrar rejects ------------------------------------------

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Reserved {
        pub config_path: String,
    }

    impl Record for Reserved {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Reserved")
                .field(Field::new::<String>("config_path").default(""))
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Crowd {
        pub people: Vec<Child>,
    }

    impl Record for Crowd {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Crowd")
                .field(Field::new::<Vec<Child>>("people").default(Vec::<Child>::new()))
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Clashing {
        pub first: i64,
        pub second: i64,
    }

    impl Record for Clashing {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Clashing")
                .field(Field::new::<i64>("first").default(1).alias("-x"))
                .field(Field::new::<i64>("second").default(2).alias("-x"))
                .build()
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub struct Tree {
        pub value: i64,
        pub child: Option<Box<Tree>>,
    }

    impl Record for Tree {
        fn schema() -> RecordSchema {
            RecordSchema::builder("Tree")
                .field(Field::new::<i64>("value").default(0))
                .field(Field::new::<Option<Box<Tree>>>("child").default(None::<Tree>))
                .build()
        }
    }

    crate::typed_records!(
        Simple,
        Pair,
        Maybe,
        Palette,
        Child,
        Parent,
        TrainConfig,
        LogConfig,
        ComputeConfig,
        Reserved,
        Crowd,
        Clashing,
        Tree,
        Port,
        Catalog,
    );

    #[test]
    fn default_impls_match_schema_defaults() {
        let ctx = Context::new();
        let encoded = ctx.encode(&TrainConfig::default()).unwrap();
        let mut defaults = TrainConfig::schema().defaults(&ctx);
        // exp_dir is derived, not declared with a default.
        let mut log = defaults["log"].as_map().unwrap().clone();
        log.insert("exp_dir".into(), Value::from("/tmp/exp/default_exp"));
        defaults.insert("log".into(), Value::Map(log));
        assert_eq!(encoded, Value::Map(defaults));
    }
}
