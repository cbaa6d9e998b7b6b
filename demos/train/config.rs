//! Configuration records for the training demo.
//!
//! [`TrainConfig`] nests two always-present records ([`LogConfig`],
//! [`ComputeConfig`]) and one optional one ([`WarmupConfig`]), which become
//! the option groups `--log.*`, `--compute.*` and `--warmup.*`.
//!
//! [`Timeout`] shows a custom scalar: a named type with a registered decoder
//! that reads `90`, `90s`, `15m` or `2h`, and an encoder that writes seconds
//! back as `90s`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use structfig::{Context, DecodeError, Field, Map, NamedType, Record, RecordSchema, TypeExpr, Typed, Value};

pub const DURATION: NamedType = NamedType::new("duration");

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Optimizer {
    Sgd,
    Adam,
}

impl Typed for Optimizer {
    fn type_expr() -> TypeExpr {
        TypeExpr::enumeration("Optimizer", &["sgd", "adam"])
    }
}

/// A timeout in whole seconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(pub u64);

impl Typed for Timeout {
    fn type_expr() -> TypeExpr {
        TypeExpr::named(DURATION)
    }
}

fn decode_duration(ty: &TypeExpr, raw: &Value) -> Result<Value, DecodeError> {
    const EXPECTED: &str = "expected seconds or a string like '15m'";
    let text = match raw {
        Value::Int(secs) if *secs >= 0 => return Ok(Value::Int(*secs)),
        Value::Int(_) => return Err(DecodeError::invalid(ty, raw, "a duration cannot be negative")),
        Value::String(text) => text.trim(),
        other => return Err(DecodeError::invalid(ty, other, EXPECTED)),
    };
    let (digits, scale) = match text.char_indices().last() {
        Some((at, 's')) => (&text[..at], 1),
        Some((at, 'm')) => (&text[..at], 60),
        Some((at, 'h')) => (&text[..at], 3600),
        _ => (text, 1),
    };
    if digits.trim_start().starts_with('-') {
        return Err(DecodeError::invalid(ty, raw, "a duration cannot be negative"));
    }
    let amount: u64 = digits.trim().parse().map_err(|_| DecodeError::invalid(ty, raw, EXPECTED))?;
    amount
        .checked_mul(scale)
        .and_then(|secs| i64::try_from(secs).ok())
        .map(Value::Int)
        .ok_or_else(|| DecodeError::invalid(ty, raw, "duration is too long"))
}

/// Registers the decoder and encoder for [`Timeout`].
pub fn register(ctx: &Context) {
    ctx.register_decoder(TypeExpr::named(DURATION), decode_duration, true);
    ctx.register_encoder(
        "Timeout",
        |value| match value {
            Value::Int(secs) => Ok(Value::from(format!("{secs}s"))),
            other => Ok(other),
        },
        false,
    );
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TrainConfig {
    pub steps: u32,
    pub lr: f64,
    pub optimizer: Optimizer,
    pub betas: (f64, f64),
    pub tags: Vec<String>,
    pub timeout: Timeout,
    pub log: LogConfig,
    pub compute: ComputeConfig,
    pub warmup: Option<WarmupConfig>,
}

impl Record for TrainConfig {
    fn schema() -> RecordSchema {
        RecordSchema::builder("TrainConfig")
            .doc("A toy training run")
            .field(Field::new::<u32>("steps").default(1000).doc("Number of optimizer steps"))
            .field(Field::new::<f64>("lr").default(3e-4).comment_inline("Learning rate"))
            .field(Field::new::<Optimizer>("optimizer").default(Optimizer::Adam))
            .field(Field::new::<(f64, f64)>("betas").default((0.9, 0.999)))
            .field(Field::new::<Vec<String>>("tags").default_with(Vec::<String>::new))
            .field(Field::new::<Timeout>("timeout").default(Timeout(3600)).doc("Give up after this long"))
            .field(Field::nested::<LogConfig>("log").doc("Where logs and checkpoints go"))
            .field(Field::nested::<ComputeConfig>("compute"))
            .field(Field::new::<Option<WarmupConfig>>("warmup").default(None::<WarmupConfig>))
            .build()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LogConfig {
    pub exp_name: String,
    pub exp_folder: PathBuf,
    pub verbose: bool,
    #[serde(default)]
    pub exp_dir: PathBuf,
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
            .field(Field::new::<String>("exp_name").default("default_exp").doc("Run name"))
            .field(Field::new::<PathBuf>("exp_folder").default(PathBuf::from("/tmp/runs")))
            .field(Field::new::<bool>("verbose").default(false).alias("-v"))
            .field(Field::new::<PathBuf>("exp_dir").no_init())
            .post_init(derive_exp_dir)
            .build()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ComputeConfig {
    pub workers: u32,
    pub device: String,
}

impl Record for ComputeConfig {
    fn schema() -> RecordSchema {
        RecordSchema::builder("ComputeConfig")
            .doc("Compute resources")
            .field(
                Field::new::<u32>("workers")
                    .default(8)
                    .doc("Number of dataloader workers")
                    .alias("-n")
                    .alias("--workers"),
            )
            .field(Field::new::<String>("device").default("cpu"))
            .build()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WarmupConfig {
    pub steps: u32,
    pub start_lr: f64,
}

impl Record for WarmupConfig {
    fn schema() -> RecordSchema {
        RecordSchema::builder("WarmupConfig")
            .doc("Linear learning-rate warmup")
            .field(Field::new::<u32>("steps").default(100))
            .field(Field::new::<f64>("start_lr").default(0.0))
            .build()
    }
}

structfig::typed_records!(TrainConfig, LogConfig, ComputeConfig, WarmupConfig);
