use std::path::PathBuf;

use crate::context::Context;
use crate::error::StructfigError;
use crate::file;
use crate::format::ConfigFormat;
use crate::merge::take_config_paths;
use crate::registrar::Registrar;
use crate::resolve::{self, ResolveInput};
use crate::schema::Record;
use crate::types::RecordType;
use crate::value::{Map, Value};

/// Entry point for building a structfig configuration.
pub struct Structfig;

impl Structfig {
    pub fn builder<'a, R: Record>() -> StructfigBuilder<'a, R> {
        StructfigBuilder::new()
    }
}

/// Builder for parsing a typed config from layered sources.
///
/// Layers, lowest priority first:
///
/// - the [`defaults()`](Self::defaults) instance, else the schema defaults
/// - programmatic [`source()`](Self::source) mappings
/// - config files from [`config_path()`](Self::config_path), then from
///   `--config_path` on the command line
/// - command-line values
pub struct StructfigBuilder<'a, R: Record> {
    ctx: &'a Context,
    app_name: Option<String>,
    config_paths: Vec<PathBuf>,
    format: Option<ConfigFormat>,
    defaults: Option<R>,
    sources: Vec<Map>,
}

impl<'a, R: Record> StructfigBuilder<'a, R> {
    fn new() -> Self {
        Self {
            ctx: Context::global(),
            app_name: None,
            config_paths: Vec::new(),
            format: None,
            defaults: None,
            sources: Vec::new(),
        }
    }

    /// Use `ctx` instead of the process-wide [`Context::global()`].
    pub fn context(mut self, ctx: &'a Context) -> Self {
        self.ctx = ctx;
        self
    }

    /// Program name shown in usage (default: the root record's name).
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = Some(name.to_string());
        self
    }

    /// Add a config file. Builder files load before any given with
    /// `--config_path`, so the command line wins.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_paths.push(path.into());
        self
    }

    pub fn config_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Format for files and CLI values during this parse only. The previous
    /// format is restored afterwards.
    pub fn format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Instance whose values replace the schema defaults, both in help
    /// text and as the lowest layer.
    pub fn defaults(mut self, defaults: R) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// In-memory mapping laid over the defaults and under every file.
    pub fn source(mut self, source: Map) -> Self {
        self.sources.push(source);
        self
    }

    fn effective_app_name(&self) -> String {
        self.app_name
            .clone()
            .unwrap_or_else(|| R::schema().name().to_lowercase())
    }

    /// The encoded defaults instance with derived fields removed.
    fn encoded_defaults(&self) -> Result<Option<Map>, StructfigError> {
        let Some(defaults) = &self.defaults else {
            return Ok(None);
        };
        let Some(mut map) = self.ctx.encode(defaults)?.into_map() else {
            return Ok(None);
        };
        R::schema().retain_init(&mut map);
        Ok(Some(map))
    }

    /// Walk the schema into option groups.
    pub fn registrar(&self) -> Result<Registrar, StructfigError> {
        let defaults = self.encoded_defaults()?.map(Value::Map);
        Ok(Registrar::build(self.ctx, &RecordType::of::<R>(), defaults.as_ref())?)
    }

    /// Coerce raw command-line pairs and read every config file, producing
    /// the I/O-free input of the resolve pipeline.
    pub fn resolve_input<I, K, V>(&self, registrar: &Registrar, raw: I) -> Result<ResolveInput, StructfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cli = registrar.coerce_flat(raw, self.ctx.config_format())?;
        let cli_paths = take_config_paths(&mut cli)?;
        let paths: Vec<PathBuf> = self.config_paths.iter().cloned().chain(cli_paths).collect();
        let files = file::read_config_files(&paths)?;

        Ok(ResolveInput {
            defaults: self.encoded_defaults()?,
            sources: self.sources.clone(),
            files,
            cli,
        })
    }

    /// Parse from raw `(dest, token)` pairs, for callers driving their own
    /// argument parser. Keys are dotted destinations or declared aliases;
    /// `config_path` names extra files.
    pub fn parse_flat<I, K, V>(self, raw: I) -> Result<R, StructfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let registrar = self.registrar()?;
        self.finish(&registrar, raw)
    }

    fn finish<I, K, V>(&self, registrar: &Registrar, raw: I) -> Result<R, StructfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let _guard = self.format.map(|format| self.ctx.scoped_format(format));
        let input = self.resolve_input(registrar, raw)?;
        resolve::resolve(self.ctx, input)
    }
}

#[cfg(feature = "clap")]
impl<R: Record> StructfigBuilder<'_, R> {
    /// The clap command built from the schema.
    pub fn command(&self) -> Result<clap::Command, StructfigError> {
        Ok(self.registrar()?.command(self.effective_app_name()))
    }

    /// Parse the process arguments.
    pub fn parse(self) -> Result<R, StructfigError> {
        self.parse_from(std::env::args_os())
    }

    /// Parse the given arguments; the first is the program name.
    pub fn parse_from<I, T>(self, args: I) -> Result<R, StructfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let registrar = self.registrar()?;
        let matches = registrar
            .command(self.effective_app_name())
            .try_get_matches_from(args)?;
        let raw = registrar.flat_cli(&matches);
        self.finish(&registrar, raw)
    }
}
