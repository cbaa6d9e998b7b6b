//! Clap adapter for the registrar.
//!
//! This module is the optional integration layer between structfig's
//! framework-agnostic core and the [clap](https://docs.rs/clap) CLI parser.
//! It is compiled only when the `clap` Cargo feature is enabled (on by
//! default).
//!
//! [`Registrar::command`] turns the registered groups into a clap
//! [`Command`] with one `--dotted.dest` option per leaf field, grouped under
//! a help heading per record, plus the reserved `--config_path` option.
//! [`Registrar::flat_cli`] reads the parsed matches back into raw
//! `(dest, token)` pairs for [`Registrar::coerce_flat`].
//!
//! Every option is optional at the clap level: required fields are enforced
//! when the merged config is decoded, so a value may come from a file just
//! as well as from the command line.

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::decode::str2bool;
use crate::error::DecodeError;
use crate::registrar::{CONFIG_PATH, FieldDescriptor, Registrar};

impl Registrar {
    /// Builds a clap command for the registered fields.
    pub fn command(&self, name: impl Into<String>) -> Command {
        let mut command = Command::new(name.into()).arg(
            Arg::new(CONFIG_PATH)
                .long(CONFIG_PATH)
                .value_name("PATH")
                .num_args(1..)
                .action(ArgAction::Append)
                .help("Config file(s) to load; later files override earlier ones"),
        );
        for group in self.groups() {
            let heading = group.title();
            if let Some(description) = &group.description {
                command = command.next_help_heading(format!("{heading}: {description}"));
            } else {
                command = command.next_help_heading(heading);
            }
            for field in &group.fields {
                command = command.arg(field_arg(field));
            }
        }
        command
    }

    /// Raw `(dest, token)` pairs for every option given on the command line,
    /// with one `config_path` pair per config file.
    pub fn flat_cli(&self, matches: &ArgMatches) -> Vec<(String, String)> {
        let mut raw = Vec::new();
        if let Some(paths) = matches.get_many::<String>(CONFIG_PATH) {
            raw.extend(paths.map(|path| (CONFIG_PATH.to_string(), path.clone())));
        }
        for field in self.fields() {
            if let Some(token) = matches.get_one::<String>(&field.dest) {
                raw.push((field.dest.clone(), token.clone()));
            }
        }
        raw
    }
}

/// Validates boolean tokens at parse time, keeping the raw text.
fn bool_token(raw: &str) -> Result<String, DecodeError> {
    str2bool(raw).map(|_| raw.to_string())
}

fn field_arg(field: &FieldDescriptor) -> Arg {
    let mut arg = Arg::new(field.dest.clone())
        .long(field.dest.clone())
        .value_name(field.ty.to_string())
        .action(ArgAction::Set);

    for alias in field.option_strings.iter().skip(1) {
        if let Some(long) = alias.strip_prefix("--") {
            arg = arg.visible_alias(long.to_string());
        } else if let Some(short) = alias.strip_prefix('-') {
            let mut chars = short.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => arg = arg.short(c),
                _ => arg = arg.visible_alias(short.to_string()),
            }
        } else {
            arg = arg.visible_alias(alias.clone());
        }
    }

    if let Some(help) = field.help_text() {
        arg = arg.help(help);
    }

    if field.ty.is_bool() {
        arg.value_parser(ValueParser::new(bool_token))
    } else {
        arg.value_parser(ValueParser::string())
    }
}
