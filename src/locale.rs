use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{anyhow, Context};
use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LocaleConfig;

/// Tables compiled into the binary, used when no override is found in the locales directory.
const BUNDLED: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("pt", include_str!("../locales/pt.json")),
];

#[derive(Debug, Error)]
#[error("no template for `{key}` in locales {languages:?}")]
pub struct TemplateMissing {
    pub key: String,
    pub languages: Vec<String>,
}

/// Templates of a single language, addressed by dotted key (`star.emoji.created`).
#[derive(Debug)]
pub struct LocaleTable {
    language: String,
    templates: HashMap<String, String>,
}

impl LocaleTable {
    pub fn from_reader<R: Read>(language: &str, reader: R) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_reader(reader)
            .with_context(|| format!("couldn't parse `{}` locale table", language))?;

        let mut templates = HashMap::new();
        flatten(None, value, &mut templates);

        Ok(Self {
            language: language.to_owned(),
            templates,
        })
    }

    pub fn empty(language: &str) -> Self {
        Self {
            language: language.to_owned(),
            templates: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.templates.get(key).map(String::as_str)
    }

    /// Loads `<dir>/<language>.json` if it exists, or else the bundled table for this language.
    fn load(dir: Option<&Path>, language: &str) -> anyhow::Result<Option<Self>> {
        if let Some(dir) = dir {
            let path = dir.join(format!("{}.json", language));
            if path.is_file() {
                debug!("loading `{}` locale from {}", language, path.display());
                let file = File::open(&path)
                    .with_context(|| format!("couldn't open {}", path.display()))?;
                return Self::from_reader(language, BufReader::new(file)).map(Some);
            }
        }

        BUNDLED
            .iter()
            .find(|(lang, _)| *lang == language)
            .map(|(lang, table)| Self::from_reader(lang, table.as_bytes()))
            .transpose()
    }
}

/// Walks nested JSON objects, joining keys with dots. Only string leaves are templates.
fn flatten(prefix: Option<&str>, value: Value, templates: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let key = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, key),
                    None => key,
                };
                flatten(Some(key.as_str()), value, templates);
            }
        }
        Value::String(template) => {
            if let Some(key) = prefix {
                templates.insert(key.to_owned(), template);
            }
        }
        _ => {}
    }
}

/// Resolves templates in the configured language, then in the fallback one, and fills in their
/// `{{placeholders}}`.
pub struct Locales {
    primary: LocaleTable,
    fallback: LocaleTable,
    placeholder: Regex,
}

impl Locales {
    pub fn new(primary: LocaleTable, fallback: LocaleTable) -> Self {
        Self {
            primary,
            fallback,
            placeholder: Regex::new(r"\{\{\s*([\w.-]+)\s*\}\}").expect("this should never fail"),
        }
    }

    pub fn load(config: &LocaleConfig) -> anyhow::Result<Self> {
        let dir = config.locales_dir.as_deref();

        let primary = match LocaleTable::load(dir, &config.language)? {
            Some(table) => table,
            None => {
                warn!(
                    "no locale table for `{}`, every message will use `{}`",
                    config.language, config.fallback_language
                );
                LocaleTable::empty(&config.language)
            }
        };

        let fallback = LocaleTable::load(dir, &config.fallback_language)?.ok_or_else(|| {
            anyhow!(
                "no locale table for fallback language `{}`",
                config.fallback_language
            )
        })?;

        Ok(Self::new(primary, fallback))
    }

    pub fn resolve(&self, key: &str) -> Result<&str, TemplateMissing> {
        [&self.primary, &self.fallback]
            .into_iter()
            .find_map(|table| table.get(key))
            .ok_or_else(|| TemplateMissing {
                key: key.to_owned(),
                languages: vec![
                    self.primary.language.clone(),
                    self.fallback.language.clone(),
                ],
            })
    }

    /// Renders a template that doesn't take any field.
    pub fn text(&self, key: &str) -> Result<String, TemplateMissing> {
        self.render(key, &HashMap::new())
    }

    /// Renders a template, substituting every `{{name}}` with `fields[name]`, verbatim.
    ///
    /// Placeholders without a matching field are replaced by nothing.
    pub fn render(
        &self,
        key: &str,
        fields: &HashMap<&str, String>,
    ) -> Result<String, TemplateMissing> {
        let template = self.resolve(key)?;

        let text = self
            .placeholder
            .replace_all(template, |caps: &Captures| {
                fields.get(&caps[1]).cloned().unwrap_or_default()
            });

        Ok(text.into_owned())
    }
}
