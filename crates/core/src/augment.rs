//! Merging workflow inputs into the file-based configuration.
//!
//! Workflow inputs for `queries`, `packs` and `threat-models` either override
//! the configuration file or, when prefixed with `+`, are appended to it. The
//! prefix is interpreted once here; everything downstream sees an explicit
//! [`InputMode`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::property_error;
use crate::language::Language;
use crate::pack::{PackSpecification, validate_pack_specification};
use crate::tools::Os;
use crate::toolchain::{CODEQL_VERSION_ML_POWERED_QUERIES_WINDOWS, version_at_least};
use crate::{Error, Result};

/// Packs to download, by language.
pub type Packs = BTreeMap<Language, Vec<String>>;

/// Name of the ML-powered JavaScript query pack.
pub const ML_POWERED_JS_QUERIES_PACK_NAME: &str = "codeql/javascript-experimental-atm-queries";

const QUERIES_PROPERTY: &str = "queries";
const PACKS_PROPERTY: &str = "packs";
const THREAT_MODELS_PROPERTY: &str = "threat-models";

/// Whether a workflow input replaces or extends the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// The input replaces the file's setting.
    Override,
    /// The input is added to the file's setting (`+` prefix).
    Combine,
}

/// A workflow input with its `+` prefix interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModedInput {
    /// Replace or combine.
    pub mode: InputMode,
    /// The input with the prefix removed, trimmed.
    pub payload: String,
}

impl ModedInput {
    /// Whether the input is appended to the configuration file.
    #[must_use]
    pub fn combines(&self) -> bool {
        self.mode == InputMode::Combine
    }

    /// Comma separated entries of the payload, trimmed.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.payload
            .split(',')
            .map(|entry| entry.trim().to_string())
            .collect()
    }
}

/// Interpret a raw workflow input.
///
/// Missing and blank inputs are `None`. A leading `+` (after trimming) selects
/// [`InputMode::Combine`] and is stripped once.
#[must_use]
pub fn parse_override_or_combine(raw: Option<&str>) -> Option<ModedInput> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(match trimmed.strip_prefix('+') {
        Some(rest) => ModedInput {
            mode: InputMode::Combine,
            payload: rest.trim().to_string(),
        },
        None => ModedInput {
            mode: InputMode::Override,
            payload: trimmed.to_string(),
        },
    })
}

/// A `queries` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEntry {
    /// Query, suite or directory reference.
    pub uses: String,
}

/// How the configuration file has to be augmented with workflow inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AugmentationProperties {
    /// The `queries` input had a `+` prefix.
    pub queries_input_combines: bool,
    /// The `packs` input had a `+` prefix.
    pub packs_input_combines: bool,
    /// The `threat-models` input had a `+` prefix.
    pub threat_models_input_combines: bool,
    /// The ML-powered JavaScript pack was added.
    pub injected_ml_queries: bool,
    /// Parsed `queries` input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries_input: Option<Vec<QueryEntry>>,
    /// Parsed `packs` input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packs_input: Option<Vec<String>>,
    /// Parsed `threat-models` input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_models_input: Option<Vec<String>>,
}

fn empty_combine_error(property: &str, what: &str) -> Error {
    Error::user(property_error(
        None,
        property,
        &format!(
            "A '+' was used in the '{property}' input to specify that you wished to add some \
             {what} to your CodeQL analysis. However, no {what} were specified. Please either \
             remove the '+' or specify some {what}."
        ),
    ))
}

/// Interpret the `packs`, `queries` and `threat-models` workflow inputs.
///
/// A `packs` input needs exactly one language.
pub fn calculate_augmentation(
    raw_packs: Option<&str>,
    raw_queries: Option<&str>,
    raw_threat_models: Option<&str>,
    languages: &[Language],
) -> Result<AugmentationProperties> {
    let packs = parse_override_or_combine(raw_packs);
    let queries = parse_override_or_combine(raw_queries);
    let threat_models = parse_override_or_combine(raw_threat_models);

    Ok(AugmentationProperties {
        queries_input_combines: queries.as_ref().is_some_and(ModedInput::combines),
        packs_input_combines: packs.as_ref().is_some_and(ModedInput::combines),
        threat_models_input_combines: threat_models.as_ref().is_some_and(ModedInput::combines),
        injected_ml_queries: false,
        queries_input: parse_queries_input(queries.as_ref())?,
        packs_input: parse_packs_input(packs.as_ref(), languages)?,
        threat_models_input: parse_threat_models_input(threat_models.as_ref())?,
    })
}

fn parse_queries_input(input: Option<&ModedInput>) -> Result<Option<Vec<QueryEntry>>> {
    let Some(input) = input else {
        return Ok(None);
    };
    if input.combines() && input.payload.is_empty() {
        return Err(empty_combine_error(QUERIES_PROPERTY, "queries"));
    }
    Ok(Some(
        input
            .entries()
            .into_iter()
            .map(|uses| QueryEntry { uses })
            .collect(),
    ))
}

fn parse_packs_input(input: Option<&ModedInput>, languages: &[Language]) -> Result<Option<Vec<String>>> {
    let Some(input) = input else {
        return Ok(None);
    };
    match languages.len() {
        0 => {
            return Err(Error::user(
                "No languages specified. Cannot process the packs input.",
            ));
        }
        1 => {}
        _ => {
            return Err(Error::user(
                "Cannot specify a 'packs' input in a multi-language analysis. Use a \
                 codeql-config.yml file instead and specify packs by language.",
            ));
        }
    }
    if input.combines() && input.payload.is_empty() {
        return Err(empty_combine_error(PACKS_PROPERTY, "packs"));
    }
    input
        .entries()
        .iter()
        .map(|pack| validate_pack_specification(pack, None))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn parse_threat_models_input(input: Option<&ModedInput>) -> Result<Option<Vec<String>>> {
    let Some(input) = input else {
        return Ok(None);
    };
    if input.combines() && input.payload.is_empty() {
        return Err(empty_combine_error(THREAT_MODELS_PROPERTY, "threat models"));
    }
    Ok(Some(input.entries()))
}

/// Parse the `packs` property of a configuration file.
///
/// A plain list is only allowed for single-language analyses. Packs for
/// languages that are valid but not analysed in this run are ignored.
pub fn parse_packs_from_config(
    value: Option<&Value>,
    languages: &[Language],
    config_file: Option<&str>,
) -> Result<Packs> {
    let invalid = || Error::property(config_file, PACKS_PROPERTY, "must be an array of non-empty strings");
    let mut packs = Packs::new();

    let by_language: Vec<(Language, &Vec<Value>)> = match value {
        None | Some(Value::Null) => return Ok(packs),
        Some(Value::Array(list)) => match languages {
            [language] => vec![(*language, list)],
            _ => {
                return Err(Error::property(
                    config_file,
                    PACKS_PROPERTY,
                    "must split packages by language",
                ));
            }
        },
        Some(Value::Object(map)) => {
            let mut entries = Vec::new();
            for (key, list) in map {
                let Value::Array(list) = list else {
                    return Err(invalid());
                };
                let Some(language) = Language::parse(key) else {
                    return Err(Error::property(
                        config_file,
                        PACKS_PROPERTY,
                        &format!("has \"{key}\", but it is not a valid language."),
                    ));
                };
                if !languages.contains(&language) {
                    info!(
                        language = %language,
                        "Ignoring packs since this language is not being analyzed in this run"
                    );
                    continue;
                }
                entries.push((language, list));
            }
            entries
        }
        Some(_) => return Err(invalid()),
    };

    for (language, list) in by_language {
        let specs = list
            .iter()
            .map(|pack| match pack {
                Value::String(pack) => validate_pack_specification(pack, config_file),
                other => Err(Error::invalid_pack(other.to_string(), config_file)),
            })
            .collect::<Result<Vec<_>>>()?;
        packs.entry(language).or_default().extend(specs);
    }
    Ok(packs)
}

/// Combine packs from the configuration file with the `packs` input.
///
/// The input belongs to the single analysed language. When it combines, it is
/// appended after the file's packs for that language; otherwise it replaces
/// every file pack.
#[must_use]
pub fn merge_packs(from_config: Packs, augmentation: &AugmentationProperties, languages: &[Language]) -> Packs {
    let (Some(input), Some(language)) = (&augmentation.packs_input, languages.first()) else {
        return from_config;
    };
    if !augmentation.packs_input_combines {
        return Packs::from([(*language, input.clone())]);
    }
    let mut packs = from_config;
    packs.entry(*language).or_default().extend(input.iter().cloned());
    packs
}

/// The ML-powered query pack specification compatible with `cli_version`.
#[must_use]
pub fn ml_powered_js_queries_pack(cli_version: &str) -> String {
    let range = if version_at_least(cli_version, "2.11.3") {
        "~0.4.0"
    } else if version_at_least(cli_version, "2.9.3") {
        "~0.3.0"
    } else {
        "~0.2.0"
    };
    format!("{ML_POWERED_JS_QUERIES_PACK_NAME}@{range}")
}

fn is_ml_powered_js_queries_pack(pack: &str) -> bool {
    PackSpecification::parse(pack, None).is_ok_and(|p| p.is_named(ML_POWERED_JS_QUERIES_PACK_NAME))
}

/// Add the ML-powered JavaScript query pack for a security suite, if applicable.
///
/// Returns whether the pack was added. Nothing is added unless JavaScript is
/// analysed, the feature is enabled, and no JavaScript pack already names the
/// ML pack. Windows additionally needs a recent enough CLI.
pub fn inject_ml_queries(
    packs: &mut Packs,
    languages: &[Language],
    ml_enabled: bool,
    cli_version: &str,
    os: Os,
) -> bool {
    if !ml_enabled || !languages.contains(&Language::Javascript) {
        return false;
    }
    if os == Os::Windows && !version_at_least(cli_version, CODEQL_VERSION_ML_POWERED_QUERIES_WINDOWS) {
        debug!(cli_version, "CLI too old for ML-powered queries on Windows");
        return false;
    }
    let javascript = packs.entry(Language::Javascript).or_default();
    if javascript.iter().any(|p| is_ml_powered_js_queries_pack(p)) {
        return false;
    }
    javascript.push(ml_powered_js_queries_pack(cli_version));
    true
}

/// Report which ML-powered query pack will run.
///
/// `"false"` if none, the version range if exactly one, `"latest"` if it has no
/// version, and `"other"` if several are present.
#[must_use]
pub fn ml_powered_js_queries_status(packs: &Packs) -> String {
    let ml_packs: Vec<PackSpecification> = packs
        .get(&Language::Javascript)
        .into_iter()
        .flatten()
        .filter_map(|p| PackSpecification::parse(p, None).ok())
        .filter(|p| p.is_named(ML_POWERED_JS_QUERIES_PACK_NAME) && p.path.is_none())
        .collect();
    match ml_packs.as_slice() {
        [] => "false".to_string(),
        [pack] => pack.version.clone().unwrap_or_else(|| "latest".to_string()),
        _ => "other".to_string(),
    }
}

/// Build the configuration handed to a toolchain that parses it itself.
///
/// Inputs override or extend `original`, the ML pack is appended when it was
/// injected, and empty lists are dropped.
#[must_use]
pub fn augmented_user_config(
    original: &Value,
    augmentation: &AugmentationProperties,
    cli_version: &str,
) -> Value {
    let mut config = match original {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    if let Some(queries) = &augmentation.queries_input {
        let input = queries.iter().map(|q| serde_json::json!({ "uses": q.uses }));
        apply_list(&mut config, QUERIES_PROPERTY, input, augmentation.queries_input_combines);
    }

    if let Some(packs) = &augmentation.packs_input {
        let input: Vec<Value> = packs.iter().cloned().map(Value::String).collect();
        if augmentation.packs_input_combines {
            let appended = match config.get_mut(PACKS_PROPERTY) {
                Some(Value::Array(existing)) => {
                    existing.extend(input.iter().cloned());
                    true
                }
                // Single-language analysis, so the map has at most one entry.
                Some(Value::Object(map)) => match map.values_mut().next() {
                    Some(Value::Array(existing)) => {
                        existing.extend(input.iter().cloned());
                        true
                    }
                    _ => false,
                },
                _ => false,
            };
            if !appended {
                config.insert(PACKS_PROPERTY.to_string(), Value::Array(input));
            }
        } else {
            config.insert(PACKS_PROPERTY.to_string(), Value::Array(input));
        }
    }

    if augmentation.injected_ml_queries {
        let pack = Value::String(ml_powered_js_queries_pack(cli_version));
        match config.get_mut(PACKS_PROPERTY) {
            Some(Value::Array(existing)) => existing.push(pack),
            Some(Value::Object(map)) => {
                let entry = map
                    .entry(Language::Javascript.as_str())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match entry {
                    Value::Array(existing) => existing.push(pack),
                    other => *other = Value::Array(vec![pack]),
                }
            }
            _ => {
                config.insert(PACKS_PROPERTY.to_string(), Value::Array(vec![pack]));
            }
        }
    }

    if let Some(threat_models) = &augmentation.threat_models_input {
        let input = threat_models.iter().cloned().map(Value::String);
        apply_list(
            &mut config,
            THREAT_MODELS_PROPERTY,
            input,
            augmentation.threat_models_input_combines,
        );
    }

    for property in [QUERIES_PROPERTY, PACKS_PROPERTY, THREAT_MODELS_PROPERTY] {
        if config
            .get(property)
            .and_then(Value::as_array)
            .is_some_and(Vec::is_empty)
        {
            config.remove(property);
        }
    }

    Value::Object(config)
}

fn apply_list(
    config: &mut Map<String, Value>,
    property: &str,
    input: impl Iterator<Item = Value>,
    combines: bool,
) {
    let mut list = if combines {
        config
            .get(property)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    list.extend(input);
    config.insert(property.to_string(), Value::Array(list));
}
