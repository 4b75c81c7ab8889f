//! Decoding lock file text into [`Locks`].
//!
//! Decoding never stops at the first problem: every block is checked and
//! all diagnostics are returned together. Any error diagnostic means the
//! returned [`Locks`] must not be trusted.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::warn;

use super::syntax::{self, Attribute, Block, Body, Expr};
use super::{Locks, ProviderLock};
use crate::addrs::{Provider, is_lockable, parse_provider_source};
use crate::core::diagnostics::{Diagnostic, Diagnostics, SourcePos};
use crate::source::{PackageHash, Platform, Version, VersionConstraints, parse_version};

/// Decode lock file source text.
pub fn decode_locks(src: &str) -> (Locks, Diagnostics) {
    let mut diags = Diagnostics::new();
    let body = match syntax::parse(src) {
        Ok(body) => body,
        Err(diag) => {
            diags.push(diag);
            return (Locks::new(), diags);
        }
    };

    let mut locks = Locks::new();
    let mut declared: HashMap<Provider, SourcePos> = HashMap::new();
    let mut warned_types: HashSet<String> = HashSet::new();

    for attr in body.attributes() {
        diags.push(
            Diagnostic::error(
                "Unsupported argument",
                format!("An argument named {:?} is not expected at the top level of a lock file.", attr.name),
            )
            .at(attr.pos),
        );
    }

    for block in body.blocks() {
        match block.kind.as_str() {
            "provider" => {
                let Some(lock) = decode_provider_block(block, &mut diags) else {
                    continue;
                };
                if let Some(previous) = declared.get(lock.provider()) {
                    diags.push(
                        Diagnostic::error(
                            "Duplicate provider lock",
                            format!(
                                "This lockfile already declared a lock for provider {} at {previous}.",
                                lock.provider()
                            ),
                        )
                        .at(block.pos),
                    );
                    continue;
                }
                declared.insert(lock.provider().clone(), block.pos);
                // addresses were checked for lockability above
                if let Err(e) = locks.set_provider(lock) {
                    diags.push(Diagnostic::error("Invalid provider source address", e.to_string()).at(block.pos));
                }
            }
            "module" => {
                if warned_types.insert(block.kind.clone()) {
                    warn!(target: "provman::lockfile", "ignoring module dependency locks");
                    diags.push(
                        Diagnostic::warning(
                            "Dependency locks for modules are not yet supported",
                            format!(
                                "provman v{} only supports dependency locks for providers, not for modules. \
                                 This lock file may be intended for a later version that also supports \
                                 dependency locks for modules.",
                                env!("CARGO_PKG_VERSION")
                            ),
                        )
                        .at(block.pos),
                    );
                }
            }
            other => {
                if warned_types.insert(block.kind.clone()) {
                    warn!(target: "provman::lockfile", "ignoring unsupported lock file block {other:?}");
                    diags.push(
                        Diagnostic::warning(
                            "Unsupported lock file block",
                            format!(
                                "Blocks of type {other:?} are not understood by this version and were ignored."
                            ),
                        )
                        .at(block.pos),
                    );
                }
            }
        }
    }

    (locks, diags)
}

/// Index a body's attributes by name, reporting duplicates and any name not
/// in `allowed`.
fn collect_attributes<'a>(
    body: &'a Body,
    allowed: Option<&[&str]>,
    diags: &mut Diagnostics,
) -> BTreeMap<&'a str, &'a Attribute> {
    let mut seen: BTreeMap<&str, &Attribute> = BTreeMap::new();
    for attr in body.attributes() {
        if allowed.is_some_and(|allowed| !allowed.contains(&attr.name.as_str())) {
            diags.push(
                Diagnostic::error(
                    "Unsupported argument",
                    format!("An argument named {:?} is not expected here.", attr.name),
                )
                .at(attr.pos),
            );
            continue;
        }
        if let Some(previous) = seen.get(attr.name.as_str()) {
            diags.push(
                Diagnostic::error(
                    "Duplicate argument",
                    format!("The argument {:?} was already set at {}.", attr.name, previous.pos),
                )
                .at(attr.pos),
            );
            continue;
        }
        seen.insert(&attr.name, attr);
    }
    seen
}

fn string_value<'a>(attr: &'a Attribute, summary: &str, diags: &mut Diagnostics) -> Option<&'a str> {
    if let Expr::String(s) = &attr.value {
        Some(s.as_str())
    } else {
        diags.push(
            Diagnostic::error(
                summary,
                format!("The {:?} argument must be a string, not a {}.", attr.name, attr.value.type_name()),
            )
            .at(attr.value_pos),
        );
        None
    }
}

fn decode_provider_block(block: &Block, diags: &mut Diagnostics) -> Option<ProviderLock> {
    let errors_before = diags.errors().count();

    let addr = match block.labels.as_slice() {
        [(label, pos)] => decode_provider_addr(label, *pos, diags),
        [] => {
            diags.push(
                Diagnostic::error("Missing name for provider", "A provider block must have one label: the provider source address.")
                    .at(block.pos),
            );
            None
        }
        [_, (_, extra), ..] => {
            diags.push(
                Diagnostic::error("Extraneous label for provider", "A provider block must have exactly one label.")
                    .at(*extra),
            );
            None
        }
    };
    let display = addr.as_ref().map_or_else(|| "(invalid)".to_string(), ToString::to_string);

    let attrs = collect_attributes(&block.body, Some(&["version", "constraints"]), diags);

    let version = match attrs.get("version") {
        Some(attr) => decode_version(attr, &display, diags),
        None => {
            diags.push(
                Diagnostic::error("Missing required argument", "A provider lock block must contain a \"version\" argument.")
                    .at(block.pos),
            );
            None
        }
    };
    let constraints = attrs
        .get("constraints")
        .and_then(|attr| decode_constraints(attr, &display, diags));

    let mut hashes = None;
    let mut hashes_pos: Option<SourcePos> = None;
    for nested in block.body.blocks() {
        if nested.kind != "hashes" {
            diags.push(
                Diagnostic::error(
                    "Unsupported block type",
                    format!("Blocks of type {:?} are not expected in a provider lock.", nested.kind),
                )
                .at(nested.pos),
            );
            continue;
        }
        if let Some(previous) = hashes_pos {
            diags.push(
                Diagnostic::error(
                    "Duplicate hashes block",
                    format!("The hashes for provider {display} were already declared at {previous}."),
                )
                .at(nested.pos),
            );
            continue;
        }
        hashes_pos = Some(nested.pos);
        hashes = Some(decode_hashes(nested, diags));
    }

    if diags.errors().count() > errors_before {
        return None;
    }
    Some(ProviderLock::new(addr?, version?, constraints, hashes))
}

fn decode_provider_addr(label: &str, pos: SourcePos, diags: &mut Diagnostics) -> Option<Provider> {
    let summary = "Invalid provider source address";
    let addr = match parse_provider_source(label) {
        Ok(addr) => addr,
        Err(e) => {
            diags.push(
                Diagnostic::error(
                    summary,
                    format!(
                        "The provider source address for a provider lock must be a valid, fully-qualified \
                         address of the form \"hostname/namespace/type\": {e}."
                    ),
                )
                .at(pos),
            );
            return None;
        }
    };

    if addr.is_builtin() {
        diags.push(
            Diagnostic::error(
                summary,
                format!(
                    "Cannot lock a version for built-in provider {addr}. Built-in providers are bundled \
                     with provman itself, so their version cannot be selected independently."
                ),
            )
            .at(pos),
        );
        return None;
    }
    if !is_lockable(&addr) {
        diags.push(
            Diagnostic::error(
                summary,
                format!("Provider source address {addr} is a special provider that is not eligible for dependency locking."),
            )
            .at(pos),
        );
        return None;
    }

    let canonical = addr.to_string();
    if canonical != label {
        diags.push(
            Diagnostic::error(
                "Non-normalized provider source address",
                format!(
                    "The provider source address for this provider lock must be written as {canonical:?}, \
                     the fully-qualified and normalized form."
                ),
            )
            .at(pos),
        );
        return None;
    }
    Some(addr)
}

fn decode_version(attr: &Attribute, provider: &str, diags: &mut Diagnostics) -> Option<Version> {
    let summary = "Invalid provider version number";
    let raw = string_value(attr, summary, diags)?;
    let version = match parse_version(raw) {
        Ok(v) => v,
        Err(e) => {
            diags.push(
                Diagnostic::error(summary, format!("The selected version number for provider {provider} is invalid: {e}."))
                    .at(attr.value_pos),
            );
            return None;
        }
    };
    let canonical = version.to_string();
    if canonical != raw {
        diags.push(
            Diagnostic::error(
                summary,
                format!(
                    "The selected version number for provider {provider} must be written in normalized form: {canonical:?}."
                ),
            )
            .at(attr.value_pos),
        );
        return None;
    }
    Some(version)
}

fn decode_constraints(
    attr: &Attribute,
    provider: &str,
    diags: &mut Diagnostics,
) -> Option<VersionConstraints> {
    let summary = "Invalid provider version constraints";
    let raw = string_value(attr, summary, diags)?;
    let constraints = match VersionConstraints::parse(raw) {
        Ok(c) => c,
        Err(e) => {
            diags.push(
                Diagnostic::error(
                    summary,
                    format!("The recorded version constraints for provider {provider} are invalid: {e}."),
                )
                .at(attr.value_pos),
            );
            return None;
        }
    };
    let canonical = constraints.to_string();
    if canonical != raw {
        diags.push(
            Diagnostic::error(
                summary,
                format!(
                    "The recorded version constraints for provider {provider} must be written in normalized form: {canonical:?}."
                ),
            )
            .at(attr.value_pos),
        );
        return None;
    }
    Some(constraints)
}

fn decode_hashes(block: &Block, diags: &mut Diagnostics) -> BTreeMap<Platform, Vec<PackageHash>> {
    let mut out = BTreeMap::new();

    if let Some((_, pos)) = block.labels.first() {
        diags.push(Diagnostic::error("Extraneous label for hashes", "A hashes block has no labels.").at(*pos));
    }
    for nested in block.body.blocks() {
        diags.push(
            Diagnostic::error(
                "Unsupported block type",
                format!("Blocks of type {:?} are not expected in a hashes block.", nested.kind),
            )
            .at(nested.pos),
        );
    }

    for (name, attr) in collect_attributes(&block.body, None, diags) {
        let platform = match Platform::parse(name) {
            Ok(p) if p.to_string() == name => p,
            Ok(p) => {
                diags.push(
                    Diagnostic::error(
                        "Non-normalized platform",
                        format!("The platform must be written as {:?}.", p.to_string()),
                    )
                    .at(attr.pos),
                );
                continue;
            }
            Err(e) => {
                diags.push(Diagnostic::error("Invalid platform", format!("{e}.")).at(attr.pos));
                continue;
            }
        };

        let Expr::List(items) = &attr.value else {
            diags.push(
                Diagnostic::error(
                    "Invalid provider hash set",
                    format!("The hashes for {name} must be a list of strings, not a {}.", attr.value.type_name()),
                )
                .at(attr.value_pos),
            );
            continue;
        };
        let mut hashes = Vec::with_capacity(items.len());
        for (item, pos) in items {
            match item {
                Expr::String(s) if !s.is_empty() => hashes.push(PackageHash::new(s.as_str())),
                _ => diags.push(
                    Diagnostic::error(
                        "Invalid provider hash set",
                        format!("Each hash for {name} must be a non-empty string."),
                    )
                    .at(*pos),
                ),
            }
        }
        out.insert(platform, hashes);
    }
    out
}
