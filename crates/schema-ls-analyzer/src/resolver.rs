//! Binds `extends`, relation-target and data-type references across the
//! loaded source set, and checks the semantic invariants that don't need a
//! cross-file view (duplicate names, multiplicity conflicts, inheritance
//! cycles, malformed invariant bodies).

use std::collections::{HashMap, HashSet};

use schema_ls_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticCollector, RelatedInfo, Severity};
use schema_ls_registry::SourceId;
use schema_ls_syntax::ast::{DataTypeRef, Multiplicity, Schema, Type, TypeRef};

use crate::loader::LoadedSource;

pub fn resolve(sources: &[LoadedSource]) -> DiagnosticCollector {
    let mut diagnostics = DiagnosticCollector::new();
    let by_id: HashMap<&SourceId, &Schema> = sources.iter().map(|s| (&s.source_id, &s.schema)).collect();

    for loaded in sources {
        let schema = &loaded.schema;
        check_duplicate_names(schema, &mut diagnostics);
        check_inheritance_cycles(schema, &mut diagnostics);
        check_invariants(schema, &mut diagnostics);

        for ty in &schema.types {
            for inherit in &ty.inherits {
                resolve_type_ref(schema, &by_id, inherit, &mut diagnostics);
            }

            let mut seen_fields: HashMap<&str, Multiplicity> = HashMap::new();
            for rel in ty.associations.iter().chain(ty.compositions.iter()) {
                resolve_type_ref(schema, &by_id, &rel.target, &mut diagnostics);
                match seen_fields.get(rel.field_name.as_str()) {
                    Some(prev) if *prev != rel.multiplicity => {
                        diagnostics.push(Diagnostic::new(
                            Severity::Error,
                            DiagnosticCode::SemanticMultiplicityConflict,
                            format!("relation '{}' redeclared with a different multiplicity", rel.field_name),
                            rel.span.clone(),
                        ));
                    }
                    _ => {
                        seen_fields.insert(rel.field_name.as_str(), rel.multiplicity);
                    }
                }
            }

            for prop in &ty.properties {
                if let Some(dt_ref) = &prop.data_type_ref {
                    resolve_data_type_ref(schema, &by_id, dt_ref, &mut diagnostics);
                }
            }
        }
    }

    diagnostics
}

enum AliasLookup<'a> {
    Unique(&'a SourceId),
    Ambiguous,
    NotFound,
}

fn alias_target<'a>(schema: &'a Schema, alias: &str) -> AliasLookup<'a> {
    let mut found: Option<&SourceId> = None;
    let mut ambiguous = false;
    for import in &schema.imports {
        if import.alias.as_deref() != Some(alias) {
            continue;
        }
        if let Some(id) = &import.resolved_source_id {
            match found {
                None => found = Some(id),
                Some(existing) if existing != id => ambiguous = true,
                _ => {}
            }
        }
    }
    if ambiguous {
        AliasLookup::Ambiguous
    } else if let Some(id) = found {
        AliasLookup::Unique(id)
    } else {
        AliasLookup::NotFound
    }
}

fn resolve_type_ref(schema: &Schema, by_id: &HashMap<&SourceId, &Schema>, type_ref: &TypeRef, diagnostics: &mut DiagnosticCollector) {
    let target_schema = match &type_ref.qualifier {
        None => Some(schema),
        Some(q) => match alias_target(schema, q) {
            AliasLookup::Unique(id) => by_id.get(id).copied(),
            AliasLookup::Ambiguous => {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::ResolveAmbiguousQualifier,
                    format!("'{q}' refers to more than one import"),
                    type_ref.span.clone(),
                ));
                return;
            }
            AliasLookup::NotFound => None,
        },
    };
    let found = target_schema.map(|s| s.types.iter().any(|t| t.name == type_ref.name)).unwrap_or(false);
    if !found {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            DiagnosticCode::ResolveUnknownType,
            format!("unknown type '{}'", type_ref.name),
            type_ref.span.clone(),
        ));
    }
}

fn resolve_data_type_ref(schema: &Schema, by_id: &HashMap<&SourceId, &Schema>, dt_ref: &DataTypeRef, diagnostics: &mut DiagnosticCollector) {
    let target_schema = match &dt_ref.qualifier {
        None => Some(schema),
        Some(q) => match alias_target(schema, q) {
            AliasLookup::Unique(id) => by_id.get(id).copied(),
            AliasLookup::Ambiguous => {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::ResolveAmbiguousQualifier,
                    format!("'{q}' refers to more than one import"),
                    dt_ref.span.clone(),
                ));
                return;
            }
            AliasLookup::NotFound => None,
        },
    };
    let found = target_schema.map(|s| s.data_types.iter().any(|d| d.name == dt_ref.name)).unwrap_or(false);
    if !found {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            DiagnosticCode::ResolveUnknownDataType,
            format!("unknown data type '{}'", dt_ref.name),
            dt_ref.span.clone(),
        ));
    }
}

fn check_duplicate_names(schema: &Schema, diagnostics: &mut DiagnosticCollector) {
    let mut seen: HashMap<&str, schema_ls_registry::Span> = HashMap::new();
    let entries = schema
        .types
        .iter()
        .map(|t| (t.name.as_str(), t.name_span.clone()))
        .chain(schema.data_types.iter().map(|d| (d.name.as_str(), d.name_span.clone())));
    for (name, span) in entries {
        if let Some(prev_span) = seen.get(name) {
            diagnostics.push(
                Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::SemanticDuplicateName,
                    format!("'{name}' is declared more than once"),
                    span,
                )
                .with_related(vec![RelatedInfo { span: prev_span.clone(), message: "previous declaration here".to_string() }]),
            );
        } else {
            seen.insert(name, span);
        }
    }
}

/// Same-schema `extends` cycles only; a qualified (cross-file) `extends`
/// target is treated as an opaque boundary since the import graph already
/// tolerates cycles on its own terms.
fn check_inheritance_cycles(schema: &Schema, diagnostics: &mut DiagnosticCollector) {
    let index: HashMap<&str, &Type> = schema.types.iter().map(|t| (t.name.as_str(), t)).collect();
    for ty in &schema.types {
        let mut visiting = HashSet::new();
        visiting.insert(ty.name.as_str());
        if has_cycle_from(ty, &index, &mut visiting) {
            if let Some(bad) = ty.inherits.iter().find(|r| r.qualifier.is_none()) {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::SemanticInvalidInheritance,
                    format!("inheritance cycle involving '{}'", ty.name),
                    bad.span.clone(),
                ));
            }
        }
    }
}

/// Analysis-time check over each invariant's raw body (§3 treats invariant
/// syntax as opaque to the parser, so this never builds an expression
/// tree): re-tokenizes the body and flags it malformed if it's empty or its
/// parens/brackets don't balance. Braces are never unbalanced here since
/// the parser already captured the body by matching `{`/`}` depth.
fn check_invariants(schema: &Schema, diagnostics: &mut DiagnosticCollector) {
    for ty in &schema.types {
        for invariant in &ty.invariants {
            if let Some(reason) = invariant_malformed_reason(&invariant.body) {
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticCode::InvariantMalformed,
                    format!("invariant '{}' is malformed: {reason}", invariant.name),
                    invariant.span.clone(),
                ));
            }
        }
    }
}

fn invariant_malformed_reason(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return Some("empty invariant body".to_string());
    }
    let mut paren_depth = 0i32;
    let mut bracket_depth = 0i32;
    for token in schema_ls_syntax::lex(body) {
        match token.kind {
            schema_ls_syntax::TokenKind::LParen => paren_depth += 1,
            schema_ls_syntax::TokenKind::RParen => {
                paren_depth -= 1;
                if paren_depth < 0 {
                    return Some("unbalanced ')'".to_string());
                }
            }
            schema_ls_syntax::TokenKind::LBracket => bracket_depth += 1,
            schema_ls_syntax::TokenKind::RBracket => {
                bracket_depth -= 1;
                if bracket_depth < 0 {
                    return Some("unbalanced ']'".to_string());
                }
            }
            _ => {}
        }
    }
    if paren_depth != 0 {
        return Some("unbalanced '('".to_string());
    }
    if bracket_depth != 0 {
        return Some("unbalanced '['".to_string());
    }
    None
}

fn has_cycle_from<'a>(ty: &'a Type, index: &HashMap<&str, &'a Type>, visiting: &mut HashSet<&'a str>) -> bool {
    for parent_ref in &ty.inherits {
        if parent_ref.qualifier.is_some() {
            continue;
        }
        if visiting.contains(parent_ref.name.as_str()) {
            return true;
        }
        if let Some(parent) = index.get(parent_ref.name.as_str()) {
            visiting.insert(parent.name.as_str());
            let found = has_cycle_from(parent, index, visiting);
            visiting.remove(parent.name.as_str());
            if found {
                return true;
            }
        }
    }
    false
}
