//! Symbol and reference extraction from a parsed [`Schema`], plus the
//! spatial lookups feature providers query against.

use schema_ls_registry::{Position, SourceId, Span};
use schema_ls_syntax::ast::{DataType, Multiplicity, RelationKind, Schema, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Schema,
    Import,
    Type,
    DataType,
    Property,
    Association,
    Composition,
    Invariant,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub source_id: SourceId,
    pub full_range: Span,
    pub selection_range: Span,
    pub parent_name: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Extends,
    RelationTarget,
    DataType,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub qualifier: Option<String>,
    pub target_name: String,
    pub span: Span,
}

/// Per-source symbol table plus reference list, built once per analysis.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    pub symbols: Vec<Symbol>,
    pub references: Vec<Reference>,
}

impl SymbolIndex {
    pub fn from_schema(schema: &Schema) -> Self {
        let mut index = SymbolIndex::default();
        let source_id = schema.source_id.clone();

        let schema_name = schema.name.clone().unwrap_or_else(|| "(schema)".to_string());
        let (schema_range, schema_selection, schema_detail) = if let Some(name) = &schema.name {
            let header = schema.header_span.clone().unwrap_or_else(|| schema.span.clone());
            (schema.span.clone(), header, format!("schema \"{name}\""))
        } else {
            // Orphan-schema salvage: no `schema "..."` header was found but
            // imports or types were. Anchor the synthetic symbol at the
            // start of the file so the outline still has a root.
            let point = Span::point(source_id.clone(), schema.span.start);
            (schema.span.clone(), point, "parse error".to_string())
        };
        index.symbols.push(Symbol {
            name: schema_name.clone(),
            kind: SymbolKind::Schema,
            source_id: source_id.clone(),
            full_range: schema_range,
            selection_range: schema_selection,
            parent_name: None,
            detail: schema_detail,
        });

        for import in &schema.imports {
            let detail = match &import.alias {
                Some(alias) => format!("import \"{}\" as {alias}", import.path),
                None => format!("import \"{}\"", import.path),
            };
            index.symbols.push(Symbol {
                name: import.alias.clone().unwrap_or_else(|| import.path.clone()),
                kind: SymbolKind::Import,
                source_id: source_id.clone(),
                full_range: import.span.clone(),
                selection_range: import.span.clone(),
                parent_name: Some(schema_name.clone()),
                detail,
            });
        }

        for data_type in &schema.data_types {
            index.push_data_type(&source_id, &schema_name, data_type);
        }

        for ty in &schema.types {
            index.push_type(&source_id, &schema_name, ty);
        }

        index
    }

    fn push_data_type(&mut self, source_id: &SourceId, schema_name: &str, data_type: &DataType) {
        let head = &data_type.constraint.head;
        let detail = if data_type.constraint.values.is_empty() {
            format!("type {} = {head}", data_type.name)
        } else {
            let values = data_type.constraint.values.iter().map(|v| format!("\"{v}\"")).collect::<Vec<_>>().join(", ");
            format!("type {} = {head}[{values}]", data_type.name)
        };
        self.symbols.push(Symbol {
            name: data_type.name.clone(),
            kind: SymbolKind::DataType,
            source_id: source_id.clone(),
            full_range: data_type.span.clone(),
            selection_range: data_type.name_span.clone(),
            parent_name: Some(schema_name.to_string()),
            detail,
        });
    }

    fn push_type(&mut self, source_id: &SourceId, schema_name: &str, ty: &Type) {
        let mut prefix = String::new();
        if ty.abstract_ {
            prefix.push_str("abstract ");
        }
        if ty.part {
            prefix.push_str("part ");
        }
        let detail = format!("{prefix}type {}", ty.name);
        self.symbols.push(Symbol {
            name: ty.name.clone(),
            kind: SymbolKind::Type,
            source_id: source_id.clone(),
            full_range: ty.span.clone(),
            selection_range: ty.name_span.clone(),
            parent_name: Some(schema_name.to_string()),
            detail,
        });

        for inherit in &ty.inherits {
            self.references.push(Reference {
                kind: ReferenceKind::Extends,
                qualifier: inherit.qualifier.clone(),
                target_name: inherit.name.clone(),
                span: inherit.span.clone(),
            });
        }

        for prop in &ty.properties {
            let constraint_text = prop
                .constraint
                .as_ref()
                .map(|c| c.head.clone())
                .or_else(|| prop.data_type_ref.as_ref().map(|r| r.name.clone()))
                .unwrap_or_default();
            let modifier = if prop.optional { " optional" } else { " required" };
            let detail = format!("{} {constraint_text}{modifier}", prop.name);
            self.symbols.push(Symbol {
                name: prop.name.clone(),
                kind: SymbolKind::Property,
                source_id: source_id.clone(),
                full_range: prop.span.clone(),
                selection_range: prop.name_span.clone(),
                parent_name: Some(ty.name.clone()),
                detail,
            });
            if let Some(dt_ref) = &prop.data_type_ref {
                self.references.push(Reference {
                    kind: ReferenceKind::DataType,
                    qualifier: dt_ref.qualifier.clone(),
                    target_name: dt_ref.name.clone(),
                    span: dt_ref.span.clone(),
                });
            }
        }

        for (kind, relations) in [(RelationKind::Association, &ty.associations), (RelationKind::Composition, &ty.compositions)] {
            for rel in relations {
                let arrow = match kind {
                    RelationKind::Association => "-->",
                    RelationKind::Composition => "*-->",
                };
                let mult = match rel.multiplicity {
                    Multiplicity::One => "one",
                    Multiplicity::Many => "many",
                };
                let target = match &rel.target.qualifier {
                    Some(q) => format!("{q}.{}", rel.target.name),
                    None => rel.target.name.clone(),
                };
                let detail = format!("{arrow} {} ({mult}) {target}", rel.field_name);
                self.symbols.push(Symbol {
                    name: rel.field_name.clone(),
                    kind: match kind {
                        RelationKind::Association => SymbolKind::Association,
                        RelationKind::Composition => SymbolKind::Composition,
                    },
                    source_id: source_id.clone(),
                    full_range: rel.span.clone(),
                    selection_range: rel.name_span.clone(),
                    parent_name: Some(ty.name.clone()),
                    detail,
                });
                self.references.push(Reference {
                    kind: ReferenceKind::RelationTarget,
                    qualifier: rel.target.qualifier.clone(),
                    target_name: rel.target.name.clone(),
                    span: rel.target.span.clone(),
                });
                for prop in &rel.properties {
                    self.symbols.push(Symbol {
                        name: prop.name.clone(),
                        kind: SymbolKind::Property,
                        source_id: source_id.clone(),
                        full_range: prop.span.clone(),
                        selection_range: prop.name_span.clone(),
                        parent_name: Some(rel.field_name.clone()),
                        detail: prop.name.clone(),
                    });
                }
            }
        }

        for invariant in &ty.invariants {
            self.symbols.push(Symbol {
                name: invariant.name.clone(),
                kind: SymbolKind::Invariant,
                source_id: source_id.clone(),
                full_range: invariant.span.clone(),
                selection_range: invariant.name_span.clone(),
                parent_name: Some(ty.name.clone()),
                detail: format!("invariant {}", invariant.name),
            });
        }
    }

    /// The symbol with the smallest range containing `pos`, preferring
    /// fewer lines then narrower columns; ties go to whichever was declared
    /// first.
    pub fn symbol_at_position(&self, pos: &Position) -> Option<&Symbol> {
        smallest_containing(&self.symbols, pos, |s| &s.full_range)
    }

    pub fn reference_at_position(&self, pos: &Position) -> Option<&Reference> {
        smallest_containing(&self.references, pos, |r| &r.span)
    }
}

fn span_contains(span: &Span, pos: &Position) -> bool {
    *pos >= span.start && *pos < span.end
}

fn span_size_key(span: &Span) -> (u32, u32) {
    let lines = span.end.line.saturating_sub(span.start.line);
    let columns = if lines == 0 { span.end.column.saturating_sub(span.start.column) } else { u32::MAX };
    (lines, columns)
}

fn smallest_containing<'a, T>(items: &'a [T], pos: &Position, span_of: impl Fn(&T) -> &Span) -> Option<&'a T> {
    let mut best: Option<(&T, (u32, u32))> = None;
    for item in items {
        let span = span_of(item);
        if !span_contains(span, pos) {
            continue;
        }
        let key = span_size_key(span);
        match &best {
            None => best = Some((item, key)),
            Some((_, best_key)) if key < *best_key => best = Some((item, key)),
            _ => {}
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_ls_syntax::parse;

    fn index_for(src: &str) -> SymbolIndex {
        let id = SourceId::synthetic("test://main.dsl");
        let (schema, diags) = parse(id, src);
        assert!(diags.is_empty(), "{diags:?}");
        SymbolIndex::from_schema(&schema)
    }

    #[test]
    fn emits_schema_type_and_property_symbols() {
        let index = index_for("schema \"Demo\"\n\ntype Car {\n  name String required\n}\n");
        let kinds: Vec<_> = index.symbols.iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&SymbolKind::Schema));
        assert!(kinds.contains(&SymbolKind::Type));
        assert!(kinds.contains(&SymbolKind::Property));
        let car = index.symbols.iter().find(|s| s.name == "Car").unwrap();
        assert_eq!(car.parent_name.as_deref(), Some("Demo"));
    }

    #[test]
    fn orphan_schema_gets_synthetic_root_symbol() {
        let id = SourceId::synthetic("test://main.dsl");
        let (schema, _) = parse(id, "type Car {\n  name String\n}\n");
        let index = SymbolIndex::from_schema(&schema);
        let root = &index.symbols[0];
        assert_eq!(root.kind, SymbolKind::Schema);
        assert_eq!(root.name, "(schema)");
        assert_eq!(root.detail, "parse error");
    }

    #[test]
    fn symbol_at_position_picks_smallest_containing_range() {
        let index = index_for("schema \"Demo\"\n\ntype Car {\n  name String required\n}\n");
        let prop = index.symbols.iter().find(|s| s.name == "name").unwrap();
        let inside = prop.full_range.start;
        let found = index.symbol_at_position(&inside).unwrap();
        assert_eq!(found.name, "name");
    }

    #[test]
    fn relation_detail_matches_arrow_notation() {
        let index = index_for("schema \"Demo\"\n\ntype Car {\n  --> wheels (many) Wheel\n}\n\ntype Wheel {\n  size Int\n}\n");
        let rel = index.symbols.iter().find(|s| s.name == "wheels").unwrap();
        assert_eq!(rel.detail, "--> wheels (many) Wheel");
    }
}
