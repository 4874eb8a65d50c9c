//! `formatTokenStream`: canonical re-rendering of a grammatically valid
//! schema source — tab indentation keyed to brace depth, tight joins,
//! column-aligned declaration groups, and long-line wrapping.
//!
//! This renders from the parsed AST rather than walking the raw token
//! stream token-by-token: every construct's canonical shape is fully
//! determined by its AST node (name, constraint, modifiers), and working
//! from typed nodes makes the wrap/alignment rules in §4.9 tractable to
//! implement correctly. The tradeoff, recorded in DESIGN.md, is those rare
//! standalone (non-doc) comments the parser's recovery already treats as
//! trivia: they are not relocated by this pass.

use schema_ls_diagnostics::Category;
use schema_ls_registry::SourceId;
use schema_ls_syntax::ast::*;

use crate::wrap::{display_width, indent, split_top_level_operators, WrapConfig};

/// Render `text` in canonical form, or `None` if it has a syntax error
/// (the caller falls back to `format_document` or emits no edit).
pub fn format_token_stream(source_id: SourceId, text: &str, cfg: WrapConfig) -> Option<String> {
    let (schema, diagnostics) = schema_ls_syntax::parse(source_id, text);
    if diagnostics.iter().any(|d| d.category() == Category::Syntax) {
        return None;
    }
    Some(render_schema(&schema, &cfg))
}

fn render_schema(schema: &Schema, cfg: &WrapConfig) -> String {
    let mut out = String::new();
    if let Some(name) = &schema.name {
        out.push_str(&format!("schema \"{name}\""));
    }

    enum TopItem<'a> {
        Import(&'a Import),
        Type(&'a Type),
        DataType(&'a DataType),
    }
    let mut items: Vec<TopItem> = Vec::new();
    items.extend(schema.imports.iter().map(TopItem::Import));
    items.extend(schema.types.iter().map(TopItem::Type));
    items.extend(schema.data_types.iter().map(TopItem::DataType));
    items.sort_by_key(|it| {
        let span = match it {
            TopItem::Import(i) => &i.span,
            TopItem::Type(t) => &t.span,
            TopItem::DataType(d) => &d.span,
        };
        span.start.byte_offset().unwrap_or(0)
    });

    for item in &items {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        match item {
            TopItem::Import(import) => out.push_str(&render_import(import)),
            TopItem::Type(ty) => out.push_str(&render_type(ty, cfg)),
            TopItem::DataType(dt) => out.push_str(&render_data_type(dt, cfg)),
        }
    }

    if out.is_empty() {
        return String::new();
    }
    out.push('\n');
    out
}

fn render_import(import: &Import) -> String {
    match &import.alias {
        Some(alias) => format!("import \"{}\" as {alias}", import.path),
        None => format!("import \"{}\"", import.path),
    }
}

fn render_doc(doc: &Option<String>, depth: u32) -> String {
    match doc {
        Some(text) => text.lines().map(|l| format!("{}/// {l}\n", indent(depth))).collect(),
        None => String::new(),
    }
}

fn type_ref_name(qualifier: &Option<String>, name: &str) -> String {
    match qualifier {
        Some(q) => format!("{q}.{name}"),
        None => name.to_string(),
    }
}

fn render_type(ty: &Type, cfg: &WrapConfig) -> String {
    let mut out = render_doc(&ty.documentation, 0);
    out.push_str(&render_type_header(ty, cfg));
    out.push('\n');

    let items = collect_body_items(ty);
    let body = render_item_groups(&items, 1, cfg);
    if !body.is_empty() {
        out.push_str(&body);
        out.push('\n');
    }
    out.push('}');
    out
}

fn render_type_header(ty: &Type, cfg: &WrapConfig) -> String {
    let mut prefix = String::new();
    if ty.abstract_ {
        prefix.push_str("abstract ");
    }
    if ty.part {
        prefix.push_str("part ");
    }
    let base = format!("{prefix}type {}", ty.name);
    if ty.inherits.is_empty() {
        return format!("{base} {{");
    }
    let names: Vec<String> = ty.inherits.iter().map(|r| type_ref_name(&r.qualifier, &r.name)).collect();
    let oneline = format!("{base} extends {} {{", names.join(", "));
    if display_width(&oneline, cfg.tab_width) <= cfg.max_width {
        return oneline;
    }
    let mut s = format!("{base} extends\n");
    for name in &names {
        s.push_str(&format!("{}{name},\n", indent(1)));
    }
    s.push('{');
    s
}

fn render_data_type(dt: &DataType, cfg: &WrapConfig) -> String {
    let mut out = render_doc(&dt.documentation, 0);
    let prefix = format!("type {} = ", dt.name);
    out.push_str(&render_maybe_wrapped_constraint(&prefix, &dt.constraint.head, &dt.constraint.values, "", 0, cfg));
    out
}

fn render_maybe_wrapped_constraint(prefix: &str, head: &str, values: &[String], suffix: &str, depth: u32, cfg: &WrapConfig) -> String {
    let inline = if values.is_empty() {
        head.to_string()
    } else {
        let joined = values.iter().map(|v| format!("\"{v}\"")).collect::<Vec<_>>().join(", ");
        format!("{head}[{joined}]")
    };
    let oneline = format!("{prefix}{inline}{suffix}");
    if values.is_empty() || display_width(&oneline, cfg.tab_width) <= cfg.max_width {
        return oneline;
    }
    let mut s = format!("{prefix}{head}[\n");
    for v in values {
        s.push_str(&format!("{}\"{v}\",\n", indent(depth + 1)));
    }
    s.push_str(&format!("{}]{suffix}", indent(depth)));
    s
}

enum BodyItem<'a> {
    Property(&'a Property),
    Relation(&'a Relation),
    Invariant(&'a Invariant),
}

impl BodyItem<'_> {
    fn start_byte(&self) -> usize {
        let span = match self {
            BodyItem::Property(p) => &p.span,
            BodyItem::Relation(r) => &r.span,
            BodyItem::Invariant(i) => &i.span,
        };
        span.start.byte_offset().unwrap_or(0)
    }

    /// Grouping tag: same tag + adjacency is what column-alignment groups
    /// declarations by (relations are split further by assoc/comp).
    fn kind_tag(&self) -> u8 {
        match self {
            BodyItem::Property(_) => 0,
            BodyItem::Relation(r) => match r.kind {
                RelationKind::Association => 1,
                RelationKind::Composition => 2,
            },
            BodyItem::Invariant(_) => 3,
        }
    }

    fn identifier_len(&self) -> usize {
        match self {
            BodyItem::Property(p) => p.name.chars().count(),
            BodyItem::Relation(r) => r.field_name.chars().count(),
            BodyItem::Invariant(i) => i.name.chars().count(),
        }
    }
}

fn collect_body_items(ty: &Type) -> Vec<BodyItem<'_>> {
    let mut items: Vec<BodyItem> = Vec::new();
    items.extend(ty.properties.iter().map(BodyItem::Property));
    items.extend(ty.associations.iter().map(BodyItem::Relation));
    items.extend(ty.compositions.iter().map(BodyItem::Relation));
    items.extend(ty.invariants.iter().map(BodyItem::Invariant));
    items.sort_by_key(|it| it.start_byte());
    items
}

fn render_item_groups(items: &[BodyItem], depth: u32, cfg: &WrapConfig) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut idx = 0usize;
    while idx < items.len() {
        let unpadded = render_item(&items[idx], depth, cfg, None);
        let is_multiline = unpadded.trim_end().contains('\n');
        if is_multiline || matches!(items[idx], BodyItem::Invariant(_)) {
            lines.push(unpadded);
            idx += 1;
            continue;
        }
        let mut end = idx + 1;
        while end < items.len() && items[end].kind_tag() == items[idx].kind_tag() {
            let candidate = render_item(&items[end], depth, cfg, None);
            if candidate.trim_end().contains('\n') || matches!(items[end], BodyItem::Invariant(_)) {
                break;
            }
            end += 1;
        }
        let group = &items[idx..end];
        let pad = group.iter().map(|it| it.identifier_len()).max().unwrap_or(0) + 1;
        for it in group {
            lines.push(render_item(it, depth, cfg, Some(pad)));
        }
        idx = end;
    }
    lines.join("\n")
}

fn render_item(item: &BodyItem, depth: u32, cfg: &WrapConfig, pad: Option<usize>) -> String {
    match item {
        BodyItem::Property(p) => render_property(p, depth, cfg, pad),
        BodyItem::Relation(r) => render_relation(r, depth, cfg, pad),
        BodyItem::Invariant(i) => render_invariant(i, depth, cfg),
    }
}

fn name_field(name: &str, pad: Option<usize>) -> String {
    match pad {
        Some(width) => format!("{name:<width$}"),
        None => format!("{name} "),
    }
}

fn render_property(p: &Property, depth: u32, cfg: &WrapConfig, pad: Option<usize>) -> String {
    let mut out = render_doc(&p.documentation, depth);
    let mut suffix = String::new();
    if p.primary_key {
        suffix.push_str(" key");
    }
    suffix.push_str(if p.optional { " optional" } else { " required" });

    let prefix = format!("{}{}", indent(depth), name_field(&p.name, pad));
    if let Some(c) = &p.constraint {
        out.push_str(&render_maybe_wrapped_constraint(&prefix, &c.head, &c.values, &suffix, depth, cfg));
    } else if let Some(dt) = &p.data_type_ref {
        out.push_str(&format!("{prefix}{}{suffix}", type_ref_name(&dt.qualifier, &dt.name)));
    } else {
        out.push_str(prefix.trim_end());
    }
    out
}

fn render_relation(r: &Relation, depth: u32, cfg: &WrapConfig, pad: Option<usize>) -> String {
    let mut out = render_doc(&r.documentation, depth);
    let arrow = match r.kind {
        RelationKind::Association => "-->",
        RelationKind::Composition => "*-->",
    };
    let mult = match r.multiplicity {
        Multiplicity::One => "one",
        Multiplicity::Many => "many",
    };
    let target = type_ref_name(&r.target.qualifier, &r.target.name);
    let mut line = format!("{}{arrow} {}({mult}) {target}", indent(depth), name_field(&r.field_name, pad));
    if r.optional {
        line.push_str(" optional");
    }
    if !r.properties.is_empty() {
        line.push_str(" {\n");
        let sub_pad = r.properties.iter().map(|p| p.name.chars().count()).max().unwrap_or(0) + 1;
        let sub_lines: Vec<String> = r.properties.iter().map(|p| render_property(p, depth + 1, cfg, Some(sub_pad))).collect();
        line.push_str(&sub_lines.join("\n"));
        line.push('\n');
        line.push_str(&format!("{}}}", indent(depth)));
    }
    out.push_str(&line);
    out
}

fn render_invariant(inv: &Invariant, depth: u32, cfg: &WrapConfig) -> String {
    let mut out = render_doc(&inv.documentation, depth);
    let header = format!("{}invariant {} {{", indent(depth), inv.name);

    if !inv.body.contains('\n') {
        let oneline = format!("{header} {} }}", inv.body);
        if display_width(&oneline, cfg.tab_width) <= cfg.max_width {
            out.push_str(&oneline);
            return out;
        }
        out.push_str(&header);
        out.push('\n');
        for segment in split_top_level_operators(&inv.body) {
            out.push_str(&format!("{}{segment}\n", indent(depth + 1)));
        }
        out.push_str(&format!("{}}}", indent(depth)));
        return out;
    }

    // Already multiline in source: preserve the line structure, reindenting
    // each line to this invariant's depth rather than collapsing it (§4.9:
    // "a multiline invariant is never collapsed").
    out.push_str(&header);
    out.push('\n');
    for line in inv.body.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        out.push_str(&format!("{}{trimmed}\n", indent(depth + 1)));
    }
    out.push_str(&format!("{}}}", indent(depth)));
    out
}
