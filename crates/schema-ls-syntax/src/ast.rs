use schema_ls_registry::{SourceId, Span};

/// A reference to a type, optionally qualified by an import alias
/// (`parts.Wheel`).
#[derive(Debug, Clone)]
pub struct TypeRef {
    pub qualifier: Option<String>,
    pub name: String,
    pub span: Span,
}

/// A reference to a data type alias, same shape as `TypeRef`.
#[derive(Debug, Clone)]
pub struct DataTypeRef {
    pub qualifier: Option<String>,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
    /// Filled in by the loader once the import is resolved against disk or
    /// an overlay; `None` until then.
    pub resolved_source_id: Option<SourceId>,
    pub span: Span,
}

/// A constraint head plus its literal argument list, e.g. `String`,
/// `Enum["a", "b"]`, `Pattern["^[a-z]+$"]`.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub head: String,
    pub values: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub constraint: Option<Constraint>,
    pub data_type_ref: Option<DataTypeRef>,
    pub optional: bool,
    pub primary_key: bool,
    pub span: Span,
    pub name_span: Span,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Association,
    Composition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    One,
    Many,
}

#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    pub field_name: String,
    pub target: TypeRef,
    pub multiplicity: Multiplicity,
    pub optional: bool,
    pub span: Span,
    pub name_span: Span,
    pub documentation: Option<String>,
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone)]
pub struct Invariant {
    pub name: String,
    pub span: Span,
    pub name_span: Span,
    pub documentation: Option<String>,
    /// Raw source text of the `{ ... }` body, braces excluded. Kept verbatim
    /// (rather than parsed into an expression tree, which is out of scope
    /// here) so the formatter can reflow it without losing the constraint
    /// expression itself.
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub span: Span,
    pub name_span: Span,
    pub abstract_: bool,
    pub part: bool,
    pub documentation: Option<String>,
    pub inherits: Vec<TypeRef>,
    pub properties: Vec<Property>,
    pub associations: Vec<Relation>,
    pub compositions: Vec<Relation>,
    pub invariants: Vec<Invariant>,
}

#[derive(Debug, Clone)]
pub struct DataType {
    pub name: String,
    pub constraint: Constraint,
    pub span: Span,
    pub name_span: Span,
    pub documentation: Option<String>,
}

/// The parsed form of one source file. `name` is `None` when no `schema`
/// header was found; §4.4's orphan-schema salvage kicks in whenever `name`
/// is `None` but `imports`/`types` are non-empty.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: Option<String>,
    pub source_id: SourceId,
    /// Span of the whole file.
    pub span: Span,
    /// Span of just the `schema "..."` statement, if present.
    pub header_span: Option<Span>,
    pub imports: Vec<Import>,
    pub types: Vec<Type>,
    pub data_types: Vec<DataType>,
}

impl Schema {
    pub fn is_orphan(&self) -> bool {
        self.name.is_none()
    }
}
