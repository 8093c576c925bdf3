//! Declarations collected across a run: the description registry.
//!
//! The registry preserves encounter order, keys descriptions by name within
//! their namespace (tag vs ordinary identifier), and owns the tag namespace
//! holding struct/union/enum bodies.

use crate::diagnostic::Diagnostic;
use crate::expr::{ExprNode, MacroFn};
use crate::source::SrcLoc;
use crate::types::{AttribMap, EnumDesc, RecordDesc, TypeDesc};
use hashbrown::HashMap;
use serde::Serialize;

/// Inclusion tier assigned by the resolver, never by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Never,
    IfNeeded,
    Yes,
}

/// Namespace a description's name lives in. Struct/union/enum tags do not
/// collide with ordinary identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Namespace {
    Ident,
    Tag,
}

/// A (namespace, name) pair identifying a description.
pub type DescKey = (Namespace, String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DescKind {
    Function {
        ty: TypeDesc,
        attrib: AttribMap,
    },
    Variable {
        ty: TypeDesc,
    },
    /// Body lives in the tag namespace under `name`.
    Struct {
        is_union: bool,
    },
    Enum,
    Typedef {
        ty: TypeDesc,
    },
    MacroConst {
        body: ExprNode,
    },
    MacroFunction {
        def: MacroFn,
    },
    /// Enumerator-derived standalone constant.
    Constant {
        value: ExprNode,
    },
    /// A macro removed by `#undef`; consumers drop inherited bindings.
    Undef,
}

impl DescKind {
    pub fn namespace(&self) -> Namespace {
        match self {
            DescKind::Struct { .. } | DescKind::Enum => Namespace::Tag,
            _ => Namespace::Ident,
        }
    }

    /// Interchange discriminator for this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            DescKind::Function { .. } => "function",
            DescKind::Variable { .. } => "variable",
            DescKind::Struct { is_union } => {
                if *is_union {
                    "union"
                } else {
                    "struct"
                }
            }
            DescKind::Enum => "enum",
            DescKind::Typedef { .. } => "typedef",
            DescKind::MacroConst { .. } => "macro",
            DescKind::MacroFunction { .. } => "macro_function",
            DescKind::Constant { .. } => "constant",
            DescKind::Undef => "undef",
        }
    }
}

/// One top-level declaration (or macro definition) recovered from input.
///
/// `tier`, `included`, `requirements` and `fallback_refs` are written only
/// by the resolver; everything else is fixed at parse time.
#[derive(Debug, Clone, Serialize)]
pub struct Description {
    pub name: String,
    pub src: SrcLoc,
    pub kind: DescKind,
    pub tier: Tier,
    pub included: bool,
    pub errors: Vec<Diagnostic>,
    /// Descriptions this one structurally depends on.
    pub requirements: Vec<DescKey>,
    /// Requirements tiered `never`: the emitter substitutes an opaque
    /// fallback for these references.
    pub fallback_refs: Vec<DescKey>,
}

impl Description {
    pub fn new(name: impl Into<String>, src: SrcLoc, kind: DescKind) -> Self {
        Description {
            name: name.into(),
            src,
            kind,
            tier: Tier::Yes,
            included: false,
            errors: Vec::new(),
            requirements: Vec::new(),
            fallback_refs: Vec::new(),
        }
    }
}

/// Index of a description in encounter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DescId(pub usize);

/// All declarations found across all inputs of one run.
#[derive(Debug, Default)]
pub struct Registry {
    items: Vec<Description>,
    by_key: HashMap<DescKey, DescId>,
    records: HashMap<String, RecordDesc>,
    enums: HashMap<String, EnumDesc>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Insert a description, replacing any earlier one with the same key
    /// (later definitions win, as the preprocessor would see them).
    pub fn add(&mut self, desc: Description) -> DescId {
        let key = (desc.kind.namespace(), desc.name.clone());
        match self.by_key.get(&key) {
            Some(&id) => {
                self.items[id.0] = desc;
                id
            }
            None => {
                let id = DescId(self.items.len());
                self.items.push(desc);
                self.by_key.insert(key, id);
                id
            }
        }
    }

    pub fn lookup(&self, namespace: Namespace, name: &str) -> Option<DescId> {
        self.by_key.get(&(namespace, name.to_string())).copied()
    }

    pub fn get(&self, id: DescId) -> &Description {
        &self.items[id.0]
    }

    pub fn get_mut(&mut self, id: DescId) -> &mut Description {
        &mut self.items[id.0]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Descriptions in encounter order.
    pub fn iter(&self) -> impl Iterator<Item = (DescId, &Description)> {
        self.items.iter().enumerate().map(|(i, d)| (DescId(i), d))
    }

    // --- tag namespace -----------------------------------------------------

    /// Fetch-or-create the record body for `tag`. First sight inserts an
    /// opaque shell so pointers may reference the tag before (or without)
    /// its definition.
    pub fn ensure_record(&mut self, tag: &str, is_union: bool, anonymous: bool, src: &SrcLoc) -> &mut RecordDesc {
        self.records
            .entry(tag.to_string())
            .or_insert_with(|| RecordDesc::forward(tag, is_union, anonymous, src.clone()))
    }

    pub fn record(&self, tag: &str) -> Option<&RecordDesc> {
        self.records.get(tag)
    }

    pub fn record_mut(&mut self, tag: &str) -> Option<&mut RecordDesc> {
        self.records.get_mut(tag)
    }

    pub fn ensure_enum(&mut self, tag: &str, anonymous: bool, src: &SrcLoc) -> &mut EnumDesc {
        self.enums.entry(tag.to_string()).or_insert_with(|| EnumDesc {
            tag: tag.to_string(),
            anonymous,
            enumerators: Vec::new(),
            opaque: true,
            src: src.clone(),
        })
    }

    pub fn enum_desc(&self, tag: &str) -> Option<&EnumDesc> {
        self.enums.get(tag)
    }
}
