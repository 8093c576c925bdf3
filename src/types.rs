//! Structural representation of C types.
//!
//! Struct/union and enum bodies are owned by the run's tag namespace;
//! `TypeDesc` refers to them by tag. That keeps forward references and
//! self-referential graphs representable before the body exists, and makes
//! every alias of one anonymous record resolve to the identical object.

use crate::expr::ExprNode;
use crate::source::SrcLoc;
use bitflags::bitflags;
use serde::Serialize;
use std::collections::BTreeMap;
use thin_vec::ThinVec;

bitflags! {
    /// Type qualifiers tracked on pointer layers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Qualifiers: u8 {
        const CONST    = 0b001;
        const VOLATILE = 0b010;
        const RESTRICT = 0b100;
    }
}

impl Qualifiers {
    pub fn names(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(Qualifiers::CONST) {
            out.push("const");
        }
        if self.contains(Qualifiers::VOLATILE) {
            out.push("volatile");
        }
        if self.contains(Qualifiers::RESTRICT) {
            out.push("restrict");
        }
        out
    }
}

impl Serialize for Qualifiers {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

/// Open string-keyed attribute map for vendor attributes the grammar does
/// not interpret structurally. BTreeMap keeps rendering deterministic.
pub type AttribMap = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Int(i64),
    Text(String),
}

/// Structural description of a C type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeDesc {
    /// A base arithmetic/void type: name plus signedness and long count.
    Simple {
        name: String,
        signed: bool,
        longs: u8,
    },
    Pointer {
        destination: Box<TypeDesc>,
        qualifiers: Qualifiers,
    },
    Array {
        element: Box<TypeDesc>,
        /// None for an unsized `[]`.
        count: Option<ExprNode>,
    },
    /// Reference to a struct/union body in the tag namespace.
    Record { tag: String, is_union: bool },
    /// Reference to an enum body in the tag namespace.
    Enum { tag: String },
    Bitfield {
        base: Box<TypeDesc>,
        width: ExprNode,
    },
    Function {
        ret: Box<TypeDesc>,
        args: ThinVec<FuncArg>,
        variadic: bool,
    },
    /// A built-in extension type outside the bare C grammar, identified by
    /// its logical primitive name.
    Special(String),
}

impl TypeDesc {
    pub fn simple(name: &str, signed: bool, longs: u8) -> Self {
        TypeDesc::Simple {
            name: name.to_string(),
            signed,
            longs,
        }
    }

    pub fn void() -> Self {
        TypeDesc::simple("void", true, 0)
    }

    pub fn pointer_to(destination: TypeDesc) -> Self {
        TypeDesc::Pointer {
            destination: Box::new(destination),
            qualifiers: Qualifiers::empty(),
        }
    }
}

/// One function parameter: optional identifier plus its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncArg {
    pub name: Option<String>,
    pub ty: TypeDesc,
}

/// One struct/union member. Unnamed members (anonymous bitfields, anonymous
/// nested records) carry `None`; their position keeps them distinct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub name: Option<String>,
    pub ty: TypeDesc,
}

/// A struct or union body, owned by the tag namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordDesc {
    pub tag: String,
    pub is_union: bool,
    pub anonymous: bool,
    pub members: ThinVec<Member>,
    /// Pack byte alignment snapshotted from the pragma stack at the closing
    /// brace, or 1 when `__attribute__((packed))`. Permanent once set.
    pub pack: Option<u32>,
    /// Extra alignment floor from `__attribute__((aligned(N)))`, recorded
    /// separately from per-field packing.
    pub aligned: Option<ExprNode>,
    /// True while only forward declarations have been seen.
    pub opaque: bool,
    pub attrib: AttribMap,
    pub src: SrcLoc,
}

impl RecordDesc {
    pub fn forward(tag: &str, is_union: bool, anonymous: bool, src: SrcLoc) -> Self {
        RecordDesc {
            tag: tag.to_string(),
            is_union,
            anonymous,
            members: ThinVec::new(),
            pack: None,
            aligned: None,
            opaque: true,
            attrib: AttribMap::new(),
            src,
        }
    }
}

/// An enum body, owned by the tag namespace. Enumerator values are
/// expression nodes: an implicit member is `previous + 1`, not a literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDesc {
    pub tag: String,
    pub anonymous: bool,
    pub enumerators: Vec<(String, ExprNode)>,
    pub opaque: bool,
    pub src: SrcLoc,
}

/// Extension typedefs seeded into a run before parsing so headers may use
/// them without declaring them. Each maps to a `TypeDesc::Special` logical
/// name the emitter understands.
pub fn stddef_types() -> Vec<(&'static str, TypeDesc)> {
    vec![
        ("size_t", TypeDesc::Special("c_size_t".into())),
        ("ssize_t", TypeDesc::Special("c_ssize_t".into())),
        ("ptrdiff_t", TypeDesc::Special("c_ptrdiff_t".into())),
        ("wchar_t", TypeDesc::Special("c_wchar".into())),
    ]
}

pub fn gnu_types() -> Vec<(&'static str, TypeDesc)> {
    vec![
        ("__builtin_va_list", TypeDesc::Special("c_void_p".into())),
        ("__gnuc_va_list", TypeDesc::Special("c_void_p".into())),
        ("va_list", TypeDesc::Special("c_void_p".into())),
    ]
}
